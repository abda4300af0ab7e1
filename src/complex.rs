//! Minimal complex number used for plane coordinates.

use std::ops::{Add, Sub};

/// A point in the complex plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    /// Real part.
    pub re: f64,
    /// Imaginary part.
    pub im: f64,
}

impl Complex {
    /// Create a complex number from its parts.
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Squared magnitude, `re² + im²`.
    #[inline]
    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// `self * self`.
    #[inline]
    pub fn square(self) -> Self {
        Self {
            re: self.re * self.re - self.im * self.im,
            im: 2.0 * self.re * self.im,
        }
    }

    /// Divide each component by `divisor`.
    #[inline]
    pub fn scale_down(self, divisor: f64) -> Self {
        Self {
            re: self.re / divisor,
            im: self.im / divisor,
        }
    }

    /// Whether both parts are finite.
    pub fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

impl Add for Complex {
    type Output = Complex;

    #[inline]
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;

    #[inline]
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl std::fmt::Display for Complex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.re, self.im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square() {
        let z = Complex::new(1.0, 2.0);
        assert_eq!(z.square(), Complex::new(-3.0, 4.0));
    }

    #[test]
    fn test_arithmetic() {
        let a = Complex::new(-2.0, -2.0);
        let b = Complex::new(2.0, 2.0);
        assert_eq!(b - a, Complex::new(4.0, 4.0));
        assert_eq!((b - a).scale_down(2.0), Complex::new(2.0, 2.0));
        assert_eq!(a + b, Complex::default());
        assert_eq!(Complex::new(3.0, 4.0).norm_sqr(), 25.0);
    }
}
