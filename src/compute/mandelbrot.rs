//! Escape-time Mandelbrot kernel.

use super::TileCompute;
use crate::complex::Complex;
use crate::protocol::TileRequest;

/// Escape radius squared (`|z| < 2`).
const ESCAPE_NORM_SQR: f64 = 4.0;

/// Grayscale escape-time Mandelbrot renderer.
///
/// Pixel `(px, py)` samples `c = min + (px·Δre, py·Δim)` where
/// `Δ = (max − min) / (width, height)`. Points that never escape within
/// `max_iter` iterations are black (0); others get their iteration count
/// modulo 256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mandelbrot;

impl Mandelbrot {
    /// Iterations before `z ← z² + c` leaves the radius-2 disc, capped at `max_iter`.
    #[inline]
    pub fn escape_time(c: Complex, max_iter: u32) -> u32 {
        let mut z = Complex::default();
        let mut n = 0;
        while n < max_iter && z.norm_sqr() < ESCAPE_NORM_SQR {
            z = z.square() + c;
            n += 1;
        }
        n
    }
}

impl TileCompute for Mandelbrot {
    fn compute(&self, request: &TileRequest) -> Vec<u8> {
        let width = request.width as usize;
        let height = request.height as usize;
        let span = request.max - request.min;
        let dx = span.re / request.width as f64;
        let dy = span.im / request.height as f64;

        let mut pixels = Vec::with_capacity(width * height);
        for py in 0..height {
            for px in 0..width {
                let c = request.min + Complex::new(px as f64 * dx, py as f64 * dy);
                let n = Self::escape_time(c, request.max_iter);
                pixels.push(if n == request.max_iter { 0 } else { n as u8 });
            }
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: u32, height: u32, max_iter: u32) -> TileRequest {
        TileRequest {
            min: Complex::new(-2.0, -2.0),
            max: Complex::new(2.0, 2.0),
            width,
            height,
            max_iter,
        }
    }

    #[test]
    fn test_escape_time() {
        // The origin is in the set.
        assert_eq!(Mandelbrot::escape_time(Complex::new(0.0, 0.0), 50), 50);
        // z1 = c is already outside the disc.
        assert_eq!(Mandelbrot::escape_time(Complex::new(-2.0, -2.0), 50), 1);
        assert_eq!(Mandelbrot::escape_time(Complex::new(3.0, 0.0), 50), 1);
        // z1 = 1, z2 = 2: escapes on the second iteration.
        assert_eq!(Mandelbrot::escape_time(Complex::new(1.0, 0.0), 50), 2);
    }

    #[test]
    fn test_tile_size_and_values() {
        let pixels = Mandelbrot.compute(&request(4, 4, 10));
        assert_eq!(pixels.len(), 16);
        assert_eq!(pixels[0], 1);
        // Pixel (2,2) samples the origin: in the set, black.
        assert_eq!(pixels[2 * 4 + 2], 0);
    }

    #[test]
    fn test_deterministic() {
        let req = TileRequest {
            min: Complex::new(0.2, 0.0),
            max: Complex::new(0.3, 0.1),
            width: 8,
            height: 8,
            max_iter: 1000,
        };
        assert_eq!(Mandelbrot.compute(&req), Mandelbrot.compute(&req));
    }

    #[test]
    fn test_zero_iterations_is_black() {
        let pixels = Mandelbrot.compute(&request(3, 2, 0));
        assert_eq!(pixels, vec![0; 6]);
    }

    #[test]
    fn test_closure_is_tile_compute() {
        let flat = |req: &TileRequest| vec![7u8; req.pixel_count() as usize];
        assert_eq!(flat.compute(&request(2, 3, 1)), vec![7; 6]);
    }
}
