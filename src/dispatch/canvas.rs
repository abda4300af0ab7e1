//! Write-once pixel canvas.

use crate::error::{Error, Result};

/// Pre-allocated `width × height` grayscale buffer.
///
/// Every pixel may be written once; coverage is tracked so overlapping
/// tiles are caught instead of silently overwritten.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    written: Vec<bool>,
    covered: usize,
}

impl Canvas {
    /// Zeroed canvas.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
            written: vec![false; width * height],
            covered: 0,
        }
    }

    /// Copy a `tile_width × tile_height` row-major tile with its top-left
    /// corner at `(x, y)`, using the canvas width as stride.
    ///
    /// # Errors
    ///
    /// `Error::Stitch` if the tile is the wrong size, falls outside the
    /// canvas, or touches an already written pixel. The canvas is unchanged
    /// on error.
    pub fn stitch(
        &mut self,
        x: usize,
        y: usize,
        tile_width: usize,
        tile_height: usize,
        tile: &[u8],
    ) -> Result<()> {
        if tile.len() != tile_width * tile_height {
            return Err(Error::Stitch(format!(
                "tile has {} pixels, expected {}x{}",
                tile.len(),
                tile_width,
                tile_height
            )));
        }
        if x + tile_width > self.width || y + tile_height > self.height {
            return Err(Error::Stitch(format!(
                "{}x{} tile at ({}, {}) exceeds the {}x{} canvas",
                tile_width, tile_height, x, y, self.width, self.height
            )));
        }
        for row in y..y + tile_height {
            let start = row * self.width + x;
            if self.written[start..start + tile_width].iter().any(|&w| w) {
                return Err(Error::Stitch(format!(
                    "{}x{} tile at ({}, {}) overlaps merged pixels",
                    tile_width, tile_height, x, y
                )));
            }
        }

        if tile_width == 0 {
            return Ok(());
        }
        for (row, source) in tile.chunks_exact(tile_width).enumerate() {
            let start = (y + row) * self.width + x;
            self.pixels[start..start + tile_width].copy_from_slice(source);
            self.written[start..start + tile_width].fill(true);
        }
        self.covered += tile.len();
        Ok(())
    }

    /// Whether every pixel has been written.
    pub fn is_complete(&self) -> bool {
        self.covered == self.pixels.len()
    }

    /// Number of pixels written so far.
    pub fn covered(&self) -> usize {
        self.covered
    }

    /// Canvas width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Canvas height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
