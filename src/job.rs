//! Rendering job and its division into work items.
//!
//! A job covers the complex rectangle `min..max` with a `width`×`height`
//! canvas split into `divisions`×`divisions` equal tiles. Tile `(col, row)`
//! covers pixels `col*tw..(col+1)*tw` × `row*th..(row+1)*th` and the complex
//! rectangle `min + (col*step.re, row*step.im)` .. `+ step`.

use crate::complex::Complex;
use crate::error::{Error, Result};
use crate::protocol::TileRequest;

/// Immutable description of one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Job {
    min: Complex,
    max: Complex,
    width: u32,
    height: u32,
    max_iter: u32,
    divisions: u32,
}

impl Job {
    /// Validate and build a job.
    ///
    /// # Errors
    ///
    /// `Error::InvalidJob` when a bound is not finite, `min` is not strictly
    /// below `max` on both axes, a size or the division count is zero, or the
    /// canvas does not divide evenly into `divisions` tiles per axis.
    pub fn new(
        min: Complex,
        max: Complex,
        width: u32,
        height: u32,
        max_iter: u32,
        divisions: u32,
    ) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(Error::InvalidJob(format!(
                "bounds {} .. {} must be finite",
                min, max
            )));
        }
        if min.re >= max.re || min.im >= max.im {
            return Err(Error::InvalidJob(format!(
                "min {} must be below max {} on both axes",
                min, max
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidJob(format!(
                "canvas {}x{} is empty",
                width, height
            )));
        }
        if divisions == 0 {
            return Err(Error::InvalidJob("divisions must be at least 1".to_string()));
        }
        if width % divisions != 0 || height % divisions != 0 {
            return Err(Error::InvalidJob(format!(
                "canvas {}x{} does not divide evenly into {} divisions",
                width, height, divisions
            )));
        }
        Ok(Self {
            min,
            max,
            width,
            height,
            max_iter,
            divisions,
        })
    }

    /// Lower corner of the rendered rectangle.
    pub fn min(&self) -> Complex {
        self.min
    }

    /// Upper corner of the rendered rectangle.
    pub fn max(&self) -> Complex {
        self.max
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Iteration bound.
    pub fn max_iter(&self) -> u32 {
        self.max_iter
    }

    /// Tiles per axis.
    pub fn divisions(&self) -> u32 {
        self.divisions
    }

    /// Canvas size in pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of work items (`divisions²`).
    pub fn item_count(&self) -> usize {
        self.divisions as usize * self.divisions as usize
    }

    /// Tile width in pixels.
    pub fn tile_width(&self) -> u32 {
        self.width / self.divisions
    }

    /// Tile height in pixels.
    pub fn tile_height(&self) -> u32 {
        self.height / self.divisions
    }

    /// Size of one tile in the complex plane.
    pub fn step(&self) -> Complex {
        (self.max - self.min).scale_down(self.divisions as f64)
    }

    /// All work items in row-major order.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let step = self.step();
        let mut items = Vec::with_capacity(self.item_count());
        for row in 0..self.divisions {
            for col in 0..self.divisions {
                let min = self.min + Complex::new(step.re * col as f64, step.im * row as f64);
                items.push(WorkItem {
                    index: items.len(),
                    min,
                    max: min + step,
                    width: self.tile_width(),
                    height: self.tile_height(),
                    max_iter: self.max_iter,
                });
            }
        }
        items
    }

    /// Pixel coordinates of the top-left corner of `item` on the canvas.
    ///
    /// Derived from the item's complex origin: the offset from the job origin
    /// divided by the per-division step gives the column and row.
    ///
    /// # Errors
    ///
    /// `Error::Stitch` if the origin does not land on the job's grid.
    pub fn tile_origin(&self, item: &WorkItem) -> Result<(usize, usize)> {
        let step = self.step();
        let offset = item.min - self.min;
        let col = (offset.re / step.re).round();
        let row = (offset.im / step.im).round();
        let limit = self.divisions as f64;
        if !(0.0..limit).contains(&col) || !(0.0..limit).contains(&row) {
            return Err(Error::Stitch(format!(
                "item {} at {} lies outside the {}x{} grid",
                item.index, item.min, self.divisions, self.divisions
            )));
        }
        Ok((
            col as usize * self.tile_width() as usize,
            row as usize * self.tile_height() as usize,
        ))
    }
}

/// One tile of a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkItem {
    /// Position in row-major grid order.
    pub index: usize,
    /// Lower corner in the complex plane.
    pub min: Complex,
    /// Upper corner in the complex plane.
    pub max: Complex,
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
    /// Iteration bound.
    pub max_iter: u32,
}

impl WorkItem {
    /// Number of pixels in the tile.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Request asking a server to compute this tile.
    pub fn request(&self) -> TileRequest {
        TileRequest {
            min: self.min,
            max: self.max,
            width: self.width,
            height: self.height,
            max_iter: self.max_iter,
        }
    }
}
