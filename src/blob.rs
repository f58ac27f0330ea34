//! Connected-component blob detection
//!
//! Groups color-matching pixels into 8-connected components. Diagonal
//! adjacency counts because game-rendered shadows are anti-aliased and
//! fragment into many tiny components under 4-connectivity.

use crate::color::ColorSpec;
use crate::error::{RecognitionError, Result};
use crate::frame::{FrameBuffer, PixelRect, ScanArea};
use crate::session::CancelToken;

/// A connected cluster of pixels matching a color predicate
#[derive(Debug, Clone)]
pub struct Blob {
    /// Member coordinates in discovery order
    pixels: Vec<(u32, u32)>,
    bounds: PixelRect,
    centroid: (u32, u32),
}

impl Blob {
    fn from_pixels(pixels: Vec<(u32, u32)>) -> Self {
        debug_assert!(!pixels.is_empty());
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut sum_x: u64 = 0;
        let mut sum_y: u64 = 0;
        for &(x, y) in &pixels {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            sum_x += x as u64;
            sum_y += y as u64;
        }
        let n = pixels.len() as u64;
        Self {
            bounds: PixelRect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
            // Floor of the mean: a 10x10 block at (50,50) centers on (54,54).
            centroid: ((sum_x / n) as u32, (sum_y / n) as u32),
            pixels,
        }
    }

    /// Number of member pixels
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Member coordinates in discovery order
    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels
    }

    /// Axis-aligned bounding box
    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    /// Integer centroid (floor of the coordinate means)
    pub fn centroid(&self) -> (u32, u32) {
        self.centroid
    }

    /// Width / height of the bounding box
    pub fn aspect_ratio(&self) -> f32 {
        self.bounds.width as f32 / self.bounds.height as f32
    }

    /// Fraction of the bounding box covered by member pixels
    pub fn fill_ratio(&self) -> f32 {
        self.pixels.len() as f32 / (self.bounds.width as f32 * self.bounds.height as f32)
    }
}

/// Shape gates for blob filtering. Fish shadows are oval-ish, so long
/// thin or sparse components can be rejected before scoring.
#[derive(Debug, Clone, Copy)]
pub struct ShapeFilter {
    /// Accepted bounding-box aspect ratio range (width / height)
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Minimum fraction of the bounding box covered by member pixels
    pub min_fill: f32,
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self {
            min_aspect: 0.3,
            max_aspect: 3.0,
            min_fill: 0.2,
        }
    }
}

/// Groups matching pixels into connected components
#[derive(Debug, Clone)]
pub struct BlobClusterer {
    min_blob_size: usize,
    max_blob_size: Option<usize>,
    shape_filter: Option<ShapeFilter>,
}

impl BlobClusterer {
    /// Default minimum component size; discards single-pixel noise
    pub const DEFAULT_MIN_BLOB_SIZE: usize = 3;

    /// Create a clusterer with default filters
    pub fn new() -> Self {
        Self {
            min_blob_size: Self::DEFAULT_MIN_BLOB_SIZE,
            max_blob_size: None,
            shape_filter: None,
        }
    }

    /// Set the minimum component size
    pub fn with_min_size(mut self, min: usize) -> Self {
        self.min_blob_size = min;
        self
    }

    /// Cap the maximum component size (oversized regions are usually a
    /// tolerance set too wide, not a shadow)
    pub fn with_max_size(mut self, max: usize) -> Self {
        self.max_blob_size = Some(max);
        self
    }

    /// Enable aspect/fill shape filtering
    pub fn with_shape_filter(mut self, filter: ShapeFilter) -> Self {
        self.shape_filter = Some(filter);
        self
    }

    /// Minimum component size currently configured
    pub fn min_blob_size(&self) -> usize {
        self.min_blob_size
    }

    /// Find all blobs of `spec`-matching pixels inside `area`.
    ///
    /// The area is clamped to the frame first; an empty clamped area or
    /// a frame with no matching pixels yields an empty list, not an
    /// error. The cancel token is checked once per scanned row.
    pub fn cluster(
        &self,
        frame: &FrameBuffer,
        area: ScanArea,
        spec: &ColorSpec,
        cancel: &CancelToken,
    ) -> Result<Vec<Blob>> {
        Ok(self.cluster_counting(frame, area, spec, cancel)?.0)
    }

    /// As [`cluster`](Self::cluster), additionally returning the size of
    /// the largest raw component seen before size/shape filtering.
    /// Sessions use it as diagnostic confidence when nothing survives.
    pub fn cluster_counting(
        &self,
        frame: &FrameBuffer,
        area: ScanArea,
        spec: &ColorSpec,
        cancel: &CancelToken,
    ) -> Result<(Vec<Blob>, usize)> {
        let clamped = area.clamp_to(frame.width(), frame.height());
        if clamped.is_empty() {
            log::debug!("blob scan area clamped to nothing, returning no blobs");
            return Ok((Vec::new(), 0));
        }

        let w = clamped.width() as usize;
        let h = clamped.height() as usize;

        // Pass 1: match mask over the clamped area.
        let mut mask = vec![false; w * h];
        for row in 0..h {
            if cancel.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }
            let y = clamped.y0 + row as u32;
            for col in 0..w {
                let x = clamped.x0 + col as u32;
                mask[row * w + col] = spec.matches(frame.pixel_unchecked(x, y));
            }
        }

        // Pass 2: 8-connected flood fill over the mask.
        let mut visited = vec![false; w * h];
        let mut blobs = Vec::new();
        let mut largest_raw = 0usize;
        let mut stack = Vec::new();

        for row in 0..h {
            if cancel.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }
            for col in 0..w {
                let idx = row * w + col;
                if !mask[idx] || visited[idx] {
                    continue;
                }

                let mut pixels = Vec::new();
                visited[idx] = true;
                stack.push((col, row));
                while let Some((cx, cy)) = stack.pop() {
                    pixels.push((clamped.x0 + cx as u32, clamped.y0 + cy as u32));
                    for dy in -1i32..=1 {
                        for dx in -1i32..=1 {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let nx = cx as i32 + dx;
                            let ny = cy as i32 + dy;
                            if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                                continue;
                            }
                            let nidx = ny as usize * w + nx as usize;
                            if mask[nidx] && !visited[nidx] {
                                visited[nidx] = true;
                                stack.push((nx as usize, ny as usize));
                            }
                        }
                    }
                }

                largest_raw = largest_raw.max(pixels.len());
                if let Some(blob) = self.accept(pixels) {
                    blobs.push(blob);
                }
            }
        }

        log::debug!(
            "blob scan over {}x{} area: {} blobs (largest raw component {})",
            w,
            h,
            blobs.len(),
            largest_raw
        );
        Ok((blobs, largest_raw))
    }

    fn accept(&self, pixels: Vec<(u32, u32)>) -> Option<Blob> {
        if pixels.len() < self.min_blob_size {
            return None;
        }
        if let Some(max) = self.max_blob_size {
            if pixels.len() > max {
                return None;
            }
        }
        let blob = Blob::from_pixels(pixels);
        if let Some(filter) = &self.shape_filter {
            let aspect = blob.aspect_ratio();
            if aspect < filter.min_aspect || aspect > filter.max_aspect {
                return None;
            }
            if blob.fill_ratio() < filter.min_fill {
                return None;
            }
        }
        Some(blob)
    }
}

impl Default for BlobClusterer {
    fn default() -> Self {
        Self::new()
    }
}
