//! Pixel buffer and region types
//!
//! A [`FrameBuffer`] is an immutable RGB snapshot of a window region,
//! supplied by an external screen-capture collaborator. The engine
//! never captures frames itself and never holds a buffer past the
//! recognition call it was handed to.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RecognitionError, Result};

/// An RGB color value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a new color
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Mean of the three channels
    pub fn brightness(&self) -> u8 {
        ((self.r as u16 + self.g as u16 + self.b as u16) / 3) as u8
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

/// An immutable RGB pixel snapshot of a captured screen region
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    /// Tightly packed RGB, 3 bytes per pixel, row-major
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a frame from raw RGB data (3 bytes per pixel, row-major).
    ///
    /// Fails with [`RecognitionError::InvalidRegion`] when the data
    /// length does not match `width * height * 3` or a dimension is zero.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RecognitionError::invalid_region(format!(
                "frame dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(RecognitionError::invalid_region(format!(
                "frame data length {} does not match {}x{} RGB ({} bytes)",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a frame by evaluating a color function at every pixel
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Rgb) -> Result<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let c = f(x, y);
                data.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        Self::from_rgb(width, height, data)
    }

    /// Create a frame filled with a single color
    pub fn solid(width: u32, height: u32, color: Rgb) -> Result<Self> {
        Self::from_fn(width, height, |_, _| color)
    }

    /// Create a frame from a decoded image
    pub fn from_image(img: &image::RgbImage) -> Result<Self> {
        Self::from_rgb(img.width(), img.height(), img.as_raw().clone())
    }

    /// Load a frame from an image file on disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path.as_ref())
            .map_err(|e| RecognitionError::persistence(e.to_string()))?
            .to_rgb8();
        Self::from_image(&img)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the pixel at (x, y), or `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixel_unchecked(x, y))
    }

    /// Get the pixel at (x, y) without a bounds check.
    /// Callers must have validated `x < width` and `y < height`.
    pub(crate) fn pixel_unchecked(&self, x: u32, y: u32) -> Rgb {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Rgb::new(self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    /// Raw RGB bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// An axis-aligned rectangle in frame-local coordinates.
///
/// Origin may be negative and extents may run past the frame edge;
/// [`ScanArea::clamp_to`] trims it to the frame before any scan. An
/// area that clamps to nothing yields empty results, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanArea {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScanArea {
    /// Create a new scan area
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A scan area covering an entire frame
    pub fn full(frame: &FrameBuffer) -> Self {
        Self::new(0, 0, frame.width(), frame.height())
    }

    /// Clamp to a frame of the given dimensions
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> ClampedArea {
        let x0 = self.x.clamp(0, frame_width as i32) as u32;
        let y0 = self.y.clamp(0, frame_height as i32) as u32;
        let x1 = (self.x.saturating_add_unsigned(self.width)).clamp(0, frame_width as i32) as u32;
        let y1 = (self.y.saturating_add_unsigned(self.height)).clamp(0, frame_height as i32) as u32;
        ClampedArea {
            x0,
            y0,
            x1: x1.max(x0),
            y1: y1.max(y0),
        }
    }

    /// Center point of the unclamped rectangle
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    /// Express this area as fractions of the given frame size, for
    /// resolution-independent persistence.
    pub fn to_fraction(&self, frame_width: u32, frame_height: u32) -> FractionalArea {
        FractionalArea {
            x: self.x as f32 / frame_width as f32,
            y: self.y as f32 / frame_height as f32,
            width: self.width as f32 / frame_width as f32,
            height: self.height as f32 / frame_height as f32,
        }
    }
}

/// A scan area stored as fractions of the frame size, so a saved
/// region keeps meaning when the game window is resized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FractionalArea {
    /// Resolve to pixel coordinates for the given frame size
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> ScanArea {
        ScanArea::new(
            (self.x * frame_width as f32) as i32,
            (self.y * frame_height as f32) as i32,
            (self.width * frame_width as f32) as u32,
            (self.height * frame_height as f32) as u32,
        )
    }
}

/// A scan area clamped to frame bounds: `x0..x1` by `y0..y1`, exclusive ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedArea {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ClampedArea {
    /// Width after clamping
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    /// Height after clamping
    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Whether the clamped area contains no pixels
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Center point of the clamped area
    pub fn center(&self) -> (u32, u32) {
        (
            self.x0 + self.width() / 2,
            self.y0 + self.height() / 2,
        )
    }
}

/// A rectangle fully inside a frame, in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Create a new rectangle
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle contains the point
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}
