//! Tolerance-based color matching
//!
//! The predicate that drives shadow/blob detection: a pixel matches a
//! [`ColorSpec`] when every channel is within the spec's per-channel
//! tolerance of the target. Matching is monotonic in tolerance —
//! widening any channel can only add matches, never remove them.

use serde::{Deserialize, Serialize};

use crate::frame::Rgb;

/// Per-channel color tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tolerance {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tolerance {
    /// Create a new tolerance
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The same tolerance on all three channels
    pub const fn uniform(t: u8) -> Self {
        Self::new(t, t, t)
    }

    /// True when every channel of `self` is at least as wide as `other`
    pub fn contains(&self, other: &Tolerance) -> bool {
        self.r >= other.r && self.g >= other.g && self.b >= other.b
    }
}

/// A target color plus tolerance, used for ad-hoc detection and for
/// persisted calibration profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSpec {
    pub target: Rgb,
    pub tolerance: Tolerance,
}

impl ColorSpec {
    /// Create a new color spec
    pub const fn new(target: Rgb, tolerance: Tolerance) -> Self {
        Self { target, tolerance }
    }

    /// Whether a pixel matches this spec: per-channel absolute
    /// difference within tolerance on all of R, G, and B
    pub fn matches(&self, pixel: Rgb) -> bool {
        (pixel.r as i16 - self.target.r as i16).unsigned_abs() <= self.tolerance.r as u16
            && (pixel.g as i16 - self.target.g as i16).unsigned_abs() <= self.tolerance.g as u16
            && (pixel.b as i16 - self.target.b as i16).unsigned_abs() <= self.tolerance.b as u16
    }

    /// Same target with a different tolerance
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }
}
