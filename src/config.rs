//! Per-location detection defaults
//!
//! Each fishing spot renders its water differently, so the default
//! shadow color, tolerance, and scan rectangle are tabulated per
//! location. Rectangles are expressed at a reference window size and
//! scaled to the live frame. The built-in table can be replaced or
//! extended by loading a TOML file of the same shape.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::{ColorSpec, Tolerance};
use crate::error::{RecognitionError, Result};
use crate::frame::{Rgb, ScanArea};

/// Reference window width the built-in scan rectangles assume (4:3)
pub const REFERENCE_WIDTH: u32 = 1600;
/// Reference window height the built-in scan rectangles assume
pub const REFERENCE_HEIGHT: u32 = 1151;

/// Detection defaults for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotConfig {
    /// Target shadow color as `[r, g, b]`
    pub color: [u8; 3],
    /// Per-channel tolerance as `[r, g, b]`
    pub tolerance: [u8; 3],
    /// Scan rectangle in reference-resolution coordinates
    pub scan_area: [i32; 4],
}

impl SpotConfig {
    /// Create a spot config
    pub fn new(color: Rgb, tolerance: Tolerance, scan_area: ScanArea) -> Self {
        Self {
            color: [color.r, color.g, color.b],
            tolerance: [tolerance.r, tolerance.g, tolerance.b],
            scan_area: [
                scan_area.x,
                scan_area.y,
                scan_area.width as i32,
                scan_area.height as i32,
            ],
        }
    }

    /// Default color spec for this spot
    pub fn color_spec(&self) -> ColorSpec {
        ColorSpec::new(
            Rgb::new(self.color[0], self.color[1], self.color[2]),
            Tolerance::new(self.tolerance[0], self.tolerance[1], self.tolerance[2]),
        )
    }

    /// Scan rectangle scaled from reference resolution to an actual
    /// frame size
    pub fn scan_area_for(&self, frame_width: u32, frame_height: u32) -> ScanArea {
        let sx = frame_width as f32 / REFERENCE_WIDTH as f32;
        let sy = frame_height as f32 / REFERENCE_HEIGHT as f32;
        ScanArea::new(
            (self.scan_area[0] as f32 * sx) as i32,
            (self.scan_area[1] as f32 * sy) as i32,
            (self.scan_area[2] as f32 * sx) as u32,
            (self.scan_area[3] as f32 * sy) as u32,
        )
    }
}

/// Lookup table of per-location defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotTable {
    /// Fallback used when a location has no entry of its own
    pub fallback: Option<SpotConfig>,
    /// Location key (case-insensitive) to defaults
    pub spots: HashMap<String, SpotConfig>,
}

impl SpotTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table of known fishing spots
    pub fn builtin() -> Self {
        let mut spots = HashMap::new();
        let mut add =
            |name: &str, color: (u8, u8, u8), tol: (u8, u8, u8), rect: (i32, i32, u32, u32)| {
                spots.insert(
                    name.to_uppercase(),
                    SpotConfig::new(
                        Rgb::new(color.0, color.1, color.2),
                        Tolerance::new(tol.0, tol.1, tol.2),
                        ScanArea::new(rect.0, rect.1, rect.2, rect.3),
                    ),
                );
            };

        add("TOONTOWN CENTRAL PUNCHLINE PLACE", (20, 123, 114), (8, 8, 8), (260, 196, 1089, 430));
        add("DONALD DREAM LAND LULLABY LANE", (55, 103, 116), (8, 14, 11), (248, 239, 1244, 421));
        add("BRRRGH POLAR PLACE", (25, 144, 148), (10, 11, 11), (153, 134, 1297, 569));
        add("BRRRGH WALRUS WAY", (25, 144, 148), (10, 11, 11), (153, 134, 1297, 569));
        add("BRRRGH SLEET STREET", (25, 144, 148), (10, 11, 11), (153, 134, 1297, 569));
        add("MINNIE'S MELODYLAND TENOR TERRACE", (56, 129, 122), (10, 10, 10), (200, 150, 1292, 510));
        add("DONALD DOCK LIGHTHOUSE LANE", (22, 140, 118), (13, 13, 15), (200, 150, 1292, 510));
        add("DAISY'S GARDEN ELM STREET", (17, 102, 75), (5, 4, 5), (200, 80, 1230, 712));

        Self {
            fallback: Some(SpotConfig::new(
                Rgb::new(56, 129, 122),
                Tolerance::new(7, 5, 5),
                ScanArea::new(200, 150, 1292, 510),
            )),
            spots,
        }
    }

    /// Load a table from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text)
            .map_err(|e| RecognitionError::persistence(format!("spot table parse error: {}", e)))
    }

    /// Add or replace a spot entry
    pub fn insert(&mut self, location: impl Into<String>, config: SpotConfig) {
        self.spots.insert(location.into().to_uppercase(), config);
    }

    /// Defaults for a location, falling back to the table's fallback
    /// entry for unknown spots
    pub fn get(&self, location: &str) -> Option<&SpotConfig> {
        self.spots
            .get(&location.trim().to_uppercase())
            .or(self.fallback.as_ref())
    }
}
