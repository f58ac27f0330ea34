//! Learned calibration profiles
//!
//! Detection defaults are tuned per fishing location; once a user
//! confirms a detection, the sampled color and scan region are stored
//! here keyed by location name and consulted before every later
//! attempt. Profiles are only ever removed explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::color::ColorSpec;
use crate::error::Result;
use crate::frame::{FractionalArea, ScanArea};

/// Confidence counter cap for repeated confirmations
pub const MAX_PROFILE_CONFIDENCE: u8 = 10;

/// A persisted, location-keyed learned color + region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Location identifier this profile was learned at
    pub location: String,
    /// Learned shadow color and tolerance
    pub color: ColorSpec,
    /// Optional scan-area override, stored as fractions of the frame
    /// size so it survives window resizes
    pub scan_area: Option<FractionalArea>,
    /// Number of times this profile has been confirmed, capped at
    /// [`MAX_PROFILE_CONFIDENCE`]
    #[serde(default)]
    pub confidence: u8,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl CalibrationProfile {
    /// Create a fresh profile with confidence 1
    pub fn new(location: impl Into<String>, color: ColorSpec) -> Self {
        let now = SystemTime::now();
        Self {
            location: location.into(),
            color,
            scan_area: None,
            confidence: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a scan-area override expressed against a frame size
    pub fn with_scan_area(mut self, area: ScanArea, frame_width: u32, frame_height: u32) -> Self {
        self.scan_area = Some(area.to_fraction(frame_width, frame_height));
        self
    }

    /// Resolve the scan-area override to pixels for the given frame size
    pub fn scan_area_for(&self, frame_width: u32, frame_height: u32) -> Option<ScanArea> {
        self.scan_area.map(|f| f.to_pixels(frame_width, frame_height))
    }

    /// Fold a newly confirmed color into this profile: channelwise
    /// average with the stored target, bumped confidence, fresh
    /// update timestamp. Tolerance keeps the wider of the two.
    pub fn reinforce(&mut self, color: ColorSpec) {
        let old = self.color.target;
        let new = color.target;
        self.color.target = crate::frame::Rgb::new(
            ((old.r as u16 + new.r as u16) / 2) as u8,
            ((old.g as u16 + new.g as u16) / 2) as u8,
            ((old.b as u16 + new.b as u16) / 2) as u8,
        );
        self.color.tolerance.r = self.color.tolerance.r.max(color.tolerance.r);
        self.color.tolerance.g = self.color.tolerance.g.max(color.tolerance.g);
        self.color.tolerance.b = self.color.tolerance.b.max(color.tolerance.b);
        self.confidence = self.confidence.saturating_add(1).min(MAX_PROFILE_CONFIDENCE);
        self.updated_at = SystemTime::now();
    }
}

/// Persists and retrieves calibration profiles keyed by location.
///
/// The store is the single writer of the durable profile set; sessions
/// hold profiles read-only. Writes are serialized by a store-wide lock
/// (last writer wins), so concurrent saves to different keys never
/// corrupt each other.
pub struct CalibrationStore {
    path: Option<PathBuf>,
    profiles: RwLock<HashMap<String, CalibrationProfile>>,
}

impl CalibrationStore {
    /// Create a store with no backing file (useful for tests and
    /// callers that persist elsewhere)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Open a store backed by a JSON file, loading any existing
    /// profiles. A missing file is an empty store, not an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let profiles = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let loaded: HashMap<String, CalibrationProfile> = serde_json::from_str(&json)?;
            log::info!("loaded {} calibration profiles from {:?}", loaded.len(), path);
            loaded
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            profiles: RwLock::new(profiles),
        })
    }

    /// Get the profile for a location, if one has been learned
    pub fn get(&self, location: &str) -> Option<CalibrationProfile> {
        self.profiles.read().get(&normalize(location)).cloned()
    }

    /// Whether a profile exists for a location
    pub fn contains(&self, location: &str) -> bool {
        self.profiles.read().contains_key(&normalize(location))
    }

    /// Save (or overwrite) the profile for a location
    pub fn save(&self, location: &str, profile: CalibrationProfile) -> Result<()> {
        let mut profiles = self.profiles.write();
        profiles.insert(normalize(location), profile);
        self.flush(&profiles)?;
        log::debug!("saved calibration profile for '{}'", location);
        Ok(())
    }

    /// Remove the profile for a location. Returns whether one existed.
    pub fn remove(&self, location: &str) -> Result<bool> {
        let mut profiles = self.profiles.write();
        let existed = profiles.remove(&normalize(location)).is_some();
        if existed {
            self.flush(&profiles)?;
            log::debug!("removed calibration profile for '{}'", location);
        }
        Ok(existed)
    }

    /// All location keys with saved profiles
    pub fn locations(&self) -> Vec<String> {
        self.profiles.read().keys().cloned().collect()
    }

    /// Write the profile set to the backing file, if any. Failures are
    /// surfaced to the caller, never swallowed or retried here.
    fn flush(&self, profiles: &HashMap<String, CalibrationProfile>) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    std::fs::create_dir_all(dir)?;
                }
            }
            let json = serde_json::to_string_pretty(profiles)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }
}

/// Location keys are case-insensitive and whitespace-trimmed
fn normalize(location: &str) -> String {
    location.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Tolerance;
    use crate::frame::Rgb;

    fn spec() -> ColorSpec {
        ColorSpec::new(Rgb::new(20, 123, 114), Tolerance::new(8, 8, 8))
    }

    #[test]
    fn test_save_get_round_trip() {
        let store = CalibrationStore::in_memory();
        let profile = CalibrationProfile::new("TTC Punchline Place", spec())
            .with_scan_area(ScanArea::new(260, 196, 1089, 430), 1600, 1151);

        store.save("TTC Punchline Place", profile.clone()).unwrap();
        let loaded = store.get("TTC Punchline Place").unwrap();
        assert_eq!(loaded.color, profile.color);
        assert_eq!(loaded.scan_area, profile.scan_area);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let store = CalibrationStore::in_memory();
        store
            .save("ttc punchline place", CalibrationProfile::new("ttc", spec()))
            .unwrap();
        assert!(store.contains("  TTC PUNCHLINE PLACE "));
    }

    #[test]
    fn test_remove_then_get_returns_none() {
        let store = CalibrationStore::in_memory();
        store
            .save("elm street", CalibrationProfile::new("elm street", spec()))
            .unwrap();
        assert!(store.remove("elm street").unwrap());
        assert!(store.get("elm street").is_none());
        assert!(!store.remove("elm street").unwrap());
    }

    #[test]
    fn test_reinforce_averages_and_caps_confidence() {
        let mut profile = CalibrationProfile::new("spot", spec());
        let brighter = ColorSpec::new(Rgb::new(40, 143, 134), Tolerance::new(12, 6, 8));
        profile.reinforce(brighter);

        assert_eq!(profile.color.target, Rgb::new(30, 133, 124));
        // Tolerance widens channelwise, never narrows.
        assert_eq!(profile.color.tolerance, Tolerance::new(12, 8, 8));
        assert_eq!(profile.confidence, 2);

        for _ in 0..20 {
            profile.reinforce(brighter);
        }
        assert_eq!(profile.confidence, MAX_PROFILE_CONFIDENCE);
    }

    #[test]
    fn test_scan_area_resolves_to_frame_size() {
        let profile = CalibrationProfile::new("spot", spec()).with_scan_area(
            ScanArea::new(200, 150, 1200, 500),
            1600,
            1000,
        );
        let resolved = profile.scan_area_for(800, 500).unwrap();
        assert_eq!(resolved, ScanArea::new(100, 75, 600, 250));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join("fishsight-store-test");
        let path = dir.join("profiles.json");
        let _ = std::fs::remove_file(&path);

        {
            let store = CalibrationStore::open(&path).unwrap();
            store
                .save("polar place", CalibrationProfile::new("polar place", spec()))
                .unwrap();
        }

        let reopened = CalibrationStore::open(&path).unwrap();
        let profile = reopened.get("polar place").unwrap();
        assert_eq!(profile.color, spec());

        let _ = std::fs::remove_file(&path);
    }
}
