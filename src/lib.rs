//! Fishsight
//!
//! A visual recognition library for game automation. Given RGB frame
//! snapshots captured by the caller, it locates on-screen objects two
//! ways: pixel-exact template matching with early termination, and
//! color-range blob detection tuned for finding a fish shadow in
//! water. Detection runs are cancellable, report progress, and improve
//! over time through a persisted per-location calibration store.
//!
//! The library never captures the screen and never synthesizes input;
//! it only answers "where is it, and how sure are we".

pub mod blob;
pub mod calibration;
pub mod candidate;
pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod session;
pub mod template;

// Re-export commonly used types
pub use blob::{Blob, BlobClusterer, ShapeFilter};
pub use calibration::{CalibrationProfile, CalibrationStore, MAX_PROFILE_CONFIDENCE};
pub use candidate::{Candidate, CandidateScorer, ContextFilter, ProbeConfig};
pub use color::{ColorSpec, Tolerance};
pub use config::{SpotConfig, SpotTable, REFERENCE_HEIGHT, REFERENCE_WIDTH};
pub use error::{RecognitionError, Result};
pub use frame::{FractionalArea, FrameBuffer, PixelRect, Rgb, ScanArea};
pub use session::{
    CancelToken, Detection, ProgressCallback, RecognitionSession, SessionHandle, SessionState,
};
pub use template::{MatchResult, Template, TemplateMatcher};
