//! Recognition sessions
//!
//! A session orchestrates one cancellable, progress-reporting
//! recognition request: resolve any learned calibration for the
//! location, run the color pipeline (blobs, then candidate scoring) or
//! the template matcher, and emit a typed outcome. "Nothing found" is
//! an outcome carrying the best confidence observed, never an error.
//!
//! Pixel loops are CPU-bound over buffers of up to megapixel size, so
//! the `spawn_*` entry points move the session and an owned frame copy
//! onto a named worker thread, the way the capture loop runner in the
//! original tooling does. The UI thread keeps only a [`SessionHandle`]
//! for cancel/state/join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::blob::BlobClusterer;
use crate::calibration::{CalibrationProfile, CalibrationStore};
use crate::candidate::{Candidate, CandidateScorer};
use crate::color::{ColorSpec, Tolerance};
use crate::config::SpotTable;
use crate::error::{RecognitionError, Result};
use crate::frame::{FrameBuffer, Rgb, ScanArea};
use crate::template::{MatchResult, Template, TemplateMatcher};

/// Floor for learned per-channel tolerances
pub const MIN_LEARNED_TOLERANCE: u8 = 5;
/// Neighborhood radius sampled around a confirmed candidate's centroid
const LEARN_SAMPLE_RADIUS: u32 = 5;

/// Cooperative cancellation flag shared between a caller and a running
/// recognition operation. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fire-and-forget progress callback, invoked with percent complete
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// State of a recognition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Looking up calibration/defaults for the location
    Resolving,
    /// Pixel scan in progress
    Detecting,
    Succeeded,
    NotFound,
    Cancelled,
    Failed,
}

/// Outcome of a recognition request
#[derive(Debug, Clone)]
pub enum Detection {
    /// Color pipeline found candidates; `best` is the one flagged best
    Shadow {
        best: Candidate,
        candidates: Vec<Candidate>,
    },
    /// Template matcher cleared its threshold
    Template(MatchResult),
    /// Nothing cleared the threshold; `best_confidence` aids diagnosis
    /// and manual-fallback prompts
    NotFound { best_confidence: f64 },
}

impl Detection {
    /// Whether this outcome carries a hit
    pub fn is_found(&self) -> bool {
        !matches!(self, Detection::NotFound { .. })
    }
}

/// Orchestrates cancellable recognition runs over one frame at a time.
///
/// The session never retains the frame past a call and holds
/// calibration profiles read-only; the store remains the single writer.
pub struct RecognitionSession {
    store: Arc<CalibrationStore>,
    spots: SpotTable,
    clusterer: BlobClusterer,
    scorer: CandidateScorer,
    matcher: TemplateMatcher,
    state: Arc<Mutex<SessionState>>,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl RecognitionSession {
    /// Create a session over a calibration store, with built-in spot
    /// defaults and default pipeline settings
    pub fn new(store: Arc<CalibrationStore>) -> Self {
        Self {
            store,
            spots: SpotTable::builtin(),
            clusterer: BlobClusterer::new(),
            scorer: CandidateScorer::new(),
            matcher: TemplateMatcher::new(),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Replace the spot-default table
    pub fn with_spots(mut self, spots: SpotTable) -> Self {
        self.spots = spots;
        self
    }

    /// Replace the blob clusterer
    pub fn with_clusterer(mut self, clusterer: BlobClusterer) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// Replace the candidate scorer
    pub fn with_scorer(mut self, scorer: CandidateScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Register a progress callback (percent complete, 0-100)
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Token that cancels this session's current run
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current request state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Record the terminal state matching an outcome and pass it through
    fn finish(&self, outcome: Result<Detection>) -> Result<Detection> {
        let state = match &outcome {
            Ok(Detection::NotFound { .. }) => SessionState::NotFound,
            Ok(_) => SessionState::Succeeded,
            Err(RecognitionError::Cancelled) => SessionState::Cancelled,
            Err(_) => SessionState::Failed,
        };
        self.set_state(state);
        outcome
    }

    /// Run the color-detection pipeline for a location.
    ///
    /// Resolution order for the color spec and scan area: learned
    /// calibration profile first, then the spot-default table. The
    /// frame must be a private copy for the duration of the call.
    pub fn detect_shadow(&self, frame: &FrameBuffer, location: &str) -> Result<Detection> {
        self.set_state(SessionState::Resolving);
        let (spec, area) = match self.resolve(frame, location) {
            Ok(resolved) => resolved,
            Err(e) => return self.finish(Err(e)),
        };

        self.set_state(SessionState::Detecting);
        let outcome = self.run_color(frame, area, &spec);
        self.finish(outcome)
    }

    /// Run the color pipeline with explicit settings, bypassing
    /// calibration and spot defaults
    pub fn detect_shadow_with(
        &self,
        frame: &FrameBuffer,
        area: ScanArea,
        spec: &ColorSpec,
    ) -> Result<Detection> {
        self.set_state(SessionState::Detecting);
        let outcome = self.run_color(frame, area, spec);
        self.finish(outcome)
    }

    /// Find the single best occurrence of a template in the frame
    pub fn detect_template(
        &self,
        frame: &FrameBuffer,
        template: &Template,
        threshold: f64,
    ) -> Result<Detection> {
        self.set_state(SessionState::Detecting);
        let outcome = self
            .matcher
            .find_best(frame, template, threshold, &self.cancel, self.progress.as_ref())
            .map(|result| {
                if result.found {
                    Detection::Template(result)
                } else {
                    Detection::NotFound {
                        best_confidence: result.confidence,
                    }
                }
            });
        self.finish(outcome)
    }

    /// Find every non-overlapping occurrence of a template in the frame
    pub fn detect_template_all(
        &self,
        frame: &FrameBuffer,
        template: &Template,
        threshold: f64,
        min_separation: u32,
    ) -> Result<Vec<MatchResult>> {
        self.set_state(SessionState::Detecting);
        let outcome = self.matcher.find_all(
            frame,
            template,
            threshold,
            min_separation,
            &self.cancel,
            self.progress.as_ref(),
        );
        let state = match &outcome {
            Ok(matches) if matches.is_empty() => SessionState::NotFound,
            Ok(_) => SessionState::Succeeded,
            Err(RecognitionError::Cancelled) => SessionState::Cancelled,
            Err(_) => SessionState::Failed,
        };
        self.set_state(state);
        outcome
    }

    /// Learning step: the caller has externally confirmed `candidate`
    /// is a real detection for `location`.
    ///
    /// Samples the neighborhood around the candidate's centroid,
    /// averages it into a refined color spec (tolerance derived from
    /// the local spread, floored at [`MIN_LEARNED_TOLERANCE`]), folds
    /// it into any existing profile, and persists the result. Storage
    /// failures are surfaced, never swallowed.
    pub fn confirm_candidate(
        &self,
        frame: &FrameBuffer,
        location: &str,
        candidate: &Candidate,
        scan_override: Option<ScanArea>,
    ) -> Result<CalibrationProfile> {
        let learned = sample_neighborhood(frame, candidate.position(), LEARN_SAMPLE_RADIUS);

        let mut profile = match self.store.get(location) {
            Some(mut existing) => {
                existing.reinforce(learned);
                existing
            }
            None => CalibrationProfile::new(location, learned),
        };
        if let Some(area) = scan_override {
            profile = profile.with_scan_area(area, frame.width(), frame.height());
        }

        self.store.save(location, profile.clone())?;
        log::info!(
            "calibrated '{}': target {:?}, confidence {}",
            location,
            profile.color.target,
            profile.confidence
        );
        Ok(profile)
    }

    /// Calibration fallback chain: learned profile, then spot defaults
    fn resolve(&self, frame: &FrameBuffer, location: &str) -> Result<(ColorSpec, ScanArea)> {
        if let Some(profile) = self.store.get(location) {
            log::debug!(
                "using learned profile for '{}' (confidence {})",
                location,
                profile.confidence
            );
            let area = profile
                .scan_area_for(frame.width(), frame.height())
                .or_else(|| {
                    self.spots
                        .get(location)
                        .map(|s| s.scan_area_for(frame.width(), frame.height()))
                })
                .unwrap_or_else(|| ScanArea::full(frame));
            return Ok((profile.color, area));
        }

        match self.spots.get(location) {
            Some(spot) => Ok((
                spot.color_spec(),
                spot.scan_area_for(frame.width(), frame.height()),
            )),
            None => Err(RecognitionError::invalid_region(format!(
                "no detection defaults for location '{}'",
                location
            ))),
        }
    }

    fn run_color(
        &self,
        frame: &FrameBuffer,
        area: ScanArea,
        spec: &ColorSpec,
    ) -> Result<Detection> {
        let (blobs, largest_raw) =
            self.clusterer
                .cluster_counting(frame, area, spec, &self.cancel)?;
        let candidates = self.scorer.score(frame, area, blobs);

        match candidates.iter().position(|c| c.best) {
            Some(idx) => Ok(Detection::Shadow {
                best: candidates[idx].clone(),
                candidates,
            }),
            None => {
                // Diagnostic confidence: how close the largest raw
                // component came to the minimum blob size.
                let min = self.clusterer.min_blob_size().max(1);
                let best_confidence = (largest_raw as f64 / min as f64).min(0.99);
                log::info!(
                    "no shadow found (largest component {}, best confidence {:.2})",
                    largest_raw,
                    best_confidence
                );
                Ok(Detection::NotFound { best_confidence })
            }
        }
    }

    /// Move this session and an owned frame onto a worker thread and
    /// run the color pipeline there
    pub fn spawn_shadow(
        self,
        frame: FrameBuffer,
        location: impl Into<String>,
    ) -> std::io::Result<SessionHandle> {
        let location = location.into();
        self.spawn_with(move |session| session.detect_shadow(&frame, &location))
    }

    /// Move this session and an owned frame onto a worker thread and
    /// run a template search there
    pub fn spawn_template(
        self,
        frame: FrameBuffer,
        template: Template,
        threshold: f64,
    ) -> std::io::Result<SessionHandle> {
        self.spawn_with(move |session| session.detect_template(&frame, &template, threshold))
    }

    fn spawn_with<F>(self, run: F) -> std::io::Result<SessionHandle>
    where
        F: FnOnce(&RecognitionSession) -> Result<Detection> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let worker = thread::Builder::new()
            .name("recognition-worker".to_string())
            .spawn(move || run(&self))?;
        Ok(SessionHandle {
            cancel,
            state,
            worker: Some(worker),
        })
    }
}

/// Handle to a recognition run on a worker thread
pub struct SessionHandle {
    cancel: CancelToken,
    state: Arc<Mutex<SessionState>>,
    worker: Option<JoinHandle<Result<Detection>>>,
}

impl SessionHandle {
    /// Request cooperative cancellation of the run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current request state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the worker has finished
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_finished()).unwrap_or(true)
    }

    /// Wait for the run to complete and return its outcome
    pub fn join(mut self) -> Result<Detection> {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Err(RecognitionError::Cancelled),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // A dropped handle must not leave the worker scanning forever.
        self.cancel.cancel();
    }
}

/// Mean color of the `(2r+1)x(2r+1)` neighborhood around a point, with
/// tolerance derived from twice the mean absolute deviation per channel
fn sample_neighborhood(frame: &FrameBuffer, center: (u32, u32), radius: u32) -> ColorSpec {
    let x0 = center.0.saturating_sub(radius);
    let y0 = center.1.saturating_sub(radius);
    let x1 = (center.0 + radius + 1).min(frame.width());
    let y1 = (center.1 + radius + 1).min(frame.height());

    let mut samples: Vec<Rgb> = Vec::new();
    for y in y0..y1 {
        for x in x0..x1 {
            if let Some(pixel) = frame.pixel(x, y) {
                samples.push(pixel);
            }
        }
    }
    if samples.is_empty() {
        return ColorSpec::new(Rgb::new(0, 0, 0), Tolerance::uniform(MIN_LEARNED_TOLERANCE));
    }

    let n = samples.len() as u32;
    let mean = |f: fn(&Rgb) -> u8| -> u8 {
        (samples.iter().map(|p| f(p) as u32).sum::<u32>() / n) as u8
    };
    let target = Rgb::new(mean(|p| p.r), mean(|p| p.g), mean(|p| p.b));

    let spread = |f: fn(&Rgb) -> u8, m: u8| -> u8 {
        let total: u32 = samples
            .iter()
            .map(|p| (f(p) as i32 - m as i32).unsigned_abs())
            .sum();
        ((2 * total / n).min(255) as u8).max(MIN_LEARNED_TOLERANCE)
    };
    let tolerance = Tolerance::new(
        spread(|p| p.r, target.r),
        spread(|p| p.g, target.g),
        spread(|p| p.b, target.b),
    );

    ColorSpec::new(target, tolerance)
}
