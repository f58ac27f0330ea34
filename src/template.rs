//! Template matching
//!
//! Slides a smaller reference image over a captured frame and scores
//! every valid offset with `1 - mean per-channel absolute difference /
//! 255`. The scan checks its cancel token once per row and reports
//! progress as a 0-100 percentage, so a UI driving it stays responsive
//! on full-resolution captures.

use std::path::Path;

use crate::error::{RecognitionError, Result};
use crate::frame::{FrameBuffer, PixelRect};
use crate::session::{CancelToken, ProgressCallback};

/// A named reference image searched for within a FrameBuffer
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    frame: FrameBuffer,
}

impl Template {
    /// Create a template from an existing frame
    pub fn new(name: impl Into<String>, frame: FrameBuffer) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }

    /// Load a named template image from disk
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(name, FrameBuffer::load(path)?))
    }

    /// Copy a sub-region out of a frame as a template. Useful for
    /// capturing an element the user pointed at.
    pub fn from_region(name: impl Into<String>, frame: &FrameBuffer, region: PixelRect) -> Result<Self> {
        if region.width == 0
            || region.height == 0
            || region.x + region.width > frame.width()
            || region.y + region.height > frame.height()
        {
            return Err(RecognitionError::invalid_region(format!(
                "template region {:?} does not fit in {}x{} frame",
                region,
                frame.width(),
                frame.height()
            )));
        }
        let sub = FrameBuffer::from_fn(region.width, region.height, |x, y| {
            frame.pixel_unchecked(region.x + x, region.y + y)
        })?;
        Ok(Self::new(name, sub))
    }

    /// Template name (addresses the file in a template library)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template pixels
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.frame.height()
    }
}

/// Result of a template match operation.
///
/// `confidence` always carries the best score achieved, even when
/// nothing cleared the threshold, to aid diagnosis.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub found: bool,
    /// Top-left of the template-sized window
    pub location: (u32, u32),
    pub bounds: PixelRect,
    /// Location plus half the template extent, rounded down
    pub center: (u32, u32),
    /// Similarity in [0, 1]
    pub confidence: f64,
}

impl MatchResult {
    fn at(x: u32, y: u32, template: &Template, confidence: f64, threshold: f64) -> Self {
        Self {
            found: confidence >= threshold,
            location: (x, y),
            bounds: PixelRect::new(x, y, template.width(), template.height()),
            center: (x + template.width() / 2, y + template.height() / 2),
            confidence,
        }
    }
}

/// Slides a template over a frame computing per-offset similarity
#[derive(Debug, Clone, Default)]
pub struct TemplateMatcher;

impl TemplateMatcher {
    /// Create a matcher
    pub fn new() -> Self {
        Self
    }

    /// Find the single best match of `template` in `frame`.
    ///
    /// Scores every offset where the template fits entirely within the
    /// frame; the returned result is `found` iff the maximum score is
    /// at least `threshold`, and carries that maximum either way. An
    /// offset's scoring is abandoned early once its accumulated error
    /// exceeds both the threshold budget and the best error seen so
    /// far, which cannot change the reported maximum.
    pub fn find_best(
        &self,
        frame: &FrameBuffer,
        template: &Template,
        threshold: f64,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<MatchResult> {
        let (search_w, search_h) = Self::search_extent(frame, template)?;
        let denom = Self::max_error(template);
        let budget = Self::error_budget(denom, threshold);

        let mut best_err = u64::MAX;
        let mut best_pos = (0u32, 0u32);
        let mut reporter = ProgressReporter::new(progress, search_h);

        for y in 0..search_h {
            if cancel.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }
            reporter.row(y);
            for x in 0..search_w {
                let limit = budget.max(best_err.saturating_sub(1));
                if let Some(err) = Self::window_error(frame, template, x, y, limit) {
                    if err < best_err {
                        best_err = err;
                        best_pos = (x, y);
                    }
                }
            }
        }
        reporter.finish();

        let confidence = 1.0 - best_err as f64 / denom as f64;
        let result = MatchResult::at(best_pos.0, best_pos.1, template, confidence, threshold);
        log::debug!(
            "find_best '{}': best {:.4} at {:?}, found={}",
            template.name(),
            confidence,
            result.location,
            result.found
        );
        Ok(result)
    }

    /// Find every match of `template` in `frame` scoring at least
    /// `threshold`, suppressing results whose centers lie within
    /// `min_separation` pixels of an already-accepted, higher-scoring
    /// match. Candidates are ranked by descending score with ties
    /// broken by position, so results are reproducible.
    pub fn find_all(
        &self,
        frame: &FrameBuffer,
        template: &Template,
        threshold: f64,
        min_separation: u32,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<Vec<MatchResult>> {
        let (search_w, search_h) = Self::search_extent(frame, template)?;
        let denom = Self::max_error(template);
        let budget = Self::error_budget(denom, threshold);

        let mut hits: Vec<(u32, u32, u64)> = Vec::new();
        let mut reporter = ProgressReporter::new(progress, search_h);

        for y in 0..search_h {
            if cancel.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }
            reporter.row(y);
            for x in 0..search_w {
                if let Some(err) = Self::window_error(frame, template, x, y, budget) {
                    hits.push((x, y, err));
                }
            }
        }
        reporter.finish();

        // Greedy non-maximum suppression: best score first, ties by (y, x).
        hits.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| (a.1, a.0).cmp(&(b.1, b.0))));

        let min_sep_sq = min_separation as u64 * min_separation as u64;
        let mut accepted: Vec<MatchResult> = Vec::new();
        for (x, y, err) in hits {
            let confidence = 1.0 - err as f64 / denom as f64;
            let result = MatchResult::at(x, y, template, confidence, threshold);
            let separated = accepted.iter().all(|m| {
                let dx = m.center.0.abs_diff(result.center.0) as u64;
                let dy = m.center.1.abs_diff(result.center.1) as u64;
                dx * dx + dy * dy >= min_sep_sq
            });
            if separated {
                accepted.push(result);
            }
        }

        log::debug!(
            "find_all '{}': {} matches above {:.2}",
            template.name(),
            accepted.len(),
            threshold
        );
        Ok(accepted)
    }

    /// Number of valid top-left offsets in each axis
    fn search_extent(frame: &FrameBuffer, template: &Template) -> Result<(u32, u32)> {
        if template.width() == 0 || template.height() == 0 {
            return Err(RecognitionError::invalid_region(
                "template has zero dimensions".to_string(),
            ));
        }
        if template.width() > frame.width() || template.height() > frame.height() {
            return Err(RecognitionError::invalid_region(format!(
                "template {}x{} exceeds frame {}x{}",
                template.width(),
                template.height(),
                frame.width(),
                frame.height()
            )));
        }
        Ok((
            frame.width() - template.width() + 1,
            frame.height() - template.height() + 1,
        ))
    }

    /// Worst possible summed error for this template
    fn max_error(template: &Template) -> u64 {
        template.width() as u64 * template.height() as u64 * 3 * 255
    }

    /// Largest summed error still clearing the threshold
    fn error_budget(denom: u64, threshold: f64) -> u64 {
        ((1.0 - threshold.clamp(0.0, 1.0)) * denom as f64).floor() as u64
    }

    /// Summed absolute per-channel difference for the window at (ox, oy),
    /// or `None` once the partial sum exceeds `limit`.
    fn window_error(
        frame: &FrameBuffer,
        template: &Template,
        ox: u32,
        oy: u32,
        limit: u64,
    ) -> Option<u64> {
        let mut err: u64 = 0;
        for ty in 0..template.height() {
            for tx in 0..template.width() {
                let s = frame.pixel_unchecked(ox + tx, oy + ty);
                let t = template.frame().pixel_unchecked(tx, ty);
                err += (s.r as i32 - t.r as i32).unsigned_abs() as u64
                    + (s.g as i32 - t.g as i32).unsigned_abs() as u64
                    + (s.b as i32 - t.b as i32).unsigned_abs() as u64;
            }
            if err > limit {
                return None;
            }
        }
        Some(err)
    }
}

/// Per-row progress reporting, debounced to whole percentage points
struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    total_rows: u32,
    last_reported: i32,
}

impl<'a> ProgressReporter<'a> {
    fn new(callback: Option<&'a ProgressCallback>, total_rows: u32) -> Self {
        Self {
            callback,
            total_rows: total_rows.max(1),
            last_reported: -1,
        }
    }

    fn row(&mut self, y: u32) {
        if let Some(cb) = self.callback {
            let pct = (y as u64 * 100 / self.total_rows as u64) as i32;
            if pct != self.last_reported {
                self.last_reported = pct;
                cb(pct as u8);
            }
        }
    }

    fn finish(&mut self) {
        if let Some(cb) = self.callback {
            if self.last_reported != 100 {
                self.last_reported = 100;
                cb(100);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgb;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn gradient_frame(width: u32, height: u32) -> FrameBuffer {
        FrameBuffer::from_fn(width, height, |x, y| {
            Rgb::new(
                (x * 7 % 256) as u8,
                (y * 11 % 256) as u8,
                ((x + y) * 13 % 256) as u8,
            )
        })
        .unwrap()
    }

    #[test]
    fn test_exact_self_match() {
        let frame = gradient_frame(64, 48);
        let template =
            Template::from_region("probe", &frame, PixelRect::new(20, 10, 12, 9)).unwrap();

        let result = TemplateMatcher::new()
            .find_best(&frame, &template, 0.9, &CancelToken::new(), None)
            .unwrap();

        assert!(result.found);
        assert_eq!(result.location, (20, 10));
        assert!(result.confidence >= 0.99);
        assert_eq!(result.center, (26, 14));
        assert_eq!(result.bounds, PixelRect::new(20, 10, 12, 9));
    }

    #[test]
    fn test_not_found_still_reports_confidence() {
        let frame = FrameBuffer::solid(32, 32, Rgb::new(0, 0, 0)).unwrap();
        let template = Template::new(
            "white",
            FrameBuffer::solid(4, 4, Rgb::new(255, 255, 255)).unwrap(),
        );

        let result = TemplateMatcher::new()
            .find_best(&frame, &template, 0.9, &CancelToken::new(), None)
            .unwrap();

        assert!(!result.found);
        // All-black vs all-white differs by the full range.
        assert!(result.confidence < 0.01);
    }

    #[test]
    fn test_template_larger_than_frame_is_invalid_region() {
        let frame = FrameBuffer::solid(8, 8, Rgb::new(0, 0, 0)).unwrap();
        let template = Template::new(
            "big",
            FrameBuffer::solid(16, 4, Rgb::new(0, 0, 0)).unwrap(),
        );
        let result =
            TemplateMatcher::new().find_best(&frame, &template, 0.9, &CancelToken::new(), None);
        assert!(matches!(result, Err(RecognitionError::InvalidRegion(_))));
    }

    #[test]
    fn test_find_all_multi_instance() {
        const MARK: Rgb = Rgb::new(200, 40, 40);
        const BACK: Rgb = Rgb::new(10, 60, 90);
        let offsets = [(10u32, 10u32), (70, 12), (40, 60)];
        let frame = FrameBuffer::from_fn(120, 100, |x, y| {
            for &(ox, oy) in &offsets {
                if x >= ox && x < ox + 6 && y >= oy && y < oy + 6 {
                    return MARK;
                }
            }
            BACK
        })
        .unwrap();
        let template = Template::new("mark", FrameBuffer::solid(6, 6, MARK).unwrap());

        let matches = TemplateMatcher::new()
            .find_all(&frame, &template, 0.95, 10, &CancelToken::new(), None)
            .unwrap();

        assert_eq!(matches.len(), 3);
        let mut found: Vec<(u32, u32)> = matches.iter().map(|m| m.location).collect();
        found.sort_unstable();
        assert_eq!(found, vec![(10, 10), (40, 60), (70, 12)]);
        for m in &matches {
            assert!(m.confidence >= 0.95);
        }
    }

    #[test]
    fn test_find_all_suppresses_overlapping_hits() {
        // A solid region wider than the template produces a run of
        // perfect-score offsets; NMS must collapse them.
        const MARK: Rgb = Rgb::new(255, 255, 0);
        let frame = FrameBuffer::from_fn(60, 30, |x, y| {
            if x >= 10 && x < 26 && y >= 10 && y < 18 {
                MARK
            } else {
                Rgb::new(0, 0, 0)
            }
        })
        .unwrap();
        let template = Template::new("mark", FrameBuffer::solid(8, 8, MARK).unwrap());

        let matches = TemplateMatcher::new()
            .find_all(&frame, &template, 0.99, 12, &CancelToken::new(), None)
            .unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_cancellation_is_bounded() {
        // Token cancelled up front: the scan must abort on the first
        // row check rather than complete the whole frame.
        let frame = gradient_frame(300, 300);
        let template = Template::from_region("t", &frame, PixelRect::new(0, 0, 20, 20)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let rows_scanned = Arc::new(AtomicU32::new(0));
        let counter = rows_scanned.clone();
        let progress: ProgressCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result = TemplateMatcher::new().find_all(
            &frame,
            &template,
            0.9,
            10,
            &cancel,
            Some(&progress),
        );
        assert!(matches!(result, Err(RecognitionError::Cancelled)));
        assert!(rows_scanned.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn test_progress_reaches_100() {
        let frame = gradient_frame(40, 40);
        let template = Template::from_region("t", &frame, PixelRect::new(5, 5, 8, 8)).unwrap();

        let last = Arc::new(AtomicU32::new(0));
        let sink = last.clone();
        let progress: ProgressCallback = Arc::new(move |pct| {
            sink.store(pct as u32, Ordering::SeqCst);
        });

        TemplateMatcher::new()
            .find_best(&frame, &template, 0.9, &CancelToken::new(), Some(&progress))
            .unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_from_region_rejects_out_of_bounds() {
        let frame = gradient_frame(30, 30);
        assert!(Template::from_region("t", &frame, PixelRect::new(25, 25, 10, 10)).is_err());
        assert!(Template::from_region("t", &frame, PixelRect::new(0, 0, 0, 5)).is_err());
    }
}
