//! Candidate scoring for shadow detection
//!
//! A fish shadow is confirmed by a small cluster of bright, near-white
//! bubble pixels rising above it. The scorer probes a window above each
//! blob centroid for such a cluster, then ranks candidates so the
//! caller can cast at exactly one.

use crate::blob::Blob;
use crate::color::{ColorSpec, Tolerance};
use crate::frame::{ClampedArea, FrameBuffer, Rgb, ScanArea};

/// Geometry and color of the secondary probe above a blob centroid.
///
/// The probed window is `width` pixels wide, centered on the centroid's
/// column, spanning from `height_above` pixels above the centroid down
/// to `gap` pixels above it. The candidate gets the secondary-cluster
/// flag when at least `min_pixels` probed pixels match `spec`.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub width: u32,
    pub height_above: u32,
    pub gap: u32,
    pub min_pixels: usize,
    pub spec: ColorSpec,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            width: 60,
            height_above: 80,
            gap: 10,
            min_pixels: 3,
            // Bright, near-neutral bubble pixels.
            spec: ColorSpec::new(Rgb::new(255, 255, 255), Tolerance::uniform(80)),
        }
    }
}

/// Ring test around a candidate centroid: rejects blobs sitting on UI
/// chrome rather than in the water.
#[derive(Debug, Clone)]
pub struct ContextFilter {
    /// Ring radius around the centroid, in pixels
    pub radius: u32,
    /// What counts as water
    pub water: ColorSpec,
    /// Minimum fraction of sampled ring pixels that must be water
    pub min_water_ratio: f32,
}

impl ContextFilter {
    /// Create a filter with the given water spec and a 30 px ring
    pub fn new(water: ColorSpec) -> Self {
        Self {
            radius: 30,
            water,
            min_water_ratio: 0.35,
        }
    }

    fn passes(&self, frame: &FrameBuffer, center: (u32, u32)) -> bool {
        let mut water = 0usize;
        let mut total = 0usize;
        // 12 samples around the ring.
        for step in 0..12 {
            let angle = f64::from(step) * std::f64::consts::PI / 6.0;
            let x = center.0 as i64 + (self.radius as f64 * angle.cos()).round() as i64;
            let y = center.1 as i64 + (self.radius as f64 * angle.sin()).round() as i64;
            if x < 0 || y < 0 {
                continue;
            }
            if let Some(pixel) = frame.pixel(x as u32, y as u32) {
                total += 1;
                if self.water.matches(pixel) {
                    water += 1;
                }
            }
        }
        total > 0 && water as f32 / total as f32 >= self.min_water_ratio
    }
}

/// A scored blob considered as a detection of a real on-screen object
#[derive(Debug, Clone)]
pub struct Candidate {
    pub blob: Blob,
    /// A bright secondary cluster sits above this blob
    pub has_secondary_above: bool,
    /// Vertical distance from the blob centroid to the reference point
    pub vertical_distance: u32,
    /// Exactly one candidate per detection run carries this flag
    pub best: bool,
}

impl Candidate {
    /// Centroid of the underlying blob
    pub fn position(&self) -> (u32, u32) {
        self.blob.centroid()
    }
}

/// Ranks blobs into detection candidates
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    probe: ProbeConfig,
    context: Option<ContextFilter>,
    /// Ranking reference point; defaults to the scan-area center
    reference: Option<(u32, u32)>,
}

impl CandidateScorer {
    /// Create a scorer with the default probe and no context filter
    pub fn new() -> Self {
        Self {
            probe: ProbeConfig::default(),
            context: None,
            reference: None,
        }
    }

    /// Use a custom secondary probe
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Enable the water-context ring filter
    pub fn with_context_filter(mut self, filter: ContextFilter) -> Self {
        self.context = Some(filter);
        self
    }

    /// Rank against a fixed reference point instead of the scan-area center
    pub fn with_reference(mut self, point: (u32, u32)) -> Self {
        self.reference = Some(point);
        self
    }

    /// Score `blobs` into candidates, marking exactly one best (none if
    /// the input is empty). Pure: identical inputs produce identical
    /// rankings, with ties broken by insertion order.
    pub fn score(&self, frame: &FrameBuffer, area: ScanArea, blobs: Vec<Blob>) -> Vec<Candidate> {
        let clamped = area.clamp_to(frame.width(), frame.height());
        let reference = self.reference.unwrap_or_else(|| clamped.center());

        let mut candidates: Vec<Candidate> = blobs
            .into_iter()
            .filter(|blob| match &self.context {
                Some(filter) => filter.passes(frame, blob.centroid()),
                None => true,
            })
            .map(|blob| {
                let centroid = blob.centroid();
                Candidate {
                    has_secondary_above: self.probe_above(frame, &clamped, centroid),
                    vertical_distance: centroid.1.abs_diff(reference.1),
                    best: false,
                    blob,
                }
            })
            .collect();

        if let Some(best_idx) = self.best_index(&candidates) {
            candidates[best_idx].best = true;
            log::debug!(
                "best candidate at {:?}, {} px, secondary={}",
                candidates[best_idx].position(),
                candidates[best_idx].blob.pixel_count(),
                candidates[best_idx].has_secondary_above
            );
        }
        candidates
    }

    /// Index of the top-ranked candidate: secondary cluster first, then
    /// largest pixel count, then smallest vertical distance, then
    /// insertion order.
    fn best_index(&self, candidates: &[Candidate]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by(|(ai, a), (bi, b)| {
                b.has_secondary_above
                    .cmp(&a.has_secondary_above)
                    .then_with(|| b.blob.pixel_count().cmp(&a.blob.pixel_count()))
                    .then_with(|| a.vertical_distance.cmp(&b.vertical_distance))
                    .then_with(|| ai.cmp(bi))
            })
            .map(|(i, _)| i)
    }

    fn probe_above(&self, frame: &FrameBuffer, clamped: &ClampedArea, centroid: (u32, u32)) -> bool {
        let (cx, cy) = centroid;
        if cy <= self.probe.gap {
            return false;
        }
        let y_end = cy - self.probe.gap;
        let y_start = cy.saturating_sub(self.probe.height_above).max(clamped.y0);
        let x_start = cx.saturating_sub(self.probe.width / 2);
        let x_end = (cx + self.probe.width / 2).min(frame.width());
        if y_start >= y_end {
            return false;
        }

        let mut matched = 0usize;
        for y in y_start..y_end {
            for x in x_start..x_end {
                if let Some(pixel) = frame.pixel(x, y) {
                    if self.probe.spec.matches(pixel) {
                        matched += 1;
                        if matched >= self.probe.min_pixels {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobClusterer;
    use crate::session::CancelToken;

    const WATER: Rgb = Rgb::new(40, 130, 150);
    const SHADOW: Rgb = Rgb::new(20, 90, 100);
    const BUBBLE: Rgb = Rgb::new(240, 240, 240);

    fn shadow_spec() -> ColorSpec {
        ColorSpec::new(SHADOW, Tolerance::uniform(5))
    }

    /// Water frame with shadow blocks at the given rects; each entry in
    /// `bubbled` draws a 4x4 bubble block 24 px above that point.
    fn pond(shadows: &[(u32, u32, u32, u32)], bubbled: &[(u32, u32)]) -> FrameBuffer {
        FrameBuffer::from_fn(200, 200, |x, y| {
            for &(sx, sy, w, h) in shadows {
                if x >= sx && x < sx + w && y >= sy && y < sy + h {
                    return SHADOW;
                }
            }
            for &(bx, by) in bubbled {
                let top = by.saturating_sub(24);
                if x >= bx.saturating_sub(2) && x < bx + 2 && y >= top && y < top + 4 {
                    return BUBBLE;
                }
            }
            WATER
        })
        .unwrap()
    }

    fn candidates_for(frame: &FrameBuffer) -> Vec<Candidate> {
        let area = ScanArea::full(frame);
        let blobs = BlobClusterer::new()
            .cluster(frame, area, &shadow_spec(), &CancelToken::new())
            .unwrap();
        CandidateScorer::new().score(frame, area, blobs)
    }

    #[test]
    fn test_empty_input_marks_no_best() {
        let frame = FrameBuffer::solid(50, 50, WATER).unwrap();
        let candidates = candidates_for(&frame);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_single_candidate_is_best() {
        let frame = pond(&[(80, 100, 10, 10)], &[]);
        let candidates = candidates_for(&frame);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].best);
    }

    #[test]
    fn test_secondary_cluster_outranks_size() {
        // Small shadow with bubbles above beats a bigger bare shadow.
        let frame = pond(&[(30, 120, 8, 8), (130, 120, 16, 16)], &[(33, 123)]);
        let candidates = candidates_for(&frame);
        assert_eq!(candidates.len(), 2);

        let best: Vec<&Candidate> = candidates.iter().filter(|c| c.best).collect();
        assert_eq!(best.len(), 1);
        assert!(best[0].has_secondary_above);
        assert_eq!(best[0].blob.bounds().x, 30);
    }

    #[test]
    fn test_size_breaks_secondary_ties() {
        let frame = pond(&[(30, 120, 8, 8), (130, 120, 16, 16)], &[]);
        let candidates = candidates_for(&frame);
        let best = candidates.iter().find(|c| c.best).unwrap();
        assert_eq!(best.blob.bounds().x, 130);
    }

    #[test]
    fn test_vertical_distance_breaks_size_ties() {
        // Two equal shadows; the one nearer the scan-area center row wins.
        let frame = pond(&[(30, 95, 10, 10), (130, 20, 10, 10)], &[]);
        let candidates = candidates_for(&frame);
        let best = candidates.iter().find(|c| c.best).unwrap();
        assert_eq!(best.blob.bounds().y, 95);
    }

    #[test]
    fn test_context_filter_rejects_non_water_surround() {
        const GRAY: Rgb = Rgb::new(128, 128, 128);
        // Shadow block sitting on a gray UI panel.
        let frame = FrameBuffer::from_fn(100, 100, |x, y| {
            if (45..55).contains(&x) && (45..55).contains(&y) {
                SHADOW
            } else {
                GRAY
            }
        })
        .unwrap();

        let area = ScanArea::full(&frame);
        let blobs = BlobClusterer::new()
            .cluster(&frame, area, &shadow_spec(), &CancelToken::new())
            .unwrap();
        assert_eq!(blobs.len(), 1);

        let water = ColorSpec::new(WATER, Tolerance::uniform(20));
        let scorer = CandidateScorer::new().with_context_filter(ContextFilter::new(water));
        let candidates = scorer.score(&frame, area, blobs);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_ranking_is_reproducible() {
        let frame = pond(&[(30, 120, 10, 10), (130, 60, 10, 10)], &[]);
        let first = candidates_for(&frame);
        let second = candidates_for(&frame);
        let best_a = first.iter().position(|c| c.best);
        let best_b = second.iter().position(|c| c.best);
        assert_eq!(best_a, best_b);
    }
}
