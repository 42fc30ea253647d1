//! Finds lift/retract motion pairs of nominal length in a [`SampleRecord`]
//! and emits [`LayerBoundaries`].
//!
//! "Find 6 mm motions, pair sequentially": every accepted motion is within
//! `lift_tolerance_mm` of `expected_lift_mm` in magnitude, regardless of
//! direction. This makes small off-protocol touches invisible by
//! construction rather than requiring a direction-aware state machine — see
//! the rationale in the module-level design notes this core was built from.

use tracing::warn;

use crate::config::PipelineConfig;
use crate::types::{LayerBoundaries, MotionEvent, SampleRecord};

const WINDOW: usize = 20;
const SETTLING_SAMPLES: usize = 10;
const CANDIDATE_START_OFFSET: usize = 50;
const CANDIDATE_STEP: usize = 10;
const CANDIDATE_MAX_SPAN: usize = 1000;
const POST_MOTION_GAP: usize = 10;

/// Scans `record` for lift/retract motion pairs and returns one
/// [`LayerBoundaries`] per pair, in occurrence order.
///
/// Returns an empty list if no motions are found. If an odd number of
/// motions is found, the paired prefix is emitted and a diagnostic is
/// logged for the unpaired trailing motion.
pub fn segment(record: &SampleRecord, cfg: &PipelineConfig) -> Vec<LayerBoundaries> {
    let x: Vec<f64> = record.positions().collect();
    let n = x.len();
    if n < SETTLING_SAMPLES + WINDOW {
        return Vec::new();
    }

    let mut motions = Vec::new();
    let mut i = SETTLING_SAMPLES;

    while i + WINDOW <= n {
        let max_j = (i + CANDIDATE_MAX_SPAN).min(n.saturating_sub(WINDOW));
        if i + CANDIDATE_START_OFFSET > max_j {
            i += CANDIDATE_START_OFFSET;
            continue;
        }

        let mut accepted = false;
        let mut j = i + CANDIDATE_START_OFFSET;
        while j <= max_j {
            let start_pos = windowed_mean(&x, i, WINDOW);
            let end_pos = windowed_mean(&x, j, WINDOW);
            let raw_dist = (end_pos - start_pos).abs();

            if in_tolerance(raw_dist, cfg) {
                let refined_end = refine_motion_end(&x, j, cfg);
                let refined_end_pos = windowed_mean(&x, refined_end, WINDOW);
                let refined_dist = (refined_end_pos - start_pos).abs();

                if in_tolerance(refined_dist, cfg) {
                    motions.push(MotionEvent {
                        start_idx: i,
                        end_idx: refined_end,
                        signed_distance_mm: refined_end_pos - x[i],
                    });
                    i = refined_end + POST_MOTION_GAP;
                    accepted = true;
                    break;
                }
            }
            j += CANDIDATE_STEP;
        }

        if !accepted {
            i += CANDIDATE_START_OFFSET;
        }
    }

    pair_motions(motions)
}

fn in_tolerance(dist: f64, cfg: &PipelineConfig) -> bool {
    dist >= cfg.expected_lift_mm - cfg.lift_tolerance_mm && dist <= cfg.expected_lift_mm + cfg.lift_tolerance_mm
}

/// Mean of `x` over `[start, start + window)`, clamped to the available
/// range at the tail of the record.
fn windowed_mean(x: &[f64], start: usize, window: usize) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let start = start.min(n - 1);
    let end = (start + window).min(n);
    let slice = &x[start..end];
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Motion-end refinement (spec §4.C.1): scan forward from `j` for the first
/// window of `motion_end_stability_points` samples whose position stddev
/// falls below `motion_end_stability_stddev_mm`. Returns `j` unchanged if no
/// such window appears within `motion_end_max_search` samples.
fn refine_motion_end(x: &[f64], j: usize, cfg: &PipelineConfig) -> usize {
    let pts = cfg.motion_end_stability_points;
    let n = x.len();
    if pts == 0 || pts > n {
        return j;
    }
    let search_limit = (j + cfg.motion_end_max_search).min(n - pts);
    let mut k = j.min(search_limit);
    while k <= search_limit {
        if stddev(&x[k..k + pts]) < cfg.motion_end_stability_stddev_mm {
            return k;
        }
        k += 1;
    }
    j
}

fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Pairs motions sequentially: `(motions[0], motions[1])`, `(motions[2],
/// motions[3])`, ... Direction/sign is never consulted.
fn pair_motions(motions: Vec<MotionEvent>) -> Vec<LayerBoundaries> {
    let pairs = motions.len() / 2;
    if motions.len() % 2 == 1 {
        warn!(
            unpaired_motion_start = motions[motions.len() - 1].start_idx,
            "segmenter found an unpaired tail motion; dropping it"
        );
    }

    let mut out = Vec::with_capacity(pairs);
    for k in 0..pairs {
        let lift = motions[2 * k];
        let retract = motions[2 * k + 1];
        out.push(LayerBoundaries::new(
            (lift.start_idx, lift.end_idx),
            (retract.start_idx, retract.end_idx),
        ));
    }
    out
}
