//! Per-layer event detection and metric derivation.
//!
//! Operates only on the lifting half of a layer's boundaries for event
//! detection; the full interval is used solely for the retraction-force
//! minimum. Never fails for data-quality reasons — it substitutes `NaN` and
//! sets `data_quality_ok = false` instead — but does panic on structural
//! invariant violations, since those are caller bugs (see the crate-level
//! error-handling notes).

use tracing::warn;

use crate::config::PipelineConfig;
use crate::smoothing::smooth;
use crate::types::{LayerBoundaries, LayerMetrics, SampleRecord};

/// Computes [`LayerMetrics`] for one layer.
///
/// # Panics
/// Panics if `boundaries.full` falls outside `record`'s range, or if the
/// lifting interval is empty — both are structural invariant violations in
/// the caller, not data-quality conditions.
pub fn calculate(
    record: &SampleRecord,
    boundaries: &LayerBoundaries,
    layer_number: i64,
    cfg: &PipelineConfig,
) -> LayerMetrics {
    assert!(
        boundaries.full.1 <= record.len(),
        "layer boundaries {:?} extend past record length {}",
        boundaries.full,
        record.len()
    );
    let (l0, l1) = boundaries.lifting;
    assert!(l1 > l0, "lifting interval must be non-empty, got {:?}", boundaries.lifting);

    let samples = record.as_slice();
    let t: Vec<f64> = samples[l0..l1].iter().map(|s| s.time_s - samples[l0].time_s).collect();
    let x: Vec<f64> = samples[l0..l1].iter().map(|s| s.position_mm).collect();
    let f: Vec<f64> = samples[l0..l1].iter().map(|s| s.force_n).collect();

    let f_s = smooth(&f, cfg);
    let len = f_s.len();

    let mut metrics = LayerMetrics::nan_for_layer(layer_number);
    metrics.peak_retraction_force_n = retraction_min(samples, boundaries);

    let peak_idx_local = argmax(&f_s);
    let peak_interior = peak_idx_local > 0 && peak_idx_local < len.saturating_sub(1);

    metrics.peak_force_n = f_s[peak_idx_local];
    metrics.peak_position_mm = x[peak_idx_local];
    metrics.peak_time_s = t[peak_idx_local];

    if !peak_interior {
        warn!(layer_number, peak_idx_local, len, "peak not strictly interior to lifting interval");
    }

    // Event detection still runs on the fallback peak index even when it
    // isn't strictly interior, so a flat/no-adhesion layer naturally yields
    // well-defined zero distances and zero work instead of NaN; the
    // interiority failure alone is enough to keep data_quality_ok false.
    let motion_end_idx = locate_motion_end(&x, peak_idx_local, cfg);

    let b0 = initial_baseline(&f_s, peak_idx_local);
    let peak_value = f_s[peak_idx_local];

    let mut data_quality_ok = peak_interior;

    let prop_end_idx = match propagation_end(&f_s, peak_idx_local, motion_end_idx, b0, peak_value, cfg) {
        Some(idx) => idx,
        None => {
            data_quality_ok = false;
            motion_end_idx
        }
    };

    let pre_init_idx = pre_initiation(&f_s, peak_idx_local, b0, peak_value, cfg);

    let baseline = refined_baseline(&f_s, prop_end_idx);

    metrics.baseline_force_n = baseline;
    metrics.pre_init_time_s = t[pre_init_idx];
    metrics.pre_init_position_mm = x[pre_init_idx];
    metrics.prop_end_time_s = t[prop_end_idx];
    metrics.prop_end_position_mm = x[prop_end_idx];

    metrics.pre_init_duration_s = metrics.peak_time_s - metrics.pre_init_time_s;
    metrics.propagation_duration_s = metrics.prop_end_time_s - metrics.peak_time_s;
    metrics.total_peel_duration_s = metrics.pre_init_duration_s + metrics.propagation_duration_s;

    metrics.distance_to_peak_mm = (metrics.peak_position_mm - metrics.pre_init_position_mm).abs();
    metrics.propagation_distance_mm = (metrics.prop_end_position_mm - metrics.peak_position_mm).abs();
    metrics.total_peel_distance_mm = metrics.distance_to_peak_mm + metrics.propagation_distance_mm;

    metrics.work_of_adhesion_mj = work_of_adhesion(&f_s, &x, pre_init_idx, prop_end_idx, baseline);

    let (slope, r2) = effective_stiffness(&f_s, &x, pre_init_idx, peak_idx_local);
    metrics.effective_stiffness_n_per_mm = slope;
    metrics.stiffness_r2 = r2;

    metrics.signal_to_noise_ratio = signal_to_noise(&f_s, pre_init_idx, peak_value, baseline);

    metrics.data_quality_ok = data_quality_ok;
    metrics
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    best
}

fn retraction_min(samples: &[crate::types::Sample], boundaries: &LayerBoundaries) -> f64 {
    let (s0, s1) = boundaries.full;
    samples[s0..s1].iter().map(|s| s.force_n).fold(f64::INFINITY, f64::min)
}

/// §4.B step 4: scan forward from just past the peak for the first window
/// whose position stddev falls below the stability threshold.
fn locate_motion_end(x: &[f64], peak_idx_local: usize, cfg: &PipelineConfig) -> usize {
    let n = x.len();
    let pts = cfg.motion_end_stability_points.max(1);
    let start = (peak_idx_local + 10).min(n.saturating_sub(1));
    if start + pts > n {
        return n - 1;
    }
    let limit = (start + cfg.motion_end_max_search).min(n.saturating_sub(pts));
    let mut k = start;
    while k <= limit {
        if stddev(&x[k..k + pts]) < cfg.motion_end_stability_stddev_mm {
            return k;
        }
        k += 1;
    }
    n - 1
}

fn initial_baseline(f_s: &[f64], peak_idx_local: usize) -> f64 {
    let limit = (peak_idx_local / 4).max(1).min(20).min(f_s.len());
    mean(&f_s[0..limit])
}

/// §4.B step 6: reverse-threshold search for the propagation-end index.
fn propagation_end(
    f_s: &[f64],
    peak_idx_local: usize,
    motion_end_idx: usize,
    b0: f64,
    peak_value: f64,
    cfg: &PipelineConfig,
) -> Option<usize> {
    let threshold = b0 + cfg.propagation_end_threshold_fraction * (peak_value - b0);
    let n = f_s.len();
    let mut i = motion_end_idx;
    while i > peak_idx_local {
        let lo = i.saturating_sub(2);
        let hi = (i + 2).min(n - 1);
        let window_mean = mean(&f_s[lo..=hi]);
        if f_s[i] <= threshold && window_mean <= threshold {
            return Some(i);
        }
        i -= 1;
    }
    None
}

/// §4.B step 7: forward search for the pre-initiation index.
fn pre_initiation(f_s: &[f64], peak_idx_local: usize, b0: f64, peak_value: f64, cfg: &PipelineConfig) -> usize {
    let threshold_init = b0 + cfg.pre_init_relative_threshold * (peak_value - b0);
    for i in 0..peak_idx_local {
        if i + 1 < f_s.len() && f_s[i] > threshold_init && f_s[i + 1] > threshold_init {
            return i;
        }
    }
    peak_idx_local.saturating_sub(30)
}

fn refined_baseline(f_s: &[f64], prop_end_idx: usize) -> f64 {
    let n = f_s.len();
    let lo = prop_end_idx.saturating_sub(2);
    let hi = (prop_end_idx + 2).min(n - 1);
    mean(&f_s[lo..=hi])
}

fn work_of_adhesion(f_s: &[f64], x: &[f64], pre_init_idx: usize, prop_end_idx: usize, baseline: f64) -> f64 {
    if prop_end_idx <= pre_init_idx {
        return 0.0;
    }
    let mut total = 0.0;
    for i in (pre_init_idx + 1)..=prop_end_idx {
        total += (f_s[i] - baseline) * (x[i] - x[i - 1]).abs();
    }
    total
}

fn effective_stiffness(f_s: &[f64], x: &[f64], pre_init_idx: usize, peak_idx_local: usize) -> (f64, f64) {
    let end = (pre_init_idx + 30).min(peak_idx_local);
    if end <= pre_init_idx || end - pre_init_idx + 1 < 5 {
        return (f64::NAN, f64::NAN);
    }
    let xs = &x[pre_init_idx..=end];
    let ys = &f_s[pre_init_idx..=end];
    ols_slope_r2(xs, ys)
}

fn signal_to_noise(f_s: &[f64], pre_init_idx: usize, peak_value: f64, baseline: f64) -> f64 {
    if pre_init_idx < 5 {
        return f64::NAN;
    }
    let sigma = stddev(&f_s[0..pre_init_idx]);
    if sigma <= 0.0 {
        return f64::NAN;
    }
    (peak_value - baseline) / sigma
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Ordinary least squares slope and R^2 for `y` against `x`.
fn ols_slope_r2(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let x_mean = mean(x);
    let y_mean = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for i in 0..x.len() {
        sxy += (x[i] - x_mean) * (y[i] - y_mean);
        sxx += (x[i] - x_mean).powi(2);
    }
    if sxx.abs() < 1e-15 {
        return (f64::NAN, f64::NAN);
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..x.len() {
        let pred = intercept + slope * x[i];
        ss_res += (y[i] - pred).powi(2);
        ss_tot += (y[i] - y_mean).powi(2);
    }
    let r2 = if ss_tot.abs() < 1e-15 { 1.0 } else { 1.0 - ss_res / ss_tot };
    let _ = n;
    (slope, r2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sample, SampleRecord};

    /// Builds the "textbook triangular peak" fixture from the test-suite
    /// scenarios: exact 6mm lift, triangular force peak of amplitude 0.3N.
    fn triangular_peak_record() -> (SampleRecord, LayerBoundaries) {
        let hz = 50.0;
        let n = 500;
        let mut samples = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / hz;
            let position = if i < 480 {
                10.0 - 6.0 * (i as f64 / 480.0)
            } else {
                4.0
            };
            let force = if i < 100 {
                0.0
            } else if i < 250 {
                0.300 * (i - 100) as f64 / 150.0
            } else if i < 400 {
                0.300 * (1.0 - (i - 250) as f64 / 150.0)
            } else {
                0.0
            };
            samples.push(Sample::new(t, position, force));
        }
        let record = SampleRecord::new(samples, hz);
        let boundaries = LayerBoundaries::new((0, 480), (480, 500));
        (record, boundaries)
    }

    #[test]
    fn triangular_peak_matches_analytic_values() {
        let cfg = PipelineConfig::default();
        let (record, boundaries) = triangular_peak_record();
        let metrics = calculate(&record, &boundaries, 1, &cfg);

        assert!(metrics.data_quality_ok, "expected clean triangular peak to be high quality");
        assert!((metrics.peak_force_n - 0.300).abs() < 0.02, "peak_force_n = {}", metrics.peak_force_n);
        assert!((metrics.peak_time_s - 5.0).abs() < 0.1, "peak_time_s = {}", metrics.peak_time_s);
    }

    #[test]
    fn zero_force_is_low_quality() {
        let cfg = PipelineConfig::default();
        let (record, boundaries) = triangular_peak_record();
        let samples: Vec<Sample> = record
            .as_slice()
            .iter()
            .map(|s| Sample::new(s.time_s, s.position_mm, 0.0))
            .collect();
        let flat_record = SampleRecord::new(samples, 50.0);
        let metrics = calculate(&flat_record, &boundaries, 1, &cfg);
        assert!(!metrics.data_quality_ok);
    }

    #[test]
    fn event_ordering_holds() {
        let cfg = PipelineConfig::default();
        let (record, boundaries) = triangular_peak_record();
        let metrics = calculate(&record, &boundaries, 1, &cfg);
        assert!(metrics.pre_init_time_s <= metrics.peak_time_s);
        assert!(metrics.peak_time_s <= metrics.prop_end_time_s);
    }

    #[test]
    fn metric_additivity_holds_exactly() {
        let cfg = PipelineConfig::default();
        let (record, boundaries) = triangular_peak_record();
        let metrics = calculate(&record, &boundaries, 1, &cfg);
        assert_eq!(
            metrics.total_peel_duration_s,
            metrics.pre_init_duration_s + metrics.propagation_duration_s
        );
        assert_eq!(
            metrics.total_peel_distance_mm,
            metrics.distance_to_peak_mm + metrics.propagation_distance_mm
        );
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn empty_lifting_interval_panics() {
        let cfg = PipelineConfig::default();
        let samples = vec![Sample::new(0.0, 0.0, 0.0); 10];
        let record = SampleRecord::new(samples, 50.0);
        // Bypass LayerBoundaries::new's own assertion by constructing
        // directly — this simulates a caller that assembled boundaries by
        // hand incorrectly.
        let boundaries = LayerBoundaries { lifting: (3, 3), retraction: (3, 5), full: (3, 5) };
        let _ = calculate(&record, &boundaries, 1, &cfg);
    }
}
