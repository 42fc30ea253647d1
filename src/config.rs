//! Pipeline configuration.
//!
//! A single plain record carries every tunable constant the pipeline needs.
//! It is constructed once per job (one batch run, one live session) and
//! passed explicitly to every component; there is no global/static instance.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Nominal lift distance for one layer (mm).
    pub expected_lift_mm: f64,
    /// Acceptable deviation from `expected_lift_mm` (mm).
    pub lift_tolerance_mm: f64,

    /// Odd kernel width for the median filter stage.
    pub median_kernel: usize,
    /// Odd window width for the Savitzky-Golay filter stage.
    pub savgol_window: usize,
    /// Polynomial order for the Savitzky-Golay filter stage.
    pub savgol_order: usize,

    /// Propagation-end threshold, as a fraction of peak-above-baseline.
    pub propagation_end_threshold_fraction: f64,
    /// Pre-initiation threshold, as a fraction of peak-above-baseline.
    pub pre_init_relative_threshold: f64,

    /// Rolling-stddev threshold (mm) below which motion is considered stopped.
    pub motion_end_stability_stddev_mm: f64,
    /// Number of samples in the rolling-stddev window used above.
    pub motion_end_stability_points: usize,
    /// Maximum forward search distance (samples) for motion-end refinement.
    pub motion_end_max_search: usize,

    /// Position delta (mm) below which two samples count as stationary.
    pub stationary_position_threshold_mm: f64,
    /// Consecutive stationary samples required to report `Phase::Pause`.
    pub stationary_count_threshold: usize,

    /// Maximum travel (mm) for a lifting excursion to be classified `Sandwich`.
    pub sandwich_max_distance_mm: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expected_lift_mm: 6.0,
            lift_tolerance_mm: 0.5,
            median_kernel: 5,
            savgol_window: 9,
            savgol_order: 2,
            propagation_end_threshold_fraction: 0.10,
            pre_init_relative_threshold: 0.02,
            motion_end_stability_stddev_mm: 0.02,
            motion_end_stability_points: 3,
            motion_end_max_search: 500,
            stationary_position_threshold_mm: 0.002,
            stationary_count_threshold: 3,
            sandwich_max_distance_mm: 1.0,
        }
    }
}

impl PipelineConfig {
    /// The larger of the two smoothing-filter window sizes; the minimum
    /// layer length the Smoothing Filter can act on.
    pub fn min_smoothable_len(&self) -> usize {
        self.median_kernel.max(self.savgol_window)
    }
}
