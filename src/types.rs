//! Core data model: samples, layer boundaries, motion events, and the final
//! per-layer metrics record.

use serde::{Deserialize, Serialize};

/// One `(time, position, force)` reading.
///
/// `position_mm` follows the stage convention: a DECREASING value means the
/// stage is lifting away from the vat floor, an increasing value means it is
/// retracting back toward it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time_s: f64,
    pub position_mm: f64,
    pub force_n: f64,
}

impl Sample {
    pub fn new(time_s: f64, position_mm: f64, force_n: f64) -> Self {
        Self { time_s, position_mm, force_n }
    }
}

/// An ordered sequence of [`Sample`]s from one acquisition session.
///
/// Invariant: `time[i+1] >= time[i]` for all `i`. Component code that walks a
/// `SampleRecord` is entitled to assume this holds; constructors validate it.
#[derive(Debug, Clone, Default)]
pub struct SampleRecord {
    samples: Vec<Sample>,
    /// Nominal sampling rate hint (Hz), used only to size buffers and judge gaps.
    pub nominal_hz: f64,
}

impl SampleRecord {
    /// Builds a record from samples already known to be time-ordered.
    ///
    /// # Panics
    /// Panics if `time_s` is not monotonically nondecreasing — this is a
    /// structural invariant violation, not a data-quality condition.
    pub fn new(samples: Vec<Sample>, nominal_hz: f64) -> Self {
        for w in samples.windows(2) {
            assert!(
                w[1].time_s >= w[0].time_s,
                "SampleRecord time is not monotone nondecreasing: {} followed by {}",
                w[0].time_s,
                w[1].time_s
            );
        }
        Self { samples, nominal_hz }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time_s)
    }

    pub fn positions(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.position_mm)
    }

    pub fn forces(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.force_n)
    }
}

/// Half-open sample-index interval `[start, end)`.
pub type Interval = (usize, usize);

/// The three index intervals that make up one layer.
///
/// Invariant: `lifting.0 < lifting.1 <= retraction.0 < retraction.1`, and
/// `full == (lifting.0, retraction.1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBoundaries {
    pub lifting: Interval,
    pub retraction: Interval,
    pub full: Interval,
}

impl LayerBoundaries {
    pub fn new(lifting: Interval, retraction: Interval) -> Self {
        assert!(
            lifting.0 < lifting.1 && lifting.1 <= retraction.0 && retraction.0 < retraction.1,
            "invalid layer boundaries: lifting={lifting:?} retraction={retraction:?}"
        );
        Self { lifting, retraction, full: (lifting.0, retraction.1) }
    }
}

/// An accepted stage excursion of roughly `expected_lift_mm` found by the
/// segmenter, before lift/retract pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEvent {
    pub start_idx: usize,
    pub end_idx: usize,
    pub signed_distance_mm: f64,
}

/// Motion-phase label produced by the [`crate::phase`] annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Lift,
    Retract,
    Pause,
    Sandwich,
    Unknown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Lift => "Lift",
            Phase::Retract => "Retract",
            Phase::Pause => "Pause",
            Phase::Sandwich => "Sandwich",
            Phase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lift" => Ok(Phase::Lift),
            "retract" => Ok(Phase::Retract),
            "pause" => Ok(Phase::Pause),
            "sandwich" => Ok(Phase::Sandwich),
            "unknown" => Ok(Phase::Unknown),
            other => Err(format!("unrecognized phase label: {other:?}")),
        }
    }
}

/// Final per-layer output record. `NaN` marks a metric that could not be
/// computed; see `data_quality_ok` for an overall summary.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMetrics {
    pub layer_number: i64,

    pub peak_force_n: f64,
    pub peak_position_mm: f64,
    pub peak_time_s: f64,

    pub baseline_force_n: f64,
    pub peak_retraction_force_n: f64,

    pub pre_init_time_s: f64,
    pub pre_init_position_mm: f64,

    pub prop_end_time_s: f64,
    pub prop_end_position_mm: f64,

    pub pre_init_duration_s: f64,
    pub propagation_duration_s: f64,
    pub total_peel_duration_s: f64,

    pub distance_to_peak_mm: f64,
    pub propagation_distance_mm: f64,
    pub total_peel_distance_mm: f64,

    pub work_of_adhesion_mj: f64,

    pub effective_stiffness_n_per_mm: f64,
    pub stiffness_r2: f64,

    pub signal_to_noise_ratio: f64,

    pub step_speed_um_per_s: Option<f64>,
    pub fluid_tag: Option<String>,
    pub gap_tag: Option<String>,

    pub data_quality_ok: bool,
}

impl LayerMetrics {
    /// A metrics record with every numeric field set to `NaN` and
    /// `data_quality_ok = false`, used as the starting point when event
    /// detection fails partway through.
    pub fn nan_for_layer(layer_number: i64) -> Self {
        let nan = f64::NAN;
        Self {
            layer_number,
            peak_force_n: nan,
            peak_position_mm: nan,
            peak_time_s: nan,
            baseline_force_n: nan,
            peak_retraction_force_n: nan,
            pre_init_time_s: nan,
            pre_init_position_mm: nan,
            prop_end_time_s: nan,
            prop_end_position_mm: nan,
            pre_init_duration_s: nan,
            propagation_duration_s: nan,
            total_peel_duration_s: nan,
            distance_to_peak_mm: nan,
            propagation_distance_mm: nan,
            total_peel_distance_mm: nan,
            work_of_adhesion_mj: nan,
            effective_stiffness_n_per_mm: nan,
            stiffness_r2: nan,
            signal_to_noise_ratio: nan,
            step_speed_um_per_s: None,
            fluid_tag: None,
            gap_tag: None,
            data_quality_ok: false,
        }
    }
}
