//! Stateless-per-call, state-tracking-across-calls classifier turning
//! position deltas into motion-phase labels. Purely informational: it is
//! never used to segment layers (see [`crate::segmenter`]).

use crate::config::PipelineConfig;
use crate::types::Phase;

/// Retained state the annotator carries between calls.
#[derive(Debug, Clone, Default)]
pub struct PhaseAnnotator {
    previous_position_mm: Option<f64>,
    stationary_count: usize,
    position_at_motion_start_mm: f64,
    direction_sign: i8,
}

impl PhaseAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `current_position_mm` given the retained state, updates
    /// that state, and returns the label.
    pub fn classify(&mut self, current_position_mm: f64, cfg: &PipelineConfig) -> Phase {
        let Some(previous) = self.previous_position_mm else {
            self.previous_position_mm = Some(current_position_mm);
            self.position_at_motion_start_mm = current_position_mm;
            return Phase::Unknown;
        };

        let delta = current_position_mm - previous;
        self.previous_position_mm = Some(current_position_mm);

        if delta.abs() < cfg.stationary_position_threshold_mm {
            self.stationary_count += 1;
            if self.stationary_count >= cfg.stationary_count_threshold {
                return Phase::Pause;
            }
        } else {
            self.stationary_count = 0;
        }

        let new_sign: i8 = if delta < 0.0 {
            -1
        } else if delta > 0.0 {
            1
        } else {
            self.direction_sign
        };
        if new_sign != 0 && new_sign != self.direction_sign {
            self.position_at_motion_start_mm = current_position_mm;
            self.direction_sign = new_sign;
        }

        if delta < 0.0 {
            let total_travel = (current_position_mm - self.position_at_motion_start_mm).abs();
            if total_travel < cfg.sandwich_max_distance_mm {
                Phase::Sandwich
            } else {
                Phase::Lift
            }
        } else if delta > 0.0 {
            Phase::Retract
        } else {
            Phase::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_unknown() {
        let cfg = PipelineConfig::default();
        let mut a = PhaseAnnotator::new();
        assert_eq!(a.classify(10.0, &cfg), Phase::Unknown);
    }

    #[test]
    fn small_downward_excursion_is_sandwich() {
        let cfg = PipelineConfig::default();
        let mut a = PhaseAnnotator::new();
        a.classify(10.0, &cfg);
        assert_eq!(a.classify(9.8, &cfg), Phase::Sandwich);
        assert_eq!(a.classify(9.6, &cfg), Phase::Sandwich);
    }

    #[test]
    fn large_downward_excursion_is_lift() {
        let cfg = PipelineConfig::default();
        let mut a = PhaseAnnotator::new();
        a.classify(10.0, &cfg);
        let mut pos = 10.0;
        let mut last = Phase::Unknown;
        for _ in 0..30 {
            pos -= 0.2;
            last = a.classify(pos, &cfg);
        }
        assert_eq!(last, Phase::Lift);
    }

    #[test]
    fn stationary_samples_trigger_pause() {
        let cfg = PipelineConfig::default();
        let mut a = PhaseAnnotator::new();
        a.classify(10.0, &cfg);
        a.classify(10.0005, &cfg);
        a.classify(10.0007, &cfg);
        assert_eq!(a.classify(10.0009, &cfg), Phase::Pause);
    }

    #[test]
    fn upward_motion_is_retract() {
        let cfg = PipelineConfig::default();
        let mut a = PhaseAnnotator::new();
        a.classify(4.0, &cfg);
        assert_eq!(a.classify(4.5, &cfg), Phase::Retract);
    }
}
