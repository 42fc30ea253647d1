//! Thin orchestration over the Segmenter and Calculator: drive segmentation
//! over a full record, compute metrics for every layer, and assemble a
//! result table. No algorithms of its own.

use rayon::prelude::*;
use tracing::info;

use crate::calculator::calculate;
use crate::config::PipelineConfig;
use crate::segmenter::segment;
use crate::types::{LayerMetrics, SampleRecord};

/// Optional external metadata joined into a layer's metrics by layer
/// number, e.g. a companion instruction record mapping layer -> step speed.
pub trait LayerMetadata: Sync {
    fn step_speed_um_per_s(&self, layer_number: i64) -> Option<f64> {
        let _ = layer_number;
        None
    }
    fn fluid_tag(&self, layer_number: i64) -> Option<String> {
        let _ = layer_number;
        None
    }
    fn gap_tag(&self, layer_number: i64) -> Option<String> {
        let _ = layer_number;
        None
    }
}

/// No metadata: every layer's optional fields are left `None`.
pub struct NoMetadata;
impl LayerMetadata for NoMetadata {}

/// Segments `record`, computes metrics for every layer in parallel, and
/// returns the result table in layer-occurrence order. Layer numbers are
/// assigned `0, 1, 2, ...` in the order boundaries were found unless
/// `metadata` supplies a different convention upstream.
pub fn process_record(record: &SampleRecord, cfg: &PipelineConfig, metadata: &dyn LayerMetadata) -> Vec<LayerMetrics> {
    let boundaries = segment(record, cfg);
    info!(layers_found = boundaries.len(), "segmentation complete");

    let mut results: Vec<LayerMetrics> = boundaries
        .par_iter()
        .enumerate()
        .map(|(idx, b)| {
            let layer_number = idx as i64;
            let mut m = calculate(record, b, layer_number, cfg);
            m.step_speed_um_per_s = metadata.step_speed_um_per_s(layer_number);
            m.fluid_tag = metadata.fluid_tag(layer_number);
            m.gap_tag = metadata.gap_tag(layer_number);
            m
        })
        .collect();

    results.sort_by_key(|m| m.layer_number);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;

    fn synthetic_two_layer_record() -> SampleRecord {
        let hz = 50.0;
        let mut samples = Vec::new();
        for _layer in 0..2 {
            for i in 0..500 {
                let t = samples.len() as f64 / hz;
                let position = if i < 480 { 10.0 - 6.0 * (i as f64 / 480.0) } else { 4.0 };
                let force = if (100..400).contains(&i) {
                    let phase = (i - 100) as f64 / 300.0;
                    0.3 * (1.0 - (phase - 0.5).abs() * 2.0).max(0.0)
                } else {
                    0.0
                };
                samples.push(Sample::new(t, position, force));
            }
            for i in 0..500 {
                let t = samples.len() as f64 / hz;
                let position = if i < 480 { 4.0 + 6.0 * (i as f64 / 480.0) } else { 10.0 };
                samples.push(Sample::new(t, position, 0.0));
            }
        }
        SampleRecord::new(samples, hz)
    }

    #[test]
    fn processes_multiple_layers_in_order() {
        let cfg = PipelineConfig::default();
        let record = synthetic_two_layer_record();
        let results = process_record(&record, &cfg, &NoMetadata);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].layer_number, 0);
        assert_eq!(results[1].layer_number, 1);
    }

    #[test]
    fn empty_record_yields_empty_table() {
        let cfg = PipelineConfig::default();
        let record = SampleRecord::new(vec![Sample::new(0.0, 10.0, 0.0); 5], 50.0);
        let results = process_record(&record, &cfg, &NoMetadata);
        assert!(results.is_empty());
    }
}
