//! Adhesion Metrics Analysis Core
//!
//! Turns a time-stamped `(time, z-position, force)` stream from a DLP resin
//! printer's load cell into per-layer adhesion metrics: peak force, work of
//! adhesion, propagation timing, peel distances, retraction force, and
//! effective stiffness.
//!
//! ## Pipeline
//!
//! - [`segmenter`] finds lift/retract motion pairs of nominal length in a
//!   full [`types::SampleRecord`] and emits [`types::LayerBoundaries`].
//! - [`smoothing`] applies the two-stage median + Savitzky-Golay filter used
//!   throughout event detection.
//! - [`calculator`] detects peak, pre-initiation, and propagation-end events
//!   within one layer's boundaries and derives [`types::LayerMetrics`].
//! - [`batch`] drives the Segmenter and Calculator over a whole file.
//! - [`live`] buffers samples per layer during acquisition and dispatches
//!   completed layers to a background analysis worker so the print loop
//!   never blocks on the Calculator.
//! - [`phase`] is a stateless-per-call motion-phase classifier, informational
//!   only — it is never used to segment layers.
//!
//! Stage motion control, projector/DLP control, GUI, plotting, and report
//! generation all live outside this crate; it consumes only a sample stream
//! and a [`config::PipelineConfig`].

pub mod batch;
pub mod calculator;
pub mod config;
pub mod error;
pub mod io;
pub mod live;
pub mod phase;
pub mod segmenter;
pub mod smoothing;
pub mod types;

pub use batch::{process_record, LayerMetadata, NoMetadata};
pub use calculator::calculate;
pub use config::PipelineConfig;
pub use error::{CsvLoadError, CsvWriteError};
pub use io::{read_sample_record, write_metrics};
pub use live::{LiveCollector, LiveDiagnostics};
pub use phase::PhaseAnnotator;
pub use segmenter::segment;
pub use smoothing::smooth;
pub use types::{LayerBoundaries, LayerMetrics, MotionEvent, Phase, Sample, SampleRecord};
