//! Live Collector and Analysis Worker: per-layer ring buffer fed by the
//! acquisition loop, handed off to a single background analysis thread so
//! the print loop never blocks on the Calculator.
//!
//! Plain OS threads and one bounded job queue, deliberately not an async
//! runtime — coroutine-style scheduling buys nothing here and complicates
//! cancellation. The queue itself is a capacity-bounded `VecDeque` guarded
//! by a mutex; a `crossbeam_channel` doorbell wakes the worker whenever a
//! job is pushed. A bare mpsc channel cannot implement the required
//! drop-oldest overflow policy because only the consumer side may remove
//! items from it, so the bound and the eviction policy live on the
//! producer-visible `VecDeque` instead, with the channel reduced to its
//! wakeup role.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use tracing::{info, warn};

use crate::calculator::calculate;
use crate::config::PipelineConfig;
use crate::types::{LayerBoundaries, LayerMetrics, Sample, SampleRecord};

enum Job {
    Layer(SampleRecord, LayerBoundaries, i64),
    Shutdown { discard: bool },
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    capacity: usize,
    dropped_jobs: AtomicU64,
    dropped_samples: AtomicU64,
}

/// Snapshot of overflow counters, for diagnostics/telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveDiagnostics {
    pub dropped_jobs: u64,
    pub dropped_samples: u64,
}

struct ActiveLayer {
    layer_number: i64,
    buffer: VecDeque<Sample>,
}

/// Owns the active per-layer buffer and dispatches completed layers to the
/// analysis worker thread.
pub struct LiveCollector {
    active: Option<ActiveLayer>,
    max_samples: usize,
    nominal_hz: f64,
    cfg: PipelineConfig,
    shared: Arc<Shared>,
    doorbell: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl LiveCollector {
    /// Spawns the analysis worker thread and returns a collector bound to
    /// it. `sink` is invoked from the worker thread only, once per
    /// completed layer, in layer-finish order.
    pub fn new(
        cfg: PipelineConfig,
        queue_capacity: usize,
        max_layer_duration_s: f64,
        nominal_hz: f64,
        sink: impl Fn(LayerMetrics) + Send + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(queue_capacity)),
            capacity: queue_capacity.max(1),
            dropped_jobs: AtomicU64::new(0),
            dropped_samples: AtomicU64::new(0),
        });
        let (doorbell_tx, doorbell_rx) = unbounded::<()>();

        let worker_shared = Arc::clone(&shared);
        let worker_cfg = cfg.clone();
        let worker = std::thread::spawn(move || {
            info!("analysis worker started");
            loop {
                if doorbell_rx.recv().is_err() {
                    break;
                }
                let job = {
                    let mut q = worker_shared.queue.lock().unwrap_or_else(|e| e.into_inner());
                    q.pop_front()
                };
                match job {
                    Some(Job::Layer(record, boundaries, layer_number)) => {
                        let metrics = calculate(&record, &boundaries, layer_number, &worker_cfg);
                        sink(metrics);
                    }
                    Some(Job::Shutdown { discard }) => {
                        if discard {
                            let mut q = worker_shared.queue.lock().unwrap_or_else(|e| e.into_inner());
                            q.clear();
                        } else {
                            // Drain remaining layer jobs before exiting.
                            loop {
                                let next = {
                                    let mut q = worker_shared.queue.lock().unwrap_or_else(|e| e.into_inner());
                                    q.pop_front()
                                };
                                match next {
                                    Some(Job::Layer(record, boundaries, layer_number)) => {
                                        let metrics = calculate(&record, &boundaries, layer_number, &worker_cfg);
                                        sink(metrics);
                                    }
                                    _ => break,
                                }
                            }
                        }
                        info!("analysis worker stopped");
                        break;
                    }
                    None => {
                        // Spurious wakeup from a doorbell token whose job was
                        // evicted by a later drop-oldest push; nothing to do.
                    }
                }
            }
        });

        let max_samples = (max_layer_duration_s * nominal_hz).ceil().max(1.0) as usize;

        Self { active: None, max_samples, nominal_hz, cfg, shared, doorbell: doorbell_tx, worker: Some(worker) }
    }

    /// Resets the active buffer and begins collecting a new layer.
    pub fn start_layer(&mut self, layer_number: i64) {
        self.active = Some(ActiveLayer { layer_number, buffer: VecDeque::with_capacity(self.max_samples) });
    }

    /// Appends a sample to the active layer. Silently discarded if no layer
    /// is active. If the buffer is full, the oldest sample is dropped and a
    /// diagnostic counter is incremented.
    pub fn add_sample(&mut self, time_s: f64, position_mm: f64, force_n: f64) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.buffer.len() >= self.max_samples {
            active.buffer.pop_front();
            self.shared.dropped_samples.fetch_add(1, Ordering::Relaxed);
        }
        active.buffer.push_back(Sample::new(time_s, position_mm, force_n));
    }

    /// Snapshots the active buffer into an immutable [`SampleRecord`] and
    /// enqueues it for analysis. No-op if no layer is active or the buffer
    /// has fewer than two samples (too short to form a boundary).
    pub fn finish_layer(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let samples: Vec<Sample> = active.buffer.into_iter().collect();
        if samples.len() < 2 {
            warn!(layer_number = active.layer_number, "layer buffer too short to analyze, dropping");
            return;
        }
        let n = samples.len();
        let record = SampleRecord::new(samples, self.nominal_hz);
        // Trivial boundaries: the whole buffer is the lifting interval; the
        // final sample stands in for the (absent) retraction interval.
        let boundaries = LayerBoundaries::new((0, n - 1), (n - 1, n));
        self.enqueue(Job::Layer(record, boundaries, active.layer_number));
    }

    fn enqueue(&self, job: Job) {
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() >= self.shared.capacity {
            q.pop_front();
            self.shared.dropped_jobs.fetch_add(1, Ordering::Relaxed);
        }
        q.push_back(job);
        drop(q);
        let _ = self.doorbell.send(());
    }

    /// Stops the worker thread. When `discard` is `false`, pending jobs are
    /// drained first; metrics for them are still delivered to the sink.
    pub fn shutdown(mut self, discard: bool) {
        self.enqueue(Job::Shutdown { discard });
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn diagnostics(&self) -> LiveDiagnostics {
        LiveDiagnostics {
            dropped_jobs: self.shared.dropped_jobs.load(Ordering::Relaxed),
            dropped_samples: self.shared.dropped_samples.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn triangular_layer_samples(hz: f64) -> Vec<(f64, f64, f64)> {
        let mut out = Vec::new();
        for i in 0..500 {
            let t = i as f64 / hz;
            let position = if i < 480 { 10.0 - 6.0 * (i as f64 / 480.0) } else { 4.0 };
            let force = if i < 100 {
                0.0
            } else if i < 250 {
                0.300 * (i - 100) as f64 / 150.0
            } else if i < 400 {
                0.300 * (1.0 - (i - 250) as f64 / 150.0)
            } else {
                0.0
            };
            out.push((t, position, force));
        }
        out
    }

    #[test]
    fn delivers_three_layers_in_order() {
        let (tx, rx) = mpsc::channel::<LayerMetrics>();
        let cfg = PipelineConfig::default();
        let mut collector = LiveCollector::new(cfg, 16, 30.0, 50.0, move |m| {
            let _ = tx.send(m);
        });

        for layer in 0..3 {
            collector.start_layer(layer);
            for (t, p, f) in triangular_layer_samples(50.0) {
                collector.add_sample(t, p, f);
            }
            collector.finish_layer();
        }
        collector.shutdown(false);

        let mut received: Vec<LayerMetrics> = rx.try_iter().collect();
        received.sort_by_key(|m| m.layer_number);
        assert_eq!(received.len(), 3);
        for (i, m) in received.iter().enumerate() {
            assert_eq!(m.layer_number, i as i64);
        }
    }

    #[test]
    fn add_sample_without_active_layer_is_discarded() {
        let (tx, _rx) = mpsc::channel::<LayerMetrics>();
        let cfg = PipelineConfig::default();
        let mut collector = LiveCollector::new(cfg, 4, 30.0, 50.0, move |m| {
            let _ = tx.send(m);
        });
        collector.add_sample(0.0, 10.0, 0.0);
        collector.finish_layer();
        collector.shutdown(true);
    }

    #[test]
    fn overflowing_buffer_drops_oldest_and_counts_it() {
        let (tx, _rx) = mpsc::channel::<LayerMetrics>();
        let cfg = PipelineConfig::default();
        let mut collector = LiveCollector::new(cfg, 4, 0.02, 50.0, move |m| {
            let _ = tx.send(m);
        });
        collector.start_layer(0);
        for i in 0..10 {
            collector.add_sample(i as f64, 10.0 - i as f64 * 0.1, 0.0);
        }
        assert!(collector.diagnostics().dropped_samples > 0);
        collector.shutdown(true);
    }
}
