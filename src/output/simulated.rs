use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use tracing::debug;

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::output::contract::{
    PassReporter, RenderSink, RenderedPass, SampleDescriptor, ShotSetup,
};

/// Counters kept by a [`SimulatedRenderSink`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SimulatedStats {
    /// Samples submitted, discarded ones included.
    pub samples: u64,
    /// Discarded (history-only) samples.
    pub discarded: u64,
    /// Passes reported back.
    pub passes_reported: u64,
    /// Shots set up.
    pub shots: u32,
}

/// Deliberate misbehavior, for exercising the pipeline's error paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimulatedFault {
    /// Behave.
    #[default]
    None,
    /// Report every pass twice.
    DuplicateReports,
    /// Fail `submit` once this many samples have been accepted.
    FailSubmitAfter(u64),
}

enum Job {
    Setup {
        passes: Vec<String>,
        reporter: PassReporter,
    },
    Sample(SampleDescriptor),
    Flush(mpsc::Sender<Result<(), String>>),
    Teardown,
}

/// Render sink that "renders" on a worker thread by counting samples and reporting every pass
/// once the last sample of a frame has been processed.
pub struct SimulatedRenderSink {
    tx: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SimulatedStats>>,
    fault: SimulatedFault,
    accepted: u64,
}

impl SimulatedRenderSink {
    /// Spawn the worker thread.
    pub fn new() -> Self {
        Self::with_fault(SimulatedFault::None)
    }

    /// Spawn the worker thread with a deliberate fault.
    pub fn with_fault(fault: SimulatedFault) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let stats = Arc::new(Mutex::new(SimulatedStats::default()));
        let worker_stats = Arc::clone(&stats);
        let duplicate = fault == SimulatedFault::DuplicateReports;
        let worker = std::thread::spawn(move || render_worker(rx, worker_stats, duplicate));
        Self {
            tx: Some(tx),
            worker: Some(worker),
            stats,
            fault,
            accepted: 0,
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> SimulatedStats {
        self.stats_handle().get()
    }

    /// Counters that stay readable after the sink moves into a pipeline.
    pub fn stats_handle(&self) -> SimulatedStatsHandle {
        SimulatedStatsHandle {
            stats: Arc::clone(&self.stats),
        }
    }

    fn send(&self, job: Job) -> PipelineResult<()> {
        self.tx
            .as_ref()
            .ok_or_else(|| PipelineError::sink("render worker already stopped"))?
            .send(job)
            .map_err(|_| PipelineError::sink("render worker exited unexpectedly"))
    }
}

impl Default for SimulatedRenderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedRenderSink {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("render worker panicked");
        }
    }
}

/// Shared read access to a [`SimulatedRenderSink`]'s counters.
#[derive(Clone, Debug)]
pub struct SimulatedStatsHandle {
    stats: Arc<Mutex<SimulatedStats>>,
}

impl SimulatedStatsHandle {
    /// Snapshot of the counters.
    pub fn get(&self) -> SimulatedStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

impl RenderSink for SimulatedRenderSink {
    fn setup_shot(&mut self, setup: &ShotSetup, reporter: PassReporter) -> PipelineResult<()> {
        debug!(shot = %setup.shot_name, passes = setup.passes.len(), "simulated shot setup");
        self.send(Job::Setup {
            passes: setup.passes.clone(),
            reporter,
        })
    }

    fn submit(&mut self, sample: &SampleDescriptor) -> PipelineResult<()> {
        if let SimulatedFault::FailSubmitAfter(limit) = self.fault
            && self.accepted >= limit
        {
            return Err(PipelineError::sink(format!(
                "simulated renderer failed after {limit} samples"
            )));
        }
        self.accepted += 1;
        self.send(Job::Sample(sample.clone()))
    }

    fn flush(&mut self) -> PipelineResult<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(Job::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| PipelineError::sink("render worker exited during flush"))?
            .map_err(PipelineError::sink)
    }

    fn teardown_shot(&mut self) -> PipelineResult<()> {
        self.send(Job::Teardown)
    }
}

fn render_worker(rx: mpsc::Receiver<Job>, stats: Arc<Mutex<SimulatedStats>>, duplicate: bool) {
    let mut reporter: Option<PassReporter> = None;
    let mut passes: Vec<String> = Vec::new();
    let mut accumulated: HashMap<i64, u32> = HashMap::new();
    let mut failure: Option<String> = None;

    let bump = |f: &dyn Fn(&mut SimulatedStats)| {
        if let Ok(mut s) = stats.lock() {
            f(&mut s);
        }
    };

    while let Ok(job) = rx.recv() {
        match job {
            Job::Setup {
                passes: p,
                reporter: r,
            } => {
                passes = p;
                reporter = Some(r);
                accumulated.clear();
                bump(&|s| s.shots += 1);
            }
            Job::Sample(sample) => {
                bump(&|s| s.samples += 1);
                if sample.discard {
                    bump(&|s| s.discarded += 1);
                    continue;
                }
                let count = accumulated.entry(sample.output_frame_number).or_insert(0);
                *count += 1;
                if !sample.is_last_sample_of_frame() {
                    continue;
                }
                let sample_count = accumulated
                    .remove(&sample.output_frame_number)
                    .unwrap_or(0);
                let Some(reporter) = reporter.as_ref() else {
                    failure.get_or_insert_with(|| "sample submitted outside a shot".to_string());
                    continue;
                };
                let copies = if duplicate { 2 } else { 1 };
                for pass in &passes {
                    for _ in 0..copies {
                        let sent = reporter.report(RenderedPass {
                            output_frame_number: sample.output_frame_number,
                            pass: pass.clone(),
                            sample_count,
                            data: Vec::new(),
                        });
                        match sent {
                            Ok(()) => bump(&|s| s.passes_reported += 1),
                            Err(e) => {
                                failure.get_or_insert_with(|| e.to_string());
                            }
                        }
                    }
                }
            }
            Job::Flush(ack) => {
                let _ = ack.send(failure.take().map_or(Ok(()), Err));
            }
            Job::Teardown => {
                reporter = None;
                accumulated.clear();
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/simulated.rs"]
mod tests;
