use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::core::FrameTime;
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::output::contract::{CompletedFrame, OutputContainer, TimeDriver};

/// Lifecycle flags and frames captured by an [`InMemoryOutput`].
#[derive(Debug, Default)]
pub struct InMemoryOutputState {
    /// Frames in arrival order.
    pub frames: Vec<CompletedFrame>,
    /// `begin_finalize` was called.
    pub finalize_started: bool,
    /// `begin_export` was called.
    pub export_started: bool,
    /// Polls of `has_finished_processing` answered so far.
    pub finalize_polls: u32,
}

/// Output container that keeps completed frames in memory, for tests and debugging.
///
/// Frames stay reachable through [`InMemoryOutput::handle`] after the container has been handed
/// to a pipeline.
#[derive(Debug, Clone)]
pub struct InMemoryOutput {
    name: String,
    state: Arc<Mutex<InMemoryOutputState>>,
    finalize_polls_needed: u32,
}

impl InMemoryOutput {
    /// Create an empty container that finishes on the first poll.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
            finalize_polls_needed: 0,
        }
    }

    /// Report unfinished for `polls` polls after `begin_finalize`, like a writer still flushing.
    pub fn with_finalize_delay(mut self, polls: u32) -> Self {
        self.finalize_polls_needed = polls;
        self
    }

    /// Shared view of the captured state.
    pub fn handle(&self) -> InMemoryOutputHandle {
        InMemoryOutputHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> PipelineResult<MutexGuard<'_, InMemoryOutputState>> {
        self.state
            .lock()
            .map_err(|_| PipelineError::sink("in-memory output state poisoned"))
    }
}

impl OutputContainer for InMemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_receive_frame(&mut self, frame: CompletedFrame) -> PipelineResult<()> {
        self.lock()?.frames.push(frame);
        Ok(())
    }

    fn begin_finalize(&mut self) -> PipelineResult<()> {
        self.lock()?.finalize_started = true;
        Ok(())
    }

    fn has_finished_processing(&mut self) -> bool {
        let needed = self.finalize_polls_needed;
        match self.lock() {
            Ok(mut s) => {
                s.finalize_polls += 1;
                s.finalize_polls > needed
            }
            Err(_) => true,
        }
    }

    fn begin_export(&mut self) -> PipelineResult<()> {
        self.lock()?.export_started = true;
        Ok(())
    }
}

/// Read access to an [`InMemoryOutput`] that has been moved into a pipeline.
#[derive(Debug, Clone)]
pub struct InMemoryOutputHandle {
    state: Arc<Mutex<InMemoryOutputState>>,
}

impl InMemoryOutputHandle {
    /// Run `f` with the captured state locked.
    pub fn with<R>(&self, f: impl FnOnce(&InMemoryOutputState) -> R) -> PipelineResult<R> {
        let guard = self
            .state
            .lock()
            .map_err(|_| PipelineError::sink("in-memory output state poisoned"))?;
        Ok(f(&guard))
    }

    /// Output frame numbers received so far, in arrival order.
    pub fn frame_numbers(&self) -> PipelineResult<Vec<i64>> {
        self.with(|s| s.frames.iter().map(|f| f.output_frame_number).collect())
    }
}

/// Time driver that records every value it is given.
#[derive(Debug, Clone)]
pub struct RecordingTimeDriver {
    /// Delta times in call order.
    pub delta_times: Vec<f64>,
    /// Evaluation times in call order.
    pub eval_times: Vec<FrameTime>,
    /// Dilation reported to the pipeline.
    pub time_dilation: f64,
}

impl Default for RecordingTimeDriver {
    fn default() -> Self {
        Self {
            delta_times: Vec::new(),
            eval_times: Vec::new(),
            time_dilation: 1.0,
        }
    }
}

impl RecordingTimeDriver {
    /// Create a driver with no time dilation.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeDriver for RecordingTimeDriver {
    fn set_next_delta_time(&mut self, seconds: f64) {
        self.delta_times.push(seconds);
    }

    fn set_next_eval_time(&mut self, time: FrameTime) {
        self.eval_times.push(time);
    }

    fn world_time_dilation(&self) -> f64 {
        self.time_dilation
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/memory.rs"]
mod tests;
