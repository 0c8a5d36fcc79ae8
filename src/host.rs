//! Tick loop for hosts without an engine loop of their own (the CLI, tests, batch tools).

use tracing::{info, warn};

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::output::contract::TimeDriver;
use crate::pipeline::scheduler::Pipeline;
use crate::pipeline::state::{DebugStepConfig, PipelineState};

/// How a [`run_to_completion`] call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    /// Ticks spent, including finalize and export polling.
    pub ticks: u64,
    /// State the pipeline ended in; always `Finished`.
    pub state: PipelineState,
    /// Completed frames handed to the output containers.
    pub frames_written: u64,
    /// The tick limit was hit and the run was cut short.
    pub hit_tick_limit: bool,
    /// No error was recorded.
    pub success: bool,
}

/// Tick an initialized pipeline until it finishes.
///
/// With `max_ticks`, a run that has not finished after that many ticks is shut down as an error
/// (frames rendered so far are still written).
pub fn run_to_completion(
    pipeline: &mut Pipeline,
    driver: &mut dyn TimeDriver,
    max_ticks: Option<u64>,
) -> PipelineResult<RunSummary> {
    if pipeline.state() == PipelineState::Uninitialized {
        return Err(PipelineError::initialization(
            "pipeline must be initialized before it can run",
        ));
    }

    let mut step = DebugStepConfig::free_running();
    let mut ticks = 0u64;
    let mut hit_tick_limit = false;
    while pipeline.state() != PipelineState::Finished {
        if max_ticks.is_some_and(|max| ticks >= max) {
            warn!(ticks, "tick limit reached; shutting down");
            hit_tick_limit = true;
            pipeline.shutdown(true);
            break;
        }
        pipeline.tick(driver, &mut step);
        ticks += 1;
    }

    let summary = RunSummary {
        ticks,
        state: pipeline.state(),
        frames_written: pipeline.frames_forwarded(),
        hit_tick_limit,
        success: !pipeline.has_error(),
    };
    info!(
        ticks = summary.ticks,
        frames = summary.frames_written,
        success = summary.success,
        "run complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "../tests/unit/host.rs"]
mod tests;
