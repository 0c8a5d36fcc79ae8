use crate::foundation::core::{FrameNumber, FrameTime};

/// Overall pipeline lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Created, not yet initialized.
    #[default]
    Uninitialized,
    /// Ticking shots and submitting samples.
    ProducingFrames,
    /// Waiting for output containers to finish writing.
    Finalize,
    /// Waiting for output containers to finish post-write steps.
    Export,
    /// Done; sequence state restored.
    Finished,
}

impl PipelineState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Uninitialized, PipelineState::ProducingFrames)
                | (PipelineState::Uninitialized, PipelineState::Finalize)
                | (PipelineState::ProducingFrames, PipelineState::Finalize)
                | (PipelineState::Finalize, PipelineState::Export)
                | (PipelineState::Export, PipelineState::Finished)
        )
    }

    /// Whether the pipeline is already draining or done.
    pub fn is_shutting_down(self) -> bool {
        matches!(
            self,
            PipelineState::Finalize | PipelineState::Export | PipelineState::Finished
        )
    }
}

/// Output descriptor cached across ticks.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct OutputState {
    /// Global output frame number; -1 before the first frame.
    pub output_frame_number: i64,
    /// Output frame number within the current shot; -1 before its first frame.
    pub shot_output_frame_number: i64,
    /// Temporal sub-sample of the most recent sample.
    pub temporal_sample_index: u32,
    /// Temporal sub-samples per frame in the current cut.
    pub temporal_sample_count: u32,
    /// Samples submitted for the current shot.
    pub shot_samples_rendered: u64,
    /// Fractional ticks not yet applied to the cursor.
    pub accumulated_sub_frame_deltas: FrameTime,
    /// Tick delta of the most recent tick.
    pub delta_frame_time: FrameTime,
    /// Wall-clock delta fed to the time driver on the most recent tick.
    pub delta_seconds: f64,
    /// Evaluation time fed to the time driver on the most recent tick.
    pub eval_time: FrameTime,
    /// Motion-blur length of the most recent sample.
    pub motion_blur_fraction: f32,
    /// Display-rate frame of the source sequence for the current frame.
    pub source_frame_number: FrameNumber,
    /// Output-rate frame of the master sequence for the current frame.
    pub effective_frame_number: FrameNumber,
    /// The current frame was sampled under time dilation.
    pub is_time_dilated: bool,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            output_frame_number: -1,
            shot_output_frame_number: -1,
            temporal_sample_index: 0,
            temporal_sample_count: 1,
            shot_samples_rendered: 0,
            accumulated_sub_frame_deltas: FrameTime::ZERO,
            delta_frame_time: FrameTime::ZERO,
            delta_seconds: 0.0,
            eval_time: FrameTime::ZERO,
            motion_blur_fraction: 0.0,
            source_frame_number: FrameNumber(0),
            effective_frame_number: FrameNumber(0),
            is_time_dilated: false,
        }
    }
}

/// Frame stepping for debugging, scoped to one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugStepConfig {
    /// `None` runs freely, `Some(0)` holds, `Some(n)` lets `n` more ticks through.
    pub frames_to_step: Option<u32>,
}

impl DebugStepConfig {
    /// Run without stepping.
    pub fn free_running() -> Self {
        Self::default()
    }

    /// Hold until stepped.
    pub fn paused() -> Self {
        Self {
            frames_to_step: Some(0),
        }
    }

    /// Let `frames` more ticks through.
    pub fn step(&mut self, frames: u32) {
        self.frames_to_step = Some(frames);
    }

    /// Consume one tick of budget; `false` means hold this tick.
    pub fn take_tick(&mut self) -> bool {
        match self.frames_to_step {
            None => true,
            Some(0) => false,
            Some(n) => {
                self.frames_to_step = Some(n - 1);
                true
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/state.rs"]
mod tests;
