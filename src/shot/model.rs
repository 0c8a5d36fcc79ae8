use crate::foundation::core::{FrameNumber, FrameRate, FrameTime, TickRange};
use crate::sequence::model::{SectionTransform, SequenceId};
use crate::settings::resolve::ResolvedShotSettings;
use crate::timing::metrics::FrameConstantMetrics;

/// Lifecycle of one camera cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraCutState {
    /// Not started.
    #[default]
    Uninitialized,
    /// Running engine warm-up ticks; no frames are produced.
    WarmingUp,
    /// Evaluating the single discarded frame that seeds motion history.
    MotionBlur,
    /// Producing samples.
    Rendering,
    /// Done.
    Finished,
}

/// Progress counters of one camera cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkMetrics {
    /// Output frames the cut will produce.
    pub total_output_frames: u64,
    /// Output frames whose samples have all been submitted.
    pub output_frames_rendered: u64,
    /// Temporal samples per frame times frames.
    pub total_samples: u64,
    /// Temporal samples submitted so far.
    pub samples_rendered: u64,
    /// Warm-up ticks the cut starts with.
    pub warm_up_frames_total: u32,
    /// Warm-up ticks already run.
    pub warm_up_frames_done: u32,
}

/// Where a cut's samples map to in the sequence that authored them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SourceTiming {
    /// Master ticks to source ticks.
    pub transform: SectionTransform,
    /// Tick resolution of the source sequence.
    pub tick_resolution: FrameRate,
    /// Display rate of the source sequence.
    pub display_rate: FrameRate,
}

impl SourceTiming {
    /// Display-rate frame of the source sequence at master tick `tick`, rounded to nearest.
    pub fn source_frame(&self, tick: FrameTime) -> FrameNumber {
        let inner = self.transform.to_inner(tick);
        FrameRate::transform_time(inner, self.tick_resolution, self.display_rate).round_to_frame()
    }
}

/// One contiguous camera cut of a shot, plus its mutable render cursor.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CameraCutInfo {
    /// Range before handle expansion, in master ticks.
    pub original_range: TickRange,
    /// Range actually rendered, in master ticks.
    pub total_output_range: TickRange,
    /// Camera binding of the cut section, if any.
    pub camera: Option<String>,
    /// Temporal sub-samples per output frame.
    pub num_temporal_samples: u32,
    /// Spatial samples per temporal sample.
    pub num_spatial_samples: u32,
    /// Tiles along x and y.
    pub num_tiles: (u32, u32),
    /// Timing constants for this cut.
    pub metrics: FrameConstantMetrics,
    /// Mapping to source frame numbers.
    pub source: SourceTiming,
    /// Warm-up ticks before the first sample.
    pub num_warm_up_frames: u32,
    /// Submit discarded samples while warming up.
    pub render_warm_up_frames: bool,
    /// Run the motion-blur pre-roll before rendering.
    pub fix_first_frame_motion_blur: bool,
    /// Nominal master tick of the most recent sample.
    pub current_tick: FrameNumber,
    /// Warm-up ticks still to run.
    pub num_warm_up_frames_remaining: u32,
    /// Whether the motion-blur pre-roll frame has been evaluated.
    pub has_evaluated_motion_blur_frame: bool,
    /// Progress counters.
    pub work: WorkMetrics,
    state: CameraCutState,
}

impl CameraCutInfo {
    /// Create a cut in [`CameraCutState::Uninitialized`].
    pub fn new(
        original_range: TickRange,
        camera: Option<String>,
        settings: &ResolvedShotSettings,
        metrics: FrameConstantMetrics,
        source: SourceTiming,
    ) -> Self {
        Self {
            original_range,
            total_output_range: original_range,
            camera,
            num_temporal_samples: settings.anti_aliasing.temporal_sample_count,
            num_spatial_samples: settings.anti_aliasing.spatial_sample_count,
            num_tiles: settings.tiles(),
            metrics,
            source,
            num_warm_up_frames: settings.anti_aliasing.engine_warm_up_count,
            render_warm_up_frames: settings.anti_aliasing.render_warm_up_frames,
            fix_first_frame_motion_blur: settings.camera.fix_first_frame_motion_blur,
            current_tick: original_range.start,
            num_warm_up_frames_remaining: 0,
            has_evaluated_motion_blur_frame: false,
            work: WorkMetrics::default(),
            state: CameraCutState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CameraCutState {
        self.state
    }

    /// Output frames covered by `total_output_range`, rounding a partial frame up.
    pub fn output_frame_count(&self) -> u64 {
        let frames = FrameTime::from_frame(FrameNumber(self.total_output_range.len()))
            .0
            / self.metrics.ticks_per_output_frame.0;
        u64::try_from(frames.ceil().to_integer()).unwrap_or(0)
    }

    /// Whether the motion-blur pre-roll still has to run.
    pub fn needs_motion_blur_fix(&self) -> bool {
        self.fix_first_frame_motion_blur && !self.has_evaluated_motion_blur_frame
    }

    /// Reset the cursor and counters before the cut starts.
    pub fn prepare(&mut self) {
        self.current_tick = self.total_output_range.start;
        self.num_warm_up_frames_remaining = self.num_warm_up_frames;
        self.has_evaluated_motion_blur_frame = false;
        let frames = self.output_frame_count();
        self.work = WorkMetrics {
            total_output_frames: frames,
            total_samples: frames * u64::from(self.num_temporal_samples),
            warm_up_frames_total: self.num_warm_up_frames,
            ..WorkMetrics::default()
        };
    }

    /// State the cut moves to from its current one.
    ///
    /// Panics from `Finished`, and from `WarmingUp` while warm-up ticks remain.
    pub fn next_state(&self) -> CameraCutState {
        match self.state {
            CameraCutState::Uninitialized if self.num_warm_up_frames_remaining > 0 => {
                CameraCutState::WarmingUp
            }
            CameraCutState::Uninitialized | CameraCutState::WarmingUp => {
                assert!(
                    self.num_warm_up_frames_remaining == 0,
                    "camera cut left warm-up with {} ticks remaining",
                    self.num_warm_up_frames_remaining
                );
                if self.needs_motion_blur_fix() {
                    CameraCutState::MotionBlur
                } else {
                    CameraCutState::Rendering
                }
            }
            CameraCutState::MotionBlur => CameraCutState::Rendering,
            CameraCutState::Rendering => CameraCutState::Finished,
            CameraCutState::Finished => panic!("finished camera cut has no next state"),
        }
    }

    /// Advance to [`CameraCutInfo::next_state`] and return it.
    pub fn set_next_state(&mut self) -> CameraCutState {
        self.state = self.next_state();
        self.state
    }
}

/// One shot of the plan: a contiguous range of the master sequence made of camera cuts.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ShotInfo {
    /// Shot name (outer section name, or the master name for a whole-sequence shot).
    pub name: String,
    /// Index of the section on the master shot track, if the shot came from one.
    pub section_index: Option<usize>,
    /// Inner sequence the shot wraps, if any.
    pub inner_sequence: Option<SequenceId>,
    /// Disabled shots are planned but not rendered.
    pub enabled: bool,
    /// Range before handle expansion, in master ticks.
    pub original_range: TickRange,
    /// Range including handles, in master ticks.
    pub total_output_range: TickRange,
    /// Leading handle range.
    pub handle_frame_range_start: TickRange,
    /// Trailing handle range.
    pub handle_frame_range_end: TickRange,
    /// Handle frames on each side.
    pub handle_frame_count: u32,
    /// Whether the job carried an override entry for the shot.
    pub has_override: bool,
    /// Resolved settings.
    pub settings: ResolvedShotSettings,
    /// Cuts sorted by range start.
    pub camera_cuts: Vec<CameraCutInfo>,
    /// Index of the cut being rendered.
    pub current_camera_cut_index: usize,
}

impl ShotInfo {
    /// The cut being rendered. Panics when the index is past the end.
    pub fn current_camera_cut(&self) -> &CameraCutInfo {
        &self.camera_cuts[self.current_camera_cut_index]
    }

    /// Mutable access to the cut being rendered. Panics when the index is past the end.
    pub fn current_camera_cut_mut(&mut self) -> &mut CameraCutInfo {
        &mut self.camera_cuts[self.current_camera_cut_index]
    }

    /// Move to the next cut. Returns `false` when the current cut was the last one.
    pub fn advance_camera_cut(&mut self) -> bool {
        assert!(
            self.current_camera_cut_index < self.camera_cuts.len(),
            "camera cut index {} past {} cuts",
            self.current_camera_cut_index,
            self.camera_cuts.len()
        );
        if self.current_camera_cut_index + 1 < self.camera_cuts.len() {
            self.current_camera_cut_index += 1;
            true
        } else {
            false
        }
    }

    /// Whether every cut has finished.
    pub fn is_finished(&self) -> bool {
        self.camera_cuts
            .iter()
            .all(|c| c.state() == CameraCutState::Finished)
    }

    /// Output frames over all cuts.
    pub fn total_output_frames(&self) -> u64 {
        self.camera_cuts.iter().map(|c| c.output_frame_count()).sum()
    }

    /// Output frames rendered over all cuts.
    pub fn output_frames_rendered(&self) -> u64 {
        self.camera_cuts
            .iter()
            .map(|c| c.work.output_frames_rendered)
            .sum()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/shot/model.rs"]
mod tests;
