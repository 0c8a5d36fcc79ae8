//! Per-tick frame timing for one camera cut.
//!
//! The cut cursor (`CameraCutInfo::current_tick`) holds the nominal whole tick of the most recent
//! sample. The exact position is the cursor plus `OutputState::accumulated_sub_frame_deltas`;
//! fractional ticks are banked there and folded back into the cursor only on the first temporal
//! sample of an output frame, so samples within one frame stay evenly spaced.

use tracing::{trace, warn};

use crate::foundation::core::{FrameRate, FrameTime};
use crate::output::contract::SampleDescriptor;
use crate::pipeline::state::OutputState;
use crate::shot::model::CameraCutInfo;
use crate::timing::jitter::sample_jitter;

/// Dilation within this distance of 1.0 counts as undilated.
const DILATION_EPSILON: f64 = 1e-4;

/// What one tick of a camera cut produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickKind {
    /// Engine warm-up; `render` asks for a discarded sample.
    WarmUp {
        /// Submit a discarded sample this tick.
        render: bool,
    },
    /// The discarded motion-blur pre-roll frame.
    MotionBlurPreroll,
    /// A regular sample.
    Sample,
    /// The cut reached its end; no sample was produced.
    CutFinished,
}

/// Values to feed the time driver, plus what kind of tick this was.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    /// Wall-clock seconds for the next engine step.
    pub delta_seconds: f64,
    /// Master tick to evaluate on the next engine step.
    pub eval_time: FrameTime,
    /// Kind of tick.
    pub kind: TickKind,
}

/// Identifies where a sample belongs, for descriptor building.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleContext {
    /// Shot index in the plan.
    pub shot_index: usize,
    /// Cut index within the shot.
    pub camera_cut_index: usize,
    /// Offset added to frame numbers for file naming.
    pub frame_number_offset: i64,
}

/// Reset the cut cursor and sample bookkeeping before the cut's first tick.
pub fn begin_camera_cut(cut: &mut CameraCutInfo, out: &mut OutputState) {
    cut.prepare();
    out.temporal_sample_count = cut.num_temporal_samples;
    out.temporal_sample_index = cut.num_temporal_samples - 1;
    out.accumulated_sub_frame_deltas = FrameTime::ZERO;
    out.is_time_dilated = false;
}

/// Slowest world time dilation honored. Must stay above the quantum of [`FrameTime::scaled`].
pub const MIN_WORLD_DILATION: f64 = 1e-4;

/// Fastest world time dilation honored.
pub const MAX_WORLD_DILATION: f64 = 20.0;

/// Replace unusable dilation values with 1 and clamp the rest to
/// [`MIN_WORLD_DILATION`]`..=`[`MAX_WORLD_DILATION`].
pub fn sanitize_dilation(dilation: f64) -> f64 {
    if !dilation.is_finite() || dilation <= 0.0 {
        warn!(dilation, "ignoring unusable world time dilation");
        return 1.0;
    }
    let clamped = dilation.clamp(MIN_WORLD_DILATION, MAX_WORLD_DILATION);
    if clamped != dilation {
        warn!(dilation, clamped, "world time dilation out of range");
    }
    clamped
}

fn is_dilated(dilation: f64) -> bool {
    (dilation - 1.0).abs() > DILATION_EPSILON
}

/// Step the cursor back by one inter-frame gap so the next sample wraps to temporal index 0
/// exactly on the cut start.
pub fn prime_for_rendering(cut: &mut CameraCutInfo, out: &mut OutputState, dilation: f64) {
    let mut back = cut.metrics.ticks_to_end_of_previous_frame();
    if is_dilated(dilation) {
        back = back.scaled(dilation);
    }
    cut.current_tick = cut.total_output_range.start - back.frame_number().0;
    out.accumulated_sub_frame_deltas -= back.sub_frame();
    out.temporal_sample_index = cut.num_temporal_samples - 1;
}

/// One engine warm-up tick: time passes, the sequence holds at the cut start.
pub fn warm_up_tick(cut: &mut CameraCutInfo, out: &mut OutputState) -> TickOutcome {
    assert!(
        cut.num_warm_up_frames_remaining > 0,
        "warm-up tick with no warm-up frames remaining"
    );
    cut.num_warm_up_frames_remaining -= 1;
    cut.work.warm_up_frames_done += 1;
    let eval_time = cut
        .metrics
        .final_eval_time(cut.total_output_range.start.into());
    out.eval_time = eval_time;
    out.motion_blur_fraction = cut.metrics.motion_blur_fraction();
    TickOutcome {
        delta_seconds: cut.metrics.frame_rate.as_interval(),
        eval_time,
        kind: TickKind::WarmUp {
            render: cut.render_warm_up_frames,
        },
    }
}

/// The motion-blur pre-roll tick.
///
/// Evaluates one tick before the cut start with only one sample's worth of exposure, then jumps
/// the cursor forward a frame so it sits on the cut start.
pub fn motion_blur_tick(cut: &mut CameraCutInfo, out: &mut OutputState) -> TickOutcome {
    let metrics = cut.metrics;
    let start = FrameTime::from_frame(cut.total_output_range.start);
    let preroll = start - metrics.ticks_per_output_frame;
    let eval_time =
        metrics.final_eval_time(preroll + metrics.ticks_per_output_frame - FrameTime::ONE);

    cut.current_tick = cut.total_output_range.start;
    out.accumulated_sub_frame_deltas = FrameTime::ZERO;
    out.motion_blur_fraction = metrics.single_sample_motion_blur_fraction();
    out.eval_time = eval_time;
    cut.has_evaluated_motion_blur_frame = true;

    TickOutcome {
        delta_seconds: metrics
            .tick_resolution
            .as_seconds(metrics.ticks_per_output_frame),
        eval_time,
        kind: TickKind::MotionBlurPreroll,
    }
}

/// One steady-state rendering tick.
///
/// Advances the temporal sample index and the cursor; returns [`TickKind::CutFinished`] instead
/// of a sample when a new frame would start at or past the end of the cut.
pub fn rendering_tick(
    cut: &mut CameraCutInfo,
    out: &mut OutputState,
    dilation: f64,
) -> TickOutcome {
    let metrics = cut.metrics;
    let count = cut.num_temporal_samples;

    out.temporal_sample_index = if out.temporal_sample_index + 1 >= count {
        0
    } else {
        out.temporal_sample_index + 1
    };
    let first = out.temporal_sample_index == 0;

    let mut delta = if count == 1 {
        metrics.ticks_per_output_frame
    } else if first {
        metrics.ticks_while_shutter_closed + metrics.ticks_per_sample
    } else {
        metrics.ticks_per_sample
    };
    let dilated = is_dilated(dilation);
    if dilated {
        delta = delta.scaled(dilation);
    }
    out.is_time_dilated = if first {
        dilated
    } else {
        out.is_time_dilated || dilated
    };

    // Whole ticks owed from earlier samples go out before this delta's own fraction is banked.
    let mut advance = delta.frame_number().0;
    if first {
        while out.accumulated_sub_frame_deltas >= FrameTime::ONE {
            out.accumulated_sub_frame_deltas -= FrameTime::ONE;
            advance += 1;
        }
    }
    out.accumulated_sub_frame_deltas += delta.sub_frame();
    cut.current_tick += advance;

    let delta_seconds = metrics.tick_resolution.as_seconds(delta);
    let eval_time = metrics.final_eval_time(cut.current_tick.into());
    out.delta_frame_time = delta;
    out.delta_seconds = delta_seconds;
    out.eval_time = eval_time;

    let position = FrameTime::from_frame(cut.current_tick) + out.accumulated_sub_frame_deltas;
    if first && position >= FrameTime::from_frame(cut.total_output_range.end) {
        trace!(tick = cut.current_tick.0, "camera cut reached its end");
        return TickOutcome {
            delta_seconds,
            eval_time,
            kind: TickKind::CutFinished,
        };
    }

    out.motion_blur_fraction = metrics.motion_blur_fraction();
    let centered = FrameTime::from_frame(cut.current_tick)
        - FrameTime::from_frame(metrics.ticks_per_sample.round_to_frame())
            * i64::from(out.temporal_sample_index);
    out.source_frame_number = cut.source.source_frame(centered);
    out.effective_frame_number =
        FrameRate::transform_time(centered, metrics.tick_resolution, metrics.frame_rate)
            .round_to_frame();

    if first {
        out.output_frame_number += 1;
        out.shot_output_frame_number += 1;
    }
    out.shot_samples_rendered += 1;
    cut.work.samples_rendered += 1;
    if out.temporal_sample_index + 1 == count {
        cut.work.output_frames_rendered += 1;
    }

    TickOutcome {
        delta_seconds,
        eval_time,
        kind: TickKind::Sample,
    }
}

/// Descriptors for every tile and spatial sample of the current temporal sample.
pub fn sample_descriptors(
    cut: &CameraCutInfo,
    out: &OutputState,
    ctx: SampleContext,
    discard: bool,
) -> Vec<SampleDescriptor> {
    let (tiles_x, tiles_y) = cut.num_tiles;
    let spatial = cut.num_spatial_samples;
    let mut samples = Vec::with_capacity((tiles_x * tiles_y * spatial) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            for si in 0..spatial {
                samples.push(SampleDescriptor {
                    shot_index: ctx.shot_index,
                    camera_cut_index: ctx.camera_cut_index,
                    output_frame_number: out.output_frame_number,
                    shot_output_frame_number: out.shot_output_frame_number,
                    temporal_sample_index: out.temporal_sample_index,
                    temporal_sample_count: cut.num_temporal_samples,
                    spatial_sample_index: si,
                    spatial_sample_count: spatial,
                    tile_index: (tx, ty),
                    tile_count: (tiles_x, tiles_y),
                    motion_blur_fraction: out.motion_blur_fraction,
                    discard,
                    eval_time: out.eval_time,
                    jitter: sample_jitter(
                        out.output_frame_number,
                        out.temporal_sample_index,
                        cut.num_temporal_samples,
                        si,
                        spatial,
                    ),
                    source_frame_number: out.source_frame_number,
                    effective_frame_number: out.effective_frame_number,
                    frame_number_offset: ctx.frame_number_offset,
                    is_time_dilated: out.is_time_dilated,
                });
            }
        }
    }
    samples
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/timing.rs"]
mod tests;
