use num_rational::Rational64;

use crate::foundation::core::{FrameRate, FrameTime};
use crate::foundation::error::{PipelineError, PipelineResult};

/// Shutter angles are quantized to thousandths of a degree before entering tick math.
const ANGLE_QUANTUM: i64 = 1000;

/// Where the shutter-open interval sits relative to the nominal frame tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterTiming {
    /// Shutter opens on the frame tick.
    FrameOpen,
    /// Shutter interval is centered on the frame tick.
    #[default]
    FrameCenter,
    /// Shutter closes on the frame tick.
    FrameClose,
}

/// Tick-duration constants for one shot, derived from its settings.
///
/// Pure function of `(tick resolution, output rate, shutter angle, shutter timing, temporal
/// sample count)`: computing it twice from the same inputs yields identical values. All tick
/// quantities are exact rationals in the sequence's tick resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct FrameConstantMetrics {
    /// Resolution of the master sequence ticks.
    pub tick_resolution: FrameRate,
    /// Rate at which output frames are produced.
    pub frame_rate: FrameRate,
    /// Number of temporal sub-samples per output frame (>= 1).
    pub temporal_sample_count: u32,
    /// Shutter placement relative to the frame tick.
    pub shutter_timing: ShutterTiming,
    /// Ticks covered by one output frame.
    pub ticks_per_output_frame: FrameTime,
    /// `max(angle / 360, 1 / 360)`, in `(0, 1]`.
    pub shutter_angle_percentage: Rational64,
    /// Ticks during which the shutter is open for one output frame.
    pub ticks_while_shutter_open: FrameTime,
    /// Ticks during which the shutter is closed for one output frame.
    pub ticks_while_shutter_closed: FrameTime,
    /// Ticks between two temporal sub-samples.
    pub ticks_per_sample: FrameTime,
    /// Offset applied to evaluation to honor [`ShutterTiming`].
    pub shutter_offset_ticks: FrameTime,
    /// Half a sample, so each sub-sample evaluates at the middle of its exposure.
    pub motion_blur_centering_offset_ticks: FrameTime,
}

impl FrameConstantMetrics {
    /// Compute the metrics for one shot.
    pub fn new(
        tick_resolution: FrameRate,
        frame_rate: FrameRate,
        shutter_angle: f64,
        shutter_timing: ShutterTiming,
        temporal_sample_count: u32,
    ) -> PipelineResult<Self> {
        tick_resolution.validate()?;
        frame_rate.validate()?;
        if temporal_sample_count == 0 {
            return Err(PipelineError::validation(
                "temporal sample count must be >= 1",
            ));
        }
        if !shutter_angle.is_finite() {
            return Err(PipelineError::validation("shutter angle must be finite"));
        }

        let ticks_per_output_frame =
            FrameRate::transform_time(FrameTime::ONE, frame_rate, tick_resolution);

        let quantized_angle = (shutter_angle.min(360.0) * ANGLE_QUANTUM as f64).round() as i64;
        let shutter_angle_percentage = Rational64::new(quantized_angle, 360 * ANGLE_QUANTUM)
            .max(Rational64::new(1, 360));

        let ticks_while_shutter_open = ticks_per_output_frame * shutter_angle_percentage;
        let ticks_while_shutter_closed = ticks_per_output_frame - ticks_while_shutter_open;
        let ticks_per_sample = ticks_while_shutter_open / i64::from(temporal_sample_count);

        let shutter_offset_ticks = match shutter_timing {
            ShutterTiming::FrameOpen => FrameTime::ZERO,
            ShutterTiming::FrameCenter => -(ticks_while_shutter_open / 2),
            ShutterTiming::FrameClose => -ticks_while_shutter_open,
        };
        let motion_blur_centering_offset_ticks = ticks_per_sample / 2;

        Ok(Self {
            tick_resolution,
            frame_rate,
            temporal_sample_count,
            shutter_timing,
            ticks_per_output_frame,
            shutter_angle_percentage,
            ticks_while_shutter_open,
            ticks_while_shutter_closed,
            ticks_per_sample,
            shutter_offset_ticks,
            motion_blur_centering_offset_ticks,
        })
    }

    /// Map a nominal frame tick to the time the sequence is actually evaluated at.
    ///
    /// Every sequence evaluation goes through here; the raw nominal tick is never evaluated.
    pub fn final_eval_time(&self, tick: FrameTime) -> FrameTime {
        tick + self.motion_blur_centering_offset_ticks + self.shutter_offset_ticks
    }

    /// Distance from the last sample of one output frame to the first sample of the next.
    pub fn ticks_to_end_of_previous_frame(&self) -> FrameTime {
        if self.temporal_sample_count == 1 {
            self.ticks_per_output_frame
        } else {
            self.ticks_per_sample + self.ticks_while_shutter_closed
        }
    }

    /// Motion-blur length the renderer should use for one sub-sample.
    pub fn motion_blur_fraction(&self) -> f32 {
        let fraction = self.shutter_angle_percentage
            / Rational64::from_integer(i64::from(self.temporal_sample_count));
        (*fraction.numer() as f64 / *fraction.denom() as f64) as f32
    }

    /// Motion-blur length for a discarded frame that only exposes one sample's worth of ticks.
    pub fn single_sample_motion_blur_fraction(&self) -> f32 {
        let fraction = self.ticks_per_sample.0 / self.ticks_per_output_frame.0;
        (*fraction.numer() as f64 / *fraction.denom() as f64) as f32
    }

    /// Shutter angle percentage as a float, for metadata.
    pub fn shutter_angle_fraction(&self) -> f64 {
        *self.shutter_angle_percentage.numer() as f64
            / *self.shutter_angle_percentage.denom() as f64
    }

    /// Ticks covered by `frames` output frames.
    pub fn output_frames_to_ticks(&self, frames: i64) -> FrameTime {
        self.ticks_per_output_frame * frames
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timing/metrics.rs"]
mod tests;
