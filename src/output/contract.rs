use std::collections::BTreeMap;
use std::sync::mpsc;

use crate::foundation::core::{FrameNumber, FrameTime};
use crate::foundation::error::{PipelineError, PipelineResult};

/// Everything a renderer needs to produce one sample.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SampleDescriptor {
    /// Index of the shot in the plan.
    pub shot_index: usize,
    /// Index of the camera cut within the shot.
    pub camera_cut_index: usize,
    /// Global output frame number (0-based across the run).
    pub output_frame_number: i64,
    /// Output frame number within the shot.
    pub shot_output_frame_number: i64,
    /// Temporal sub-sample index.
    pub temporal_sample_index: u32,
    /// Temporal sub-samples per frame.
    pub temporal_sample_count: u32,
    /// Spatial sample index.
    pub spatial_sample_index: u32,
    /// Spatial samples per temporal sample.
    pub spatial_sample_count: u32,
    /// Tile index along x and y.
    pub tile_index: (u32, u32),
    /// Tiles along x and y.
    pub tile_count: (u32, u32),
    /// Motion-blur length to render with, as a fraction of a full frame.
    pub motion_blur_fraction: f32,
    /// Render for history only; nothing is reported for discarded samples.
    pub discard: bool,
    /// Master tick the sequence was evaluated at.
    pub eval_time: FrameTime,
    /// Sub-pixel jitter in `[-0.5, 0.5)`.
    pub jitter: (f32, f32),
    /// Display-rate frame of the source sequence.
    pub source_frame_number: FrameNumber,
    /// Output-rate frame of the master sequence.
    pub effective_frame_number: FrameNumber,
    /// Offset added to frame numbers for file naming.
    pub frame_number_offset: i64,
    /// The world ran with a time dilation while this sample was taken.
    pub is_time_dilated: bool,
}

impl SampleDescriptor {
    /// Whether this is the last sample the renderer receives for its output frame.
    pub fn is_last_sample_of_frame(&self) -> bool {
        self.temporal_sample_index + 1 == self.temporal_sample_count
            && self.spatial_sample_index + 1 == self.spatial_sample_count
            && self.tile_index.0 + 1 == self.tile_count.0
            && self.tile_index.1 + 1 == self.tile_count.1
    }
}

/// One finished render pass of one output frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RenderedPass {
    /// Output frame the pass belongs to.
    pub output_frame_number: i64,
    /// Pass name.
    pub pass: String,
    /// Samples accumulated into the pass.
    pub sample_count: u32,
    /// Opaque image payload.
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Per-frame metadata captured when a frame is queued.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FrameMetadata {
    /// Shot name.
    pub shot_name: String,
    /// Output frame number within the shot.
    pub shot_output_frame_number: i64,
    /// Camera cut index within the shot.
    pub camera_cut_index: usize,
    /// Display-rate frame of the source sequence.
    pub source_frame_number: FrameNumber,
    /// Output-rate frame of the master sequence.
    pub effective_frame_number: FrameNumber,
    /// Offset added to frame numbers for file naming.
    pub frame_number_offset: i64,
    /// The frame was rendered under time dilation.
    pub is_time_dilated: bool,
}

/// An output frame with every expected pass present.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompletedFrame {
    /// Global output frame number.
    pub output_frame_number: i64,
    /// Metadata captured at queue time.
    pub metadata: FrameMetadata,
    /// Passes by name.
    pub passes: BTreeMap<String, RenderedPass>,
}

/// Cloneable handle renderers use to hand finished passes back to the pipeline.
///
/// Reports may come from any thread; the pipeline drains them on its control thread.
#[derive(Clone, Debug)]
pub struct PassReporter {
    tx: mpsc::Sender<RenderedPass>,
}

impl PassReporter {
    /// Wrap the sending half of the pipeline's pass channel.
    pub fn new(tx: mpsc::Sender<RenderedPass>) -> Self {
        Self { tx }
    }

    /// Report one finished pass.
    pub fn report(&self, pass: RenderedPass) -> PipelineResult<()> {
        self.tx
            .send(pass)
            .map_err(|_| PipelineError::sink("pipeline is no longer accepting render passes"))
    }
}

/// What a render sink needs to know when a shot starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotSetup {
    /// Index of the shot in the plan.
    pub shot_index: usize,
    /// Shot name.
    pub shot_name: String,
    /// Passes to report per output frame.
    pub passes: Vec<String>,
    /// Tiles along x and y.
    pub tiles: (u32, u32),
    /// Spatial samples per temporal sample.
    pub spatial_sample_count: u32,
    /// Temporal samples per output frame.
    pub temporal_sample_count: u32,
}

/// Time source driven by the pipeline.
///
/// Each tick the pipeline sets the delta time and evaluation time the driver must apply on its
/// next step.
pub trait TimeDriver {
    /// Wall-clock seconds the next engine step should advance.
    fn set_next_delta_time(&mut self, seconds: f64);
    /// Master tick the playback system should evaluate on the next step.
    fn set_next_eval_time(&mut self, time: FrameTime);
    /// Current world time dilation.
    fn world_time_dilation(&self) -> f64 {
        1.0
    }
}

/// Renderer that consumes samples.
///
/// For every non-discarded output frame the sink must eventually report one [`RenderedPass`] per
/// pass listed in [`ShotSetup::passes`].
pub trait RenderSink: Send {
    /// Allocate per-shot resources.
    fn setup_shot(&mut self, setup: &ShotSetup, reporter: PassReporter) -> PipelineResult<()>;
    /// Queue one sample.
    fn submit(&mut self, sample: &SampleDescriptor) -> PipelineResult<()>;
    /// Block until every submitted sample has been rendered and reported.
    fn flush(&mut self) -> PipelineResult<()>;
    /// Release per-shot resources. Called only after [`RenderSink::flush`].
    fn teardown_shot(&mut self) -> PipelineResult<()>;
}

/// Consumer of completed frames (file writers, encoders).
pub trait OutputContainer: Send {
    /// Name used in logs.
    fn name(&self) -> &str;
    /// Receive one completed frame. Frames arrive in output-frame order.
    fn on_receive_frame(&mut self, frame: CompletedFrame) -> PipelineResult<()>;
    /// No more frames will arrive.
    fn begin_finalize(&mut self) -> PipelineResult<()>;
    /// Whether all received frames have been written.
    fn has_finished_processing(&mut self) -> bool;
    /// Start post-write steps.
    fn begin_export(&mut self) -> PipelineResult<()> {
        Ok(())
    }
    /// Whether post-write steps are done.
    fn has_finished_exporting(&mut self) -> bool {
        true
    }
}
