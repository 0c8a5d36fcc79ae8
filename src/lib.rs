//! Cinepipe is the frame-timing and shot-scheduling core of an offline cinematic render pipeline.
//!
//! Given a master sequence and a render job it builds an ordered shot plan, then drives a
//! tick-by-tick state machine that tells the host which exact tick to evaluate and how much time
//! passes per engine step:
//!
//! - Load a [`SequenceLibrary`] and a [`PipelineJob`]
//! - Create a [`Pipeline`] with a [`RenderSink`] and one or more [`OutputContainer`]s
//! - [`Pipeline::initialize`], then call [`Pipeline::tick`] once per engine step (or use
//!   [`run_to_completion`])
//!
//! All time math runs on exact rational ticks ([`FrameTime`]), so sub-sampled frames at
//! fractional rates stay aligned to their frame boundaries over arbitrarily long shots.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Tick, rate and range primitives plus the error taxonomy.
pub mod foundation;
/// Host-side tick loop.
pub mod host;
/// Render job description.
pub mod job;
/// Renderer and output-writer collaborators.
pub mod output;
/// Lifecycle state machine and per-tick timing.
pub mod pipeline;
/// Sequence data source and restore ledger.
pub mod sequence;
/// Typed settings, registry and resolution.
pub mod settings;
/// Shot plan model and builder.
pub mod shot;
/// Frame-constant timing math.
pub mod timing;

pub use crate::foundation::core::{FrameNumber, FrameRate, FrameTime, TickRange};
pub use crate::foundation::error::{PipelineError, PipelineResult};

pub use crate::host::{RunSummary, run_to_completion};
pub use crate::job::{PipelineJob, ShotEntry};
pub use crate::output::accumulator::OutputFrameAccumulator;
pub use crate::output::contract::{
    CompletedFrame, FrameMetadata, OutputContainer, PassReporter, RenderSink, RenderedPass,
    SampleDescriptor, ShotSetup, TimeDriver,
};
pub use crate::output::memory::{InMemoryOutput, InMemoryOutputHandle, RecordingTimeDriver};
pub use crate::output::simulated::{SimulatedFault, SimulatedRenderSink, SimulatedStats};
pub use crate::pipeline::events::{PipelineEvent, SubscriptionId};
pub use crate::pipeline::scheduler::Pipeline;
pub use crate::pipeline::state::{DebugStepConfig, OutputState, PipelineState};
pub use crate::sequence::ledger::RestoreLedger;
pub use crate::sequence::model::{Sequence, SequenceId, SequenceLibrary};
pub use crate::settings::registry::SettingsRegistry;
pub use crate::settings::resolve::PipelineConfig;
pub use crate::shot::builder::{BuildWarning, ShotBuilder, ShotPlan};
pub use crate::shot::model::{CameraCutInfo, CameraCutState, ShotInfo};
