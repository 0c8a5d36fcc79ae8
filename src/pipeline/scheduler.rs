//! The pipeline driver: one instance renders one job, tick by tick, on a single control thread.
//!
//! Render passes come back over a channel from whatever threads the render sink uses and are
//! folded into complete output frames at the top of each tick and whenever a shot is flushed.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::job::PipelineJob;
use crate::output::accumulator::OutputFrameAccumulator;
use crate::output::contract::{
    CompletedFrame, FrameMetadata, OutputContainer, PassReporter, RenderSink, RenderedPass,
    SampleDescriptor, ShotSetup, TimeDriver,
};
use crate::pipeline::events::{PipelineEvent, PipelineEvents, SubscriptionId};
use crate::pipeline::state::{DebugStepConfig, OutputState, PipelineState};
use crate::pipeline::timing::{
    SampleContext, TickKind, TickOutcome, begin_camera_cut, motion_blur_tick,
    prime_for_rendering, rendering_tick, sample_descriptors, sanitize_dilation, warm_up_tick,
};
use crate::sequence::ledger::{FieldValue, RestoreLedger, TrackedField};
use crate::sequence::model::{EvaluationType, SequenceId, SequenceLibrary};
use crate::settings::records::ExecutionSetting;
use crate::settings::registry::SettingsRegistry;
use crate::settings::resolve::SettingsResolver;
use crate::shot::builder::{BuildWarning, ShotBuilder};
use crate::shot::model::{CameraCutState, ShotInfo};

enum CutProgress {
    Ticked(TickOutcome),
    ShotFinished,
}

/// Drives one render job from shot planning through output finalization.
pub struct Pipeline {
    library: SequenceLibrary,
    registry: SettingsRegistry,
    ledger: RestoreLedger,
    sink: Box<dyn RenderSink>,
    containers: Vec<Box<dyn OutputContainer>>,
    accumulator: OutputFrameAccumulator,
    pass_tx: mpsc::Sender<RenderedPass>,
    pass_rx: mpsc::Receiver<RenderedPass>,
    events: PipelineEvents,

    job: Option<PipelineJob>,
    master: Option<SequenceId>,
    shots: Vec<ShotInfo>,
    warnings: Vec<BuildWarning>,
    execution: ExecutionSetting,

    state: PipelineState,
    is_transitioning: bool,
    initialized_once: bool,
    current_shot_index: usize,
    active_shot: Option<usize>,
    output: OutputState,
    shutdown_requested: bool,
    has_error: bool,
    errors: Vec<String>,
    ticking_registered: bool,
    render_started_at: Option<Instant>,
    finished_broadcast: bool,
    frames_forwarded: u64,
}

impl Pipeline {
    /// Create an uninitialized pipeline over `library`, rendering into `sink` and writing
    /// completed frames to every container in `containers`.
    pub fn new(
        library: SequenceLibrary,
        registry: SettingsRegistry,
        sink: Box<dyn RenderSink>,
        containers: Vec<Box<dyn OutputContainer>>,
    ) -> Self {
        let (pass_tx, pass_rx) = mpsc::channel();
        Self {
            library,
            registry,
            ledger: RestoreLedger::new(),
            sink,
            containers,
            accumulator: OutputFrameAccumulator::new(),
            pass_tx,
            pass_rx,
            events: PipelineEvents::default(),
            job: None,
            master: None,
            shots: Vec::new(),
            warnings: Vec::new(),
            execution: ExecutionSetting::default(),
            state: PipelineState::Uninitialized,
            is_transitioning: false,
            initialized_once: false,
            current_shot_index: 0,
            active_shot: None,
            output: OutputState::default(),
            shutdown_requested: false,
            has_error: false,
            errors: Vec::new(),
            ticking_registered: false,
            render_started_at: None,
            finished_broadcast: false,
            frames_forwarded: 0,
        }
    }

    /// Build the shot plan for `job`, lock the master sequence and start producing frames.
    ///
    /// Any failure is broadcast as an error event and shuts the pipeline down (restoring every
    /// sequence edit) before the error is returned. A pipeline instance runs at most one job.
    #[tracing::instrument(skip_all)]
    pub fn initialize(&mut self, job: Option<PipelineJob>) -> PipelineResult<()> {
        if self.initialized_once || self.state != PipelineState::Uninitialized {
            let err = PipelineError::AlreadyInitialized;
            self.record_error(&err);
            self.request_shutdown(true);
            return Err(err);
        }
        self.initialized_once = true;

        let result = match job {
            Some(job) => self.build(job),
            None => Err(PipelineError::initialization("no job was provided")),
        };
        if let Err(err) = result {
            self.record_error(&err);
            self.shutdown(true);
            return Err(err);
        }

        self.ticking_registered = true;
        self.events.emit(PipelineEvent::Initialized {
            shots: self.shots.len(),
        });
        self.transition_to_state(PipelineState::ProducingFrames);
        Ok(())
    }

    fn build(&mut self, job: PipelineJob) -> PipelineResult<()> {
        job.validate()?;
        let plan =
            ShotBuilder::new(&job, &self.registry).build(&mut self.library, &mut self.ledger)?;
        let (master_settings, _) =
            SettingsResolver::new(&self.registry, &job.config)?.resolve_master()?;
        self.execution = master_settings.execution;

        let master = plan.master;
        let playback = plan
            .shots
            .iter()
            .fold(plan.playback_range, |acc, s| acc.hull(s.total_output_range));
        self.ledger.set(
            &mut self.library,
            TrackedField::PlaybackRange(master),
            FieldValue::Range(playback),
        )?;
        self.ledger.set(
            &mut self.library,
            TrackedField::ReadOnly(master),
            FieldValue::Flag(true),
        )?;
        self.ledger.set(
            &mut self.library,
            TrackedField::PlaybackRangeLocked(master),
            FieldValue::Flag(true),
        )?;
        self.ledger.set(
            &mut self.library,
            TrackedField::EvaluationType(master),
            FieldValue::Evaluation(EvaluationType::FrameLocked),
        )?;

        let enabled: Vec<_> = plan.shots.iter().filter(|s| s.enabled).collect();
        info!(
            job = %job.name,
            shots = plan.shots.len(),
            enabled = enabled.len(),
            total_frames = enabled.iter().map(|s| s.total_output_frames()).sum::<u64>(),
            "pipeline initialized"
        );
        self.master = Some(master);
        self.shots = plan.shots;
        self.warnings = plan.warnings;
        self.job = Some(job);
        Ok(())
    }

    /// Advance the pipeline by one engine tick.
    ///
    /// While producing frames this feeds `driver` the delta time and evaluation time for the
    /// engine's next step. During finalize and export it polls the output containers once.
    pub fn tick(&mut self, driver: &mut dyn TimeDriver, debug_step: &mut DebugStepConfig) {
        if self.state == PipelineState::ProducingFrames && self.shutdown_requested {
            info!("shutdown requested; finalizing");
            self.transition_to_state(PipelineState::Finalize);
            return;
        }

        match self.state {
            PipelineState::Uninitialized | PipelineState::Finished => {}
            PipelineState::ProducingFrames => {
                if !debug_step.take_tick() {
                    driver.set_next_delta_time(0.0);
                    return;
                }
                if let Err(err) = self.tick_producing_frames(driver) {
                    self.record_error(&err);
                    self.shutdown_requested = true;
                }
            }
            PipelineState::Finalize => self.tick_finalize(false),
            PipelineState::Export => self.tick_export(false),
        }
    }

    fn tick_producing_frames(&mut self, driver: &mut dyn TimeDriver) -> PipelineResult<()> {
        self.forward_completed_frames()?;
        let dilation = sanitize_dilation(driver.world_time_dilation());

        loop {
            let Some(shot) = self.shots.get(self.current_shot_index) else {
                info!("all shots rendered");
                self.transition_to_state(PipelineState::Finalize);
                return Ok(());
            };
            if !shot.enabled {
                debug!(shot = %shot.name, "skipping disabled shot");
                self.current_shot_index += 1;
                continue;
            }
            if self.active_shot.is_none() {
                self.setup_shot(self.current_shot_index)?;
            }

            match self.tick_camera_cut(dilation) {
                CutProgress::Ticked(outcome) => return self.apply_outcome(driver, outcome),
                CutProgress::ShotFinished => {
                    self.teardown_shot()?;
                    self.current_shot_index += 1;
                }
            }
        }
    }

    fn tick_camera_cut(&mut self, dilation: f64) -> CutProgress {
        let out = &mut self.output;
        let shot = &mut self.shots[self.current_shot_index];
        loop {
            let cut_index = shot.current_camera_cut_index;
            let cut = shot.current_camera_cut_mut();
            match cut.state() {
                CameraCutState::Uninitialized => {
                    begin_camera_cut(cut, out);
                    if cut.set_next_state() == CameraCutState::Rendering {
                        prime_for_rendering(cut, out, dilation);
                    }
                    let (range, frames) = (cut.total_output_range, cut.work.total_output_frames);
                    debug!(
                        shot = %shot.name,
                        cut = cut_index,
                        start = range.start.0,
                        end = range.end.0,
                        frames,
                        "camera cut started"
                    );
                }
                CameraCutState::WarmingUp => {
                    let outcome = warm_up_tick(cut, out);
                    if cut.num_warm_up_frames_remaining == 0
                        && cut.set_next_state() == CameraCutState::Rendering
                    {
                        prime_for_rendering(cut, out, dilation);
                    }
                    return CutProgress::Ticked(outcome);
                }
                CameraCutState::MotionBlur => {
                    if !cut.has_evaluated_motion_blur_frame {
                        return CutProgress::Ticked(motion_blur_tick(cut, out));
                    }
                    prime_for_rendering(cut, out, dilation);
                    cut.set_next_state();
                }
                CameraCutState::Rendering => {
                    let outcome = rendering_tick(cut, out, dilation);
                    if outcome.kind != TickKind::CutFinished {
                        return CutProgress::Ticked(outcome);
                    }
                    cut.set_next_state();
                    let frames = cut.work.output_frames_rendered;
                    debug!(shot = %shot.name, cut = cut_index, frames, "camera cut finished");
                    if !shot.advance_camera_cut() {
                        return CutProgress::ShotFinished;
                    }
                }
                CameraCutState::Finished => {
                    unreachable!("finished camera cut {cut_index} is still current")
                }
            }
        }
    }

    fn apply_outcome(
        &mut self,
        driver: &mut dyn TimeDriver,
        outcome: TickOutcome,
    ) -> PipelineResult<()> {
        driver.set_next_delta_time(outcome.delta_seconds);
        driver.set_next_eval_time(outcome.eval_time);

        let shot_index = self.current_shot_index;
        let shot = &self.shots[shot_index];
        let cut = shot.current_camera_cut();
        let ctx = SampleContext {
            shot_index,
            camera_cut_index: shot.current_camera_cut_index,
            frame_number_offset: shot.settings.output.frame_number_offset,
        };

        let samples = match outcome.kind {
            TickKind::WarmUp { render: false } => return Ok(()),
            TickKind::WarmUp { render: true } | TickKind::MotionBlurPreroll => {
                sample_descriptors(cut, &self.output, ctx, true)
            }
            TickKind::Sample => {
                if self.output.temporal_sample_index == 0 {
                    let metadata = FrameMetadata {
                        shot_name: shot.name.clone(),
                        shot_output_frame_number: self.output.shot_output_frame_number,
                        camera_cut_index: ctx.camera_cut_index,
                        source_frame_number: self.output.source_frame_number,
                        effective_frame_number: self.output.effective_frame_number,
                        frame_number_offset: ctx.frame_number_offset,
                        is_time_dilated: self.output.is_time_dilated,
                    };
                    self.accumulator.expect(
                        self.output.output_frame_number,
                        &shot.settings.render_passes.passes,
                        metadata,
                    )?;
                }
                self.render_started_at.get_or_insert_with(Instant::now);
                sample_descriptors(cut, &self.output, ctx, false)
            }
            TickKind::CutFinished => unreachable!("finished cuts produce no samples"),
        };
        self.submit(&samples)
    }

    fn submit(&mut self, samples: &[SampleDescriptor]) -> PipelineResult<()> {
        for sample in samples {
            self.sink.submit(sample)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn setup_shot(&mut self, index: usize) -> PipelineResult<()> {
        self.solo_shot(index)?;
        let shot = &self.shots[index];
        let setup = ShotSetup {
            shot_index: index,
            shot_name: shot.name.clone(),
            passes: shot.settings.render_passes.passes.clone(),
            tiles: shot.settings.tiles(),
            spatial_sample_count: shot.settings.anti_aliasing.spatial_sample_count,
            temporal_sample_count: shot.settings.anti_aliasing.temporal_sample_count,
        };
        self.sink
            .setup_shot(&setup, PassReporter::new(self.pass_tx.clone()))?;
        self.output.shot_output_frame_number = -1;
        self.output.shot_samples_rendered = 0;
        self.active_shot = Some(index);

        info!(
            shot = %setup.shot_name,
            cuts = shot.camera_cuts.len(),
            frames = shot.total_output_frames(),
            "shot started"
        );
        self.events.emit(PipelineEvent::ShotStarted {
            index,
            name: setup.shot_name,
        });
        Ok(())
    }

    /// Deactivate every shot section of the master except the one being rendered.
    fn solo_shot(&mut self, index: usize) -> PipelineResult<()> {
        let (Some(master), Some(solo)) = (self.master, self.shots[index].section_index) else {
            return Ok(());
        };
        let sections = self
            .library
            .sequence(master)?
            .shot_track
            .as_ref()
            .map_or(0, |t| t.sections.len());
        for section in 0..sections {
            let field = TrackedField::ShotSectionActive {
                sequence: master,
                section,
            };
            self.ledger
                .set(&mut self.library, field, FieldValue::Flag(section == solo))?;
        }
        Ok(())
    }

    fn teardown_shot(&mut self) -> PipelineResult<()> {
        let Some(index) = self.active_shot.take() else {
            return Ok(());
        };
        self.sink.flush()?;
        self.forward_completed_frames()?;
        self.sink.teardown_shot()?;

        let shot = &self.shots[index];
        info!(
            shot = %shot.name,
            frames = shot.output_frames_rendered(),
            samples = self.output.shot_samples_rendered,
            "shot finished"
        );
        self.events.emit(PipelineEvent::ShotFinished {
            index,
            name: shot.name.clone(),
        });
        Ok(())
    }

    /// Fold every reported pass into the accumulator and forward frames that are ready in order.
    fn forward_completed_frames(&mut self) -> PipelineResult<()> {
        while let Ok(pass) = self.pass_rx.try_recv() {
            self.accumulator.receive(pass)?;
        }
        let frames = self.accumulator.drain_ready();
        self.write_frames(frames)
    }

    fn write_frames(&mut self, frames: Vec<CompletedFrame>) -> PipelineResult<()> {
        for frame in frames {
            debug!(frame = frame.output_frame_number, "output frame complete");
            for container in &mut self.containers {
                container.on_receive_frame(frame.clone())?;
            }
            self.frames_forwarded += 1;
        }
        Ok(())
    }

    fn transition_to_state(&mut self, next: PipelineState) {
        if self.is_transitioning {
            debug!(from = ?self.state, to = ?next, "ignoring transition requested mid-transition");
            return;
        }
        assert!(
            self.state.can_transition_to(next),
            "invalid pipeline transition {:?} -> {:?}",
            self.state,
            next
        );
        self.is_transitioning = true;
        let from = self.state;
        self.state = next;
        info!(?from, to = ?next, "pipeline state changed");
        self.events.emit(PipelineEvent::StateChanged { from, to: next });

        match next {
            PipelineState::Finalize => self.enter_finalize(),
            PipelineState::Export => self.enter_export(),
            PipelineState::Finished => self.enter_finished(),
            PipelineState::Uninitialized | PipelineState::ProducingFrames => {}
        }
        self.is_transitioning = false;
    }

    fn enter_finalize(&mut self) {
        self.shutdown_requested = false;
        if let Err(err) = self.teardown_shot() {
            self.record_error(&err);
        }
        if let Err(err) = self.forward_completed_frames() {
            self.record_error(&err);
        }
        let remaining = self.accumulator.drain_remaining();
        if let Err(err) = self.write_frames(remaining) {
            self.record_error(&err);
        }
        let outstanding = self.accumulator.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "output frames never received all of their passes");
        }

        let mut failures = Vec::new();
        for container in &mut self.containers {
            if let Err(err) = container.begin_finalize() {
                failures.push(err);
            }
        }
        for err in failures {
            self.record_error(&err);
        }
    }

    fn enter_export(&mut self) {
        let mut failures = Vec::new();
        for container in &mut self.containers {
            if let Err(err) = container.begin_export() {
                failures.push(err);
            }
        }
        for err in failures {
            self.record_error(&err);
        }
    }

    fn enter_finished(&mut self) {
        match self.ledger.restore_all(&mut self.library) {
            Ok(restored) => debug!(restored, "sequence edits reverted"),
            Err(err) => self.record_error(&err),
        }
        self.ticking_registered = false;
        if !self.finished_broadcast {
            self.finished_broadcast = true;
            let success = !self.has_error;
            info!(success, frames = self.frames_forwarded, "pipeline finished");
            self.events.emit(PipelineEvent::Finished { success });
        }
    }

    fn tick_finalize(&mut self, force: bool) {
        if self.poll_containers(force, "finalize", |c| c.has_finished_processing()) {
            self.transition_to_state(PipelineState::Export);
        }
    }

    fn tick_export(&mut self, force: bool) {
        if self.poll_containers(force, "export", |c| c.has_finished_exporting()) {
            self.transition_to_state(PipelineState::Finished);
        }
    }

    /// Poll every container once, or until all are done when `force` is set.
    ///
    /// A forced poll gives up after `execution.finalize_timeout_ms` when one is configured.
    fn poll_containers(
        &mut self,
        force: bool,
        phase: &'static str,
        done: fn(&mut dyn OutputContainer) -> bool,
    ) -> bool {
        let deadline = self
            .execution
            .finalize_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let interval = Duration::from_millis(self.execution.finalize_poll_interval_ms);
        loop {
            let mut all_done = true;
            for container in &mut self.containers {
                all_done &= done(container.as_mut());
            }
            if all_done {
                return true;
            }
            if !force {
                return false;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                error!(phase, "output containers did not finish in time; continuing shutdown");
                let err =
                    PipelineError::sink(format!("output containers timed out during {phase}"));
                self.record_error(&err);
                return true;
            }
            std::thread::sleep(interval);
        }
    }

    /// Ask the pipeline to stop after the current tick.
    ///
    /// Frames already rendered are still flushed to the output containers. Requests made while
    /// the pipeline is already finalizing or exporting are ignored.
    pub fn request_shutdown(&mut self, is_error: bool) {
        if is_error {
            self.has_error = true;
        }
        match self.state {
            PipelineState::Uninitialized => {
                info!(is_error, "shutdown requested before initialization");
                self.transition_to_state(PipelineState::Finalize);
            }
            PipelineState::ProducingFrames => {
                info!(is_error, "shutdown requested");
                self.shutdown_requested = true;
            }
            PipelineState::Finalize | PipelineState::Export | PipelineState::Finished => {
                debug!(state = ?self.state, "shutdown already in progress");
            }
        }
    }

    /// Stop now, blocking until every output container has finished finalizing and exporting.
    pub fn shutdown(&mut self, is_error: bool) {
        if is_error {
            self.has_error = true;
        }
        if matches!(
            self.state,
            PipelineState::Uninitialized | PipelineState::ProducingFrames
        ) {
            info!(is_error, "forced shutdown");
            self.transition_to_state(PipelineState::Finalize);
        }
        if self.state == PipelineState::Finalize {
            self.tick_finalize(true);
        }
        if self.state == PipelineState::Export {
            self.tick_export(true);
        }
    }

    fn record_error(&mut self, err: &PipelineError) {
        let fatal = !self.state.is_shutting_down();
        error!(error = %err, fatal, "pipeline error");
        self.has_error = true;
        self.errors.push(err.to_string());
        self.events.emit(PipelineEvent::Error {
            message: err.to_string(),
            fatal,
        });
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Planned shots, with their cursors and progress.
    pub fn shots(&self) -> &[ShotInfo] {
        &self.shots
    }

    /// Index of the shot being rendered, or `shots().len()` once all are done.
    pub fn current_shot_index(&self) -> usize {
        self.current_shot_index
    }

    /// Output state of the most recent tick.
    pub fn output_state(&self) -> &OutputState {
        &self.output
    }

    /// The job this pipeline runs, once initialized.
    pub fn job(&self) -> Option<&PipelineJob> {
        self.job.as_ref()
    }

    /// The master sequence, once initialized.
    pub fn master(&self) -> Option<SequenceId> {
        self.master
    }

    /// Sequences, including any edits the run has not reverted yet.
    pub fn library(&self) -> &SequenceLibrary {
        &self.library
    }

    /// Give the sequences back. Only meaningful once the run has finished.
    pub fn into_library(self) -> SequenceLibrary {
        self.library
    }

    /// Sequence edits that will be reverted when the run finishes.
    pub fn ledger(&self) -> &RestoreLedger {
        &self.ledger
    }

    /// Warnings raised while planning.
    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Whether the run failed or was shut down because of an error.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Whether the host should keep ticking the pipeline.
    pub fn is_ticking_registered(&self) -> bool {
        self.ticking_registered
    }

    /// Completed frames handed to the output containers.
    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded
    }

    /// Rendered output frames over total output frames of enabled shots, in `[0, 1]`.
    pub fn completion_percentage(&self) -> f64 {
        let (rendered, total) = self
            .shots
            .iter()
            .filter(|s| s.enabled)
            .fold((0u64, 0u64), |(r, t), s| {
                (r + s.output_frames_rendered(), t + s.total_output_frames())
            });
        if total == 0 {
            0.0
        } else {
            (rendered as f64 / total as f64).min(1.0)
        }
    }

    /// Wall-clock estimate for the remaining frames, based on the pace since the first sample.
    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        let started = self.render_started_at?;
        let done = self.completion_percentage();
        if done <= 0.0 {
            return None;
        }
        let elapsed = started.elapsed().as_secs_f64();
        Some(Duration::from_secs_f64(elapsed * (1.0 - done) / done))
    }

    /// Register an observer for pipeline events.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&PipelineEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    /// Remove an observer. Returns `false` when `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/scheduler.rs"]
mod tests;
