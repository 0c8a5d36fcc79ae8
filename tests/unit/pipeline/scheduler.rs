use std::sync::{Arc, Mutex};

use super::*;
use crate::foundation::core::{FrameNumber, FrameTime, TickRange};
use crate::output::memory::{InMemoryOutput, InMemoryOutputHandle, RecordingTimeDriver};
use crate::output::simulated::{SimulatedFault, SimulatedRenderSink, SimulatedStatsHandle};

const SINGLE: &str = r#"{
  "sequences": [{
    "name": "master",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 4000 }
  }]
}"#;

const TWO_SHOTS: &str = r#"{
  "sequences": [{
    "name": "master",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 6000 },
    "shot_track": { "sections": [
      { "name": "sh010", "range": { "start": 0, "end": 3000 }, "sequence": "inner" },
      { "name": "sh020", "range": { "start": 3000, "end": 6000 }, "sequence": "inner" }
    ]}
  }, {
    "name": "inner",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 3000 }
  }]
}"#;

const NO_WARM_UP: &str = r#"{ "kind": "anti_aliasing", "engine_warm_up_count": 0 }"#;

fn job(settings: &[&str]) -> PipelineJob {
    PipelineJob::from_json_str(&format!(
        r#"{{ "name": "test", "sequence": "master", "config": {{ "settings": [{}] }} }}"#,
        settings.join(",")
    ))
    .unwrap()
}

struct Harness {
    pipeline: Pipeline,
    output: InMemoryOutputHandle,
    stats: SimulatedStatsHandle,
    events: Arc<Mutex<Vec<PipelineEvent>>>,
    driver: RecordingTimeDriver,
}

fn harness(library: &str, fault: SimulatedFault) -> Harness {
    let sink = SimulatedRenderSink::with_fault(fault);
    let stats = sink.stats_handle();
    let memory = InMemoryOutput::new("memory");
    let output = memory.handle();
    let mut pipeline = Pipeline::new(
        SequenceLibrary::from_json_str(library).unwrap(),
        SettingsRegistry::builtin(),
        Box::new(sink),
        vec![Box::new(memory)],
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    pipeline.subscribe(move |e| log.lock().unwrap().push(e.clone()));
    Harness {
        pipeline,
        output,
        stats,
        events,
        driver: RecordingTimeDriver::new(),
    }
}

impl Harness {
    fn run(&mut self) -> usize {
        let mut step = DebugStepConfig::free_running();
        for ticks in 0..10_000 {
            if self.pipeline.state() == PipelineState::Finished {
                return ticks;
            }
            self.pipeline.tick(&mut self.driver, &mut step);
        }
        panic!("pipeline never finished");
    }

    fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<PipelineState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn single_shot_runs_start_to_finish() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    assert_eq!(h.pipeline.state(), PipelineState::ProducingFrames);
    assert!(h.pipeline.is_ticking_registered());

    h.run();
    assert!(!h.pipeline.has_error(), "{:?}", h.pipeline.errors());
    assert_eq!(h.output.frame_numbers().unwrap(), [0, 1, 2, 3]);
    // Motion-blur pre-roll, then one evaluation per frame.
    let ticks: Vec<_> = [-1, 0, 1000, 2000, 3000]
        .into_iter()
        .map(|t| FrameTime::from_frame(FrameNumber(t)))
        .collect();
    assert_eq!(h.driver.eval_times, ticks);
    assert_eq!(h.pipeline.completion_percentage(), 1.0);
    assert!(!h.pipeline.is_ticking_registered());

    let stats = h.stats.get();
    assert_eq!(stats.samples, 5);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.passes_reported, 4);

    assert_eq!(
        h.states(),
        [
            PipelineState::ProducingFrames,
            PipelineState::Finalize,
            PipelineState::Export,
            PipelineState::Finished
        ]
    );
    let events = h.events();
    assert_eq!(events.first(), Some(&PipelineEvent::Initialized { shots: 1 }));
    assert_eq!(events.last(), Some(&PipelineEvent::Finished { success: true }));
}

#[test]
fn completed_frames_carry_shot_metadata() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    h.pipeline
        .initialize(Some(job(&[
            NO_WARM_UP,
            r#"{ "kind": "output", "frame_number_offset": 1000 }"#,
            r#"{ "kind": "render_passes", "passes": ["beauty", "depth"] }"#,
        ])))
        .unwrap();
    h.run();

    h.output
        .with(|s| {
            assert_eq!(s.frames.len(), 6);
            let last = &s.frames[5];
            assert_eq!(last.output_frame_number, 5);
            assert_eq!(last.metadata.shot_name, "sh020");
            assert_eq!(last.metadata.shot_output_frame_number, 2);
            assert_eq!(last.metadata.frame_number_offset, 1000);
            assert_eq!(last.metadata.effective_frame_number.0, 5);
            assert_eq!(last.metadata.source_frame_number.0, 2);
            let passes: Vec<_> = last.passes.keys().map(String::as_str).collect();
            assert_eq!(passes, ["beauty", "depth"]);
            assert!(s.finalize_started && s.export_started);
        })
        .unwrap();
}

#[test]
fn warm_up_frames_can_render_discarded_samples() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    h.pipeline
        .initialize(Some(job(&[
            r#"{ "kind": "anti_aliasing", "engine_warm_up_count": 3,
                 "render_warm_up_frames": true }"#,
            r#"{ "kind": "camera", "fix_first_frame_motion_blur": false }"#,
        ])))
        .unwrap();
    h.run();

    let stats = h.stats.get();
    assert_eq!(stats.discarded, 3);
    assert_eq!(stats.samples, 7);
    assert_eq!(h.output.frame_numbers().unwrap(), [0, 1, 2, 3]);
    assert_eq!(h.driver.eval_times[..3], [FrameTime::ZERO; 3]);
    assert!(h.driver.delta_times[..3].iter().all(|d| (d - 1.0 / 24.0).abs() < 1e-12));
}

#[test]
fn shutdown_mid_run_drains_and_tears_down_once() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    let mut step = DebugStepConfig::free_running();
    for _ in 0..3 {
        h.pipeline.tick(&mut h.driver, &mut step);
    }
    h.pipeline.request_shutdown(false);
    h.pipeline.request_shutdown(false);
    assert_eq!(h.pipeline.state(), PipelineState::ProducingFrames);
    h.run();

    let events = h.events();
    let started = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ShotStarted { .. }))
        .count();
    let finished = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ShotFinished { .. }))
        .count();
    assert_eq!((started, finished), (1, 1));
    assert_eq!(
        h.states(),
        [
            PipelineState::ProducingFrames,
            PipelineState::Finalize,
            PipelineState::Export,
            PipelineState::Finished
        ]
    );
    // Pre-roll plus two frames were submitted before the request.
    assert_eq!(h.output.frame_numbers().unwrap(), [0, 1]);
    assert!(!h.pipeline.has_error());
    assert!(h.pipeline.completion_percentage() < 1.0);
}

#[test]
fn transitions_requested_mid_transition_are_dropped() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    let mut step = DebugStepConfig::free_running();
    h.pipeline.tick(&mut h.driver, &mut step);
    let before = h.events().len();

    h.pipeline.is_transitioning = true;
    h.pipeline.transition_to_state(PipelineState::Finalize);
    h.pipeline.shutdown(false);
    assert_eq!(h.pipeline.state(), PipelineState::ProducingFrames);
    assert_eq!(h.events().len(), before);
    assert!(!h.output.with(|s| s.finalize_started).unwrap());

    // Nothing was queued behind the guard.
    h.pipeline.is_transitioning = false;
    h.pipeline.tick(&mut h.driver, &mut step);
    assert_eq!(h.pipeline.state(), PipelineState::ProducingFrames);

    h.run();
    assert_eq!(h.output.frame_numbers().unwrap(), [0, 1, 2, 3]);
    assert_eq!(
        h.states(),
        [
            PipelineState::ProducingFrames,
            PipelineState::Finalize,
            PipelineState::Export,
            PipelineState::Finished
        ]
    );
}

#[test]
fn shots_are_soloed_while_rendering_and_restored_after() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    let before = h.pipeline.library().clone();
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();

    let master = h.pipeline.master().unwrap();
    let active = |p: &Pipeline| -> Vec<bool> {
        let seq = p.library().sequence(master).unwrap();
        seq.shot_track.as_ref().unwrap().sections.iter().map(|s| s.active).collect()
    };
    let seq = h.pipeline.library().sequence(master).unwrap();
    assert!(seq.read_only && seq.playback_range_locked);
    assert_eq!(seq.evaluation_type, EvaluationType::FrameLocked);

    let mut step = DebugStepConfig::free_running();
    h.pipeline.tick(&mut h.driver, &mut step);
    assert_eq!(active(&h.pipeline), [true, false]);
    while h.pipeline.current_shot_index() == 0 {
        h.pipeline.tick(&mut h.driver, &mut step);
    }
    assert_eq!(active(&h.pipeline), [false, true]);

    h.run();
    assert!(h.pipeline.ledger().is_empty());
    assert_eq!(h.pipeline.library(), &before);
}

#[test]
fn handles_widen_the_locked_playback_range() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    h.pipeline
        .initialize(Some(job(&[
            NO_WARM_UP,
            r#"{ "kind": "output", "handle_frame_count": 1 }"#,
        ])))
        .unwrap();
    let master = h.pipeline.master().unwrap();
    let seq = h.pipeline.library().sequence(master).unwrap();
    assert_eq!(seq.playback_range, TickRange::ticks(-1000, 7000));

    h.run();
    // Each shot gains a frame on both sides.
    assert_eq!(h.output.frame_numbers().unwrap(), (0..10).collect::<Vec<_>>());
    let seq = h.pipeline.library().sequence(master).unwrap();
    assert_eq!(seq.playback_range, TickRange::ticks(0, 6000));
}

#[test]
fn disabled_shots_are_skipped() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    let job = PipelineJob::from_json_str(
        r#"{ "name": "test", "sequence": "master",
             "config": { "settings": [{ "kind": "anti_aliasing", "engine_warm_up_count": 0 }] },
             "shots": [{ "name": "sh010", "enabled": false }] }"#,
    )
    .unwrap();
    h.pipeline.initialize(Some(job)).unwrap();
    h.run();

    h.output
        .with(|s| {
            assert_eq!(s.frames.len(), 3);
            assert!(s.frames.iter().all(|f| f.metadata.shot_name == "sh020"));
        })
        .unwrap();
    assert_eq!(h.stats.get().shots, 1);
    assert_eq!(h.pipeline.completion_percentage(), 1.0);
}

#[test]
fn paused_debug_step_holds_the_pipeline() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    let mut step = DebugStepConfig::paused();
    for _ in 0..5 {
        h.pipeline.tick(&mut h.driver, &mut step);
    }
    assert_eq!(h.driver.delta_times, [0.0; 5]);
    assert!(h.driver.eval_times.is_empty());
    assert_eq!(h.pipeline.output_state().output_frame_number, -1);

    step.step(2);
    for _ in 0..4 {
        h.pipeline.tick(&mut h.driver, &mut step);
    }
    assert_eq!(h.driver.eval_times.len(), 2);
    assert_eq!(h.pipeline.output_state().output_frame_number, 0);
}

#[test]
fn missing_job_fails_and_finishes() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    let err = h.pipeline.initialize(None).unwrap_err();
    assert!(matches!(err, PipelineError::Initialization(_)));
    assert_eq!(h.pipeline.state(), PipelineState::Finished);
    assert!(h.pipeline.has_error());

    let events = h.events();
    assert!(matches!(events[0], PipelineEvent::Error { fatal: true, .. }));
    assert_eq!(events.last(), Some(&PipelineEvent::Finished { success: false }));
}

#[test]
fn missing_sequence_is_fatal_at_initialization() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    let job = PipelineJob::from_json_str(r#"{ "name": "x", "sequence": "nope" }"#).unwrap();
    let err = h.pipeline.initialize(Some(job)).unwrap_err();
    assert!(matches!(err, PipelineError::MissingSequence(ref s) if s == "nope"));
    assert!(err.is_fatal_at_initialization());
    assert_eq!(h.pipeline.state(), PipelineState::Finished);
    assert_eq!(h.stats.get().shots, 0);
}

#[test]
fn invalid_config_fails_before_touching_sequences() {
    let mut h = harness(TWO_SHOTS, SimulatedFault::None);
    let before = h.pipeline.library().clone();
    let job = job(&[
        r#"{ "kind": "output", "handle_frame_count": 2 }"#,
        r#"{ "kind": "execution", "finalize_poll_interval_ms": 0 }"#,
    ]);
    let err = h.pipeline.initialize(Some(job)).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(h.pipeline.state(), PipelineState::Finished);
    assert!(h.pipeline.ledger().is_empty());
    assert_eq!(h.pipeline.library(), &before);
}

#[test]
fn pipelines_are_single_use() {
    let mut h = harness(SINGLE, SimulatedFault::None);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    let err = h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyInitialized));
    h.run();
    assert!(h.pipeline.has_error());
    assert_eq!(h.events().last(), Some(&PipelineEvent::Finished { success: false }));
}

#[test]
fn duplicate_pass_reports_abort_the_run() {
    let mut h = harness(SINGLE, SimulatedFault::DuplicateReports);
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    h.run();
    assert!(h.pipeline.has_error());
    assert!(h.pipeline.errors().iter().any(|e| e.contains("contract violation")));
    assert_eq!(h.events().last(), Some(&PipelineEvent::Finished { success: false }));
}

#[test]
fn sink_failures_still_drain_rendered_frames() {
    let mut h = harness(SINGLE, SimulatedFault::FailSubmitAfter(3));
    h.pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    h.run();
    assert!(h.pipeline.has_error());
    // Pre-roll plus frames 0 and 1 were accepted before the failure.
    assert_eq!(h.output.frame_numbers().unwrap(), [0, 1]);
    assert!(h.pipeline.ledger().is_empty());
}

struct StuckOutput;

impl OutputContainer for StuckOutput {
    fn name(&self) -> &str {
        "stuck"
    }
    fn on_receive_frame(&mut self, _: CompletedFrame) -> PipelineResult<()> {
        Ok(())
    }
    fn begin_finalize(&mut self) -> PipelineResult<()> {
        Ok(())
    }
    fn has_finished_processing(&mut self) -> bool {
        false
    }
}

#[test]
fn forced_shutdown_gives_up_on_stalled_containers_after_the_timeout() {
    let mut pipeline = Pipeline::new(
        SequenceLibrary::from_json_str(SINGLE).unwrap(),
        SettingsRegistry::builtin(),
        Box::new(SimulatedRenderSink::new()),
        vec![Box::new(StuckOutput)],
    );
    pipeline
        .initialize(Some(job(&[
            NO_WARM_UP,
            r#"{ "kind": "execution", "finalize_poll_interval_ms": 1, "finalize_timeout_ms": 20 }"#,
        ])))
        .unwrap();
    let mut driver = RecordingTimeDriver::new();
    pipeline.tick(&mut driver, &mut DebugStepConfig::free_running());

    pipeline.shutdown(false);
    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert!(pipeline.has_error());
    assert!(pipeline.errors().iter().any(|e| e.contains("timed out during finalize")));
}

#[test]
fn finalize_polls_once_per_tick_until_containers_finish() {
    let memory = InMemoryOutput::new("slow").with_finalize_delay(3);
    let handle = memory.handle();
    let mut pipeline = Pipeline::new(
        SequenceLibrary::from_json_str(SINGLE).unwrap(),
        SettingsRegistry::builtin(),
        Box::new(SimulatedRenderSink::new()),
        vec![Box::new(memory)],
    );
    pipeline.initialize(Some(job(&[NO_WARM_UP]))).unwrap();
    pipeline.request_shutdown(false);
    let mut driver = RecordingTimeDriver::new();
    let mut step = DebugStepConfig::free_running();

    pipeline.tick(&mut driver, &mut step);
    assert_eq!(pipeline.state(), PipelineState::Finalize);
    for _ in 0..3 {
        pipeline.tick(&mut driver, &mut step);
        assert_eq!(pipeline.state(), PipelineState::Finalize);
    }
    pipeline.tick(&mut driver, &mut step);
    assert_eq!(pipeline.state(), PipelineState::Export);
    assert_eq!(handle.with(|s| s.finalize_polls).unwrap(), 4);
}
