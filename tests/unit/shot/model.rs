use super::*;
use crate::timing::metrics::ShutterTiming;

fn cut(range: TickRange, warm_up: u32, fix_motion_blur: bool, temporal: u32) -> CameraCutInfo {
    let mut settings = ResolvedShotSettings::default();
    settings.anti_aliasing.engine_warm_up_count = warm_up;
    settings.anti_aliasing.temporal_sample_count = temporal;
    settings.camera.fix_first_frame_motion_blur = fix_motion_blur;
    let ticks = FrameRate::new(24000, 1).unwrap();
    let fps = FrameRate::new(24, 1).unwrap();
    let metrics =
        FrameConstantMetrics::new(ticks, fps, 180.0, ShutterTiming::FrameCenter, temporal).unwrap();
    let source = SourceTiming {
        transform: SectionTransform::identity(),
        tick_resolution: ticks,
        display_rate: fps,
    };
    let mut c = CameraCutInfo::new(range, None, &settings, metrics, source);
    c.prepare();
    c
}

#[test]
fn state_machine_runs_warm_up_then_motion_blur_then_rendering() {
    let mut c = cut(TickRange::ticks(0, 4000), 2, true, 1);
    assert_eq!(c.state(), CameraCutState::Uninitialized);
    assert_eq!(c.set_next_state(), CameraCutState::WarmingUp);

    c.num_warm_up_frames_remaining = 0;
    assert_eq!(c.set_next_state(), CameraCutState::MotionBlur);
    c.has_evaluated_motion_blur_frame = true;
    assert_eq!(c.set_next_state(), CameraCutState::Rendering);
    assert_eq!(c.set_next_state(), CameraCutState::Finished);
}

#[test]
fn state_machine_skips_optional_states() {
    let mut c = cut(TickRange::ticks(0, 4000), 0, false, 1);
    assert_eq!(c.set_next_state(), CameraCutState::Rendering);

    let mut c = cut(TickRange::ticks(0, 4000), 0, true, 1);
    assert_eq!(c.set_next_state(), CameraCutState::MotionBlur);

    let mut c = cut(TickRange::ticks(0, 4000), 3, false, 1);
    assert_eq!(c.set_next_state(), CameraCutState::WarmingUp);
    c.num_warm_up_frames_remaining = 0;
    assert_eq!(c.set_next_state(), CameraCutState::Rendering);
}

#[test]
#[should_panic(expected = "ticks remaining")]
fn leaving_warm_up_early_panics() {
    let mut c = cut(TickRange::ticks(0, 4000), 3, false, 1);
    c.set_next_state();
    c.set_next_state();
}

#[test]
#[should_panic(expected = "no next state")]
fn finished_is_terminal() {
    let mut c = cut(TickRange::ticks(0, 4000), 0, false, 1);
    c.set_next_state();
    c.set_next_state();
    c.set_next_state();
}

#[test]
fn prepare_sizes_work_metrics() {
    let c = cut(TickRange::ticks(0, 4500), 5, false, 3);
    assert_eq!(c.output_frame_count(), 5);
    assert_eq!(c.work.total_output_frames, 5);
    assert_eq!(c.work.total_samples, 15);
    assert_eq!(c.num_warm_up_frames_remaining, 5);
    assert_eq!(c.current_tick, FrameNumber(0));
}

#[test]
fn source_frame_rounds_to_nearest_display_frame() {
    let c = cut(TickRange::ticks(0, 4000), 0, false, 1);
    assert_eq!(c.source.source_frame(FrameTime::from_frame(FrameNumber(1499))), FrameNumber(1));
    assert_eq!(c.source.source_frame(FrameTime::from_frame(FrameNumber(1500))), FrameNumber(2));
    assert_eq!(c.source.source_frame(FrameTime::from_frame(FrameNumber(-400))), FrameNumber(0));
}

#[test]
fn shot_advances_through_cuts() {
    let mut shot = ShotInfo {
        name: "sh".into(),
        section_index: None,
        inner_sequence: None,
        enabled: true,
        original_range: TickRange::ticks(0, 4000),
        total_output_range: TickRange::ticks(0, 4000),
        handle_frame_range_start: TickRange::ticks(0, 0),
        handle_frame_range_end: TickRange::ticks(4000, 4000),
        handle_frame_count: 0,
        has_override: false,
        settings: ResolvedShotSettings::default(),
        camera_cuts: vec![
            cut(TickRange::ticks(0, 2000), 0, false, 1),
            cut(TickRange::ticks(2000, 4000), 0, false, 1),
        ],
        current_camera_cut_index: 0,
    };
    assert_eq!(shot.total_output_frames(), 4);
    assert!(shot.advance_camera_cut());
    assert_eq!(shot.current_camera_cut().original_range, TickRange::ticks(2000, 4000));
    assert!(!shot.advance_camera_cut());
    assert!(!shot.is_finished());
}
