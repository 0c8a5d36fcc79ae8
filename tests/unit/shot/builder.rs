use super::*;
use crate::job::ShotEntry;
use crate::settings::records::{AntiAliasingSetting, DisplayFrameRange, Setting};
use crate::settings::resolve::PipelineConfig;

fn library(json: &str) -> SequenceLibrary {
    SequenceLibrary::from_json_str(json).unwrap()
}

fn job(handles: u32, shots: Vec<ShotEntry>) -> PipelineJob {
    PipelineJob {
        name: "test".into(),
        sequence: "master".into(),
        config: PipelineConfig {
            settings: vec![Setting::Output(OutputSetting {
                handle_frame_count: handles,
                ..OutputSetting::default()
            })],
        },
        shots,
    }
}

fn build(lib: &mut SequenceLibrary, job: &PipelineJob) -> (ShotPlan, RestoreLedger) {
    let registry = SettingsRegistry::builtin();
    let mut ledger = RestoreLedger::new();
    let plan = ShotBuilder::new(job, &registry).build(lib, &mut ledger).unwrap();
    (plan, ledger)
}

const TWO_SHOTS: &str = r#"{
  "sequences": [{
    "name": "master",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 96000 },
    "shot_track": { "sections": [
      { "name": "sh020", "range": { "start": 48000, "end": 96000 }, "sequence": "inner_b" },
      { "name": "sh010", "range": { "start": 0, "end": 48000 }, "sequence": "inner_a" },
      { "name": "sh000", "range": { "start": 0, "end": 24000 }, "sequence": "inner_a",
        "active": false }
    ]}
  }, {
    "name": "inner_a",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 48000 },
    "camera_cut_track": { "sections": [
      { "range": { "start": 24000, "end": 48000 }, "camera": "cam_b" },
      { "range": { "start": 0, "end": 24000 }, "camera": "cam_a" },
      { "range": { "start": 0, "end": 500 }, "active": false }
    ]}
  }, {
    "name": "inner_b",
    "tick_resolution": { "num": 48000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 1000, "end": 97000 },
    "tracks": [{ "name": "fade", "sections": [
      { "range": { "start": 1000, "end": 97000 }, "earliest_key": 1000 },
      { "range": { "start": 5000, "end": 6000 } }
    ]}]
  }]
}"#;

#[test]
fn shots_and_cuts_come_out_sorted_with_skips_reported() {
    let mut lib = library(TWO_SHOTS);
    let (plan, ledger) = build(&mut lib, &job(0, vec![]));

    let names: Vec<_> = plan.shots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["sh010", "sh020"]);

    let sh010 = &plan.shots[0];
    assert_eq!(sh010.camera_cuts.len(), 2);
    assert_eq!(sh010.camera_cuts[0].camera.as_deref(), Some("cam_a"));
    assert_eq!(sh010.camera_cuts[0].total_output_range, TickRange::ticks(0, 24000));
    assert_eq!(sh010.camera_cuts[1].total_output_range, TickRange::ticks(24000, 48000));

    assert_eq!(plan.shots[1].camera_cuts.len(), 1);
    assert!(plan.warnings.contains(&BuildWarning::InactiveSection {
        shot: "sh000".into()
    }));
    assert!(plan.warnings.contains(&BuildWarning::InactiveCameraCut {
        shot: "sh010".into(),
        index: 2
    }));
    assert!(ledger.is_empty());
}

#[test]
fn handles_dilate_shot_first_and_last_cut_only() {
    let mut lib = library(TWO_SHOTS);
    let (plan, _) = build(&mut lib, &job(8, vec![]));

    let sh010 = &plan.shots[0];
    assert_eq!(sh010.original_range, TickRange::ticks(0, 48000));
    assert_eq!(sh010.total_output_range, TickRange::ticks(-8000, 56000));
    assert_eq!(sh010.camera_cuts[0].total_output_range, TickRange::ticks(-8000, 24000));
    assert_eq!(sh010.camera_cuts[1].total_output_range, TickRange::ticks(24000, 56000));
    assert_eq!(sh010.camera_cuts[0].original_range, TickRange::ticks(0, 24000));

    let handles = sh010.total_output_range.difference(sh010.original_range);
    assert_eq!(handles, vec![TickRange::ticks(-8000, 0), TickRange::ticks(48000, 56000)]);
    assert_eq!(handles, vec![sh010.handle_frame_range_start, sh010.handle_frame_range_end]);
}

#[test]
fn inner_sequence_expansion_goes_through_the_ledger() {
    let mut lib = library(TWO_SHOTS);
    let before = lib.clone();
    let (_, mut ledger) = build(&mut lib, &job(2, vec![]));

    let master = lib.sequence(lib.find("master").unwrap()).unwrap();
    let sections = &master.shot_track.as_ref().unwrap().sections;
    assert_eq!(sections[0].range, TickRange::ticks(46000, 98000));
    assert_eq!(sections[1].range, TickRange::ticks(-2000, 50000));

    // 2000 outer ticks at twice the resolution.
    let inner_b = lib.sequence(lib.find("inner_b").unwrap()).unwrap();
    assert_eq!(inner_b.playback_range, TickRange::ticks(-3000, 101000));
    assert_eq!(sections[0].start_frame_offset, FrameNumber(0));
    assert_eq!(inner_b.tracks[0].sections[0].range, TickRange::ticks(-3000, 101000));
    assert_eq!(inner_b.tracks[0].sections[1].range, TickRange::ticks(5000, 6000));

    ledger.restore_all(&mut lib).unwrap();
    assert_eq!(lib, before);
}

#[test]
fn sections_keyed_after_the_new_start_warn() {
    let mut lib = library(TWO_SHOTS);
    let (plan, _) = build(&mut lib, &job(2, vec![]));
    assert!(plan.warnings.contains(&BuildWarning::SectionCannotExpand {
        sequence: "inner_b".into(),
        track: "fade".into(),
        section: 0
    }));
}

#[test]
fn shot_entries_override_settings_and_disable_shots() {
    let mut lib = library(TWO_SHOTS);
    let entries = vec![
        ShotEntry {
            name: "sh020".into(),
            enabled: false,
            settings: vec![],
        },
        ShotEntry {
            name: "sh010".into(),
            enabled: true,
            settings: vec![Setting::AntiAliasing(AntiAliasingSetting {
                temporal_sample_count: 5,
                ..AntiAliasingSetting::default()
            })],
        },
        ShotEntry {
            name: "nope".into(),
            enabled: true,
            settings: vec![],
        },
    ];
    let (plan, _) = build(&mut lib, &job(0, entries));

    assert!(plan.shots[0].enabled);
    assert!(plan.shots[0].has_override);
    assert_eq!(plan.shots[0].camera_cuts[0].num_temporal_samples, 5);
    assert!(!plan.shots[1].enabled);
    assert_eq!(plan.shots[1].camera_cuts[0].num_temporal_samples, 1);
    assert!(plan.warnings.contains(&BuildWarning::UnknownShotEntry {
        name: "nope".into()
    }));
}

const BARE: &str = r#"{
  "sequences": [{
    "name": "master",
    "tick_resolution": { "num": 24000, "den": 1 },
    "display_rate": { "num": 24, "den": 1 },
    "playback_range": { "start": 0, "end": 1000 }
  }]
}"#;

#[test]
fn bare_sequence_becomes_one_shot_with_warning() {
    let mut lib = library(BARE);
    let (plan, _) = build(&mut lib, &job(8, vec![]));

    assert_eq!(plan.shots.len(), 1);
    let shot = &plan.shots[0];
    assert_eq!(shot.name, "master");
    assert_eq!(shot.section_index, None);
    assert_eq!(shot.total_output_range, TickRange::ticks(-8000, 9000));
    assert_eq!(shot.camera_cuts[0].total_output_range, TickRange::ticks(-8000, 9000));
    assert_eq!(
        plan.warnings,
        vec![BuildWarning::NoShotOrCameraCutTrack {
            sequence: "master".into()
        }]
    );
}

#[test]
fn custom_playback_range_is_in_display_frames() {
    let mut lib = library(BARE);
    let mut j = job(0, vec![]);
    j.config.settings = vec![Setting::Output(OutputSetting {
        custom_playback_range: Some(DisplayFrameRange { start: 0, end: 2 }),
        ..OutputSetting::default()
    })];
    let (plan, _) = build(&mut lib, &j);
    assert_eq!(plan.playback_range, TickRange::ticks(0, 2000));
    assert_eq!(plan.shots[0].total_output_range, TickRange::ticks(0, 2000));
}

#[test]
fn cuts_shorter_than_a_frame_are_dropped() {
    let mut lib = library(
        r#"{
      "sequences": [{
        "name": "master",
        "tick_resolution": { "num": 24000, "den": 1 },
        "display_rate": { "num": 24, "den": 1 },
        "playback_range": { "start": 0, "end": 3000 },
        "camera_cut_track": { "sections": [
          { "range": { "start": 0, "end": 2500 } },
          { "range": { "start": 2500, "end": 3000 } }
        ]}
      }]
    }"#,
    );
    let (plan, _) = build(&mut lib, &job(0, vec![]));
    assert_eq!(plan.shots[0].camera_cuts.len(), 1);
    assert!(plan.warnings.contains(&BuildWarning::CutShorterThanFrame {
        shot: "master".into(),
        range: TickRange::ticks(2500, 3000)
    }));
}

#[test]
fn missing_sequences_are_fatal() {
    let registry = SettingsRegistry::builtin();
    let mut lib = library(BARE);
    let mut ledger = RestoreLedger::new();

    let mut j = job(0, vec![]);
    j.sequence = "elsewhere".into();
    let err = ShotBuilder::new(&j, &registry)
        .build(&mut lib, &mut ledger)
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingSequence(ref name) if name == "elsewhere"));

    let mut lib = library(
        r#"{
      "sequences": [{
        "name": "master",
        "tick_resolution": { "num": 24000, "den": 1 },
        "display_rate": { "num": 24, "den": 1 },
        "playback_range": { "start": 0, "end": 3000 },
        "shot_track": { "sections": [
          { "name": "sh", "range": { "start": 0, "end": 3000 }, "sequence": "gone" }
        ]}
      }]
    }"#,
    );
    let err = ShotBuilder::new(&job(0, vec![]), &registry)
        .build(&mut lib, &mut ledger)
        .unwrap_err();
    assert!(err.is_fatal_at_initialization());
}

#[test]
fn nothing_to_render_is_an_initialization_error() {
    let registry = SettingsRegistry::builtin();
    let mut lib = library(
        r#"{
      "sequences": [{
        "name": "master",
        "tick_resolution": { "num": 24000, "den": 1 },
        "display_rate": { "num": 24, "den": 1 },
        "playback_range": { "start": 0, "end": 3000 },
        "shot_track": { "sections": [
          { "name": "sh", "range": { "start": 0, "end": 3000 }, "sequence": "master",
            "active": false }
        ]}
      }]
    }"#,
    );
    let mut ledger = RestoreLedger::new();
    let err = ShotBuilder::new(&job(0, vec![]), &registry)
        .build(&mut lib, &mut ledger)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Initialization(_)));
}
