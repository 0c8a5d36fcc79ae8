use super::*;

fn rate(num: u32) -> FrameRate {
    FrameRate::new(num, 1).unwrap()
}

fn seq(name: &str, range: TickRange) -> Sequence {
    Sequence {
        name: name.to_string(),
        tick_resolution: rate(24000),
        display_rate: rate(24),
        playback_range: range,
        evaluation_type: EvaluationType::WithSubFrames,
        read_only: false,
        playback_range_locked: false,
        shot_track: None,
        camera_cut_track: None,
        tracks: vec![],
    }
}

#[test]
fn library_parses_json_with_defaults() {
    let lib = SequenceLibrary::from_json_str(
        r#"{
          "sequences": [{
            "name": "master",
            "tick_resolution": { "num": 24000, "den": 1 },
            "display_rate": { "num": 24, "den": 1 },
            "playback_range": { "start": 0, "end": 48000 },
            "shot_track": { "sections": [
              { "name": "sh010", "range": { "start": 0, "end": 24000 }, "sequence": "inner" }
            ]}
          }, {
            "name": "inner",
            "tick_resolution": { "num": 24000, "den": 1 },
            "display_rate": { "num": 24, "den": 1 },
            "playback_range": { "start": 0, "end": 24000 }
          }]
        }"#,
    )
    .unwrap();

    let id = lib.find("master").unwrap();
    let master = lib.get(id).unwrap();
    assert_eq!(master.evaluation_type, EvaluationType::WithSubFrames);
    let shot = &master.shot_track.as_ref().unwrap().sections[0];
    assert!(shot.active);
    assert_eq!(shot.start_frame_offset, FrameNumber(0));
    assert_eq!(lib.find("inner"), Some(SequenceId(1)));
    assert_eq!(lib.find("missing"), None);
}

#[test]
fn library_rejects_duplicate_names_and_bad_ranges() {
    let r = TickRange::ticks(0, 10);
    assert!(SequenceLibrary::new(vec![seq("a", r), seq("a", r)]).is_err());

    let mut bad = seq("b", r);
    bad.playback_range = TickRange {
        start: FrameNumber(10),
        end: FrameNumber(0),
    };
    assert!(SequenceLibrary::new(vec![bad]).is_err());
}

#[test]
fn section_transform_maps_offset_and_resolution() {
    let mut inner = seq("inner", TickRange::ticks(1000, 5000));
    inner.tick_resolution = rate(48000);
    let section = ShotSection {
        name: "sh".into(),
        range: TickRange::ticks(2000, 4000),
        active: true,
        sequence: "inner".into(),
        start_frame_offset: FrameNumber(200),
    };
    let xf = SectionTransform::new(&section, rate(24000), &inner);

    let at = |n| FrameTime::from_frame(FrameNumber(n));
    assert_eq!(xf.to_inner(at(2000)), at(1200));
    assert_eq!(xf.to_inner(at(2500)), at(2200));
    assert_eq!(xf.to_outer(at(2201)), FrameTime::from_ratio(5001, 2));

    let outer = xf.range_to_outer(TickRange::ticks(1201, 2201));
    assert_eq!(outer, TickRange::ticks(2000, 2501));
    assert_eq!(xf.range_to_inner(outer), TickRange::ticks(1200, 2202));
}

#[test]
fn read_and_write_reject_mismatched_values() {
    let mut lib = SequenceLibrary::new(vec![seq("a", TickRange::ticks(0, 10))]).unwrap();
    let field = TrackedField::ReadOnly(SequenceId(0));
    assert_eq!(lib.read(&field).unwrap(), FieldValue::Flag(false));
    assert!(matches!(
        lib.write(&field, FieldValue::Range(TickRange::ticks(0, 1))),
        Err(PipelineError::Contract(_))
    ));
    lib.write(&field, FieldValue::Flag(true)).unwrap();
    assert!(lib.get(SequenceId(0)).unwrap().read_only);

    let missing = TrackedField::ShotSectionActive {
        sequence: SequenceId(0),
        section: 0,
    };
    assert!(lib.read(&missing).is_err());
}

#[test]
fn ticks_per_display_frame_follows_rates() {
    let s = seq("a", TickRange::ticks(0, 10));
    assert_eq!(s.ticks_per_display_frame(), FrameTime::from_frame(FrameNumber(1000)));
}
