use std::collections::HashMap;
use std::path::Path;

use num_rational::Rational64;

use crate::foundation::core::{FrameNumber, FrameRate, FrameTime, TickRange};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::sequence::ledger::{FieldValue, TrackedField};

/// Handle to a sequence owned by a [`SequenceLibrary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct SequenceId(pub u32);

/// How the playback system samples the sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    /// Evaluate at arbitrary sub-frame times.
    #[default]
    WithSubFrames,
    /// Evaluate only at whole display-rate frames.
    FrameLocked,
}

/// A cinematic sequence: a playback range plus a track hierarchy.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sequence {
    /// Unique name within the library; shot sections reference inner sequences by name.
    pub name: String,
    /// Resolution of all tick values in this sequence.
    pub tick_resolution: FrameRate,
    /// Human-facing frame rate.
    pub display_rate: FrameRate,
    /// Playback range in ticks.
    pub playback_range: TickRange,
    /// Evaluation mode of the playback system.
    #[serde(default)]
    pub evaluation_type: EvaluationType,
    /// Editing lock.
    #[serde(default)]
    pub read_only: bool,
    /// Playback range lock.
    #[serde(default)]
    pub playback_range_locked: bool,
    /// Cinematic shot track, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_track: Option<ShotTrack>,
    /// Camera cut track, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_cut_track: Option<CameraCutTrack>,
    /// Other animated tracks (only their section bounds matter here).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<Track>,
}

/// Track of shot sections, each wrapping an inner sequence.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShotTrack {
    /// Shot sections in authoring order.
    pub sections: Vec<ShotSection>,
}

/// One shot on the shot track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShotSection {
    /// Shot name, used to match job shot entries.
    pub name: String,
    /// Range in the outer sequence's ticks.
    pub range: TickRange,
    /// Inactive sections are skipped.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Name of the inner sequence.
    pub sequence: String,
    /// Offset into the inner sequence, in inner ticks, applied after its playback start.
    #[serde(default)]
    pub start_frame_offset: FrameNumber,
}

/// Track of camera cuts.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraCutTrack {
    /// Camera cut sections in authoring order.
    pub sections: Vec<CameraCutSection>,
}

/// One camera cut.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraCutSection {
    /// Range in the owning sequence's ticks.
    pub range: TickRange,
    /// Inactive sections are skipped.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Opaque camera binding, carried into metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
}

/// Any other track; only the bounds of its sections are relevant to scheduling.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    /// Track name for diagnostics.
    pub name: String,
    /// Sections of the track.
    pub sections: Vec<TrackSection>,
}

/// A bounded section with optional keyed data.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackSection {
    /// Section bounds in the owning sequence's ticks.
    pub range: TickRange,
    /// Tick of the first key, if the section is keyed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_key: Option<FrameNumber>,
}

fn default_true() -> bool {
    true
}

impl Sequence {
    /// Check rates and ranges of the sequence and its tracks.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::validation("sequence name must be non-empty"));
        }
        self.tick_resolution.validate()?;
        self.display_rate.validate()?;
        check_range(self.playback_range, &self.name, "playback_range")?;
        if let Some(track) = &self.shot_track {
            for s in &track.sections {
                check_range(s.range, &self.name, &format!("shot '{}'", s.name))?;
            }
        }
        if let Some(track) = &self.camera_cut_track {
            for (i, s) in track.sections.iter().enumerate() {
                check_range(s.range, &self.name, &format!("camera cut #{i}"))?;
            }
        }
        for track in &self.tracks {
            for (i, s) in track.sections.iter().enumerate() {
                check_range(s.range, &self.name, &format!("track '{}' section #{i}", track.name))?;
            }
        }
        Ok(())
    }

    /// Ticks covered by one display-rate frame.
    pub fn ticks_per_display_frame(&self) -> FrameTime {
        FrameRate::transform_time(FrameTime::ONE, self.display_rate, self.tick_resolution)
    }
}

fn check_range(range: TickRange, seq: &str, what: &str) -> PipelineResult<()> {
    if range.start > range.end {
        return Err(PipelineError::validation(format!(
            "sequence '{seq}': {what} has start > end"
        )));
    }
    Ok(())
}

/// Linear mapping between an outer sequence's ticks and a shot's inner sequence ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SectionTransform {
    outer_start: FrameNumber,
    inner_start: FrameNumber,
    inner_per_outer: Rational64,
}

impl SectionTransform {
    /// Build the transform for `section`, whose inner sequence is `inner`.
    pub fn new(section: &ShotSection, outer_resolution: FrameRate, inner: &Sequence) -> Self {
        Self {
            outer_start: section.range.start,
            inner_start: inner.playback_range.start + section.start_frame_offset.0,
            inner_per_outer: inner.tick_resolution.ratio_to(outer_resolution),
        }
    }

    /// Transform of a sequence onto itself.
    pub fn identity() -> Self {
        Self {
            outer_start: FrameNumber(0),
            inner_start: FrameNumber(0),
            inner_per_outer: Rational64::from_integer(1),
        }
    }

    /// Inner ticks per outer tick.
    pub fn inner_per_outer(&self) -> Rational64 {
        self.inner_per_outer
    }

    /// Outer tick to inner tick.
    pub fn to_inner(&self, outer: FrameTime) -> FrameTime {
        FrameTime::from_frame(self.inner_start)
            + (outer - FrameTime::from_frame(self.outer_start)) * self.inner_per_outer
    }

    /// Inner tick to outer tick.
    pub fn to_outer(&self, inner: FrameTime) -> FrameTime {
        FrameTime::from_frame(self.outer_start)
            + FrameTime((inner - FrameTime::from_frame(self.inner_start)).0 / self.inner_per_outer)
    }

    /// Inner range to outer range, rounding outward.
    pub fn range_to_outer(&self, range: TickRange) -> TickRange {
        TickRange {
            start: self.to_outer(range.start.into()).floor_to_frame(),
            end: self.to_outer(range.end.into()).ceil_to_frame(),
        }
    }

    /// Outer range to inner range, rounding outward.
    pub fn range_to_inner(&self, range: TickRange) -> TickRange {
        TickRange {
            start: self.to_inner(range.start.into()).floor_to_frame(),
            end: self.to_inner(range.end.into()).ceil_to_frame(),
        }
    }
}

#[derive(serde::Deserialize)]
struct SequenceLibraryDef {
    sequences: Vec<Sequence>,
}

/// Owning arena of sequences, addressed by [`SequenceId`].
///
/// The pipeline only mutates sequences through
/// [`RestoreLedger::set`](crate::sequence::ledger::RestoreLedger::set), which goes through the
/// crate-private `read`/`write` accessors below.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SequenceLibrary {
    sequences: Vec<Sequence>,
    #[serde(skip)]
    by_name: HashMap<String, SequenceId>,
}

impl SequenceLibrary {
    /// Build a validated library. Sequence names must be unique.
    pub fn new(sequences: Vec<Sequence>) -> PipelineResult<Self> {
        let mut by_name = HashMap::with_capacity(sequences.len());
        for (i, seq) in sequences.iter().enumerate() {
            seq.validate()?;
            let id = SequenceId(
                u32::try_from(i).map_err(|_| PipelineError::validation("too many sequences"))?,
            );
            if by_name.insert(seq.name.clone(), id).is_some() {
                return Err(PipelineError::validation(format!(
                    "duplicate sequence name '{}'",
                    seq.name
                )));
            }
        }
        Ok(Self { sequences, by_name })
    }

    /// Parse a library from JSON (`{ "sequences": [...] }`).
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        let def: SequenceLibraryDef = serde_json::from_str(s)?;
        Self::new(def.sequences)
    }

    /// Load a library from a JSON file.
    pub fn from_json_path(path: &Path) -> PipelineResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Other(anyhow::Error::new(e).context(format!(
                "read sequence library '{}'",
                path.display()
            )))
        })?;
        Self::from_json_str(&s)
    }

    /// Look a sequence up by name.
    pub fn find(&self, name: &str) -> Option<SequenceId> {
        self.by_name.get(name).copied()
    }

    /// Borrow a sequence.
    pub fn get(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(id.0 as usize)
    }

    /// Borrow a sequence that is known to exist.
    pub fn sequence(&self, id: SequenceId) -> PipelineResult<&Sequence> {
        self.get(id)
            .ok_or_else(|| PipelineError::validation(format!("unknown sequence id {}", id.0)))
    }

    /// All sequences in insertion order.
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    fn sequence_mut(&mut self, id: SequenceId) -> PipelineResult<&mut Sequence> {
        self.sequences
            .get_mut(id.0 as usize)
            .ok_or_else(|| PipelineError::validation(format!("unknown sequence id {}", id.0)))
    }

    pub(crate) fn read(&self, field: &TrackedField) -> PipelineResult<FieldValue> {
        let seq = self.sequence(field.sequence())?;
        Ok(match *field {
            TrackedField::PlaybackRange(_) => FieldValue::Range(seq.playback_range),
            TrackedField::ReadOnly(_) => FieldValue::Flag(seq.read_only),
            TrackedField::PlaybackRangeLocked(_) => FieldValue::Flag(seq.playback_range_locked),
            TrackedField::EvaluationType(_) => FieldValue::Evaluation(seq.evaluation_type),
            TrackedField::ShotSectionActive { section, .. } => {
                FieldValue::Flag(shot_section(seq, section)?.active)
            }
            TrackedField::ShotSectionRange { section, .. } => {
                FieldValue::Range(shot_section(seq, section)?.range)
            }
            TrackedField::ShotSectionStartOffset { section, .. } => {
                FieldValue::Offset(shot_section(seq, section)?.start_frame_offset)
            }
            TrackedField::TrackSectionRange { track, section, .. } => {
                FieldValue::Range(track_section(seq, track, section)?.range)
            }
        })
    }

    pub(crate) fn write(&mut self, field: &TrackedField, value: FieldValue) -> PipelineResult<()> {
        let mismatch = || {
            PipelineError::contract(format!("value {value:?} does not fit field {field:?}"))
        };
        let seq = self.sequence_mut(field.sequence())?;
        match (*field, value) {
            (TrackedField::PlaybackRange(_), FieldValue::Range(r)) => seq.playback_range = r,
            (TrackedField::ReadOnly(_), FieldValue::Flag(b)) => seq.read_only = b,
            (TrackedField::PlaybackRangeLocked(_), FieldValue::Flag(b)) => {
                seq.playback_range_locked = b;
            }
            (TrackedField::EvaluationType(_), FieldValue::Evaluation(e)) => {
                seq.evaluation_type = e;
            }
            (TrackedField::ShotSectionActive { section, .. }, FieldValue::Flag(b)) => {
                shot_section_mut(seq, section)?.active = b;
            }
            (TrackedField::ShotSectionRange { section, .. }, FieldValue::Range(r)) => {
                shot_section_mut(seq, section)?.range = r;
            }
            (TrackedField::ShotSectionStartOffset { section, .. }, FieldValue::Offset(o)) => {
                shot_section_mut(seq, section)?.start_frame_offset = o;
            }
            (TrackedField::TrackSectionRange { track, section, .. }, FieldValue::Range(r)) => {
                track_section_mut(seq, track, section)?.range = r;
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

fn shot_section(seq: &Sequence, index: usize) -> PipelineResult<&ShotSection> {
    seq.shot_track
        .as_ref()
        .and_then(|t| t.sections.get(index))
        .ok_or_else(|| missing_section(&seq.name, "shot", index))
}

fn shot_section_mut(seq: &mut Sequence, index: usize) -> PipelineResult<&mut ShotSection> {
    let name = seq.name.clone();
    seq.shot_track
        .as_mut()
        .and_then(|t| t.sections.get_mut(index))
        .ok_or_else(|| missing_section(&name, "shot", index))
}

fn track_section(seq: &Sequence, track: usize, index: usize) -> PipelineResult<&TrackSection> {
    seq.tracks
        .get(track)
        .and_then(|t| t.sections.get(index))
        .ok_or_else(|| missing_section(&seq.name, "track", index))
}

fn track_section_mut(
    seq: &mut Sequence,
    track: usize,
    index: usize,
) -> PipelineResult<&mut TrackSection> {
    let name = seq.name.clone();
    seq.tracks
        .get_mut(track)
        .and_then(|t| t.sections.get_mut(index))
        .ok_or_else(|| missing_section(&name, "track", index))
}

fn missing_section(seq: &str, kind: &str, index: usize) -> PipelineError {
    PipelineError::validation(format!("sequence '{seq}' has no {kind} section #{index}"))
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/model.rs"]
mod tests;
