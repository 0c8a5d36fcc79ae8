use tracing::debug;

use crate::foundation::core::{FrameNumber, TickRange};
use crate::foundation::error::PipelineResult;
use crate::sequence::model::{EvaluationType, SequenceId, SequenceLibrary};

/// A sequence property the pipeline may change while it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackedField {
    /// `Sequence::playback_range`.
    PlaybackRange(SequenceId),
    /// `Sequence::read_only`.
    ReadOnly(SequenceId),
    /// `Sequence::playback_range_locked`.
    PlaybackRangeLocked(SequenceId),
    /// `Sequence::evaluation_type`.
    EvaluationType(SequenceId),
    /// `ShotSection::active` of a section on the sequence's shot track.
    ShotSectionActive {
        /// Owning sequence.
        sequence: SequenceId,
        /// Section index on the shot track.
        section: usize,
    },
    /// `ShotSection::range`.
    ShotSectionRange {
        /// Owning sequence.
        sequence: SequenceId,
        /// Section index on the shot track.
        section: usize,
    },
    /// `ShotSection::start_frame_offset`.
    ShotSectionStartOffset {
        /// Owning sequence.
        sequence: SequenceId,
        /// Section index on the shot track.
        section: usize,
    },
    /// `TrackSection::range` of a generic track.
    TrackSectionRange {
        /// Owning sequence.
        sequence: SequenceId,
        /// Track index.
        track: usize,
        /// Section index within the track.
        section: usize,
    },
}

impl TrackedField {
    /// Sequence that owns the field.
    pub fn sequence(&self) -> SequenceId {
        match *self {
            Self::PlaybackRange(id)
            | Self::ReadOnly(id)
            | Self::PlaybackRangeLocked(id)
            | Self::EvaluationType(id) => id,
            Self::ShotSectionActive { sequence, .. }
            | Self::ShotSectionRange { sequence, .. }
            | Self::ShotSectionStartOffset { sequence, .. }
            | Self::TrackSectionRange { sequence, .. } => sequence,
        }
    }
}

/// Value stored in a [`TrackedField`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// Tick range.
    Range(TickRange),
    /// Boolean flag.
    Flag(bool),
    /// Evaluation mode.
    Evaluation(EvaluationType),
    /// Tick offset.
    Offset(FrameNumber),
}

/// One recorded mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// What was changed.
    pub field: TrackedField,
    /// Value before the change.
    pub previous: FieldValue,
}

/// Record of every sequence mutation made during a run, replayed in reverse to undo them.
#[derive(Debug, Default)]
pub struct RestoreLedger {
    entries: Vec<LedgerEntry>,
}

impl RestoreLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` into `field`, capturing the previous value first.
    ///
    /// Writing a value equal to the current one records nothing.
    pub fn set(
        &mut self,
        library: &mut SequenceLibrary,
        field: TrackedField,
        value: FieldValue,
    ) -> PipelineResult<()> {
        let previous = library.read(&field)?;
        if previous == value {
            return Ok(());
        }
        library.write(&field, value)?;
        debug!(?field, ?previous, ?value, "sequence field changed");
        self.entries.push(LedgerEntry { field, previous });
        Ok(())
    }

    /// Value `field` had before its first recorded change in this run.
    pub fn original_value(&self, field: &TrackedField) -> Option<FieldValue> {
        self.entries
            .iter()
            .find(|e| &e.field == field)
            .map(|e| e.previous)
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every recorded mutation, newest first, and clear the ledger.
    ///
    /// Returns the number of entries replayed. Stops at the first failing write, leaving the
    /// remaining entries in place.
    pub fn restore_all(&mut self, library: &mut SequenceLibrary) -> PipelineResult<usize> {
        let mut restored = 0;
        while let Some(entry) = self.entries.pop() {
            if let Err(e) = library.write(&entry.field, entry.previous) {
                self.entries.push(entry);
                return Err(e);
            }
            restored += 1;
        }
        debug!(restored, "sequence state restored");
        Ok(restored)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/ledger.rs"]
mod tests;
