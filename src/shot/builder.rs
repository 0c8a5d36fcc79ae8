use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::foundation::core::{FrameNumber, FrameTime, TickRange};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::job::PipelineJob;
use crate::sequence::ledger::{FieldValue, RestoreLedger, TrackedField};
use crate::sequence::model::{
    SectionTransform, Sequence, SequenceId, SequenceLibrary, ShotSection,
};
use crate::settings::records::OutputSetting;
use crate::settings::registry::SettingsRegistry;
use crate::settings::resolve::{SettingsResolver, SettingsWarning};
use crate::shot::model::{CameraCutInfo, ShotInfo, SourceTiming};

/// Recoverable problem found while building the shot plan.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum BuildWarning {
    /// An inactive shot section was skipped.
    InactiveSection {
        /// Shot name.
        shot: String,
    },
    /// A shot or camera cut section with no length was skipped.
    ZeroLengthSection {
        /// Shot name.
        shot: String,
    },
    /// An inactive camera cut section was skipped.
    InactiveCameraCut {
        /// Shot name.
        shot: String,
        /// Index on the camera cut track.
        index: usize,
    },
    /// A cut shorter than one output frame was dropped.
    CutShorterThanFrame {
        /// Shot name.
        shot: String,
        /// Dropped range, in master ticks.
        range: TickRange,
    },
    /// A shot lost all of its cuts and was dropped.
    EmptyShot {
        /// Shot name.
        shot: String,
    },
    /// The master has neither a shot track nor a camera cut track; the camera is driven
    /// externally.
    NoShotOrCameraCutTrack {
        /// Master sequence name.
        sequence: String,
    },
    /// A section was widened for handles but has no keys before the new start.
    SectionCannotExpand {
        /// Owning sequence name.
        sequence: String,
        /// Track name.
        track: String,
        /// Section index within the track.
        section: usize,
    },
    /// A job shot entry matched no shot.
    UnknownShotEntry {
        /// Entry name.
        name: String,
    },
    /// Settings were adjusted during resolution.
    Settings(SettingsWarning),
}

/// Result of [`ShotBuilder::build`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ShotPlan {
    /// Master sequence.
    pub master: SequenceId,
    /// Playback range after applying any custom range, before handles.
    pub playback_range: TickRange,
    /// Shots sorted by expanded range start.
    pub shots: Vec<ShotInfo>,
    /// Everything that was skipped or adjusted.
    pub warnings: Vec<BuildWarning>,
}

struct Candidate {
    name: String,
    section_index: Option<usize>,
    inner: Option<SequenceId>,
    range: TickRange,
    cuts: Vec<(TickRange, Option<String>)>,
    source: SourceTiming,
}

/// Turns a job's master sequence into an ordered, handle-expanded shot plan.
pub struct ShotBuilder<'a> {
    job: &'a PipelineJob,
    registry: &'a SettingsRegistry,
}

impl<'a> ShotBuilder<'a> {
    /// Create a builder for `job`.
    pub fn new(job: &'a PipelineJob, registry: &'a SettingsRegistry) -> Self {
        Self { job, registry }
    }

    /// Build the plan, recording every sequence edit made for handle expansion in `ledger`.
    #[tracing::instrument(skip_all, fields(job = %self.job.name, sequence = %self.job.sequence))]
    pub fn build(
        &self,
        library: &mut SequenceLibrary,
        ledger: &mut RestoreLedger,
    ) -> PipelineResult<ShotPlan> {
        let resolver = SettingsResolver::new(self.registry, &self.job.config)?;
        let master_id = library
            .find(&self.job.sequence)
            .ok_or_else(|| PipelineError::MissingSequence(self.job.sequence.clone()))?;
        let master = library.sequence(master_id)?.clone();

        let mut warnings = Vec::new();
        let (master_settings, settings_warnings) = resolver.resolve_master()?;
        warnings.extend(settings_warnings.into_iter().map(BuildWarning::Settings));
        let playback_range = effective_playback_range(&master, &master_settings.output);

        let candidates = match &master.shot_track {
            Some(track) => {
                let mut out = Vec::new();
                for (i, section) in track.sections.iter().enumerate() {
                    if let Some(c) =
                        shot_candidate(library, &master, i, section, playback_range, &mut warnings)?
                    {
                        out.push(c);
                    }
                }
                out
            }
            None => vec![whole_sequence_candidate(&master, playback_range, &mut warnings)],
        };

        for entry in &self.job.shots {
            if !candidates.iter().any(|c| c.name == entry.name) {
                note(
                    &mut warnings,
                    BuildWarning::UnknownShotEntry {
                        name: entry.name.clone(),
                    },
                );
            }
        }

        let mut expanded_inner: HashMap<SequenceId, TickRange> = HashMap::new();
        let mut shots = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            let entry = self.job.shot_entry(&candidate.name);
            let overrides = entry.map(|e| e.settings.as_slice()).unwrap_or(&[]);
            let (settings, settings_warnings) = resolver.resolve_shot(&candidate.name, overrides)?;
            warnings.extend(settings_warnings.into_iter().map(BuildWarning::Settings));
            let metrics = settings.metrics(master.tick_resolution, master.display_rate)?;

            let mut cuts = Vec::with_capacity(candidate.cuts.len());
            for (range, camera) in std::mem::take(&mut candidate.cuts) {
                if FrameTime::from_frame(FrameNumber(range.len())) < metrics.ticks_per_output_frame
                {
                    note(
                        &mut warnings,
                        BuildWarning::CutShorterThanFrame {
                            shot: candidate.name.clone(),
                            range,
                        },
                    );
                    continue;
                }
                cuts.push(CameraCutInfo::new(
                    range,
                    camera,
                    &settings,
                    metrics,
                    candidate.source,
                ));
            }
            if cuts.is_empty() {
                note(
                    &mut warnings,
                    BuildWarning::EmptyShot {
                        shot: candidate.name.clone(),
                    },
                );
                continue;
            }
            cuts.sort_by_key(|c| c.total_output_range.start);

            let handle_frame_count = settings.output.handle_frame_count;
            let handle = metrics
                .output_frames_to_ticks(i64::from(handle_frame_count))
                .floor_to_frame()
                .0;
            let total_output_range = candidate.range.dilated(handle, handle);
            if let Some(first) = cuts.first_mut() {
                first.total_output_range.start -= handle;
            }
            if let Some(last) = cuts.last_mut() {
                last.total_output_range.end += handle;
            }

            if handle > 0 {
                expand_shot(
                    library,
                    ledger,
                    master_id,
                    &candidate,
                    handle,
                    playback_range,
                    &mut expanded_inner,
                    &mut warnings,
                )?;
            }

            shots.push(ShotInfo {
                name: candidate.name,
                section_index: candidate.section_index,
                inner_sequence: candidate.inner,
                enabled: entry.is_none_or(|e| e.enabled),
                original_range: candidate.range,
                total_output_range,
                handle_frame_range_start: TickRange {
                    start: total_output_range.start,
                    end: candidate.range.start,
                },
                handle_frame_range_end: TickRange {
                    start: candidate.range.end,
                    end: total_output_range.end,
                },
                handle_frame_count,
                has_override: entry.is_some_and(|e| !e.settings.is_empty()),
                settings,
                camera_cuts: cuts,
                current_camera_cut_index: 0,
            });
        }

        if shots.is_empty() {
            return Err(PipelineError::initialization(format!(
                "sequence '{}' has nothing to render",
                master.name
            )));
        }
        shots.sort_by_key(|s| s.total_output_range.start);

        info!(
            shots = shots.len(),
            cuts = shots.iter().map(|s| s.camera_cuts.len()).sum::<usize>(),
            warnings = warnings.len(),
            "shot plan built"
        );
        Ok(ShotPlan {
            master: master_id,
            playback_range,
            shots,
            warnings,
        })
    }
}

fn note(warnings: &mut Vec<BuildWarning>, warning: BuildWarning) {
    warn!(warning = ?warning, "shot plan");
    warnings.push(warning);
}

/// Master playback range, replaced by the output setting's custom range when one is set.
pub fn effective_playback_range(master: &Sequence, output: &OutputSetting) -> TickRange {
    match output.custom_playback_range {
        Some(r) => TickRange {
            start: FrameNumber(r.start),
            end: FrameNumber(r.end),
        }
        .transform(master.display_rate, master.tick_resolution),
        None => master.playback_range,
    }
}

fn shot_candidate(
    library: &SequenceLibrary,
    master: &Sequence,
    index: usize,
    section: &ShotSection,
    playback_range: TickRange,
    warnings: &mut Vec<BuildWarning>,
) -> PipelineResult<Option<Candidate>> {
    if !section.active {
        note(
            warnings,
            BuildWarning::InactiveSection {
                shot: section.name.clone(),
            },
        );
        return Ok(None);
    }
    if section.range.is_empty() {
        note(
            warnings,
            BuildWarning::ZeroLengthSection {
                shot: section.name.clone(),
            },
        );
        return Ok(None);
    }
    let Some(range) = section.range.intersect(playback_range) else {
        debug!(shot = %section.name, "shot outside playback range");
        return Ok(None);
    };

    let inner_id = library
        .find(&section.sequence)
        .ok_or_else(|| PipelineError::MissingSequence(section.sequence.clone()))?;
    let inner = library.sequence(inner_id)?;
    let transform = SectionTransform::new(section, master.tick_resolution, inner);
    let source = SourceTiming {
        transform,
        tick_resolution: inner.tick_resolution,
        display_rate: inner.display_rate,
    };

    let mut cuts = Vec::new();
    if let Some(track) = &inner.camera_cut_track {
        for (k, cut) in track.sections.iter().enumerate() {
            if !cut.active {
                note(
                    warnings,
                    BuildWarning::InactiveCameraCut {
                        shot: section.name.clone(),
                        index: k,
                    },
                );
                continue;
            }
            if cut.range.is_empty() {
                note(
                    warnings,
                    BuildWarning::ZeroLengthSection {
                        shot: section.name.clone(),
                    },
                );
                continue;
            }
            if let Some(r) = transform.range_to_outer(cut.range).intersect(range) {
                cuts.push((r, cut.camera.clone()));
            }
        }
    }
    if cuts.is_empty() {
        cuts.push((range, None));
    }

    Ok(Some(Candidate {
        name: section.name.clone(),
        section_index: Some(index),
        inner: Some(inner_id),
        range,
        cuts,
        source,
    }))
}

fn whole_sequence_candidate(
    master: &Sequence,
    playback_range: TickRange,
    warnings: &mut Vec<BuildWarning>,
) -> Candidate {
    let mut cuts = Vec::new();
    match &master.camera_cut_track {
        Some(track) => {
            for (k, cut) in track.sections.iter().enumerate() {
                if !cut.active {
                    note(
                        warnings,
                        BuildWarning::InactiveCameraCut {
                            shot: master.name.clone(),
                            index: k,
                        },
                    );
                    continue;
                }
                if let Some(r) = cut.range.intersect(playback_range) {
                    cuts.push((r, cut.camera.clone()));
                }
            }
        }
        None => note(
            warnings,
            BuildWarning::NoShotOrCameraCutTrack {
                sequence: master.name.clone(),
            },
        ),
    }
    if cuts.is_empty() {
        cuts.push((playback_range, None));
    }

    Candidate {
        name: master.name.clone(),
        section_index: None,
        inner: None,
        range: playback_range,
        cuts,
        source: SourceTiming {
            transform: SectionTransform::identity(),
            tick_resolution: master.tick_resolution,
            display_rate: master.display_rate,
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_shot(
    library: &mut SequenceLibrary,
    ledger: &mut RestoreLedger,
    master_id: SequenceId,
    candidate: &Candidate,
    handle: i64,
    playback_range: TickRange,
    expanded_inner: &mut HashMap<SequenceId, TickRange>,
    warnings: &mut Vec<BuildWarning>,
) -> PipelineResult<()> {
    let Some(section_index) = candidate.section_index else {
        // Whole-sequence shot: the master itself is the evaluated sequence.
        let widened = playback_range.dilated(handle, handle);
        return expand_sections(library, ledger, master_id, playback_range, widened, warnings);
    };

    let section = master_shot_section(library, master_id, section_index)?;
    ledger.set(
        library,
        TrackedField::ShotSectionRange {
            sequence: master_id,
            section: section_index,
        },
        FieldValue::Range(section.range.dilated(handle, handle)),
    )?;

    let Some(inner_id) = candidate.inner.filter(|id| *id != master_id) else {
        return Ok(());
    };
    let inner_range = library.sequence(inner_id)?.playback_range;
    let authored = *expanded_inner.entry(inner_id).or_insert(inner_range);

    let ratio = candidate.source.transform.inner_per_outer();
    let outer_handle = FrameTime::from_frame(FrameNumber(handle)) * ratio;
    let inner_handle = outer_handle.ceil_to_frame().0;
    let widened = inner_range.hull(authored.dilated(inner_handle, inner_handle));
    ledger.set(
        library,
        TrackedField::PlaybackRange(inner_id),
        FieldValue::Range(widened),
    )?;

    // Keep inner = start + offset + (outer - section start) * ratio unchanged for the moved
    // section start and playback start.
    let shift = FrameTime::from_frame(FrameNumber(authored.start - widened.start)) - outer_handle;
    ledger.set(
        library,
        TrackedField::ShotSectionStartOffset {
            sequence: master_id,
            section: section_index,
        },
        FieldValue::Offset(section.start_frame_offset + shift.ceil_to_frame().0),
    )?;

    expand_sections(library, ledger, inner_id, authored, widened, warnings)
}

fn master_shot_section(
    library: &SequenceLibrary,
    master_id: SequenceId,
    index: usize,
) -> PipelineResult<ShotSection> {
    library
        .sequence(master_id)?
        .shot_track
        .as_ref()
        .and_then(|t| t.sections.get(index))
        .cloned()
        .ok_or_else(|| PipelineError::validation(format!("shot section #{index} vanished")))
}

/// Widen generic sections that sat on the authored playback bounds out to the new bounds.
fn expand_sections(
    library: &mut SequenceLibrary,
    ledger: &mut RestoreLedger,
    sequence_id: SequenceId,
    authored: TickRange,
    widened: TickRange,
    warnings: &mut Vec<BuildWarning>,
) -> PipelineResult<()> {
    let sequence = library.sequence(sequence_id)?.clone();
    for (t, track) in sequence.tracks.iter().enumerate() {
        for (k, section) in track.sections.iter().enumerate() {
            let field = TrackedField::TrackSectionRange {
                sequence: sequence_id,
                track: t,
                section: k,
            };
            let original = match ledger.original_value(&field) {
                Some(FieldValue::Range(r)) => r,
                _ => section.range,
            };
            let mut range = section.range;
            if original.start == authored.start && widened.start < range.start {
                range.start = widened.start;
                if section.earliest_key.is_some_and(|key| key > widened.start) {
                    note(
                        warnings,
                        BuildWarning::SectionCannotExpand {
                            sequence: sequence.name.clone(),
                            track: track.name.clone(),
                            section: k,
                        },
                    );
                }
            }
            if original.end == authored.end && widened.end > range.end {
                range.end = widened.end;
            }
            if range != section.range {
                ledger.set(library, field, FieldValue::Range(range))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/shot/builder.rs"]
mod tests;
