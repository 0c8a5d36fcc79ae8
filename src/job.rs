use std::path::Path;

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::settings::records::Setting;
use crate::settings::resolve::PipelineConfig;

/// Per-shot entry of a job: enable flag and setting overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShotEntry {
    /// Outer shot section name this entry applies to.
    pub name: String,
    /// Disabled shots are planned but not rendered.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides applied on top of the pipeline config.
    #[serde(default)]
    pub settings: Vec<Setting>,
}

/// A render job: which sequence to render and how.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineJob {
    /// Job name, for logs and events.
    pub name: String,
    /// Name of the master sequence in the library.
    pub sequence: String,
    /// Pipeline-wide settings.
    #[serde(default)]
    pub config: PipelineConfig,
    /// Optional per-shot entries.
    #[serde(default)]
    pub shots: Vec<ShotEntry>,
}

fn default_true() -> bool {
    true
}

impl PipelineJob {
    /// Parse a job from JSON.
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        let job: Self = serde_json::from_str(s)?;
        job.validate()?;
        Ok(job)
    }

    /// Load a job from a JSON file.
    pub fn from_json_path(path: &Path) -> PipelineResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Other(
                anyhow::Error::new(e).context(format!("read job '{}'", path.display())),
            )
        })?;
        Self::from_json_str(&s)
    }

    /// Structural checks that do not need the sequence library.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.sequence.trim().is_empty() {
            return Err(PipelineError::initialization("job has no sequence"));
        }
        for (i, entry) in self.shots.iter().enumerate() {
            if self.shots[..i].iter().any(|e| e.name == entry.name) {
                return Err(PipelineError::validation(format!(
                    "job lists shot '{}' more than once",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Entry for shot `name`, if any.
    pub fn shot_entry(&self, name: &str) -> Option<&ShotEntry> {
        self.shots.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
#[path = "../tests/unit/job.rs"]
mod tests;
