use tracing::warn;

use crate::foundation::core::FrameRate;
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::settings::records::{
    AntiAliasingMethod, AntiAliasingSetting, CameraSetting, ExecutionSetting,
    HighResolutionSetting, OutputSetting, RenderPassesSetting, Setting, SettingKind,
};
use crate::settings::registry::SettingsRegistry;
use crate::timing::metrics::FrameConstantMetrics;

/// Pipeline-wide settings shared by every shot of a job.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Setting records; at most one per kind.
    #[serde(default)]
    pub settings: Vec<Setting>,
}

impl PipelineConfig {
    /// Check every record against the registry and reject duplicate kinds.
    pub fn validate(&self, registry: &SettingsRegistry) -> PipelineResult<()> {
        validate_list(&self.settings, registry, "pipeline config")
    }

    /// Enabled record of `kind`, if present.
    pub fn find(&self, kind: SettingKind) -> Option<&Setting> {
        find_enabled(&self.settings, kind)
    }
}

/// Non-fatal settings problem that was corrected automatically.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum SettingsWarning {
    /// A kind that only applies pipeline-wide was found in a shot override.
    IgnoredOnShot {
        /// Shot name.
        shot: String,
        /// Offending kind.
        kind: SettingKind,
    },
    /// Temporal AA cannot be tiled; the method was downgraded to `none`.
    TemporalAaWithTiles {
        /// Shot name.
        shot: String,
    },
    /// A sample count of zero was clamped to one.
    ZeroSampleCount {
        /// Shot name.
        shot: String,
        /// `"temporal"` or `"spatial"`.
        which: &'static str,
    },
    /// A tile count of zero was clamped to one.
    ZeroTileCount {
        /// Shot name.
        shot: String,
    },
}

/// Fully resolved settings for one shot.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ResolvedShotSettings {
    /// Output rate and handles.
    pub output: OutputSetting,
    /// Sampling and warm-up.
    pub anti_aliasing: AntiAliasingSetting,
    /// Shutter.
    pub camera: CameraSetting,
    /// Tiling.
    pub high_resolution: HighResolutionSetting,
    /// Expected passes.
    pub render_passes: RenderPassesSetting,
    /// Finalize polling.
    pub execution: ExecutionSetting,
}

impl ResolvedShotSettings {
    fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::Output(s) => self.output = s,
            Setting::AntiAliasing(s) => self.anti_aliasing = s,
            Setting::Camera(s) => self.camera = s,
            Setting::HighResolution(s) => self.high_resolution = s,
            Setting::RenderPasses(s) => self.render_passes = s,
            Setting::Execution(s) => self.execution = s,
        }
    }

    /// Output frame rate, falling back to the sequence display rate.
    pub fn output_frame_rate(&self, display_rate: FrameRate) -> FrameRate {
        self.output.output_frame_rate.unwrap_or(display_rate)
    }

    /// Tiles along x and y.
    pub fn tiles(&self) -> (u32, u32) {
        (self.high_resolution.tile_count, self.high_resolution.tile_count)
    }

    /// Timing constants for a sequence with the given rates.
    pub fn metrics(
        &self,
        tick_resolution: FrameRate,
        display_rate: FrameRate,
    ) -> PipelineResult<FrameConstantMetrics> {
        FrameConstantMetrics::new(
            tick_resolution,
            self.output_frame_rate(display_rate),
            self.camera.shutter_angle,
            self.camera.shutter_timing,
            self.anti_aliasing.temporal_sample_count,
        )
    }
}

/// Resolves settings per shot: shot override, then pipeline config, then registry default.
#[derive(Clone, Copy, Debug)]
pub struct SettingsResolver<'a> {
    registry: &'a SettingsRegistry,
    config: &'a PipelineConfig,
}

impl<'a> SettingsResolver<'a> {
    /// Create a resolver; the config is validated up front.
    pub fn new(registry: &'a SettingsRegistry, config: &'a PipelineConfig) -> PipelineResult<Self> {
        config.validate(registry)?;
        Ok(Self { registry, config })
    }

    /// Settings with no shot override applied.
    pub fn resolve_master(&self) -> PipelineResult<(ResolvedShotSettings, Vec<SettingsWarning>)> {
        self.resolve_shot("<master>", &[])
    }

    /// Settings for `shot`, applying `overrides` where they are enabled and allowed.
    pub fn resolve_shot(
        &self,
        shot: &str,
        overrides: &[Setting],
    ) -> PipelineResult<(ResolvedShotSettings, Vec<SettingsWarning>)> {
        validate_list(overrides, self.registry, shot)?;
        let mut warnings = Vec::new();

        for s in overrides {
            let allowed = self
                .registry
                .descriptor(s.kind())
                .is_some_and(|d| d.valid_on_shots);
            if !allowed && s.enabled() {
                warnings.push(SettingsWarning::IgnoredOnShot {
                    shot: shot.to_string(),
                    kind: s.kind(),
                });
            }
        }

        let mut resolved = ResolvedShotSettings::default();
        for kind in SettingKind::ALL {
            let from_shot = find_enabled(overrides, kind).filter(|_| {
                self.registry
                    .descriptor(kind)
                    .is_some_and(|d| d.valid_on_shots)
            });
            let picked = from_shot
                .or_else(|| self.config.find(kind))
                .cloned()
                .or_else(|| self.registry.default_for(kind));
            if let Some(setting) = picked {
                resolved.apply(setting);
            }
        }

        normalize(shot, &mut resolved, &mut warnings);
        for w in &warnings {
            warn!(warning = ?w, "settings adjusted");
        }
        Ok((resolved, warnings))
    }
}

fn normalize(shot: &str, s: &mut ResolvedShotSettings, warnings: &mut Vec<SettingsWarning>) {
    if s.anti_aliasing.temporal_sample_count == 0 {
        s.anti_aliasing.temporal_sample_count = 1;
        warnings.push(SettingsWarning::ZeroSampleCount {
            shot: shot.to_string(),
            which: "temporal",
        });
    }
    if s.anti_aliasing.spatial_sample_count == 0 {
        s.anti_aliasing.spatial_sample_count = 1;
        warnings.push(SettingsWarning::ZeroSampleCount {
            shot: shot.to_string(),
            which: "spatial",
        });
    }
    if s.high_resolution.tile_count == 0 {
        s.high_resolution.tile_count = 1;
        warnings.push(SettingsWarning::ZeroTileCount {
            shot: shot.to_string(),
        });
    }
    if s.high_resolution.tile_count > 1
        && s.anti_aliasing.override_anti_aliasing
        && s.anti_aliasing.anti_aliasing_method == AntiAliasingMethod::TemporalAa
    {
        s.anti_aliasing.anti_aliasing_method = AntiAliasingMethod::None;
        warnings.push(SettingsWarning::TemporalAaWithTiles {
            shot: shot.to_string(),
        });
    }
}

fn find_enabled(settings: &[Setting], kind: SettingKind) -> Option<&Setting> {
    settings.iter().find(|s| s.kind() == kind && s.enabled())
}

fn validate_list(
    settings: &[Setting],
    registry: &SettingsRegistry,
    owner: &str,
) -> PipelineResult<()> {
    for (i, s) in settings.iter().enumerate() {
        registry.validate(s)?;
        if settings[..i].iter().any(|prev| prev.kind() == s.kind()) {
            return Err(PipelineError::validation(format!(
                "{owner}: setting kind {:?} appears more than once",
                s.kind()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/settings/resolve.rs"]
mod tests;
