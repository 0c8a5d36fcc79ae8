use std::collections::BTreeMap;

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::settings::records::{
    AntiAliasingSetting, CameraSetting, ExecutionSetting, HighResolutionSetting, OutputSetting,
    RenderPassesSetting, Setting, SettingKind,
};

/// Behavior table for one setting kind.
#[derive(Clone, Copy, Debug)]
pub struct SettingDescriptor {
    /// Kind this descriptor handles.
    pub kind: SettingKind,
    /// Builds the record used when neither the shot nor the job provides one.
    pub default: fn() -> Setting,
    /// Rejects records that cannot be used at all.
    pub validate: fn(&Setting) -> PipelineResult<()>,
    /// Whether the kind may appear in per-shot overrides.
    pub valid_on_shots: bool,
}

/// Explicit mapping from [`SettingKind`] to its [`SettingDescriptor`].
#[derive(Clone, Debug, Default)]
pub struct SettingsRegistry {
    descriptors: BTreeMap<SettingKind, SettingDescriptor>,
}

impl SettingsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SettingDescriptor {
            kind: SettingKind::Output,
            default: || Setting::Output(OutputSetting::default()),
            validate: validate_output,
            valid_on_shots: false,
        });
        registry.register(SettingDescriptor {
            kind: SettingKind::AntiAliasing,
            default: || Setting::AntiAliasing(AntiAliasingSetting::default()),
            validate: |_| Ok(()),
            valid_on_shots: true,
        });
        registry.register(SettingDescriptor {
            kind: SettingKind::Camera,
            default: || Setting::Camera(CameraSetting::default()),
            validate: validate_camera,
            valid_on_shots: true,
        });
        registry.register(SettingDescriptor {
            kind: SettingKind::HighResolution,
            default: || Setting::HighResolution(HighResolutionSetting::default()),
            validate: |_| Ok(()),
            valid_on_shots: true,
        });
        registry.register(SettingDescriptor {
            kind: SettingKind::RenderPasses,
            default: || Setting::RenderPasses(RenderPassesSetting::default()),
            validate: validate_render_passes,
            valid_on_shots: true,
        });
        registry.register(SettingDescriptor {
            kind: SettingKind::Execution,
            default: || Setting::Execution(ExecutionSetting::default()),
            validate: validate_execution,
            valid_on_shots: false,
        });
        registry
    }

    /// Add or replace a descriptor, returning the one it replaced.
    pub fn register(&mut self, descriptor: SettingDescriptor) -> Option<SettingDescriptor> {
        self.descriptors.insert(descriptor.kind, descriptor)
    }

    /// Descriptor for `kind`, if registered.
    pub fn descriptor(&self, kind: SettingKind) -> Option<&SettingDescriptor> {
        self.descriptors.get(&kind)
    }

    /// Default record for `kind`, if registered.
    pub fn default_for(&self, kind: SettingKind) -> Option<Setting> {
        self.descriptor(kind).map(|d| (d.default)())
    }

    /// Run the kind's validate hook. Unregistered kinds are rejected.
    pub fn validate(&self, setting: &Setting) -> PipelineResult<()> {
        let descriptor = self.descriptor(setting.kind()).ok_or_else(|| {
            PipelineError::validation(format!(
                "setting kind {:?} is not registered",
                setting.kind()
            ))
        })?;
        (descriptor.validate)(setting)
    }

    /// Registered kinds in tag order.
    pub fn kinds(&self) -> impl Iterator<Item = SettingKind> + '_ {
        self.descriptors.keys().copied()
    }
}

fn validate_output(setting: &Setting) -> PipelineResult<()> {
    let Setting::Output(s) = setting else {
        return Ok(());
    };
    if let Some(rate) = s.output_frame_rate {
        rate.validate()?;
    }
    if let Some(range) = s.custom_playback_range
        && range.start >= range.end
    {
        return Err(PipelineError::validation(
            "custom_playback_range start must be < end",
        ));
    }
    Ok(())
}

fn validate_camera(setting: &Setting) -> PipelineResult<()> {
    let Setting::Camera(s) = setting else {
        return Ok(());
    };
    if !s.shutter_angle.is_finite() || s.shutter_angle < 0.0 {
        return Err(PipelineError::validation(
            "shutter_angle must be a finite, non-negative number of degrees",
        ));
    }
    Ok(())
}

fn validate_render_passes(setting: &Setting) -> PipelineResult<()> {
    let Setting::RenderPasses(s) = setting else {
        return Ok(());
    };
    if s.passes.is_empty() {
        return Err(PipelineError::validation("render_passes must list at least one pass"));
    }
    for (i, pass) in s.passes.iter().enumerate() {
        if pass.trim().is_empty() {
            return Err(PipelineError::validation("render pass names must be non-empty"));
        }
        if s.passes[..i].contains(pass) {
            return Err(PipelineError::validation(format!(
                "render pass '{pass}' is listed twice"
            )));
        }
    }
    Ok(())
}

fn validate_execution(setting: &Setting) -> PipelineResult<()> {
    let Setting::Execution(s) = setting else {
        return Ok(());
    };
    if s.finalize_poll_interval_ms == 0 {
        return Err(PipelineError::validation(
            "finalize_poll_interval_ms must be > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/settings/registry.rs"]
mod tests;
