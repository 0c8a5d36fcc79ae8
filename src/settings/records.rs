use crate::foundation::core::FrameRate;
use crate::timing::metrics::ShutterTiming;

/// Tag identifying one kind of setting record.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    /// [`OutputSetting`].
    Output,
    /// [`AntiAliasingSetting`].
    AntiAliasing,
    /// [`CameraSetting`].
    Camera,
    /// [`HighResolutionSetting`].
    HighResolution,
    /// [`RenderPassesSetting`].
    RenderPasses,
    /// [`ExecutionSetting`].
    Execution,
}

impl SettingKind {
    /// Every built-in kind, in resolution order.
    pub const ALL: [SettingKind; 6] = [
        SettingKind::Output,
        SettingKind::AntiAliasing,
        SettingKind::Camera,
        SettingKind::HighResolution,
        SettingKind::RenderPasses,
        SettingKind::Execution,
    ];
}

/// Anti-aliasing technique the renderer applies on top of sub-sampling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiAliasingMethod {
    /// No post anti-aliasing.
    None,
    /// Fast approximate AA.
    Fxaa,
    /// Temporal AA; depends on full-frame history and cannot be tiled.
    #[default]
    TemporalAa,
}

/// Range in display-rate frames, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DisplayFrameRange {
    /// First frame.
    pub start: i64,
    /// One past the last frame.
    pub end: i64,
}

/// Output rate, handles and frame numbering.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Output frame rate; the sequence display rate when absent.
    pub output_frame_rate: Option<FrameRate>,
    /// Extra output frames rendered before and after each shot.
    pub handle_frame_count: u32,
    /// Replace the master playback range, in display-rate frames.
    pub custom_playback_range: Option<DisplayFrameRange>,
    /// Added to frame numbers used for file naming.
    pub frame_number_offset: i64,
}

impl Default for OutputSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            output_frame_rate: None,
            handle_frame_count: 0,
            custom_playback_range: None,
            frame_number_offset: 0,
        }
    }
}

/// Sample counts and warm-up.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AntiAliasingSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Temporal sub-samples per output frame.
    pub temporal_sample_count: u32,
    /// Spatial samples per temporal sample.
    pub spatial_sample_count: u32,
    /// Use `anti_aliasing_method` instead of the renderer default.
    pub override_anti_aliasing: bool,
    /// Method used when overriding.
    pub anti_aliasing_method: AntiAliasingMethod,
    /// Engine ticks run before the first sample of each camera cut.
    pub engine_warm_up_count: u32,
    /// Submit discarded samples during warm-up so renderer history fills.
    pub render_warm_up_frames: bool,
}

impl Default for AntiAliasingSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            temporal_sample_count: 1,
            spatial_sample_count: 1,
            override_anti_aliasing: false,
            anti_aliasing_method: AntiAliasingMethod::TemporalAa,
            engine_warm_up_count: 32,
            render_warm_up_frames: false,
        }
    }
}

/// Shutter.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Shutter angle in degrees.
    pub shutter_angle: f64,
    /// Shutter placement around the frame tick.
    pub shutter_timing: ShutterTiming,
    /// Evaluate one discarded frame before the first real frame so it has motion history.
    pub fix_first_frame_motion_blur: bool,
}

impl Default for CameraSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            shutter_angle: 180.0,
            shutter_timing: ShutterTiming::FrameCenter,
            fix_first_frame_motion_blur: true,
        }
    }
}

/// Tiled rendering.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HighResolutionSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Tiles per axis.
    pub tile_count: u32,
}

impl Default for HighResolutionSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            tile_count: 1,
        }
    }
}

/// Render passes the output expects per frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderPassesSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Pass names; each must report once per output frame.
    pub passes: Vec<String>,
}

impl Default for RenderPassesSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            passes: vec!["final_image".to_string()],
        }
    }
}

/// Finalize/export polling.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExecutionSetting {
    /// Disabled records are ignored during resolution.
    pub enabled: bool,
    /// Sleep between polls of a forced finish.
    pub finalize_poll_interval_ms: u64,
    /// Give up on stalled output containers after this long; wait forever when absent.
    pub finalize_timeout_ms: Option<u64>,
}

impl Default for ExecutionSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            finalize_poll_interval_ms: 10,
            finalize_timeout_ms: None,
        }
    }
}

/// One tagged setting record, as found in pipeline configs and shot overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Setting {
    /// Output rate, handles, numbering.
    Output(OutputSetting),
    /// Sampling and warm-up.
    AntiAliasing(AntiAliasingSetting),
    /// Shutter.
    Camera(CameraSetting),
    /// Tiling.
    HighResolution(HighResolutionSetting),
    /// Expected passes.
    RenderPasses(RenderPassesSetting),
    /// Finalize polling.
    Execution(ExecutionSetting),
}

impl Setting {
    /// Tag of this record.
    pub fn kind(&self) -> SettingKind {
        match self {
            Setting::Output(_) => SettingKind::Output,
            Setting::AntiAliasing(_) => SettingKind::AntiAliasing,
            Setting::Camera(_) => SettingKind::Camera,
            Setting::HighResolution(_) => SettingKind::HighResolution,
            Setting::RenderPasses(_) => SettingKind::RenderPasses,
            Setting::Execution(_) => SettingKind::Execution,
        }
    }

    /// Whether the record takes part in resolution.
    pub fn enabled(&self) -> bool {
        match self {
            Setting::Output(s) => s.enabled,
            Setting::AntiAliasing(s) => s.enabled,
            Setting::Camera(s) => s.enabled,
            Setting::HighResolution(s) => s.enabled,
            Setting::RenderPasses(s) => s.enabled,
            Setting::Execution(s) => s.enabled,
        }
    }
}
