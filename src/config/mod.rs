//! Construction-time configuration for the rendering engine
//!
//! Everything here is read once when the atlas, renderer and scheduler are
//! built. Hosts may embed these structs in their own config via serde.

use serde::{Deserialize, Serialize};

use crate::colors::Rgb;
use crate::gpu::GpuBackendKind;

/// Top-level render configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub font: FontConfig,
    /// Explicit cell size in pixels (`None` = derive from font metrics)
    #[serde(default)]
    pub cell_width: Option<u32>,
    #[serde(default)]
    pub cell_height: Option<u32>,
    /// Limit presentation to the monitor refresh rate
    #[serde(default = "default_true")]
    pub vsync: bool,
    /// Preferred GPU backend
    #[serde(default)]
    pub backend: GpuBackendKind,
    /// Color the surface is cleared to before drawing
    #[serde(default)]
    pub clear_color: Rgb,
}

/// Render loop pacing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default)]
    pub mode: ScheduleMode,
}

/// Whether frames are produced every tick or only after a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Re-arm after every frame
    #[default]
    Continuous,
    /// Render only after `request_render`
    OnDemand,
}

/// Glyph atlas surface size in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtlasConfig {
    #[serde(default = "default_atlas_size")]
    pub width: u32,
    #[serde(default = "default_atlas_size")]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    /// Family name, informational; font bytes are supplied by the host
    #[serde(default = "default_font_family")]
    pub family: String,
    /// Size in pixels
    #[serde(default = "default_font_size")]
    pub size: f32,
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Target frame rate must be at least 1")]
    ZeroFrameRate,
    #[error("Atlas dimensions must be non-zero (got {0}x{1})")]
    EmptyAtlas(u32, u32),
    #[error("Font size must be positive (got {0})")]
    InvalidFontSize(f32),
    #[error("Cell dimensions must be non-zero")]
    EmptyCell,
}

impl RenderConfig {
    /// Check invariants the components rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.atlas.width == 0 || self.atlas.height == 0 {
            return Err(ConfigError::EmptyAtlas(self.atlas.width, self.atlas.height));
        }
        if !(self.font.size > 0.0) {
            return Err(ConfigError::InvalidFontSize(self.font.size));
        }
        if self.cell_width == Some(0) || self.cell_height == Some(0) {
            return Err(ConfigError::EmptyCell);
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            atlas: AtlasConfig::default(),
            font: FontConfig::default(),
            cell_width: None,
            cell_height: None,
            vsync: true,
            backend: GpuBackendKind::Auto,
            clear_color: Rgb::BLACK,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            mode: ScheduleMode::Continuous,
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            width: default_atlas_size(),
            height: default_atlas_size(),
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: default_font_family(),
            size: default_font_size(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_target_fps() -> u32 {
    60
}

fn default_atlas_size() -> u32 {
    1024
}

fn default_font_family() -> String {
    String::from("JetBrains Mono")
}

fn default_font_size() -> f32 {
    14.0
}
