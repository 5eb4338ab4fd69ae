//! Furnace Render - GPU cell rendering for terminal emulators
//!
//! This library draws a terminal cell grid with one instanced GPU draw call
//! per frame, caching rasterized glyphs in a shelf-packed atlas and pacing
//! redraws against a target frame rate.
//!
//! # Modules
//!
//! - [`config`]: Renderer, atlas and scheduler configuration
//! - [`colors`]: 24-bit colors and the ANSI 256 palette
//! - [`grid`]: Cell model and the [`grid::CellGrid`] source trait
//! - [`gpu`]: Glyph atlas, instanced renderer and the wgpu backend
//! - [`scheduler`]: Frame-paced render loop with telemetry

pub mod colors;
pub mod config;
pub mod grid;

/// GPU cell rendering
///
/// The wgpu backend and the fontdue rasterizer need the `gpu` feature
/// (enabled by default); the atlas and renderer logic are always available.
pub mod gpu;

pub mod scheduler;

pub use colors::Rgb;
pub use config::{RenderConfig, ScheduleMode, SchedulerConfig};
pub use grid::{Cell, CellFlags, CellGrid, Grid};
pub use gpu::{GlyphAtlas, InstancedRenderer, Rasterizer};
pub use scheduler::{FrameStats, RenderHandle, RenderOptimizer, TickOutcome};
