//! Binary dissolve renderer.
//!
//! Reveals a source image cell by cell through a two-glyph character atlas.
//! Each cell picks one of the two glyphs and a reveal threshold from a
//! deterministic hash of its grid coordinate, then fades in as progress
//! sweeps past that threshold.
//!
//! ```text
//!   DissolveConfig ──▶ DissolveController::run ──▶ loader thread (delay, decode)
//!                               │                            │ DissolveAssets
//!                               ▼                            ▼
//!                     AnimationScheduler ◀── poll_setup ── RenderBackend::install
//!                               │
//!                               └─▶ frame(now) ─▶ RenderBackend::present(progress)
//! ```
//!
//! [`GpuState`] is the wgpu backend. [`DissolveElement`] wraps a controller in
//! a winit window running on its own thread. [`mask`] evaluates the same mask
//! on the CPU for inspection and tests.

mod assets;
mod compile;
mod controller;
mod error;
mod gpu;
pub mod mask;
mod types;
mod window;

pub use assets::{load_assets, DissolveAssets};
pub use controller::{create_dissolve, DissolveController, FrameOutcome, RenderBackend};
pub use error::DissolveError;
pub use gpu::GpuState;
pub use mask::CellSize;
pub use types::{AssetRole, DissolveConfig, ImageSource, SurfaceAlpha};
pub use window::{DissolveElement, ElementEvent, ElementOptions};

pub use scheduler::{Phase, RunId, RunSettings};
