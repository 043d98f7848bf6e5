//! GPU side of the dissolve.
//!
//! - `context` owns wgpu instance/device/surface wiring and reconfigures the
//!   swapchain on resize or loss.
//! - `textures` uploads the source image and glyph atlas.
//! - `pipeline` compiles the GLSL pair into the blended quad pipeline.
//! - `uniforms` mirrors the `DissolveParams` block.
//! - `state` ties them together as the [`RenderBackend`](crate::RenderBackend)
//!   the controller drives.

mod context;
mod pipeline;
mod state;
mod textures;
mod uniforms;

pub use state::GpuState;
