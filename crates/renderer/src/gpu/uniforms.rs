use bytemuck::{Pod, Zeroable};

use crate::mask::CellSize;

/// Mirrors the `DissolveParams` std140 block: a vec2 followed by two floats
/// packs into exactly 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct DissolveUniforms {
    pub character_size: [f32; 2],
    pub progress: f32,
    pub smoothness: f32,
}

impl DissolveUniforms {
    pub fn new(cell_size: CellSize, smoothness: f32) -> Self {
        Self {
            character_size: cell_size.as_array(),
            progress: 0.0,
            smoothness,
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = progress.clamp(0.0, 1.0);
        self
    }
}
