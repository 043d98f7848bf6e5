use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use scheduler::RunSettings;

/// Where one of the two input images comes from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// Decoded from disk on the loader thread when a run starts.
    Path(PathBuf),
    /// Already decoded by the caller.
    Decoded(Arc<DynamicImage>),
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Decoded(image) => {
                format!("<decoded {}x{}>", image.width(), image.height())
            }
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        ImageSource::Decoded(Arc::new(image))
    }
}

/// Which input an asset error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Source,
    Glyphs,
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRole::Source => f.write_str("source"),
            AssetRole::Glyphs => f.write_str("glyph atlas"),
        }
    }
}

/// Declares how the surface is blanked before each frame and on `clear()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceAlpha {
    /// Clear to opaque black.
    Opaque,
    /// Clear to transparent black so the compositor shows what lies beneath.
    #[default]
    Transparent,
}

impl SurfaceAlpha {
    pub fn clear_color(self) -> wgpu::Color {
        match self {
            SurfaceAlpha::Opaque => wgpu::Color::BLACK,
            SurfaceAlpha::Transparent => wgpu::Color::TRANSPARENT,
        }
    }
}

/// Mutable configuration owned by a controller.
///
/// `run()` copies the timing values into a [`RunSettings`] snapshot, so edits
/// made while an animation is in flight only apply to the next run.
#[derive(Clone, Debug)]
pub struct DissolveConfig {
    pub image_src: ImageSource,
    pub characters_src: ImageSource,
    pub duration: Duration,
    pub smoothness: f32,
    pub character_scaling: f32,
    /// Wait applied before the images are loaded.
    pub delay: Duration,
    pub surface_alpha: SurfaceAlpha,
}

impl DissolveConfig {
    pub const DEFAULT_DURATION: Duration = Duration::from_millis(4000);
    pub const DEFAULT_SMOOTHNESS: f32 = 0.2;
    pub const DEFAULT_CHARACTER_SCALING: f32 = 1.0;

    pub fn new(image_src: impl Into<ImageSource>, characters_src: impl Into<ImageSource>) -> Self {
        Self {
            image_src: image_src.into(),
            characters_src: characters_src.into(),
            duration: Self::DEFAULT_DURATION,
            smoothness: Self::DEFAULT_SMOOTHNESS,
            character_scaling: Self::DEFAULT_CHARACTER_SCALING,
            delay: Duration::ZERO,
            surface_alpha: SurfaceAlpha::default(),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            duration: self.duration,
            smoothness: self.smoothness,
            character_scaling: self.character_scaling,
            delay: self.delay,
        }
    }
}
