use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use image::{DynamicImage, GrayImage, RgbaImage};
use scheduler::RunId;

use crate::error::DissolveError;
use crate::types::{AssetRole, ImageSource};

/// Decoded inputs for one run, converted to the layouts the GPU expects.
#[derive(Debug, Clone)]
pub struct DissolveAssets {
    pub source: RgbaImage,
    pub glyphs: GrayImage,
}

impl DissolveAssets {
    pub fn from_images(source: &DynamicImage, glyphs: &DynamicImage) -> Self {
        Self {
            source: source.to_rgba8(),
            glyphs: glyphs.to_luma8(),
        }
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn glyph_dimensions(&self) -> (u32, u32) {
        self.glyphs.dimensions()
    }
}

/// Loads both images synchronously.
pub fn load_assets(
    image_src: &ImageSource,
    characters_src: &ImageSource,
) -> Result<DissolveAssets, DissolveError> {
    let (source, glyphs) = thread::scope(|scope| {
        let glyphs = scope.spawn(|| load_image(characters_src, AssetRole::Glyphs));
        let source = load_image(image_src, AssetRole::Source);
        let glyphs = glyphs
            .join()
            .unwrap_or(Err(DissolveError::LoaderDisconnected));
        (source, glyphs)
    });
    Ok(DissolveAssets::from_images(&source?, &glyphs?))
}

fn load_image(source: &ImageSource, role: AssetRole) -> Result<DynamicImage, DissolveError> {
    match source {
        ImageSource::Decoded(image) => Ok(image.as_ref().clone()),
        ImageSource::Path(path) => {
            image::open(path).map_err(|source| DissolveError::ResourceLoad {
                role,
                path: path.clone(),
                source,
            })
        }
    }
}

/// Images loading in the background for a specific run.
pub(crate) struct PendingAssets {
    run: RunId,
    receiver: Receiver<Result<DissolveAssets, DissolveError>>,
}

impl PendingAssets {
    pub(crate) fn spawn(
        run: RunId,
        image_src: ImageSource,
        characters_src: ImageSource,
        delay: Duration,
    ) -> Self {
        let (sender, receiver) = bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("dissolve-loader-{}", run.get()))
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                let result = load_assets(&image_src, &characters_src);
                // The receiver is gone when a newer run replaced this one.
                let _ = sender.send(result);
            });
        if let Err(err) = spawned {
            tracing::error!(%run, error = %err, "failed to spawn asset loader thread");
        }
        Self { run, receiver }
    }

    pub(crate) fn run(&self) -> RunId {
        self.run
    }

    pub(crate) fn poll(&self) -> Option<Result<DissolveAssets, DissolveError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DissolveError::LoaderDisconnected)),
        }
    }

    pub(crate) fn wait(&self, timeout: Duration) -> Option<Result<DissolveAssets, DissolveError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Some(Err(DissolveError::LoaderDisconnected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;

    fn solid(width: u32, height: u32) -> ImageSource {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]))).into()
    }

    #[test]
    fn decoded_sources_are_converted() {
        let assets = load_assets(&solid(100, 80), &solid(20, 10)).expect("assets");
        assert_eq!(assets.source_dimensions(), (100, 80));
        assert_eq!(assets.glyph_dimensions(), (20, 10));
        assert_eq!(assets.source.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn missing_file_reports_its_role() {
        let missing = ImageSource::Path(PathBuf::from("/nonexistent/glyphs.png"));
        let err = load_assets(&solid(4, 4), &missing).unwrap_err();
        match err {
            DissolveError::ResourceLoad { role, path, .. } => {
                assert_eq!(role, AssetRole::Glyphs);
                assert_eq!(path, PathBuf::from("/nonexistent/glyphs.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn background_load_delivers_once() {
        let pending = PendingAssets::spawn(
            scheduler::AnimationScheduler::new().begin_run(Default::default()),
            solid(8, 8),
            solid(4, 2),
            Duration::from_millis(5),
        );
        let assets = pending
            .wait(Duration::from_secs(5))
            .expect("loader finished")
            .expect("assets");
        assert_eq!(assets.glyph_dimensions(), (4, 2));
    }
}
