use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use fxconfig::{ClearSetting, EffectConfig};
use renderer::{
    DissolveConfig, DissolveElement, ElementEvent, ElementOptions, ImageSource, SurfaceAlpha,
};
use tracing_subscriber::EnvFilter;

use crate::cli::EffectArgs;
use crate::paths::{default_config_path, relative_to_config};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file layer plus command-line overrides, validated.
pub fn merged_config(args: &EffectArgs) -> Result<EffectConfig> {
    let base = load_config_file(args.config.as_deref())?.unwrap_or_default();
    let merged = base.merge(args.overrides());
    merged.validate()?;
    Ok(merged)
}

/// Builds the engine configuration; both image paths are required here.
pub fn dissolve_config(config: &EffectConfig) -> Result<DissolveConfig> {
    let image = config
        .image
        .clone()
        .ok_or_else(|| anyhow!("no image given; pass IMAGE or set `image` in the config file"))?;
    let characters = config.characters.clone().ok_or_else(|| {
        anyhow!("no glyph atlas given; pass CHARACTERS or set `characters` in the config file")
    })?;

    let mut dissolve = DissolveConfig::new(ImageSource::Path(image), ImageSource::Path(characters));
    if let Some(duration) = config.duration {
        dissolve.duration = duration;
    }
    if let Some(delay) = config.delay {
        dissolve.delay = delay;
    }
    if let Some(smoothness) = config.smoothness {
        dissolve.smoothness = smoothness;
    }
    if let Some(scaling) = config.character_scaling {
        dissolve.character_scaling = scaling;
    }
    dissolve.surface_alpha = match config.clear.unwrap_or_default() {
        ClearSetting::Transparent => SurfaceAlpha::Transparent,
        ClearSetting::Opaque => SurfaceAlpha::Opaque,
    };
    Ok(dissolve)
}

fn load_config_file(explicit: Option<&Path>) -> Result<Option<EffectConfig>> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(None),
        },
    };
    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(None);
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut config = EffectConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config file {}", path.display()))?;
    config.image = config.image.map(|image| relative_to_config(&image, &path));
    config.characters = config
        .characters
        .map(|characters| relative_to_config(&characters, &path));
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some(config))
}

/// Opens the dissolve window and blocks until it closes.
pub fn run(args: EffectArgs) -> Result<()> {
    let config = merged_config(&args)?;
    let dissolve = dissolve_config(&config)?;
    let title = window_title(config.image.as_deref());
    tracing::info!(
        image = %dissolve.image_src.describe(),
        characters = %dissolve.characters_src.describe(),
        "opening dissolve window"
    );

    let element = DissolveElement::spawn(
        dissolve,
        ElementOptions {
            title,
            exit_on_finish: args.exit_on_finish,
            ..ElementOptions::default()
        },
    )?;

    let mut failure = None;
    while let Some(event) = element.recv_event() {
        match event {
            ElementEvent::Started { run, columns, rows } => {
                tracing::info!(%run, columns, rows, "reveal started");
            }
            ElementEvent::Finished { run } => {
                tracing::info!(%run, "reveal finished");
            }
            ElementEvent::SetupFailed { message } => {
                failure = Some(message);
            }
            ElementEvent::Closed => break,
        }
    }
    element.join()?;

    match failure {
        Some(message) if args.exit_on_finish => bail!(message),
        _ => Ok(()),
    }
}

fn window_title(image: Option<&Path>) -> String {
    image
        .and_then(Path::file_name)
        .map(|name| format!("Binary Dissolve: {}", name.to_string_lossy()))
        .unwrap_or_else(|| "Binary Dissolve".to_string())
}

pub fn print_config(args: EffectArgs) -> Result<()> {
    let config = merged_config(&args)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "image = \"photo.png\"\ncharacters = \"glyphs.png\"\nduration = \"3s\"\nsmoothness = 0.5\n",
        )
        .unwrap();

        let args = EffectArgs {
            config: Some(config_path),
            smoothness: Some(0.1),
            ..EffectArgs::default()
        };
        let merged = merged_config(&args).expect("merge");
        assert_eq!(merged.image, Some(dir.path().join("photo.png")));
        assert_eq!(merged.duration, Some(Duration::from_secs(3)));
        assert_eq!(merged.smoothness, Some(0.1));

        let dissolve = dissolve_config(&merged).expect("dissolve config");
        assert_eq!(dissolve.duration, Duration::from_secs(3));
        assert_eq!(dissolve.character_scaling, DissolveConfig::DEFAULT_CHARACTER_SCALING);
        assert_eq!(dissolve.surface_alpha, SurfaceAlpha::Transparent);
    }

    #[test]
    fn explicit_config_must_exist() {
        let args = EffectArgs {
            config: Some(PathBuf::from("/nonexistent/binary-dissolve.toml")),
            ..EffectArgs::default()
        };
        assert!(merged_config(&args).is_err());
    }

    #[test]
    fn missing_images_are_reported() {
        let err = dissolve_config(&EffectConfig::default()).unwrap_err();
        assert!(err.to_string().contains("IMAGE"));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();
        let args = EffectArgs {
            config: Some(config_path),
            duration: Some(Duration::ZERO),
            ..EffectArgs::default()
        };
        assert!(merged_config(&args).is_err());
    }

    #[test]
    fn title_uses_the_file_name() {
        assert_eq!(
            window_title(Some(Path::new("/photos/cat.jpg"))),
            "Binary Dissolve: cat.jpg"
        );
        assert_eq!(window_title(None), "Binary Dissolve");
    }
}
