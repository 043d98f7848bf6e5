use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fxconfig::{ClearSetting, EffectConfig};

use crate::paths::ENV_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(
    name = "binary-dissolve",
    author,
    version,
    about = "Reveal an image through a grid of binary glyphs",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    pub effect: EffectArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode both images and report the grid without opening a window.
    Check(EffectArgs),
    /// Print the merged configuration as TOML.
    PrintConfig(EffectArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct EffectArgs {
    /// Image to reveal.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Glyph atlas holding two glyphs side by side.
    #[arg(value_name = "CHARACTERS")]
    pub characters: Option<PathBuf>,

    /// Configuration file; defaults to `<config dir>/binary-dissolve/config.toml`.
    #[arg(long, value_name = "FILE", env = ENV_CONFIG_FILE)]
    pub config: Option<PathBuf>,

    /// Length of the reveal (e.g. `4s`, `1500ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Wait before the images are loaded.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub delay: Option<Duration>,

    /// Width of each cell's fade band in progress units (0 pops cells in).
    #[arg(long, value_name = "AMOUNT")]
    pub smoothness: Option<f32>,

    /// Multiplier applied to the glyph size.
    #[arg(long, value_name = "FACTOR")]
    pub character_scaling: Option<f32>,

    /// Colour left behind by unrevealed cells: `transparent` or `opaque`.
    #[arg(long, value_name = "MODE", value_parser = parse_clear)]
    pub clear: Option<ClearSetting>,

    /// Close the window once the reveal completes.
    #[arg(long)]
    pub exit_on_finish: bool,
}

impl EffectArgs {
    /// The values given on the command line, as a config layer.
    pub fn overrides(&self) -> EffectConfig {
        EffectConfig {
            image: self.image.clone(),
            characters: self.characters.clone(),
            duration: self.duration,
            delay: self.delay,
            smoothness: self.smoothness,
            character_scaling: self.character_scaling,
            clear: self.clear,
            ..EffectConfig::default()
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_clear(value: &str) -> Result<ClearSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "transparent" | "none" => Ok(ClearSetting::Transparent),
        "opaque" | "black" => Ok(ClearSetting::Opaque),
        other => Err(format!(
            "unknown clear mode '{other}' (expected transparent or opaque)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_bare_milliseconds() {
        assert_eq!(parse_duration("1500"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn clear_modes_parse() {
        assert_eq!(parse_clear("Opaque"), Ok(ClearSetting::Opaque));
        assert_eq!(parse_clear("transparent"), Ok(ClearSetting::Transparent));
        assert!(parse_clear("grey").is_err());
    }

    #[test]
    fn positional_images_and_flags() {
        let cli = Cli::try_parse_from([
            "binary-dissolve",
            "photo.png",
            "glyphs.png",
            "--duration",
            "2s",
            "--smoothness",
            "0.4",
        ])
        .expect("parse");
        assert!(cli.command.is_none());
        let overrides = cli.effect.overrides();
        assert_eq!(overrides.image, Some(PathBuf::from("photo.png")));
        assert_eq!(overrides.characters, Some(PathBuf::from("glyphs.png")));
        assert_eq!(overrides.duration, Some(Duration::from_secs(2)));
        assert_eq!(overrides.smoothness, Some(0.4));
        assert_eq!(overrides.delay, None);
    }

    #[test]
    fn check_subcommand_takes_its_own_arguments() {
        let cli = Cli::try_parse_from([
            "binary-dissolve",
            "check",
            "photo.png",
            "glyphs.png",
            "--character-scaling",
            "2",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Check(args)) => {
                assert_eq!(args.image, Some(PathBuf::from("photo.png")));
                assert_eq!(args.character_scaling, Some(2.0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
