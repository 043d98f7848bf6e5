use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearSetting {
    #[default]
    Transparent,
    Opaque,
}

/// On-disk description of a dissolve run.
///
/// Every field is optional so a file can carry only the values it wants to pin;
/// [`EffectConfig::merge`] layers command-line overrides on top.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EffectConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<PathBuf>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothness: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_scaling: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear: Option<ClearSetting>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            image: None,
            characters: None,
            duration: None,
            delay: None,
            smoothness: None,
            character_scaling: None,
            clear: None,
        }
    }
}

impl EffectConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: EffectConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns `self` with every value present in `overrides` taking precedence.
    pub fn merge(mut self, overrides: EffectConfig) -> Self {
        if overrides.image.is_some() {
            self.image = overrides.image;
        }
        if overrides.characters.is_some() {
            self.characters = overrides.characters;
        }
        if overrides.duration.is_some() {
            self.duration = overrides.duration;
        }
        if overrides.delay.is_some() {
            self.delay = overrides.delay;
        }
        if overrides.smoothness.is_some() {
            self.smoothness = overrides.smoothness;
        }
        if overrides.character_scaling.is_some() {
            self.character_scaling = overrides.character_scaling;
        }
        if overrides.clear.is_some() {
            self.clear = overrides.clear;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        for (name, path) in [("image", &self.image), ("characters", &self.characters)] {
            if let Some(path) = path {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid(format!("{name} path must not be empty")));
                }
            }
        }

        if let Some(duration) = self.duration {
            if duration.is_zero() {
                return Err(ConfigError::Invalid(
                    "duration must be greater than zero".into(),
                ));
            }
        }

        if let Some(smoothness) = self.smoothness {
            if !smoothness.is_finite() || smoothness < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "smoothness must be a finite value >= 0 (got {smoothness})"
                )));
            }
        }

        if let Some(scaling) = self.character_scaling {
            if !scaling.is_finite() || scaling <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "character_scaling must be a finite value > 0 (got {scaling})"
                )));
            }
        }

        Ok(())
    }
}

fn serialize_duration_opt<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => {
            serializer.serialize_str(&humantime::format_duration(*duration).to_string())
        }
        None => serializer.serialize_none(),
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_millis(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_millis(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v / 1000.0)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(Visitor)
}
