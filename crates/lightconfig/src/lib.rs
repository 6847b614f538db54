use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Interpolation endpoint colors when the card leaves them unset.
pub const DEFAULT_COLOR_A: [u8; 3] = [0x00, 0x00, 0xff];
pub const DEFAULT_COLOR_B: [u8; 3] = [0xff, 0x00, 0x00];

/// Default animation duration; at the fixed 50 ms tick this gives 32 steps.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(1600);

/// Default tint of the stimulus box (mid grey).
pub const DEFAULT_STIMULUS_COLOR: [u8; 3] = [0xcc, 0xcc, 0xcc];

/// Pixel format of the background payload referenced by `data_location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Exr,
    Hdr,
}

impl DataType {
    /// Infers the data type from the file suffix of a location string.
    pub fn from_location(location: &str) -> Option<Self> {
        let trimmed = location.split(['?', '#']).next().unwrap_or(location);
        let suffix = trimmed.rsplit('.').next()?;
        match suffix.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "exr" => Some(Self::Exr),
            "hdr" => Some(Self::Hdr),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Png => f.write_str("png"),
            DataType::Jpeg => f.write_str("jpeg"),
            DataType::Exr => f.write_str("exr"),
            DataType::Hdr => f.write_str("hdr"),
        }
    }
}

/// Per-card configuration replicated by the hosting framework.
///
/// Every field is optional with a stated default, so a card created with an
/// empty table is fully usable (blue/red toggle, 1.6 s swing, no background).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CardConfig {
    pub color_a: Option<[u8; 3]>,
    pub color_b: Option<[u8; 3]>,
    #[serde(
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    pub data_location: Option<String>,
    pub data_type: Option<DataType>,
    pub load_synchronously: bool,
    /// Tint of the stimulus box; consumed by a host renderer, not by the core.
    pub color: Option<[u8; 3]>,
    /// Whether the stimulus box casts and receives shadows.
    pub shadow: bool,
}

impl CardConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CardConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(location) = &self.data_location {
            if location.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "data_location may not be empty".into(),
                ));
            }
            if self.resolved_data_type().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "cannot determine data type for '{location}'; set data_type explicitly"
                )));
            }
        }

        if self.load_synchronously && self.data_location.is_none() {
            return Err(ConfigError::Invalid(
                "load_synchronously requires data_location".into(),
            ));
        }

        Ok(())
    }

    pub fn color_a(&self) -> [u8; 3] {
        self.color_a.unwrap_or(DEFAULT_COLOR_A)
    }

    pub fn color_b(&self) -> [u8; 3] {
        self.color_b.unwrap_or(DEFAULT_COLOR_B)
    }

    /// Animation duration with degenerate values guarded back to the default.
    ///
    /// A zero duration would make the per-tick step infinite, so it is treated
    /// as "invalid configuration: fall back to the default" rather than an
    /// error.
    pub fn animation_duration(&self) -> Duration {
        match self.duration {
            Some(duration) if !duration.is_zero() => duration,
            Some(_) => {
                tracing::warn!(
                    fallback_secs = DEFAULT_DURATION.as_secs_f32(),
                    "configured duration is zero; using default"
                );
                DEFAULT_DURATION
            }
            None => DEFAULT_DURATION,
        }
    }

    /// Explicit data type, or one inferred from the location suffix.
    pub fn resolved_data_type(&self) -> Option<DataType> {
        self.data_type.or_else(|| {
            self.data_location
                .as_deref()
                .and_then(DataType::from_location)
        })
    }

    pub fn stimulus_color(&self) -> [u8; 3] {
        self.color.unwrap_or(DEFAULT_STIMULUS_COLOR)
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
            formatter.write_str("a duration as number of seconds or human-readable string")
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
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}
