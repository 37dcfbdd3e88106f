//! Marshalling configuration
//!
//! Loaded from TOML (`nativecall.toml` or the file named by
//! `NATIVECALL_CONFIG`). Every section is optional.
//!
//! ```toml
//! string_encoding = "utf-8"
//!
//! [directions]
//! array = "in"
//! string_builder = "in-out"
//!
//! [platform]
//! address_size = 4
//! long_size = 4
//! ```

use crate::error::MarshalError;
use crate::runtime::Platform;
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarshalConfig {
    #[serde(default)]
    pub string_encoding: StringEncoding,

    #[serde(default)]
    pub directions: DirectionPolicy,

    #[serde(default)]
    pub platform: Option<PlatformConfig>,
}

impl MarshalConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(platform) = config.platform {
            platform.to_platform()?;
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Configuration named by `NATIVECALL_CONFIG`, or defaults.
    ///
    /// A missing or malformed file falls back to defaults with a warning.
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var("NATIVECALL_CONFIG") else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(event = "config_fallback", path = %path, error = %e, "using default marshalling config");
                Self::default()
            }
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Parse(String),
    #[error("invalid [platform] override: {0}")]
    Platform(String),
}

/// Default copy direction per parameter category, used when a parameter
/// carries no explicit `In`/`Out` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionPolicy {
    #[serde(default = "default_in")]
    pub array: Direction,

    #[serde(default = "default_in")]
    pub boxed_array: Direction,

    #[serde(default = "default_in")]
    pub pointer_array: Direction,

    #[serde(default = "default_in")]
    pub struct_array: Direction,

    #[serde(default = "default_in")]
    pub string_array: Direction,

    #[serde(default = "default_in_out")]
    pub string_builder: Direction,

    #[serde(default = "default_in_out")]
    pub string_buffer: Direction,

    #[serde(default = "default_in_out")]
    pub by_reference: Direction,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self {
            array: Direction::In,
            boxed_array: Direction::In,
            pointer_array: Direction::In,
            struct_array: Direction::In,
            string_array: Direction::In,
            string_builder: Direction::InOut,
            string_buffer: Direction::InOut,
            by_reference: Direction::InOut,
        }
    }
}

fn default_in() -> Direction {
    Direction::In
}

fn default_in_out() -> Direction {
    Direction::InOut
}

/// Platform override, for marshalling on behalf of another target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub address_size: usize,

    #[serde(default)]
    pub long_size: Option<usize>,

    #[serde(default)]
    pub max_align: Option<usize>,
}

impl PlatformConfig {
    pub fn to_platform(self) -> Result<Platform, ConfigError> {
        let platform = Platform {
            address_size: self.address_size,
            long_size: self.long_size.unwrap_or(self.address_size),
            max_align: self.max_align.unwrap_or(self.address_size),
        };
        platform.validate().map_err(ConfigError::Platform)?;
        Ok(platform)
    }
}

/// Native string encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "latin-1")]
    Latin1,
    #[serde(rename = "ascii")]
    Ascii,
}

impl StringEncoding {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
            Self::Ascii => "ascii",
        }
    }

    /// Encode without terminator. Interior NULs are rejected since native
    /// code would see a truncated string.
    pub fn encode(self, s: &str) -> Result<Vec<u8>, MarshalError> {
        if let Some(pos) = s.find('\0') {
            return Err(self.error(format!("interior NUL at byte {}", pos)));
        }
        match self {
            Self::Utf8 => Ok(s.as_bytes().to_vec()),
            Self::Latin1 => s
                .chars()
                .map(|c| u8::try_from(c as u32).map_err(|_| self.error(format!("unmappable character {:?}", c))))
                .collect(),
            Self::Ascii => s
                .chars()
                .map(|c| {
                    if c.is_ascii() {
                        Ok(c as u8)
                    } else {
                        Err(self.error(format!("unmappable character {:?}", c)))
                    }
                })
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, MarshalError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| self.error(e.to_string())),
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Self::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        Ok(b as char)
                    } else {
                        Err(self.error(format!("non-ascii byte {:#04x}", b)))
                    }
                })
                .collect(),
        }
    }

    fn error(self, reason: String) -> MarshalError {
        MarshalError::Encoding {
            encoding: self.name(),
            reason,
        }
    }
}
