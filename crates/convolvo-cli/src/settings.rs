//! Engine settings loaded from TOML and overridden from the command line.

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading engine settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the settings file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A setting is out of range
    #[error("invalid setting '{name}': {reason}")]
    Invalid {
        /// Name of the offending setting.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid setting error.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Engine configuration shared by every command.
///
/// ```toml
/// max_block_size = 8192
/// known_block_size = 256
/// allowed_latency = 0
/// threaded = true
/// sample_rate = 48000
/// channels = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Largest FFT size; 0 selects the engine default.
    pub max_block_size: usize,
    /// Samples per processing call.
    pub known_block_size: usize,
    /// Accepted latency in samples; below 32 means zero latency.
    pub allowed_latency: usize,
    /// Run the overflow stage on a worker thread.
    pub threaded: bool,
    /// Sample rate of generated signals.
    pub sample_rate: u32,
    /// Channels of generated signals.
    pub channels: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_block_size: 0,
            known_block_size: 256,
            allowed_latency: 0,
            threaded: true,
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl EngineSettings {
    /// Parses settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Checks ranges the engines cannot handle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::invalid("channels", "must be at least 1"));
        }
        if self.channels > convolvo_core::MAX_THREAD_CHANNELS {
            return Err(ConfigError::invalid(
                "channels",
                format!("at most {} supported", convolvo_core::MAX_THREAD_CHANNELS),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be positive"));
        }
        if self.known_block_size == 0 {
            return Err(ConfigError::invalid("known_block_size", "must be positive"));
        }
        if self.max_block_size == 1 {
            return Err(ConfigError::invalid("max_block_size", "must be 0 or at least 2"));
        }
        Ok(())
    }

    /// Converts samples to milliseconds at the configured rate.
    pub fn samples_to_ms(&self, samples: usize) -> f64 {
        samples as f64 * 1000.0 / f64::from(self.sample_rate)
    }

    /// Converts seconds to whole samples at the configured rate.
    pub fn seconds_to_samples(&self, seconds: f32) -> usize {
        (f64::from(seconds.max(0.0)) * f64::from(self.sample_rate)).round() as usize
    }
}

/// Which engine a command drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Single stage, FFT size chosen from the impulse length
    Direct,
    /// Single stage, time-domain convolution
    Brute,
    /// Multi-stage on the calling thread
    Composite,
    /// Multi-stage with the largest stage on a worker thread
    #[default]
    Threaded,
}

impl EngineKind {
    /// All kinds, in increasing order of complexity.
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Brute,
        EngineKind::Direct,
        EngineKind::Composite,
        EngineKind::Threaded,
    ];

    /// Lowercase name as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Direct => "direct",
            EngineKind::Brute => "brute",
            EngineKind::Composite => "composite",
            EngineKind::Threaded => "threaded",
        }
    }
}

/// Command-line overrides for [`EngineSettings`].
#[derive(Args, Debug, Default)]
pub struct EngineArgs {
    /// Engine settings file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Largest FFT size (0 = engine default)
    #[arg(long, global = true)]
    pub max_block_size: Option<usize>,

    /// Samples per processing call
    #[arg(long, global = true)]
    pub known_block_size: Option<usize>,

    /// Accepted latency in samples
    #[arg(long, global = true)]
    pub allowed_latency: Option<usize>,

    /// Run the overflow stage on a worker thread (true/false)
    #[arg(long, global = true)]
    pub threaded: Option<bool>,

    /// Sample rate of generated signals
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Channels of generated signals
    #[arg(long, global = true)]
    pub channels: Option<usize>,
}

impl EngineArgs {
    /// Loads the settings file, if any, and applies command-line overrides.
    pub fn resolve(&self) -> Result<EngineSettings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => EngineSettings::load(path)?,
            None => EngineSettings::default(),
        };

        if let Some(v) = self.max_block_size {
            settings.max_block_size = v;
        }
        if let Some(v) = self.known_block_size {
            settings.known_block_size = v;
        }
        if let Some(v) = self.allowed_latency {
            settings.allowed_latency = v;
        }
        if let Some(v) = self.threaded {
            settings.threaded = v;
        }
        if let Some(v) = self.sample_rate {
            settings.sample_rate = v;
        }
        if let Some(v) = self.channels {
            settings.channels = v;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn missing_keys_use_defaults() {
        let settings = EngineSettings::from_toml_str("channels = 1\n").unwrap();
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.known_block_size, 256);
        assert!(settings.threaded);
    }

    #[test]
    fn full_file_roundtrips() {
        let settings = EngineSettings {
            max_block_size: 4096,
            known_block_size: 128,
            allowed_latency: 64,
            threaded: false,
            sample_rate: 44100,
            channels: 1,
        };
        let text = toml::to_string(&settings).unwrap();
        assert_eq!(EngineSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineSettings::from_toml_str("channels = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "channels", .. }));
        assert!(err.to_string().contains("channels"));

        let err = EngineSettings::from_toml_str("sample_rate = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "sample_rate", .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineSettings::from_toml_str("threaded = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineSettings::load(Path::new("/nonexistent/convolvo.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/convolvo.toml"));
        assert!(err.source().is_some());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = EngineArgs {
            known_block_size: Some(64),
            threaded: Some(false),
            ..EngineArgs::default()
        };
        let settings = args.resolve().unwrap();
        assert_eq!(settings.known_block_size, 64);
        assert!(!settings.threaded);
        assert_eq!(settings.channels, 2);
    }

    #[test]
    fn unit_conversions() {
        let settings = EngineSettings::default();
        assert_eq!(settings.seconds_to_samples(0.5), 24000);
        assert!((settings.samples_to_ms(480) - 10.0).abs() < 1e-9);
    }
}
