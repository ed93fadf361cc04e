// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional YAML file, then
//! `POLYSAMPLER_*` environment variables, then command line flags.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::samples::DEFAULT_BASE_NOTE;

mod error;

pub use error::ConfigError;

/// The MIDI input used when none is configured.
pub const DEFAULT_MIDI_DEVICE: &str = "Camera MIDI";

/// Prefix for configuration environment variables.
const ENV_PREFIX: &str = "POLYSAMPLER";

/// Highest valid MIDI note.
const MAX_NOTE: u8 = 127;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
    /// The exact name of the MIDI input to watch.
    #[serde(default = "default_midi_device")]
    midi_device: String,

    /// The audio output device. The host default when unset.
    #[serde(default)]
    audio_device: Option<String>,

    /// The note assigned to the first clip.
    #[serde(default = "default_base_note")]
    base_note: u8,
}

fn default_midi_device() -> String {
    DEFAULT_MIDI_DEVICE.to_string()
}

fn default_base_note() -> u8 {
    DEFAULT_BASE_NOTE
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            midi_device: default_midi_device(),
            audio_device: None,
            base_note: default_base_note(),
        }
    }
}

impl SamplerConfig {
    /// Loads the configuration from the given YAML file, if any, and the environment.
    pub fn load(path: Option<&Path>) -> Result<SamplerConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<SamplerConfig, ConfigError> {
        let config = config.try_deserialize::<SamplerConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command line overrides on top of the loaded values.
    pub fn with_overrides(
        mut self,
        midi_device: Option<String>,
        audio_device: Option<String>,
        base_note: Option<u8>,
    ) -> Result<SamplerConfig, ConfigError> {
        if let Some(midi_device) = midi_device {
            self.midi_device = midi_device;
        }
        if audio_device.is_some() {
            self.audio_device = audio_device;
        }
        if let Some(base_note) = base_note {
            self.base_note = base_note;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_note > MAX_NOTE {
            return Err(ConfigError::InvalidBaseNote(self.base_note));
        }
        Ok(())
    }

    pub fn midi_device(&self) -> &str {
        &self.midi_device
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    pub fn base_note(&self) -> u8 {
        self.base_note
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_yaml(yaml: &str) -> Result<SamplerConfig, ConfigError> {
        SamplerConfig::from_config(
            Config::builder()
                .add_source(File::from_str(yaml, FileFormat::Yaml))
                .build()?,
        )
    }

    #[test]
    fn test_defaults() {
        let config = from_yaml("").unwrap();
        assert_eq!(config, SamplerConfig::default());
        assert_eq!(config.midi_device(), "Camera MIDI");
        assert_eq!(config.audio_device(), None);
        assert_eq!(config.base_note(), 36);
    }

    #[test]
    fn test_yaml_values() {
        let yaml = r#"
            midi_device: "Launchpad Mini MIDI 1"
            audio_device: "mock-device"
            base_note: 48
        "#;
        let config = from_yaml(yaml).unwrap();
        assert_eq!(config.midi_device(), "Launchpad Mini MIDI 1");
        assert_eq!(config.audio_device(), Some("mock-device"));
        assert_eq!(config.base_note(), 48);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut env = config::Map::new();
        env.insert("POLYSAMPLER_BASE_NOTE".to_string(), "60".to_string());
        env.insert("POLYSAMPLER_MIDI_DEVICE".to_string(), "mock-keys".to_string());

        let config = SamplerConfig::from_config(
            Config::builder()
                .add_source(File::from_str("base_note: 48", FileFormat::Yaml))
                .add_source(
                    Environment::with_prefix(ENV_PREFIX)
                        .try_parsing(true)
                        .source(Some(env)),
                )
                .build()
                .unwrap(),
        )
        .unwrap();

        assert_eq!(config.base_note(), 60);
        assert_eq!(config.midi_device(), "mock-keys");
    }

    #[test]
    fn test_invalid_base_note() {
        assert!(matches!(
            from_yaml("base_note: 128"),
            Err(ConfigError::InvalidBaseNote(128))
        ));
        // Doesn't fit in a u8 at all.
        assert!(matches!(from_yaml("base_note: 300"), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_command_line_overrides() {
        let config = SamplerConfig::default()
            .with_overrides(Some("mock-keys".to_string()), None, Some(72))
            .unwrap();
        assert_eq!(config.midi_device(), "mock-keys");
        assert_eq!(config.audio_device(), None);
        assert_eq!(config.base_note(), 72);

        assert!(SamplerConfig::default()
            .with_overrides(None, None, Some(200))
            .is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        assert!(SamplerConfig::load(Some(&path)).is_err());
    }
}
