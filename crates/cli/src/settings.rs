use std::{fs, path::Path};

use groupstream::{ConsumerConfig, TransportConfig};
use groupstream_store::AdminOptions;
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE_NAME: &str = "groupstream.yaml";

/// groupstream configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transport-wide behaviour (trimming, read sizes, default group)
    pub transport: TransportConfig,

    /// Demo producer appending a message on a fixed cadence
    pub producer: ProducerSettings,

    /// Polling consumers; each entry runs one worker
    pub consumers: Vec<ConsumerConfig>,

    /// Log store admin HTTP server
    pub admin: AdminSettings,

    /// Trace-context propagation through the `ctx` field
    pub telemetry: TelemetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            transport: TransportConfig::default(),
            producer: ProducerSettings::default(),
            consumers: vec![ConsumerConfig::default()],
            admin: AdminSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub enabled: bool,
    pub log_key: String,
    /// Delay between two appends in milliseconds
    pub interval_ms: u64,
    /// Payloads are `<prefix>-<sequence>`
    pub payload_prefix: String,
    /// Per-append length bound; the transport default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        ProducerSettings {
            enabled: true,
            log_key: "events".to_string(),
            interval_ms: 1_000,
            payload_prefix: "message".to_string(),
            max_length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: AdminOptions,
}

impl Default for AdminSettings {
    fn default() -> Self {
        AdminSettings {
            enabled: true,
            options: AdminOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub propagate: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        TelemetrySettings { propagate: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadSettingsError {
    #[error("{} not found at {}. Run 'groupstream init' to create one.",
        SETTINGS_FILE_NAME,
        .0.display())]
    FileNotFound(std::path::PathBuf),
    #[error("Failed to read {}: {}", .0.display(), .1)]
    ReadError(std::path::PathBuf, std::io::Error),
    #[error("Failed to parse {}: {}", .0.display(), .1)]
    ParseError(std::path::PathBuf, serde_yml::Error),
}

impl Settings {
    /// Load settings from the specified file path
    pub fn load(path: &Path) -> Result<Self, LoadSettingsError> {
        if !path.exists() {
            return Err(LoadSettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| LoadSettingsError::ReadError(path.to_path_buf(), e))?;

        Self::parse(&content).map_err(|e| LoadSettingsError::ParseError(path.to_path_buf(), e))
    }

    pub fn parse(content: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(content)
    }

    /// Render as a formatted YAML document
    pub fn to_yaml(&self) -> Result<String, String> {
        let raw =
            serde_yml::to_string(self).map_err(|e| format!("Failed to serialize settings: {}", e))?;
        let formatted =
            pretty_yaml::format_text(&raw, &pretty_yaml::config::FormatOptions::default())
                .map_err(|e| format!("Failed to format settings: {}", e))?;

        Ok(format!("---\n# groupstream settings\n{}", formatted))
    }

    /// Save settings to the specified file path
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = self.to_yaml()?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write settings to {}: {}", path.display(), e))?;

        Ok(())
    }
}
