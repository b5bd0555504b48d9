//! Configuration types and defaults

use barscan_core::{CaptureError, CaptureResult};
use barscan_media::{CaptureConfig, MediaConstraints, DEFAULT_CAPTURE_INTERVAL};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

/// Scanner configuration
///
/// Read from the widget's `data-*` attributes with
/// [`ScannerConfig::from_data_attributes`] or from JSON with
/// [`ScannerConfig::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerConfig {
    /// Start capturing as soon as the scanner is built
    #[serde(deserialize_with = "flag")]
    pub autostart: bool,
    /// Show debug text next to the camera view
    #[serde(deserialize_with = "flag")]
    pub debug: bool,
    /// Still image used instead of a camera (path or `file://` URL)
    #[serde(alias = "test")]
    pub test_fixture: Option<String>,
    /// Display width, the container width when unset
    pub width: Option<u32>,
    /// Display height, the container height when unset
    pub height: Option<u32>,
    /// Milliseconds between two captured frames
    pub interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            debug: false,
            test_fixture: None,
            width: None,
            height: None,
            interval_ms: DEFAULT_CAPTURE_INTERVAL.as_millis() as u64,
        }
    }
}

impl ScannerConfig {
    /// Build from `data-*` attribute pairs
    ///
    /// Keys may carry the `data-` prefix. Flags are on only for the value `1`.
    /// Unknown keys are ignored.
    pub fn from_data_attributes<I, K, V>(attributes: I) -> CaptureResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in attributes {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            let name = key.strip_prefix("data-").unwrap_or(key);

            match name {
                "autostart" => config.autostart = value == "1",
                "debug" => config.debug = value == "1",
                "test" | "test-fixture" | "testFixture" => {
                    config.test_fixture = (!value.is_empty()).then(|| value.to_string());
                }
                "width" => config.width = Some(parse_number(name, value)?),
                "height" => config.height = Some(parse_number(name, value)?),
                "interval-ms" | "intervalMs" => config.interval_ms = parse_number(name, value)?,
                _ => debug!("Ignoring unknown attribute {}", key),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON object
    pub fn from_json(json: &str) -> CaptureResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CaptureError::InvalidConfiguration {
                message: format!("invalid scanner config: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> CaptureResult<()> {
        if self.interval_ms == 0 {
            return Err(CaptureError::InvalidConfiguration {
                message: "intervalMs must be > 0".to_string(),
            });
        }

        if self.width == Some(0) || self.height == Some(0) {
            return Err(CaptureError::InvalidConfiguration {
                message: "display width and height must be > 0".to_string(),
            });
        }

        if matches!(&self.test_fixture, Some(fixture) if fixture.trim().is_empty()) {
            return Err(CaptureError::InvalidConfiguration {
                message: "test fixture location is empty".to_string(),
            });
        }

        Ok(())
    }

    /// Time between two captured frames
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Display size, falling back to the container's
    pub fn display_size(&self, container_width: u32, container_height: u32) -> (u32, u32) {
        (
            self.width.unwrap_or(container_width),
            self.height.unwrap_or(container_height),
        )
    }

    /// Settings for the capture source
    pub fn capture_config(&self, display_size: (u32, u32)) -> CaptureConfig {
        CaptureConfig {
            interval: self.interval(),
            constraints: MediaConstraints {
                ideal_size: Some(display_size),
                ..MediaConstraints::default()
            },
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> CaptureResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| CaptureError::InvalidConfiguration {
        message: format!("{} '{}': {}", name, value, e),
    })
}

/// Accept `true`/`false` as well as the `1`/`0` attribute style
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Number(1) => Ok(true),
        Flag::Number(0) => Ok(false),
        Flag::Number(other) => Err(serde::de::Error::custom(format!(
            "expected 0 or 1, got {}",
            other
        ))),
    }
}
