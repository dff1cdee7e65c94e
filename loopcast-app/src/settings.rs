//! Daemon settings: defaults, then an optional file, then `LOOPCAST__*`
//! environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use loopcast_engine::EngineSettings;
use loopcast_ffmpeg::FfmpegSettings;

/// Environment variable prefix; sections are separated by `__`
/// (e.g. `LOOPCAST__ENGINE__POLL_INTERVAL_MS`).
pub const ENV_PREFIX: &str = "LOOPCAST";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub ffmpeg: FfmpegSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Http,
}

/// Where the stream config record lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,

    /// Record file for `kind = "file"`.
    pub path: PathBuf,

    /// Admin API base for `kind = "http"`.
    pub base_url: String,

    pub timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: PathBuf::from("data/stream.json"),
            base_url: "http://127.0.0.1:8080/api".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,

    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load from the process environment and `file`, if given.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(file, None)
    }

    /// Load with an explicit environment instead of the process one.
    pub fn load_from(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::load_from(None, Some(HashMap::new())).unwrap();
        assert_eq!(settings.engine.poll_interval_ms, 10_000);
        assert_eq!(settings.engine.restart_settle_ms, 2_000);
        assert_eq!(settings.ffmpeg.fps, 30);
        assert_eq!(settings.store.kind, StoreKind::File);
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loopcast.toml");
        fs::write(
            &path,
            r#"
            [engine]
            poll_interval_ms = 3000
            video_dir = "/srv/videos"

            [store]
            kind = "http"
            base_url = "http://admin:9000/api"
            "#,
        )
        .unwrap();

        let env = HashMap::from([
            ("LOOPCAST__ENGINE__POLL_INTERVAL_MS".to_string(), "1500".to_string()),
            ("LOOPCAST__LOGGING__FORMAT".to_string(), "json".to_string()),
        ]);
        let settings = Settings::load_from(Some(&path), Some(env)).unwrap();

        assert_eq!(settings.engine.poll_interval_ms, 1_500);
        assert_eq!(settings.engine.video_dir, PathBuf::from("/srv/videos"));
        assert_eq!(settings.engine.feeder_retry_backoff_ms, 1_000);
        assert_eq!(settings.store.kind, StoreKind::Http);
        assert_eq!(settings.store.base_url, "http://admin:9000/api");
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load_from(Some(&missing), Some(HashMap::new())).is_err());
    }
}
