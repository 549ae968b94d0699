//! Application configuration
//!
//! Defaults come from the `config.toml` embedded at build time. A user file
//! at `<config_dir>/Shortgen/config.toml` is merged over them table by table,
//! then a few environment variables (also read from `.env`) take precedence.

use crate::error::AppError;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable overriding `generation.api_url`
const ENV_API_URL: &str = "SHORTGEN_API_URL";

/// Environment variable overriding `share.origin`
const ENV_SHARE_ORIGIN: &str = "SHORTGEN_SHARE_ORIGIN";

/// Environment variable holding the speech-to-text API key
pub(crate) const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub generation: GenerationConfig,
    pub share: ShareConfig,
    pub input: InputConfig,
    pub collections: CollectionsConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerationConfig {
    pub api_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ShareConfig {
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InputConfig {
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CollectionsConfig {
    pub history_capacity: usize,
    pub favorites_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
pub(crate) struct VoiceConfig {
    pub enabled: bool,
    pub api_url: String,
    pub model: String,
    pub language: String,
    pub capture_secs: u64,
    /// Read from the environment only, never from config files
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Config {
    /// Endpoint of the generation service, `None` for offline generation
    pub(crate) fn api_url(&self) -> Option<&str> {
        let url = self.generation.api_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    pub(crate) fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.input.debounce_ms)
    }

    pub(crate) fn share_origin(&self) -> Result<Url, AppError> {
        Url::parse(&self.share.origin).map_err(|e| AppError::ShareOrigin {
            origin: self.share.origin.clone(),
            source: e,
        })
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.input.debounce_ms == 0 {
            return Err(AppError::Config(
                "input.debounce_ms must be positive".into(),
            ));
        }
        if self.collections.history_capacity == 0 || self.collections.favorites_capacity == 0 {
            return Err(AppError::Config(
                "collection capacities must be positive".into(),
            ));
        }
        self.share_origin()?;
        Ok(())
    }
}

#[cfg(test)]
impl Config {
    /// Embedded defaults with no user file or environment applied
    pub(crate) fn for_tests() -> Self {
        from_sources(None, |_| None).expect("embedded config.toml is valid")
    }
}

/// Path of the optional user override file
pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Shortgen").join("config.toml"))
}

/// Load configuration from the embedded defaults, user file and environment
pub(crate) fn load_config() -> Result<Config, AppError> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {:?}", path);
    }

    let overlay = user_config_path()
        .filter(|path| path.exists())
        .and_then(|path| match fs::read_to_string(&path) {
            Ok(contents) => {
                info!("Loaded user configuration from {:?}", path);
                Some(contents)
            }
            Err(e) => {
                warn!("Failed to read user configuration {:?}: {}", path, e);
                None
            }
        });

    from_sources(overlay.as_deref(), |name| std::env::var(name).ok())
}

/// Build a configuration from an optional overlay and an environment lookup
fn from_sources(
    overlay: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, AppError> {
    let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG_TOML)
        .map_err(|e| AppError::Config(format!("embedded config.toml: {}", e)))?;

    if let Some(overlay) = overlay {
        let overlay: toml::Table = toml::from_str(overlay)
            .map_err(|e| AppError::Config(format!("user config.toml: {}", e)))?;
        merge_tables(&mut table, overlay);
    }

    let mut config: Config = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| AppError::Config(e.to_string()))?;

    if let Some(api_url) = env(ENV_API_URL) {
        config.generation.api_url = api_url;
    }
    if let Some(origin) = env(ENV_SHARE_ORIGIN) {
        config.share.origin = origin;
    }
    config.voice.api_key = env(ENV_OPENAI_API_KEY).filter(|key| !key.trim().is_empty());

    config.validate()?;
    Ok(config)
}

/// Recursively overlay `overlay` onto `base`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_child)), toml::Value::Table(overlay_child)) => {
                merge_tables(base_child, overlay_child);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_embedded_defaults() {
        let config = from_sources(None, no_env).unwrap();
        assert_eq!(config.input.debounce_ms, 300);
        assert_eq!(config.collections.history_capacity, 10);
        assert_eq!(config.collections.favorites_capacity, 20);
        assert!(config.api_url().is_none());
        assert!(config.voice.api_key.is_none());
        assert_eq!(config.debounce_window(), Duration::from_millis(300));
    }

    #[test]
    fn test_user_overlay_merges_per_field() {
        let overlay = r#"
            [generation]
            api_url = "https://api.example.com/generate"

            [collections]
            history_capacity = 5
        "#;
        let config = from_sources(Some(overlay), no_env).unwrap();
        assert_eq!(config.api_url(), Some("https://api.example.com/generate"));
        assert_eq!(config.generation.timeout_secs, 120);
        assert_eq!(config.collections.history_capacity, 5);
        assert_eq!(config.collections.favorites_capacity, 20);
    }

    #[test]
    fn test_environment_wins() {
        let env = |name: &str| match name {
            ENV_API_URL => Some("http://localhost:3001/api/generate".to_string()),
            ENV_SHARE_ORIGIN => Some("https://shorts.example.com".to_string()),
            ENV_OPENAI_API_KEY => Some("sk-test".to_string()),
            _ => None,
        };
        let config = from_sources(None, env).unwrap();
        assert_eq!(config.api_url(), Some("http://localhost:3001/api/generate"));
        assert_eq!(
            config.share_origin().unwrap().as_str(),
            "https://shorts.example.com/"
        );
        assert_eq!(config.voice.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let overlay = "[input]\ndebounce_ms = 0\n";
        assert!(matches!(
            from_sources(Some(overlay), no_env),
            Err(AppError::Config(_))
        ));

        let overlay = "[share]\norigin = \"not a url\"\n";
        assert!(matches!(
            from_sources(Some(overlay), no_env),
            Err(AppError::ShareOrigin { .. })
        ));

        assert!(from_sources(Some("[[["), no_env).is_err());
    }

    #[test]
    fn test_user_config_path() {
        if let Some(path) = user_config_path() {
            assert!(path.ends_with("Shortgen/config.toml"));
        }
    }
}
