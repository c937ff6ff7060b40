use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_LOCALE: &str = "vi-VN";

/// Environment variables checked for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// `auto`, `espeak-ng`, `say`, `disabled`, or a command line such as `piper --model vi`
    pub speech_engine: Option<String>,
    pub speech_locale: Option<String>,
    /// Words per minute handed to the speech engine
    pub speech_rate: Option<u32>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn speech_locale(&self) -> &str {
        self.speech_locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    /// Environment first, then the config file. Blank values count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|var| std::env::var(var).ok())
    }

    fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        API_KEY_VARS
            .iter()
            .find_map(|var| lookup(*var).filter(|key| !key.trim().is_empty()))
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("giasu"))
    }
}

/// Serializes tests that touch the process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Run `f` with the API key variables set (or removed) as given, then restore them.
#[cfg(test)]
pub(crate) fn with_api_key_env<T>(values: [Option<&str>; 2], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<_> = API_KEY_VARS.iter().map(|var| std::env::var(var).ok()).collect();

    for (var, value) in API_KEY_VARS.iter().zip(values) {
        match value {
            Some(value) => std::env::set_var(var, value),
            None => std::env::remove_var(var),
        }
    }
    let result = f();
    for (var, value) in API_KEY_VARS.iter().zip(saved) {
        match value {
            Some(value) => std::env::set_var(var, value),
            None => std::env::remove_var(var),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    fn with_file_key(key: &str) -> Config {
        Config {
            api_key: Some(key.to_string()),
            ..Config::new()
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.speech_locale(), "vi-VN");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            model: Some("gemini-2.0-flash".to_string()),
            speech_engine: Some("disabled".to_string()),
            speech_rate: Some(160),
            ..Config::new()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"speech_locale":"en-US"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.speech_locale(), "en-US");
        assert_eq!(config.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_key_wins_over_file() {
        let config = with_file_key("file-key");
        let key = config.resolve_api_key_with(lookup_in(&[("API_KEY", "env-key")]));
        assert_eq!(key.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_gemini_key_checked_before_generic_key() {
        let config = with_file_key("file-key");
        let key = config.resolve_api_key_with(lookup_in(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("API_KEY", "generic-key"),
        ]));
        assert_eq!(key.as_deref(), Some("gemini-key"));
    }

    #[test]
    fn test_blank_env_key_falls_through() {
        let config = with_file_key("file-key");

        let key = config.resolve_api_key_with(lookup_in(&[
            ("GEMINI_API_KEY", ""),
            ("API_KEY", "real-key"),
        ]));
        assert_eq!(key.as_deref(), Some("real-key"));

        let key = config.resolve_api_key_with(lookup_in(&[
            ("GEMINI_API_KEY", "  "),
            ("API_KEY", ""),
        ]));
        assert_eq!(key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_no_key_anywhere() {
        assert_eq!(Config::new().resolve_api_key_with(lookup_in(&[])), None);
        assert_eq!(with_file_key(" ").resolve_api_key_with(lookup_in(&[])), None);
    }

    #[test]
    fn test_resolve_api_key_reads_process_env() {
        let config = with_file_key("file-key");

        let key = with_api_key_env([Some(""), Some("real-key")], || config.resolve_api_key());
        assert_eq!(key.as_deref(), Some("real-key"));

        let key = with_api_key_env([None, None], || config.resolve_api_key());
        assert_eq!(key.as_deref(), Some("file-key"));
    }
}
