use crate::errors::MirakoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use std::{fs, os::unix::fs::PermissionsExt};

const APP_NAME: &str = "mirako";
const CONFIG_NAME: &str = "config";
const ENV_PREFIX: &str = "MIRAKO_";

pub const DEFAULT_API_URL: &str = "https://mirako.co";

/// Keys accepted by `mirako config get/set`.
pub const KEYS: &[&str] = &[
    "api-token",
    "api-url",
    "default-model",
    "default-voice",
    "default-save-path",
    "default-poll-interval",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_token: Option<String>,
    pub api_url: String,
    pub default_model: String,
    pub default_voice: String,
    pub default_save_path: String,
    /// Seconds between status polls.
    pub default_poll_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            default_model: "metis-2.5".to_string(),
            default_voice: "mira-korner".to_string(),
            default_save_path: ".".to_string(),
            default_poll_interval: 2,
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf, MirakoError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
            .map_err(|e| MirakoError::Config(e.to_string()))
    }

    pub fn load() -> Result<Self, MirakoError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, MirakoError> {
        let config: Config =
            confy::load_path(path).map_err(|e| MirakoError::Config(e.to_string()))?;

        // The file holds the API token
        #[cfg(unix)]
        {
            if path.exists() {
                fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                    MirakoError::Config(format!("Failed to set config permissions: {}", e))
                })?;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), MirakoError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), MirakoError> {
        confy::store_path(path, self).map_err(|e| MirakoError::Config(e.to_string()))
    }

    /// Applies `MIRAKO_*` overrides, e.g. `MIRAKO_API_TOKEN`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), MirakoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.replace('-', "_").to_uppercase());
            if let Some(value) = lookup(&var).filter(|v| !v.is_empty()) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    /// Applies `--api-token` / `--api-url`.
    pub fn apply_flags(&mut self, api_token: Option<&str>, api_url: Option<&str>) {
        if let Some(token) = api_token.filter(|t| !t.is_empty()) {
            self.api_token = Some(token.to_string());
        }
        if let Some(url) = api_url.filter(|u| !u.is_empty()) {
            self.api_url = url.to_string();
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn token(&self) -> Result<&str, MirakoError> {
        self.api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                MirakoError::Authentication(
                    "API token is required. Run 'mirako auth login' to authenticate".to_string(),
                )
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.default_poll_interval.max(1))
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), MirakoError> {
        match key.to_lowercase().as_str() {
            "api-token" => self.api_token = Some(value.to_string()),
            "api-url" => self.api_url = value.trim_end_matches('/').to_string(),
            "default-model" => self.default_model = value.to_string(),
            "default-voice" => self.default_voice = value.to_string(),
            "default-save-path" => self.default_save_path = value.to_string(),
            "default-poll-interval" => {
                let secs: u64 = value.parse().map_err(|_| {
                    MirakoError::Validation(format!(
                        "default-poll-interval must be a whole number of seconds, got '{}'",
                        value
                    ))
                })?;
                if secs == 0 {
                    return Err(MirakoError::Validation(
                        "default-poll-interval must be at least 1 second".to_string(),
                    ));
                }
                self.default_poll_interval = secs;
            }
            _ => {
                return Err(MirakoError::Validation(format!(
                    "unknown configuration key: {}",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Value for display; the token is masked.
    pub fn get(&self, key: &str) -> Result<String, MirakoError> {
        let value = match key.to_lowercase().as_str() {
            "api-token" => mask_token(self.api_token.as_deref()),
            "api-url" => self.api_url.clone(),
            "default-model" => self.default_model.clone(),
            "default-voice" => self.default_voice.clone(),
            "default-save-path" => self.default_save_path.clone(),
            "default-poll-interval" => self.default_poll_interval.to_string(),
            _ => {
                return Err(MirakoError::Validation(format!(
                    "unknown configuration key: {}",
                    key
                )))
            }
        };
        Ok(value)
    }
}

fn mask_token(token: Option<&str>) -> String {
    match token {
        Some(t) if !t.is_empty() => "***".to_string(),
        _ => "(not set)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.api_url, "https://mirako.co");
        assert_eq!(cfg.default_model, "metis-2.5");
        assert_eq!(cfg.default_voice, "mira-korner");
        assert_eq!(cfg.default_save_path, ".");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert!(!cfg.is_authenticated());
        assert!(matches!(cfg.token(), Err(MirakoError::Authentication(_))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.set("api-token", "secret").unwrap();
        cfg.set("default-save-path", "/tmp/media").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_voice = \"narrator\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_voice, "narrator");
        assert_eq!(loaded.default_model, "metis-2.5");
    }

    #[test]
    fn env_then_flags_override_file() {
        let env: HashMap<&str, &str> = [
            ("MIRAKO_API_TOKEN", "from-env"),
            ("MIRAKO_API_URL", "https://staging.mirako.co/"),
            ("MIRAKO_DEFAULT_POLL_INTERVAL", "5"),
            ("MIRAKO_DEFAULT_VOICE", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.api_token.as_deref(), Some("from-env"));
        assert_eq!(cfg.api_url, "https://staging.mirako.co");
        assert_eq!(cfg.default_poll_interval, 5);
        assert_eq!(cfg.default_voice, "mira-korner");

        cfg.apply_flags(Some("from-flag"), None);
        assert_eq!(cfg.token().unwrap(), "from-flag");
        assert_eq!(cfg.api_url, "https://staging.mirako.co");
    }

    #[test]
    fn get_masks_token_and_rejects_unknown_keys() {
        let mut cfg = Config::default();
        assert_eq!(cfg.get("api-token").unwrap(), "(not set)");
        cfg.set("API-TOKEN", "abc").unwrap();
        assert_eq!(cfg.get("api-token").unwrap(), "***");
        assert!(cfg.get("colour").is_err());
        assert!(cfg.set("colour", "blue").is_err());
    }

    #[test]
    fn poll_interval_must_be_positive() {
        let mut cfg = Config::default();
        assert!(cfg.set("default-poll-interval", "0").is_err());
        assert!(cfg.set("default-poll-interval", "soon").is_err());
        cfg.set("default-poll-interval", "7").unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(7));
    }
}
