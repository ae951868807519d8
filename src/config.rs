use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pr::service::DEFAULT_API_URL;

/// Overrides the configuration directory (default: `~/.pr-collector`).
pub const CONFIG_DIR_ENV: &str = "PR_COLLECTOR_CONFIG_DIR";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine the home directory; set {}", CONFIG_DIR_ENV)]
    NoHomeDir,
}

/// Persistent settings loaded from `config.toml`.
///
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Token used when neither --token nor GITHUB_TOKEN is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// REST API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Per-request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory artifacts go to when --output is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = config_file()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write to `path`, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Create `path` with default settings unless it already exists.
    /// Returns true when a file was written.
    pub fn ensure_exists(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        Config::default().save_to(path)?;
        Ok(true)
    }

    pub fn set_token(&mut self, token: String) {
        self.github.token = Some(token);
    }

    pub fn set_default_output_dir(&mut self, dir: PathBuf) {
        self.output.default_dir = Some(dir);
    }

    /// Resolve the GitHub token: the explicit flag wins, then the
    /// environment value, then the config file.
    pub fn github_token(&self, flag: Option<String>, env_value: Option<String>) -> Option<String> {
        flag.or(env_value)
            .or_else(|| self.github.token.clone())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.github.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Token as safe to display: first 8 characters, or `***` for short ones.
    pub fn masked_token(&self) -> Option<String> {
        self.github.token.as_deref().map(|token| {
            if token.chars().count() > 8 {
                format!("{}...", token.chars().take(8).collect::<String>())
            } else {
                "***".to_string()
            }
        })
    }
}

/// `$PR_COLLECTOR_CONFIG_DIR`, or `~/.pr-collector`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    config_dir_from(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from), dirs::home_dir())
}

fn config_dir_from(
    override_dir: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    match override_dir.filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => Ok(dir),
        None => home
            .map(|home| home.join(".pr-collector"))
            .ok_or(ConfigError::NoHomeDir),
    }
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.output.default_dir.is_none());
        assert_eq!(config.api_url(), "https://api.github.com");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
token = "ghp_secret"
api_url = "http://localhost:8080"
timeout_secs = 5

[output]
default_dir = "/tmp/prs"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.api_url(), "http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.output.default_dir, Some(PathBuf::from("/tmp/prs")));
    }

    #[test]
    fn test_token_precedence() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());

        let token = config.github_token(Some("from-flag".to_string()), Some("from-env".to_string()));
        assert_eq!(token.as_deref(), Some("from-flag"));

        let token = config.github_token(None, Some("from-env".to_string()));
        assert_eq!(token.as_deref(), Some("from-env"));

        assert_eq!(config.github_token(None, None).as_deref(), Some("from-file"));
        assert!(Config::default().github_token(None, None).is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip_with_ensure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(Config::ensure_exists(&path).unwrap());
        assert!(!Config::ensure_exists(&path).unwrap());
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.set_token("ghp_1234567890".to_string());
        config.set_default_output_dir(PathBuf::from("out"));
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_masked_token() {
        let mut config = Config::default();
        assert!(config.masked_token().is_none());
        config.github.token = Some("ghp_1234567890".to_string());
        assert_eq!(config.masked_token().as_deref(), Some("ghp_1234..."));
        config.github.token = Some("short".to_string());
        assert_eq!(config.masked_token().as_deref(), Some("***"));
    }

    #[test]
    fn test_config_dir_resolution() {
        let dir = config_dir_from(Some(PathBuf::from("/custom")), None).unwrap();
        assert_eq!(dir, PathBuf::from("/custom"));

        let dir = config_dir_from(None, Some(PathBuf::from("/home/me"))).unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/.pr-collector"));

        assert!(matches!(config_dir_from(None, None), Err(ConfigError::NoHomeDir)));
    }
}
