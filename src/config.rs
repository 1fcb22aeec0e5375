// Remote Configuration Module
// Persistent storage of named Yandex Disk remotes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::providers::listing::DEFAULT_PAGE_SIZE;
use crate::providers::metadata::DEFAULT_MODTIME_PROPERTY;
use crate::providers::yandex_api::DEFAULT_API_BASE;
use crate::providers::{FsOptions, HttpRetryConfig, Opened, ProviderError, RestClient, RestOptions, Token, YandexFs};

/// One configured remote
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Token JSON as written by the OAuth tool
    /// ({"access_token": "...", "token_type": "OAuth", "expiry": "..."})
    pub token: String,
    /// OAuth application credentials, only read by the external auth tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Entries per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Custom property holding the source modification time
    #[serde(default = "default_modtime_property")]
    pub modtime_property: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: HttpRetryConfig,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_modtime_property() -> String {
    DEFAULT_MODTIME_PROPERTY.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl RemoteConfig {
    /// Remote with default settings for the given token JSON
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client_id: None,
            client_secret: None,
            api_base: default_api_base(),
            page_size: default_page_size(),
            modtime_property: default_modtime_property(),
            timeout_secs: default_timeout_secs(),
            retry: HttpRetryConfig::default(),
        }
    }

    pub fn parse_token(&self) -> Result<Token, ProviderError> {
        Token::from_json(&self.token)
    }

    pub fn rest_options(&self) -> RestOptions {
        RestOptions {
            api_base: self.api_base.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retry: self.retry.clone(),
        }
    }

    pub fn fs_options(&self) -> FsOptions {
        FsOptions {
            page_size: self.page_size.max(1),
            modtime_property: self.modtime_property.clone(),
        }
    }

    /// Connect to the disk and open a filesystem rooted at `root`
    pub async fn open_fs(&self, name: &str, root: &str) -> Result<Opened, ProviderError> {
        let client = RestClient::new(self.parse_token()?, self.rest_options())?;
        YandexFs::open(name, root, Arc::new(client), self.fs_options()).await
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("page_size", &self.page_size)
            .field("modtime_property", &self.modtime_property)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Contents of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
}

impl ConfigFile {
    pub fn remote(&self, name: &str) -> Result<&RemoteConfig, ProviderError> {
        self.remotes
            .get(name)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("No remote named {:?}", name)))
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("yadisk-fs").join("remotes.json")
}

/// Load the configuration; a missing file is an empty configuration
pub fn load_config(path: &Path) -> Result<ConfigFile, ProviderError> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, starting empty", path);
        return Ok(ConfigFile::default());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ProviderError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Save the configuration, creating its directory when needed
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<(), ProviderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ProviderError::Other(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, content)?;
    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = r#"{"access_token":"AQAAAA-test","token_type":"OAuth","expiry":"0001-01-01T00:00:00Z"}"#;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json")).unwrap();
        assert!(config.remotes.is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remotes.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ProviderError::InvalidConfig(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("remotes.json");
        let mut config = ConfigFile::default();
        config.remotes.insert("disk".to_string(), RemoteConfig::with_token(TOKEN));
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        let remote = loaded.remote("disk").unwrap();
        assert_eq!(remote.page_size, 1000);
        assert_eq!(remote.modtime_property, "rclone_modified");
        assert!(loaded.remote("other").is_err());
    }

    #[test]
    fn test_defaults_for_minimal_remote() {
        let json = r#"{"remotes":{"y":{"token":"{\"access_token\":\"abc\"}"}}}"#;
        let config: ConfigFile = serde_json::from_str(json).unwrap();
        let remote = config.remote("y").unwrap();
        assert_eq!(remote.api_base, DEFAULT_API_BASE);
        assert_eq!(remote.timeout_secs, 300);
        assert_eq!(remote.retry, HttpRetryConfig::default());
        assert_eq!(remote.fs_options(), FsOptions::default());
        assert_eq!(remote.rest_options().timeout, Duration::from_secs(300));
        assert_eq!(remote.parse_token().unwrap().authorization(), "OAuth abc");
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let mut remote = RemoteConfig::with_token(TOKEN);
        remote.page_size = 0;
        assert_eq!(remote.fs_options().page_size, 1);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut remote = RemoteConfig::with_token(TOKEN);
        remote.client_secret = Some("very-secret".to_string());
        let printed = format!("{:?}", remote);
        assert!(!printed.contains("AQAAAA-test"));
        assert!(!printed.contains("very-secret"));
    }
}
