//! Configuration management for Postbridge

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::providers::linkedin::{LinkedinAccountKind, PageType};
use crate::providers::SocialProviderContentType;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub linkedin: LinkedinConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedinConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Version segment of the legacy profile endpoints (`/v2/me`)
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Value of the `LinkedIn-Version` header sent to `/rest/*`
    #[serde(default = "default_rest_version")]
    pub rest_version: String,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub provider: LinkedinAccountKind,
    pub provider_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub page_type: PageType,
    /// Whether the app has the "Sign In with LinkedIn using OpenID Connect" product
    #[serde(default = "default_true")]
    pub openid: bool,
    #[serde(default = "default_content_type")]
    pub content_type: SocialProviderContentType,
}

impl LinkedinConfig {
    /// Minimal configuration for an account, every other field defaulted
    pub fn for_account(provider: LinkedinAccountKind, provider_id: impl Into<String>) -> Self {
        Self {
            api_url: default_api_url(),
            api_version: default_api_version(),
            rest_version: default_rest_version(),
            oauth_url: default_oauth_url(),
            client_id: String::new(),
            client_secret: None,
            provider,
            provider_id: provider_id.into(),
            username: String::new(),
            page_type: PageType::default(),
            openid: true,
            content_type: default_content_type(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory media paths are resolved against
    #[serde(default = "default_media_root")]
    pub root: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// JSON file holding the current access/refresh token pair
    #[serde(default = "default_token_path")]
    pub path: String,
    /// Refresh when fewer than this many seconds of validity remain
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            path: default_token_path(),
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("postbridge/{}", env!("CARGO_PKG_VERSION"))
}

fn default_api_url() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_api_version() -> String {
    "v2".to_string()
}

fn default_rest_version() -> String {
    "202404".to_string()
}

fn default_oauth_url() -> String {
    "https://www.linkedin.com/oauth/v2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> SocialProviderContentType {
    SocialProviderContentType::Comments
}

fn default_media_root() -> String {
    "~/.local/share/postbridge/media".to_string()
}

fn default_token_path() -> String {
    "~/.config/postbridge/linkedin.token.json".to_string()
}

fn default_refresh_margin_secs() -> i64 {
    600
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration for a personal LinkedIn profile
    pub fn default_config(provider_id: &str) -> Self {
        Self {
            http: HttpConfig::default(),
            linkedin: LinkedinConfig::for_account(LinkedinAccountKind::Person, provider_id),
            media: MediaConfig::default(),
            token: TokenConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.linkedin.provider_id.trim().is_empty() {
            return Err(ConfigError::MissingField("linkedin.provider_id".to_string()).into());
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::MissingField("http.timeout_secs (must be > 0)".to_string()).into());
        }
        Ok(())
    }

    pub fn media_root(&self) -> PathBuf {
        expand_path(&self.media.root)
    }

    pub fn token_path(&self) -> PathBuf {
        expand_path(&self.token.path)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTBRIDGE_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postbridge").join("config.toml"))
}
