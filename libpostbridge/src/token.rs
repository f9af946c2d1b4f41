//! Access token lifecycle
//!
//! Every authenticated provider call goes through [`TokenManager::ensure_fresh`]
//! first. When the account has a refresh token and the access token is about
//! to expire, the token is renewed against the provider's OAuth endpoint and
//! the new fields are handed to the injected [`TokenStore`] for persistence.
//! A failed renewal short-circuits the calling operation with the ERROR
//! response; nothing is retried.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context;
use crate::error::{PostbridgeError, ProviderError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::response::{Context, ErrorKind, SocialProviderResponse};

/// Credentials of one connected account
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// `None` when the provider issued a non-expiring token
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            expires_at: None,
            refresh_token_expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.into()));
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Apply the context of a successful refresh
    ///
    /// Fields missing from the context keep their current value, so a
    /// provider that does not rotate refresh tokens leaves the old one in place.
    pub fn apply_context(&mut self, context: &Context) -> Result<()> {
        let access_token = context
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("refresh response has no access_token".to_string())
            })?;
        self.access_token = SecretString::from(access_token.to_string());

        if let Some(refresh_token) = context.get("refresh_token").and_then(Value::as_str) {
            self.refresh_token = Some(SecretString::from(refresh_token.to_string()));
        }
        if let Some(expires_at) = timestamp_field(context, "expires_at") {
            self.expires_at = Some(expires_at);
        }
        if let Some(expires_at) = timestamp_field(context, "refresh_token_expires_at") {
            self.refresh_token_expires_at = Some(expires_at);
        }
        Ok(())
    }
}

fn timestamp_field(context: &Context, key: &str) -> Option<DateTime<Utc>> {
    context
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// Unix timestamp `key` seconds after `now`; `None` when absent or out of range
fn expiry_after(now: DateTime<Utc>, data: &Value, key: &str) -> Option<i64> {
    let secs = data.get(key).and_then(Value::as_i64)?;
    let lifetime = Duration::try_seconds(secs)?;
    now.checked_add_signed(lifetime).map(|t| t.timestamp())
}

/// Durable storage for refreshed tokens
///
/// Implementations are called after every successful refresh, before the
/// operation that triggered it continues.
pub trait TokenStore: Send + Sync {
    fn update_token(&self, token: &Token) -> Result<()>;
}

/// On-disk representation used by [`FileTokenStore`]
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token_expires_at: Option<i64>,
}

impl From<&Token> for StoredToken {
    fn from(token: &Token) -> Self {
        Self {
            access_token: token.access_token.expose_secret().to_string(),
            refresh_token: token
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            expires_at: token.expires_at.map(|t| t.timestamp()),
            refresh_token_expires_at: token.refresh_token_expires_at.map(|t| t.timestamp()),
        }
    }
}

impl From<StoredToken> for Token {
    fn from(stored: StoredToken) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_at: stored
                .expires_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            refresh_token_expires_at: stored
                .refresh_token_expires_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

/// Token kept in a JSON file readable only by the owner
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Token> {
        let content = std::fs::read_to_string(&self.path)?;
        let stored: StoredToken = serde_json::from_str(&content).map_err(|e| {
            PostbridgeError::InvalidInput(format!(
                "Token file {} is not valid: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(stored.into())
    }
}

impl TokenStore for FileTokenStore {
    fn update_token(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&StoredToken::from(token))
            .map_err(|e| PostbridgeError::InvalidInput(format!("Cannot encode token: {}", e)))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // `mode` only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;

        tracing::debug!(path = %self.path.display(), "Stored refreshed token");
        Ok(())
    }
}

/// OAuth client used for refresh requests
#[derive(Debug, Clone)]
pub struct RefreshClient {
    /// Full URL of the token endpoint
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
}

pub struct TokenManager {
    token: Token,
    client: RefreshClient,
    margin: Duration,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(
        token: Token,
        client: RefreshClient,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            token,
            client,
            margin: Duration::minutes(10),
            transport,
            store,
        }
    }

    /// Refresh when fewer than `margin` of validity remain
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn access_token(&self) -> &SecretString {
        &self.token.access_token
    }

    pub fn has_refresh_token(&self) -> bool {
        self.token
            .refresh_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }

    pub fn token_is_about_to_expire(&self) -> bool {
        self.token_is_about_to_expire_at(Utc::now())
    }

    pub fn token_is_about_to_expire_at(&self, now: DateTime<Utc>) -> bool {
        match self.token.expires_at {
            Some(expires_at) => expires_at - now < self.margin,
            None => false,
        }
    }

    pub fn needs_refresh(&self) -> bool {
        self.has_refresh_token() && self.token_is_about_to_expire()
    }

    /// Ask the provider for a new access token
    ///
    /// Never fails with `Err`: transport and provider failures come back as
    /// ERROR responses tagged [`ErrorKind::TokenRefresh`].
    pub async fn refresh_token(&self) -> SocialProviderResponse {
        let refresh_token = match &self.token.refresh_token {
            Some(token) => token.expose_secret().to_string(),
            None => {
                return SocialProviderResponse::error(
                    ErrorKind::TokenRefresh,
                    serde_json::json!({ "error": "no refresh token available" }),
                )
            }
        };

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
            ("client_id".to_string(), self.client.client_id.clone()),
        ];
        if let Some(secret) = &self.client.client_secret {
            form.push(("client_secret".to_string(), secret.expose_secret().to_string()));
        }

        tracing::info!(url = %self.client.token_url, "Refreshing access token");

        let response = match self
            .transport
            .send(HttpRequest::post(&self.client.token_url).form(form))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                return SocialProviderResponse::transport_error(&e)
                    .with_error_kind(ErrorKind::TokenRefresh);
            }
        };

        let now = Utc::now();
        let refreshed = SocialProviderResponse::from_http_with(&response, |r| {
            let data = r.json_or_null();
            let expires_at = expiry_after(now, &data, "expires_in");
            let refresh_token_expires_at = expiry_after(now, &data, "refresh_token_expires_in");

            let mut context = context! {
                "access_token" => data.get("access_token"),
                "expires_at" => expires_at,
                "refresh_token_expires_at" => refresh_token_expires_at,
            };
            if let Some(refresh_token) = data.get("refresh_token") {
                context.insert("refresh_token".to_string(), refresh_token.clone());
            }
            Some(context)
        })
        .with_error_kind(ErrorKind::TokenRefresh);

        if !refreshed.has_error() && refreshed.context_str("access_token").is_none() {
            tracing::warn!("Token refresh answer carries no access_token");
            return SocialProviderResponse::error(ErrorKind::TokenRefresh, refreshed.value().clone());
        }
        refreshed
    }

    /// Apply a refresh context and persist the resulting token
    pub fn update_token(&mut self, context: &Context) -> Result<()> {
        self.token.apply_context(context)?;
        self.store.update_token(&self.token)
    }

    /// Refresh the token if needed
    ///
    /// Returns `Some(error)` when a refresh was attempted and failed; the
    /// caller must return that response without making further requests.
    pub async fn ensure_fresh(&mut self) -> Result<Option<SocialProviderResponse>> {
        if !self.needs_refresh() {
            return Ok(None);
        }

        let response = self.refresh_token().await;
        if response.has_error() {
            tracing::warn!(
                unauthorized = response.is_unauthorized(),
                "Token refresh rejected, aborting operation"
            );
            return Ok(Some(response));
        }

        self.update_token(response.context())?;
        Ok(None)
    }
}
