//! Uniform result envelope for provider calls
//!
//! Every provider operation resolves to a [`SocialProviderResponse`], whatever
//! shape the provider's HTTP answer had. The adapter builds one per HTTP
//! round-trip with [`SocialProviderResponse::from_http`] and may then replace
//! the normalized context with fields it considers authoritative
//! ([`SocialProviderResponse::use_context`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::http::HttpResponse;

/// Normalized fields exposed by a response (`id`, `ETag`, `access_token`, ...)
pub type Context = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Where an ERROR response originated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced an HTTP answer
    Transport,
    /// The provider answered with a non-success status
    Provider,
    /// The access token could not be renewed
    TokenRefresh,
    /// A step of a multi-step upload failed
    Upload,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Provider => write!(f, "provider"),
            Self::TokenRefresh => write!(f, "token_refresh"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialProviderResponse {
    status: ResponseStatus,
    /// Raw provider payload
    value: Value,
    /// Adapter-normalized fields
    context: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(default)]
    is_unauthorized: bool,
    #[serde(default)]
    rate_limit_exceeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl SocialProviderResponse {
    pub fn success(value: Value, context: Context) -> Self {
        Self {
            status: ResponseStatus::Success,
            value,
            context,
            error_kind: None,
            is_unauthorized: false,
            rate_limit_exceeded: false,
            retry_after: None,
        }
    }

    /// Create an ERROR response; the context mirrors the value when it is an object
    pub fn error(kind: ErrorKind, value: Value) -> Self {
        let context = value.as_object().cloned().unwrap_or_default();
        Self {
            status: ResponseStatus::Error,
            value,
            context,
            error_kind: Some(kind),
            is_unauthorized: false,
            rate_limit_exceeded: false,
            retry_after: None,
        }
    }

    /// ERROR response for a request that never got an HTTP answer
    pub fn transport_error(error: &ProviderError) -> Self {
        Self::error(
            ErrorKind::Transport,
            serde_json::json!({ "error": error.to_string() }),
        )
    }

    /// Normalize an HTTP answer, using the provider body as context
    pub fn from_http(response: &HttpResponse) -> Self {
        Self::from_http_with(response, |_| None)
    }

    /// Normalize an HTTP answer
    ///
    /// On a 2xx status the context comes from `ok_context` when it returns
    /// `Some`, otherwise from the JSON body. Any other status yields an ERROR
    /// response carrying the body, with the unauthorized and rate-limit flags
    /// set from the status code.
    pub fn from_http_with<F>(response: &HttpResponse, ok_context: F) -> Self
    where
        F: FnOnce(&HttpResponse) -> Option<Context>,
    {
        let value = response.json_or_null();

        if response.is_success() {
            let context = match ok_context(response) {
                Some(context) => context,
                None => value.as_object().cloned().unwrap_or_default(),
            };
            return Self::success(value, context);
        }

        let mut error = Self::error(ErrorKind::Provider, value);
        error.is_unauthorized = response.status == 401;
        if response.status == 429 {
            error.rate_limit_exceeded = true;
            error.retry_after = response
                .header("retry-after")
                .and_then(|v| v.trim().parse().ok());
        }
        error
    }

    /// Replace the normalized context, keeping status and raw value
    pub fn use_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Re-tag an ERROR response; no-op on success
    pub fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        if self.has_error() {
            self.error_kind = Some(kind);
        }
        self
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn has_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn is_unauthorized(&self) -> bool {
        self.is_unauthorized
    }

    pub fn rate_limit_exceeded(&self) -> bool {
        self.rate_limit_exceeded
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// String field of the context; `None` if absent, null or not a string
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.context_str("id")
    }

    pub fn etag(&self) -> Option<&str> {
        self.context_str("ETag")
    }
}

/// Build a [`Context`] from `key => value` pairs
#[macro_export]
macro_rules! context {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = $crate::response::Context::new();
        $(map.insert($key.to_string(), $crate::__serde_json::json!($value));)*
        map
    }};
}
