//! LinkedIn provider implementation
//!
//! Publishes to personal profiles (`urn:li:person:*`) and organization pages
//! (`urn:li:organization:*`) through the versioned `/rest` API:
//!
//! - posts with text, an article card, one image, one video or several images
//! - comments on a previous post when the account posts versions as comments
//! - post deletion and profile lookup
//!
//! The adapter composes a [`TokenManager`] (renewal before every call), an
//! [`UploadEngine`] (image and chunked video uploads) and a [`PostComposer`]
//! (request bodies).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{Config, LinkedinConfig};
use crate::context;
use crate::error::{PostbridgeError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::media::Media;
use crate::providers::{AdapterState, ProviderDeps, PublishParams, SocialProvider, SocialProviderContentType};
use crate::response::SocialProviderResponse;
use crate::token::{RefreshClient, Token, TokenManager};

pub mod account;
pub mod composer;
pub mod uploads;

pub use composer::{ComposeError, PostComposer};
pub use uploads::{UploadEngine, UploadSource};

/// Whose feed the account publishes to
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkedinAccountKind {
    #[default]
    #[serde(rename = "linkedin")]
    Person,
    #[serde(rename = "linkedin_page")]
    Page,
}

impl LinkedinAccountKind {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Person => "linkedin",
            Self::Page => "linkedin_page",
        }
    }

    /// Entity type used in author URNs
    pub fn urn_type(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Page => "organization",
        }
    }
}

/// Kind of organization page; also the first path segment of its public URL
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    #[default]
    Company,
    Showcase,
    School,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Showcase => "showcase",
            Self::School => "school",
        }
    }
}

/// Account identity and API coordinates shared by the adapter's parts
#[derive(Debug, Clone)]
pub struct LinkedinContext {
    pub api_url: String,
    pub api_version: String,
    pub rest_version: String,
    pub account: LinkedinAccountKind,
    pub provider_id: String,
    pub username: String,
    pub page_type: PageType,
    /// Profile lookups go through OpenID `userinfo`
    pub openid: bool,
    pub content_type: SocialProviderContentType,
}

impl LinkedinContext {
    pub fn from_config(config: &LinkedinConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            rest_version: config.rest_version.clone(),
            account: config.provider,
            provider_id: config.provider_id.clone(),
            username: config.username.clone(),
            page_type: config.page_type,
            openid: config.openid,
            content_type: config.content_type,
        }
    }

    pub fn for_account(account: LinkedinAccountKind, provider_id: &str) -> Self {
        Self::from_config(&LinkedinConfig::for_account(account, provider_id))
    }

    pub fn author_urn(&self) -> String {
        format!("urn:li:{}:{}", self.account.urn_type(), self.provider_id)
    }

    pub fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.api_url, path)
    }

    pub fn versioned_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.api_version, path)
    }

    pub fn protocol_headers(&self) -> Vec<(String, String)> {
        vec![("X-Restli-Protocol-Version".to_string(), "2.0.0".to_string())]
    }

    /// Headers required by `/rest/*` endpoints
    pub fn rest_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.protocol_headers();
        headers.push(("LinkedIn-Version".to_string(), self.rest_version.clone()));
        headers
    }
}

/// Send a request, folding transport failures into an ERROR response
pub(crate) async fn dispatch(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> std::result::Result<HttpResponse, SocialProviderResponse> {
    let method = request.method;
    let url = request.url.clone();

    transport.send(request).await.map_err(|e| {
        tracing::warn!(method = %method, url = %url, error = %e, "LinkedIn request failed");
        SocialProviderResponse::transport_error(&e)
    })
}

fn encode_urn(urn: &str) -> String {
    url::form_urlencoded::byte_serialize(urn.as_bytes()).collect()
}

pub struct LinkedinProvider {
    context: Arc<LinkedinContext>,
    tokens: TokenManager,
    uploads: UploadEngine,
    composer: PostComposer,
    transport: Arc<dyn HttpTransport>,
    state: AdapterState,
}

impl LinkedinProvider {
    pub fn new(config: &Config, token: Token, deps: ProviderDeps) -> Self {
        let context = Arc::new(LinkedinContext::from_config(&config.linkedin));

        let client = RefreshClient {
            token_url: format!("{}/accessToken", config.linkedin.oauth_url.trim_end_matches('/')),
            client_id: config.linkedin.client_id.clone(),
            client_secret: config.linkedin.client_secret.clone(),
        };
        let tokens = TokenManager::new(token, client, deps.transport.clone(), deps.token_store)
            .with_margin(chrono::Duration::seconds(config.token.refresh_margin_secs));

        let uploads = UploadEngine::new(deps.transport.clone(), deps.media, context.clone());
        let composer = PostComposer::new(
            uploads.clone(),
            deps.link_cards,
            deps.transport.clone(),
            context.clone(),
        );

        let state = if tokens.needs_refresh() {
            AdapterState::Unauthenticated
        } else {
            AdapterState::Authenticated
        };

        Self {
            context,
            tokens,
            uploads,
            composer,
            transport: deps.transport,
            state,
        }
    }

    pub fn context(&self) -> &LinkedinContext {
        &self.context
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn external_account_url(&self) -> String {
        account::external_account_url(self.context.account, &self.context.username, self.context.page_type)
    }

    /// Renew the token if needed and mark the operation in flight
    ///
    /// Returns the refresh ERROR response when renewal failed.
    async fn begin(&mut self) -> Result<Option<SocialProviderResponse>> {
        if self.tokens.needs_refresh() {
            self.state = AdapterState::Unauthenticated;
        }

        match self.tokens.ensure_fresh().await {
            Ok(Some(failure)) => {
                self.state = AdapterState::Unauthenticated;
                Ok(Some(failure))
            }
            Ok(None) => {
                self.state = AdapterState::Operating;
                Ok(None)
            }
            Err(e) => {
                self.state = AdapterState::Error;
                Err(e)
            }
        }
    }

    fn finish(&mut self, outcome: Result<SocialProviderResponse>) -> Result<SocialProviderResponse> {
        self.state = match &outcome {
            Ok(response) if !response.has_error() => AdapterState::Authenticated,
            _ => AdapterState::Error,
        };
        outcome
    }

    /// Upload an image outside of a post
    pub async fn upload_image(&mut self, source: UploadSource<'_>) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self.uploads.upload_image(self.tokens.access_token(), source).await;
        self.finish(outcome)
    }

    /// Upload a video outside of a post
    pub async fn upload_video(&mut self, media: &Media, params: &PublishParams) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self
            .uploads
            .upload_video(self.tokens.access_token(), media, &params.video_thumbs)
            .await;
        self.finish(outcome)
    }

    /// Comment on an existing post
    pub async fn publish_comment(&mut self, text: &str, post_id: &str) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self.comment(text, post_id).await;
        self.finish(outcome)
    }

    async fn comment(&self, text: &str, post_id: &str) -> Result<SocialProviderResponse> {
        let request = HttpRequest::post(
            self.context
                .rest_url(&format!("socialActions/{}/comments", encode_urn(post_id))),
        )
        .bearer(self.tokens.access_token())
        .headers(self.context.rest_headers())
        .json(json!({
            "actor": self.context.author_urn(),
            "object": post_id,
            "message": {
                "text": text,
            },
        }));

        let response = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => response,
            Err(failure) => return Ok(failure),
        };

        let response = SocialProviderResponse::from_http_with(&response, |r| {
            r.header("x-restli-id").map(|id| context! { "id" => id })
        });
        tracing::info!(post = %post_id, success = !response.has_error(), "Published LinkedIn comment");
        Ok(response)
    }

    async fn publish(&self, text: &str, media: &[Media], params: &PublishParams) -> Result<SocialProviderResponse> {
        let as_comment = params
            .previous_post_response
            .as_ref()
            .filter(|_| self.context.content_type == SocialProviderContentType::Comments);

        if let Some(previous) = as_comment {
            let post_id = previous.id().ok_or_else(|| {
                PostbridgeError::InvalidInput("previous post response has no id to comment on".to_string())
            })?;
            return self.comment(text, post_id).await;
        }

        let token = self.tokens.access_token();
        let payload = match self.composer.compose(token, text, media, params).await {
            Ok(payload) => payload,
            Err(ComposeError::Rejected(response)) => return Ok(response),
            Err(ComposeError::Fatal(e)) => return Err(e),
        };

        let request = HttpRequest::post(self.context.rest_url("posts"))
            .bearer(token)
            .headers(self.context.rest_headers())
            .json(payload);

        let response = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => response,
            Err(failure) => return Ok(failure),
        };

        let response = SocialProviderResponse::from_http_with(&response, |r| {
            Some(context! { "id" => r.header("x-linkedin-id") })
        });
        tracing::info!(
            author = %self.context.author_urn(),
            media = media.len(),
            success = !response.has_error(),
            "Published LinkedIn post"
        );
        Ok(response)
    }

    async fn delete(&self, id: &str) -> Result<SocialProviderResponse> {
        let request = HttpRequest::delete(self.context.rest_url(&format!("posts/{}", encode_urn(id))))
            .bearer(self.tokens.access_token())
            .headers(self.context.rest_headers());

        let response = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => SocialProviderResponse::from_http(&response),
            Err(failure) => failure,
        };
        tracing::info!(post = %id, success = !response.has_error(), "Deleted LinkedIn post");
        Ok(response)
    }

    async fn account(&self) -> Result<SocialProviderResponse> {
        let context = self.context.as_ref();

        let request = match (context.account, context.openid) {
            (LinkedinAccountKind::Page, _) => {
                HttpRequest::get(context.rest_url(&format!("organizations/{}", context.provider_id)))
                    .headers(context.rest_headers())
            }
            (LinkedinAccountKind::Person, true) => {
                HttpRequest::get(context.versioned_url("userinfo")).headers(context.protocol_headers())
            }
            (LinkedinAccountKind::Person, false) => HttpRequest::get(context.versioned_url("me"))
                .query("projection", account::LEGACY_PROFILE_PROJECTION)
                .headers(context.protocol_headers()),
        };

        let response = match dispatch(
            self.transport.as_ref(),
            request.bearer(self.tokens.access_token()),
        )
        .await
        {
            Ok(response) => response,
            Err(failure) => return Ok(failure),
        };

        Ok(SocialProviderResponse::from_http_with(&response, |r| {
            let data = r.json_or_null();
            Some(match (context.account, context.openid) {
                (LinkedinAccountKind::Page, _) => {
                    account::organization_profile(&data, &context.provider_id)
                }
                (LinkedinAccountKind::Person, true) => account::openid_profile(&data),
                (LinkedinAccountKind::Person, false) => account::legacy_profile(&data),
            })
        }))
    }
}

#[async_trait]
impl SocialProvider for LinkedinProvider {
    fn name(&self) -> &str {
        self.context.account.provider_name()
    }

    fn content_type(&self) -> SocialProviderContentType {
        self.context.content_type
    }

    fn state(&self) -> AdapterState {
        self.state
    }

    async fn publish_post(
        &mut self,
        text: &str,
        media: &[Media],
        params: &PublishParams,
    ) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self.publish(text, media, params).await;
        self.finish(outcome)
    }

    async fn delete_post(&mut self, id: &str) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self.delete(id).await;
        self.finish(outcome)
    }

    async fn get_account(&mut self) -> Result<SocialProviderResponse> {
        if let Some(failure) = self.begin().await? {
            return Ok(failure);
        }
        let outcome = self.account().await;
        self.finish(outcome)
    }
}
