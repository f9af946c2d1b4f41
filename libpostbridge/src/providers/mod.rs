//! Provider abstraction and implementations
//!
//! Each provider adapter turns "publish this text with these media" into the
//! provider's HTTP protocol and answers with a uniform
//! [`SocialProviderResponse`]. Adapters own their token lifecycle: every
//! operation renews an expiring token first and short-circuits when the
//! renewal fails.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use libpostbridge::config::Config;
//! use libpostbridge::http::ReqwestTransport;
//! use libpostbridge::link_card::HttpLinkCardFetcher;
//! use libpostbridge::media::LocalMediaStore;
//! use libpostbridge::providers::linkedin::LinkedinProvider;
//! use libpostbridge::providers::{ProviderDeps, PublishParams, SocialProvider};
//! use libpostbridge::token::{FileTokenStore, Token};
//!
//! # async fn example() -> libpostbridge::Result<()> {
//! let config = Config::load()?;
//! let transport = Arc::new(ReqwestTransport::new(&config.http)?);
//! let deps = ProviderDeps {
//!     transport: transport.clone(),
//!     media: Arc::new(LocalMediaStore::new(config.media_root())),
//!     link_cards: Arc::new(HttpLinkCardFetcher::new(transport)),
//!     token_store: Arc::new(FileTokenStore::new(config.token_path())),
//! };
//!
//! let mut provider = LinkedinProvider::new(&config, Token::new("access-token"), deps);
//! let response = provider
//!     .publish_post("Hello from Rust", &[], &PublishParams::default())
//!     .await?;
//!
//! if response.has_error() {
//!     eprintln!("LinkedIn rejected the post: {}", response.value());
//! } else {
//!     println!("Published {}", response.id().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::HttpTransport;
use crate::link_card::LinkCardFetcher;
use crate::media::{Media, MediaStore};
use crate::response::SocialProviderResponse;
use crate::token::TokenStore;
use crate::video_thumbs::VideoThumb;

pub mod linkedin;

// Available outside tests so integration tests can script provider answers
pub mod mock;

/// How a provider presents a post made of several versions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SocialProviderContentType {
    /// One standalone post
    Single,
    /// A chain of posts replying to each other
    Thread,
    /// The first version is the post, later ones are comments on it
    Comments,
}

/// Lifecycle of a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// The token must be renewed before the next call; a failed renewal leaves
    /// the adapter here
    Unauthenticated,
    /// Ready, no operation in flight
    Authenticated,
    /// An operation is in flight
    Operating,
    /// The last operation ended in an ERROR response or a fatal error
    Error,
}

/// Optional parameters of [`SocialProvider::publish_post`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishParams {
    /// Provider visibility (`PUBLIC`, `CONNECTIONS`, ...); case-insensitive
    #[serde(default)]
    pub visibility: Option<String>,
    /// Link to share as an article card
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub video_thumbs: Vec<VideoThumb>,
    /// Response of the previous version, when this one is posted as a comment
    #[serde(default)]
    pub previous_post_response: Option<SocialProviderResponse>,
}

/// Collaborators a provider adapter is built from
#[derive(Clone)]
pub struct ProviderDeps {
    pub transport: Arc<dyn HttpTransport>,
    pub media: Arc<dyn MediaStore>,
    pub link_cards: Arc<dyn LinkCardFetcher>,
    pub token_store: Arc<dyn TokenStore>,
}

/// Provider trait for publishing to social networks
///
/// Operations never fail because the provider said no: rejections, transport
/// failures and failed token renewals are all reported as ERROR responses.
/// `Err` is reserved for faults on our side, such as a media file that cannot
/// be read.
#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Lowercase identifier (e.g. "linkedin", "linkedin_page")
    fn name(&self) -> &str;

    /// How multi-version posts are presented on this provider
    fn content_type(&self) -> SocialProviderContentType;

    fn state(&self) -> AdapterState;

    /// Publish a post
    ///
    /// # Arguments
    ///
    /// * `text` - Post body, passed to the provider unmodified
    /// * `media` - Attachments in display order
    /// * `params` - Visibility, link, video thumbnails and the previous
    ///   version's response
    ///
    /// # Returns
    ///
    /// A SUCCESS response whose `id()` is the provider's post id, or the
    /// ERROR response of the first step that failed.
    ///
    /// # Errors
    ///
    /// Returns `PostbridgeError::Io` when a media file cannot be read.
    async fn publish_post(
        &mut self,
        text: &str,
        media: &[Media],
        params: &PublishParams,
    ) -> Result<SocialProviderResponse>;

    /// Delete a post by the id returned from [`publish_post`](Self::publish_post)
    async fn delete_post(&mut self, id: &str) -> Result<SocialProviderResponse>;

    /// Fetch the connected account
    ///
    /// On success the context holds `id`, `name`, `username` and `image`.
    async fn get_account(&mut self) -> Result<SocialProviderResponse>;
}
