//! Postbridge - social publishing adapters
//!
//! This library publishes posts to social networks through provider adapters
//! that upload media, compose provider-specific payloads, keep access tokens
//! fresh and report every outcome as a uniform [`SocialProviderResponse`].

pub mod config;
pub mod error;
pub mod http;
pub mod link_card;
pub mod logging;
pub mod media;
pub mod providers;
pub mod response;
pub mod temporary_file;
pub mod token;
pub mod video_thumbs;

#[doc(hidden)]
pub use serde_json as __serde_json;

// Re-export commonly used types
pub use config::Config;
pub use error::{PostbridgeError, Result};
pub use media::{Media, MediaType};
pub use providers::{PublishParams, SocialProvider};
pub use response::{ErrorKind, ResponseStatus, SocialProviderResponse};
