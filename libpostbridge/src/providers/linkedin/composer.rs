//! Post payload composition
//!
//! Builds the `/rest/posts` body for a publish call, uploading attached media
//! on the way. The payload shape depends on what is attached:
//!
//! - nothing, with a link: an article card
//! - one image: `content.media` with alt text
//! - one video: `content.media`
//! - several media: `content.multiImage` made of the images among them

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{json, Map, Value};

use crate::error::PostbridgeError;
use crate::http::HttpTransport;
use crate::link_card::LinkCardFetcher;
use crate::media::Media;
use crate::providers::PublishParams;
use crate::response::{ErrorKind, SocialProviderResponse};
use crate::temporary_file::TemporaryFile;

use super::uploads::{UploadEngine, UploadSource};
use super::LinkedinContext;

/// Why a payload could not be composed
#[derive(Debug)]
pub enum ComposeError {
    /// A step was refused; the response is what the operation returns
    Rejected(SocialProviderResponse),
    /// Local fault that aborts the operation
    Fatal(PostbridgeError),
}

impl From<PostbridgeError> for ComposeError {
    fn from(error: PostbridgeError) -> Self {
        Self::Fatal(error)
    }
}

type ComposeResult<T> = std::result::Result<T, ComposeError>;

pub struct PostComposer {
    uploads: UploadEngine,
    link_cards: Arc<dyn LinkCardFetcher>,
    transport: Arc<dyn HttpTransport>,
    context: Arc<LinkedinContext>,
}

impl PostComposer {
    pub fn new(
        uploads: UploadEngine,
        link_cards: Arc<dyn LinkCardFetcher>,
        transport: Arc<dyn HttpTransport>,
        context: Arc<LinkedinContext>,
    ) -> Self {
        Self {
            uploads,
            link_cards,
            transport,
            context,
        }
    }

    /// Fields every post carries
    pub fn base_payload(&self, text: &str, params: &PublishParams) -> Map<String, Value> {
        let visibility = params
            .visibility
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("PUBLIC")
            .to_uppercase();

        let payload = json!({
            "author": self.context.author_urn(),
            "commentary": text,
            "visibility": visibility,
            "distribution": {
                "feedDistribution": "MAIN_FEED",
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false,
        });

        match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Build the complete post body, uploading media as needed
    pub async fn compose(
        &self,
        token: &SecretString,
        text: &str,
        media: &[Media],
        params: &PublishParams,
    ) -> ComposeResult<Value> {
        let mut payload = self.base_payload(text, params);

        let content = match media {
            [] => self.article(token, params).await?,
            [single] if single.is_image() => Some(self.image(token, single).await?),
            [single] if single.is_video() => Some(self.video(token, single, params).await?),
            [_] => None,
            _ => self.multi_image(token, media).await?,
        };

        if let Some(content) = content {
            payload.insert("content".to_string(), content);
        }

        Ok(Value::Object(payload))
    }

    async fn article(&self, token: &SecretString, params: &PublishParams) -> ComposeResult<Option<Value>> {
        let Some(url) = params.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };

        let card = self.link_cards.fetch(url).await;

        let mut article = json!({
            "source": url,
            "title": card.title,
            "description": card.description,
        });

        if !card.image.is_empty() {
            let file = match TemporaryFile::from_url(self.transport.as_ref(), &card.image).await {
                Ok(file) => file,
                Err(PostbridgeError::Provider(e)) => {
                    return Err(ComposeError::Rejected(SocialProviderResponse::error(
                        ErrorKind::Upload,
                        json!({ "error": format!("could not fetch link image: {}", e) }),
                    )))
                }
                Err(e) => return Err(e.into()),
            };

            let response = self
                .uploads
                .upload_image(token, UploadSource::Temporary(file))
                .await?;

            match response.id() {
                Some(id) if !response.has_error() => article["thumbnail"] = json!(id),
                _ => tracing::warn!(url = %url, "Link thumbnail upload failed, posting without it"),
            }
        }

        Ok(Some(json!({ "article": article })))
    }

    async fn image(&self, token: &SecretString, image: &Media) -> ComposeResult<Value> {
        let response = self
            .uploads
            .upload_image(token, UploadSource::Media(image))
            .await?;
        let id = uploaded_id(response)?;

        Ok(json!({
            "media": {
                "id": id,
                "altText": image.alt_text_or_empty(),
            }
        }))
    }

    async fn video(&self, token: &SecretString, video: &Media, params: &PublishParams) -> ComposeResult<Value> {
        let response = self
            .uploads
            .upload_video(token, video, &params.video_thumbs)
            .await?;
        let id = uploaded_id(response)?;

        Ok(json!({
            "media": {
                "id": id,
            }
        }))
    }

    async fn multi_image(&self, token: &SecretString, media: &[Media]) -> ComposeResult<Option<Value>> {
        let mut images = Vec::new();

        for image in media.iter().filter(|m| m.is_image()) {
            let response = self
                .uploads
                .upload_image(token, UploadSource::Media(image))
                .await?;
            let id = uploaded_id(response)?;

            images.push(json!({
                "id": id,
                "altText": image.alt_text_or_empty(),
            }));
        }

        if images.is_empty() {
            return Ok(None);
        }

        Ok(Some(json!({ "multiImage": { "images": images } })))
    }
}

fn uploaded_id(response: SocialProviderResponse) -> ComposeResult<String> {
    if response.has_error() {
        return Err(ComposeError::Rejected(response));
    }
    match response.id() {
        Some(id) => Ok(id.to_string()),
        None => Err(ComposeError::Rejected(SocialProviderResponse::error(
            ErrorKind::Upload,
            json!({ "error": "upload finished without an asset id" }),
        ))),
    }
}
