//! LinkedIn asset uploads
//!
//! Images go up in two steps (register, then send the bytes to the returned
//! URL). Videos are registered with their size, sent in the byte ranges
//! LinkedIn prescribes, optionally given a thumbnail, and finalized with the
//! ETags of every part in instruction order.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context;
use crate::error::Result;
use crate::http::{HttpRequest, HttpTransport};
use crate::media::{Media, MediaStore};
use crate::response::{ErrorKind, SocialProviderResponse};
use crate::temporary_file::TemporaryFile;
use crate::video_thumbs::{self, VideoThumb};

use super::{dispatch, LinkedinContext};

/// Where image bytes come from
#[derive(Debug)]
pub enum UploadSource<'a> {
    /// A stored asset
    Media(&'a Media),
    /// A staged download; its directory is removed once the upload ends
    Temporary(TemporaryFile),
}

impl UploadSource<'_> {
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Media(media) => &media.mime_type,
            Self::Temporary(file) => file.mime_type(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageUploadSession {
    upload_url: String,
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoUploadSession {
    video: String,
    #[serde(default)]
    upload_token: String,
    #[serde(default)]
    upload_instructions: Vec<UploadInstruction>,
    #[serde(default)]
    thumbnail_upload_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadInstruction {
    first_byte: u64,
    last_byte: u64,
    upload_url: String,
}

/// Decode an initialize answer, which LinkedIn may wrap in a `value` envelope
fn session<T: serde::de::DeserializeOwned>(response: &SocialProviderResponse) -> std::result::Result<T, SocialProviderResponse> {
    let value = response.value();
    let payload = value.get("value").filter(|v| v.is_object()).unwrap_or(value);

    serde_json::from_value(payload.clone()).map_err(|e| {
        SocialProviderResponse::error(
            ErrorKind::Upload,
            json!({ "error": format!("unexpected initializeUpload answer: {}", e) }),
        )
    })
}

/// Provider rejections inside an upload are reported as upload failures
fn upload_step(response: SocialProviderResponse) -> SocialProviderResponse {
    if response.error_kind() == Some(ErrorKind::Provider) {
        response.with_error_kind(ErrorKind::Upload)
    } else {
        response
    }
}

#[derive(Clone)]
pub struct UploadEngine {
    transport: Arc<dyn HttpTransport>,
    media: Arc<dyn MediaStore>,
    context: Arc<LinkedinContext>,
}

impl UploadEngine {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        media: Arc<dyn MediaStore>,
        context: Arc<LinkedinContext>,
    ) -> Self {
        Self {
            transport,
            media,
            context,
        }
    }

    /// Upload an image and return its asset URN as the context `id`
    ///
    /// The id is the one assigned when the upload was registered, whatever
    /// the byte upload answered. The source stream (and staging directory of
    /// a temporary file) is released before returning on every path.
    pub async fn upload_image(
        &self,
        token: &SecretString,
        source: UploadSource<'_>,
    ) -> Result<SocialProviderResponse> {
        let request = HttpRequest::post(self.context.rest_url("images"))
            .query("action", "initializeUpload")
            .bearer(token)
            .headers(self.context.rest_headers())
            .json(json!({
                "initializeUploadRequest": {
                    "owner": self.context.author_urn(),
                }
            }));

        let initialize = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => SocialProviderResponse::from_http(&response),
            Err(failure) => return Ok(failure),
        };
        if initialize.has_error() {
            return Ok(upload_step(initialize));
        }
        let upload: ImageUploadSession = match session(&initialize) {
            Ok(upload) => upload,
            Err(failure) => return Ok(failure),
        };

        let mime_type = source.mime_type().to_string();
        let mut stream = match source {
            UploadSource::Media(media) => self.media.read_stream(media).await?,
            UploadSource::Temporary(file) => file.into_stream().await?,
        };
        let bytes = stream.read_all().await;
        stream.close();
        let bytes = bytes?;

        tracing::debug!(image = %upload.image, bytes = bytes.len(), "Uploading image");

        let request = HttpRequest::post(&upload.upload_url)
            .bearer(token)
            .headers(self.context.protocol_headers())
            .raw(bytes, mime_type);

        let uploaded = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => upload_step(SocialProviderResponse::from_http(&response)),
            Err(failure) => failure,
        };

        Ok(uploaded.use_context(context! { "id" => upload.image }))
    }

    /// Upload a video in the parts LinkedIn asks for, then finalize it
    ///
    /// A rejected part stops the upload: no further parts are sent and the
    /// upload is not finalized. The thumbnail is best effort.
    pub async fn upload_video(
        &self,
        token: &SecretString,
        media: &Media,
        video_thumbs: &[VideoThumb],
    ) -> Result<SocialProviderResponse> {
        let thumb = video_thumbs::thumb_for_media_id(media.id, video_thumbs, self.media.as_ref()).await?;

        let request = HttpRequest::post(self.context.rest_url("videos"))
            .query("action", "initializeUpload")
            .bearer(token)
            .headers(self.context.rest_headers())
            .json(json!({
                "initializeUploadRequest": {
                    "owner": self.context.author_urn(),
                    "fileSizeBytes": media.size,
                    "uploadThumbnail": thumb.is_some(),
                }
            }));

        let initialize = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => SocialProviderResponse::from_http(&response),
            Err(failure) => return Ok(failure),
        };
        if initialize.has_error() {
            return Ok(upload_step(initialize));
        }
        let upload: VideoUploadSession = match session(&initialize) {
            Ok(upload) => upload,
            Err(failure) => return Ok(failure),
        };

        tracing::debug!(
            video = %upload.video,
            parts = upload.upload_instructions.len(),
            "Uploading video"
        );

        let mut stream = self.media.read_stream(media).await?;
        let mut part_ids: Vec<Value> = Vec::with_capacity(upload.upload_instructions.len());

        for (index, instruction) in upload.upload_instructions.iter().enumerate() {
            let chunk = stream
                .read_range(instruction.first_byte, instruction.last_byte)
                .await?;

            let request = HttpRequest::put(&instruction.upload_url)
                .headers(self.context.rest_headers())
                .raw(chunk, "application/octet-stream");

            let part = match dispatch(self.transport.as_ref(), request).await {
                Ok(response) => SocialProviderResponse::from_http_with(&response, |r| {
                    Some(context! { "ETag" => r.header("etag") })
                }),
                Err(failure) => failure,
            };

            if part.has_error() {
                tracing::warn!(part = index, video = %upload.video, "Video part rejected, aborting upload");
                stream.close();
                return Ok(upload_step(part));
            }

            part_ids.push(part.get("ETag").cloned().unwrap_or(Value::Null));
        }

        stream.close();

        if let (Some(thumb), Some(url)) = (&thumb, upload.thumbnail_upload_url.as_deref()) {
            self.upload_video_thumbnail(thumb, url).await;
        }

        let request = HttpRequest::post(self.context.rest_url("videos"))
            .query("action", "finalizeUpload")
            .bearer(token)
            .headers(self.context.rest_headers())
            .json(json!({
                "finalizeUploadRequest": {
                    "video": upload.video,
                    "uploadToken": upload.upload_token,
                    "uploadedPartIds": part_ids,
                }
            }));

        let finalized = match dispatch(self.transport.as_ref(), request).await {
            Ok(response) => upload_step(SocialProviderResponse::from_http(&response)),
            Err(failure) => failure,
        };

        Ok(finalized.use_context(context! { "id" => upload.video }))
    }

    async fn upload_video_thumbnail(&self, thumb: &Media, url: &str) {
        let bytes = match self.media.read_stream(thumb).await {
            Ok(mut stream) => {
                let bytes = stream.read_all().await;
                stream.close();
                bytes
            }
            Err(e) => {
                tracing::warn!(thumb = thumb.id, error = %e, "Could not open video thumbnail, skipping");
                return;
            }
        };
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(thumb = thumb.id, error = %e, "Could not read video thumbnail, skipping");
                return;
            }
        };

        let request = HttpRequest::put(url)
            .header("media-type-family", "STILLIMAGE")
            .raw(bytes, "application/octet-stream");

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                tracing::debug!(thumb = thumb.id, "Uploaded video thumbnail")
            }
            Ok(response) => {
                tracing::warn!(thumb = thumb.id, status = response.status, "Video thumbnail rejected")
            }
            Err(e) => tracing::warn!(thumb = thumb.id, error = %e, "Video thumbnail upload failed"),
        }
    }
}
