//! Staging area for remote files
//!
//! A [`TemporaryFile`] owns a private directory holding exactly one file. The
//! directory goes away on [`TemporaryFile::delete`], when the file is turned
//! into a stream and that stream is released, or when the value is dropped on
//! any other path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::{ProviderError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::media::{mime_type_from_extension, MediaStream};

const FALLBACK_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug)]
pub struct TemporaryFile {
    directory: TempDir,
    path: PathBuf,
    mime_type: String,
    size: u64,
}

impl TemporaryFile {
    /// Download `url` into a fresh staging directory
    ///
    /// The MIME type comes from the `Content-Type` header, then from the URL's
    /// extension, and defaults to `image/jpeg`.
    pub async fn from_url(transport: &dyn HttpTransport, url: &str) -> Result<Self> {
        let response = transport.send(HttpRequest::get(url)).await?;

        if !response.is_success() {
            return Err(ProviderError::InvalidResponse(format!(
                "fetching {} returned HTTP {}",
                url, response.status
            ))
            .into());
        }

        let mime_type = response
            .header("content-type")
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty() && value != "application/octet-stream")
            .or_else(|| extension_of(url).and_then(mime_type_from_extension).map(String::from))
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        tracing::debug!(url = %url, mime_type = %mime_type, bytes = response.body.len(), "Staged remote file");

        Self::from_bytes(&response.body, &mime_type).await
    }

    /// Stage in-memory bytes
    pub async fn from_bytes(bytes: &[u8], mime_type: &str) -> Result<Self> {
        let directory = tempfile::Builder::new().prefix("postbridge-").tempdir()?;

        let extension = extension_for_mime(mime_type);
        let path = directory.path().join(format!("{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, bytes).await?;

        Ok(Self {
            directory,
            path,
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        self.directory.path()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open the staged file; the stream takes over the staging directory
    pub async fn into_stream(self) -> Result<MediaStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(MediaStream::with_staging(Box::new(file), self))
    }

    /// Remove the staging directory now, reporting failures
    pub fn delete(self) -> Result<()> {
        self.directory.close()?;
        Ok(())
    }
}

fn extension_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext)
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}
