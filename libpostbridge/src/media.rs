//! Stored media assets and the store they are read from
//!
//! Media records belong to the persistence layer; this crate only needs their
//! metadata and a way to read their bytes. A [`MediaStream`] is handed out per
//! read and releases its file handle (and staging directory, for temporary
//! files) when closed or dropped.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::{PostbridgeError, Result};
use crate::temporary_file::TemporaryFile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Gif,
    Video,
}

impl MediaType {
    /// Classify a MIME string; `None` for anything that is neither image nor video
    pub fn from_mime_str(mime: &str) -> Option<Self> {
        let mime = mime.to_lowercase();
        if mime == "image/gif" {
            Some(Self::Gif)
        } else if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// MIME type for a file extension the providers accept
pub fn mime_type_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

/// An uploaded asset as recorded by the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub id: u64,
    pub name: String,
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    pub alt_text: Option<String>,
    /// Location inside the media store
    pub path: String,
}

impl Media {
    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_mime_str(&self.mime_type)
    }

    /// True for every image, GIFs included
    pub fn is_image(&self) -> bool {
        matches!(self.media_type(), Some(MediaType::Image | MediaType::Gif))
    }

    pub fn is_image_gif(&self) -> bool {
        self.media_type() == Some(MediaType::Gif)
    }

    pub fn is_video(&self) -> bool {
        self.media_type() == Some(MediaType::Video)
    }

    pub fn alt_text_or_empty(&self) -> &str {
        self.alt_text.as_deref().unwrap_or("")
    }
}

pub trait AsyncReadSeek: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> AsyncReadSeek for T {}

/// Readable, seekable handle on an asset's bytes
pub struct MediaStream {
    reader: Box<dyn AsyncReadSeek>,
    /// Staging directory removed together with the stream
    staging: Option<TemporaryFile>,
}

impl MediaStream {
    pub fn new(reader: Box<dyn AsyncReadSeek>) -> Self {
        Self {
            reader,
            staging: None,
        }
    }

    pub(crate) fn with_staging(reader: Box<dyn AsyncReadSeek>, staging: TemporaryFile) -> Self {
        Self {
            reader,
            staging: Some(staging),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(std::io::Cursor::new(bytes)))
    }

    /// Read the whole asset from its first byte
    pub async fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(0)).await?;
        let mut buffer = Vec::new();
        self.reader.read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    /// Read the inclusive byte range `[first_byte, last_byte]`
    ///
    /// The position is always taken from the start of the stream, so ranges
    /// may be requested in any order. A range reaching past the end of the
    /// asset fails with `UnexpectedEof`.
    pub async fn read_range(&mut self, first_byte: u64, last_byte: u64) -> std::io::Result<Vec<u8>> {
        if last_byte < first_byte {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid byte range {}-{}", first_byte, last_byte),
            ));
        }
        let end = self.reader.seek(SeekFrom::End(0)).await?;
        if last_byte >= end {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("byte range {}-{} runs past the end ({} bytes)", first_byte, last_byte, end),
            ));
        }
        let length = usize::try_from(last_byte - first_byte + 1).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "byte range too large")
        })?;

        self.reader.seek(SeekFrom::Start(first_byte)).await?;
        let mut buffer = vec![0u8; length];
        self.reader.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    /// Release the handle and any staging directory
    pub fn close(self) {
        if let Some(staging) = &self.staging {
            tracing::debug!(path = %staging.path().display(), "Releasing staged file");
        }
        drop(self);
    }
}

/// Where stored media lives
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn find(&self, id: u64) -> Result<Option<Media>>;

    async fn read_stream(&self, media: &Media) -> Result<MediaStream>;
}

/// Media store over a local directory
///
/// The catalog of media records is registered by the caller; paths are
/// resolved against `root` (absolute paths are used as-is).
pub struct LocalMediaStore {
    root: PathBuf,
    catalog: RwLock<HashMap<u64, Media>>,
    next_id: AtomicU64,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn register(&self, media: Media) {
        self.next_id.fetch_max(media.id + 1, Ordering::SeqCst);
        if let Ok(mut catalog) = self.catalog.write() {
            catalog.insert(media.id, media);
        }
    }

    /// Register a file from disk, deriving size and MIME type
    pub fn register_file(&self, path: &Path, alt_text: Option<String>) -> Result<Media> {
        let full_path = self.root.join(path);
        let metadata = std::fs::metadata(&full_path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let mime_type = mime_type_from_extension(ext).ok_or_else(|| {
            PostbridgeError::InvalidInput(format!(
                "Unsupported media file '{}'. Supported: jpg, png, gif, webp, mp4, mov, webm",
                path.display()
            ))
        })?;

        let media = Media {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: mime_type.to_string(),
            size: metadata.len(),
            alt_text,
            path: path.to_string_lossy().into_owned(),
        };
        self.register(media.clone());
        Ok(media)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn find(&self, id: u64) -> Result<Option<Media>> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| PostbridgeError::InvalidInput("media catalog lock poisoned".to_string()))?;
        Ok(catalog.get(&id).cloned())
    }

    async fn read_stream(&self, media: &Media) -> Result<MediaStream> {
        let file = tokio::fs::File::open(self.root.join(&media.path)).await?;
        Ok(MediaStream::new(Box::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn media(mime: &str) -> Media {
        Media {
            id: 1,
            name: "file".to_string(),
            mime_type: mime.to_string(),
            size: 0,
            alt_text: None,
            path: "file".to_string(),
        }
    }

    #[test]
    fn test_media_type_predicates() {
        assert!(media("image/png").is_image());
        assert!(!media("image/png").is_image_gif());
        assert!(media("image/gif").is_image());
        assert!(media("image/gif").is_image_gif());
        assert!(media("video/mp4").is_video());
        assert!(!media("video/mp4").is_image());
        assert_eq!(media("application/pdf").media_type(), None);
    }

    #[test]
    fn test_alt_text_or_empty() {
        let mut m = media("image/png");
        assert_eq!(m.alt_text_or_empty(), "");
        m.alt_text = Some("A cat".to_string());
        assert_eq!(m.alt_text_or_empty(), "A cat");
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type_from_extension("JPG"), Some("image/jpeg"));
        assert_eq!(mime_type_from_extension("mp4"), Some("video/mp4"));
        assert_eq!(mime_type_from_extension("txt"), None);
    }

    #[tokio::test]
    async fn test_read_range_is_inclusive_and_order_independent() {
        let mut stream = MediaStream::from_bytes(b"0123456789".to_vec());

        assert_eq!(stream.read_range(5, 9).await.unwrap(), b"56789");
        assert_eq!(stream.read_range(0, 4).await.unwrap(), b"01234");
        assert_eq!(stream.read_range(3, 3).await.unwrap(), b"3");
    }

    #[tokio::test]
    async fn test_read_range_past_end_fails() {
        let mut stream = MediaStream::from_bytes(b"0123".to_vec());
        let err = stream.read_range(2, 10).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_range_far_past_end_fails_without_allocating() {
        let mut stream = MediaStream::from_bytes(b"0123".to_vec());
        let err = stream.read_range(0, 1 << 46).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        let err = stream.read_range(u64::MAX - 1, u64::MAX).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        assert_eq!(stream.read_range(0, 3).await.unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_read_range_rejects_inverted_range() {
        let mut stream = MediaStream::from_bytes(b"0123".to_vec());
        let err = stream.read_range(3, 1).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_read_all_rewinds() {
        let mut stream = MediaStream::from_bytes(b"abcdef".to_vec());
        stream.read_range(2, 3).await.unwrap();
        assert_eq!(stream.read_all().await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_local_store_register_file_and_read() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("photo.png"), b"png-bytes").unwrap();

        let store = LocalMediaStore::new(dir.path());
        let media = store
            .register_file(Path::new("photo.png"), Some("alt".to_string()))
            .unwrap();

        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.size, 9);
        assert_eq!(store.find(media.id).await.unwrap(), Some(media.clone()));

        let mut stream = store.read_stream(&media).await.unwrap();
        assert_eq!(stream.read_all().await.unwrap(), b"png-bytes");
        stream.close();
    }

    #[tokio::test]
    async fn test_local_store_ids_follow_registered_media() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();

        let store = LocalMediaStore::new(dir.path());
        store.register(Media {
            id: 41,
            ..media("image/png")
        });
        let registered = store.register_file(Path::new("a.jpg"), None).unwrap();
        assert_eq!(registered.id, 42);
    }

    #[tokio::test]
    async fn test_local_store_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let store = LocalMediaStore::new(dir.path());
        let result = store.register_file(Path::new("notes.txt"), None);
        assert!(matches!(result, Err(PostbridgeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_local_store_find_missing() {
        let store = LocalMediaStore::new("/nonexistent");
        assert_eq!(store.find(99).await.unwrap(), None);
    }
}
