//! Association between a video and the image chosen as its thumbnail

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::media::{Media, MediaStore};

/// One `video_thumbs` entry of the publish parameters
///
/// Ids arrive from form data and may be numbers or numeric strings; entries
/// missing either id never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoThumb {
    #[serde(default, deserialize_with = "lenient_id")]
    pub media_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub thumb_id: Option<u64>,
}

impl VideoThumb {
    pub fn new(media_id: u64, thumb_id: u64) -> Self {
        Self {
            media_id: Some(media_id),
            thumb_id: Some(thumb_id),
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Thumbnail id of the first entry matching `media_id`
pub fn thumb_id_for_media_id(media_id: u64, thumbs: &[VideoThumb]) -> Option<u64> {
    thumbs
        .iter()
        .filter_map(|thumb| match (thumb.media_id, thumb.thumb_id) {
            (Some(media), Some(thumb)) => Some((media, thumb)),
            _ => None,
        })
        .find(|(media, _)| *media == media_id)
        .map(|(_, thumb)| thumb)
}

/// Resolve the thumbnail media for a video, if one was chosen and still exists
pub async fn thumb_for_media_id(
    media_id: u64,
    thumbs: &[VideoThumb],
    store: &dyn MediaStore,
) -> Result<Option<Media>> {
    match thumb_id_for_media_id(media_id, thumbs) {
        Some(thumb_id) => store.find(thumb_id).await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMediaStore;

    fn image(id: u64) -> Media {
        Media {
            id,
            name: format!("thumb-{}.jpg", id),
            mime_type: "image/jpeg".to_string(),
            size: 10,
            alt_text: None,
            path: format!("thumb-{}.jpg", id),
        }
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let thumbs = vec![VideoThumb::new(5, 9), VideoThumb::new(7, 3), VideoThumb::new(5, 11)];
        assert_eq!(thumb_id_for_media_id(5, &thumbs), Some(9));
        assert_eq!(thumb_id_for_media_id(7, &thumbs), Some(3));
        assert_eq!(thumb_id_for_media_id(99, &thumbs), None);
    }

    #[test]
    fn test_incomplete_entries_are_skipped() {
        let thumbs = vec![
            VideoThumb {
                media_id: Some(5),
                thumb_id: None,
            },
            VideoThumb::new(5, 8),
        ];
        assert_eq!(thumb_id_for_media_id(5, &thumbs), Some(8));
    }

    #[test]
    fn test_deserialize_accepts_string_ids() {
        let thumbs: Vec<VideoThumb> = serde_json::from_str(
            r#"[{"media_id": "5", "thumb_id": 9}, {"media_id": 7}, {"thumb_id": "x"}]"#,
        )
        .unwrap();

        assert_eq!(thumbs[0], VideoThumb::new(5, 9));
        assert_eq!(thumbs[1].thumb_id, None);
        assert_eq!(thumbs[2], VideoThumb::default());
    }

    #[tokio::test]
    async fn test_thumb_for_media_id_resolves_media() {
        let store = LocalMediaStore::new("/unused");
        store.register(image(9));
        store.register(image(3));
        let thumbs = vec![VideoThumb::new(5, 9), VideoThumb::new(7, 3)];

        let thumb = thumb_for_media_id(5, &thumbs, &store).await.unwrap();
        assert_eq!(thumb.map(|m| m.id), Some(9));

        let none = thumb_for_media_id(99, &thumbs, &store).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_thumb_for_media_id_missing_media() {
        let store = LocalMediaStore::new("/unused");
        let thumbs = vec![VideoThumb::new(5, 9)];
        assert!(thumb_for_media_id(5, &thumbs, &store).await.unwrap().is_none());
    }
}
