//! End-to-end publishing tests for the LinkedIn adapter
//!
//! These tests drive `LinkedinProvider` through the scripted transport and a
//! media directory on disk, covering:
//! - single image, multi-image and article posts
//! - upload failures aborting the post
//! - token renewal gating every request

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use libpostbridge::config::Config;
use libpostbridge::http::{HttpMethod, HttpResponse};
use libpostbridge::link_card::LinkCard;
use libpostbridge::media::LocalMediaStore;
use libpostbridge::providers::linkedin::LinkedinProvider;
use libpostbridge::providers::mock::{json_response, MockTransport, RecordingTokenStore, StaticLinkCards};
use libpostbridge::providers::{AdapterState, ProviderDeps, PublishParams, SocialProvider};
use libpostbridge::token::Token;
use libpostbridge::{ErrorKind, Media};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Harness {
    _media_dir: TempDir,
    store: Arc<LocalMediaStore>,
    transport: Arc<MockTransport>,
    cards: StaticLinkCards,
    tokens: RecordingTokenStore,
}

impl Harness {
    fn new(transport: MockTransport) -> Result<Self> {
        let media_dir = TempDir::new()?;
        let store = Arc::new(LocalMediaStore::new(media_dir.path()));
        Ok(Self {
            _media_dir: media_dir,
            store,
            transport: Arc::new(transport),
            cards: StaticLinkCards::new(LinkCard::default()),
            tokens: RecordingTokenStore::default(),
        })
    }

    fn with_card(mut self, card: LinkCard) -> Self {
        self.cards = StaticLinkCards::new(card);
        self
    }

    fn add_media(&self, name: &str, bytes: &[u8], alt: Option<&str>) -> Result<Media> {
        std::fs::write(self.store.root().join(name), bytes)?;
        Ok(self
            .store
            .register_file(Path::new(name), alt.map(String::from))?)
    }

    fn provider(&self, token: Token) -> LinkedinProvider {
        let deps = ProviderDeps {
            transport: self.transport.clone(),
            media: self.store.clone(),
            link_cards: Arc::new(self.cards.clone()),
            token_store: Arc::new(self.tokens.clone()),
        };
        LinkedinProvider::new(&Config::default_config("abc"), token, deps)
    }

    fn post_body(&self) -> Value {
        self.transport.requests_to(HttpMethod::Post, "/rest/posts")[0]
            .json_body()
            .cloned()
            .unwrap_or(Value::Null)
    }
}

fn image_initialize(n: u32) -> HttpResponse {
    json_response(
        200,
        json!({"value": {
            "uploadUrl": format!("https://upload.example.com/image/{}", n),
            "image": format!("urn:li:image:{}", n),
        }}),
    )
}

fn posted() -> HttpResponse {
    HttpResponse::new(
        201,
        vec![("x-linkedin-id".to_string(), "urn:li:share:1".to_string())],
        Vec::new(),
    )
}

fn images_transport(count: u32) -> MockTransport {
    let mut transport = MockTransport::new();
    for n in 1..=count {
        transport = transport.on(HttpMethod::Post, "images?action=initializeUpload", image_initialize(n));
    }
    transport
        .on(HttpMethod::Post, "upload.example.com/image", json_response(201, json!({})))
        .on(HttpMethod::Post, "/rest/posts", posted())
}

#[tokio::test]
async fn test_single_image_post() -> Result<()> {
    let harness = Harness::new(images_transport(1))?;
    let photo = harness.add_media("photo.jpg", b"jpeg-bytes", Some("A sunset"))?;
    let mut provider = harness.provider(Token::new("access"));

    let response = provider
        .publish_post("Look at this", &[photo], &PublishParams::default())
        .await?;

    assert!(!response.has_error());
    assert_eq!(response.id(), Some("urn:li:share:1"));

    let body = harness.post_body();
    assert_eq!(body["content"]["media"]["id"], "urn:li:image:1");
    assert_eq!(body["content"]["media"]["altText"], "A sunset");
    Ok(())
}

#[tokio::test]
async fn test_single_gif_uses_image_branch() -> Result<()> {
    let harness = Harness::new(images_transport(1))?;
    let gif = harness.add_media("dance.gif", b"GIF89a", None)?;
    let mut provider = harness.provider(Token::new("access"));

    provider
        .publish_post("gif", &[gif], &PublishParams::default())
        .await?;

    let body = harness.post_body();
    assert_eq!(body["content"]["media"]["id"], "urn:li:image:1");
    assert_eq!(body["content"]["media"]["altText"], "");
    assert_eq!(harness.transport.count(HttpMethod::Post, "videos"), 0);
    Ok(())
}

#[tokio::test]
async fn test_multi_image_keeps_only_images_in_order() -> Result<()> {
    let harness = Harness::new(images_transport(2))?;
    let first = harness.add_media("one.png", b"1", Some("first"))?;
    let clip = harness.add_media("clip.mp4", b"video", None)?;
    let second = harness.add_media("two.png", b"2", None)?;
    let mut provider = harness.provider(Token::new("access"));

    let response = provider
        .publish_post("Album", &[first, clip, second], &PublishParams::default())
        .await?;

    assert!(!response.has_error());
    let images = harness.post_body()["content"]["multiImage"]["images"].clone();
    assert_eq!(
        images,
        json!([
            {"id": "urn:li:image:1", "altText": "first"},
            {"id": "urn:li:image:2", "altText": ""},
        ])
    );
    assert_eq!(harness.transport.count(HttpMethod::Post, "videos"), 0);
    Ok(())
}

#[tokio::test]
async fn test_multi_media_without_images_has_no_content() -> Result<()> {
    let harness = Harness::new(MockTransport::new().on(HttpMethod::Post, "/rest/posts", posted()))?;
    let a = harness.add_media("a.mp4", b"a", None)?;
    let b = harness.add_media("b.mp4", b"b", None)?;
    let mut provider = harness.provider(Token::new("access"));

    provider
        .publish_post("Two videos", &[a, b], &PublishParams::default())
        .await?;

    assert!(harness.post_body().get("content").is_none());
    assert_eq!(harness.transport.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_image_upload_failure_aborts_post() -> Result<()> {
    let transport = MockTransport::new()
        .on(HttpMethod::Post, "images?action=initializeUpload", image_initialize(1))
        .on(
            HttpMethod::Post,
            "upload.example.com/image",
            json_response(400, json!({"message": "corrupt image"})),
        )
        .on(HttpMethod::Post, "/rest/posts", posted());
    let harness = Harness::new(transport)?;
    let first = harness.add_media("one.png", b"1", None)?;
    let second = harness.add_media("two.png", b"2", None)?;
    let mut provider = harness.provider(Token::new("access"));

    let response = provider
        .publish_post("Album", &[first, second], &PublishParams::default())
        .await?;

    assert!(response.has_error());
    assert_eq!(response.error_kind(), Some(ErrorKind::Upload));
    assert_eq!(response.id(), Some("urn:li:image:1"));
    assert_eq!(response.value()["message"], "corrupt image");
    assert_eq!(harness.transport.count(HttpMethod::Post, "/rest/posts"), 0);
    assert_eq!(harness.transport.count(HttpMethod::Post, "initializeUpload"), 1);
    assert_eq!(provider.state(), AdapterState::Error);
    Ok(())
}

#[tokio::test]
async fn test_article_with_thumbnail() -> Result<()> {
    let transport = MockTransport::new()
        .on(
            HttpMethod::Get,
            "cdn.example.com/card.png",
            HttpResponse::new(
                200,
                vec![("content-type".to_string(), "image/png".to_string())],
                b"png".to_vec(),
            ),
        )
        .on(HttpMethod::Post, "images?action=initializeUpload", image_initialize(7))
        .on(HttpMethod::Post, "upload.example.com/image", json_response(201, json!({})))
        .on(HttpMethod::Post, "/rest/posts", posted());
    let harness = Harness::new(transport)?.with_card(LinkCard {
        title: "A title".to_string(),
        description: "A description".to_string(),
        image: "https://cdn.example.com/card.png".to_string(),
    });
    let mut provider = harness.provider(Token::new("access"));
    let params = PublishParams {
        url: Some("https://blog.example.com/post".to_string()),
        ..Default::default()
    };

    let response = provider.publish_post("New article", &[], &params).await?;

    assert!(!response.has_error());
    assert_eq!(harness.cards.fetched(), vec!["https://blog.example.com/post".to_string()]);
    assert_eq!(
        harness.post_body()["content"]["article"],
        json!({
            "source": "https://blog.example.com/post",
            "title": "A title",
            "description": "A description",
            "thumbnail": "urn:li:image:7",
        })
    );

    let upload = &harness.transport.requests_to(HttpMethod::Post, "upload.example.com")[0];
    assert_eq!(upload.raw_body(), Some(&b"png"[..]));
    Ok(())
}

#[tokio::test]
async fn test_article_without_card_image_has_no_thumbnail() -> Result<()> {
    let harness = Harness::new(MockTransport::new().on(HttpMethod::Post, "/rest/posts", posted()))?
        .with_card(LinkCard {
            title: "T".to_string(),
            description: String::new(),
            image: String::new(),
        });
    let mut provider = harness.provider(Token::new("access"));
    let params = PublishParams {
        url: Some("https://blog.example.com/post".to_string()),
        ..Default::default()
    };

    provider.publish_post("Article", &[], &params).await?;

    let article = harness.post_body()["content"]["article"].clone();
    assert!(article.get("thumbnail").is_none());
    assert_eq!(harness.transport.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failing_refresh_prevents_every_request() -> Result<()> {
    let transport = MockTransport::new()
        .on(
            HttpMethod::Post,
            "oauth/v2/accessToken",
            json_response(401, json!({"error": "invalid_grant"})),
        )
        .on(HttpMethod::Post, "images?action=initializeUpload", image_initialize(1))
        .on(HttpMethod::Post, "/rest/posts", posted());
    let harness = Harness::new(transport)?;
    let photo = harness.add_media("photo.jpg", b"jpeg", None)?;
    let token = Token::new("expired")
        .with_refresh_token("refresh")
        .expiring_at(Utc::now() + Duration::minutes(1));
    let mut provider = harness.provider(token);

    let response = provider
        .publish_post("Never sent", &[photo], &PublishParams::default())
        .await?;

    assert!(response.has_error());
    assert_eq!(response.error_kind(), Some(ErrorKind::TokenRefresh));
    assert!(response.is_unauthorized());
    assert_eq!(harness.transport.call_count(), 1);
    assert_eq!(harness.transport.count(HttpMethod::Post, "initializeUpload"), 0);
    assert_eq!(harness.transport.count(HttpMethod::Post, "/rest/posts"), 0);
    assert_eq!(harness.tokens.updates(), 0);
    assert_eq!(provider.state(), AdapterState::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn test_refreshed_token_is_persisted_before_posting() -> Result<()> {
    let transport = MockTransport::new()
        .on(
            HttpMethod::Post,
            "oauth/v2/accessToken",
            json_response(
                200,
                json!({"access_token": "fresh", "expires_in": 5184000, "refresh_token": "rotated"}),
            ),
        )
        .on(HttpMethod::Post, "/rest/posts", posted());
    let harness = Harness::new(transport)?;
    let token = Token::new("stale")
        .with_refresh_token("refresh")
        .expiring_at(Utc::now() + Duration::minutes(2));
    let mut provider = harness.provider(token);

    let response = provider
        .publish_post("After refresh", &[], &PublishParams::default())
        .await?;

    assert!(!response.has_error());
    assert_eq!(harness.tokens.updates(), 1);

    let requests = harness.transport.requests();
    assert!(requests[0].url.ends_with("/oauth/v2/accessToken"));
    assert!(requests[1].url.ends_with("/rest/posts"));
    Ok(())
}

#[tokio::test]
async fn test_adapter_reusable_after_error() -> Result<()> {
    let transport = MockTransport::new()
        .on(HttpMethod::Post, "/rest/posts", json_response(500, json!({})))
        .on(HttpMethod::Post, "/rest/posts", posted());
    let harness = Harness::new(transport)?;
    let mut provider = harness.provider(Token::new("access"));

    let first = provider.publish_post("one", &[], &PublishParams::default()).await?;
    assert!(first.has_error());
    assert_eq!(provider.state(), AdapterState::Error);

    let second = provider.publish_post("two", &[], &PublishParams::default()).await?;
    assert!(!second.has_error());
    assert_eq!(provider.state(), AdapterState::Authenticated);
    Ok(())
}
