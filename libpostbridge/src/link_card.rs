//! Preview metadata for shared links
//!
//! Article posts carry the title, description and image of the linked page.
//! The fetcher never fails: a page that cannot be fetched or parsed yields an
//! empty card and the post goes out without a preview.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::http::{HttpRequest, HttpTransport};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCard {
    pub title: String,
    pub description: String,
    /// Absolute image URL, empty when the page has none
    pub image: String,
}

#[async_trait]
pub trait LinkCardFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LinkCard;
}

/// Reads OpenGraph/Twitter card tags from the page HTML
pub struct HttpLinkCardFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl HttpLinkCardFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl LinkCardFetcher for HttpLinkCardFetcher {
    async fn fetch(&self, url: &str) -> LinkCard {
        let response = match self
            .transport
            .send(HttpRequest::get(url).header("Accept", "text/html"))
            .await
        {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(url = %url, status = response.status, "Link card page returned an error");
                return LinkCard::default();
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not fetch link card page");
                return LinkCard::default();
            }
        };

        parse_link_card(&response.text(), url)
    }
}

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("Invalid meta tag regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid attribute regex")
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("Invalid title regex"));

/// Extract a card from page HTML; relative image URLs resolve against `page_url`
pub fn parse_link_card(html: &str, page_url: &str) -> LinkCard {
    let mut meta: HashMap<String, String> = HashMap::new();

    for tag in META_TAG.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let name = attr[1].to_lowercase();
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match name.as_str() {
                "property" | "name" => key = value.map(str::to_lowercase),
                "content" => content = value,
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            meta.entry(key).or_insert_with(|| decode_entities(content.trim()));
        }
    }

    let first = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| meta.get(*k).filter(|v| !v.is_empty()).cloned())
    };

    let title = first(&["og:title", "twitter:title"])
        .or_else(|| {
            TITLE
                .captures(html)
                .map(|c| decode_entities(c[1].trim()))
        })
        .unwrap_or_default();

    let description = first(&["og:description", "twitter:description", "description"]).unwrap_or_default();

    let image = first(&["og:image", "og:image:url", "twitter:image", "twitter:image:src"])
        .map(|image| absolutize(&image, page_url))
        .unwrap_or_default();

    LinkCard {
        title,
        description,
        image,
    }
}

fn absolutize(image: &str, page_url: &str) -> String {
    match url::Url::parse(page_url).and_then(|base| base.join(image)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => image.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
