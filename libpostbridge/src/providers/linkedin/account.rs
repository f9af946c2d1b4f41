//! Account profile normalization

use serde_json::Value;

use crate::context;
use crate::response::Context;

use super::{LinkedinAccountKind, PageType};

/// Projection requested from the legacy `/me` endpoint
pub const LEGACY_PROFILE_PROJECTION: &str =
    "(id,localizedFirstName,localizedLastName,vanityName,profilePicture(displayImage~:playableStreams))";

fn str_or_empty<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Context of an OpenID Connect `userinfo` answer
pub fn openid_profile(data: &Value) -> Context {
    context! {
        "id" => data.get("sub"),
        "name" => str_or_empty(data, "name"),
        "username" => "",
        "image" => str_or_empty(data, "picture"),
    }
}

/// Context of a legacy `/me` answer
pub fn legacy_profile(data: &Value) -> Context {
    let name = format!(
        "{} {}",
        str_or_empty(data, "localizedFirstName"),
        str_or_empty(data, "localizedLastName")
    );

    context! {
        "id" => data.get("id"),
        "name" => name.trim(),
        "username" => str_or_empty(data, "vanityName"),
        "image" => profile_picture(data),
    }
}

/// `profilePicture.displayImage~.elements.0.identifiers.0.identifier`
fn profile_picture(data: &Value) -> Option<&str> {
    data.get("profilePicture")?
        .get("displayImage~")?
        .get("elements")?
        .get(0)?
        .get("identifiers")?
        .get(0)?
        .get("identifier")?
        .as_str()
}

/// Context of an `/rest/organizations/{id}` answer
pub fn organization_profile(data: &Value, provider_id: &str) -> Context {
    let id = match data.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => provider_id.to_string(),
    };

    context! {
        "id" => id,
        "name" => str_or_empty(data, "localizedName"),
        "username" => str_or_empty(data, "vanityName"),
        "image" => "",
    }
}

/// Public profile URL of a connected account
pub fn external_account_url(kind: LinkedinAccountKind, username: &str, page_type: PageType) -> String {
    match kind {
        LinkedinAccountKind::Person => format!("https://www.linkedin.com/in/{}", username),
        LinkedinAccountKind::Page => {
            format!("https://www.linkedin.com/{}/{}", page_type.as_str(), username)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openid_profile() {
        let context = openid_profile(&json!({"sub": "abc", "name": "Ada Lovelace"}));
        assert_eq!(context["id"], "abc");
        assert_eq!(context["name"], "Ada Lovelace");
        assert_eq!(context["username"], "");
        assert_eq!(context["image"], "");
    }

    #[test]
    fn test_legacy_profile_with_picture() {
        let data = json!({
            "id": "xyz",
            "localizedFirstName": "Grace",
            "localizedLastName": "Hopper",
            "vanityName": "ghopper",
            "profilePicture": {
                "displayImage~": {
                    "elements": [
                        {"identifiers": [{"identifier": "https://media.licdn.com/p.jpg"}]}
                    ]
                }
            }
        });

        let context = legacy_profile(&data);
        assert_eq!(context["id"], "xyz");
        assert_eq!(context["name"], "Grace Hopper");
        assert_eq!(context["username"], "ghopper");
        assert_eq!(context["image"], "https://media.licdn.com/p.jpg");
    }

    #[test]
    fn test_legacy_profile_without_picture() {
        let data = json!({
            "id": "xyz",
            "localizedFirstName": "Grace",
            "localizedLastName": "Hopper",
            "profilePicture": {"displayImage~": {"elements": []}}
        });

        let context = legacy_profile(&data);
        assert_eq!(context["username"], "");
        assert_eq!(context["image"], Value::Null);
    }

    #[test]
    fn test_organization_profile_numeric_id() {
        let context = organization_profile(
            &json!({"id": 12345, "localizedName": "Acme", "vanityName": "acme"}),
            "12345",
        );
        assert_eq!(context["id"], "12345");
        assert_eq!(context["name"], "Acme");
        assert_eq!(context["username"], "acme");
    }

    #[test]
    fn test_external_account_url() {
        assert_eq!(
            external_account_url(LinkedinAccountKind::Person, "ada", PageType::Company),
            "https://www.linkedin.com/in/ada"
        );
        assert_eq!(
            external_account_url(LinkedinAccountKind::Page, "acme", PageType::default()),
            "https://www.linkedin.com/company/acme"
        );
        assert_eq!(
            external_account_url(LinkedinAccountKind::Page, "acme-labs", PageType::Showcase),
            "https://www.linkedin.com/showcase/acme-labs"
        );
    }
}
