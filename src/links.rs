//! Hypermedia relation links, serialized to HTTP `Link` headers.
//!
//! See RFC 5988 (web linking), RFC 6573 (item and collection relations) and
//! RFC 5829 (versioning). The `title*` field must be encoded per RFC 5987.

use std::fmt;

use serde::Serialize;

/// An HTTP header tag representing a hypertext relation link between
/// resources, independent of representation format.
///
/// The `ext` extension field, when used, must be a lowercase name with a
/// quoted-string value, e.g. `priority="important"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Link {
    #[serde(rename = "href")]
    pub uri: String,
    pub rel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub anchor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rev: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hreflang: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(rename = "title*", skip_serializing_if = "String::is_empty")]
    pub titlex: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(skip)]
    pub ext: String,
}

impl Link {
    pub fn new(uri: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            rel: rel.into(),
            ..Self::default()
        }
    }
}

/// Renders the link the way a `Link` header expects it. An empty relation
/// defaults to `alternate`, per RFC 4287 §4.2.7.
impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri)?;
        let rel = if self.rel.is_empty() {
            "alternate"
        } else {
            &self.rel
        };
        write!(f, "; rel={rel:?}")?;
        for (name, value) in [
            ("anchor", &self.anchor),
            ("rev", &self.rev),
            ("hreflang", &self.hreflang),
            ("media", &self.media),
            ("title", &self.title),
        ] {
            if !value.is_empty() {
                write!(f, "; {name}={value:?}")?;
            }
        }
        if !self.titlex.is_empty() {
            write!(f, "; title*={}", self.titlex)?;
        }
        if !self.media_type.is_empty() {
            write!(f, "; type={:?}", self.media_type)?;
        }
        if !self.ext.is_empty() {
            write!(f, "; {}", self.ext)?;
        }
        Ok(())
    }
}

/// A complete `Link` header value for when a [`Link`] object is overkill.
/// `params` are `name=value` pairs; when empty, `rel="alternate"` is used.
pub fn link_header_value(uri: &str, params: &[&str]) -> String {
    let mut value = format!("<{uri}>");
    if params.is_empty() {
        value.push_str("; rel=\"alternate\"");
    } else {
        for param in params {
            value.push_str("; ");
            value.push_str(param);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_fields_in_order() {
        let link = Link {
            uri: "/v1/schemas".to_string(),
            rel: "index".to_string(),
            ext: "priority=\"important\"".to_string(),
            title: "Definition of schemas".to_string(),
            titlex: "utf-8'es'\"Definici%C3%B3n de esquemas\"".to_string(),
            hreflang: "en-US".to_string(),
            media: "screen, print".to_string(),
            media_type: "text/html;charset=utf-8".to_string(),
            ..Link::default()
        };
        assert_eq!(
            link.to_string(),
            "</v1/schemas>; rel=\"index\"; hreflang=\"en-US\"; media=\"screen, print\"; \
             title=\"Definition of schemas\"; title*=utf-8'es'\"Definici%C3%B3n de esquemas\"; \
             type=\"text/html;charset=utf-8\"; priority=\"important\""
        );
    }

    #[test]
    fn empty_rel_defaults_to_alternate() {
        let link = Link::new("/v1/posts", "");
        assert_eq!(link.to_string(), "</v1/posts>; rel=\"alternate\"");
    }

    #[test]
    fn header_value_helper() {
        assert_eq!(
            link_header_value("/v1/", &["rel=\"self\""]),
            "</v1/>; rel=\"self\""
        );
        assert_eq!(
            link_header_value("/v1/", &[]),
            "</v1/>; rel=\"alternate\""
        );
    }

    #[test]
    fn serializes_for_hypermedia_bodies() {
        let link = Link::new("/v1/tickets/{uint:id}", "item");
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"href": "/v1/tickets/{uint:id}", "rel": "item"})
        );
    }
}
