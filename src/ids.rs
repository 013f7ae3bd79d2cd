use std::fmt::{Display, Formatter};

/// Strongly typed request identifier backed by UUID v4.
///
/// A client-supplied id is accepted only when it is 20 to 200 characters long
/// and URL-safe; anything else is replaced with a freshly generated id.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a header-supplied id; if invalid or absent, generate a new one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        match header_value {
            Some(id) if is_valid_id(id) => Self(id.to_string()),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_id(id: &str) -> bool {
    if id.len() < 20 || id.len() > 200 {
        return false;
    }
    id.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%' | '+')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert!(is_valid_id(a.as_str()));
    }

    #[test]
    fn accepts_a_well_formed_client_id() {
        let id = "abcdef0123456789-abcdef._~";
        let got = RequestId::from_header_or_new(Some(id));
        assert_eq!(got.as_str(), id);
    }

    #[test]
    fn rejects_short_ids() {
        let got = RequestId::from_header_or_new(Some("too-short"));
        assert_ne!(got.as_str(), "too-short");
    }

    #[test]
    fn rejects_ids_with_forbidden_characters() {
        let id = "abcdef0123456789<script>alert(1)</script>";
        let got = RequestId::from_header_or_new(Some(id));
        assert_ne!(got.as_str(), id);
    }

    #[test]
    fn rejects_overlong_ids() {
        let id = "a".repeat(201);
        let got = RequestId::from_header_or_new(Some(&id));
        assert_ne!(got.as_str(), id.as_str());
    }
}
