//! Small helpers over [`http::HeaderMap`] for the string-heavy header work
//! the filter chain does. Values that fail header validation are dropped
//! with a debug log rather than aborting the response.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Set `name` to `value`, replacing any previous value.
pub fn set(map: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            map.insert(name, v);
        }
        Err(_) => debug!(header = %name, value, "dropping invalid header value"),
    }
}

/// Append `value` under `name`, keeping existing values.
pub fn append(map: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            map.append(name, v);
        }
        Err(_) => debug!(header = %name, value, "dropping invalid header value"),
    }
}

/// First value under `name` as a string, if present and valid UTF-8.
pub fn get<'a>(map: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    map.get(name).and_then(|v| v.to_str().ok())
}

/// Like [`get`] but returns the empty string when absent.
pub fn get_or_empty<'a>(map: &'a HeaderMap, name: &HeaderName) -> &'a str {
    get(map, name).unwrap_or("")
}

/// All values under `name` joined with ", ", the way proxies fold headers.
pub fn get_all_joined(map: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<&str> = map
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// Copy every header in `src` into `dst`, replacing values for names that
/// exist in both. Multi-valued names are copied whole.
pub fn copy_into(src: &HeaderMap, dst: &mut HeaderMap) {
    for name in src.keys() {
        dst.remove(name);
        for value in src.get_all(name) {
            dst.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ETAG, VARY};

    #[test]
    fn set_replaces_append_accumulates() {
        let mut map = HeaderMap::new();
        set(&mut map, VARY, "Accept-Encoding");
        append(&mut map, VARY, "If-None-Match");
        assert_eq!(
            get_all_joined(&map, &VARY).unwrap(),
            "Accept-Encoding, If-None-Match"
        );
        set(&mut map, VARY, "Origin");
        assert_eq!(get_all_joined(&map, &VARY).unwrap(), "Origin");
    }

    #[test]
    fn invalid_values_are_dropped() {
        let mut map = HeaderMap::new();
        set(&mut map, ETAG, "bad\nvalue");
        assert!(map.get(ETAG).is_none());
    }

    #[test]
    fn copy_into_replaces_multi_valued_names() {
        let mut src = HeaderMap::new();
        append(&mut src, VARY, "Accept-Encoding");
        append(&mut src, VARY, "Origin");
        let mut dst = HeaderMap::new();
        append(&mut dst, VARY, "If-None-Match");
        copy_into(&src, &mut dst);
        assert_eq!(
            get_all_joined(&dst, &VARY).unwrap(),
            "Accept-Encoding, Origin"
        );
    }
}
