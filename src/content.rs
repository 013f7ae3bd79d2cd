//! Content negotiation: selects the representations for request and response.
//!
//! The default representation is `application/json`. A client can request
//! another registered media type with the vendor extension form of the
//! `Accept` header:
//!
//! ```text
//! Accept: application/vnd.restive+{subtype}; version=XX; lang=YY
//! ```
//!
//! `subtype`, `version` and `lang` are all optional. When `Accept` indicates
//! all media types (`*/*`), the subtype can instead be requested through the
//! URL path's extension (`GET /api/v1/tickets.xml`); the extension is removed
//! before routing. `Accept-Version` and `Accept-Language` headers are honored
//! when the vendor parameters don't decide, parsed as preference lists.
//!
//! Negotiation publishes into context extras:
//!
//! ```text
//! content.encoding   media type used for encoding
//! content.decoding   media type of the payload, for POST/PUT/PATCH
//! content.version    requested version, or "current"
//! content.language   requested language, or "en-US"
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use crate::context::{Context, Handler};
use crate::encoding::Encoder;
use crate::headers;
use crate::response::ResponseWriter;
use crate::util::path_ext;

/// The vendor extended media type used by this framework.
pub const CONTENT_MEDIA_TYPE: &str = "application/vnd.restive";

/// Version value used when no content version is requested.
pub const CONTENT_DEFAULT_VERSION: &str = "current";

/// Language value used when no content language is requested.
pub const CONTENT_DEFAULT_LANGUAGE: &str = "en-US";

// quality given to the current choice when a preference list omits it,
// competitive enough that only real preferences override
const COMPETITIVE_QUALITY: f32 = 0.85;

/// Parser for comma-separated header value preferences.
///
/// Returns a map of preference to quality. A preference without a `;q=`
/// weight gets quality 1.0; qualities are not normalized. A quality that
/// fails to parse as a float is an error.
pub fn parse_preferences(values: &str) -> Result<HashMap<String, f32>, std::num::ParseFloatError> {
    let mut prefs = HashMap::new();
    for raw in values.split(',') {
        let mut parts = raw.trim().splitn(2, ";q=");
        let name = parts.next().unwrap_or("").to_string();
        let quality = match parts.next() {
            Some(q) => q.parse::<f32>()?,
            None => 1.0,
        };
        prefs.insert(name, quality);
    }
    Ok(prefs)
}

/// Minimal media type parser: lowercased `type/subtype` plus `;k=v`
/// parameters, values optionally quoted. Errors on an empty type or a
/// parameter without a value.
pub fn parse_media_type(s: &str) -> Result<(String, HashMap<String, String>), String> {
    let mut parts = s.split(';');
    let mtype = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if mtype.is_empty() || !mtype.contains('/') {
        return Err(format!("malformed media type {s:?}"));
    }
    let mut params = HashMap::new();
    for param in parts {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let Some((key, value)) = param.split_once('=') else {
            return Err(format!("malformed media parameter {param:?}"));
        };
        let value = value.trim().trim_matches('"');
        params.insert(key.trim().to_ascii_lowercase(), value.to_string());
    }
    Ok((mtype, params))
}

/// Pick the highest-quality member of a preference list, giving the current
/// choice a competitive quality when the list omits it. Iteration is sorted
/// so ties resolve deterministically in favor of the current choice.
fn preferred(prefs: &HashMap<String, f32>, current: &str) -> String {
    let mut chosen = current.to_string();
    let mut best = prefs.get(current).copied().unwrap_or(COMPETITIVE_QUALITY);
    let mut names: Vec<&String> = prefs.keys().collect();
    names.sort();
    for name in names {
        if prefs[name] > best {
            best = prefs[name];
            chosen = name.clone();
        }
    }
    chosen
}

/// The negotiation stage. Runs as the outermost stage of the composed chain,
/// before any service filter.
pub(crate) struct Negotiator {
    /// Registered encoders by media type, e.g. `application/json`.
    pub encoders: HashMap<String, Arc<dyn Encoder>>,
    /// Extension-to-MIME table for vendor subtypes, e.g. `json`.
    pub media_types: HashMap<String, String>,
}

impl Negotiator {
    /// Wrap `next` with content negotiation.
    pub fn wrap(self: Arc<Self>, next: Handler) -> Handler {
        Arc::new(move |ctx: &mut Context<'_>| {
            // our default representation
            let mut encoder = self
                .encoders
                .get("application/json")
                .expect("service registers the JSON encoder")
                .clone();
            ctx.set_encoder(encoder.clone());
            ctx.set_decoder(encoder.clone());

            let mut version = CONTENT_DEFAULT_VERSION.to_string();
            let mut language = CONTENT_DEFAULT_LANGUAGE.to_string();

            let mut accept = ctx.request.header_or_empty(&ACCEPT).to_string();

            if accept == "*/*" {
                // check if a subtype was requested via the URL path extension
                if let Some(ext) = path_ext(&ctx.request.path).map(|e| e.to_string()) {
                    let stripped = ctx
                        .request
                        .path
                        .strip_suffix(ext.as_str())
                        .map(|p| p.to_string());
                    if let Some(path) = stripped {
                        ctx.request.path = path;
                    }
                    accept = format!("{}+{}", CONTENT_MEDIA_TYPE, &ext[1..]);
                }
            }

            // requests for a specific subtype use our vendor media type;
            // everything else defaults to application/json
            if accept.starts_with(CONTENT_MEDIA_TYPE) {
                let (ct, params) = match parse_media_type(&accept) {
                    Ok(parsed) => parsed,
                    Err(msg) => {
                        headers::set(ctx.headers_mut(), CONTENT_TYPE, encoder.content_type());
                        ctx.error(StatusCode::BAD_REQUEST, &msg);
                        return;
                    }
                };
                let prefix_len = CONTENT_MEDIA_TYPE.len();
                if ct.len() > prefix_len && ct.as_bytes()[prefix_len] == b'+' {
                    let subtype = &ct[prefix_len + 1..];
                    let found = self
                        .media_types
                        .get(subtype)
                        .and_then(|mime| self.encoders.get(mime));
                    match found {
                        Some(e) => {
                            encoder = e.clone();
                            ctx.set_encoder(encoder.clone());
                        }
                        None => {
                            let alternatives: Vec<&str> =
                                self.encoders.values().map(|e| e.accept()).collect();
                            headers::set(ctx.headers_mut(), CONTENT_TYPE, encoder.content_type());
                            ctx.error_with(
                                StatusCode::NOT_ACCEPTABLE,
                                "That media type is not supported for response.",
                                json!({ "alternatives": alternatives }),
                            );
                            return;
                        }
                    }
                }
                if let Some(v) = params.get("version") {
                    version = v.clone();
                }
                if let Some(l) = params.get("lang") {
                    language = l.clone();
                }
            }

            // version preferences, e.g. Accept-Version: v2, v1;q=0.5
            if let Some(vrange) = ctx.request.header(&http::header::HeaderName::from_static("accept-version")) {
                match parse_preferences(vrange) {
                    Ok(prefs) => version = preferred(&prefs, &version),
                    Err(e) => debug!(error = %e, "version preference parsing failed"),
                }
            }

            // language preferences, e.g. Accept-Language: da, jp;q=0.8, en;q=0.9
            if let Some(langrange) = ctx.request.header(&http::header::ACCEPT_LANGUAGE) {
                // if parsing fails, continue with the request; see RFC 7231 §5.3.5
                match parse_preferences(langrange) {
                    Ok(prefs) => language = preferred(&prefs, &language),
                    Err(e) => debug!(error = %e, "language preference parsing failed"),
                }
            }

            // at this point we know the response media type
            headers::set(ctx.headers_mut(), CONTENT_TYPE, encoder.content_type());
            ctx.set("content.encoding", encoder.accept());
            ctx.set("content.version", version);
            ctx.set("content.language", language);

            // payload representation for the unsafe methods POST, PUT, PATCH
            if ctx.request.method.as_str().starts_with('P') {
                let header = ctx.request.header_or_empty(&CONTENT_TYPE).to_string();
                let (ct, _) = match parse_media_type(&header) {
                    Ok(parsed) => parsed,
                    Err(msg) => {
                        ctx.error(StatusCode::BAD_REQUEST, &msg);
                        return;
                    }
                };
                let Some(decoder) = self.encoders.get(&ct) else {
                    ctx.error(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "That media type is not supported for transfer.",
                    );
                    return;
                };
                ctx.set_decoder(decoder.clone());
                ctx.set("content.decoding", ct);
            }

            next(ctx);
        })
    }
}
