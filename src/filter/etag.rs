//! Entity-tag generation and conditional request evaluation, following the
//! recommendations in RFC 7232.

use std::sync::Arc;

use http::header::{
    CONTENT_ENCODING, ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE,
    LAST_MODIFIED, VARY,
};
use http::{Method, StatusCode};
use httpdate::parse_http_date;

use super::Filter;
use crate::context::{Context, Handler};
use crate::headers;
use crate::response::{ResponseBuffer, ResponseWriter};

/// Generates an `ETag` header for the body content of a response, buffering
/// the downstream chain to do so. Pre-generated etags from underlying filters
/// or handlers are adopted when present.
///
/// Unless disabled, the filter also evaluates the conditional request headers
/// `If-Match`, `If-Unmodified-Since`, `If-None-Match` and `If-Modified-Since`,
/// short-circuiting to 304 or 412 as appropriate.
#[derive(Default)]
pub struct ETag {
    /// Ignore the conditional headers and never short-circuit. An ETag is
    /// still generated when possible.
    pub disable_conditionals: bool,
}

/// Strong comparison for `If-Match`: exact match of one member, and weak tags
/// never compare equal.
fn etag_strong_cmp(etags: &str, etag: &str) -> bool {
    if etag.is_empty() || etag.starts_with("W/") {
        return false;
    }
    etags.split(',').any(|v| v.trim() == etag)
}

/// Weak comparison for `If-None-Match`: the unquoted tag appearing anywhere
/// in the header list.
fn etag_weak_cmp(etags: &str, etag: &str) -> bool {
    if etag.is_empty() {
        return false;
    }
    etags.contains(etag.trim_matches('"'))
}

fn is_etag_method(m: &Method) -> bool {
    *m == Method::GET || *m == Method::HEAD
}

fn eligible_method(m: &Method) -> bool {
    matches!(
        *m,
        Method::DELETE | Method::GET | Method::HEAD | Method::PATCH | Method::POST | Method::PUT
    )
}

/// Status codes we tag: 2xx responses except 204, plus 412.
fn eligible_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    !(code < 200
        || status == StatusCode::NO_CONTENT
        || (code > 299 && status != StatusCode::PRECONDITION_FAILED))
}

fn last_modified(rb: &ResponseBuffer) -> Option<std::time::SystemTime> {
    headers::get(rb.headers(), &LAST_MODIFIED).and_then(|v| parse_http_date(v).ok())
}

fn not_modified(rb: &mut ResponseBuffer, etag: &str) {
    if !etag.is_empty() {
        headers::set(rb.headers_mut(), ETAG, etag);
        headers::append(rb.headers_mut(), VARY, "If-None-Match");
    }
    rb.set_status(StatusCode::NOT_MODIFIED);
    rb.reset();
}

impl Filter for ETag {
    fn run(&self, next: Handler) -> Handler {
        let disable_conditionals = self.disable_conditionals;
        Arc::new(move |ctx: &mut Context<'_>| {
            ctx.capture();
            next(ctx);
            let mut rb = ctx.release();

            let status = rb.status();
            let method = ctx.request.method.clone();

            if !eligible_status(status) || !eligible_method(&method) {
                let _ = rb.flush(ctx);
                return;
            }

            let mut etag = headers::get(rb.headers(), &ETAG).unwrap_or("").to_string();

            if is_etag_method(&method) && status == StatusCode::OK && etag.is_empty() {
                // a content encoding set downstream distinguishes the variant
                let alter = match headers::get(rb.headers(), &CONTENT_ENCODING) {
                    Some(ce) if !ce.is_empty() => format!("-{ce}"),
                    _ => String::new(),
                };
                let mut sha = sha1_smol::Sha1::new();
                sha.update(rb.bytes());
                etag = format!("\"{}{}\"", sha.digest(), alter);
            }

            if !disable_conditionals {
                let ifmatch = ctx.request.header_or_empty(&IF_MATCH).to_string();
                if !ifmatch.is_empty()
                    && ((ifmatch == "*" && etag.is_empty()) || !etag_strong_cmp(&ifmatch, &etag))
                {
                    ctx.write_header(StatusCode::PRECONDITION_FAILED);
                    rb.free();
                    return;
                }

                let ifunmod = ctx.request.header_or_empty(&IF_UNMODIFIED_SINCE);
                if ifmatch.is_empty() && !ifunmod.is_empty() {
                    if let (Ok(modtime), Some(lastmod)) =
                        (parse_http_date(ifunmod), last_modified(&rb))
                    {
                        if lastmod > modtime {
                            ctx.write_header(StatusCode::PRECONDITION_FAILED);
                            rb.free();
                            return;
                        }
                    }
                }

                let ifnone = ctx.request.header_or_empty(&IF_NONE_MATCH).to_string();
                if !ifnone.is_empty()
                    && ((ifnone == "*" && !etag.is_empty()) || etag_weak_cmp(&ifnone, &etag))
                {
                    if is_etag_method(&method) {
                        not_modified(&mut rb, &etag);
                        let _ = rb.flush(ctx);
                        return;
                    }
                    ctx.write_header(StatusCode::PRECONDITION_FAILED);
                    rb.free();
                    return;
                }

                let ifmods = ctx.request.header_or_empty(&IF_MODIFIED_SINCE);
                if ifnone.is_empty() && !ifmods.is_empty() && !is_etag_method(&method) {
                    if let (Ok(modtime), Some(lastmod)) =
                        (parse_http_date(ifmods), last_modified(&rb))
                    {
                        if lastmod <= modtime {
                            not_modified(&mut rb, &etag);
                            headers::append(rb.headers_mut(), VARY, "If-Modified-Since");
                            let _ = rb.flush(ctx);
                            return;
                        }
                    }
                }
            }

            if !etag.is_empty() {
                headers::set(rb.headers_mut(), ETAG, &etag);
                headers::append(rb.headers_mut(), VARY, "If-None-Match");
            }
            let _ = rb.flush(ctx);
        })
    }
}
