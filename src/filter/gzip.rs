//! Conditional gzip body compression.

use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_RANGE, ETAG, IF_RANGE, VARY};
use http::StatusCode;

use super::Filter;
use crate::content::parse_preferences;
use crate::context::{Context, Handler};
use crate::headers;
use crate::response::ResponseWriter;

/// Compresses the response with gzip encoding when the client indicates
/// support for it, buffering the downstream chain to decide on the final
/// body.
///
/// When compression happens, `content.gzip = true` is published in the
/// context extras and an existing `ETag` is rewritten with a `-gzip` suffix
/// so the encoded variant carries a distinct entity tag.
pub struct Gzip {
    /// Compression level, 1 (best speed) to 9 (best compression); 0 disables
    /// compression entirely. Values above 9 are clamped.
    pub level: u32,

    /// Minimum buffered body length, in bytes, required to compress.
    pub min_length: usize,
}

impl Default for Gzip {
    fn default() -> Self {
        Self {
            level: Compression::fast().level(),
            min_length: 100,
        }
    }
}

/// Whether the client's Accept-Encoding prefers some other encoding strictly
/// above gzip, treating `x-gzip` as a synonym.
fn another_encoding_preferred(encodings: &str) -> bool {
    let Ok(mut prefs) = parse_preferences(encodings) else {
        return false;
    };
    if prefs.len() < 2 {
        return false;
    }
    if let Some(&q) = prefs.get("x-gzip") {
        prefs.insert("gzip".to_string(), q);
    }
    let gzip_q = prefs.get("gzip").copied().unwrap_or(0.0);
    prefs.values().any(|&q| q > gzip_q)
}

impl Filter for Gzip {
    fn run(&self, next: Handler) -> Handler {
        let level = self.level.min(Compression::best().level());
        let min_length = self.min_length;
        Arc::new(move |ctx: &mut Context<'_>| {
            headers::append(ctx.headers_mut(), VARY, "Accept-Encoding");

            let encodings = ctx.request.header_or_empty(&ACCEPT_ENCODING).to_string();
            if level == 0 || !(encodings.contains("gzip") || encodings == "*") {
                next(ctx);
                return;
            }

            // don't compress ranged responses
            if ctx.request.header(&IF_RANGE).is_some() {
                next(ctx);
                return;
            }

            // the client may prefer another encoding better; another filter
            // down the line can handle that one instead
            if another_encoding_preferred(&encodings) {
                next(ctx);
                return;
            }

            ctx.capture();
            next(ctx);
            let mut rb = ctx.release();

            let status = rb.status();
            let code = status.as_u16();
            if status == StatusCode::NOT_MODIFIED {
                // a conditional filter running inside us short-circuited:
                // announce 304 and drop the body
                rb.reset();
                let _ = rb.flush(ctx);
                return;
            }
            if status == StatusCode::NO_CONTENT
                || !(200..300).contains(&code)
                || rb.headers().contains_key(&CONTENT_RANGE)
                || headers::get_or_empty(rb.headers(), &CONTENT_ENCODING).contains("gzip")
                || rb.len() < min_length
            {
                let _ = rb.flush(ctx);
                return;
            }

            ctx.set("content.gzip", true);
            headers::append(rb.headers_mut(), CONTENT_ENCODING, "gzip");

            // alter an existing etag to reflect the gzip'ed content
            if let Some(etag) = headers::get(rb.headers(), &ETAG) {
                if !etag.contains("gzip") {
                    let rewritten = format!("{}-gzip\"", etag.trim_end_matches('"'));
                    headers::set(rb.headers_mut(), ETAG, &rewritten);
                }
            }

            rb.flush_header(ctx);
            let mut gz = GzEncoder::new(ctx.body_writer(), Compression::new(level));
            let _ = rb.write_to(&mut gz);
            let _ = gz.finish();
            rb.free();
        })
    }
}
