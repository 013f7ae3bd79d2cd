//! Security headers and checks, after OWASP's list of useful HTTP headers.

use std::sync::Arc;

use http::header::{HeaderName, CACHE_CONTROL, PRAGMA, STRICT_TRANSPORT_SECURITY};
use http::StatusCode;

use super::Filter;
use crate::context::{Context, Handler};
use crate::headers;
use crate::response::ResponseWriter;
use crate::util;

/// Emits security-related response headers and optionally rejects requests
/// without a User-Agent.
pub struct Security {
    /// Skip the check for a non-empty User-Agent header.
    pub ua_check_disable: bool,

    /// Response body sent when a client fails the User-Agent check.
    pub ua_check_err_msg: String,

    /// Skip the `X-Frame-Options` header, which provides clickjacking
    /// protection (RFC 7034).
    pub xframe_disable: bool,

    /// `X-Frame-Options` value: `DENY`, `SAMEORIGIN` or `ALLOW-FROM {origin}`.
    pub xframe_options: String,

    /// Skip `X-Content-Type-Options: nosniff`, which stops browsers from
    /// MIME-sniffing away the declared Content-Type.
    pub xcto_disable: bool,

    /// Skip `Strict-Transport-Security` (RFC 6797). Only ever sent on secure
    /// connections.
    pub hsts_disable: bool,

    /// `Strict-Transport-Security` value.
    pub hsts_options: String,

    /// Skip the `Cache-Control` header; also disables `Pragma` below.
    pub cache_disable: bool,

    /// `Cache-Control` value (RFC 7234 §5.2).
    pub cache_options: String,

    /// Skip the `Pragma: no-cache` header (RFC 7234 §5.4).
    pub pragma_disable: bool,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            ua_check_disable: false,
            ua_check_err_msg: "Request forbidden by security rules.\n\
                               Please make sure your request has an User-Agent header."
                .to_string(),
            xframe_disable: false,
            xframe_options: "SAMEORIGIN".to_string(),
            xcto_disable: false,
            hsts_disable: false,
            hsts_options: "max-age=31536000; includeSubDomains".to_string(),
            cache_disable: false,
            cache_options: "no-store, must-revalidate".to_string(),
            pragma_disable: false,
        }
    }
}

impl Filter for Security {
    fn run(&self, next: Handler) -> Handler {
        let ua_check = !self.ua_check_disable;
        let ua_msg = self.ua_check_err_msg.clone();
        let xframe = (!self.xframe_disable).then(|| self.xframe_options.clone());
        let xcto = !self.xcto_disable;
        let hsts = (!self.hsts_disable).then(|| self.hsts_options.clone());
        let cache = (!self.cache_disable).then(|| self.cache_options.clone());
        let pragma = !self.pragma_disable;

        Arc::new(move |ctx: &mut Context<'_>| {
            if ua_check && ctx.request.user_agent().is_empty() {
                ctx.error(StatusCode::FORBIDDEN, &ua_msg);
                return;
            }

            if xcto {
                headers::set(
                    ctx.headers_mut(),
                    HeaderName::from_static("x-content-type-options"),
                    "nosniff",
                );
            }

            if let Some(options) = &xframe {
                headers::set(
                    ctx.headers_mut(),
                    HeaderName::from_static("x-frame-options"),
                    options,
                );
            }

            // HSTS is only meaningful over a secure connection
            if let Some(options) = &hsts {
                if util::is_request_tls(&ctx.request) {
                    headers::set(ctx.headers_mut(), STRICT_TRANSPORT_SECURITY, options);
                }
            }

            if let Some(options) = &cache {
                headers::set(ctx.headers_mut(), CACHE_CONTROL, options);
                if pragma {
                    headers::set(ctx.headers_mut(), PRAGMA, "no-cache");
                }
            }

            next(ctx);
        })
    }
}
