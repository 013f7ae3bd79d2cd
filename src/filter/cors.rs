//! Cross-Origin Resource Sharing (CORS), as described by the W3C
//! recommendation: origin matching, simple requests and preflight handling.

use std::sync::{Arc, OnceLock};

use http::header::{HeaderMap, HeaderName, ALLOW, CONTENT_LENGTH, ORIGIN, VARY};
use http::{Method, StatusCode};
use regex::Regex;

use super::Filter;
use crate::context::{Context, Handler};
use crate::error::StatusError;
use crate::headers;
use crate::response::ResponseWriter;

const DEFAULT_MAX_AGE: i32 = 86400; // 24 hours

// per the CORS recommendation's terminology
const SIMPLE_METHODS: &[&str] = &["GET", "HEAD", "POST"];
const SIMPLE_HEADERS: &[&str] = &[
    "Cache-Control",
    "Content-Language",
    "Content-Type",
    "Expires",
    "Last-Modified",
    "Pragma",
];

// methods generally used in REST, leaving simple methods to be complete
const ALLOW_METHODS_DEFAULT: &[&str] = &["GET", "POST", "PATCH", "PUT", "DELETE"];

// reasonably useful headers in REST
const ALLOW_HEADERS_DEFAULT: &[&str] = &[
    "Authorization",
    "Content-Type",
    "If-Match",
    "If-Modified-Since",
    "If-None-Match",
    "If-Unmodified-Since",
    "X-Requested-With",
];

// headers used regularly by both client and server
const EXPOSE_HEADERS_DEFAULT: &[&str] = &[
    "Etag",
    "Link",
    "RateLimit-Limit",
    "RateLimit-Remaining",
    "RateLimit-Reset",
    "X-Poll-Interval",
];

fn access_control(name: &'static str) -> HeaderName {
    HeaderName::from_static(name)
}

/// CORS filter configuration.
///
/// Origin patterns are shell-glob-like, compiled to regexps with quoted
/// literals:
///
/// ```text
/// *   matches zero or more characters
/// ?   matches exactly one character
/// +   matches at least one character
/// _   matches zero or one character
/// ```
///
/// For example `http://*example.com` matches `example.com` and all its
/// subdomains; `http_://+.example.com` matches SSL and non-SSL subdomains of
/// `example.com`, but not `example.com` itself.
#[derive(Default)]
pub struct Cors {
    /// URI patterns allowed to use the resource. When empty and
    /// `allow_any_origin` is false, all CORS requests fail.
    pub allow_origin: Vec<String>,

    /// Allow all origins; effectively `Access-Control-Allow-Origin: *`.
    pub allow_any_origin: bool,

    /// Methods usable in a request. Empty means the REST defaults (GET,
    /// POST, PATCH, PUT, DELETE).
    pub allow_methods: Vec<String>,

    /// Headers usable in a request. Empty means the REST defaults.
    pub allow_headers: Vec<String>,

    /// Whether user credentials may propagate through a request.
    pub allow_credentials: bool,

    /// Headers exposed to the API client, beyond the simple response
    /// headers. Empty means the defaults.
    pub expose_headers: Vec<String>,

    /// Seconds a preflight result may be cached; 0 means the 24-hour
    /// default, negative disables caching.
    pub max_age: i32,

    /// Adhere strictly to the recommendation: reject disallowed or malformed
    /// origins instead of passing through.
    pub strict: bool,

    runtime: OnceLock<Arc<CorsRuntime>>,
}

/// Configuration resolved once, at first composition.
struct CorsRuntime {
    allow_any_origin: bool,
    allow_credentials: bool,
    strict: bool,
    no_allowed_origins: bool,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
    expose_headers: Vec<String>,
    origin_exps: Vec<Regex>,
    max_age: i32,
}

impl CorsRuntime {
    fn origin_allowed(&self, origin: &str) -> bool {
        self.origin_exps.iter().any(|re| re.is_match(origin))
    }

    /// The origin-related response headers, depending on credentials and
    /// strictness.
    fn cors_headers(&self, origin: &str) -> HeaderMap {
        let mut hm = HeaderMap::new();
        if self.allow_credentials {
            headers::set(&mut hm, access_control("access-control-allow-origin"), origin);
            headers::set(
                &mut hm,
                access_control("access-control-allow-credentials"),
                "true",
            );
            headers::append(&mut hm, VARY, "Origin");
        } else if self.strict {
            if self.no_allowed_origins {
                headers::set(&mut hm, access_control("access-control-allow-origin"), "null");
            } else {
                headers::set(&mut hm, access_control("access-control-allow-origin"), origin);
                headers::append(&mut hm, VARY, "Origin");
            }
        } else {
            headers::set(&mut hm, access_control("access-control-allow-origin"), "*");
        }
        hm
    }

    fn handle_preflight(
        &self,
        origin: &str,
        rmethod: &str,
        rheaders: &str,
    ) -> Result<HeaderMap, StatusError> {
        let rmethod = rmethod.to_uppercase();
        if !SIMPLE_METHODS.contains(&rmethod.as_str())
            && !self.allow_methods.iter().any(|m| *m == rmethod)
        {
            return Err(StatusError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "Invalid method in preflight",
            ));
        }
        if !rheaders.is_empty() {
            for rh in rheaders.split(',').map(str::trim) {
                if !self.allow_headers.iter().any(|h| h.eq_ignore_ascii_case(rh)) {
                    return Err(StatusError::new(
                        StatusCode::FORBIDDEN,
                        "Invalid header in preflight",
                    ));
                }
            }
        }

        let mut hm = self.cors_headers(origin);
        if self.max_age > 0 {
            headers::set(
                &mut hm,
                access_control("access-control-max-age"),
                &self.max_age.to_string(),
            );
        }
        if !self.allow_methods.is_empty() {
            headers::set(
                &mut hm,
                access_control("access-control-allow-methods"),
                &self.allow_methods.join(", "),
            );
        }
        if !self.allow_headers.is_empty() {
            headers::set(
                &mut hm,
                access_control("access-control-allow-headers"),
                &self.allow_headers.join(", "),
            );
        }
        headers::set(&mut hm, CONTENT_LENGTH, "0");
        Ok(hm)
    }

    fn handle_simple(&self, origin: &str) -> HeaderMap {
        let mut hm = self.cors_headers(origin);
        if !self.expose_headers.is_empty() {
            headers::set(
                &mut hm,
                access_control("access-control-expose-headers"),
                &self.expose_headers.join(", "),
            );
        }
        hm
    }
}

/// Compile a shell-glob origin pattern into an anchored, case-insensitive
/// regexp.
fn origin_exp(pattern: &str) -> Regex {
    let mut exp = regex::escape(&pattern.to_lowercase());
    exp = exp.replace(r"\+", ".+");
    exp = exp.replace(r"\*", ".*");
    exp = exp.replace(r"\?", ".");
    exp = exp.replace('_', ".?");
    Regex::new(&format!("(?i)^{exp}$"))
        .unwrap_or_else(|e| panic!("invalid origin pattern {pattern:?}: {e}"))
}

fn defaults(list: &[String], fallback: &[&str]) -> Vec<String> {
    if list.is_empty() {
        fallback.iter().map(|s| s.to_string()).collect()
    } else {
        list.to_vec()
    }
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a list of allowed origin patterns.
    pub fn allow_origins(origins: &[&str]) -> Self {
        Self {
            allow_origin: origins.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Allow all origins, as `Access-Control-Allow-Origin: *`.
    pub fn any_origin(mut self) -> Self {
        self.allow_any_origin = true;
        self
    }

    /// Adhere strictly to the recommendation; see [`Cors::strict`].
    pub fn strict_mode(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Let user credentials propagate through requests.
    pub fn with_credentials(mut self) -> Self {
        self.allow_credentials = true;
        self
    }

    fn runtime(&self) -> Arc<CorsRuntime> {
        self.runtime
            .get_or_init(|| {
                let allow_methods: Vec<String> = defaults(&self.allow_methods, ALLOW_METHODS_DEFAULT)
                    .iter()
                    .map(|m| m.to_uppercase())
                    .collect();
                let allow_headers = defaults(&self.allow_headers, ALLOW_HEADERS_DEFAULT);
                // the simple response headers are always exposed, drop them
                let expose_headers: Vec<String> =
                    defaults(&self.expose_headers, EXPOSE_HEADERS_DEFAULT)
                        .into_iter()
                        .filter(|h| !SIMPLE_HEADERS.iter().any(|s| s.eq_ignore_ascii_case(h)))
                        .collect();
                Arc::new(CorsRuntime {
                    allow_any_origin: self.allow_any_origin,
                    allow_credentials: self.allow_credentials,
                    strict: self.strict,
                    no_allowed_origins: self.allow_origin.is_empty(),
                    allow_methods,
                    allow_headers,
                    expose_headers,
                    origin_exps: self.allow_origin.iter().map(|p| origin_exp(p)).collect(),
                    max_age: if self.max_age == 0 {
                        DEFAULT_MAX_AGE
                    } else {
                        self.max_age
                    },
                })
            })
            .clone()
    }
}

impl Filter for Cors {
    /// Runs the filter and passes down the following extras:
    ///
    /// ```text
    /// cors.request   whether this was a CORS request
    /// cors.origin    origin of the request, when it is one
    /// ```
    fn run(&self, next: Handler) -> Handler {
        let rt = self.runtime();
        Arc::new(move |ctx: &mut Context<'_>| {
            let origin = ctx.request.header_or_empty(&ORIGIN).to_string();

            ctx.set("cors.request", false);

            // not a CORS request, carry on
            if origin.is_empty() {
                next(ctx);
                return;
            }

            if !rt.allow_any_origin && !rt.origin_allowed(&origin) {
                if rt.strict {
                    ctx.error(StatusCode::FORBIDDEN, "Invalid CORS origin");
                    return;
                }
                next(ctx);
                return;
            }

            // check that Origin is sane and does not match Host
            if rt.strict {
                let parsed = match url::Url::parse(&origin) {
                    Ok(u) => u,
                    Err(e) => {
                        ctx.error(StatusCode::BAD_REQUEST, &e.to_string());
                        return;
                    }
                };
                let mut authority = parsed.host_str().unwrap_or("").to_string();
                if let Some(port) = parsed.port() {
                    authority = format!("{authority}:{port}");
                }
                if ctx.request.host == authority
                    || !matches!(parsed.path(), "" | "/")
                    || !parsed.scheme().starts_with("http")
                {
                    ctx.error(StatusCode::BAD_REQUEST, "Invalid CORS origin syntax");
                    return;
                }
            }

            let rmethod = ctx
                .request
                .header_or_empty(&access_control("access-control-request-method"))
                .to_string();

            // preflight request
            if ctx.request.method == Method::OPTIONS && !rmethod.is_empty() {
                let rheaders = ctx
                    .request
                    .header_or_empty(&access_control("access-control-request-headers"))
                    .to_string();
                match rt.handle_preflight(&origin, &rmethod, &rheaders) {
                    Ok(hm) => {
                        headers::copy_into(&hm, ctx.headers_mut());
                        ctx.write_header(StatusCode::NO_CONTENT);
                    }
                    Err(err) => {
                        if err.status() == StatusCode::METHOD_NOT_ALLOWED {
                            headers::set(ctx.headers_mut(), ALLOW, &rt.allow_methods.join(", "));
                        }
                        ctx.error_status(&err);
                    }
                }
                return;
            }

            // simple request
            let hm = rt.handle_simple(&origin);
            headers::copy_into(&hm, ctx.headers_mut());

            // let downstream filters know this is a CORS request
            ctx.set("cors.request", true);
            ctx.set("cors.origin", origin);

            next(ctx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{request, MockWriter};

    fn strict_cors(origins: &[&str]) -> Cors {
        Cors {
            allow_origin: origins.iter().map(|s| s.to_string()).collect(),
            strict: true,
            ..Cors::default()
        }
    }

    fn passthrough() -> Handler {
        Arc::new(|ctx: &mut Context<'_>| {
            let _ = ctx.write(b"ok");
        })
    }

    fn run(filter: &Cors, req: crate::request::Request) -> MockWriter {
        let chain = filter.run(passthrough());
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        w
    }

    fn aco(name: &'static str) -> HeaderName {
        HeaderName::from_static(name)
    }

    #[test]
    fn non_cors_requests_pass_through() {
        let w = run(&strict_cors(&["http://allowed.example.com"]), {
            request(Method::GET, "/v1")
        });
        assert_eq!(w.body, b"ok");
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-origin")),
            None
        );
    }

    #[test]
    fn preflight_echoes_allowed_origin() {
        let filter = strict_cors(&["http://allowed.example.com"]);
        let mut req = request(Method::OPTIONS, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://allowed.example.com");
        headers::set(
            &mut req.headers,
            aco("access-control-request-method"),
            "PUT",
        );
        let w = run(&filter, req);

        assert_eq!(w.status, Some(StatusCode::NO_CONTENT));
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-origin")),
            Some("http://allowed.example.com")
        );
        assert_eq!(
            headers::get_all_joined(&w.headers, &VARY).as_deref(),
            Some("Origin")
        );
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-max-age")),
            Some("86400")
        );
        let methods = headers::get(&w.headers, &aco("access-control-allow-methods")).unwrap();
        assert!(methods.contains("PUT"));
        assert_eq!(headers::get(&w.headers, &CONTENT_LENGTH), Some("0"));
        assert!(w.body.is_empty());
    }

    #[test]
    fn preflight_from_unrelated_origin_is_forbidden() {
        let filter = strict_cors(&["http://allowed.example.com"]);
        let mut req = request(Method::OPTIONS, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://evil.example.net");
        headers::set(
            &mut req.headers,
            aco("access-control-request-method"),
            "PUT",
        );
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn non_strict_disallowed_origin_passes_through() {
        let filter = Cors {
            allow_origin: vec!["http://allowed.example.com".to_string()],
            ..Cors::default()
        };
        let mut req = request(Method::GET, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://other.example.net");
        let w = run(&filter, req);
        assert_eq!(w.body, b"ok");
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-origin")),
            None
        );
    }

    #[test]
    fn preflight_with_disallowed_method_is_405_with_allow() {
        let filter = strict_cors(&["http://allowed.example.com"]);
        let mut req = request(Method::OPTIONS, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://allowed.example.com");
        headers::set(
            &mut req.headers,
            aco("access-control-request-method"),
            "TRACE",
        );
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::METHOD_NOT_ALLOWED));
        assert!(headers::get(&w.headers, &ALLOW).unwrap().contains("PUT"));
    }

    #[test]
    fn preflight_with_disallowed_header_is_403() {
        let filter = strict_cors(&["http://allowed.example.com"]);
        let mut req = request(Method::OPTIONS, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://allowed.example.com");
        headers::set(
            &mut req.headers,
            aco("access-control-request-method"),
            "PUT",
        );
        headers::set(
            &mut req.headers,
            aco("access-control-request-headers"),
            "X-Custom-Secret",
        );
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn preflight_with_allowed_headers_succeeds() {
        let filter = strict_cors(&["http://allowed.example.com"]);
        let mut req = request(Method::OPTIONS, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://allowed.example.com");
        headers::set(
            &mut req.headers,
            aco("access-control-request-method"),
            "PATCH",
        );
        headers::set(
            &mut req.headers,
            aco("access-control-request-headers"),
            "authorization, content-type",
        );
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::NO_CONTENT));
    }

    #[test]
    fn simple_request_marks_extras_and_exposes_headers() {
        let filter = Cors {
            allow_any_origin: true,
            ..Cors::default()
        };
        let chain = filter.run(Arc::new(|ctx: &mut Context<'_>| {
            assert_eq!(ctx.get("cors.request"), Some(&serde_json::json!(true)));
            assert_eq!(ctx.get_str("cors.origin"), Some("http://app.example.com"));
            let _ = ctx.write(b"ok");
        }));
        let mut w = MockWriter::new();
        let mut req = request(Method::GET, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://app.example.com");
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();

        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-origin")),
            Some("*")
        );
        let exposed = headers::get(&w.headers, &aco("access-control-expose-headers")).unwrap();
        assert!(exposed.contains("Etag"));
        assert!(!exposed.contains("Content-Type"));
    }

    #[test]
    fn credentials_echo_origin_and_vary() {
        let filter = Cors {
            allow_any_origin: true,
            allow_credentials: true,
            ..Cors::default()
        };
        let mut req = request(Method::GET, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://app.example.com");
        let w = run(&filter, req);
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-origin")),
            Some("http://app.example.com")
        );
        assert_eq!(
            headers::get(&w.headers, &aco("access-control-allow-credentials")),
            Some("true")
        );
        assert!(headers::get_all_joined(&w.headers, &VARY)
            .unwrap()
            .contains("Origin"));
    }

    #[test]
    fn strict_rejects_origin_matching_host() {
        let mut filter = strict_cors(&["http://*"]);
        filter.allow_any_origin = false;
        let mut req = request(Method::GET, "/v1");
        req.host = "api.example.com".to_string();
        headers::set(&mut req.headers, ORIGIN, "http://api.example.com");
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn strict_rejects_non_http_schemes_and_paths() {
        let filter = strict_cors(&["*"]);
        let mut req = request(Method::GET, "/v1");
        headers::set(&mut req.headers, ORIGIN, "ftp://files.example.com");
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));

        let mut req = request(Method::GET, "/v1");
        headers::set(&mut req.headers, ORIGIN, "http://app.example.com/path");
        let w = run(&filter, req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn origin_glob_patterns() {
        assert!(origin_exp("http://*example.com").is_match("http://example.com"));
        assert!(origin_exp("http://*example.com").is_match("http://api.example.com"));
        assert!(!origin_exp("http://*example.com").is_match("http://example.org"));

        // '+' requires at least one character
        assert!(origin_exp("http://+.example.com").is_match("http://a.example.com"));
        assert!(!origin_exp("http://+.example.com").is_match("http://.example.com"));

        // '?' exactly one, '_' zero or one
        assert!(origin_exp("http://foo??.example.com").is_match("http://foo12.example.com"));
        assert!(!origin_exp("http://foo??.example.com").is_match("http://foo1.example.com"));
        assert!(origin_exp("http_://example.com").is_match("https://example.com"));
        assert!(origin_exp("http_://example.com").is_match("http://example.com"));
    }
}
