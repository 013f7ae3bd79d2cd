//! HTTP method override: lets clients limited to GET/POST send REST
//! requests by naming the intended method in a header or query variable.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::HeaderName;
use http::{Method, StatusCode};

use super::Filter;
use crate::context::{Context, Handler};
use crate::headers;

/// Changes the request method when the client specifies an override via
/// header or query variable, before routing happens.
pub struct MethodOverride {
    /// Header carrying the override.
    pub header: String,

    /// Query variable used when the header can't be set.
    pub query_var: String,

    /// Which methods may be overridden, as a mapping from override to the
    /// carrier method the client must actually use.
    pub methods: HashMap<String, String>,
}

impl Default for MethodOverride {
    fn default() -> Self {
        let mut methods = HashMap::new();
        methods.insert("DELETE".to_string(), "POST".to_string());
        methods.insert("OPTIONS".to_string(), "GET".to_string());
        methods.insert("PATCH".to_string(), "POST".to_string());
        methods.insert("PUT".to_string(), "POST".to_string());
        Self {
            header: "X-HTTP-Method-Override".to_string(),
            query_var: "_method".to_string(),
            methods,
        }
    }
}

impl Filter for MethodOverride {
    /// Runs the filter and passes down the following extras:
    ///
    /// ```text
    /// override.method   the method replaced, e.g. "DELETE"
    /// ```
    fn run(&self, next: Handler) -> Handler {
        let header = HeaderName::from_bytes(self.header.to_lowercase().as_bytes())
            .expect("method override header name is invalid");
        let query_var = self.query_var.clone();
        let methods = self.methods.clone();

        Arc::new(move |ctx: &mut Context<'_>| {
            if let Some(over) = ctx.request.query_var(&query_var) {
                if !over.is_empty() {
                    headers::set(&mut ctx.request.headers, header.clone(), &over);
                }
            }

            let over = ctx.request.header(&header).unwrap_or("").to_string();
            if !over.is_empty() && over != ctx.request.method.as_str() {
                let Some(required) = methods.get(&over) else {
                    ctx.error(
                        StatusCode::BAD_REQUEST,
                        &format!("{over} method is not overridable."),
                    );
                    return;
                };
                // the carrier must match the expected mapping, e.g. GET for OPTIONS
                if ctx.request.method.as_str() != required {
                    ctx.error(
                        StatusCode::PRECONDITION_FAILED,
                        &format!("Must use {required} to override {over}"),
                    );
                    return;
                }
                match Method::from_bytes(over.as_bytes()) {
                    Ok(method) => ctx.request.method = method,
                    Err(_) => {
                        ctx.error(
                            StatusCode::BAD_REQUEST,
                            &format!("{over} method is not overridable."),
                        );
                        return;
                    }
                }
                ctx.request.headers.remove(&header);
                ctx.set("override.method", over);
            }
            next(ctx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{request, MockWriter};

    fn override_header() -> HeaderName {
        HeaderName::from_static("x-http-method-override")
    }

    fn echo_method() -> Handler {
        Arc::new(|ctx: &mut Context<'_>| {
            let method = ctx.request.method.to_string();
            let _ = crate::response::ResponseWriter::write(ctx, method.as_bytes());
        })
    }

    fn run(req: crate::request::Request) -> MockWriter {
        let chain = MethodOverride::default().run(echo_method());
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        w
    }

    #[test]
    fn override_via_header_mutates_method() {
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "DELETE");
        let w = run(req);
        assert_eq!(w.body, b"DELETE");
    }

    #[test]
    fn override_via_query_var() {
        let mut req = request(Method::GET, "/v1/tickets/1");
        req.query = "_method=OPTIONS".to_string();
        let w = run(req);
        assert_eq!(w.body, b"OPTIONS");
    }

    #[test]
    fn override_header_is_removed_and_extra_published() {
        let chain = MethodOverride::default().run(Arc::new(|ctx: &mut Context<'_>| {
            assert_eq!(ctx.request.header(&override_header()), None);
            assert_eq!(ctx.get_str("override.method"), Some("PUT"));
        }));
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "PUT");
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
    }

    #[test]
    fn unknown_override_is_bad_request() {
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "BREW");
        let w = run(req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn wrong_carrier_method_is_precondition_failed() {
        // OPTIONS must be carried by GET, not POST
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "OPTIONS");
        let w = run(req);
        assert_eq!(w.status, Some(StatusCode::PRECONDITION_FAILED));
    }

    #[test]
    fn override_equal_to_method_is_a_no_op() {
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "POST");
        let w = run(req);
        assert_eq!(w.body, b"POST");
        assert_eq!(w.status, Some(StatusCode::OK));
    }

    #[test]
    fn applying_override_twice_is_idempotent() {
        // after the first override the method equals the override value, so
        // a second pass through the filter leaves it unchanged
        let filter = MethodOverride::default();
        let inner = filter.run(echo_method());
        let chain = MethodOverride::default().run(inner);
        let mut req = request(Method::POST, "/v1/tickets/1");
        headers::set(&mut req.headers, override_header(), "DELETE");
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        assert_eq!(w.body, b"DELETE");
    }
}
