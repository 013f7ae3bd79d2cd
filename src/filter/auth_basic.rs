//! HTTP Basic Authentication, as described in RFC 2617.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::StatusCode;

use super::Filter;
use crate::context::{Context, Handler};
use crate::headers;
use crate::response::ResponseWriter;

/// Callback that checks a username/password pair.
pub type AuthCheck = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Basic-auth filter. Credentials are checked by the `authenticate`
/// callback; the default denies all access.
pub struct AuthBasic {
    /// The authentication realm presented in the challenge.
    pub realm: String,

    /// Returns true when the given username and password are accepted.
    pub authenticate: AuthCheck,
}

impl Default for AuthBasic {
    fn default() -> Self {
        Self {
            realm: "Authorization Required".to_string(),
            // deny all access unless told otherwise
            authenticate: Arc::new(|_user, _pass| false),
        }
    }
}

fn get_user_pass(header: &str) -> Result<(String, String), &'static str> {
    let mut credentials = header.splitn(2, ' ');
    if credentials.next() != Some("Basic") {
        return Err("Invalid authorization request");
    }
    let encoded = credentials.next().unwrap_or("");
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| "Invalid authorization request")?;
    let decoded = String::from_utf8(decoded).map_err(|_| "Invalid credentials syntax")?;
    let Some((user, pass)) = decoded.split_once(':') else {
        return Err("Invalid credentials syntax");
    };
    Ok((user.to_string(), pass.to_string()))
}

/// Send the `WWW-Authenticate` challenge and a 401 response.
fn must_authenticate(ctx: &mut Context<'_>, challenge: &str) {
    headers::set(ctx.headers_mut(), WWW_AUTHENTICATE, challenge);
    ctx.error(StatusCode::UNAUTHORIZED, "Unauthorized");
}

impl Filter for AuthBasic {
    /// Runs the filter and passes down the following extras:
    ///
    /// ```text
    /// auth.user   authenticated user
    /// auth.type   auth scheme type, "basic"
    /// ```
    fn run(&self, next: Handler) -> Handler {
        let realm: String = self
            .realm
            .chars()
            .filter(|c| *c != '"' && *c != '\'')
            .collect();
        let challenge = format!("Basic realm=\"{realm}\"");
        let authenticate = self.authenticate.clone();

        Arc::new(move |ctx: &mut Context<'_>| {
            let Some(header) = ctx.request.header(&AUTHORIZATION).map(String::from) else {
                must_authenticate(ctx, &challenge);
                return;
            };

            let (user, pass) = match get_user_pass(&header) {
                Ok(pair) => pair,
                Err(msg) => {
                    ctx.error(StatusCode::BAD_REQUEST, msg);
                    return;
                }
            };

            if !authenticate(&user, &pass) {
                must_authenticate(ctx, &challenge);
                return;
            }

            ctx.set("auth.user", user);
            ctx.set("auth.type", "basic");

            next(ctx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{request, MockWriter};
    use http::Method;

    fn filter() -> AuthBasic {
        AuthBasic {
            realm: "Ops \"Panel\"".to_string(),
            authenticate: Arc::new(|user, pass| user == "alice" && pass == "s3cret"),
        }
    }

    fn authorization(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    fn run(filter: &AuthBasic, req: crate::request::Request) -> MockWriter {
        let chain = filter.run(Arc::new(|ctx: &mut Context<'_>| {
            assert_eq!(ctx.get_str("auth.user"), Some("alice"));
            assert_eq!(ctx.get_str("auth.type"), Some("basic"));
            let _ = ctx.write(b"welcome");
        }));
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        w
    }

    #[test]
    fn missing_header_challenges_with_realm() {
        let w = run(&filter(), request(Method::GET, "/admin"));
        assert_eq!(w.status, Some(StatusCode::UNAUTHORIZED));
        // quotes are stripped from the configured realm
        assert_eq!(
            headers::get(&w.headers, &WWW_AUTHENTICATE),
            Some("Basic realm=\"Ops Panel\"")
        );
    }

    #[test]
    fn valid_credentials_pass_and_publish_extras() {
        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, &authorization("alice", "s3cret"));
        let w = run(&filter(), req);
        assert_eq!(w.status, Some(StatusCode::OK));
        assert_eq!(w.body, b"welcome");
    }

    #[test]
    fn wrong_credentials_are_rejected() {
        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, &authorization("alice", "wrong"));
        let w = run(&filter(), req);
        assert_eq!(w.status, Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn malformed_header_is_bad_request() {
        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, "Bearer token123");
        let w = run(&filter(), req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));

        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, "Basic !!!not-base64!!!");
        let w = run(&filter(), req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));

        // decodes fine but has no colon separator
        let mut req = request(Method::GET, "/admin");
        let encoded = general_purpose::STANDARD.encode("no-separator");
        headers::set(
            &mut req.headers,
            AUTHORIZATION,
            &format!("Basic {encoded}"),
        );
        let w = run(&filter(), req);
        assert_eq!(w.status, Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn password_may_contain_colons() {
        let auth = AuthBasic {
            realm: String::new(),
            authenticate: Arc::new(|user, pass| user == "alice" && pass == "a:b:c"),
        };
        let chain = auth.run(Arc::new(|ctx: &mut Context<'_>| {
            let _ = ctx.write(b"in");
        }));
        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, &authorization("alice", "a:b:c"));
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        assert_eq!(w.body, b"in");
    }

    #[test]
    fn default_filter_denies_everyone() {
        let auth = AuthBasic::default();
        let chain = auth.run(Arc::new(|_ctx: &mut Context<'_>| {
            panic!("handler must not run");
        }));
        let mut req = request(Method::GET, "/admin");
        headers::set(&mut req.headers, AUTHORIZATION, &authorization("any", "one"));
        let mut w = MockWriter::new();
        let mut ctx = Context::acquire(&mut w, req);
        chain(&mut ctx);
        ctx.free();
        assert_eq!(w.status, Some(StatusCode::UNAUTHORIZED));
    }
}
