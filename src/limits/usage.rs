use std::sync::Arc;

use http::header::{HeaderName, RETRY_AFTER};
use http::StatusCode;

use super::container::{Container, MemBucket};
use crate::context::{Context, Handler};
use crate::filter::Filter;
use crate::headers;
use crate::response::ResponseWriter;
use crate::util::split_port;

/// Generates a (semi) unique key identifying the client of a request.
pub type Keygen = Arc<dyn Fn(&Context<'_>) -> String + Send + Sync>;

/// Monitors request usage against a per-client token bucket.
///
/// Each client is assigned a key and a bucket of tokens to spend per
/// request. A client that has consumed all its tokens receives a response
/// with HTTP status 429 and a `Retry-After` header; until the renewal period
/// passes, repeated attempts keep being dropped. See
/// <https://en.wikipedia.org/wiki/Token_bucket>.
pub struct Usage {
    /// The bucket device. Defaults to a [`MemBucket`] monitoring 1000 keys
    /// with capacity 100 and 1 token renewed per minute.
    pub container: Arc<dyn Container>,

    /// Tokens consumed per request.
    pub ration: u64,

    /// Client key generator; [`request_key`] when unset.
    pub keygen: Option<Keygen>,
}

impl Default for Usage {
    fn default() -> Self {
        Self {
            container: Arc::new(MemBucket::new(1000, 100, 1)),
            ration: 1,
            keygen: None,
        }
    }
}

/// Default client key: `quota:` plus a hash of the authenticated user when
/// one is set, or of the remote IP (port split off) and user agent.
pub fn request_key(ctx: &Context<'_>) -> String {
    let mut sha = sha1_smol::Sha1::new();
    match ctx.get_str("auth.user") {
        Some(user) if !user.is_empty() => sha.update(user.as_bytes()),
        _ => {
            let (host, _) = split_port(&ctx.request.remote_addr);
            sha.update(host.as_bytes());
            sha.update(ctx.request.user_agent().as_bytes());
        }
    }
    format!("quota:{}", sha.digest())
}

impl Filter for Usage {
    fn run(&self, next: Handler) -> Handler {
        let container = self.container.clone();
        let ration = self.ration.max(1);
        let keygen = self.keygen.clone();

        Arc::new(move |ctx: &mut Context<'_>| {
            let key = match &keygen {
                Some(generate) => generate(ctx),
                None => request_key(ctx),
            };
            let (tokens, when, ok) = container.consume(&key, ration);
            if !ok {
                headers::set(ctx.headers_mut(), RETRY_AFTER, &when.to_string());
                ctx.error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
                return;
            }
            headers::set(
                ctx.headers_mut(),
                HeaderName::from_static("ratelimit-limit"),
                &container.capacity().to_string(),
            );
            headers::set(
                ctx.headers_mut(),
                HeaderName::from_static("ratelimit-remaining"),
                &tokens.to_string(),
            );
            headers::set(
                ctx.headers_mut(),
                HeaderName::from_static("ratelimit-reset"),
                &when.to_string(),
            );

            next(ctx);
        })
    }
}
