//! The filter chain.
//!
//! A filter wraps a handler and is chained in FILO (first-in, last-out)
//! order: pre-effects run in registration order, post-effects in reverse. At
//! any time a filter can stop a request by returning before the next chained
//! handler is called; the final link points to the resource handler.
//!
//! Filters run at three scopes, in order: service, resource and route.
//! Service filters run before resource filters, and resource filters before
//! route filters. A filter that only makes sense at some scopes implements
//! [`Filter::run_in`]; the composer skips it elsewhere.

pub mod auth_basic;
pub mod cors;
pub mod etag;
pub mod gzip;
pub mod logs;
pub mod method_override;
pub mod security;


pub use auth_basic::AuthBasic;
pub use cors::Cors;
pub use etag::ETag;
pub use gzip::Gzip;
pub use logs::Logs;
pub use method_override::MethodOverride;
pub use security::Security;

use std::sync::Arc;

use crate::context::Handler;

/// The scope a filter chain is being composed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    /// Service-level filters, run for every request.
    Service,
    /// Resource-level filters, run for every route of one resource.
    Resource,
    /// Route-level filters, run for a single route.
    Router,
}

/// A chainable request filter.
///
/// Captured state is explicit configuration on the filter value. Expensive
/// one-shot initialization belongs inside [`Filter::run`], before the closure
/// is returned; `run` may be invoked once per route the filter is attached
/// to, so such initialization must be idempotent.
pub trait Filter: Send + Sync {
    /// Wrap `next`, returning the handler that executes this filter.
    fn run(&self, next: Handler) -> Handler;

    /// Whether this filter participates at the given scope. Defaults to all
    /// scopes.
    fn run_in(&self, _scope: FilterScope) -> bool {
        true
    }
}

/// Compose `filters` around `handler` in FILO order, skipping filters whose
/// scope predicate excludes `scope`.
pub fn attach(handler: Handler, filters: &[Arc<dyn Filter>], scope: FilterScope) -> Handler {
    let mut handler = handler;
    for filter in filters.iter().rev() {
        if !filter.run_in(scope) {
            continue;
        }
        handler = filter.run(handler);
    }
    handler
}
