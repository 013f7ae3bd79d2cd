//! Pre- and post-request access log events, rendered with the context's
//! printf-style verbs (see [`Context::format_log`]).

use std::sync::Arc;

use tracing::info;

use super::Filter;
use crate::context::{Context, Handler};

/// Default post-event format: status, short request id, request line and
/// elapsed seconds.
pub const LOG_FORMAT_DEFAULT: &str = "%s [%-.8L] \"%#r\" => \"%#s\" done in %.6Ds";

/// Similar to Apache HTTP's Common Log Format (CLF).
pub const LOG_FORMAT_COMMON: &str = "%h %l %u %t \"%r\" %#s %b";

/// Similar to the NCSA extended/combined log format.
pub const LOG_FORMAT_EXTENDED: &str = "%h %l %u %t \"%r\" %#s %b \"%R\" \"%A\"";

/// Similar to Apache HTTP's Referer log format.
pub const LOG_FORMAT_REFERER: &str = "%R -> %U";

/// Access-log filter. Events are emitted through `tracing` under the
/// `restive::access` target.
pub struct Logs {
    /// Format for the pre-request log entry; empty means no pre-log.
    pub pre_log_format: String,

    /// Format for the post-request log entry.
    pub post_log_format: String,
}

impl Default for Logs {
    fn default() -> Self {
        Self {
            pre_log_format: String::new(),
            post_log_format: LOG_FORMAT_DEFAULT.to_string(),
        }
    }
}

impl Filter for Logs {
    fn run(&self, next: Handler) -> Handler {
        let pre = self.pre_log_format.clone();
        let post = if self.post_log_format.is_empty() {
            LOG_FORMAT_DEFAULT.to_string()
        } else {
            self.post_log_format.clone()
        };

        Arc::new(move |ctx: &mut Context<'_>| {
            if !pre.is_empty() {
                info!(target: "restive::access", "{}", ctx.format_log(&pre));
            }

            next(ctx);

            info!(target: "restive::access", "{}", ctx.format_log(&post));
        })
    }
}
