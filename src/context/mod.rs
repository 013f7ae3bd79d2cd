//! The per-request carrier: response writer, parsed request, router
//! captures, bound encoder/decoder, filter extras and write bookkeeping.

mod core;
mod format;

#[cfg(test)]
mod tests;

pub use core::{BodyWriter, Context, PathValues};

use std::sync::Arc;

/// A request handler. All filters accept and return this type; the final
/// link of a chain points to a resource handler.
pub type Handler = Arc<dyn Fn(&mut Context<'_>) + Send + Sync>;
