//! The service aggregate: base URI, router, encoders, service-level filters
//! and the request adapter that ties them into one pipeline.

mod core;

#[cfg(test)]
mod tests;

pub use core::{MediaOptions, RecoveryFn, Service, ServiceHandler, ServiceOptions};
pub(crate) use core::{CoreSlot, ServiceCore};
