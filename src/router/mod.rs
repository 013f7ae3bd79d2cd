//! The routing engine: a trie whose path segments may be matched by
//! pre-compiled regular expressions.
//!
//! Routes are full `METHOD /path` pairs inserted into the trie at
//! registration time; the trie is read-only once serving begins. Path
//! segments may contain path segment expressions (PSE) of the form
//! `{type:name}`, which compile to named regexp subgroups and provide a
//! simple layer of validation when accepting values from the path:
//!
//! ```text
//! {word:name}   alphanumeric word, with underscores
//! {uint:name}   unsigned integer
//! {int:name}    signed integer
//! {float:name}  floating-point number in decimal notation
//! {date:name}   ISO 8601 date, with per-component subgroups
//! {geo:name}    RFC 5870 geo location, with per-component subgroups
//! {hex:name}    hex number, with optional "0x" prefix
//! {re:expr}     verbatim regular expression
//! {name}        catch-all; matches anything, may overlap other matches
//! *             shorthand for {wild}
//! ```
//!
//! Matched values are recorded in the request's
//! [`PathValues`](crate::context::PathValues), under the subgroup name and
//! under a positional `_N` key.

mod core;
mod pse;


pub use core::Router;
