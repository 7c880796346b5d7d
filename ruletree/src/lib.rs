//! Declarative rule-tree engine for JSON documents.
//!
//! A rule tree routes each document (or list of documents, or collection
//! document) to the first matching transform. The crate is split the usual
//! way:
//!
//! - **[`core`]**: Pure, deterministic logic (rule classification, tree
//!   building, routing, collection expansion). No I/O.
//! - **[`io`]**: Filesystem access for configuration, rule files and
//!   documents.
//!
//! [`map`] wires the two together for the `ruletree` CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod map;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
