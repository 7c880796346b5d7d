//! Deterministic, pure logic of the rule engine.
//!
//! Core modules must be free of I/O side effects. They classify rule
//! documents, compile them into node trees and route in-memory JSON through
//! those trees.

pub mod builder;
pub mod builtins;
pub mod collection;
pub mod error;
pub mod node;
pub mod path;
pub mod predicate;
pub mod registry;
pub mod spec;
pub mod transform;
pub mod truthiness;
