//! Deterministic, pure logic of the memory engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod chain_render;
pub mod citations;
pub mod context_render;
pub mod error;
pub mod reply;
pub mod store;
