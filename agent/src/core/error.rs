//! Typed errors for the core engine contracts.
//!
//! Orchestration code uses `anyhow` like the rest of the crate, but these
//! three conditions are part of the engine's public contract and callers need
//! to match on them (e.g. the loop retries a [`ParseError`] but treats a
//! [`ConsistencyError`] as fatal), so they get dedicated types.

use thiserror::Error;

/// A model reply violated the tagged-reply grammar.
///
/// Parse failures are local to one iteration: nothing in the store or tree
/// has been mutated when one is returned, so the caller may retry or abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing required tag <{0}>")]
    MissingTag(&'static str),
    #[error("duplicate tag <{0}>")]
    DuplicateTag(&'static str),
    #[error("unexpected tag <{0}> for this step")]
    UnexpectedTag(&'static str),
    #[error("tag <{0}> appears out of document order")]
    TagOutOfOrder(&'static str),
    #[error("unclosed tag <{0}>")]
    UnclosedTag(&'static str),
    #[error("invalid value '{value}' for tag <{tag}>")]
    InvalidValue { tag: &'static str, value: String },
    #[error("<action> is empty")]
    EmptyAction,
}

/// Activity recording was driven out of lockstep with the operation counter.
///
/// This indicates a caller bug (a skipped or repeated `record_step`) and must
/// never be recovered silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("record_step called for step {got} but the next expected step is {expected}")]
    StepOutOfOrder { expected: u64, got: u64 },
    #[error("record_step input references unknown chunk id {0}")]
    UnknownChunk(usize),
}

/// An attempt to attach a second accepted child to a chain node.
///
/// The reasoning chain only ever extends from its frontier; hitting this
/// means frontier tracking is broken in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node {parent} already has accepted child {existing}")]
pub struct ChainConflictError {
    pub parent: usize,
    pub existing: usize,
}
