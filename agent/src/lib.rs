//! Memory and reasoning-state engine for an autonomous debugging agent.
//!
//! The agent works a task in rounds: it is shown a prompt with the code it
//! has loaded so far plus its reasoning history, replies with a judgment of
//! the previous operation and a new proposal, and has the proposed action
//! executed. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scoring, selection, rendering,
//!   reply parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (config, model invocation,
//!   shell execution, filesystem reads). Isolated to enable scripted fakes
//!   in tests.
//!
//! Orchestration modules ([`step`], [`looping`]) coordinate core logic with
//! I/O to implement one iteration and the full run.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
