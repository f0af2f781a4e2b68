//! Multi-round looping over [`AgentLoop::step`].

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::context_render::{SourceReader, StructureResolver};
use crate::core::error::ParseError;
use crate::io::env::Environment;
use crate::io::model::ModelClient;
use crate::step::{AgentLoop, StepOutcome};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// An action submitted a final output.
    Submitted { output: String },
    /// The configured round limit was reached without a submission.
    RoundLimit { rounds: u32 },
    /// The frontier dead-ended and the strategy left it unresolved.
    DeadEnd { consecutive_invalid: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub rounds_executed: u32,
    pub stop: LoopStop,
}

/// What to do about a dead-ended frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadEndResolution {
    /// Stop the run.
    Unresolved,
    /// The strategy changed the run's state; keep looping.
    Resumed,
}

/// Injectable policy consulted when the frontier dead-ends.
///
/// The engine only detects dead ends; what recovery means (backtracking,
/// human escalation, nothing) is the embedder's decision.
pub trait DeadEndStrategy {
    fn on_dead_end(&mut self, agent: &mut AgentLoop) -> DeadEndResolution;
}

/// Default strategy: a dead end ends the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

impl DeadEndStrategy for NoRecovery {
    fn on_dead_end(&mut self, _agent: &mut AgentLoop) -> DeadEndResolution {
        DeadEndResolution::Unresolved
    }
}

/// Run rounds until submission, the round limit, or an unresolved dead end.
///
/// A reply that fails to parse is retried with the same prompt up to the
/// configured `parse_retries`; the step mutates nothing before a successful
/// parse, so re-running it is safe. Any other error stops the loop
/// immediately.
#[allow(clippy::too_many_arguments)]
pub fn run_loop<F: FnMut(&StepOutcome)>(
    agent: &mut AgentLoop,
    model: &dyn ModelClient,
    env: &dyn Environment,
    resolver: &dyn StructureResolver,
    source: &dyn SourceReader,
    strategy: &mut dyn DeadEndStrategy,
    history_dir: Option<&Path>,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let max_rounds = agent.config().max_rounds;
    let parse_retries = agent.config().parse_retries;
    let mut rounds_executed = 0u32;

    while rounds_executed < max_rounds {
        let mut parse_attempts = 0u32;
        let outcome = loop {
            match agent.step(model, env, resolver, source, history_dir) {
                Ok(outcome) => break outcome,
                Err(err) => {
                    if parse_attempts < parse_retries
                        && let Some(parse_err) = err.downcast_ref::<ParseError>()
                    {
                        parse_attempts += 1;
                        warn!(attempt = parse_attempts, error = %parse_err, "reply failed to parse, retrying");
                        continue;
                    }
                    return Err(err);
                }
            }
        };
        rounds_executed += 1;
        on_step(&outcome);

        if let Some(output) = outcome.submitted {
            info!(rounds_executed, "final output submitted");
            return Ok(LoopOutcome {
                rounds_executed,
                stop: LoopStop::Submitted { output },
            });
        }
        if outcome.dead_end {
            let consecutive_invalid = agent.config().max_invalid;
            match strategy.on_dead_end(agent) {
                DeadEndResolution::Resumed => {
                    info!("dead end resumed by strategy");
                }
                DeadEndResolution::Unresolved => {
                    warn!(consecutive_invalid, "dead end unresolved, stopping");
                    return Ok(LoopOutcome {
                        rounds_executed,
                        stop: LoopStop::DeadEnd {
                            consecutive_invalid,
                        },
                    });
                }
            }
        }
    }

    info!(rounds_executed, "round limit reached");
    Ok(LoopOutcome {
        rounds_executed,
        stop: LoopStop::RoundLimit {
            rounds: rounds_executed,
        },
    })
}
