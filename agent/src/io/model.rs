//! Model invocation abstraction.
//!
//! The [`ModelClient`] trait decouples the loop from the actual language
//! model backend. The shipped implementation spawns a configured command and
//! talks to it over stdin/stdout; tests use scripted clients that return
//! predetermined replies without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ModelConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over model backends. One call per round.
pub trait ModelClient {
    /// Send the prompt, return the raw reply text.
    fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Client that spawns a configured external command, feeding the prompt on
/// stdin and reading the reply from stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl ModelClient for CommandModel {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs(), prompt_bytes = prompt.len()))]
    fn invoke(&self, prompt: &str) -> Result<String> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("model command is empty"))?;
        info!(program = %program, "invoking model");

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run model command")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "model timed out");
            return Err(anyhow!("model command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}:\n{}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        debug!(reply_bytes = output.stdout.len(), "model replied");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_client() -> CommandModel {
        CommandModel {
            command: vec!["cat".to_string(), "-".to_string()],
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn prompt_goes_to_stdin_and_reply_comes_from_stdout() {
        let reply = cat_client().invoke("<thoughts>hi</thoughts>").expect("invoke");
        assert_eq!(reply, "<thoughts>hi</thoughts>");
    }

    #[test]
    fn failing_command_is_an_error() {
        let client = CommandModel {
            command: vec!["false".to_string()],
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        };
        assert!(client.invoke("prompt").is_err());
    }
}
