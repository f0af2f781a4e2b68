//! Action execution environment.
//!
//! The [`Environment`] trait is the seam between the loop and wherever the
//! agent's actions actually run. The shipped implementation is a plain
//! subprocess runner in a workspace directory; sandboxed backends would
//! implement the same trait.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::io::config::ExecConfig;
use crate::io::process::run_command_with_timeout;

/// Result of running one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub returncode: i32,
    pub output: String,
}

impl Execution {
    /// Observation text shown to the model for this execution.
    pub fn observation(&self) -> String {
        format!("[returncode: {}]\n{}", self.returncode, self.output)
    }
}

/// Where proposed actions run and where the code-change diff comes from.
pub trait Environment {
    /// Run an action to completion. Action failures are data (a non-zero
    /// `returncode`), not errors; `Err` means the environment itself broke.
    fn execute(&self, action: &str) -> Result<Execution>;

    /// Current workspace diff against the last commit, empty when
    /// unavailable.
    fn diff(&self) -> Result<String>;
}

/// Environment that runs actions through a shell in a working directory.
#[derive(Debug, Clone)]
pub struct ShellEnvironment {
    workdir: PathBuf,
    shell: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ShellEnvironment {
    pub fn new(workdir: impl Into<PathBuf>, config: &ExecConfig) -> Self {
        Self {
            workdir: workdir.into(),
            shell: config.shell.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn git(&self, args: &[&str]) -> Result<Option<String>> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command_with_timeout(
            cmd,
            None,
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run git")?;
        if !output.status.success() || output.timed_out {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

impl Environment for ShellEnvironment {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn execute(&self, action: &str) -> Result<Execution> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(action).current_dir(&self.workdir);
        let output =
            run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
                .context("run action")?;

        let returncode = output.status.code().unwrap_or(-1);
        if output.timed_out {
            warn!("action timed out");
        }
        debug!(returncode, "action finished");
        Ok(Execution {
            returncode,
            output: output.combined_text(),
        })
    }

    /// Diff including untracked files, via intent-to-add. Any git failure
    /// (most commonly: not a repository) degrades to an empty diff.
    fn diff(&self) -> Result<String> {
        if self.git(&["add", "-N", "."])?.is_none() {
            return Ok(String::new());
        }
        Ok(self
            .git(&["--no-pager", "diff", "HEAD"])?
            .unwrap_or_default())
    }
}

/// Default shell environment rooted at `workdir`.
pub fn shell_environment(workdir: &Path, config: &ExecConfig) -> ShellEnvironment {
    ShellEnvironment::new(workdir, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(dir: &Path) -> ShellEnvironment {
        ShellEnvironment::new(
            dir,
            &ExecConfig {
                shell: "sh".to_string(),
                timeout_secs: 5,
                output_limit_bytes: 10_000,
            },
        )
    }

    #[test]
    fn observation_carries_the_returncode_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let execution = env(temp.path()).execute("printf out; exit 2").expect("execute");
        assert_eq!(execution.returncode, 2);
        assert_eq!(execution.observation(), "[returncode: 2]\nout");
    }

    #[test]
    fn stderr_joins_the_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let execution = env(temp.path())
            .execute("echo out; echo err >&2")
            .expect("execute");
        assert!(execution.output.contains("out"));
        assert!(execution.output.contains("err"));
    }

    #[test]
    fn diff_outside_a_repository_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(env(temp.path()).diff().expect("diff"), "");
    }
}
