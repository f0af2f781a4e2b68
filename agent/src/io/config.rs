//! Agent configuration stored under `.agent/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::store::ScoreParams;

/// Well-known file locations under a workspace root.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub task_path: PathBuf,
    pub tools_path: PathBuf,
}

impl AgentPaths {
    pub fn new(root: &Path) -> Self {
        let dir = root.join(".agent");
        Self {
            root: root.to_path_buf(),
            config_path: dir.join("config.toml"),
            task_path: dir.join("task.md"),
            tools_path: dir.join("tools.md"),
        }
    }
}

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub scoring: ScoringConfig,

    /// Consecutive rejected operations at one frontier node before the run
    /// is declared a dead end.
    pub max_invalid: u32,

    /// Upper bound on rounds before the run stops without submitting.
    pub max_rounds: u32,

    /// Extra model invocations allowed when a reply fails to parse.
    pub parse_retries: u32,

    /// Prompt byte budget; droppable sections go first, then the tail is
    /// truncated.
    pub prompt_budget_bytes: usize,

    /// Files registered as whole-file chunks before the first round.
    pub seed_files: Vec<String>,

    /// Directory for per-round prompt/reply/observation artifacts, relative
    /// to the workspace root.
    pub history_dir: String,

    pub model: ModelConfig,
    pub exec: ExecConfig,
}

/// Decayed referral scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of an access in a step's activity.
    pub alpha: f64,
    /// Weight of one citation in a step's activity.
    pub beta: f64,
    /// Per-step decay factor, must be in `[0, 1)`.
    pub gamma: f64,
    /// Chunks must score strictly above this to stay in the context.
    pub score_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Command invoked once per round; the prompt is fed on stdin and the
    /// reply read from stdout (e.g. `["codex","exec"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate model stdout beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecConfig {
    /// Shell used to run proposed actions (`shell -c <action>`).
    pub shell: String,
    pub timeout_secs: u64,
    /// Truncate action stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            gamma: 0.9,
            score_threshold: 0.0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            timeout_secs: 2 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            max_invalid: 3,
            max_rounds: 50,
            parse_retries: 1,
            prompt_budget_bytes: 40_000,
            seed_files: Vec::new(),
            history_dir: ".agent/history".to_string(),
            model: ModelConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.scoring.gamma) {
            return Err(anyhow!("scoring.gamma must be in [0, 1)"));
        }
        if self.scoring.alpha < 0.0 || self.scoring.beta < 0.0 {
            return Err(anyhow!("scoring.alpha and scoring.beta must be >= 0"));
        }
        if self.max_invalid == 0 {
            return Err(anyhow!("max_invalid must be > 0"));
        }
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.timeout_secs == 0 || self.exec.timeout_secs == 0 {
            return Err(anyhow!("timeouts must be > 0"));
        }
        if self.model.output_limit_bytes == 0 || self.exec.output_limit_bytes == 0 {
            return Err(anyhow!("output limits must be > 0"));
        }
        if self.exec.shell.trim().is_empty() {
            return Err(anyhow!("exec.shell must be non-empty"));
        }
        Ok(())
    }

    pub fn score_params(&self) -> ScoreParams {
        ScoreParams {
            alpha: self.scoring.alpha,
            beta: self.scoring.beta,
            gamma: self.scoring.gamma,
            threshold: self.scoring.score_threshold,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = AgentConfig {
            max_invalid: 5,
            seed_files: vec!["src/app.py".to_string()],
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn gamma_out_of_range_is_rejected() {
        let cfg = AgentConfig {
            scoring: ScoringConfig {
                gamma: 1.0,
                ..ScoringConfig::default()
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_model_command_is_rejected() {
        let cfg = AgentConfig {
            model: ModelConfig {
                command: Vec::new(),
                ..ModelConfig::default()
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
