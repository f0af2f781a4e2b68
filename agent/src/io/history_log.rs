//! Per-round history artifacts.
//!
//! Every round leaves its prompt, raw reply and observation on disk so a run
//! can be audited after the fact. Always written, independent of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::tree::ReasoningTree;

#[derive(Debug, Clone)]
pub struct RoundPaths {
    pub dir: PathBuf,
    pub prompt_path: PathBuf,
    pub reply_path: PathBuf,
    pub observation_path: PathBuf,
    pub tree_path: PathBuf,
}

impl RoundPaths {
    pub fn new(history_dir: &Path, round: u32) -> Self {
        let dir = history_dir.join(format!("round-{round}"));
        Self {
            dir: dir.clone(),
            prompt_path: dir.join("prompt.md"),
            reply_path: dir.join("reply.md"),
            observation_path: dir.join("observation.txt"),
            tree_path: dir.join("tree.json"),
        }
    }
}

pub struct RoundWriteRequest<'a> {
    pub history_dir: &'a Path,
    pub round: u32,
    pub prompt: &'a str,
    pub reply: &'a str,
    pub observation: Option<&'a str>,
    /// Tree state after the round, for post-hoc inspection.
    pub tree: &'a ReasoningTree,
}

pub fn write_round(request: &RoundWriteRequest<'_>) -> Result<RoundPaths> {
    let paths = RoundPaths::new(request.history_dir, request.round);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create round dir {}", paths.dir.display()))?;

    // Write in deterministic order to keep logs stable.
    write_text(&paths.prompt_path, request.prompt)?;
    write_text(&paths.reply_path, request.reply)?;
    if let Some(observation) = request.observation {
        write_text(&paths.observation_path, observation)?;
    }
    write_json(&paths.tree_path, request.tree)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RoundPaths::new(temp.path(), 3);

        assert!(paths.dir.ends_with("round-3"));
        assert!(paths.prompt_path.ends_with("prompt.md"));
        assert!(paths.reply_path.ends_with("reply.md"));
        assert!(paths.observation_path.ends_with("observation.txt"));
        assert!(paths.tree_path.ends_with("tree.json"));
    }

    #[test]
    fn writes_round_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ReasoningTree::new();
        let paths = write_round(&RoundWriteRequest {
            history_dir: temp.path(),
            round: 1,
            prompt: "### Task",
            reply: "<action>ls</action>",
            observation: Some("[returncode: 0]\nfiles"),
            tree: &tree,
        })
        .expect("write");

        assert!(paths.prompt_path.is_file());
        assert!(paths.reply_path.is_file());
        assert!(paths.tree_path.is_file());
        assert_eq!(
            fs::read_to_string(&paths.observation_path).expect("read"),
            "[returncode: 0]\nfiles"
        );
    }

    #[test]
    fn observation_is_optional() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ReasoningTree::new();
        let paths = write_round(&RoundWriteRequest {
            history_dir: temp.path(),
            round: 2,
            prompt: "p",
            reply: "r",
            observation: None,
            tree: &tree,
        })
        .expect("write");
        assert!(!paths.observation_path.exists());
        assert!(paths.tree_path.is_file());
    }
}
