//! Shared scripted collaborators for tests.
//!
//! Only compiled for tests (or with the `test-support` feature). Scripted
//! fakes implement the loop's trait seams without spawning processes or
//! touching a real model.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::core::context_render::{FunctionInfo, SourceReader, Structure, StructureResolver};
use crate::io::config::AgentConfig;
use crate::io::env::{Environment, Execution};
use crate::io::model::ModelClient;

/// Config with loop limits suitable for scripted tests.
pub fn test_config() -> AgentConfig {
    AgentConfig {
        max_rounds: 10,
        ..AgentConfig::default()
    }
}

/// A minimal first-step reply proposing `action`.
pub fn first_step_reply(action: &str) -> String {
    format!(
        "<property>deterministic</property><thoughts>thinking</thoughts>\
         <action>{action}</action>"
    )
}

/// A minimal steady reply judging the incoming operation and proposing
/// `action`.
pub fn steady_reply(decision: &str, summary: &str, lessons: &str, action: &str) -> String {
    format!(
        "<decision>{decision}</decision><summary>{summary}</summary>\
         <lessons>{lessons}</lessons><property>deterministic</property>\
         <thoughts>thinking</thoughts><action>{action}</action>"
    )
}

/// Model client that replays scripted replies and records every prompt it
/// was shown.
pub struct ScriptedModel {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn invoke(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model ran out of replies"))
    }
}

/// Environment that replays scripted executions and returns an empty diff.
pub struct ScriptedEnv {
    executions: RefCell<VecDeque<Execution>>,
    executed: RefCell<Vec<String>>,
    diff: String,
}

impl ScriptedEnv {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self {
            executions: RefCell::new(executions.into()),
            executed: RefCell::new(Vec::new()),
            diff: String::new(),
        }
    }

    pub fn with_diff(executions: Vec<Execution>, diff: &str) -> Self {
        Self {
            diff: diff.to_string(),
            ..Self::new(executions)
        }
    }

    /// Number of actions that reached the environment.
    pub fn executed(&self) -> usize {
        self.executed.borrow().len()
    }

    /// Actions that reached the environment, in call order.
    pub fn actions(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl Environment for ScriptedEnv {
    fn execute(&self, action: &str) -> Result<Execution> {
        self.executed.borrow_mut().push(action.to_string());
        self.executions
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted environment ran out of executions"))
    }

    fn diff(&self) -> Result<String> {
        Ok(self.diff.clone())
    }
}

/// In-memory source tree keyed by relative path.
pub struct MapSource {
    files: HashMap<String, String>,
}

impl MapSource {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            files: entries
                .iter()
                .map(|(path, contents)| ((*path).to_string(), (*contents).to_string()))
                .collect(),
        }
    }
}

impl SourceReader for MapSource {
    fn read(&self, file_path: &str) -> Result<String> {
        self.files
            .get(file_path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file {file_path}"))
    }
}

/// Resolver that reports the same enclosing function for every line and no
/// other structure.
pub struct FixedFunctionResolver {
    function: FunctionInfo,
}

impl FixedFunctionResolver {
    pub fn new(function: FunctionInfo) -> Self {
        Self { function }
    }
}

impl StructureResolver for FixedFunctionResolver {
    fn resolve(&self, _file_path: &str, _lines: &[u32]) -> Result<Structure> {
        Ok(Structure {
            signature_lines: vec![self.function.start_line],
            block_header_lines: Vec::new(),
            function_body: Some((self.function.start_line, self.function.end_line)),
        })
    }

    fn enclosing_function(&self, _file_path: &str, _line: u32) -> Result<Option<FunctionInfo>> {
        Ok(Some(self.function.clone()))
    }
}
