//! Single-round orchestration of the agent loop.
//!
//! One round: build the prompt from store, tree and workspace state; invoke
//! the model exactly once; parse the reply strictly; in steady state judge
//! the pending operation and record its activity; execute the newly proposed
//! action (intercepting the builtin context tools); propose the new pending
//! node at the frontier.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::chain_render::{render_chain, render_lessons};
use crate::core::citations::citation_counts;
use crate::core::context_render::{SourceReader, StructureResolver, render_context};
use crate::core::reply::{Decision, LoopState, Reply, parse_reply};
use crate::core::store::{ChunkId, ChunkKey, CodeContextStore};
use crate::io::config::AgentConfig;
use crate::io::env::Environment;
use crate::io::history_log::{RoundWriteRequest, write_round};
use crate::io::model::ModelClient;
use crate::io::prompt::{IncomingOperation, PromptBuilder, PromptInputs};
use crate::tree::{NodeDraft, NodeId, ReasoningTree};

/// First line of an observation that ends the run with a final output.
pub const SUBMISSION_MARKERS: [&str; 2] = [
    "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT",
    "MINI_SWE_AGENT_FINAL_OUTPUT",
];

const DEFAULT_NEARBY_WINDOW: u32 = 100;

/// What one round did.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub round: u32,
    pub state: LoopState,
    /// Judgment of the previously pending operation, `None` in the first round.
    pub decision: Option<Decision>,
    pub action: String,
    pub observation: String,
    /// The frontier accumulated the configured number of consecutive
    /// rejections; the proposed action was withheld.
    pub dead_end: bool,
    /// Final output submitted by the action, when a submission marker led
    /// the observation.
    pub submitted: Option<String>,
}

/// The full mutable state of a run.
pub struct AgentLoop {
    config: AgentConfig,
    task: String,
    tools: String,
    store: CodeContextStore,
    tree: ReasoningTree,
    /// Node proposed last round, awaiting judgment.
    pending: Option<NodeId>,
    round: u32,
    /// Whole-file chunks from `seed_files`, counted as touched by the first
    /// operation. Drained into the first proposal.
    seed_chunks: Vec<ChunkId>,
    seeded: bool,
}

impl AgentLoop {
    pub fn new(config: AgentConfig, task: String, tools: String) -> Self {
        Self {
            config,
            task,
            tools,
            store: CodeContextStore::new(),
            tree: ReasoningTree::new(),
            pending: None,
            round: 1,
            seed_chunks: Vec::new(),
            seeded: false,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Next round number (1-based).
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn tree(&self) -> &ReasoningTree {
        &self.tree
    }

    pub fn store(&self) -> &CodeContextStore {
        &self.store
    }

    pub fn state(&self) -> LoopState {
        if self.pending.is_some() {
            LoopState::Steady
        } else {
            LoopState::FirstStep
        }
    }

    /// Run one round.
    ///
    /// Nothing is mutated before the reply parses (seeding and score caching
    /// are idempotent), so a step that failed with a
    /// [`ParseError`](crate::core::error::ParseError) can be re-run safely.
    #[instrument(skip_all, fields(round = self.round))]
    pub fn step(
        &mut self,
        model: &dyn ModelClient,
        env: &dyn Environment,
        resolver: &dyn StructureResolver,
        source: &dyn SourceReader,
        history_dir: Option<&Path>,
    ) -> Result<StepOutcome> {
        source.invalidate();
        if !self.seeded {
            self.seed(source)?;
        }
        let state = self.state();
        let round = self.round;

        // 1. Prompt.
        let selection = self.store.select(&self.config.score_params());
        let rendered = render_context(&self.store, &selection, resolver, source)
            .context("render code context")?;
        let incoming = self.pending.map(|id| {
            let node = self.tree.node(id);
            IncomingOperation {
                thoughts: node.thought.clone(),
                action: node.action.clone(),
                observation: node.observation.clone().unwrap_or_default(),
            }
        });
        let inputs = PromptInputs {
            task: self.task.clone(),
            tools: self.tools.clone(),
            context: rendered.text.clone(),
            chain: render_chain(&self.tree),
            lessons: render_lessons(&self.tree),
            diff: env.diff().context("collect workspace diff")?,
            incoming,
        };
        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes)
            .build(&inputs)
            .context("build prompt")?;

        // 2. Exactly one model call.
        let raw_reply = model.invoke(&prompt).context("invoke model")?;

        // 3. Strict parse. Everything up to here is side-effect free.
        let reply = parse_reply(&raw_reply, state)?;
        debug!(?state, "reply parsed");

        // 4. Judge the pending operation and record its activity.
        let mut dead_end = false;
        if let Some(pending_id) = self.pending.take() {
            let keep = matches!(reply.decision(), Some(Decision::Keep));
            let (summary, lessons) = match &reply {
                Reply::Steady(steady) => (steady.summary.clone(), steady.lessons.clone()),
                Reply::FirstStep(_) => (String::new(), String::new()),
            };
            let parent = self
                .tree
                .node(pending_id)
                .parent
                .unwrap_or(NodeId::ROOT);
            self.tree.finalize(pending_id, keep, summary, lessons)?;
            let (touched, referred) = {
                let node = self.tree.node(pending_id);
                (node.touched.clone(), node.referred.clone())
            };
            self.store
                .record_step(self.tree.n_operations(), &touched, &referred)?;
            info!(
                operation = self.tree.n_operations(),
                keep, "operation finalized"
            );
            if !keep && self.tree.dead_end(parent, self.config.max_invalid) {
                warn!(
                    consecutive_invalid = self.config.max_invalid,
                    "dead end reached, withholding proposal"
                );
                dead_end = true;
            }
        }

        if dead_end {
            self.write_history(history_dir, round, &prompt, &raw_reply, None)?;
            self.round += 1;
            return Ok(StepOutcome {
                round,
                state,
                decision: reply.decision(),
                action: reply.action().to_string(),
                observation: String::new(),
                dead_end: true,
                submitted: None,
            });
        }

        // 5. Execute the proposed action.
        let action = reply.action().to_string();
        let (observation, touched_now, submitted) =
            self.execute_action(&action, env, resolver, source)?;

        // 6. Propose the new pending node at the frontier.
        let mut touched = std::mem::take(&mut self.seed_chunks);
        touched.extend(touched_now);
        let mut referred: Vec<(ChunkId, u32)> = Vec::new();
        for (index, count) in citation_counts(reply.thoughts()) {
            match rendered.order.get(index - 1) {
                Some(&id) => referred.push((id, count)),
                None => warn!(index, "citation index outside the rendered context"),
            }
        }
        let draft = NodeDraft {
            thought: reply.thoughts().to_string(),
            action: action.clone(),
            property: Some(reply.property()),
            touched,
            referred,
        };
        let id = self.tree.propose(self.tree.frontier(), draft);
        self.tree.set_observation(id, observation.clone());
        self.tree
            .set_code_change(id, env.diff().context("snapshot workspace diff")?);
        self.pending = Some(id);

        // 7. Round artifacts.
        self.write_history(history_dir, round, &prompt, &raw_reply, Some(&observation))?;

        self.round += 1;
        Ok(StepOutcome {
            round,
            state,
            decision: reply.decision(),
            action,
            observation,
            dead_end: false,
            submitted,
        })
    }

    /// Register configured seed files as whole-file chunks.
    fn seed(&mut self, source: &dyn SourceReader) -> Result<()> {
        let seed_files = self.config.seed_files.clone();
        for file in &seed_files {
            let contents = source
                .read(file)
                .with_context(|| format!("read seed file {file}"))?;
            let total = contents.lines().count() as u32;
            if total == 0 {
                continue;
            }
            let key = ChunkKey::for_lines(file, 1, total);
            let id = self.store.register_or_get(key, true);
            self.seed_chunks.push(id);
            debug!(file, lines = total, "seed file registered");
        }
        self.seeded = true;
        Ok(())
    }

    /// Run the action, intercepting builtin context tools.
    ///
    /// Returns the observation text, chunks loaded by builtin calls, and the
    /// submitted final output if the observation led with a marker. Builtin
    /// failures are observations with returncode 1, never loop errors.
    fn execute_action(
        &mut self,
        action: &str,
        env: &dyn Environment,
        resolver: &dyn StructureResolver,
        source: &dyn SourceReader,
    ) -> Result<(String, Vec<ChunkId>, Option<String>)> {
        let mut parts = action.trim().split_whitespace();
        match parts.next() {
            Some("get-code-lines") => {
                let args: Vec<&str> = parts.collect();
                Ok(self.builtin_code_lines(&args, source))
            }
            Some("get-nearby-code-context") => {
                let args: Vec<&str> = parts.collect();
                Ok(self.builtin_nearby(&args, resolver, source))
            }
            _ => {
                let execution = env.execute(action).context("execute action")?;
                let submitted = submitted_output(&execution.output);
                Ok((execution.observation(), Vec::new(), submitted))
            }
        }
    }

    fn builtin_code_lines(
        &mut self,
        args: &[&str],
        source: &dyn SourceReader,
    ) -> (String, Vec<ChunkId>, Option<String>) {
        let parsed = match args {
            [file, start, end] => match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(start), Ok(end)) => Ok((*file, start, end)),
                _ => Err("start and end must be line numbers".to_string()),
            },
            _ => Err("usage: get-code-lines <file> <start> <end>".to_string()),
        };
        let (file, start, end) = match parsed {
            Ok(ok) => ok,
            Err(message) => return (failure(&message), Vec::new(), None),
        };
        if start < 1 || end < start {
            return (failure("line range must satisfy 1 <= start <= end"), Vec::new(), None);
        }
        let total = match line_count(source, file) {
            Ok(0) => return (failure(&format!("file {file} is empty")), Vec::new(), None),
            Ok(total) => total,
            Err(message) => return (failure(&message), Vec::new(), None),
        };
        if start > total {
            return (
                failure(&format!("file {file} has only {total} lines")),
                Vec::new(),
                None,
            );
        }
        let eof = end >= total;
        let end = end.min(total);
        let id = self
            .store
            .register_or_get(ChunkKey::for_lines(file, start, end), eof);
        let message = format!(
            "[returncode: 0]\nLines {start} to {end} of file {file} are added into the code context."
        );
        (message, vec![id], None)
    }

    fn builtin_nearby(
        &mut self,
        args: &[&str],
        resolver: &dyn StructureResolver,
        source: &dyn SourceReader,
    ) -> (String, Vec<ChunkId>, Option<String>) {
        let parsed = match args {
            [file, line] => line
                .parse::<u32>()
                .map(|line| (*file, line, DEFAULT_NEARBY_WINDOW))
                .map_err(|_| "line must be a line number".to_string()),
            [file, line, window] => match (line.parse::<u32>(), window.parse::<u32>()) {
                (Ok(line), Ok(window)) if window > 0 => Ok((*file, line, window)),
                _ => Err("line and window must be positive numbers".to_string()),
            },
            _ => Err("usage: get-nearby-code-context <file> <line> [window]".to_string()),
        };
        let (file, line, window) = match parsed {
            Ok(ok) => ok,
            Err(message) => return (failure(&message), Vec::new(), None),
        };
        let total = match line_count(source, file) {
            Ok(total) => total,
            Err(message) => return (failure(&message), Vec::new(), None),
        };
        if line < 1 || line > total {
            return (
                failure(&format!("line {line} is outside file {file} ({total} lines)")),
                Vec::new(),
                None,
            );
        }

        let function = match resolver.enclosing_function(file, line) {
            Ok(function) => function,
            Err(err) => return (failure(&format!("{err:#}")), Vec::new(), None),
        };
        match function {
            Some(function) => {
                let name = if function.class_name.is_empty() {
                    function.function_name.clone()
                } else {
                    format!("{}.{}", function.class_name, function.function_name)
                };
                let length = function.end_line - function.start_line + 1;
                if length <= window {
                    let key = ChunkKey::new(
                        file,
                        function.class_name,
                        function.function_name,
                        true,
                        (function.start_line..=function.end_line).collect(),
                    );
                    let id = self.store.register_or_get(key, function.end_line >= total);
                    let message = format!(
                        "[returncode: 0]\nFunction {name} in file {file} is added into the code context."
                    );
                    (message, vec![id], None)
                } else {
                    // Too large to show whole, take a window around the line
                    // clamped to the function body.
                    let start = line
                        .saturating_sub(window / 2)
                        .max(function.start_line);
                    let end = (start + window - 1).min(function.end_line);
                    let key = ChunkKey::new(
                        file,
                        function.class_name,
                        function.function_name,
                        false,
                        (start..=end).collect(),
                    );
                    let id = self.store.register_or_get(key, end >= total);
                    let message = format!(
                        "[returncode: 0]\nLines {start} to {end} of function {name} in file {file} are added into the code context."
                    );
                    (message, vec![id], None)
                }
            }
            None => {
                let start = line.saturating_sub(window / 2).max(1);
                let end = (line + window / 2).min(total);
                let id = self
                    .store
                    .register_or_get(ChunkKey::for_lines(file, start, end), end >= total);
                let message = format!(
                    "[returncode: 0]\nLines {start} to {end} of file {file} are added into the code context."
                );
                (message, vec![id], None)
            }
        }
    }

    fn write_history(
        &self,
        history_dir: Option<&Path>,
        round: u32,
        prompt: &str,
        reply: &str,
        observation: Option<&str>,
    ) -> Result<()> {
        let Some(dir) = history_dir else {
            return Ok(());
        };
        write_round(&RoundWriteRequest {
            history_dir: dir,
            round,
            prompt,
            reply,
            observation,
            tree: &self.tree,
        })
        .context("write round history")?;
        Ok(())
    }
}

fn failure(message: &str) -> String {
    format!("[returncode: 1]\n{message}")
}

fn line_count(source: &dyn SourceReader, file: &str) -> std::result::Result<u32, String> {
    match source.read(file) {
        Ok(contents) => Ok(contents.lines().count() as u32),
        Err(err) => Err(format!("{err:#}")),
    }
}

/// Final output when the observation's first line is a submission marker.
fn submitted_output(output: &str) -> Option<String> {
    let mut lines = output.lines();
    let first = lines.next()?.trim();
    if SUBMISSION_MARKERS.contains(&first) {
        Some(lines.collect::<Vec<_>>().join("\n"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context_render::{FunctionInfo, NullResolver};
    use crate::io::env::Execution;
    use crate::test_support::{
        FixedFunctionResolver, MapSource, ScriptedEnv, ScriptedModel, first_step_reply,
        steady_reply, test_config,
    };

    fn source_with_app(lines: u32) -> MapSource {
        let body: Vec<String> = (1..=lines).map(|i| format!("line{i}")).collect();
        let joined = body.join("\n");
        MapSource::new(&[("app.py", joined.as_str())])
    }

    /// First round: no judgment, action executed, node proposed pending.
    #[test]
    fn first_round_proposes_without_judgment() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply("ls")]);
        let env = ScriptedEnv::new(vec![Execution {
            returncode: 0,
            output: "app.py".to_string(),
        }]);
        let source = source_with_app(3);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert_eq!(outcome.round, 1);
        assert_eq!(outcome.state, LoopState::FirstStep);
        assert_eq!(outcome.decision, None);
        assert_eq!(outcome.action, "ls");
        assert_eq!(outcome.observation, "[returncode: 0]\napp.py");
        assert_eq!(agent.state(), LoopState::Steady);
        assert_eq!(agent.tree().n_operations(), 0);
    }

    /// Steady round: the pending node is finalized and its activity recorded
    /// before the new action runs.
    #[test]
    fn steady_round_finalizes_and_records() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![
            first_step_reply("get-code-lines app.py 1 2"),
            steady_reply("keep", "loaded the head", "", "cat app.py"),
        ]);
        let env = ScriptedEnv::new(vec![Execution {
            returncode: 0,
            output: "line1".to_string(),
        }]);
        let source = source_with_app(5);

        agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 1");
        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 2");

        assert_eq!(outcome.decision, Some(Decision::Keep));
        assert_eq!(agent.tree().n_operations(), 1);
        assert_eq!(agent.store().recorded_steps(), 1);
        // The chunk loaded by round 1's builtin was touched by operation 1.
        let chunk = agent.store().chunk(agent.store().ids().next().expect("chunk"));
        assert_eq!(chunk.accessed(), &[1]);
        assert_eq!(agent.tree().chain().len(), 1);
    }

    /// The builtin loads a chunk and reports it in the observation without
    /// touching the environment.
    #[test]
    fn get_code_lines_is_intercepted() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply("get-code-lines app.py 2 4")]);
        let env = ScriptedEnv::new(Vec::new());
        let source = source_with_app(10);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert_eq!(
            outcome.observation,
            "[returncode: 0]\nLines 2 to 4 of file app.py are added into the code context."
        );
        assert_eq!(agent.store().len(), 1);
        assert_eq!(env.executed(), 0);
    }

    /// A range overrunning the file is clamped and flagged EOF.
    #[test]
    fn get_code_lines_clamps_and_marks_eof() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply("get-code-lines app.py 3 99")]);
        let env = ScriptedEnv::new(Vec::new());
        let source = source_with_app(5);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert!(outcome.observation.contains("Lines 3 to 5"));
        let chunk = agent.store().chunk(agent.store().ids().next().expect("chunk"));
        assert!(chunk.eof());
    }

    /// Builtin argument errors become failure observations, not loop errors.
    #[test]
    fn builtin_failures_are_observations() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply("get-code-lines app.py one two")]);
        let env = ScriptedEnv::new(Vec::new());
        let source = source_with_app(5);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert!(outcome.observation.starts_with("[returncode: 1]\n"));
        assert!(agent.store().is_empty());
    }

    /// Nearby context takes the whole enclosing function when it fits the
    /// window.
    #[test]
    fn nearby_context_loads_whole_function_when_it_fits() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model =
            ScriptedModel::new(vec![first_step_reply("get-nearby-code-context app.py 6")]);
        let env = ScriptedEnv::new(Vec::new());
        let source = source_with_app(20);
        let resolver = FixedFunctionResolver::new(FunctionInfo {
            class_name: "App".to_string(),
            function_name: "run".to_string(),
            start_line: 4,
            end_line: 9,
        });

        let outcome = agent
            .step(&model, &env, &resolver, &source, None)
            .expect("step");

        assert_eq!(
            outcome.observation,
            "[returncode: 0]\nFunction App.run in file app.py is added into the code context."
        );
        let chunk = agent.store().chunk(agent.store().ids().next().expect("chunk"));
        assert!(chunk.key().whole_function);
        assert_eq!(chunk.key().lines, (4..=9).collect::<Vec<u32>>());
    }

    /// With no enclosing function the builtin falls back to a bare window.
    #[test]
    fn nearby_context_falls_back_to_bare_window() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply(
            "get-nearby-code-context app.py 10 4",
        )]);
        let env = ScriptedEnv::new(Vec::new());
        let source = source_with_app(30);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert!(outcome.observation.contains("Lines 8 to 12 of file app.py"));
    }

    /// A submission marker on the observation's first line carries the final
    /// output out of the loop.
    #[test]
    fn submission_marker_is_detected() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        let model = ScriptedModel::new(vec![first_step_reply("echo done")]);
        let env = ScriptedEnv::new(vec![Execution {
            returncode: 0,
            output: "COMPLETE_TASK_AND_SUBMIT_FINAL_OUTPUT\nthe fix is in".to_string(),
        }]);
        let source = source_with_app(3);

        let outcome = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("step");

        assert_eq!(outcome.submitted.as_deref(), Some("the fix is in"));
    }

    /// Seed files are registered before round 1 and touched by operation 1.
    #[test]
    fn seed_files_are_touched_by_the_first_operation() {
        let config = AgentConfig {
            seed_files: vec!["app.py".to_string()],
            ..test_config()
        };
        let mut agent = AgentLoop::new(config, "task".into(), String::new());
        let model = ScriptedModel::new(vec![
            first_step_reply("ls"),
            steady_reply("keep", "listed", "", "pwd"),
        ]);
        let env = ScriptedEnv::new(vec![
            Execution {
                returncode: 0,
                output: "app.py".to_string(),
            },
            Execution {
                returncode: 0,
                output: "/work".to_string(),
            },
        ]);
        let source = source_with_app(4);

        agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 1");
        agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 2");

        let chunk = agent.store().chunk(agent.store().ids().next().expect("chunk"));
        assert_eq!(chunk.key().lines, (1..=4).collect::<Vec<u32>>());
        assert!(chunk.eof());
        assert_eq!(chunk.accessed(), &[1]);
    }

    /// Three consecutive drops hit the dead end: the third reply's proposal
    /// is withheld and nothing further executes.
    #[test]
    fn dead_end_withholds_the_proposal() {
        let config = AgentConfig {
            max_invalid: 2,
            ..test_config()
        };
        let mut agent = AgentLoop::new(config, "task".into(), String::new());
        let model = ScriptedModel::new(vec![
            first_step_reply("true"),
            steady_reply("drop", "", "useless", "true"),
            steady_reply("drop", "", "useless again", "true"),
        ]);
        let env = ScriptedEnv::new(vec![
            Execution {
                returncode: 0,
                output: String::new(),
            },
            Execution {
                returncode: 0,
                output: String::new(),
            },
        ]);
        let source = source_with_app(3);

        agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 1");
        let second = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 2");
        assert!(!second.dead_end);

        let third = agent
            .step(&model, &env, &NullResolver, &source, None)
            .expect("round 3");
        assert!(third.dead_end);
        assert!(third.observation.is_empty());
        assert_eq!(env.executed(), 2, "withheld proposal must not execute");
        assert_eq!(agent.tree().n_operations(), 2);
    }

    /// Citations in thoughts are mapped through the rendered chunk order into
    /// referred counts on the proposed node, which land in the store once
    /// that node is finalized.
    #[test]
    fn citations_map_to_referred_counts() {
        let mut agent = AgentLoop::new(test_config(), "task".into(), String::new());
        // Round 1 loads the chunk; its access is recorded at round 2's
        // finalize, so round 3 is the first prompt that renders it and can be
        // cited. The citing node is finalized in round 4.
        let model = ScriptedModel::new(vec![
            first_step_reply("get-code-lines app.py 1 2"),
            steady_reply("keep", "loaded", "", "true"),
            steady_reply_with_thoughts(
                "keep",
                "ran",
                "",
                "the bug is at [1](app.py:1), see [1](app.py:2)",
                "true",
            ),
            steady_reply("keep", "ran again", "", "true"),
        ]);
        let executions = (0..3)
            .map(|_| Execution {
                returncode: 0,
                output: String::new(),
            })
            .collect();
        let env = ScriptedEnv::new(executions);
        let source = source_with_app(5);

        for _ in 0..4 {
            agent
                .step(&model, &env, &NullResolver, &source, None)
                .expect("step");
        }

        // Operation 3's activity carries the two citations of chunk 1.
        let chunk = agent.store().chunk(agent.store().ids().next().expect("chunk"));
        assert_eq!(chunk.referred(), &[0, 0, 2]);
        assert_eq!(chunk.accessed(), &[1, 0, 0]);
    }

    fn steady_reply_with_thoughts(
        decision: &str,
        summary: &str,
        lessons: &str,
        thoughts: &str,
        action: &str,
    ) -> String {
        format!(
            "<decision>{decision}</decision><summary>{summary}</summary>\
             <lessons>{lessons}</lessons><property>deterministic</property>\
             <thoughts>{thoughts}</thoughts><action>{action}</action>"
        )
    }
}
