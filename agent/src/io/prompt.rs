//! Budgeted prompt builder for deterministic model input.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");

/// The pending operation shown for judgment in steady rounds.
#[derive(Debug, Clone, Serialize)]
pub struct IncomingOperation {
    pub thoughts: String,
    pub action: String,
    pub observation: String,
}

/// All inputs needed to build one round's prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    /// Task description from `.agent/task.md`.
    pub task: String,
    /// Extra tool usage notes from `.agent/tools.md`.
    pub tools: String,
    /// Rendered code context.
    pub context: String,
    /// Rendered accepted-operation chain.
    pub chain: String,
    /// Rendered lessons, including rejected attempts.
    pub lessons: String,
    /// Workspace diff snapshot.
    pub diff: String,
    /// Present exactly when a pending operation awaits judgment.
    pub incoming: Option<IncomingOperation>,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "task", "context").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker pattern should compile")
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).expect("key group").as_str().to_string();
        let required = caps.get(2).expect("kind group").as_str() == "required";
        let start = caps.get(0).expect("group 0").end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).expect("group 0").start())
            .unwrap_or(rendered.len());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Apply the budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: tools -> diff -> lessons -> chain -> context
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["tools", "diff", "lessons", "chain", "context"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().expect("sections checked non-empty");
        let before_len = last.content.len();
        if last.content.len() > allowed {
            if allowed > 12 {
                last.content.truncate(allowed - 12);
                last.content.push_str("\n[truncated]");
            } else {
                last.content.truncate(allowed);
            }
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds a round prompt within a byte budget, dropping less critical
/// sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, input: &PromptInputs) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("iteration", ITERATION_TEMPLATE)
            .expect("iteration template should be valid");
        let template = env.get_template("iteration")?;
        let rendered = template.render(context! {
            task => input.task.trim(),
            tools => (!input.tools.trim().is_empty()).then(|| input.tools.trim()),
            context => (!input.context.trim().is_empty()).then(|| input.context.trim()),
            chain => (!input.chain.trim().is_empty()).then(|| input.chain.trim()),
            lessons => (!input.lessons.trim().is_empty()).then(|| input.lessons.trim()),
            diff => (!input.diff.trim().is_empty()).then(|| input.diff.trim()),
            incoming => input.incoming.as_ref(),
        })?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
