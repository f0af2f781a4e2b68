//! Strict grammar parser for structured model replies.
//!
//! A reply is a closed set of tags in fixed document order:
//! `<decision>`, `<summary>`, `<lessons>` (judgment of the incoming
//! operation, present exactly when one exists), then `<property>`,
//! `<thoughts>`, `<action>` (always). Each tag appears at most once;
//! duplicates, tags that are not allowed in the current state, or tags out
//! of order are a [`ParseError`] rather than a best-effort partial parse.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::ParseError;

/// Which prompt the reply answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No finalized operation yet; the reply only proposes.
    FirstStep,
    /// An incoming unfinalized operation awaits judgment.
    Steady,
}

/// Model-declared property of the proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionProperty {
    Deterministic,
    NonDeterministic,
}

impl ActionProperty {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "deterministic" => Some(Self::Deterministic),
            "non-deterministic" => Some(Self::NonDeterministic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::NonDeterministic => "non-deterministic",
        }
    }
}

/// Judgment of the incoming operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Keep,
    Drop,
}

impl Decision {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "keep" => Some(Self::Keep),
            "drop" => Some(Self::Drop),
            _ => None,
        }
    }
}

/// Reply to a first-step prompt: a proposal only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstStepReply {
    pub property: ActionProperty,
    pub thoughts: String,
    pub action: String,
}

/// Reply to a steady-state prompt: judgment plus a new proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteadyReply {
    pub decision: Decision,
    pub summary: String,
    pub lessons: String,
    pub property: ActionProperty,
    pub thoughts: String,
    pub action: String,
}

/// Parsed structured reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    FirstStep(FirstStepReply),
    Steady(SteadyReply),
}

impl Reply {
    pub fn property(&self) -> ActionProperty {
        match self {
            Self::FirstStep(r) => r.property,
            Self::Steady(r) => r.property,
        }
    }

    pub fn thoughts(&self) -> &str {
        match self {
            Self::FirstStep(r) => &r.thoughts,
            Self::Steady(r) => &r.thoughts,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::FirstStep(r) => &r.action,
            Self::Steady(r) => &r.action,
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        match self {
            Self::FirstStep(_) => None,
            Self::Steady(r) => Some(r.decision),
        }
    }
}

/// Canonical tag order. The first three are only valid in steady state.
const TAGS: [&str; 6] = [
    "decision", "summary", "lessons", "property", "thoughts", "action",
];
const STEADY_ONLY: usize = 3;

static TAG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    TAGS.iter()
        .map(|tag| {
            Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).expect("tag pattern should compile")
        })
        .collect()
});

/// Parse a raw reply against the grammar for the given state.
pub fn parse_reply(raw: &str, state: LoopState) -> Result<Reply, ParseError> {
    // One (start_offset, body) per tag, in canonical order.
    let mut found: [Option<(usize, String)>; 6] = Default::default();
    for (i, (tag, pattern)) in TAGS.iter().zip(TAG_PATTERNS.iter()).enumerate() {
        let mut matches = pattern.captures_iter(raw);
        if let Some(caps) = matches.next() {
            if matches.next().is_some() {
                return Err(ParseError::DuplicateTag(tag));
            }
            let whole = caps.get(0).expect("match group 0");
            let body = caps.get(1).expect("capture group 1").as_str().trim();
            found[i] = Some((whole.start(), body.to_string()));
        } else if raw.contains(&format!("<{tag}>")) {
            return Err(ParseError::UnclosedTag(tag));
        }
    }

    // Tags must appear in canonical document order.
    let mut last_offset = 0usize;
    for (i, entry) in found.iter().enumerate() {
        if let Some((offset, _)) = entry {
            if *offset < last_offset {
                return Err(ParseError::TagOutOfOrder(TAGS[i]));
            }
            last_offset = *offset;
        }
    }

    if state == LoopState::FirstStep {
        for (i, entry) in found.iter().take(STEADY_ONLY).enumerate() {
            if entry.is_some() {
                return Err(ParseError::UnexpectedTag(TAGS[i]));
            }
        }
    }

    let body = |i: usize| -> Result<String, ParseError> {
        found[i]
            .as_ref()
            .map(|(_, body)| body.clone())
            .ok_or(ParseError::MissingTag(TAGS[i]))
    };

    let property_raw = body(3)?;
    let property = ActionProperty::parse(&property_raw.to_lowercase()).ok_or_else(|| {
        ParseError::InvalidValue {
            tag: "property",
            value: property_raw.clone(),
        }
    })?;
    let thoughts = body(4)?;
    let action = strip_backticks(&body(5)?);
    if action.is_empty() {
        return Err(ParseError::EmptyAction);
    }

    match state {
        LoopState::FirstStep => Ok(Reply::FirstStep(FirstStepReply {
            property,
            thoughts,
            action,
        })),
        LoopState::Steady => {
            let decision_raw = body(0)?;
            let decision = Decision::parse(&decision_raw.to_lowercase()).ok_or_else(|| {
                ParseError::InvalidValue {
                    tag: "decision",
                    value: decision_raw.clone(),
                }
            })?;
            Ok(Reply::Steady(SteadyReply {
                decision,
                summary: body(1)?,
                lessons: body(2)?,
                property,
                thoughts,
                action,
            }))
        }
    }
}

/// Strip a surrounding code fence or single backticks from an action body.
fn strip_backticks(text: &str) -> String {
    static FENCE_OPEN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^```\w*\n?").expect("fence pattern"));
    static FENCE_CLOSE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n?```$").expect("fence pattern"));

    let s = text.trim();
    if s.starts_with("```") {
        let s = FENCE_OPEN.replace(s, "");
        let s = FENCE_CLOSE.replace(&s, "");
        return s.trim().to_string();
    }
    if s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        return s[1..s.len() - 1].trim().to_string();
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPOSAL: &str =
        "<property>deterministic</property><thoughts>x</thoughts><action>ls</action>";

    /// A decision-less reply parses only in first-step state; the same text
    /// in steady state is a parse error.
    #[test]
    fn proposal_only_reply_is_state_dependent() {
        let reply = parse_reply(PROPOSAL, LoopState::FirstStep).expect("first step");
        assert_eq!(
            reply,
            Reply::FirstStep(FirstStepReply {
                property: ActionProperty::Deterministic,
                thoughts: "x".to_string(),
                action: "ls".to_string(),
            })
        );
        let err = parse_reply(PROPOSAL, LoopState::Steady).expect_err("steady");
        assert_eq!(err, ParseError::MissingTag("decision"));
    }

    #[test]
    fn steady_reply_parses_all_tags() {
        let raw = "<decision>drop</decision><summary>s</summary><lessons>l</lessons>\
                   <property>non-deterministic</property><thoughts>t</thoughts>\
                   <action>cargo test</action>";
        let reply = parse_reply(raw, LoopState::Steady).expect("parse");
        let Reply::Steady(steady) = reply else {
            panic!("expected steady reply");
        };
        assert_eq!(steady.decision, Decision::Drop);
        assert_eq!(steady.summary, "s");
        assert_eq!(steady.lessons, "l");
        assert_eq!(steady.property, ActionProperty::NonDeterministic);
        assert_eq!(steady.action, "cargo test");
    }

    /// Judgment tags are unexpected when no incoming operation exists.
    #[test]
    fn first_step_rejects_judgment_tags() {
        let raw = format!("<decision>keep</decision>{PROPOSAL}");
        let err = parse_reply(&raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(err, ParseError::UnexpectedTag("decision"));
    }

    #[test]
    fn duplicate_tag_is_an_error() {
        let raw = format!("{PROPOSAL}<action>pwd</action>");
        let err = parse_reply(&raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(err, ParseError::DuplicateTag("action"));
    }

    #[test]
    fn out_of_order_tags_are_an_error() {
        let raw = "<thoughts>x</thoughts><property>deterministic</property><action>ls</action>";
        let err = parse_reply(raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(err, ParseError::TagOutOfOrder("thoughts"));
    }

    #[test]
    fn unclosed_tag_is_an_error() {
        let raw = "<property>deterministic</property><thoughts>x</thoughts><action>ls";
        let err = parse_reply(raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(err, ParseError::UnclosedTag("action"));
    }

    #[test]
    fn invalid_property_value_is_an_error() {
        let raw = "<property>random</property><thoughts>x</thoughts><action>ls</action>";
        let err = parse_reply(raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(
            err,
            ParseError::InvalidValue {
                tag: "property",
                value: "random".to_string()
            }
        );
    }

    /// Code fences around the action are stripped; multi-line bodies survive.
    #[test]
    fn action_backticks_are_stripped() {
        let raw = "<property>deterministic</property><thoughts>x</thoughts>\
                   <action>```bash\ngrep -rn foo src\nwc -l out.txt\n```</action>";
        let reply = parse_reply(raw, LoopState::FirstStep).expect("parse");
        assert_eq!(reply.action(), "grep -rn foo src\nwc -l out.txt");

        let raw = "<property>deterministic</property><thoughts>x</thoughts><action>`ls`</action>";
        let reply = parse_reply(raw, LoopState::FirstStep).expect("parse");
        assert_eq!(reply.action(), "ls");
    }

    #[test]
    fn empty_action_is_an_error() {
        let raw = "<property>deterministic</property><thoughts>x</thoughts><action>```\n```</action>";
        let err = parse_reply(raw, LoopState::FirstStep).expect_err("parse");
        assert_eq!(err, ParseError::EmptyAction);
    }

    /// Prose around the tags is ignored as long as the grammar holds.
    #[test]
    fn surrounding_prose_is_tolerated() {
        let raw = format!("Here is my plan.\n{PROPOSAL}\nThanks.");
        assert!(parse_reply(&raw, LoopState::FirstStep).is_ok());
    }
}
