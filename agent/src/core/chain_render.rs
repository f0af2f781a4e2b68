//! Text rendering of the reasoning chain and accumulated lessons.

use crate::tree::{NodeId, OperationNode, ReasoningTree};

/// Render the accepted chain root to frontier, one block per operation.
pub fn render_chain(tree: &ReasoningTree) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for (position, id) in tree.chain().into_iter().enumerate() {
        blocks.push(render_operation(tree.node(id), position + 1));
    }
    blocks.join("\n\n")
}

fn render_operation(node: &OperationNode, position: usize) -> String {
    let mut buf = format!("### Operation {position}\n");
    if let Some(property) = node.property {
        buf.push_str(&format!("[property] {}\n", property.as_str()));
    }
    buf.push_str(&format!("[thoughts]\n{}\n", node.thought));
    buf.push_str(&format!("[action]\n{}\n", node.action));
    if let Some(observation) = &node.observation {
        buf.push_str(&format!("[observation]\n{observation}\n"));
    }
    if !node.summary.is_empty() {
        buf.push_str(&format!("[summary]\n{}\n", node.summary));
    }
    buf.trim_end().to_string()
}

/// Render every lesson learned so far: the chain nodes' own lessons plus the
/// lessons of each rejected attempt, grouped under the node that owns it.
pub fn render_lessons(tree: &ReasoningTree) -> String {
    let mut blocks: Vec<String> = Vec::new();
    // The sentinel root owns rejections made before the first accepted
    // operation, so it participates with position 0.
    let owners: Vec<(usize, NodeId)> = std::iter::once((0, NodeId::ROOT))
        .chain(tree.chain().into_iter().enumerate().map(|(i, id)| (i + 1, id)))
        .collect();

    for (position, id) in owners {
        let node = tree.node(id);
        if position > 0 && !node.lessons.is_empty() {
            blocks.push(format!("Lessons from operation {position}:\n{}", node.lessons));
        }
        for (attempt, &rejected_id) in node.invalid_ops.iter().enumerate() {
            let rejected = tree.node(rejected_id);
            if rejected.lessons.is_empty() {
                continue;
            }
            let owner = if position == 0 {
                "the starting point".to_string()
            } else {
                format!("operation {position}")
            };
            blocks.push(format!(
                "Rejected attempt {} under {owner}:\n{}",
                attempt + 1,
                rejected.lessons
            ));
        }
    }
    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reply::ActionProperty;
    use crate::tree::NodeDraft;

    fn draft(thought: &str, action: &str) -> NodeDraft {
        NodeDraft {
            thought: thought.to_string(),
            action: action.to_string(),
            property: Some(ActionProperty::Deterministic),
            ..NodeDraft::default()
        }
    }

    /// Chain blocks appear in root to frontier order with stable numbering.
    #[test]
    fn chain_renders_in_order() {
        let mut tree = ReasoningTree::new();
        let a = tree.propose(NodeId::ROOT, draft("list files", "ls"));
        tree.set_observation(a, "[returncode: 0]\napp.py".to_string());
        tree.finalize(a, true, "saw app.py".into(), String::new())
            .expect("finalize");
        let b = tree.propose(a, draft("inspect app", "cat app.py"));
        tree.set_observation(b, "[returncode: 0]\nprint()".to_string());
        tree.finalize(b, true, String::new(), String::new())
            .expect("finalize");

        let text = render_chain(&tree);
        let first = text.find("### Operation 1").expect("first block");
        let second = text.find("### Operation 2").expect("second block");
        assert!(first < second);
        assert!(text.contains("[action]\nls"));
        assert!(text.contains("[observation]\n[returncode: 0]\napp.py"));
        assert!(text.contains("[summary]\nsaw app.py"));
    }

    /// Lessons come from both accepted operations and rejected attempts,
    /// attributed to the owning node.
    #[test]
    fn lessons_include_rejected_attempts() {
        let mut tree = ReasoningTree::new();
        let early_bad = tree.propose(NodeId::ROOT, draft("guess", "true"));
        tree.finalize(early_bad, false, String::new(), "guessing wastes a step".into())
            .expect("finalize");
        let a = tree.propose(NodeId::ROOT, draft("list", "ls"));
        tree.finalize(a, true, String::new(), "start from the entrypoint".into())
            .expect("finalize");
        let bad = tree.propose(a, draft("poke", "false"));
        tree.finalize(bad, false, String::new(), "poking blind fails".into())
            .expect("finalize");

        let text = render_lessons(&tree);
        assert!(text.contains("Rejected attempt 1 under the starting point:\nguessing wastes a step"));
        assert!(text.contains("Lessons from operation 1:\nstart from the entrypoint"));
        assert!(text.contains("Rejected attempt 1 under operation 1:\npoking blind fails"));
    }

    #[test]
    fn empty_tree_renders_empty_text() {
        let tree = ReasoningTree::new();
        assert!(render_chain(&tree).is_empty());
        assert!(render_lessons(&tree).is_empty());
    }
}
