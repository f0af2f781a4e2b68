//! Extraction of inline code citations from model thoughts.
//!
//! Thoughts may cite context chunks as `[index](file_path:line)`, where
//! `index` is the 1-based position of the chunk in the rendered code context
//! the model was shown. Citation counts feed the `referred` activity of the
//! store, so cited chunks decay slower than merely-rendered ones.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\]\(([^():\s]+):(\d+)\)").expect("citation pattern should compile")
});

/// Count citations per chunk index.
///
/// Malformed citations are ignored; an index of 0 is out of range and
/// dropped. The map is ordered so downstream consumption is deterministic.
pub fn citation_counts(thoughts: &str) -> BTreeMap<usize, u32> {
    let mut counts = BTreeMap::new();
    for caps in CITATION_RE.captures_iter(thoughts) {
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        if index == 0 {
            continue;
        }
        *counts.entry(index).or_insert(0) += 1;
    }
    counts
}
