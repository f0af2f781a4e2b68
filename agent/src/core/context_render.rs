//! Deterministic rendering of selected code chunks.
//!
//! Turns a [`Selection`] into one numbered text section per file, pulling in
//! signature and block-header lines from an external structure resolver and
//! collapsing gaps into a single ellipsis marker. For fixed store state and
//! inputs two renders are byte-identical: iteration follows the selection
//! order and per-file line sets are ordered, never hash-ordered.

use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::core::store::{ChunkId, CodeContextStore, Selection};

/// Structural line sets for a chunk, as reported by the resolver.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    /// Signature lines of the enclosing class and/or function.
    pub signature_lines: Vec<u32>,
    /// Header lines of loop/conditional blocks containing a stored line.
    pub block_header_lines: Vec<u32>,
    /// Full body range of the enclosing function, when known.
    pub function_body: Option<(u32, u32)>,
}

/// An enclosing function located for a single line.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub class_name: String,
    pub function_name: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// External capability that locates structural lines in source files.
///
/// Actual source-structure analysis (tree-sitter or similar) lives outside
/// this crate; the engine only consumes these two lookups.
pub trait StructureResolver {
    /// Structural line sets for a stored line range.
    fn resolve(&self, file_path: &str, lines: &[u32]) -> Result<Structure>;

    /// The function enclosing `line`, if any is known.
    fn enclosing_function(&self, file_path: &str, line: u32) -> Result<Option<FunctionInfo>>;
}

/// Resolver that knows no structure. Rendering degrades to the stored lines
/// and whole-function chunks fall back to their registered range.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl StructureResolver for NullResolver {
    fn resolve(&self, _file_path: &str, _lines: &[u32]) -> Result<Structure> {
        Ok(Structure::default())
    }

    fn enclosing_function(&self, _file_path: &str, _line: u32) -> Result<Option<FunctionInfo>> {
        Ok(None)
    }
}

/// Read access to source file contents.
pub trait SourceReader {
    fn read(&self, file_path: &str) -> Result<String>;

    /// Drop any cached contents. Called between rounds, after actions may
    /// have edited the workspace.
    fn invalidate(&self) {}
}

/// Rendered context text plus the chunk order it was produced from.
///
/// Inline citations in model thoughts use 1-based indices into `order`.
#[derive(Debug, Clone)]
pub struct RenderedContext {
    pub text: String,
    pub order: Vec<ChunkId>,
}

/// Render the selection into per-file sections.
pub fn render_context(
    store: &CodeContextStore,
    selection: &Selection,
    resolver: &dyn StructureResolver,
    source: &dyn SourceReader,
) -> Result<RenderedContext> {
    let mut sections: Vec<String> = Vec::new();
    let mut order: Vec<ChunkId> = Vec::new();

    for file in &selection.files {
        let content = source
            .read(&file.file_path)
            .with_context(|| format!("read source {}", file.file_path))?;
        let file_lines: Vec<&str> = content.lines().collect();
        if file_lines.is_empty() {
            order.extend(file.chunks.iter().copied());
            continue;
        }

        let mut needed: BTreeSet<u32> = BTreeSet::new();
        let mut eof = false;
        for &id in &file.chunks {
            order.push(id);
            let chunk = store.chunk(id);
            eof |= chunk.eof();
            let key = chunk.key();
            let structure = resolver
                .resolve(&file.file_path, &key.lines)
                .with_context(|| format!("resolve structure for {}", file.file_path))?;
            needed.extend(structure.signature_lines.iter().copied());
            if key.whole_function {
                match structure.function_body {
                    Some((start, end)) => needed.extend(start..=end),
                    // No structure available: the registered range is the
                    // best approximation of the function body.
                    None => needed.extend(key.lines.iter().copied()),
                }
            } else {
                needed.extend(key.lines.iter().copied());
                needed.extend(structure.block_header_lines.iter().copied());
            }
        }
        if needed.is_empty() {
            continue;
        }

        let body = render_lines(&file_lines, &needed, eof);
        sections.push(format!("## File: `{}`\n{}", file.file_path, body));
    }

    Ok(RenderedContext {
        text: sections.join("\n\n"),
        order,
    })
}

/// Print the union of needed lines verbatim with line numbers, collapsing
/// each gap between non-adjacent runs into a single `...` marker.
fn render_lines(file_lines: &[&str], needed: &BTreeSet<u32>, eof: bool) -> String {
    let max_line = needed.iter().next_back().copied().unwrap_or(0);
    let width = max_line.to_string().len() + 1;
    let mut parts: Vec<String> = Vec::new();
    let mut prev: Option<u32> = None;
    for &line in needed {
        if line < 1 || line as usize > file_lines.len() {
            continue;
        }
        if let Some(p) = prev
            && line > p + 1
        {
            parts.push("...".to_string());
        }
        parts.push(format!(
            "{:>width$} {}",
            line,
            file_lines[line as usize - 1]
        ));
        prev = Some(line);
    }
    if eof {
        parts.push("  [EOF]".to_string());
    }
    parts.join("\n")
}
