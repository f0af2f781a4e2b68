//! Filesystem source reader with a per-run cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::context_render::SourceReader;

/// Reads source files relative to a workspace root, caching contents.
///
/// The cache makes repeated renders of the same selection cheap and keeps one
/// round internally consistent even if a file changes on disk mid-round.
#[derive(Debug)]
pub struct FsSourceReader {
    root: PathBuf,
    cache: RefCell<HashMap<String, String>>,
}

impl FsSourceReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

}

impl SourceReader for FsSourceReader {
    fn read(&self, file_path: &str) -> Result<String> {
        if let Some(contents) = self.cache.borrow().get(file_path) {
            return Ok(contents.clone());
        }
        let full = self.root.join(file_path);
        let contents = fs::read_to_string(&full)
            .with_context(|| format!("read source {}", full.display()))?;
        self.cache
            .borrow_mut()
            .insert(file_path.to_string(), contents.clone());
        Ok(contents)
    }

    fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }
}
