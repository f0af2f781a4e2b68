//! Code context store with decayed referral scoring.
//!
//! The store owns every [`CodeChunk`] loaded during a run together with its
//! per-step activity history. Activity is recorded exactly once per completed
//! operation for every registered chunk, so the `accessed` and `referred`
//! sequences of all chunks always have length `recorded_steps`. Scores decay
//! geometrically with age, which is what lets stale context fall out of the
//! prompt.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::ConsistencyError;

/// Identity of a code chunk.
///
/// Two loads of the same slice of source are the same chunk: identity covers
/// the path, the enclosing class/function names, the whole-function flag and
/// the exact (sorted, deduplicated) line set. Empty name strings mean "no
/// enclosing class/function", matching how chunks without structure
/// information are registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub file_path: String,
    pub class_name: String,
    pub function_name: String,
    pub whole_function: bool,
    pub lines: Vec<u32>,
}

impl ChunkKey {
    /// Build a key with `lines` normalized to sorted ascending order without
    /// duplicates.
    pub fn new(
        file_path: impl Into<String>,
        class_name: impl Into<String>,
        function_name: impl Into<String>,
        whole_function: bool,
        mut lines: Vec<u32>,
    ) -> Self {
        lines.sort_unstable();
        lines.dedup();
        Self {
            file_path: file_path.into(),
            class_name: class_name.into(),
            function_name: function_name.into(),
            whole_function,
            lines,
        }
    }

    /// Key for a bare line range with no structure information.
    pub fn for_lines(file_path: impl Into<String>, start: u32, end: u32) -> Self {
        Self::new(file_path, "", "", false, (start..=end).collect())
    }
}

/// Handle into the store's chunk arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(usize);

impl ChunkId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered chunk and its activity history.
#[derive(Debug, Clone)]
pub struct CodeChunk {
    key: ChunkKey,
    /// The requested range ran past the end of the file.
    eof: bool,
    /// 0/1 per recorded step: was the chunk touched by that operation.
    accessed: Vec<u8>,
    /// Citation count per recorded step.
    referred: Vec<u32>,
    /// Memoized score, keyed by the step it was computed at.
    cached_score: Option<(u64, f64)>,
}

impl CodeChunk {
    pub fn key(&self) -> &ChunkKey {
        &self.key
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn accessed(&self) -> &[u8] {
        &self.accessed
    }

    pub fn referred(&self) -> &[u32] {
        &self.referred
    }

    /// Smallest stored line number, used for in-file ordering.
    pub fn min_line(&self) -> u32 {
        self.key.lines.first().copied().unwrap_or(u32::MAX)
    }
}

/// Decay scoring parameters.
///
/// `score = sum over steps i of (alpha * accessed_i + beta * referred_i) *
/// gamma^(age)` where age counts steps back from the most recent one.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub threshold: f64,
}

/// Chunks selected for rendering, grouped by file.
///
/// Files appear in first-registration order; chunks within a file are sorted
/// by ascending minimum line (ties broken by registration order), so the same
/// store state always yields the same selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub files: Vec<FileSelection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub file_path: String,
    pub chunks: Vec<ChunkId>,
}

/// Owner of all code chunks and their activity vectors.
#[derive(Debug, Default)]
pub struct CodeContextStore {
    chunks: Vec<CodeChunk>,
    by_key: HashMap<ChunkKey, ChunkId>,
    recorded_steps: u64,
}

impl CodeContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps recorded so far.
    pub fn recorded_steps(&self) -> u64 {
        self.recorded_steps
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, id: ChunkId) -> &CodeChunk {
        &self.chunks[id.0]
    }

    /// Ids of all registered chunks in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        (0..self.chunks.len()).map(ChunkId)
    }

    /// Return the chunk for `key`, registering it if unseen.
    ///
    /// A chunk registered after k steps starts with k leading zeros in both
    /// activity sequences, keeping the uniform-window invariant. Re-registering
    /// an existing identity only widens its EOF flag.
    pub fn register_or_get(&mut self, key: ChunkKey, eof: bool) -> ChunkId {
        if let Some(&id) = self.by_key.get(&key) {
            self.chunks[id.0].eof |= eof;
            return id;
        }
        let id = ChunkId(self.chunks.len());
        let backfill = self.recorded_steps as usize;
        self.chunks.push(CodeChunk {
            key: key.clone(),
            eof,
            accessed: vec![0; backfill],
            referred: vec![0; backfill],
            cached_score: None,
        });
        self.by_key.insert(key, id);
        id
    }

    /// Record one completed operation's activity for every registered chunk.
    ///
    /// `step` must be exactly one past the last recorded step; chunks in
    /// `touched` get `accessed = 1`, everything else 0, and every chunk gets
    /// its entry from `referred_counts` (default 0). Calling out of order or
    /// with unknown ids is a caller bug and fails with [`ConsistencyError`].
    pub fn record_step(
        &mut self,
        step: u64,
        touched: &[ChunkId],
        referred_counts: &[(ChunkId, u32)],
    ) -> Result<(), ConsistencyError> {
        if step != self.recorded_steps + 1 {
            return Err(ConsistencyError::StepOutOfOrder {
                expected: self.recorded_steps + 1,
                got: step,
            });
        }
        for id in touched.iter().chain(referred_counts.iter().map(|(id, _)| id)) {
            if id.0 >= self.chunks.len() {
                return Err(ConsistencyError::UnknownChunk(id.0));
            }
        }
        let referred: HashMap<ChunkId, u32> = referred_counts
            .iter()
            .fold(HashMap::new(), |mut acc, &(id, n)| {
                *acc.entry(id).or_insert(0) += n;
                acc
            });
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            let id = ChunkId(i);
            chunk.accessed.push(u8::from(touched.contains(&id)));
            chunk.referred.push(referred.get(&id).copied().unwrap_or(0));
            debug_assert_eq!(chunk.accessed.len() as u64, step);
            debug_assert_eq!(chunk.referred.len() as u64, step);
        }
        self.recorded_steps = step;
        Ok(())
    }

    /// Decayed score of a chunk over the full step window.
    ///
    /// Pure function of stored state and `params`; the memoized value kept by
    /// [`select`](Self::select) is only a cache keyed by the current step.
    pub fn score(&self, id: ChunkId, params: &ScoreParams) -> f64 {
        let chunk = &self.chunks[id.0];
        let m = self.recorded_steps as usize;
        let mut total = 0.0;
        for i in 0..m {
            let weight = params.alpha * f64::from(chunk.accessed[i])
                + params.beta * f64::from(chunk.referred[i]);
            total += weight * params.gamma.powi((m - 1 - i) as i32);
        }
        total
    }

    /// Chunks scoring strictly above the threshold, grouped for rendering.
    pub fn select(&mut self, params: &ScoreParams) -> Selection {
        let step = self.recorded_steps;
        let mut kept: Vec<ChunkId> = Vec::new();
        for i in 0..self.chunks.len() {
            let id = ChunkId(i);
            let score = match self.chunks[i].cached_score {
                Some((at, value)) if at == step => value,
                _ => {
                    let value = self.score(id, params);
                    self.chunks[i].cached_score = Some((step, value));
                    value
                }
            };
            if score > params.threshold {
                kept.push(id);
            }
        }

        let mut files: Vec<FileSelection> = Vec::new();
        for id in kept {
            let path = &self.chunks[id.0].key.file_path;
            match files.iter_mut().find(|f| &f.file_path == path) {
                Some(file) => file.chunks.push(id),
                None => files.push(FileSelection {
                    file_path: path.clone(),
                    chunks: vec![id],
                }),
            }
        }
        for file in &mut files {
            file.chunks
                .sort_by_key(|&id| (self.chunks[id.0].min_line(), id));
        }
        Selection { files }
    }
}
