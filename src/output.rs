use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::StriderError;
use crate::graph::types::VertexId;

/// Per-vertex terminal-visit counters, indexed by internal id and
/// bumped concurrently by compute workers.
pub struct Visits {
    counts: Vec<AtomicU32>,
}

impl Visits {
    pub fn new(nvertices: u32) -> Result<Self, StriderError> {
        let mut counts = Vec::new();
        counts
            .try_reserve_exact(nvertices as usize)
            .map_err(|_| StriderError::Oom("visit counters"))?;
        counts.extend((0..nvertices).map(|_| AtomicU32::new(0)));
        Ok(Self { counts })
    }

    pub fn bump(&self, v: VertexId) {
        self.counts[v as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, v: VertexId) -> u32 {
        self.counts[v as usize].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as u64)
            .sum()
    }

    /// Counts re-indexed by original vertex id via `order`
    /// (internal id -> original id).
    pub fn in_original_order(&self, order: &[VertexId]) -> Vec<u32> {
        let mut out = vec![0u32; self.counts.len()];
        for (internal, count) in self.counts.iter().enumerate() {
            out[order[internal] as usize] = count.load(Ordering::Relaxed);
        }
        out
    }
}

/// Write `visits.u32`: one little-endian u32 per vertex, original ids.
pub fn write_visits(path: &Path, counts: &[u32]) -> Result<(), StriderError> {
    let mut bytes = Vec::with_capacity(counts.len() * 4);
    for &c in counts {
        bytes.extend_from_slice(&c.to_le_bytes());
    }
    std::fs::write(path, bytes).map_err(|e| StriderError::io(path, e))
}

/// Write `top.tsv`: the `n` most-visited vertices, count descending,
/// vertex id ascending on ties.
pub fn write_top_tsv(path: &Path, counts: &[u32], n: usize) -> Result<(), StriderError> {
    let mut ranked: Vec<(u32, u32)> = counts
        .iter()
        .enumerate()
        .map(|(v, &c)| (v as u32, c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let file = std::fs::File::create(path).map_err(|e| StriderError::io(path, e))?;
    let mut w = std::io::BufWriter::new(file);
    for &(v, c) in ranked.iter().take(n) {
        writeln!(w, "{v}\t{c}").map_err(|e| StriderError::io(path, e))?;
    }
    w.flush().map_err(|e| StriderError::io(path, e))
}
