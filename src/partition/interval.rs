//! Stage A: stream the edge list once into dense interval files.
//!
//! An interval holds `{out_degree, neighbors}` records (little-endian
//! u32, no vertex ids) for a contiguous vertex range, including
//! zero-degree records for id gaps, so stage B can address any vertex
//! after one sequential scan. Each interval is bounded by
//! `interval_bytes` and therefore fits in memory by construction.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StriderError;
use crate::graph::paths;
use crate::graph::types::VertexId;
use crate::partition::edge_list::EdgeReader;

/// One stage-A interval file covering `[first, end)`.
pub struct Interval {
    pub first: VertexId,
    pub end: VertexId,
    pub path: PathBuf,
}

struct IntervalWriter {
    input: PathBuf,
    interval_bytes: u64,
    intervals: Vec<Interval>,
    writer: Option<BufWriter<std::fs::File>>,
    path: PathBuf,
    first: VertexId,
    next: VertexId,
    written: u64,
}

impl IntervalWriter {
    /// Append the record for the next vertex in sequence.
    fn emit(&mut self, neighbors: &[VertexId]) -> Result<(), StriderError> {
        let rec_bytes = 4 + 4 * neighbors.len() as u64;
        if self.writer.is_some() && self.written + rec_bytes > self.interval_bytes {
            self.close_current()?;
        }
        if self.writer.is_none() {
            self.path = paths::interval_path(&self.input, self.intervals.len());
            let file =
                std::fs::File::create(&self.path).map_err(|e| StriderError::io(&self.path, e))?;
            self.writer = Some(BufWriter::new(file));
            self.first = self.next;
            self.written = 0;
        }
        let w = self.writer.as_mut().unwrap();
        w.write_all(&(neighbors.len() as u32).to_le_bytes())
            .map_err(|e| StriderError::io(&self.path, e))?;
        for &n in neighbors {
            w.write_all(&n.to_le_bytes())
                .map_err(|e| StriderError::io(&self.path, e))?;
        }
        self.written += rec_bytes;
        self.next += 1;
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), StriderError> {
        if let Some(mut w) = self.writer.take() {
            w.flush().map_err(|e| StriderError::io(&self.path, e))?;
            self.intervals.push(Interval {
                first: self.first,
                end: self.next,
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// Build interval files for `input` under `<input>_invl/`.
pub fn build_intervals(
    input: &Path,
    nvertices: VertexId,
    interval_bytes: u64,
) -> Result<Vec<Interval>, StriderError> {
    let dir = paths::interval_dir(input);
    std::fs::create_dir_all(&dir).map_err(|e| StriderError::io(&dir, e))?;

    let mut out = IntervalWriter {
        input: input.to_path_buf(),
        interval_bytes,
        intervals: Vec::new(),
        writer: None,
        path: PathBuf::new(),
        first: 0,
        next: 0,
        written: 0,
    };

    let mut reader = EdgeReader::open(input, nvertices)?;
    let mut cur: VertexId = 0;
    let mut neighbors: Vec<VertexId> = Vec::new();
    while let Some((src, dst)) = reader.next_edge()? {
        if src < cur {
            return Err(StriderError::BadInput(format!(
                "{}: edge list not sorted by source (saw {src} after {cur})",
                input.display()
            )));
        }
        if src > cur {
            // Flush the accumulating vertex, then pad the id gap with
            // zero-degree records.
            out.emit(&neighbors)?;
            neighbors.clear();
            while out.next < src {
                out.emit(&[])?;
            }
            cur = src;
        }
        neighbors.push(dst);
    }
    // Flush the last vertex and pad the tail so intervals cover
    // [0, nvertices) exactly.
    out.emit(&neighbors)?;
    while out.next < nvertices {
        out.emit(&[])?;
    }
    out.close_current()?;

    Ok(out.intervals)
}

/// An interval loaded into memory, addressable by vertex id.
pub struct LoadedInterval {
    first: VertexId,
    /// Byte offset of each record, one trailing entry at file size.
    offs: Vec<u32>,
    bytes: Vec<u8>,
}

impl LoadedInterval {
    pub fn load(interval: &Interval) -> Result<Self, StriderError> {
        let bytes =
            std::fs::read(&interval.path).map_err(|e| StriderError::io(&interval.path, e))?;
        let nrec = (interval.end - interval.first) as usize;
        let mut offs = Vec::with_capacity(nrec + 1);
        let mut off = 0usize;
        for _ in 0..nrec {
            offs.push(off as u32);
            let Some(raw) = bytes.get(off..off + 4) else {
                return Err(StriderError::BadInput(format!(
                    "{}: truncated interval",
                    interval.path.display()
                )));
            };
            let degree = u32::from_le_bytes(raw.try_into().unwrap()) as usize;
            off += 4 + 4 * degree;
        }
        if off != bytes.len() {
            return Err(StriderError::BadInput(format!(
                "{}: interval size mismatch",
                interval.path.display()
            )));
        }
        offs.push(off as u32);
        Ok(Self {
            first: interval.first,
            offs,
            bytes,
        })
    }

    /// Out-degree and raw neighbor bytes (little-endian u32 each).
    pub fn record(&self, v: VertexId) -> (u32, &[u8]) {
        let i = (v - self.first) as usize;
        let beg = self.offs[i] as usize;
        let end = self.offs[i + 1] as usize;
        let degree = u32::from_le_bytes(self.bytes[beg..beg + 4].try_into().unwrap());
        (degree, &self.bytes[beg + 4..end])
    }
}

/// Keeps the most recently touched interval resident, reloading on
/// misses. BFS order jumps between intervals, so this is the working
/// set bound for stage B.
pub struct IntervalCache<'a> {
    intervals: &'a [Interval],
    cur: Option<(usize, LoadedInterval)>,
}

impl<'a> IntervalCache<'a> {
    pub fn new(intervals: &'a [Interval]) -> Self {
        Self {
            intervals,
            cur: None,
        }
    }

    fn locate(&self, v: VertexId) -> usize {
        self.intervals.partition_point(|ivl| ivl.end <= v)
    }

    pub fn record(&mut self, v: VertexId) -> Result<(u32, &[u8]), StriderError> {
        let want = self.locate(v);
        if self.cur.as_ref().map(|(i, _)| *i) != Some(want) {
            let loaded = LoadedInterval::load(&self.intervals[want])?;
            self.cur = Some((want, loaded));
        }
        Ok(self.cur.as_ref().unwrap().1.record(v))
    }
}
