use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::StriderError;
use crate::graph::types::VertexId;

/// Line-oriented edge-list reader.
///
/// Accepts `src dst` per line (whitespace separated; anything after
/// the second field, such as an edge weight, is ignored). Lines
/// starting with `#` or `%` are comments; self-loops are dropped.
pub struct EdgeReader {
    path: PathBuf,
    lines: std::io::Lines<BufReader<std::fs::File>>,
    line_no: u64,
    nvertices: VertexId,
}

impl EdgeReader {
    pub fn open(path: &Path, nvertices: VertexId) -> Result<Self, StriderError> {
        let file = std::fs::File::open(path).map_err(|e| StriderError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            nvertices,
        })
    }

    fn bad(&self, what: impl std::fmt::Display) -> StriderError {
        StriderError::BadInput(format!(
            "{}:{}: {what}",
            self.path.display(),
            self.line_no
        ))
    }

    fn parse_field(&self, token: Option<&str>, name: &str) -> Result<VertexId, StriderError> {
        let token = token.ok_or_else(|| self.bad(format_args!("missing {name} field")))?;
        let id: VertexId = token
            .parse()
            .map_err(|_| self.bad(format_args!("non-numeric {name} {token:?}")))?;
        if id >= self.nvertices {
            return Err(self.bad(format_args!(
                "{name} {id} out of range [0, {})",
                self.nvertices
            )));
        }
        Ok(id)
    }

    /// The next edge, or `None` at end of input.
    pub fn next_edge(&mut self) -> Result<Option<(VertexId, VertexId)>, StriderError> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|e| StriderError::io(&self.path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let src = self.parse_field(fields.next(), "source")?;
            let dst = self.parse_field(fields.next(), "destination")?;
            if src == dst {
                continue;
            }
            return Ok(Some((src, dst)));
        }
    }
}
