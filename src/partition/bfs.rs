//! Stage B ordering: BFS over the intervals, always expanding the
//! numerically smallest frontier vertex, restarting from the lowest
//! unvisited vertex when the frontier drains. Every vertex is visited
//! exactly once, so the traversal terminates and its emission order is
//! a permutation of `[0, V)`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::StriderError;
use crate::graph::types::VertexId;
use crate::partition::interval::{Interval, IntervalCache};

/// BFS emission order: `order[rank] = original id`.
pub fn bfs_order(
    intervals: &[Interval],
    nvertices: VertexId,
) -> Result<Vec<VertexId>, StriderError> {
    let mut visited = Vec::new();
    visited
        .try_reserve_exact(nvertices as usize)
        .map_err(|_| StriderError::Oom("BFS visited bitmap"))?;
    visited.resize(nvertices as usize, false);

    let mut order = Vec::new();
    order
        .try_reserve_exact(nvertices as usize)
        .map_err(|_| StriderError::Oom("BFS order"))?;

    let mut cache = IntervalCache::new(intervals);
    let mut frontier: BinaryHeap<Reverse<VertexId>> = BinaryHeap::new();
    let mut restart: VertexId = 0;

    while order.len() < nvertices as usize {
        // New BFS component from the lowest unvisited vertex.
        while visited[restart as usize] {
            restart += 1;
        }
        frontier.push(Reverse(restart));

        while let Some(Reverse(u)) = frontier.pop() {
            if visited[u as usize] {
                continue;
            }
            visited[u as usize] = true;
            order.push(u);

            let (degree, neighbor_bytes) = cache.record(u)?;
            for i in 0..degree as usize {
                let raw = &neighbor_bytes[4 * i..4 * i + 4];
                let to = u32::from_le_bytes(raw.try_into().unwrap());
                if !visited[to as usize] {
                    frontier.push(Reverse(to));
                }
            }
        }
    }

    Ok(order)
}
