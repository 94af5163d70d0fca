mod common;

use std::collections::HashMap;
use std::path::Path;

use strider::graph::paths;
use strider::{partition, PartitionParams, StriderError};

use common::{edges_file, raw_file, read_block_records, read_order};

fn params(nvertices: u32) -> PartitionParams {
    PartitionParams {
        nvertices,
        block_bytes: 40 * 1024 * 1024,
        interval_bytes: 40 * 1024 * 1024,
        chunk_bytes: 2 * 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// Block layout
// ---------------------------------------------------------------------------

#[test]
fn path_graph_produces_one_well_formed_block() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "path.txt", &[(0, 1), (1, 2), (2, 3)]);

    let manifest = partition(&input, &params(4)).unwrap();
    assert_eq!(manifest.nvertices, 4);
    assert_eq!(manifest.nblocks, 1);
    assert_eq!(manifest.blocks[0].first_vertex, 0);
    assert_eq!(manifest.blocks[0].end_vertex, 4);

    let dir = paths::block_dir(&input);
    let records = read_block_records(&dir, 0);
    assert_eq!(
        records,
        vec![
            (0, vec![1]),
            (1, vec![2]),
            (2, vec![3]),
            (3, vec![]),
        ]
    );

    // Record sizes sum to the file size and the manifest agrees.
    let file_len = std::fs::metadata(paths::block_adj_path(&dir, 0)).unwrap().len();
    assert_eq!(file_len, 3 * 12 + 8);
    assert_eq!(manifest.blocks[0].bytes, file_len);

    // block_of is total and points at block 0 for every vertex.
    let block_of = std::fs::read(paths::block_of_path(&dir)).unwrap();
    assert_eq!(block_of, vec![0u8; 4]);

    // Begin-position sidecar: cumulative offsets ending at file size.
    let idx = std::fs::read(paths::block_idx_path(&dir, 0)).unwrap();
    let offs: Vec<u64> = idx
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(offs, vec![0, 12, 24, 36, 44]);

    // Stage-A scaffolding is cleaned up.
    assert!(!paths::interval_dir(&input).exists());
}

#[test]
fn id_gaps_become_zero_degree_records() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "gaps.txt", &[(0, 2), (4, 0)]);

    partition(&input, &params(6)).unwrap();
    let dir = paths::block_dir(&input);
    let records = read_block_records(&dir, 0);
    // BFS: 0 -> 2, then restart at 1, 3, then 4 -> 0 (visited), 5.
    let vids: Vec<u32> = records.iter().map(|(v, _)| *v).collect();
    assert_eq!(vids, vec![0, 1, 2, 3, 4, 5]);
    let total_neighbors: usize = records.iter().map(|(_, n)| n.len()).sum();
    assert_eq!(total_neighbors, 2);
}

#[test]
fn bfs_expands_smallest_frontier_vertex_first() {
    let tmp = tempfile::tempdir().unwrap();
    // 0 -> {5, 2}, 5 -> 1; vertices 3, 4 isolated.
    let input = edges_file(tmp.path(), "bfs.txt", &[(0, 5), (0, 2), (5, 1)]);

    partition(&input, &params(6)).unwrap();
    let dir = paths::block_dir(&input);
    assert_eq!(read_order(&dir), vec![0, 2, 5, 1, 3, 4]);

    // Adjacency is rewritten into emission-rank ids, preserving the
    // input's neighbor order: 0 -> {5, 2} becomes 0 -> {2, 1}.
    let records = read_block_records(&dir, 0);
    assert_eq!(records[0], (0, vec![2, 1]));
}

#[test]
fn small_blocks_tile_the_vertex_range() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (0..63).map(|v| (v, v + 1)).collect();
    let input = edges_file(tmp.path(), "chain.txt", &edges);

    let manifest = partition(
        &input,
        &PartitionParams {
            block_bytes: 120,
            ..params(64)
        },
    )
    .unwrap();
    assert!(manifest.nblocks > 1, "expected multiple blocks");

    let mut next = 0u32;
    for (k, entry) in manifest.blocks.iter().enumerate() {
        assert_eq!(entry.index, k as u32);
        assert_eq!(entry.first_vertex, next);
        assert!(entry.end_vertex > entry.first_vertex);
        assert!(entry.bytes <= 120);
        next = entry.end_vertex;
    }
    assert_eq!(next, 64);

    let dir = paths::block_dir(&input);
    let block_of = std::fs::read(paths::block_of_path(&dir)).unwrap();
    for (v, &k) in block_of.iter().enumerate() {
        let entry = &manifest.blocks[k as usize];
        assert!(
            (v as u32) >= entry.first_vertex && (v as u32) < entry.end_vertex,
            "vertex {v} outside its block range"
        );
    }
}

// ---------------------------------------------------------------------------
// Input handling
// ---------------------------------------------------------------------------

#[test]
fn comments_and_self_loops_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let input = raw_file(
        tmp.path(),
        "noisy.txt",
        &[
            "# a comment".into(),
            "% another".into(),
            "".into(),
            "0 0".into(),
            "0 1".into(),
            "1 1".into(),
            "1 2".into(),
        ],
    );

    partition(&input, &params(3)).unwrap();
    let records = read_block_records(&paths::block_dir(&input), 0);
    assert_eq!(records, vec![(0, vec![1]), (1, vec![2]), (2, vec![])]);
}

#[test]
fn non_numeric_token_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let input = raw_file(tmp.path(), "bad.txt", &["0 1".into(), "1 x".into()]);
    let err = partition(&input, &params(3)).unwrap_err();
    assert!(matches!(err, StriderError::BadInput(_)), "got {err}");
}

#[test]
fn missing_field_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let input = raw_file(tmp.path(), "short.txt", &["0 1".into(), "2".into()]);
    let err = partition(&input, &params(3)).unwrap_err();
    assert!(matches!(err, StriderError::BadInput(_)), "got {err}");
}

#[test]
fn out_of_range_vertex_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "range.txt", &[(0, 9)]);
    let err = partition(&input, &params(3)).unwrap_err();
    assert!(matches!(err, StriderError::BadInput(_)), "got {err}");
}

#[test]
fn unsorted_source_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "unsorted.txt", &[(2, 0), (0, 1)]);
    let err = partition(&input, &params(3)).unwrap_err();
    assert!(matches!(err, StriderError::BadInput(_)), "got {err}");
}

#[test]
fn oversized_record_fails_with_block_too_small() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (1..=10).map(|d| (0, d)).collect();
    let input = edges_file(tmp.path(), "star.txt", &edges);

    let err = partition(
        &input,
        &PartitionParams {
            block_bytes: 32,
            ..params(11)
        },
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            StriderError::BlockTooSmall {
                vertex: 0,
                record_bytes: 48,
                block_bytes: 32
            }
        ),
        "got {err}"
    );
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

fn snapshot_dir(dir: &Path) -> HashMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

#[test]
fn repartitioning_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (0..31u32)
        .flat_map(|v| [(v, (v * 7 + 1) % 32), (v, (v * 3 + 5) % 32)])
        .filter(|(s, d)| s != d)
        .collect();
    let input = edges_file(tmp.path(), "dense.txt", &edges);

    let p = PartitionParams {
        block_bytes: 256,
        ..params(32)
    };
    partition(&input, &p).unwrap();
    let first = snapshot_dir(&paths::block_dir(&input));

    partition(&input, &p).unwrap();
    let second = snapshot_dir(&paths::block_dir(&input));

    assert_eq!(first.len(), second.len());
    for (name, bytes) in &first {
        assert_eq!(second.get(name), Some(bytes), "file {name} differs");
    }
}
