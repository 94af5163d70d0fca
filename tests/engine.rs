mod common;

use std::sync::atomic::Ordering;

use strider::graph::paths;
use strider::{partition, Engine, GraphStore, StriderError};

use common::{base_cfg, edges_file, partition_params, raw_file, run_engine};

// ---------------------------------------------------------------------------
// Forced trajectories (no randomness observable)
// ---------------------------------------------------------------------------

#[test]
fn walk_follows_a_path_graph_to_its_end() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "path.txt", &[(0, 1), (1, 2), (2, 3)]);

    let cfg = base_cfg(4, 1, 3);
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0]));

    assert_eq!(visits, vec![0, 0, 0, 1]);
    assert_eq!(stats.walks_completed, 1);
    assert_eq!(stats.walks_live, 0);
}

#[test]
fn single_vertex_graph_restarts_onto_itself() {
    let tmp = tempfile::tempdir().unwrap();
    let input = raw_file(tmp.path(), "lonely.txt", &[]);

    let cfg = base_cfg(1, 5, 3);
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0]));

    assert_eq!(visits, vec![5]);
    assert_eq!(stats.walks_completed, 5);
}

#[test]
fn zero_walks_terminate_immediately() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "path.txt", &[(0, 1), (1, 2), (2, 3)]);

    let cfg = base_cfg(4, 0, 3);
    let (visits, stats) = run_engine(&input, &cfg, None);

    assert_eq!(visits, vec![0; 4]);
    assert_eq!(stats.activations, 0);
    assert_eq!(stats.walks_completed, 0);
}

#[test]
fn forced_chain_crosses_blocks_and_terminates_mid_way() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (0..299).map(|v| (v, v + 1)).collect();
    let input = edges_file(tmp.path(), "chain.txt", &edges);

    let mut cfg = base_cfg(300, 3, 250);
    cfg.block_bytes = 1200; // 100 records per block -> 3 blocks
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0]));

    let mut expected = vec![0u32; 300];
    expected[250] = 3;
    assert_eq!(visits, expected);
    assert_eq!(stats.activations, 3, "one activation per traversed block");
    assert_eq!(stats.walks_completed, 3);
}

// ---------------------------------------------------------------------------
// Sink restart
// ---------------------------------------------------------------------------

#[test]
fn sink_vertex_always_takes_the_restart_branch() {
    let tmp = tempfile::tempdir().unwrap();
    // Vertex 1 has no out-edges; vertex 2 is isolated.
    let input = edges_file(tmp.path(), "sink.txt", &[(0, 1)]);

    let cfg = base_cfg(3, 1, 5);
    let (first, stats) = run_engine(&input, &cfg, Some(&[0]));
    assert_eq!(first.iter().sum::<u32>(), 1, "the walk must terminate somewhere");
    assert_eq!(stats.walks_completed, 1);

    // Restart targets are random but replayable.
    let tmp2 = tempfile::tempdir().unwrap();
    let input2 = edges_file(tmp2.path(), "sink.txt", &[(0, 1)]);
    let (second, _) = run_engine(&input2, &cfg, Some(&[0]));
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Multi-chunk records
// ---------------------------------------------------------------------------

#[test]
fn record_spanning_many_chunks_is_processed_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    // Hub record: 8 + 4 * 600 = 2408 bytes across five 512-byte chunks.
    let edges: Vec<(u32, u32)> = (1..=600).map(|d| (0, d)).collect();
    let input = edges_file(tmp.path(), "star.txt", &edges);

    let cfg = base_cfg(601, 200, 1);
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0]));

    assert_eq!(visits[0], 0, "every walk must leave the hub");
    assert_eq!(visits.iter().sum::<u32>(), 200);
    assert_eq!(stats.walks_completed, 200);

    // Replay equality covers the carry-assembled neighbor sampling.
    let tmp2 = tempfile::tempdir().unwrap();
    let input2 = edges_file(tmp2.path(), "star.txt", &edges);
    let (again, _) = run_engine(&input2, &cfg, Some(&[0]));
    assert_eq!(visits, again);
}

#[test]
fn multi_threaded_star_keeps_every_walk() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (1..=600).map(|d| (0, d)).collect();
    let input = edges_file(tmp.path(), "star.txt", &edges);

    let mut cfg = base_cfg(601, 500, 2);
    cfg.exec_threads = 4;
    cfg.alpha = 0.15;
    let (visits, stats) = run_engine(&input, &cfg, None);

    assert_eq!(visits.iter().sum::<u32>(), 500);
    assert_eq!(stats.walks_completed, 500);
    assert_eq!(stats.walks_live, 0);
}

// ---------------------------------------------------------------------------
// Stop thresholds
// ---------------------------------------------------------------------------

#[test]
fn global_stop_threshold_ends_the_run_with_live_walks() {
    let tmp = tempfile::tempdir().unwrap();
    // Two disjoint 32-cycles, one per block.
    let mut edges: Vec<(u32, u32)> = (0..32).map(|v| (v, (v + 1) % 32)).collect();
    edges.extend((32..64).map(|v| (v, 32 + (v + 1) % 32)));
    edges.sort();
    let input = edges_file(tmp.path(), "cycles.txt", &edges);

    let mut cfg = base_cfg(64, 1000, 100);
    cfg.block_bytes = 384; // exactly one cycle per block
    cfg.rbound = 0.5;
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0, 32]));

    // Block 0 wins the tie; its 500 walks run 100 forced hops each and
    // finish on vertex 4. The 500 walks in block 1 stay live, meeting
    // the 500-walk stop threshold.
    assert_eq!(stats.activations, 1);
    assert_eq!(stats.walks_completed, 500);
    assert_eq!(stats.walks_live, 500);
    assert_eq!(visits[4], 500);
    assert_eq!(visits.iter().sum::<u32>(), 500);
}

#[test]
fn per_block_stop_threshold_leaves_cold_blocks_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let mut edges: Vec<(u32, u32)> = (0..32).map(|v| (v, (v + 1) % 32)).collect();
    edges.extend((32..64).map(|v| (v, 32 + (v + 1) % 32)));
    edges.sort();
    let input = edges_file(tmp.path(), "cycles.txt", &edges);

    // Six walks per block, per-block threshold of six: neither block
    // is ever worth activating, so the run ends with everything live.
    let mut cfg = base_cfg(64, 12, 100);
    cfg.block_bytes = 384;
    cfg.rboundin = 0.5;
    let (visits, stats) = run_engine(&input, &cfg, Some(&[0, 32]));

    assert_eq!(stats.activations, 0);
    assert_eq!(visits.iter().sum::<u32>(), 0);
    assert_eq!(stats.walks_live, 12);
}

// ---------------------------------------------------------------------------
// Determinism replay
// ---------------------------------------------------------------------------

#[test]
fn fixed_seed_replays_byte_identical_visits() {
    let edges: Vec<(u32, u32)> = (0..512u32)
        .flat_map(|v| [(v, (v * 7 + 1) % 512), (v, (v * 13 + 3) % 512)])
        .collect();

    let mut cfg = base_cfg(512, 100, 20);
    cfg.block_bytes = 2048; // 128 records per block -> 4 blocks
    cfg.alpha = 0.2;
    cfg.seed = 42;

    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "mix.txt", &edges);
    let (first, stats) = run_engine(&input, &cfg, None);
    assert_eq!(first.iter().sum::<u32>(), 100);
    assert_eq!(stats.walks_completed, 100);

    let tmp2 = tempfile::tempdir().unwrap();
    let input2 = edges_file(tmp2.path(), "mix.txt", &edges);
    let (second, _) = run_engine(&input2, &cfg, None);
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Failure surfaces
// ---------------------------------------------------------------------------

#[test]
fn engine_rejects_a_mismatched_vertex_count() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "path.txt", &[(0, 1), (1, 2), (2, 3)]);
    partition(&input, &partition_params(&base_cfg(4, 1, 1))).unwrap();

    let store = GraphStore::open(&input).unwrap();
    let err = Engine::new(base_cfg(5, 1, 1), store).unwrap_err();
    assert!(matches!(err, StriderError::BadInput(_)), "got {err}");
}

#[test]
fn corrupted_block_file_fails_the_crc_check() {
    let tmp = tempfile::tempdir().unwrap();
    let input = edges_file(tmp.path(), "path.txt", &[(0, 1), (1, 2), (2, 3)]);
    let cfg = base_cfg(4, 1, 3);
    partition(&input, &partition_params(&cfg)).unwrap();

    let adj = paths::block_adj_path(&paths::block_dir(&input), 0);
    let mut bytes = std::fs::read(&adj).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&adj, bytes).unwrap();

    let store = GraphStore::open(&input).unwrap();
    let mut engine = Engine::new(cfg, store).unwrap();
    engine.seed_walks(Some(&[0])).unwrap();
    let err = engine.run().unwrap_err();
    assert!(matches!(err, StriderError::CrcMismatch(0)), "got {err}");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn cancellation_returns_partial_results() {
    let tmp = tempfile::tempdir().unwrap();
    let edges: Vec<(u32, u32)> = (0..63).map(|v| (v, v + 1)).collect();
    let input = edges_file(tmp.path(), "chain.txt", &edges);
    let cfg = base_cfg(64, 10, 50);
    partition(&input, &partition_params(&cfg)).unwrap();

    let store = GraphStore::open(&input).unwrap();
    let mut engine = Engine::new(cfg, store).unwrap();
    engine.seed_walks(Some(&[0])).unwrap();
    engine.cancel_handle().store(true, Ordering::SeqCst);

    let stats = engine.run().unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.walks_completed, 0);
    assert_eq!(stats.walks_live, 10);
}
