use std::sync::Arc;

use strider::config::SelectPolicy;
use strider::graph::block_map::BlockMap;
use strider::walk::manager::WalkManager;
use strider::walk::{Walk, MAX_HOPS, SOURCE_LIMIT};
use strider::StriderError;

/// Two blocks of 512 vertices each.
fn two_block_map() -> Arc<BlockMap> {
    let mut block_of = vec![0u8; 512];
    block_of.extend(vec![1u8; 512]);
    Arc::new(BlockMap::from_parts(block_of, vec![(0, 512), (512, 1024)]))
}

fn manager(stop_threshold: u64, policy: SelectPolicy) -> WalkManager {
    WalkManager::new(two_block_map(), stop_threshold, policy).unwrap()
}

// ---------------------------------------------------------------------------
// Packed walk encoding
// ---------------------------------------------------------------------------

#[test]
fn walk_packs_source_and_hop() {
    let w = Walk::new(12345, 7).unwrap();
    assert_eq!(w.source(), 12345);
    assert_eq!(w.hop(), 7);

    let w = w.advanced().unwrap();
    assert_eq!(w.source(), 12345);
    assert_eq!(w.hop(), 8);

    let edge = Walk::new(SOURCE_LIMIT - 1, MAX_HOPS).unwrap();
    assert_eq!(edge.source(), SOURCE_LIMIT - 1);
    assert_eq!(edge.hop(), MAX_HOPS);
}

#[test]
fn walk_encoding_bounds_are_enforced() {
    assert!(matches!(
        Walk::new(SOURCE_LIMIT, 0),
        Err(StriderError::WalkOverflow(_))
    ));
    assert!(matches!(
        Walk::new(0, MAX_HOPS + 1),
        Err(StriderError::WalkOverflow(_))
    ));
    let maxed = Walk::new(3, MAX_HOPS).unwrap();
    assert!(matches!(
        maxed.advanced(),
        Err(StriderError::WalkOverflow(_))
    ));
}

// ---------------------------------------------------------------------------
// Queue discipline and block accounting
// ---------------------------------------------------------------------------

#[test]
fn queues_are_fifo_per_vertex() {
    let m = manager(0, SelectPolicy::MaxWalks);
    m.push(9, Walk::new(1, 0).unwrap());
    m.push(9, Walk::new(2, 0).unwrap());
    m.push(9, Walk::new(3, 0).unwrap());

    assert_eq!(m.pop(9).unwrap().source(), 1);
    assert_eq!(m.pop(9).unwrap().source(), 2);
    assert_eq!(m.pop(9).unwrap().source(), 3);
    assert!(m.pop(9).is_none());
}

#[test]
fn cross_block_hop_moves_the_walk_count() {
    let m = manager(0, SelectPolicy::MaxWalks);
    m.seed(&[511]).unwrap();
    assert_eq!(m.walks_in_block(0), 1);
    assert_eq!(m.walks_in_block(1), 0);
    assert_eq!(m.hottest_block(0), Some(0));

    // A walk at 511 hops across the boundary to 512.
    let w = m.pop(511).unwrap();
    assert_eq!(m.walks_in_block(0), 0);
    m.push(512, w.advanced().unwrap());

    assert_eq!(m.walks_in_block(0), 0);
    assert_eq!(m.walks_in_block(1), 1);
    assert_eq!(m.hottest_block(0), Some(1));
}

#[test]
fn hottest_block_breaks_ties_toward_the_lowest_index() {
    let m = manager(0, SelectPolicy::MaxWalks);
    m.seed(&[100, 700]).unwrap();
    assert_eq!(m.walks_in_block(0), 1);
    assert_eq!(m.walks_in_block(1), 1);
    assert_eq!(m.hottest_block(0), Some(0));

    m.push(700, Walk::new(700, 0).unwrap());
    assert_eq!(m.hottest_block(0), Some(1));
}

#[test]
fn hottest_block_is_none_when_no_walks_remain() {
    let m = manager(0, SelectPolicy::MaxWalks);
    assert_eq!(m.hottest_block(0), None);
    m.seed(&[5]).unwrap();
    let _ = m.pop(5).unwrap();
    assert_eq!(m.hottest_block(0), None);
}

#[test]
fn blocks_at_or_below_the_floor_are_not_selectable() {
    let m = manager(0, SelectPolicy::MaxWalks);
    m.seed(&[1, 2, 3, 900]).unwrap();
    assert_eq!(m.hottest_block(0), Some(0));
    assert_eq!(m.hottest_block(1), Some(0));
    assert_eq!(m.hottest_block(3), None, "3 walks is not above a floor of 3");
}

#[test]
fn first_non_empty_policy_ignores_counts() {
    let m = manager(0, SelectPolicy::FirstNonEmpty);
    m.seed(&[600, 601, 602, 3]).unwrap();
    assert_eq!(m.walks_in_block(1), 3);
    assert_eq!(m.hottest_block(0), Some(0));
}

// ---------------------------------------------------------------------------
// Termination threshold
// ---------------------------------------------------------------------------

#[test]
fn done_respects_the_stop_threshold() {
    let m = manager(2, SelectPolicy::MaxWalks);
    assert!(m.done(), "no walks means done");

    m.seed(&[1, 2]).unwrap();
    assert!(m.done(), "at the threshold counts as done");

    m.push(3, Walk::new(3, 0).unwrap());
    assert!(!m.done(), "above the threshold keeps running");

    let _ = m.pop(3).unwrap();
    m.note_terminated();
    assert!(m.done());
}
