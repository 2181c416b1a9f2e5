//! End-to-end B+ tree tests over a real disk manager and buffer pool.

use basalt_buffer::{BufferPoolConfig, BufferPoolManager, DiskManager, DiskManagerConfig};
use basalt_common::config::IndexConfig;
use basalt_common::page::PageId;
use basalt_common::Rid;
use basalt_index::{BPlusTree, GenericComparator, GenericKey};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

type Key = GenericKey<8>;
type Tree = BPlusTree<Key, GenericComparator<8>>;

fn key(v: u64) -> Key {
    Key::from_u64(v)
}

fn rid(v: u64) -> Rid {
    Rid::new(PageId(v as u32), v as u32 % 100)
}

fn small_tree_config() -> IndexConfig {
    IndexConfig {
        leaf_max_size: Some(4),
        internal_max_size: Some(4),
    }
}

fn create_pool(dir: &tempfile::TempDir, frames: usize) -> Arc<BufferPoolManager> {
    let disk = DiskManager::new(DiskManagerConfig {
        data_path: dir.path().join("index.db"),
        fsync_enabled: false,
    })
    .unwrap();
    Arc::new(BufferPoolManager::new(
        BufferPoolConfig {
            num_frames: frames,
            lru_k: 2,
        },
        Arc::new(disk),
    ))
}

fn create_tree(pool: &Arc<BufferPoolManager>) -> Tree {
    Tree::create(pool.clone(), GenericComparator, small_tree_config()).unwrap()
}

fn collect_keys(tree: &Tree) -> Vec<u64> {
    tree.begin().unwrap().map(|(k, _)| k.to_u64()).collect()
}

#[test]
fn test_empty_tree() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    assert!(tree.is_empty().unwrap());
    assert!(!tree.root_page_id().unwrap().is_valid());
    assert!(tree.get_value(&key(1)).unwrap().is_none());
    assert!(tree.begin().unwrap().next().is_none());
    assert!(tree.end().is_end());

    // Deleting from an empty tree is a no-op.
    tree.remove(&key(1)).unwrap();
    assert!(tree.is_empty().unwrap());
}

#[test]
fn test_sequential_insert_lookup_scan() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    for v in 1..=10 {
        assert!(tree.insert(&key(v), &rid(v)).unwrap());
    }

    assert!(!tree.is_empty().unwrap());
    for v in 1..=10 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    assert!(tree.get_value(&key(0)).unwrap().is_none());
    assert!(tree.get_value(&key(11)).unwrap().is_none());

    assert_eq!(collect_keys(&tree), (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_iterator_yields_paired_values() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    for v in (1..=20).rev() {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    let pairs: Vec<(u64, Rid)> = tree.begin().unwrap().map(|(k, r)| (k.to_u64(), r)).collect();
    assert_eq!(pairs.len(), 20);
    for (i, (k, r)) in pairs.iter().enumerate() {
        assert_eq!(*k, i as u64 + 1);
        assert_eq!(*r, rid(*k));
    }
}

#[test]
fn test_duplicate_insert_rejected() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    assert!(tree.insert(&key(7), &rid(1)).unwrap());
    assert!(!tree.insert(&key(7), &rid(2)).unwrap());

    // The stored value is the original.
    assert_eq!(tree.get_value(&key(7)).unwrap(), Some(rid(1)));
}

#[test]
fn test_remove_single_key_keeps_rest() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    for v in 1..=10 {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    tree.remove(&key(5)).unwrap();

    assert!(tree.get_value(&key(5)).unwrap().is_none());
    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);

    // Removing it again is a no-op.
    tree.remove(&key(5)).unwrap();
    assert_eq!(collect_keys(&tree).len(), 9);
}

#[test]
fn test_insert_remove_single_key_empties_tree() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    tree.insert(&key(42), &rid(42)).unwrap();
    assert!(!tree.is_empty().unwrap());

    tree.remove(&key(42)).unwrap();
    assert!(tree.is_empty().unwrap());
    assert!(!tree.root_page_id().unwrap().is_valid());
    assert!(tree.get_value(&key(42)).unwrap().is_none());
}

#[test]
fn test_random_insert_then_drain() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 64);
    let tree = create_tree(&pool);
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let mut values: Vec<u64> = (1..=1000).collect();
    values.shuffle(&mut rng);
    for &v in &values {
        assert!(tree.insert(&key(v), &rid(v)).unwrap());
    }

    // Full ordered scan sees every key exactly once.
    assert_eq!(collect_keys(&tree), (1..=1000).collect::<Vec<_>>());
    for &v in &values {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
    }

    // Drain in a different random order.
    values.shuffle(&mut rng);
    for (i, &v) in values.iter().enumerate() {
        tree.remove(&key(v)).unwrap();
        assert!(tree.get_value(&key(v)).unwrap().is_none());
        if i % 100 == 0 {
            let remaining = collect_keys(&tree);
            assert_eq!(remaining.len(), 1000 - i - 1);
            assert!(remaining.windows(2).all(|w| w[0] < w[1]));
        }
    }

    assert!(tree.is_empty().unwrap());
    assert!(!tree.root_page_id().unwrap().is_valid());
}

#[test]
fn test_mixed_workload_against_reference() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 64);
    let tree = create_tree(&pool);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut reference: BTreeMap<u64, Rid> = BTreeMap::new();

    let mut keys: Vec<u64> = (1..=400).collect();
    keys.shuffle(&mut rng);

    // Interleave inserts with deletions of earlier keys.
    for (i, &v) in keys.iter().enumerate() {
        let inserted = tree.insert(&key(v), &rid(v)).unwrap();
        assert_eq!(inserted, reference.insert(v, rid(v)).is_none());

        if i % 3 == 0 {
            let doomed = keys[i / 2];
            tree.remove(&key(doomed)).unwrap();
            reference.remove(&doomed);
        }
    }

    // Point lookups agree with the reference.
    for v in 0..=401 {
        assert_eq!(
            tree.get_value(&key(v)).unwrap(),
            reference.get(&v).copied(),
            "mismatch at key {v}"
        );
    }

    // Ordered scan agrees with the reference.
    let scanned: Vec<(u64, Rid)> = tree.begin().unwrap().map(|(k, r)| (k.to_u64(), r)).collect();
    let expected: Vec<(u64, Rid)> = reference.iter().map(|(&k, &r)| (k, r)).collect();
    assert_eq!(scanned, expected);
}

#[test]
fn test_begin_at_positions_at_least_key() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 16);
    let tree = create_tree(&pool);

    for v in (2..=40).step_by(2) {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    // Exact hit.
    let from_ten: Vec<u64> = tree.begin_at(&key(10)).unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(from_ten, (10..=40).step_by(2).collect::<Vec<_>>());

    // Between keys: positions at the next larger one.
    let from_eleven: Vec<u64> =
        tree.begin_at(&key(11)).unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(from_eleven, (12..=40).step_by(2).collect::<Vec<_>>());

    // Below the smallest key: full scan.
    let from_zero: Vec<u64> = tree.begin_at(&key(0)).unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(from_zero.len(), 20);

    // Beyond the largest key: empty.
    assert!(tree.begin_at(&key(99)).unwrap().next().is_none());
}

#[test]
fn test_scan_across_leaf_boundaries() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 32);
    let tree = create_tree(&pool);

    // leaf_max_size = 4 forces many leaves.
    for v in 1..=100 {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    // Starting mid-range walks the chain across leaves.
    let tail: Vec<u64> = tree.begin_at(&key(37)).unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(tail, (37..=100).collect::<Vec<_>>());
}

#[test]
fn test_reverse_and_interleaved_insert_orders() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 32);
    let tree = create_tree(&pool);

    // Descending inserts exercise leftmost-leaf splits.
    for v in (1..=50).rev() {
        tree.insert(&key(v * 2), &rid(v * 2)).unwrap();
    }
    // Fill odd keys in ascending order.
    for v in 1..=50 {
        tree.insert(&key(v * 2 - 1), &rid(v * 2 - 1)).unwrap();
    }

    assert_eq!(collect_keys(&tree), (1..=100).collect::<Vec<_>>());
}

#[test]
fn test_deep_tree_collapses_levels_on_drain() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 64);
    let tree = create_tree(&pool);

    for v in 1..=500 {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    // Remove everything ascending; every merge path gets exercised.
    for v in 1..=500 {
        tree.remove(&key(v)).unwrap();
    }
    assert!(tree.is_empty().unwrap());

    // The tree is still usable afterwards.
    tree.insert(&key(9), &rid(9)).unwrap();
    assert_eq!(tree.get_value(&key(9)).unwrap(), Some(rid(9)));
}

/// Recursively checks structural invariants below `page_id` and returns
/// (depth, smallest key, largest key, pair count).
fn validate_subtree(
    pool: &Arc<BufferPoolManager>,
    page_id: PageId,
    is_root: bool,
) -> (usize, u64, u64, usize) {
    use basalt_common::page::PageKind;
    use basalt_index::btree::page::{page_kind, InternalPage, LeafPage};

    let guard = pool.read_page(page_id).unwrap();
    match page_kind(guard.data()) {
        PageKind::Leaf => {
            let leaf = LeafPage::<Key>::new(guard.data());
            let keys: Vec<u64> = leaf.keys().iter().map(|k| k.to_u64()).collect();
            assert!(!keys.is_empty(), "leaf {page_id} is empty");
            assert!(
                keys.windows(2).all(|w| w[0] < w[1]),
                "leaf {page_id} keys not strictly increasing"
            );
            if !is_root {
                assert!(keys.len() >= 2, "leaf {page_id} underflows: {}", keys.len());
            }
            assert!(keys.len() <= 4, "leaf {page_id} overflows: {}", keys.len());
            (1, keys[0], *keys.last().unwrap(), keys.len())
        }
        PageKind::Internal => {
            let internal = InternalPage::<Key>::new(guard.data());
            let size = internal.size();
            let children = internal.values();
            let separators: Vec<u64> = (1..size).map(|i| internal.key_at(i).to_u64()).collect();
            // Internal pages need two children everywhere, the root included.
            assert!(size >= 2, "internal {page_id} underflows: {size}");
            assert!(size <= 4, "internal {page_id} overflows: {size}");
            drop(guard);

            let mut depth = None;
            let mut total = 0;
            let mut low = u64::MAX;
            let mut high = 0;
            for (i, &child) in children.iter().enumerate() {
                let (d, lo, hi, n) = validate_subtree(pool, child, false);
                match depth {
                    None => depth = Some(d),
                    Some(expected) => assert_eq!(d, expected, "leaves at unequal depth"),
                }
                if i >= 1 {
                    assert!(
                        separators[i - 1] <= lo,
                        "separator {} exceeds child minimum {lo}",
                        separators[i - 1]
                    );
                }
                if i + 1 < children.len() {
                    assert!(
                        hi < separators[i],
                        "child maximum {hi} reaches separator {}",
                        separators[i]
                    );
                }
                total += n;
                low = low.min(lo);
                high = high.max(hi);
            }
            (depth.unwrap() + 1, low, high, total)
        }
        PageKind::Invalid => panic!("untagged page {page_id} reachable from the root"),
    }
}

#[test]
fn test_structural_invariants_under_random_ops() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 64);
    let tree = create_tree(&pool);
    let mut rng = rand::rngs::StdRng::seed_from_u64(123);

    let mut keys: Vec<u64> = (1..=300).collect();
    keys.shuffle(&mut rng);

    let mut live = 0usize;
    for (i, &v) in keys.iter().enumerate() {
        tree.insert(&key(v), &rid(v)).unwrap();
        live += 1;
        if i % 2 == 1 {
            tree.remove(&key(keys[i - 1])).unwrap();
            live -= 1;
        }
        if i % 25 == 0 {
            let root = tree.root_page_id().unwrap();
            let (_, _, _, count) = validate_subtree(&pool, root, true);
            assert_eq!(count, live);
        }
    }

    let root = tree.root_page_id().unwrap();
    let (_, _, _, count) = validate_subtree(&pool, root, true);
    assert_eq!(count, live);
    assert_eq!(collect_keys(&tree).len(), live);
}

#[test]
fn test_tree_survives_reopen() {
    let dir = tempdir().unwrap();
    let header_page_id;

    {
        let pool = create_pool(&dir, 32);
        let tree = create_tree(&pool);
        header_page_id = tree.header_page_id();

        for v in 1..=100 {
            tree.insert(&key(v), &rid(v)).unwrap();
        }
        pool.flush_all().unwrap();
    }

    // A fresh pool over the same file sees the same tree.
    let pool = create_pool(&dir, 32);
    let tree = Tree::open(
        pool.clone(),
        GenericComparator,
        small_tree_config(),
        header_page_id,
    )
    .unwrap();

    for v in 1..=100 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    assert_eq!(collect_keys(&tree), (1..=100).collect::<Vec<_>>());

    // And it accepts further writes.
    assert!(tree.insert(&key(101), &rid(101)).unwrap());
    tree.remove(&key(1)).unwrap();
    assert_eq!(collect_keys(&tree), (2..=101).collect::<Vec<_>>());
}

#[test]
fn test_wide_keys() {
    let dir = tempdir().unwrap();
    let pool = create_pool(&dir, 32);
    let tree: BPlusTree<GenericKey<32>, GenericComparator<32>> = BPlusTree::create(
        pool.clone(),
        GenericComparator,
        IndexConfig {
            leaf_max_size: Some(4),
            internal_max_size: Some(4),
        },
    )
    .unwrap();

    for v in 1..=64 {
        assert!(tree
            .insert(&GenericKey::<32>::from_u64(v), &rid(v))
            .unwrap());
    }
    for v in 1..=64 {
        assert_eq!(
            tree.get_value(&GenericKey::<32>::from_u64(v)).unwrap(),
            Some(rid(v))
        );
    }

    let scanned: Vec<u64> = tree
        .begin()
        .unwrap()
        .map(|(k, _)| k.to_u64())
        .collect();
    assert_eq!(scanned, (1..=64).collect::<Vec<_>>());
}
