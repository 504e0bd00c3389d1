extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key, key)).is_none());
        tree.assert_invariants();
    }

    tree
}

fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn node(tree: &AvlTree<TestNode>, key: u32) -> NonNull<TestNode> {
    tree.get_raw(&key).expect("item not found")
}

fn root_key(tree: &AvlTree<TestNode>) -> Option<u32> {
    tree.root.map(|root| unsafe { root.as_ref().key })
}

fn balance_of(tree: &AvlTree<TestNode>, key: u32) -> i8 {
    unsafe { tree.links(node(tree, key)).balance() }
}

// (key, parent key, balance) for every node, in key order.
fn shape(tree: &AvlTree<TestNode>) -> Vec<(u32, Option<u32>, i8)> {
    tree.iter()
        .map(|node| {
            let parent = node.links.parent().map(|p| unsafe { p.as_ref().key });
            (node.key, parent, node.links.balance())
        })
        .collect()
}

// Checks parent/child link consistency only. Keys may be out of order.
fn assert_links(tree: &AvlTree<TestNode>) {
    fn count(tree: &AvlTree<TestNode>, node: NonNull<TestNode>) -> usize {
        let mut n = 1;

        for dir in [Dir::Left, Dir::Right] {
            if let Some(child) = unsafe { tree.links(node).child(dir) } {
                assert_eq!(unsafe { tree.links(child).parent() }, Some(node));
                n += count(tree, child);
            }
        }

        n
    }

    let n = match tree.root {
        Some(root) => {
            assert_eq!(unsafe { tree.links(root).parent() }, None);
            count(tree, root)
        }
        None => 0,
    };

    assert_eq!(n, tree.len());
}

// Calls `f` with every permutation of `keys` (Heap's algorithm).
fn for_each_permutation(keys: &mut [u32], f: &mut impl FnMut(&[u32])) {
    fn permute(k: usize, keys: &mut [u32], f: &mut impl FnMut(&[u32])) {
        if k <= 1 {
            f(keys);
            return;
        }

        for i in 0..k - 1 {
            permute(k - 1, keys, f);

            if k % 2 == 0 {
                keys.swap(i, k - 1);
            } else {
                keys.swap(0, k - 1);
            }
        }

        permute(k - 1, keys, f);
    }

    let len = keys.len();
    permute(len, keys, f);
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    for key in keys {
        let node = tree.find(key).expect("item not found");
        assert_eq!(node.key(), key);
    }

    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    assert_eq!(self::keys(&tree), sorted);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = tree_of(keys);

    for key in keys {
        let removed = tree.remove(key).expect("item not found");
        assert_eq!(removed.key, *key);
        tree.assert_invariants();
        assert_eq!(tree.find(key).map(|n| n.key), Err(Error::KeyNotFound));
    }

    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(TestNode::new(key, key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        tree.remove(key).expect("item not found");
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn all_orders_find() {
    for n in 2..=6 {
        let mut keys: Vec<u32> = (0..n).collect();
        for_each_permutation(&mut keys, &mut |keys: &[u32]| insert_find_all(keys));
    }
}

#[test]
fn all_orders_remove() {
    for n in 1..=6 {
        let mut keys: Vec<u32> = (0..n).collect();
        for_each_permutation(&mut keys, &mut |keys: &[u32]| insert_remove_all(keys));
    }
}

#[test]
fn ascending_insert_rebalances_to_median_root() {
    let tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);

    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(tree.height(), 3);
    assert!((1..=7).all(|key| balance_of(&tree, key) == 0));
}

#[test]
fn single_rotations_on_insert() {
    for keys in [[3, 2, 1], [1, 2, 3]] {
        let tree = tree_of(&keys);

        assert_eq!(root_key(&tree), Some(2));
        assert_eq!(shape(&tree), [(1, Some(2), 0), (2, None, 0), (3, Some(2), 0)]);
    }
}

#[test]
fn double_rotations_on_insert() {
    for keys in [[3, 1, 2], [1, 3, 2]] {
        let tree = tree_of(&keys);

        assert_eq!(root_key(&tree), Some(2));
        assert_eq!(shape(&tree), [(1, Some(2), 0), (2, None, 0), (3, Some(2), 0)]);
    }
}

#[test]
fn double_rotation_with_leaning_pivot() {
    // Inserting 3 makes 4 the pivot of a left-right double rotation at 6 while 4 leans left.
    let tree = tree_of(&[6, 2, 7, 1, 4, 3]);

    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(balance_of(&tree, 2), 0);
    assert_eq!(balance_of(&tree, 6), 1);
    assert_eq!(balance_of(&tree, 4), 0);

    // And the mirror image, with the pivot leaning right.
    let tree = tree_of(&[2, 1, 6, 4, 7, 5]);

    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(balance_of(&tree, 6), 0);
    assert_eq!(balance_of(&tree, 2), -1);
    assert_eq!(balance_of(&tree, 4), 0);
}

#[test]
fn remove_node_with_two_children_uses_predecessor() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    let removed = tree.remove(&5).expect("item not found");
    assert_eq!(removed.key, 5);
    tree.assert_invariants();

    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(keys(&tree), [1, 3, 4, 7, 8, 9]);
}

#[test]
fn remove_only_element() {
    let mut tree = tree_of(&[42]);

    assert!(tree.remove(&42).is_some());
    tree.assert_invariants();

    assert!(tree.is_empty());
    assert_eq!(tree.root, None);
    assert_eq!(tree.find(&42).map(|n| n.key), Err(Error::KeyNotFound));
}

#[test]
fn remove_with_balanced_sibling_stops() {
    // 2 is right-heavy and its right child 4 is balanced: one rotation and the height holds.
    let mut tree = tree_of(&[2, 1, 4, 3, 5]);

    tree.remove(&1);
    tree.assert_invariants();

    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(balance_of(&tree, 4), -1);
    assert_eq!(balance_of(&tree, 2), 1);
}

#[test]
fn remove_with_inner_heavy_sibling_double_rotates() {
    let mut tree = tree_of(&[5, 2, 8, 3]);

    tree.remove(&8);
    tree.assert_invariants();

    assert_eq!(root_key(&tree), Some(3));
    assert_eq!(shape(&tree), [(2, Some(3), 0), (3, None, 0), (5, Some(3), 0)]);
}

#[test]
fn remove_double_rotation_with_leaning_pivot() {
    // Removing 11 leaves 8 left-heavy with 3 leaning right, so 6 rises in a left-right double
    // rotation. Where 6's own lean ends up depends on which of its subtrees was taller.
    let mut tree = tree_of(&[8, 3, 10, 2, 6, 11, 5]);
    assert_eq!(balance_of(&tree, 6), -1);
    assert_eq!(tree.height(), 4);

    tree.remove(&11);
    tree.assert_invariants();

    assert_eq!(tree.height(), 3);
    assert_eq!(
        shape(&tree),
        [
            (2, Some(3), 0),
            (3, Some(6), 0),
            (5, Some(3), 0),
            (6, None, 0),
            (8, Some(6), 1),
            (10, Some(8), 0),
        ]
    );

    let mut tree = tree_of(&[8, 3, 10, 2, 6, 11, 7]);
    assert_eq!(balance_of(&tree, 6), 1);

    tree.remove(&11);
    tree.assert_invariants();

    assert_eq!(tree.height(), 3);
    assert_eq!(
        shape(&tree),
        [
            (2, Some(3), 0),
            (3, Some(6), -1),
            (6, None, 0),
            (7, Some(8), 0),
            (8, Some(6), 0),
            (10, Some(8), 0),
        ]
    );
}

#[test]
fn remove_propagates_past_single_rotation() {
    // Removing 9 rotates at 10, which loses a level, so the root rotates as well.
    let mut tree = tree_of(&[8, 4, 10, 2, 6, 9, 11, 1, 3, 5, 7, 12, 0]);
    assert_eq!(tree.height(), 5);
    assert_eq!(balance_of(&tree, 8), -1);
    assert_eq!(balance_of(&tree, 10), 1);

    tree.remove(&9);
    tree.assert_invariants();

    assert_eq!(tree.height(), 4);
    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(balance_of(&tree, 8), 0);
    assert_eq!(balance_of(&tree, 11), 0);
}

#[test]
fn remove_with_balanced_sibling_keeps_height() {
    let mut tree = tree_of(&[8, 4, 10, 2, 6, 9, 11, 1, 3, 5, 7, 12]);
    tree.remove(&12);
    tree.remove(&11);
    tree.assert_invariants();

    // 8 leans left onto a balanced 4, so one rotation at 8 absorbs the lost level.
    let height = tree.height();
    tree.remove(&10);
    tree.assert_invariants();

    assert_eq!(tree.height(), height);
    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(balance_of(&tree, 4), 1);
    assert_eq!(balance_of(&tree, 8), -1);
}

#[test]
fn duplicate_insert_keeps_shape() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9, 6]);
    let before = shape(&tree);

    let old = tree.insert(TestNode::new(7, 700)).expect("key was present");
    assert_eq!(old.value, 7);
    tree.assert_invariants();

    assert_eq!(shape(&tree), before);
    assert_eq!(tree.find(&7).map(|n| n.value), Ok(700));
    assert_eq!(tree.len(), 8);
}

#[test]
fn remove_absent_key_is_noop() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4]);
    let before = shape(&tree);

    assert!(tree.remove(&6).is_none());
    tree.assert_invariants();

    assert_eq!(shape(&tree), before);
}

#[test]
fn get_mut_updates_in_place() {
    let mut tree = tree_of(&[2, 1, 3]);

    unsafe { tree.get_mut(&3).unwrap().get_unchecked_mut().value = 30 };

    assert_eq!(tree.get(&3).map(|n| n.value), Some(30));
    assert!(tree.get_mut(&4).is_none());
}

#[test]
fn swap_parent_and_child() {
    let mut tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);
    let (four, two) = (node(&tree, 4), node(&tree, 2));

    unsafe { tree.swap_nodes(four, two) };
    assert_links(&tree);
    assert_eq!(root_key(&tree), Some(2));
    assert_eq!(keys(&tree), [1, 4, 3, 2, 5, 6, 7]);

    unsafe { tree.swap_nodes(two, four) };
    tree.assert_invariants();
    assert_eq!(root_key(&tree), Some(4));
}

#[test]
fn swap_node_with_itself() {
    let mut tree = tree_of(&[1, 2, 3, 4, 5]);
    let before = shape(&tree);
    let two = node(&tree, 2);

    unsafe { tree.swap_nodes(two, two) };
    tree.assert_invariants();
    assert_eq!(shape(&tree), before);
    assert!(same_node(two, node(&tree, 2)));
    assert!(!same_node(two, node(&tree, 4)));
}

#[test]
fn swap_siblings() {
    let mut tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);
    let (one, three) = (node(&tree, 1), node(&tree, 3));

    unsafe { tree.swap_nodes(one, three) };
    assert_links(&tree);
    assert_eq!(keys(&tree), [3, 2, 1, 4, 5, 6, 7]);

    unsafe { tree.swap_nodes(one, three) };
    tree.assert_invariants();
}

#[test]
fn swap_distant_nodes_keeps_balance_with_position() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7, 8]);
    let (two, seven) = (node(&tree, 2), node(&tree, 7));
    let (two_balance, seven_balance) = (balance_of(&tree, 2), balance_of(&tree, 7));

    unsafe { tree.swap_nodes(two, seven) };
    assert_links(&tree);
    assert_eq!(keys(&tree), [1, 7, 3, 4, 5, 6, 2, 8]);
    assert_eq!(unsafe { tree.links(seven).balance() }, two_balance);
    assert_eq!(unsafe { tree.links(two).balance() }, seven_balance);

    unsafe { tree.swap_nodes(seven, two) };
    tree.assert_invariants();
}

#[test]
fn neighbors() {
    let tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    let prev = |key| unsafe { tree.predecessor_raw(node(&tree, key)).map(|n| n.as_ref().key) };
    let next = |key| unsafe { tree.successor_raw(node(&tree, key)).map(|n| n.as_ref().key) };

    assert_eq!(prev(5), Some(4));
    assert_eq!(prev(7), Some(5));
    assert_eq!(prev(1), None);
    assert_eq!(next(4), Some(5));
    assert_eq!(next(5), Some(7));
    assert_eq!(next(9), None);
}

#[test]
fn iter_is_double_ended() {
    let tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    let mut iter = tree.iter();
    assert_eq!(iter.len(), 7);
    assert_eq!(iter.next().map(|n| n.key), Some(1));
    assert_eq!(iter.next_back().map(|n| n.key), Some(9));
    assert_eq!(iter.len(), 5);

    let rest: Vec<u32> = iter.map(|n| n.key).collect();
    assert_eq!(rest, [3, 4, 5, 7, 8]);

    let rev: Vec<u32> = tree.iter().rev().map(|n| n.key).collect();
    assert_eq!(rev, [9, 8, 7, 5, 4, 3, 1]);
}

#[test]
fn pop_drains_in_order() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    assert_eq!(tree.first().map(|n| n.key), Some(1));
    assert_eq!(tree.last().map(|n| n.key), Some(9));

    let mut drained = Vec::new();
    while let Some(node) = tree.pop_first() {
        drained.push(node.key);
        tree.assert_invariants();

        if let Some(node) = tree.pop_last() {
            drained.push(node.key);
            tree.assert_invariants();
        }
    }

    assert_eq!(drained, [1, 9, 3, 8, 4, 7, 5]);
}

#[test]
fn height_stays_logarithmic() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 0..4096u32 {
        tree.insert(TestNode::new(key, key));
    }
    tree.assert_invariants();
    assert!(model::height_within_bound(tree.height(), tree.len()));
    assert_eq!(tree.height(), 13);

    // Remove every other key, leaving a sparser but still balanced tree.
    for key in (0..4096u32).step_by(2) {
        tree.remove(&key);
    }
    tree.assert_invariants();
    assert!(model::height_within_bound(tree.height(), tree.len()));
}

#[test]
fn clear_then_reuse() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    tree.clear();
    tree.assert_invariants();
    assert!(tree.is_empty());
    assert!(tree.first().is_none());

    tree.insert(TestNode::new(2, 2));
    tree.assert_invariants();
    assert_eq!(keys(&tree), [2]);
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }
}
