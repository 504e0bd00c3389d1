extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, Error, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    pub value: u32,
}

impl TestNode {
    pub(crate) fn new(key: u32, value: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
            value,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn item_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue, u32),
    Get(ItemValue),
    Find(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        // `Index` picks an existing key so that hits are as likely as misses.
        fn get_key(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item, value) => FinalOp::Insert(get_key(sorted, item), value),
            Op::Get(item) => FinalOp::Get(get_key(sorted, item)),
            Op::Find(item) => FinalOp::Find(get_key(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_key(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32, u32),
    Get(u32),
    Find(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        (item_strategy(), 0u32..1000).prop_map(|(item, value)| Op::Insert(item, value)),
        item_strategy().prop_map(Op::Get),
        item_strategy().prop_map(Op::Find),
        item_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

/// Returns `true` if `height` is within the AVL bound for a tree of `len` nodes.
pub fn height_within_bound(height: usize, len: usize) -> bool {
    height as f64 <= 1.44 * ((len + 2) as f64).log2()
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_keys = Vec::with_capacity(ops.len());
    let mut btree = BTreeMap::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    fn insert_sorted(v: &mut Vec<u32>, key: u32) {
        if let Err(idx) = v.binary_search(&key) {
            v.insert(idx, key);
        }
    }

    fn remove_sorted(v: &mut Vec<u32>, key: u32) {
        if let Ok(idx) = v.binary_search(&key) {
            v.remove(idx);
        }
    }

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_entry(node: Box<TestNode>) -> (u32, u32) {
        (node.key, node.value)
    }

    #[inline]
    fn ref_entry(node: &TestNode) -> (u32, u32) {
        (node.key, node.value)
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_keys);

        match final_op {
            FinalOp::Insert(key, value) => {
                insert_sorted(&mut sorted_keys, key);

                let from_btree = btree.insert(key, value);
                let from_avl = avl.insert(TestNode::new(key, value)).map(|n| n.value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                let from_btree = btree.get(&key).map(|&v| (key, v));
                let from_avl = avl.get(&key).map(|n| ref_entry(n.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Find(key) => {
                let from_btree = btree.get(&key).copied().ok_or(Error::KeyNotFound);
                let from_avl = avl.find(&key).map(|n| n.value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(key) => {
                remove_sorted(&mut sorted_keys, key);

                let from_btree = btree.remove(&key).map(|v| (key, v));
                let from_avl = avl.remove(&key).map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value().map(|(&k, &v)| (k, v));
                let from_avl = avl.first().map(|n| ref_entry(n.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_entry);

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value().map(|(&k, &v)| (k, v));
                let from_avl = avl.last().map(|n| ref_entry(n.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_entry);

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree
            .iter()
            .map(|(&k, &v)| (k, v))
            .eq(avl.iter().map(ref_entry)));
        assert!(
            height_within_bound(avl.height(), avl.len()),
            "height {} exceeds the bound for {} nodes",
            avl.height(),
            avl.len()
        );
    }
}
