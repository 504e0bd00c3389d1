//! An intrusive AVL tree.
//!
//! Nodes embed a [`Links`] value and are handed to the tree through [`cordyceps::Linked`]
//! handles. The tree owns every node from insertion until removal.
#![cfg_attr(not(feature = "std"), no_std)]

// Conventions used in comments:
// - The balance factor of a node `x` is denoted `b(x)`.
// - The height of the subtree rooted at `x` is denoted `h(x)`; a missing subtree has height 0.
// - The parent of a node `x` is denoted `p(x)`.
//
// The fundamental invariants of an AVL tree are:
// 1. Every key in the left subtree of `x` is less than `x`'s key, which is less than every key in
//    its right subtree.
// 2. `b(x) = h(right(x)) - h(left(x))`.
// 3. `b(x)` is -1, 0 or 1.
//
// Invariant (3) only holds between operations. During a fix-up a single node may reach -2 or 2
// before the rotation that repairs it.
//
// Rotations shift the balance factors of the two nodes they move by a fixed amount: -1 for a left
// rotation, +1 for a right rotation. This is only correct from the shapes the fix-ups rotate in,
// and the fix-ups assign the final balance factor of every node whose children changed.

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;
use log::{debug, trace};

mod error;
mod iter;
#[cfg(feature = "alloc")]
mod map;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use map::{AvlMap, MapIter};

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Every node tracks the difference between the heights of its right and left subtrees and
/// keeps it within one, so the height of a tree with `n` nodes never exceeds about
/// `1.44 * log2(n + 2)`.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    // The amount a taller subtree on this side contributes to the balance factor.
    #[inline]
    fn sign(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

// Where a key would be linked into the tree.
enum InsertionPoint<T: ?Sized> {
    Root,
    Occupied(NonNull<T>),
    Child { parent: NonNull<T>, dir: Dir },
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns an iterator over the elements of the tree, in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Checks every structural invariant of the tree, panicking on the first violation.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let count = match self.root {
            Some(root) => unsafe {
                assert_eq!(self.links(root).parent(), None, "root has a parent pointer");
                self.assert_invariants_at(root, None, None).1
            },
            None => 0,
        };

        assert_eq!(count, self.len, "node count does not match `len`");
    }

    // Returns the height and the node count of the subtree rooted at `node`, whose keys must lie
    // strictly between `lower` and `upper`.
    unsafe fn assert_invariants_at<'a>(
        &self,
        node: NonNull<T>,
        lower: Option<&'a T::Key>,
        upper: Option<&'a T::Key>,
    ) -> (usize, usize)
    where
        T: 'a,
    {
        unsafe {
            let key: &'a T::Key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower < key, "{key:?} is out of order after {lower:?}");
            }

            if let Some(upper) = upper {
                assert!(key < upper, "{key:?} is out of order before {upper:?}");
            }

            let mut heights = [0; 2];
            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = self.links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let (lower, upper) = match dir {
                        Dir::Left => (lower, Some(key)),
                        Dir::Right => (Some(key), upper),
                    };

                    let (height, n) = self.assert_invariants_at(child, lower, upper);
                    heights[dir as usize] = height;
                    count += n;
                }
            }

            let actual =
                heights[Dir::Right as usize] as isize - heights[Dir::Left as usize] as isize;
            let balance = self.links(node).balance();

            assert_eq!(
                balance as isize, actual,
                "balance factor of {key:?} does not match its subtree heights"
            );
            assert!((-1..=1).contains(&balance), "{key:?} is unbalanced");

            (1 + heights[0].max(heights[1]), count)
        }
    }

    /// Returns the number of nodes on the longest path from the root to a leaf.
    #[doc(hidden)]
    pub fn height(&self) -> usize {
        unsafe { self.height_at(self.root) }
    }

    unsafe fn height_at(&self, link: Link<T>) -> usize {
        let Some(node) = link else {
            return 0;
        };

        unsafe {
            let links = self.links(node);
            1 + self.height_at(links.left()).max(self.height_at(links.right()))
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// The node's key must not be changed through the returned reference.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns a reference to the node corresponding to `key`, or [`Error::KeyNotFound`].
    pub fn find<Q>(&self, key: &Q) -> Result<Pin<&T>, Error>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.insertion_point(key) {
            InsertionPoint::Occupied(node) => Some(node),
            InsertionPoint::Root | InsertionPoint::Child { .. } => None,
        }
    }

    // Descends from the root towards `key`, stopping at the node holding it or at the empty slot
    // it would be linked into.
    fn insertion_point<Q>(&self, key: &Q) -> InsertionPoint<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return InsertionPoint::Root;
        };

        loop {
            let dir = match key.cmp(unsafe { cur.as_ref().key().borrow() }) {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return InsertionPoint::Occupied(cur),
                Ordering::Greater => Dir::Right,
            };

            match unsafe { self.links(cur).child(dir) } {
                Some(child) => cur = child,
                None => return InsertionPoint::Child { parent: cur, dir },
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let first = self.extreme(Dir::Left)?;
        unsafe { Some(Pin::new_unchecked(first.as_ref())) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let last = self.extreme(Dir::Right)?;
        unsafe { Some(Pin::new_unchecked(last.as_ref())) }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.extreme(Dir::Left)?;
        Some(unsafe { self.remove_at(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.extreme(Dir::Right)?;
        Some(unsafe { self.remove_at(last) })
    }

    fn extreme(&self, dir: Dir) -> Link<T> {
        let root = self.root?;
        Some(unsafe { self.extreme_in_subtree(root, dir) })
    }

    // Returns the node reached by following `dir` links from `root` until there are none left.
    #[inline]
    unsafe fn extreme_in_subtree(&self, root: NonNull<T>, dir: Dir) -> NonNull<T> {
        let mut cur = root;

        while let Some(next) = unsafe { self.links(cur).child(dir) } {
            cur = next;
        }

        cur
    }

    // Returns the in-order neighbor of `node` in direction `dir`.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = self.links(node).child(dir) {
                return Some(self.extreme_in_subtree(child, !dir));
            }

            // Climb until `cur` hangs off the opposite side of its parent.
            let mut cur = node;
            loop {
                let parent = self.links(cur).parent()?;

                if self.which_child(parent, cur) == !dir {
                    return Some(parent);
                }

                cur = parent;
            }
        }
    }

    // Returns the node with the largest key less than `node`'s key.
    #[inline]
    unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    // Returns the node with the smallest key greater than `node`'s key.
    #[inline]
    unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert!(
                new_child.is_none() || self.links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            self.links_mut(parent).set_child(dir, new_child);
        }
    }

    // Returns which side of `parent` the node `child` hangs off.
    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        let links = unsafe { self.links(parent) };

        if links.left() == Some(child) {
            Dir::Left
        } else {
            assert_eq!(
                links.right(),
                Some(child),
                "`child` must be a child of `parent`"
            );
            Dir::Right
        }
    }

    // Returns `true` if `node` hangs off `parent` on the same side that `parent` hangs off
    // `grandparent`.
    unsafe fn is_zig_zig(
        &self,
        node: NonNull<T>,
        parent: NonNull<T>,
        grandparent: NonNull<T>,
    ) -> bool {
        unsafe { self.which_child(grandparent, parent) == self.which_child(parent, node) }
    }

    // Rotates the subtree rooted at `down` in direction `dir`: the `!dir` child of `down` takes its
    // place and `down` becomes that child's `dir` child. `rotate(n, Dir::Left)` is a left rotation
    // at `n`, and `rotate(n, Dir::Right)` a right rotation.
    //
    // The balance factors of both nodes are shifted by `dir.sign()`.
    fn rotate(&mut self, down: NonNull<T>, dir: Dir) {
        unsafe {
            let up = self
                .links(down)
                .child(!dir)
                .expect("rotation requires a child on the rising side");

            trace!("rotate {dir:?} at {:?}", down.as_ref().key());

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let across = self.links(up).child(dir);
            self.links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            self.links_mut(up).set_child(dir, Some(down));
            let parent = self.links_mut(down).set_parent(Some(up));
            self.links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            self.links_mut(down).update_balance(dir.sign());
            self.links_mut(up).update_balance(dir.sign());
        }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already holds an item with an equal key, `item` takes its place without
    /// changing the shape of the tree, and the previous item is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        unsafe {
            match self.insertion_point(ptr.as_ref().key()) {
                InsertionPoint::Root => self.insert_as_root(ptr),
                InsertionPoint::Child { parent, dir } => self.insert_as_child(parent, dir, ptr),
                InsertionPoint::Occupied(existing) => {
                    return Some(self.replace_node(existing, ptr));
                }
            }
        }

        None
    }

    unsafe fn insert_as_root(&mut self, ptr: NonNull<T>) {
        debug_assert!(self.root.is_none());

        unsafe {
            self.links_mut(ptr).clear();
            debug!("inserted {:?} as root", ptr.as_ref().key());
        }

        self.root = Some(ptr);
        self.len += 1;
    }

    unsafe fn insert_as_child(&mut self, parent: NonNull<T>, dir: Dir, ptr: NonNull<T>) {
        unsafe {
            let links = self.links_mut(ptr);
            links.clear();
            links.set_parent(Some(parent));

            let prev = self.links_mut(parent).set_child(dir, Some(ptr));
            debug_assert!(prev.is_none(), "insertion point is occupied");

            self.len += 1;
            debug!("inserted {:?}", ptr.as_ref().key());

            // If `parent` was leaning away from `dir` its height is unchanged.
            if self.links_mut(parent).update_balance(dir.sign()) != 0 {
                self.rebalance_inserted(ptr, parent);
            }
        }
    }

    // Links `new` into the exact position of `old` and returns `old`. The shape of the tree and
    // all balance factors are unchanged.
    unsafe fn replace_node(&mut self, old: NonNull<T>, new: NonNull<T>) -> T::Handle {
        unsafe {
            let old_links = self.links(old);
            let parent = old_links.parent();
            let left = old_links.left();
            let right = old_links.right();
            let balance = old_links.balance();

            self.replace_child_or_set_root(parent, old, Some(new));
            self.maybe_set_parent(left, Some(new));
            self.maybe_set_parent(right, Some(new));

            let new_links = self.links_mut(new);
            new_links.set_parent(parent);
            new_links.set_left(left);
            new_links.set_right(right);
            new_links.set_balance(balance);

            self.links_mut(old).clear();
            trace!("replaced {:?}", new.as_ref().key());

            T::from_ptr(old)
        }
    }

    // Performs a bottom-up rebalance of the tree after the insertion of a leaf.
    //
    // Invariants:
    // - `node` is a child of `parent`.
    // - `h(parent)` grew by one, and `b(parent)` is -1 or 1.
    fn rebalance_inserted(&mut self, mut node: NonNull<T>, mut parent: NonNull<T>) {
        unsafe {
            loop {
                let Some(grandparent) = self.links(parent).parent() else {
                    trace!("insert fix-up reached the root");
                    return;
                };

                let dir = self.which_child(grandparent, parent);

                match self.links_mut(grandparent).update_balance(dir.sign()) {
                    // The shorter side of `grandparent` caught up; its height is unchanged.
                    0 => return,

                    // `grandparent` grew by one level. Ascend.
                    -1 | 1 => (node, parent) = (parent, grandparent),

                    // `grandparent` is two levels heavier on `dir`.
                    _ => {
                        if self.is_zig_zig(node, parent, grandparent) {
                            self.rotate(grandparent, !dir);

                            self.links_mut(parent).set_balance(0);
                            self.links_mut(grandparent).set_balance(0);
                        } else {
                            let node_balance = self.links(node).balance();

                            self.rotate(parent, dir);
                            self.rotate(grandparent, !dir);

                            // `parent` keeps `node`'s inner subtree on its own side, and
                            // `grandparent` keeps the other one.
                            let sign = dir.sign();
                            let (parent_balance, grandparent_balance) = match node_balance {
                                0 => (0, 0),
                                b if b == sign => (0, -sign),
                                _ => (sign, 0),
                            };

                            self.links_mut(parent).set_balance(parent_balance);
                            self.links_mut(grandparent).set_balance(grandparent_balance);
                            self.links_mut(node).set_balance(0);
                        }

                        // The rotated subtree is back to its height before the insertion.
                        return;
                    }
                }
            }
        }
    }

    /// Removes the element corresponding to `key` from the tree and returns it.
    ///
    /// Returns `None`, leaving the tree untouched, if no element corresponds to `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let links = self.links(node);

            if links.left().is_some() && links.right().is_some() {
                // The predecessor has no right child. Once the two trade places, `node` can be
                // unlinked like any node with at most one child.
                let predecessor = self
                    .predecessor_raw(node)
                    .expect("a node with a left child has a predecessor");
                self.swap_nodes(node, predecessor);
            }

            let links = self.links(node);
            let parent = links.parent();
            let child = links.left().or(links.right());

            self.maybe_set_parent(child, parent);

            let diff = match parent {
                Some(parent) => {
                    let dir = self.which_child(parent, node);
                    self.links_mut(parent).set_child(dir, child);

                    // `parent` lost a level on `dir`.
                    -dir.sign()
                }

                None => {
                    self.root = child;
                    0
                }
            };

            debug!("removed {:?}", node.as_ref().key());

            self.links_mut(node).clear();
            self.len -= 1;

            self.rebalance_removed(parent, diff);

            T::from_ptr(node)
        }
    }

    // Performs a bottom-up rebalance of the tree after a node was unlinked below `opt_node`.
    //
    // `diff` is the change to `b(opt_node)` caused by one of its subtrees losing a level.
    fn rebalance_removed(&mut self, mut opt_node: Link<T>, mut diff: i8) {
        while let Some(node) = opt_node {
            unsafe {
                let parent = self.links(node).parent();

                // Computed before any rotation moves `node` away from `parent`.
                let next_diff = match parent {
                    Some(parent) => -self.which_child(parent, node).sign(),
                    None => 0,
                };

                let balance = self.links(node).balance() + diff;

                if balance == diff {
                    // `node` was balanced; the taller side still holds its height.
                    self.links_mut(node).set_balance(balance);
                    trace!("remove fix-up absorbed at {:?}", node.as_ref().key());
                    return;
                }

                if balance == 0 {
                    // The taller side shrank to match the other.
                    self.links_mut(node).set_balance(0);
                } else {
                    debug_assert_eq!(balance, 2 * diff);

                    let heavy = if diff < 0 { Dir::Left } else { Dir::Right };
                    if !self.rebalance_heavy(node, heavy) {
                        return;
                    }
                }

                opt_node = parent;
                diff = next_diff;
            }
        }

        trace!("remove fix-up reached the root");
    }

    // Restores balance at `node`, whose `heavy` subtree is two levels taller than the other.
    //
    // Returns `true` if the rotated subtree ended up a level shorter than `node`'s subtree was
    // before the removal.
    unsafe fn rebalance_heavy(&mut self, node: NonNull<T>, heavy: Dir) -> bool {
        unsafe {
            let sign = heavy.sign();
            let child = self
                .links(node)
                .child(heavy)
                .expect("the heavy side of an unbalanced node has a child");
            let child_balance = self.links(child).balance();

            if child_balance == sign {
                self.rotate(node, !heavy);

                self.links_mut(node).set_balance(0);
                self.links_mut(child).set_balance(0);

                true
            } else if child_balance == 0 {
                self.rotate(node, !heavy);

                self.links_mut(node).set_balance(sign);
                self.links_mut(child).set_balance(-sign);

                false
            } else {
                let grandchild = self
                    .links(child)
                    .child(!heavy)
                    .expect("a child leaning inwards has an inner child");
                let grandchild_balance = self.links(grandchild).balance();

                self.rotate(child, heavy);
                self.rotate(node, !heavy);

                let (node_balance, child_balance) = match grandchild_balance {
                    0 => (0, 0),
                    b if b == sign => (-sign, 0),
                    _ => (0, sign),
                };

                self.links_mut(node).set_balance(node_balance);
                self.links_mut(child).set_balance(child_balance);
                self.links_mut(grandchild).set_balance(0);

                true
            }
        }
    }

    // Exchanges the positions of `a` and `b` in the tree.
    //
    // Balance factors describe a position rather than a node, so they are exchanged as well.
    unsafe fn swap_nodes(&mut self, a: NonNull<T>, b: NonNull<T>) {
        if same_node(a, b) {
            return;
        }

        // Rewrites links between the two nodes so that they point the other way.
        let swapped = |link: Link<T>| match link {
            Some(n) if same_node(n, a) => Some(b),
            Some(n) if same_node(n, b) => Some(a),
            other => other,
        };

        unsafe {
            let (a_parent, a_left, a_right, a_balance) = self.links(a).snapshot();
            let (b_parent, b_left, b_right, b_balance) = self.links(b).snapshot();

            // Read before any links change, so siblings resolve to their own slots.
            let a_slot = a_parent
                .filter(|&p| !same_node(p, b))
                .map(|p| (p, self.which_child(p, a)));
            let b_slot = b_parent
                .filter(|&p| !same_node(p, a))
                .map(|p| (p, self.which_child(p, b)));

            let links = self.links_mut(a);
            links.set_parent(swapped(b_parent));
            links.set_left(swapped(b_left));
            links.set_right(swapped(b_right));
            links.set_balance(b_balance);

            let links = self.links_mut(b);
            links.set_parent(swapped(a_parent));
            links.set_left(swapped(a_left));
            links.set_right(swapped(a_right));
            links.set_balance(a_balance);

            for (node, old_parent, slot) in [(b, a_parent, a_slot), (a, b_parent, b_slot)] {
                match (old_parent, slot) {
                    (None, _) => self.root = Some(node),
                    (Some(_), Some((parent, dir))) => {
                        self.links_mut(parent).set_child(dir, Some(node));
                    }
                    // The old parent was the other node, which already points here.
                    (Some(_), None) => (),
                }
            }

            for node in [a, b] {
                let links = self.links(node);
                let (left, right) = (links.left(), links.right());
                self.maybe_set_parent(left, Some(node));
                self.maybe_set_parent(right, Some(node));
            }

            trace!("swapped {:?} and {:?}", a.as_ref().key(), b.as_ref().key());
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = self.extreme_in_subtree(cur, Dir::Left);
                let parent = self.links(cur).parent();
                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }
}

// Compares node addresses, ignoring any pointer metadata.
fn same_node<T: ?Sized>(a: NonNull<T>, b: NonNull<T>) -> bool {
    core::ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'tree, T> IntoIterator for &'tree AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    // Returns the parent, left child, right child and balance factor.
    #[inline]
    fn snapshot(&self) -> (Link<T>, Link<T>, Link<T>, i8) {
        (self.parent(), self.left(), self.right(), self.balance())
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        self.inner.get_mut().balance = balance;
    }

    // Adds `diff` to the balance factor and returns the result.
    #[inline]
    fn update_balance(&mut self, diff: i8) -> i8 {
        let inner = self.inner.get_mut();
        inner.balance = inner
            .balance
            .checked_add(diff)
            .filter(|balance| (-2..=2).contains(balance))
            .expect("balance factor out of range");
        inner.balance
    }

    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
