use core::iter::FusedIterator;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// An in-order iterator over the elements of an [`AvlTree`].
///
/// Created by [`AvlTree::iter`].
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            tree,

            front: tree.extreme(Dir::Left),
            back: tree.extreme(Dir::Right),
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // The two ends meet once `len` runs out; the links past that point are stale.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.len -= 1;
        self.front = unsafe { self.tree.successor_raw(cur) };

        Some(unsafe { cur.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.len -= 1;
        self.back = unsafe { self.tree.predecessor_raw(cur) };

        Some(unsafe { cur.as_ref() })
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}
