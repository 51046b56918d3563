//! List nodes: payload, chain links, liveness flag, and the per-node lock.
//!
//! The mutable part of a node - its `prev`/`next` links and `active` flag -
//! lives in an [`UnsafeCell`] guarded by the node's own [`RmwLock`]. Every
//! accessor documents the lock mode it requires; the list's traversal
//! protocol is what makes those preconditions hold.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::rmwlock::RmwLock;

/// What a node carries. Sentinels have no payload at all, so a sentinel key
/// can never be confused with user data.
pub(crate) enum NodeKind<K, V> {
    /// The permanent front sentinel. Its successor is the smallest-keyed
    /// node (or the tail when the list is empty); its predecessor is `None`.
    Head,

    /// The permanent back sentinel. Its predecessor is the largest-keyed
    /// node (or the head when the list is empty); its successor is `None`.
    Tail,

    /// A live key/value binding. Both fields are immutable after insertion.
    Data { key: K, value: V },
}

/// The lock-guarded mutable fields.
pub(crate) struct Links<K, V> {
    /// Strong back-pointer. `None` only on the head sentinel, and on every
    /// node once teardown has run.
    pub(crate) prev: Option<Arc<Node<K, V>>>,

    /// Strong forward-pointer. `None` only on the tail sentinel, and on
    /// nodes already passed by the teardown walk.
    pub(crate) next: Option<Arc<Node<K, V>>>,

    /// False iff the node has been unlinked from the live chain. Monotone:
    /// once false, forever false. Sentinels are always active.
    pub(crate) active: bool,
}

/// One node of the concurrent list.
pub(crate) struct Node<K, V> {
    pub(crate) kind: NodeKind<K, V>,
    links: UnsafeCell<Links<K, V>>,
    pub(crate) lock: RmwLock,
}

// SAFETY: `links` is the only non-Sync field, and it is only ever read under
// the node's `RmwLock` in a shared mode and written under it in `WRITE` mode
// (construction and teardown run with exclusive access to the whole list).
// The lock's internal mutex provides the necessary synchronization for the
// cell's contents, including the `Arc` link fields, which require `K` and
// `V` to be `Send + Sync` to be shared across threads.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for Node<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Node<K, V> {}

impl<K, V> Node<K, V> {
    /// Create an unlinked sentinel. The list wires `prev`/`next` before the
    /// node is ever shared.
    pub(crate) fn sentinel(kind: NodeKind<K, V>) -> Arc<Self> {
        debug_assert!(!matches!(&kind, NodeKind::Data { .. }));
        Arc::new(Self {
            kind,
            links: UnsafeCell::new(Links {
                prev: None,
                next: None,
                active: true,
            }),
            lock: RmwLock::new(),
        })
    }

    /// Create a data node already pointing at its future neighbors. The
    /// caller splices it in under `WRITE` locks on both.
    pub(crate) fn data(
        key: K,
        value: V,
        prev: Arc<Node<K, V>>,
        next: Arc<Node<K, V>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind: NodeKind::Data { key, value },
            links: UnsafeCell::new(Links {
                prev: Some(prev),
                next: Some(next),
                active: true,
            }),
            lock: RmwLock::new(),
        })
    }

    /// Raw access to the link cell, for list construction and teardown where
    /// the list holds exclusive access and takes no locks.
    pub(crate) fn links_ptr(&self) -> *mut Links<K, V> {
        self.links.get()
    }

    /// The node's successor.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in any mode, and the node must
    /// not be the tail sentinel (the only live node without a successor).
    pub(crate) unsafe fn next(&self) -> Arc<Node<K, V>> {
        // SAFETY: holding the lock in any mode excludes the WRITE holders
        // that are the only mutators of `links`.
        let links = unsafe { &*self.links.get() };
        debug_assert!(links.next.is_some(), "next() on the tail sentinel");
        // SAFETY: per the precondition, only the tail has `next == None`.
        unsafe { links.next.clone().unwrap_unchecked() }
    }

    /// The node's predecessor.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in any mode, and the node must
    /// not be the head sentinel (the only live node without a predecessor).
    pub(crate) unsafe fn prev(&self) -> Arc<Node<K, V>> {
        // SAFETY: see `next()`.
        let links = unsafe { &*self.links.get() };
        debug_assert!(links.prev.is_some(), "prev() on the head sentinel");
        // SAFETY: per the precondition, only the head has `prev == None`.
        unsafe { links.prev.clone().unwrap_unchecked() }
    }

    /// Whether the node is still linked into the live chain.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in any mode.
    pub(crate) unsafe fn is_active(&self) -> bool {
        // SAFETY: any lock mode excludes the WRITE holder that flips this.
        unsafe { (*self.links.get()).active }
    }

    /// Redirect the forward pointer.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in `WRITE` mode.
    pub(crate) unsafe fn set_next(&self, next: Arc<Node<K, V>>) {
        // SAFETY: WRITE excludes every other holder, shared or exclusive.
        unsafe { (*self.links.get()).next = Some(next) };
    }

    /// Redirect the back pointer.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in `WRITE` mode.
    pub(crate) unsafe fn set_prev(&self, prev: Arc<Node<K, V>>) {
        // SAFETY: WRITE excludes every other holder, shared or exclusive.
        unsafe { (*self.links.get()).prev = Some(prev) };
    }

    /// Mark the node unlinked. Called exactly once, during its unlink splice.
    ///
    /// # Safety
    ///
    /// The caller must hold this node's lock in `WRITE` mode.
    pub(crate) unsafe fn deactivate(&self) {
        // SAFETY: WRITE excludes every other holder, shared or exclusive.
        unsafe { (*self.links.get()).active = false };
    }
}
