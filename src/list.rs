//! Filepath: src/list.rs
//!
//! `CrabList` - a concurrent ordered map over a doubly-linked list.
//!
//! The list keeps its nodes sorted by key between two permanent sentinels and
//! synchronizes every operation with per-node [`RmwLock`]s, acquired
//! hand-over-hand in forward chain order ("crabbing"):
//!
//! - Lookups crab in `READ` mode holding one lock at a time: the successor's
//!   lock is taken before the current one is dropped, so no mutator can slip
//!   into the gap.
//! - Mutations crab in `MAY_WRITE` mode holding the candidate pair
//!   `(prev, next)`, then promote both to `WRITE` in place to splice.
//!
//! Locks are only ever acquired in forward chain order; the one backward
//! probe ([`CrabList::insert_tail`]) holds at most a single lock at a time,
//! so it cannot close a cycle. That makes the whole protocol deadlock-free,
//! and the per-key serialization it induces makes every operation
//! linearizable: a mutation takes effect at the instant it holds `WRITE` on
//! the affected pair, a lookup at the instant it reads the candidate under
//! `READ`.
//!
//! [`RmwLock`]: crate::rmwlock::RmwLock

use std::fmt;
use std::sync::Arc;

use crate::node::{Node, NodeKind};
use crate::tracing_helpers::trace_log;

#[doc(hidden)]
pub mod test_hooks;


// ============================================================================
//  CrabList
// ============================================================================

/// A sorted doubly-linked list acting as a concurrent map.
///
/// Any number of threads may call [`insert_head`], [`insert_tail`],
/// [`delete`], and [`search`] concurrently on the same list. Operations on
/// disjoint regions of the chain proceed in parallel; operations on the same
/// neighborhood serialize through the per-node locks.
///
/// Keys are unique: inserting a key that is already present fails and leaves
/// the existing binding untouched.
///
/// # Example
///
/// ```
/// use crablist::CrabList;
///
/// let list: CrabList<i32, char> = CrabList::new();
/// assert!(list.insert_head(5, 'a'));
/// assert_eq!(list.search(&5), Some('a'));
/// assert!(list.delete(&5));
/// assert_eq!(list.search(&5), None);
/// ```
///
/// [`insert_head`]: CrabList::insert_head
/// [`insert_tail`]: CrabList::insert_tail
/// [`delete`]: CrabList::delete
/// [`search`]: CrabList::search
pub struct CrabList<K, V> {
    head: Arc<Node<K, V>>,
    tail: Arc<Node<K, V>>,
}

impl<K: Ord, V> CrabList<K, V> {
    /// Create an empty list: the two sentinels, linked to each other.
    #[must_use]
    pub fn new() -> Self {
        let head = Node::sentinel(NodeKind::Head);
        let tail = Node::sentinel(NodeKind::Tail);

        // SAFETY: the nodes are not shared yet; this is plain initialization.
        unsafe {
            (*head.links_ptr()).next = Some(Arc::clone(&tail));
            (*tail.links_ptr()).prev = Some(Arc::clone(&head));
        }

        Self { head, tail }
    }

    // ========================================================================
    //  Public operations
    // ========================================================================

    /// Insert `key`/`value`, searching for the slot from the head.
    ///
    /// Returns `false` (and drops `value`) if the key is already present.
    pub fn insert_head(&self, key: K, value: V) -> bool {
        trace_log!("insert_head: start");
        self.head.lock.lock_may_write();
        self.insert_from(Arc::clone(&self.head), key, value)
    }

    /// Insert `key`/`value`, probing backward from the tail for the slot.
    ///
    /// Same contract as [`insert_head`]; cheaper when the caller knows the
    /// key is larger than most of the list.
    ///
    /// [`insert_head`]: CrabList::insert_head
    pub fn insert_tail(&self, key: K, value: V) -> bool {
        trace_log!("insert_tail: start");

        // Snapshot the last node, then let go of the tail before locking it:
        // holding both would run against the global forward lock order and
        // deadlock with a forward walker.
        self.tail.lock.lock_read();
        // SAFETY: we hold the tail's lock; the tail has a predecessor.
        let mut prev = unsafe { self.tail.prev() };
        self.tail.lock.unlock_shared();

        prev.lock.lock_may_write();

        // Step back while the probe sits past the key, or while it landed on
        // a node that was unlinked in the unlocked gap above. At most one
        // lock is held throughout, so the backward direction is harmless.
        while Self::past_key(&prev, &key) || !unsafe { prev.is_active() } {
            let released = prev;
            // SAFETY: we hold `released`'s lock; the loop condition keeps the
            // head out (it is active and carries no key), so a predecessor
            // exists.
            prev = unsafe { released.prev() };
            released.lock.unlock_shared();
            prev.lock.lock_may_write();
        }

        if matches!(&prev.kind, NodeKind::Data { key: k, .. } if *k == key) {
            trace_log!("insert_tail: duplicate key at probe position");
            prev.lock.unlock_shared();
            return false;
        }

        // The probe may sit well before the slot by now; `insert_from`
        // re-validates with a short forward walk.
        self.insert_from(prev, key, value)
    }

    /// Remove the binding for `key`. Returns `false` if it is absent.
    pub fn delete(&self, key: &K) -> bool {
        trace_log!("delete: start");
        self.head.lock.lock_may_write();
        let mut prev = Arc::clone(&self.head);
        let victim = self.find_key(&mut prev, key, false);

        if !matches!(&victim.kind, NodeKind::Data { key: k, .. } if k == key) {
            trace_log!("delete: key not found");
            prev.lock.unlock_shared();
            victim.lock.unlock_shared();
            return false;
        }

        prev.lock.upgrade();
        victim.lock.upgrade();

        // The victim's successor is locked in WRITE directly, without the
        // MAY_WRITE step: our WRITE on the victim stops every traversal from
        // passing through, so no hand-over-hand walker can already be parked
        // between the victim and its successor. The acquisition is still in
        // forward chain order.
        // SAFETY: we hold the victim's lock, and a data node has a successor.
        let next = unsafe { victim.next() };
        next.lock.lock_write();

        // SAFETY: WRITE is held on all three nodes.
        unsafe {
            prev.set_next(Arc::clone(&next));
            next.set_prev(Arc::clone(&prev));
            victim.deactivate();
        }

        prev.lock.unlock_exclusive();
        victim.lock.unlock_exclusive();
        next.lock.unlock_exclusive();
        true
    }

    /// Look up `key`, returning a clone of its value if present.
    pub fn search(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        trace_log!("search: start");
        self.head.lock.lock_read();
        let mut prev = Arc::clone(&self.head);
        let candidate = self.find_key(&mut prev, key, true);

        // `active` read under our READ lock is decisive: unlinking requires
        // WRITE on the candidate, which our hold excludes.
        let result = match &candidate.kind {
            // SAFETY: we hold the candidate's lock.
            NodeKind::Data { key: k, value } if k == key && unsafe { candidate.is_active() } => {
                Some(value.clone())
            }
            _ => None,
        };

        candidate.lock.unlock_shared();
        result
    }

    // ========================================================================
    //  Traversal
    // ========================================================================

    /// Whether the walk has not yet reached the candidate: `next` is still
    /// strictly before `key`, or is the head (the backward probe of
    /// `insert_tail` can hand in a start position whose successor is the
    /// head-side of the chain; a forward walk from the head never sees this).
    fn keep_walking(next: &Node<K, V>, key: &K) -> bool {
        match &next.kind {
            NodeKind::Head => true,
            NodeKind::Tail => false,
            NodeKind::Data { key: k, .. } => k < key,
        }
    }

    /// Whether the backward probe position is still past `key`.
    fn past_key(prev: &Node<K, V>, key: &K) -> bool {
        matches!(&prev.kind, NodeKind::Data { key: k, .. } if *k > *key)
    }

    /// One hand-over-hand step toward the tail.
    ///
    /// In read mode a single lock is held: the successor's `READ` lock is
    /// acquired before the current one is released. In may-write mode the
    /// pair `(prev, next)` is held: the old predecessor is released, `next`
    /// becomes the new predecessor, and its successor is locked `MAY_WRITE`.
    /// Both flavors acquire in forward chain order.
    fn advance(prev: &mut Arc<Node<K, V>>, next: &mut Arc<Node<K, V>>, is_read: bool) {
        if is_read {
            *prev = Arc::clone(next);
            // SAFETY: we hold `prev`'s READ lock, and the walk stops before
            // the tail, so a successor exists.
            let step = unsafe { prev.next() };
            step.lock.lock_read();
            prev.lock.unlock_shared();
            *next = step;
        } else {
            prev.lock.unlock_shared();
            *prev = Arc::clone(next);
            // SAFETY: we hold `prev`'s MAY_WRITE lock (it was `next` until a
            // moment ago), and the walk stops before the tail.
            let step = unsafe { prev.next() };
            step.lock.lock_may_write();
            *next = step;
        }
    }

    /// Crab forward from `position` until the first node whose key is `>=
    /// key`, or the tail. Returns that candidate; on return `position` is the
    /// candidate's predecessor.
    ///
    /// Preconditions: the caller holds `position`'s lock in `READ` mode when
    /// `is_read`, otherwise in `MAY_WRITE`; `position` is active and is not
    /// the tail. On return, the candidate's lock is held in the same mode -
    /// and in may-write mode the predecessor's lock is held as well.
    fn find_key(
        &self,
        position: &mut Arc<Node<K, V>>,
        key: &K,
        is_read: bool,
    ) -> Arc<Node<K, V>> {
        let mut prev = Arc::clone(position);
        let mut next = if is_read {
            Arc::clone(position)
        } else {
            // SAFETY: the caller holds `position`'s lock and guarantees it is
            // not the tail.
            let first = unsafe { position.next() };
            first.lock.lock_may_write();
            first
        };

        while Self::keep_walking(&next, key) {
            Self::advance(&mut prev, &mut next, is_read);
        }

        *position = prev;
        next
    }

    // ========================================================================
    //  Insertion
    // ========================================================================

    /// Insert `key`/`value` somewhere at or after `position`.
    ///
    /// Precondition: the caller holds `position`'s lock in `MAY_WRITE` mode,
    /// and `position` is active and not the tail. The lock is released before
    /// returning, whatever the outcome.
    fn insert_from(&self, position: Arc<Node<K, V>>, key: K, value: V) -> bool {
        let mut prev = position;
        let next = self.find_key(&mut prev, &key, false);

        if matches!(&next.kind, NodeKind::Data { key: k, .. } if *k == key) {
            trace_log!("insert: duplicate key rejected");
            prev.lock.unlock_shared();
            next.lock.unlock_shared();
            return false;
        }

        // Promote the pair in chain order - prev strictly before next - to
        // keep the acquisition graph acyclic.
        prev.lock.upgrade();
        next.lock.upgrade();

        let node = Node::data(key, value, Arc::clone(&prev), Arc::clone(&next));
        // SAFETY: WRITE is held on both neighbors.
        unsafe {
            prev.set_next(Arc::clone(&node));
            next.set_prev(node);
        }

        prev.lock.unlock_exclusive();
        next.lock.unlock_exclusive();
        true
    }
}

impl<K: Ord, V> Default for CrabList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for CrabList<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrabList").finish_non_exhaustive()
    }
}

impl<K, V> Drop for CrabList<K, V> {
    /// Break the `prev`/`next` reference cycles so the nodes can be freed.
    ///
    /// The caller contract (and `Drop`'s `&mut self`) guarantees quiescence,
    /// so the walk takes no locks. Each step detaches one node's back link
    /// and its predecessor's forward link, exactly inverting how splices
    /// wired them.
    fn drop(&mut self) {
        // SAFETY: exclusive access throughout; no operation can be in flight
        // once the list is being dropped.
        unsafe {
            let mut node = (*self.head.links_ptr()).next.clone();
            while let Some(current) = node {
                if Arc::ptr_eq(&current, &self.tail) {
                    break;
                }
                let links = &mut *current.links_ptr();
                if let Some(prev) = links.prev.take() {
                    (*prev.links_ptr()).next = None;
                }
                node = links.next.clone();
            }
            (*self.tail.links_ptr()).prev = None;
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(all(test, not(feature = "shuttle")))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    /// Single-threaded lifecycle of one binding.
    #[test]
    fn insert_search_delete_roundtrip() {
        let list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_head(5, 'a'));
        assert_eq!(list.search(&5), Some('a'));
        assert_eq!(list.search(&6), None);
        assert!(list.delete(&5));
        assert!(!list.delete(&5));
        assert_eq!(list.search(&5), None);
    }

    /// The chain is sorted regardless of insertion order.
    #[test]
    fn keys_stay_sorted() {
        let mut list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_head(3, 'c'));
        assert!(list.insert_head(1, 'a'));
        assert!(list.insert_head(2, 'b'));

        let entries = list.collect();
        assert_eq!(entries, vec![(1, 'a'), (2, 'b'), (3, 'c')]);
        list.check_invariants();
    }

    /// A duplicate insert fails through either entry point and leaves
    /// the existing value in place.
    #[test]
    fn duplicate_keys_rejected() {
        let list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_head(7, 'x'));
        assert!(!list.insert_tail(7, 'y'));
        assert!(!list.insert_head(7, 'z'));
        assert_eq!(list.search(&7), Some('x'));
    }

    #[test]
    fn empty_list_operations() {
        let list: CrabList<i32, char> = CrabList::new();

        assert_eq!(list.search(&1), None);
        assert!(!list.delete(&1));
    }

    #[test]
    fn insert_tail_on_empty_list() {
        let mut list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_tail(4, 'd'));
        assert_eq!(list.search(&4), Some('d'));
        list.check_invariants();
    }

    /// The backward probe has to walk all the way to the head when the key
    /// is smaller than everything in the list.
    #[test]
    fn insert_tail_smallest_key_walks_to_head() {
        let mut list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_tail(10, 'j'));
        assert!(list.insert_tail(20, 'k'));
        assert!(list.insert_tail(1, 'a'));

        assert_eq!(list.collect(), vec![(1, 'a'), (10, 'j'), (20, 'k')]);
        list.check_invariants();
    }

    #[test]
    fn mixed_entry_points_interleave() {
        let mut list: CrabList<i32, u32> = CrabList::new();

        for k in [5, 1, 9, 3, 7] {
            assert!(list.insert_head(k, (k * 10) as u32));
        }
        for k in [6, 2, 8, 4, 10] {
            assert!(list.insert_tail(k, (k * 10) as u32));
        }

        let keys: Vec<i32> = list.collect().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        list.check_invariants();
    }

    #[test]
    fn delete_first_middle_last() {
        let mut list: CrabList<i32, char> = CrabList::new();

        for (k, v) in [(1, 'a'), (2, 'b'), (3, 'c'), (4, 'd'), (5, 'e')] {
            assert!(list.insert_head(k, v));
        }

        assert!(list.delete(&1));
        assert!(list.delete(&3));
        assert!(list.delete(&5));

        assert_eq!(list.collect(), vec![(2, 'b'), (4, 'd')]);
        list.check_invariants();
    }

    #[test]
    fn delete_to_empty_and_reinsert() {
        let mut list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_head(1, 'a'));
        assert!(list.delete(&1));
        assert!(list.collect().is_empty());
        list.check_invariants();

        // The chain must be reusable after emptying out.
        assert!(list.insert_tail(1, 'b'));
        assert_eq!(list.search(&1), Some('b'));
    }

    /// Re-insertion after delete succeeds; double delete fails.
    #[test]
    fn reinsert_after_delete() {
        let list: CrabList<i32, char> = CrabList::new();

        assert!(list.insert_head(42, 'a'));
        assert!(!list.insert_tail(42, 'b'));
        assert!(list.delete(&42));
        assert!(!list.delete(&42));
        assert!(list.insert_tail(42, 'b'));
        assert_eq!(list.search(&42), Some('b'));
    }

    #[test]
    fn search_does_not_disturb_neighbors() {
        let list: CrabList<i32, char> = CrabList::new();

        for (k, v) in [(10, 'a'), (20, 'b'), (30, 'c')] {
            assert!(list.insert_head(k, v));
        }

        assert_eq!(list.search(&10), Some('a'));
        assert_eq!(list.search(&20), Some('b'));
        assert_eq!(list.search(&30), Some('c'));
        assert_eq!(list.search(&15), None);
        assert_eq!(list.search(&35), None);
    }

    #[test]
    fn larger_sequential_workload() {
        let mut list: CrabList<u32, u64> = CrabList::new();

        for k in 0..500u32 {
            let inserted = if k % 2 == 0 {
                list.insert_head(k, u64::from(k) * 3)
            } else {
                list.insert_tail(k, u64::from(k) * 3)
            };
            assert!(inserted);
        }
        for k in (0..500u32).step_by(3) {
            assert!(list.delete(&k));
        }
        for k in 0..500u32 {
            let expected = if k % 3 == 0 { None } else { Some(u64::from(k) * 3) };
            assert_eq!(list.search(&k), expected);
        }
        list.check_invariants();
    }

    /// Dropping a populated list must not leak: with the cycle-breaking walk
    /// removed, every node's Arc count would stay pinned by its neighbors.
    #[test]
    fn teardown_releases_nodes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct CountsDrops;
        impl Drop for CountsDrops {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROPS.store(0, Ordering::SeqCst);
        {
            let list: CrabList<i32, CountsDrops> = CrabList::new();
            for k in 0..10 {
                assert!(list.insert_head(k, CountsDrops));
            }
            // A deleted node's value is dropped once the last reference goes.
            assert!(list.delete(&0));
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 10);
    }
}
