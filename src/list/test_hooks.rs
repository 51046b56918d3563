//! Quiescent inspection hooks for tests.
//!
//! The list deliberately exposes no iteration API, but the test suites need
//! to observe the chain after the threads are done: structural invariants,
//! final key sets, traversal order. These hooks take `&mut self`, so the
//! borrow checker itself enforces the quiescence they rely on - no lock is
//! taken anywhere here.
//!
//! Hidden from docs: this is test plumbing, not API surface.

use std::sync::Arc;

use super::CrabList;
use crate::node::{Node, NodeKind};

/// Walk cap: a chain longer than this is assumed to be a cycle.
const MAX_CHAIN_STEPS: usize = 10_000_000;

impl<K: Ord, V> CrabList<K, V> {
    /// Assert the structural invariants of the quiescent chain:
    ///
    /// - the forward walk from the head reaches the tail (and only then);
    /// - every adjacent pair is doubly linked (`a.next == b` iff `b.prev == a`);
    /// - data-node keys are strictly increasing;
    /// - every reachable node is active;
    /// - the sentinels terminate the chain (`head.prev` and `tail.next` are
    ///   unset).
    ///
    /// # Panics
    ///
    /// Panics on the first violated invariant.
    #[doc(hidden)]
    pub fn check_invariants(&mut self) {
        let chain = self.chain();

        assert!(
            matches!(chain.first().map(|n| &n.kind), Some(NodeKind::Head)),
            "chain does not start at the head sentinel"
        );
        assert!(
            matches!(chain.last().map(|n| &n.kind), Some(NodeKind::Tail)),
            "chain does not end at the tail sentinel"
        );

        // SAFETY: `&mut self` guarantees quiescence; the cells are ours.
        unsafe {
            assert!(
                (*self.head.links_ptr()).prev.is_none(),
                "head sentinel has a predecessor"
            );
            assert!(
                (*self.tail.links_ptr()).next.is_none(),
                "tail sentinel has a successor"
            );

            for pair in chain.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);

                let b_prev = (*b.links_ptr())
                    .prev
                    .clone()
                    .expect("non-head node without a predecessor");
                assert!(
                    Arc::ptr_eq(&b_prev, a),
                    "prev link does not mirror next link"
                );

                if let (NodeKind::Data { key: ka, .. }, NodeKind::Data { key: kb, .. }) =
                    (&a.kind, &b.kind)
                {
                    assert!(ka < kb, "keys are not strictly increasing");
                }

                assert!((*a.links_ptr()).active, "inactive node reachable from head");
                assert!((*b.links_ptr()).active, "inactive node reachable from head");
            }
        }
    }

    /// Snapshot the live entries in chain (key) order.
    #[doc(hidden)]
    pub fn collect(&mut self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.chain()
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Data { key, value } => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// The full chain from head to tail, sentinels included.
    fn chain(&mut self) -> Vec<Arc<Node<K, V>>> {
        let mut chain = vec![Arc::clone(&self.head)];

        // SAFETY: `&mut self` guarantees quiescence; the cells are ours.
        unsafe {
            loop {
                let current = Arc::clone(chain.last().unwrap_or(&self.head));
                if Arc::ptr_eq(&current, &self.tail) {
                    break;
                }
                let next = (*current.links_ptr())
                    .next
                    .clone()
                    .expect("forward chain broken before the tail");
                chain.push(next);
                assert!(chain.len() <= MAX_CHAIN_STEPS, "forward chain does not terminate");
            }
        }

        chain
    }
}
