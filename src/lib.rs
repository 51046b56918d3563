//! # crablist
//!
//! A concurrent ordered map implemented as a sorted doubly-linked list with
//! per-node fine-grained locking.
//!
//! Two pieces make up the crate:
//!
//! - [`RmwLock`] - a fair READ / MAY_WRITE / WRITE lock with FIFO admission,
//!   reader coalescing, and a priority upgrade path from the may-write
//!   reservation to exclusive mode.
//! - [`CrabList`] - the list itself. Traversals crab hand-over-hand over the
//!   per-node locks; mutations reserve their neighborhood in `MAY_WRITE`
//!   while walking and promote to `WRITE` in place to splice.
//!
//! ## Concurrency Model
//!
//! Every observable operation on a key is linearizable, and operations on
//! disjoint regions of the list run in parallel. Locks are acquired in
//! forward chain order everywhere, which keeps the protocol deadlock-free;
//! the fairness of the per-node locks makes every acquire complete under a
//! fair scheduler.
//!
//! ## Example
//!
//! ```
//! use crablist::CrabList;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let list = Arc::new(CrabList::new());
//!
//! let writers: Vec<_> = (0..4)
//!     .map(|t| {
//!         let list = Arc::clone(&list);
//!         thread::spawn(move || {
//!             for k in (t * 100)..(t * 100 + 100) {
//!                 list.insert_head(k, k * 2);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for w in writers {
//!     w.join().unwrap();
//! }
//!
//! assert_eq!(list.search(&250), Some(500));
//! ```

#![warn(clippy::unwrap_used)]

mod node;
mod sync;
mod tracing_helpers;

pub mod list;
pub mod rmwlock;

pub use list::CrabList;
pub use rmwlock::RmwLock;
