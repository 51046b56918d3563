//! Filepath: src/rmwlock.rs
//!
//! A fair read / may-write / write lock.
//!
//! [`RmwLock`] admits holders in three modes:
//!
//! - `READ` - shared. Any number of readers may hold the lock together.
//! - `MAY_WRITE` - a reservation. It coexists with readers but excludes
//!   every other would-be mutator, so the holder can later promote to
//!   `WRITE` without re-entering the queue.
//! - `WRITE` - exclusive.
//!
//! Compatibility:
//!
//! |             | READ | MAY_WRITE | WRITE |
//! |-------------|:----:|:---------:|:-----:|
//! | `READ`      |  yes |    yes    |   -   |
//! | `MAY_WRITE` |  yes |     -     |   -   |
//! | `WRITE`     |   -  |     -     |   -   |
//!
//! # Fairness
//!
//! Admission is first-in-first-out. Waiters queue as `(condvar, mode, count)`
//! entries; only the front entry is ever admitted, and a batch of arriving
//! readers coalesces into a single trailing `READ` entry so the batch moves
//! through the queue together. The one exception to FIFO is [`RmwLock::upgrade`]:
//! the `MAY_WRITE` holder jumps to the front of the queue, which is sound
//! because its reservation already excluded every competing mutator.
//!
//! # Blocking model
//!
//! All waits are indefinite condition-variable waits on the lock's internal
//! mutex; there are no timeouts and no cancellation. Misuse (releasing a lock
//! that is not held, upgrading without the reservation) is a programmer error:
//! debug builds assert, release builds may corrupt the lock state (never
//! memory safety).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::sync::{Condvar, Mutex, MutexGuard, ThreadId, current_thread_id};
use crate::tracing_helpers::debug_log;

// ============================================================================
//  Mode
// ============================================================================

/// The three acquire modes, in increasing order of exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    MayWrite,
    Write,
}

// ============================================================================
//  Waiter queue
// ============================================================================

/// One queue entry: a condition variable shared by every thread waiting on
/// this position, the mode they want, and - for `Read` entries - how many
/// coalesced readers still have to pass through it.
struct Waiter {
    cond: Arc<Condvar>,
    mode: Mode,
    reader_count: u32,
}

impl Waiter {
    fn new(mode: Mode) -> Self {
        Self {
            cond: Arc::new(Condvar::new()),
            mode,
            reader_count: 1,
        }
    }
}

// ============================================================================
//  Lock state
// ============================================================================

/// Everything behind the internal mutex.
struct State {
    /// FIFO of waiting positions. Only the front entry is admissible.
    queue: VecDeque<Waiter>,

    /// Shared holders. The may-writer is counted here too: that way the last
    /// plain reader to leave while a may-writer remains does not have to
    /// consider waking anyone (a waiter could only be a mutator, and the
    /// reservation still blocks those).
    readers: u32,

    /// True iff a thread holds the lock exclusively.
    writer_held: bool,

    /// Identity of the thread holding the may-write reservation, if any.
    may_writer: Option<ThreadId>,
}

impl State {
    const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            readers: 0,
            writer_held: false,
            may_writer: None,
        }
    }

    /// Whether the lock state (ignoring the queue) permits `mode` right now.
    fn can_acquire(&self, mode: Mode) -> bool {
        match mode {
            Mode::Read => !self.writer_held,
            Mode::MayWrite => self.may_writer.is_none() && !self.writer_held,
            Mode::Write => {
                self.readers == 0 && self.may_writer.is_none() && !self.writer_held
            }
        }
    }

    /// Decide whether the caller has to wait, enqueueing it if so.
    ///
    /// Returns `false` when the caller may take the lock immediately: the
    /// queue is empty and the state permits the mode, or - for a reader - the
    /// queue holds exactly one `Read` entry and the state is read-grantable,
    /// in which case the arrival joins the batch currently being admitted.
    ///
    /// A waiting reader merges into the queue's trailing `Read` entry when
    /// there is one (bumping its count) instead of pushing a new entry, so an
    /// arriving burst of readers occupies a single queue position.
    fn should_wait(&mut self, mode: Mode) -> bool {
        let should_wait = match self.queue.front() {
            None => !self.can_acquire(mode),
            Some(front) => {
                self.queue.len() > 1
                    || mode != Mode::Read
                    || front.mode != Mode::Read
                    || !self.can_acquire(mode)
            }
        };

        if should_wait && mode == Mode::Read {
            if let Some(back) = self.queue.back_mut() {
                if back.mode == Mode::Read {
                    debug_assert!(back.reader_count > 0);
                    back.reader_count += 1;
                    // The batch's condvar is already queued; nothing to insert.
                    return true;
                }
            }
        }

        if should_wait {
            self.queue.push_back(Waiter::new(mode));
        }

        should_wait
    }

    /// Wake the front entry iff its mode is grantable against the current
    /// state. The check matters: waking a writer that still has readers ahead
    /// of it would only bounce it straight back into its wait.
    fn try_notify_front(&self) {
        if let Some(front) = self.queue.front() {
            if self.can_acquire(front.mode) {
                front.cond.notify_all();
            }
        }
    }
}

// ============================================================================
//  RmwLock
// ============================================================================

/// A fair tri-mode lock. See the module docs for the admission rules.
///
/// # Example
///
/// ```
/// use crablist::RmwLock;
///
/// let lock = RmwLock::new();
///
/// lock.lock_may_write();   // traverse with a reader's footprint
/// lock.upgrade();          // commit: promote to exclusive, ahead of the queue
/// lock.unlock_exclusive();
/// ```
pub struct RmwLock {
    state: Mutex<State>,
}

impl RmwLock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    /// Block until admitted as a shared reader.
    pub fn lock_read(&self) {
        let mut state = self.state.lock();
        Self::wait_in_line(&mut state, Mode::Read);
        state.readers += 1;
    }

    /// Block until admitted as the sole may-writer.
    ///
    /// The holder counts as a reader for compatibility purposes, but no other
    /// may-writer or writer can be admitted until it releases or upgrades.
    pub fn lock_may_write(&self) {
        let mut state = self.state.lock();
        Self::wait_in_line(&mut state, Mode::MayWrite);
        state.readers += 1;
        debug_assert!(
            state.may_writer.is_none(),
            "may-write admitted while another reservation is live"
        );
        state.may_writer = Some(current_thread_id());
    }

    /// Block until admitted exclusively.
    pub fn lock_write(&self) {
        let mut state = self.state.lock();
        Self::wait_in_line(&mut state, Mode::Write);
        debug_assert!(!state.writer_held, "write admitted while a writer holds");
        state.writer_held = true;
    }

    /// Atomically trade the caller's `MAY_WRITE` reservation for `WRITE`.
    ///
    /// The caller must hold the lock in may-write mode. The promotion
    /// outranks every queued waiter: if other readers are still inside, a
    /// `WRITE` entry is inserted at the *front* of the queue and the caller
    /// waits only for those readers to drain. At most one such entry can
    /// exist per lock, because the reservation it came from excluded every
    /// competing mutator.
    pub fn upgrade(&self) {
        let mut state = self.state.lock();

        debug_assert!(state.readers > 0, "upgrade() on a lock with no shared holders");
        state.readers -= 1;
        debug_assert!(
            state.may_writer == Some(current_thread_id()),
            "upgrade() by a thread that does not hold MAY_WRITE"
        );
        state.may_writer = None;

        if !state.can_acquire(Mode::Write) {
            debug_log!("upgrade: waiting for {} readers to drain", state.readers);

            let waiter = Waiter::new(Mode::Write);
            let cond = Arc::clone(&waiter.cond);
            state.queue.push_front(waiter);

            // Our entry is the front and stays the front; arrivals queue
            // behind it. Only the reader drain is left to wait for, so the
            // predicate does not need the usual front-is-mine check.
            while !state.can_acquire(Mode::Write) {
                cond.wait(&mut state);
            }

            state.queue.pop_front();
        }

        debug_assert!(!state.writer_held);
        state.writer_held = true;
    }

    /// Release a `READ` or `MAY_WRITE` hold.
    ///
    /// Which of the two is released is decided by caller identity: if the
    /// calling thread owns the may-write reservation, the reservation is
    /// cleared along with its shared count.
    pub fn unlock_shared(&self) {
        let mut state = self.state.lock();

        debug_assert!(state.readers > 0, "unlock_shared() on a lock with no shared holders");
        state.readers -= 1;

        if state.may_writer == Some(current_thread_id()) {
            state.may_writer = None;
        } else if state.readers > 0 {
            // A plain reader left while other shared holders remain: no
            // queued mode can have become grantable.
            return;
        }

        // The front may be a writer that still has readers ahead of it, or a
        // may-writer freed up by the departing reservation; check before
        // waking. (The occasional effect is a second notify of an already
        // admitted reader batch, which is harmless.)
        state.try_notify_front();
    }

    /// Release a `WRITE` hold.
    pub fn unlock_exclusive(&self) {
        let mut state = self.state.lock();

        debug_assert!(state.writer_held, "unlock_exclusive() without holding WRITE");
        state.writer_held = false;

        // Against an empty lock every mode is grantable; no check needed.
        if let Some(front) = state.queue.front() {
            front.cond.notify_all();
        }
    }

    // ========================================================================
    //  Queueing
    // ========================================================================

    /// Park the caller until its queue position reaches the front and the
    /// lock state permits its mode. No-op when it can be admitted directly.
    fn wait_in_line(state: &mut MutexGuard<'_, State>, mode: Mode) {
        if !state.should_wait(mode) {
            return;
        }

        // Our position is the back entry right now - either freshly pushed or
        // the reader batch we merged into. Hold on to its condvar; the queue
        // may grow behind us while we sleep.
        let cond: Arc<Condvar> = match state.queue.back() {
            Some(waiter) => Arc::clone(&waiter.cond),
            // should_wait() returning true always leaves an entry behind.
            None => return,
        };

        // Condition variables wake spuriously, and a whole reader batch
        // shares one condvar; admission is only real once our entry is the
        // front AND the state permits the mode.
        while !state
            .queue
            .front()
            .is_some_and(|front| Arc::ptr_eq(&front.cond, &cond))
            || !state.can_acquire(mode)
        {
            cond.wait(state);
        }

        if mode == Mode::Read {
            if let Some(front) = state.queue.front_mut() {
                debug_assert!(front.reader_count > 0);
                front.reader_count -= 1;
                if front.reader_count != 0 {
                    // The rest of the batch is still filing through; the
                    // entry stays at the front until the last reader passes.
                    return;
                }
            }
        }

        state.queue.pop_front();

        // Forward notification: the new front may be admissible alongside us
        // (a reader batch behind a may-writer, or the other way around).
        // Waking it now spares it from waiting for the next release.
        if mode != Mode::Write {
            state.try_notify_front();
        }
    }
}

impl Default for RmwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RmwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RmwLock").finish_non_exhaustive()
    }
}

// ============================================================================
//  Test inspection
// ============================================================================

#[cfg(test)]
impl RmwLock {
    /// Number of queued wait positions (a coalesced reader batch counts once).
    fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Reader count on the front entry, if the queue is non-empty.
    fn front_reader_count(&self) -> Option<u32> {
        self.state.lock().queue.front().map(|w| w.reader_count)
    }

    /// Current shared-holder count (includes the may-writer).
    fn shared_holders(&self) -> u32 {
        self.state.lock().readers
    }
}


#[cfg(all(test, feature = "shuttle"))]
mod shuttle_tests;
