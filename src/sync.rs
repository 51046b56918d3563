//! Synchronization primitive facade.
//!
//! The rest of the crate imports `Mutex`, `Condvar`, and the thread identity
//! helpers from here instead of naming a backend directly. Normally these are
//! `parking_lot` re-exports; under `--features shuttle` they become thin
//! adapters over `shuttle::sync`, so the schedule-exploration tests in
//! `rmwlock::shuttle_tests` and `list::shuttle_tests` drive the *real* lock
//! and list rather than a model.

#[cfg(not(feature = "shuttle"))]
pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};

#[cfg(not(feature = "shuttle"))]
pub(crate) use std::thread::ThreadId;

/// Identity of the calling thread, used for the may-writer reservation.
#[cfg(not(feature = "shuttle"))]
#[inline]
pub(crate) fn current_thread_id() -> ThreadId {
    std::thread::current().id()
}

#[cfg(feature = "shuttle")]
pub(crate) use shim::{Condvar, Mutex, MutexGuard};

#[cfg(feature = "shuttle")]
pub(crate) use shuttle::thread::ThreadId;

/// Identity of the calling (shuttle-scheduled) thread.
#[cfg(feature = "shuttle")]
#[inline]
pub(crate) fn current_thread_id() -> ThreadId {
    shuttle::thread::current().id()
}

/// Adapters giving `shuttle::sync` primitives the `parking_lot` call shape
/// the crate is written against.
#[cfg(feature = "shuttle")]
mod shim {
    use std::ops::{Deref, DerefMut};
    use std::sync::PoisonError;

    pub(crate) struct Mutex<T>(shuttle::sync::Mutex<T>);

    /// The inner guard is `Some` at all times except inside `Condvar::wait`,
    /// which has to move it through shuttle's by-value wait.
    pub(crate) struct MutexGuard<'a, T>(Option<shuttle::sync::MutexGuard<'a, T>>);

    pub(crate) struct Condvar(shuttle::sync::Condvar);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(shuttle::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(Some(self.0.lock().unwrap_or_else(PoisonError::into_inner)))
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            match &self.0 {
                Some(guard) => guard,
                None => unreachable!("guard emptied outside Condvar::wait"),
            }
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            match &mut self.0 {
                Some(guard) => guard,
                None => unreachable!("guard emptied outside Condvar::wait"),
            }
        }
    }

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(shuttle::sync::Condvar::new())
        }

        pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
            if let Some(inner) = guard.0.take() {
                let inner = self
                    .0
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
                guard.0 = Some(inner);
            }
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}
