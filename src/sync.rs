//! Lock helpers.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Acquires a mutex lock, recovering from poisoned state if necessary.
///
/// Every guarded value in this crate is either a cache or a flag, so the
/// data left behind by a panicking holder is still usable.
pub(crate) fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("{} mutex was poisoned, recovering", name);
        poisoned.into_inner()
    })
}

/// Waits on `condvar`, recovering the guard if the mutex was poisoned while
/// this thread slept.
pub(crate) fn wait_or_recover<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>, name: &str) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(|poisoned| {
        log::warn!("{} mutex was poisoned, recovering", name);
        poisoned.into_inner()
    })
}
