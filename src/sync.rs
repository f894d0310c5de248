//! Lock helpers shared by the connection, the scheduler and the client.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every value guarded in this crate stays consistent across a panic
/// (plain flags, handles and options), so poisoning carries no information.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
