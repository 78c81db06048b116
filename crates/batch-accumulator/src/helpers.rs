use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock the state of an accumulator, ignoring poisoning. No user code runs while the lock is held
#[inline(always)]
pub(crate) fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
