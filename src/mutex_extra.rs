use std::{sync::{Condvar, Mutex, MutexGuard},
          time::{Duration, Instant}};

/// Acquire a lock on a mutex, disregarding whether it was poisoned.
pub fn lock_discard_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().map_err(|e| e.into_inner()).unwrap_or_else(|lock| lock)
}

/// Block on a condvar until `done` holds, disregarding poison.
pub fn wait_discard_poison<'a, T>(cv: &Condvar,
                                  mut guard: MutexGuard<'a, T>,
                                  done: impl Fn(&T) -> bool)
                                  -> MutexGuard<'a, T> {
  while !done(&*guard) {
    guard = cv.wait(guard).unwrap_or_else(|e| e.into_inner());
  }

  guard
}

/// Block on a condvar until `done` holds or `deadline` passes, disregarding poison.
///
/// The returned bool is `true` if `done` held when the wait ended.
pub fn wait_until_discard_poison<'a, T>(cv: &Condvar,
                                        mut guard: MutexGuard<'a, T>,
                                        deadline: Instant,
                                        done: impl Fn(&T) -> bool)
                                        -> (MutexGuard<'a, T>, bool) {
  loop {
    if done(&*guard) {
      return (guard, true);
    }

    let left = deadline.saturating_duration_since(Instant::now());
    if left == Duration::from_secs(0) {
      return (guard, false);
    }

    guard = cv.wait_timeout(guard, left)
              .map(|(g, _)| g)
              .unwrap_or_else(|e| e.into_inner().0);
  }
}
