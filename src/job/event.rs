use std::{fmt, sync::atomic::{AtomicU64, Ordering}};

use super::Job;
use crate::error::Failure;

/// Handle to a listener attached with [`Job::add_listener`], used to remove it again
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
  pub(crate) fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for ListenerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "listener#{}", self.0)
  }
}

/// Lifecycle events a job fires
pub enum Event<'a, I, O> {
  /// Job was handed to a scheduler
  Scheduled,
  /// Job's computation is about to be invoked with this input
  Started(&'a I),
  /// Job's computation returned this output for this input
  Done(&'a I, &'a O),
  /// Job's computation failed
  Failed(&'a Failure),
  /// Job was canceled
  Canceled,
}

impl<'a, I, O> fmt::Debug for Event<'a, I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Scheduled => f.write_str("Scheduled"),
      | Self::Started(_) => f.write_str("Started"),
      | Self::Done(..) => f.write_str("Done"),
      | Self::Failed(e) => f.debug_tuple("Failed").field(&e.to_string()).finish(),
      | Self::Canceled => f.write_str("Canceled"),
    }
  }
}

/// Observes a job's lifecycle. Every hook does nothing by default.
///
/// Hooks run synchronously, in registration order, on the thread that
/// produced the event. A panicking hook is logged and skipped.
pub trait Listener<I, O>: Send + Sync {
  /// Job was handed to a scheduler
  fn on_scheduled(&self, _job: &Job<I, O>) {}

  /// Job's computation is about to be invoked
  fn on_started(&self, _input: &I, _job: &Job<I, O>) {}

  /// Job's computation returned
  fn on_done(&self, _input: &I, _output: &O, _job: &Job<I, O>) {}

  /// Job's computation failed
  fn on_failure(&self, _error: &Failure, _job: &Job<I, O>) {}

  /// Job was canceled
  fn on_cancel(&self, _job: &Job<I, O>) {}
}

impl<'a, I, O> Event<'a, I, O> {
  /// Invoke the hook on `listener` matching this event
  pub fn deliver(&self, listener: &dyn Listener<I, O>, job: &Job<I, O>) {
    match *self {
      | Self::Scheduled => listener.on_scheduled(job),
      | Self::Started(input) => listener.on_started(input, job),
      | Self::Done(input, output) => listener.on_done(input, output, job),
      | Self::Failed(err) => listener.on_failure(err, job),
      | Self::Canceled => listener.on_cancel(job),
    }
  }
}
