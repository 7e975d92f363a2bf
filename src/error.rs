use std::{sync::Arc, time::Duration};

use crate::job::State;

/// The error a computation returns. Anything implementing `std::error::Error`
/// (or a `&str` / `String`) converts into it with `?` or `.into()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A computation's error, shared between the job's listeners,
/// the caller of [`Job::run`](crate::job::Job::run) and every waiter on its future.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by jobs, futures and the scheduler
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
  /// The job was built without a computation
  #[error("job {job:?} has no computation, supply one with `Builder::computation`")]
  UndefinedComputation {
    /// name of the job
    job: String,
  },

  /// `schedule_after` was called with an upstream job that already finished
  #[error("job {later:?} cannot be scheduled after job {earlier:?}, which already finished")]
  AlreadyFinished {
    /// name of the downstream job
    later: String,
    /// name of the upstream job
    earlier: String,
  },

  /// A bounded wait ran out
  #[error("timed out after {0:?}")]
  Timeout(Duration),

  /// Work was submitted to a scheduler that was shut down
  #[error("scheduler is shut down")]
  SchedulerClosed,

  /// The scheduler had no worker and couldn't start one
  #[error("failed to spawn a worker thread: {reason}")]
  Spawn {
    /// the OS error
    reason: String,
  },

  /// The job was canceled before it could produce an output
  #[error("job {job:?} was canceled")]
  Canceled {
    /// name of the job
    job: String,
  },

  /// The job is in a state it can't be started (or scheduled) from
  #[error("job {job:?} can't be started from state {state:?}")]
  NotRunnable {
    /// name of the job
    job: String,
    /// state the job was in
    state: State,
  },

  /// The job's computation returned an error (or panicked)
  #[error("job {job:?} failed: {source}")]
  Failed {
    /// name of the job
    job: String,
    /// the computation's own error
    source: Failure,
  },
}

impl Error {
  /// The computation's own error, if this is [`Error::Failed`]
  pub fn failure(&self) -> Option<&Failure> {
    match self {
      | Self::Failed { source, .. } => Some(source),
      | _ => None,
    }
  }
}

/// jobchain result
pub type Result<T> = core::result::Result<T, Error>;

/// A panic captured while running a computation
#[derive(Debug, Clone, thiserror::Error)]
#[error("computation panicked: {0}")]
pub struct Panicked(pub String);

impl Panicked {
  /// Turn a `catch_unwind` payload into something printable
  pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
    let msg = payload.downcast_ref::<&str>()
                     .map(|s| s.to_string())
                     .or_else(|| payload.downcast_ref::<String>().cloned())
                     .unwrap_or_else(|| "<non-string panic payload>".into());

    Self(msg)
  }
}
