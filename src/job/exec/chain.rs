use std::{panic::{self, AssertUnwindSafe},
          sync::{Arc, Mutex},
          time::Duration};

use super::{pool::Pool, task::Task, work};
use crate::{error::{Failure, Panicked},
            job::{Job, Listener, ListenerId, State},
            mutex_extra::lock_discard_poison};

/// Listener attached to an upstream job that submits the downstream job once
/// the upstream one is done, or cancels it if the upstream one fails or is
/// canceled.
pub(crate) struct Continuation<I, O, T> {
  pub(crate) later: Job<I, O>,
  pub(crate) task: Arc<Task<O>>,
  pub(crate) transform: T,
  pub(crate) delay: Duration,
  pub(crate) pool: Pool,
  /// Where this continuation is registered on the upstream job, once it is
  pub(crate) registration: Arc<Mutex<Option<ListenerId>>>,
}

impl<I, O, T> Continuation<I, O, T>
  where I: Send + 'static,
        O: Clone + Send + Sync + 'static
{
  /// Upstream produced `output`: submit the downstream job with its transformed input
  fn resume<O1>(&self, output: &O1)
    where T: Fn(&O1) -> I
  {
    if self.task.is_cancelled() {
      log::debug!("job {:?}: upstream done, but the chain was cancelled", self.later.name());
      return;
    }

    let input = match panic::catch_unwind(AssertUnwindSafe(|| (self.transform)(output))) {
      | Ok(input) => input,
      | Err(payload) => {
        log::error!("job {:?}: transform panicked: {}",
                    self.later.name(),
                    Panicked::from_payload(payload).0);
        self.abort();
        return;
      },
    };

    let submitted = self.pool
                        .submit(work(Arc::clone(&self.task), self.later.clone(), input, self.delay));

    if let Err(e) = submitted {
      log::warn!("job {:?}: upstream done, but can't submit: {}", self.later.name(), e);
      self.later.cancel();
      self.task.abandon(e);
    }
  }

  /// Cancel the downstream job and its future
  fn abort(&self) {
    if !self.task.cancel(true) {
      log::debug!("job {:?}: chain already resolved", self.later.name());
    }
  }

  /// Drop the registration on `upstream`; a continuation fires only once
  fn detach<I1, O1>(&self, upstream: &Job<I1, O1>) {
    let id = lock_discard_poison(&self.registration).take();
    if let Some(id) = id {
      upstream.remove_listener(id);
    }
  }

  /// Act on an upstream job that finished before this continuation could be attached
  pub(crate) fn resume_from<I1, O1>(&self, earlier: &Job<I1, O1>)
    where T: Fn(&O1) -> I,
          O1: Clone
  {
    match (earlier.state(), earlier.output()) {
      | (State::Done, Some(output)) => self.resume(&output),
      | _ => self.abort(),
    }
  }
}

impl<I, O, I1, O1, T> Listener<I1, O1> for Continuation<I, O, T>
  where I: Send + 'static,
        O: Clone + Send + Sync + 'static,
        T: Fn(&O1) -> I + Send + Sync
{
  fn on_done(&self, _: &I1, output: &O1, upstream: &Job<I1, O1>) {
    self.detach(upstream);
    self.resume(output)
  }

  fn on_failure(&self, error: &Failure, upstream: &Job<I1, O1>) {
    log::info!("job {:?}: upstream {:?} failed ({}), canceling",
               self.later.name(),
               upstream.name(),
               error);
    self.detach(upstream);
    self.abort()
  }

  fn on_cancel(&self, upstream: &Job<I1, O1>) {
    log::info!("job {:?}: upstream {:?} canceled, canceling", self.later.name(), upstream.name());
    self.detach(upstream);
    self.abort()
  }
}
