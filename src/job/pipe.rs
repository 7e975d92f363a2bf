//! Feed one job's output straight into another job, synchronously.
//!
//! Unlike [`Scheduler::schedule_after`](crate::job::exec::Scheduler::schedule_after),
//! the downstream job runs on whichever thread finished the upstream one, and
//! nothing happens to it if the upstream job fails or is canceled.

use std::fmt;

use super::{Job, Listener, ListenerId};

/// Listener running `to` with the converted output of the job it's attached to
struct Pipe<I2, O2, F> {
  to: Job<I2, O2>,
  conversion: F,
}

impl<I2, O2, F> fmt::Debug for Pipe<I2, O2, F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipe").field("to", &self.to.name()).finish()
  }
}

impl<I, O, I2, O2, F> Listener<I, O> for Pipe<I2, O2, F>
  where O2: Clone + Send,
        F: Fn(&O) -> I2 + Send + Sync
{
  fn on_done(&self, _: &I, output: &O, from: &Job<I, O>) {
    log::debug!("job {:?}: piping output into {:?}", from.name(), self.to.name());

    if let Err(e) = self.to.run((self.conversion)(output)) {
      log::warn!("job {:?}: piped from {:?}, {}", self.to.name(), from.name(), e);
    }
  }
}

/// When `from` is done, run `to` with `conversion(output)` on the same thread.
///
/// Errors from `to` are logged. Remove the returned listener from `from` to undo.
pub fn pipe<I, O, I2, O2, F>(from: &Job<I, O>, to: &Job<I2, O2>, conversion: F) -> ListenerId
  where I2: 'static,
        O2: Clone + Send + 'static,
        F: Fn(&O) -> I2 + Send + Sync + 'static
{
  from.add_listener(Pipe { to: to.clone(),
                           conversion })
}

/// [`pipe`] without a conversion
pub fn pipe_same<I, O, O2>(from: &Job<I, O>, to: &Job<O, O2>) -> ListenerId
  where O: Clone + 'static,
        O2: Clone + Send + 'static
{
  pipe(from, to, O::clone)
}
