use std::fmt;

use super::{event::*, Job};
use crate::error::Failure;

/// Listener that logs every lifecycle event of the job it's attached to
#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

/// Log every lifecycle event
pub fn logging() -> Logging {
  Logging
}

impl<I, O> Listener<I, O> for Logging {
  fn on_scheduled(&self, job: &Job<I, O>) {
    log::info!("job {:?}: scheduled", job.name());
  }

  fn on_started(&self, _: &I, job: &Job<I, O>) {
    log::info!("job {:?}: started", job.name());
  }

  fn on_done(&self, _: &I, _: &O, job: &Job<I, O>) {
    log::info!("job {:?}: done in {:?}",
               job.name(),
               job.statistics().duration().map(|d| d.num_milliseconds()));
  }

  fn on_failure(&self, error: &Failure, job: &Job<I, O>) {
    log::error!("job {:?}: failed: {}", job.name(), error);
  }

  fn on_cancel(&self, job: &Job<I, O>) {
    log::info!("job {:?}: canceled", job.name());
  }
}

/// A closure that receives every event, see [`on_event`]
pub struct EventFn<F>(F);

impl<F> fmt::Debug for EventFn<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("EventFn(Fn(&Job, Event))")
  }
}

/// Wrap a closure as a listener that receives every event
pub fn on_event<I, O, F>(f: F) -> EventFn<F>
  where F: Fn(&Job<I, O>, Event<'_, I, O>) + Send + Sync
{
  EventFn(f)
}

impl<I, O, F> Listener<I, O> for EventFn<F> where F: Fn(&Job<I, O>, Event<'_, I, O>) + Send + Sync
{
  fn on_scheduled(&self, job: &Job<I, O>) {
    (self.0)(job, Event::Scheduled)
  }

  fn on_started(&self, input: &I, job: &Job<I, O>) {
    (self.0)(job, Event::Started(input))
  }

  fn on_done(&self, input: &I, output: &O, job: &Job<I, O>) {
    (self.0)(job, Event::Done(input, output))
  }

  fn on_failure(&self, error: &Failure, job: &Job<I, O>) {
    (self.0)(job, Event::Failed(error))
  }

  fn on_cancel(&self, job: &Job<I, O>) {
    (self.0)(job, Event::Canceled)
  }
}
