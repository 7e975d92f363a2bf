use std::{fmt,
          sync::{Arc, Mutex}};

use super::{Job, Listener};
use crate::mutex_extra::lock_discard_poison;

type OnReady<O> = Box<dyn FnOnce(Vec<O>) + Send>;

struct Slots<O> {
  outputs: Vec<Option<O>>,
  ready: bool,
  on_ready: Option<OnReady<O>>,
}

impl<O> Slots<O> {
  /// Every output, once all slots are filled and the callback wasn't taken yet
  fn take_if_complete(&mut self) -> Option<(OnReady<O>, Vec<O>)> {
    if self.ready || self.outputs.iter().any(Option::is_none) {
      return None;
    }

    self.ready = true;
    let outputs = self.outputs.iter_mut().filter_map(Option::take).collect();
    self.on_ready.take().map(|f| (f, outputs))
  }
}

/// Joins N jobs: collects their outputs by position and hands them to a
/// callback once every job is done.
///
/// The callback is invoked exactly once, on the thread that finished the last
/// job. Jobs that fail or are canceled leave their slot empty, so the callback
/// never runs.
pub struct Aggregate<O> {
  slots: Arc<Mutex<Slots<O>>>,
}

impl<O> fmt::Debug for Aggregate<O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let slots = lock_discard_poison(&self.slots);
    f.debug_struct("Aggregate")
     .field("jobs", &slots.outputs.len())
     .field("done", &slots.outputs.iter().filter(|o| o.is_some()).count())
     .field("ready", &slots.ready)
     .finish()
  }
}

/// Fills slot `index` of an [`Aggregate`]
struct Collect<O> {
  index: usize,
  slots: Arc<Mutex<Slots<O>>>,
}

impl<O> Collect<O> {
  fn fill(&self, output: &O)
    where O: Clone
  {
    let complete = {
      let mut slots = lock_discard_poison(&self.slots);

      if slots.ready {
        log::debug!("aggregate: slot {} reported after the join fired, ignoring", self.index);
        return;
      }

      slots.outputs[self.index].get_or_insert_with(|| output.clone());
      slots.take_if_complete()
    };

    if let Some((on_ready, outputs)) = complete {
      log::debug!("aggregate: all {} jobs done", outputs.len());
      on_ready(outputs);
    }
  }
}

impl<I, O> Listener<I, O> for Collect<O> where O: Clone + Send
{
  fn on_done(&self, _: &I, output: &O, _: &Job<I, O>) {
    self.fill(output)
  }
}

impl<O> Aggregate<O> where O: Clone + Send + 'static
{
  /// Attach to every job in `jobs`, calling `on_ready` with their outputs
  /// (in the order of `jobs`) once all of them are done.
  ///
  /// With no jobs, `on_ready(vec![])` is called right away. Jobs already
  /// done when this is called are not picked up, attach before scheduling.
  pub fn new<I>(jobs: &[&Job<I, O>], on_ready: impl FnOnce(Vec<O>) + Send + 'static) -> Self
    where I: 'static
  {
    let slots = Arc::new(Mutex::new(Slots { outputs: jobs.iter().map(|_| None).collect(),
                                            ready: false,
                                            on_ready: Some(Box::new(on_ready)) }));

    for (index, job) in jobs.iter().enumerate() {
      job.add_listener(Collect { index,
                                 slots: Arc::clone(&slots) });
    }

    let complete = lock_discard_poison(&slots).take_if_complete();
    if let Some((on_ready, outputs)) = complete {
      on_ready(outputs);
    }

    Self { slots }
  }

  /// Whether the callback was invoked
  pub fn is_ready(&self) -> bool {
    lock_discard_poison(&self.slots).ready
  }
}
