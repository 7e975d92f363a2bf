use std::{collections::BTreeMap,
          fmt,
          panic::{self, AssertUnwindSafe},
          sync::{Arc, Condvar, Mutex, Weak},
          time::{Duration, Instant}};

use serde::Serialize as Ser;

use crate::{error::{BoxError, Error, Failure, Panicked, Result},
            mutex_extra::{lock_discard_poison, wait_discard_poison, wait_until_discard_poison}};

/// Joining the outputs of several jobs
pub mod aggregate;

/// Lifecycle events and the listener trait
pub mod event;

/// Thread-pool scheduler, futures and chaining
pub mod exec;

/// Ready-made listeners
pub mod hooks;

pub mod pipe;

mod stats;

pub use event::{Event, Listener, ListenerId};
pub use stats::Statistics;

/// State a job may be in
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Ser)]
pub enum State {
  /// Created, not scheduled or run yet
  Ready,
  /// Handed to a scheduler, waiting to run
  Scheduled,
  /// Computation is executing
  Running,
  /// Computation returned an output
  Done,
  /// Computation returned an error
  Failed,
  /// Canceled through the scheduler or an upstream job
  Canceled,
}

impl State {
  /// `Done`, `Failed` and `Canceled` are final
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Done | Self::Failed | Self::Canceled)
  }

  /// Whether a job in this state may move to `next`
  pub fn can_become(self, next: State) -> bool {
    use State::*;

    matches!((self, next),
             | (Ready, Scheduled)
             | (Ready, Running)
             | (Ready, Canceled)
             | (Scheduled, Running)
             | (Scheduled, Canceled)
             | (Running, Done)
             | (Running, Failed)
             | (Running, Canceled))
  }
}

/// The work a job does
pub type Computation<I, O> = Box<dyn Fn(&I) -> core::result::Result<O, BoxError> + Send + Sync>;

/// How a job ended
enum Outcome<O> {
  Done(O),
  Failed(Failure),
  Canceled,
}

/// State, statistics and outcome, guarded together so waiters see them change atomically
struct Cell<O> {
  state: State,
  statistics: Statistics,
  outcome: Option<Outcome<O>>,
}

struct Inner<I, O> {
  name: String,
  computation: Option<Computation<I, O>>,
  listeners: Mutex<BTreeMap<ListenerId, Arc<dyn Listener<I, O>>>>,
  cell: Mutex<Cell<O>>,
  /// Notified once `cell.outcome` is set
  finished: Condvar,
}

/// A named unit of work with a lifecycle and listeners.
///
/// `Job` is a handle; clones refer to the same job.
pub struct Job<I, O> {
  inner: Arc<Inner<I, O>>,
}

/// Handle that doesn't keep the job alive
pub(crate) struct WeakJob<I, O> {
  inner: Weak<Inner<I, O>>,
}

impl<I, O> WeakJob<I, O> {
  pub(crate) fn upgrade(&self) -> Option<Job<I, O>> {
    self.inner.upgrade().map(|inner| Job { inner })
  }
}

impl<I, O> Clone for Job<I, O> {
  fn clone(&self) -> Self {
    Self { inner: Arc::clone(&self.inner) }
  }
}

impl<I, O> fmt::Debug for Job<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Job")
     .field("name", &self.inner.name)
     .field("state", &self.state())
     .field("listeners", &lock_discard_poison(&self.inner.listeners).len())
     .finish()
  }
}

/// Serializable snapshot of a job
#[derive(Clone, Debug, Ser)]
pub struct Report {
  /// job name
  pub name: String,
  /// state when the snapshot was taken
  pub state: State,
  /// timestamps when the snapshot was taken
  pub statistics: Statistics,
}

/// Builds a [`Job`]
pub struct Builder<I, O> {
  name: Option<String>,
  listeners: Vec<Arc<dyn Listener<I, O>>>,
  computation: Option<Computation<I, O>>,
}

impl<I, O> fmt::Debug for Builder<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Builder")
     .field("name", &self.name)
     .field("listeners", &self.listeners.len())
     .field("computation", &self.computation.as_ref().map(|_| "Fn(&I) -> Result<O>"))
     .finish()
  }
}

impl<I, O> Default for Builder<I, O> {
  fn default() -> Self {
    Self { name: None,
           listeners: Vec::new(),
           computation: None }
  }
}

impl<I, O> Builder<I, O> {
  /// Name the job. Defaults to `job-<random id>`.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Attach a listener before the job exists
  pub fn listener(mut self, listener: impl Listener<I, O> + 'static) -> Self {
    self.listeners.push(Arc::new(listener));
    self
  }

  /// The job's computation
  pub fn computation<F, E>(mut self, f: F) -> Self
    where F: Fn(&I) -> core::result::Result<O, E> + Send + Sync + 'static,
          E: Into<BoxError>
  {
    self.computation = Some(Box::new(move |input: &I| f(input).map_err(Into::into)));
    self
  }

  /// Finish building
  pub fn build(self) -> Job<I, O> {
    let name = self.name.unwrap_or_else(|| format!("job-{}", nanoid::nanoid!()));
    let listeners = self.listeners
                        .into_iter()
                        .map(|l| (ListenerId::next(), l))
                        .collect::<BTreeMap<_, _>>();

    Job { inner: Arc::new(Inner { name,
                                  computation: self.computation,
                                  listeners: Mutex::new(listeners),
                                  cell: Mutex::new(Cell { state: State::Ready,
                                                          statistics: Statistics::new(),
                                                          outcome: None }),
                                  finished: Condvar::new() }) }
  }
}

impl<I, O> Job<I, O> {
  /// Start building a job
  pub fn builder() -> Builder<I, O> {
    Builder::default()
  }

  /// Unnamed job running `f`
  pub fn new<F, E>(f: F) -> Self
    where F: Fn(&I) -> core::result::Result<O, E> + Send + Sync + 'static,
          E: Into<BoxError>
  {
    Self::builder().computation(f).build()
  }

  /// Named job running `f`
  pub fn named<F, E>(name: impl Into<String>, f: F) -> Self
    where F: Fn(&I) -> core::result::Result<O, E> + Send + Sync + 'static,
          E: Into<BoxError>
  {
    Self::builder().name(name).computation(f).build()
  }

  /// The job's name
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Current state
  pub fn state(&self) -> State {
    lock_discard_poison(&self.inner.cell).state
  }

  /// Whether the job reached `Done`, `Failed` or `Canceled`
  pub fn is_finished(&self) -> bool {
    self.state().is_terminal()
  }

  /// Snapshot of the job's timestamps
  pub fn statistics(&self) -> Statistics {
    lock_discard_poison(&self.inner.cell).statistics.clone()
  }

  /// Serializable snapshot of name, state and statistics
  pub fn report(&self) -> Report {
    let cell = lock_discard_poison(&self.inner.cell);
    Report { name: self.inner.name.clone(),
             state: cell.state,
             statistics: cell.statistics.clone() }
  }

  /// Whether two handles refer to the same job
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  /// Attach a listener, yielding a handle that can remove it again
  pub fn add_listener(&self, listener: impl Listener<I, O> + 'static) -> ListenerId {
    self.add_shared_listener(Arc::new(listener))
  }

  /// Attach an already shared listener (e.g. one returned by [`Job::remove_all_listeners`])
  pub fn add_shared_listener(&self, listener: Arc<dyn Listener<I, O>>) -> ListenerId {
    let id = ListenerId::next();
    lock_discard_poison(&self.inner.listeners).insert(id, listener);
    id
  }

  /// Detach a listener. `false` if no listener had this id.
  pub fn remove_listener(&self, id: ListenerId) -> bool {
    lock_discard_poison(&self.inner.listeners).remove(&id).is_some()
  }

  /// Detach every listener, returning them in attachment order
  pub fn remove_all_listeners(&self) -> Vec<Arc<dyn Listener<I, O>>> {
    std::mem::take(&mut *lock_discard_poison(&self.inner.listeners)).into_iter()
                                                                     .map(|(_, l)| l)
                                                                     .collect()
  }

  /// Number of attached listeners
  pub fn listener_count(&self) -> usize {
    lock_discard_poison(&self.inner.listeners).len()
  }

  /// Deliver `event` to every listener, isolating panics
  fn fire(&self, event: Event<'_, I, O>) {
    let listeners = lock_discard_poison(&self.inner.listeners).iter()
                                                               .map(|(id, l)| (*id, Arc::clone(l)))
                                                               .collect::<Vec<_>>();

    for (id, listener) in listeners {
      let delivered = panic::catch_unwind(AssertUnwindSafe(|| event.deliver(&*listener, self)));

      if let Err(payload) = delivered {
        log::error!("job {:?}: {} panicked on {:?}: {}",
                    self.inner.name,
                    id,
                    event,
                    Panicked::from_payload(payload).0);
      }
    }
  }

  /// Move to `to`. On refusal yields the state the job was in.
  fn transition(&self, to: State, outcome: Option<Outcome<O>>) -> core::result::Result<(), State> {
    let mut cell = lock_discard_poison(&self.inner.cell);

    if !cell.state.can_become(to) {
      return Err(cell.state);
    }

    cell.state = to;
    cell.statistics.record(to);

    if to.is_terminal() {
      cell.outcome = outcome;
      self.inner.finished.notify_all();
    }

    Ok(())
  }

  fn not_runnable(&self, state: State) -> Error {
    Error::NotRunnable { job: self.inner.name.clone(),
                         state }
  }

  /// The computation, or [`Error::UndefinedComputation`]
  fn computation(&self) -> Result<&Computation<I, O>> {
    self.inner
        .computation
        .as_ref()
        .ok_or_else(|| Error::UndefinedComputation { job: self.inner.name.clone() })
  }

  fn canceled(&self) -> Error {
    Error::Canceled { job: self.inner.name.clone() }
  }

  pub(crate) fn downgrade(&self) -> WeakJob<I, O> {
    WeakJob { inner: Arc::downgrade(&self.inner) }
  }

  /// Attach `listener` only if the job hasn't finished.
  ///
  /// Holding the state lock while attaching guarantees the listener sees the
  /// terminal event when it comes.
  pub(crate) fn add_listener_unless_finished(&self, listener: Arc<dyn Listener<I, O>>) -> Option<ListenerId> {
    let cell = lock_discard_poison(&self.inner.cell);

    if cell.state.is_terminal() {
      return None;
    }

    let id = ListenerId::next();
    lock_discard_poison(&self.inner.listeners).insert(id, listener);
    drop(cell);

    Some(id)
  }

  /// `Ready -> Scheduled`, firing `on_scheduled`.
  ///
  /// A job without a computation could never finish, so it stays `Ready`.
  pub(crate) fn mark_scheduled(&self) -> Result<()> {
    self.computation()?;

    self.transition(State::Scheduled, None)
        .map_err(|state| self.not_runnable(state))?;

    log::debug!("job {:?}: scheduled", self.inner.name);
    self.fire(Event::Scheduled);
    Ok(())
  }

  /// Move to `Canceled`, firing `on_cancel`. `false` if the job had already finished.
  pub(crate) fn cancel(&self) -> bool {
    match self.transition(State::Canceled, Some(Outcome::Canceled)) {
      | Ok(()) => {
        log::info!("job {:?}: canceled", self.inner.name);
        self.fire(Event::Canceled);
        true
      },
      | Err(state) => {
        log::debug!("job {:?}: not canceled, already {:?}", self.inner.name, state);
        false
      },
    }
  }
}

impl<I, O> Job<I, O> where O: Clone
{
  /// Run the job on the current thread.
  ///
  /// Fires `on_started`, then `on_done` or `on_failure`. The computation's
  /// error (or panic) is returned as [`Error::Failed`] after the listeners
  /// have seen it.
  pub fn run(&self, input: I) -> Result<O> {
    let computation = self.computation()?;

    self.transition(State::Running, None)
        .map_err(|state| self.not_runnable(state))?;

    log::debug!("job {:?}: running", self.inner.name);
    self.fire(Event::Started(&input));

    let result = panic::catch_unwind(AssertUnwindSafe(|| computation(&input)))
                   .unwrap_or_else(|payload| Err(Box::new(Panicked::from_payload(payload)) as BoxError));

    match result {
      | Ok(output) => match self.transition(State::Done, Some(Outcome::Done(output.clone()))) {
        | Ok(()) => {
          self.fire(Event::Done(&input, &output));
          Ok(output)
        },
        | Err(_) => Err(self.canceled()),
      },
      | Err(e) => {
        let failure: Failure = Arc::from(e);

        match self.transition(State::Failed, Some(Outcome::Failed(Arc::clone(&failure)))) {
          | Ok(()) => {
            log::warn!("job {:?}: failed: {}", self.inner.name, failure);
            self.fire(Event::Failed(&failure));
            Err(Error::Failed { job: self.inner.name.clone(),
                                source: failure })
          },
          | Err(_) => Err(self.canceled()),
        }
      },
    }
  }

  /// Block until the job is `Done`, `Failed` or `Canceled`.
  ///
  /// With `Some(timeout)` gives up with [`Error::Timeout`] once it elapses.
  pub fn wait_for_termination(&self, timeout: Option<Duration>) -> Result<O> {
    let finished = |c: &Cell<O>| c.outcome.is_some();
    let cell = lock_discard_poison(&self.inner.cell);

    let cell = match timeout.and_then(|t| Instant::now().checked_add(t).map(|d| (t, d))) {
      | Some((timeout, deadline)) => {
        match wait_until_discard_poison(&self.inner.finished, cell, deadline, finished) {
          | (cell, true) => cell,
          | (_, false) => return Err(Error::Timeout(timeout)),
        }
      },
      | None => wait_discard_poison(&self.inner.finished, cell, finished),
    };

    match &cell.outcome {
      | Some(Outcome::Done(output)) => Ok(output.clone()),
      | Some(Outcome::Failed(failure)) => Err(Error::Failed { job: self.inner.name.clone(),
                                                              source: Arc::clone(failure) }),
      | Some(Outcome::Canceled) | None => Err(self.canceled()),
    }
  }

  /// The output, if the job is `Done`
  pub fn output(&self) -> Option<O> {
    match &lock_discard_poison(&self.inner.cell).outcome {
      | Some(Outcome::Done(output)) => Some(output.clone()),
      | _ => None,
    }
  }
}

impl<O> Job<(), O> where O: Clone
{
  /// Run a job that takes no input
  pub fn run_unit(&self) -> Result<O> {
    self.run(())
  }
}
