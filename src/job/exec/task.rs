use std::{cell::RefCell,
          fmt,
          sync::{atomic::{AtomicBool, Ordering},
                 Arc,
                 Condvar,
                 Mutex},
          time::{Duration, Instant}};

use crate::{error::{Error, Result},
            mutex_extra::{lock_discard_poison, wait_discard_poison, wait_until_discard_poison}};

thread_local! {
  /// Interrupt flag of the task executing on this thread, if any
  static INTERRUPT: RefCell<Option<Arc<AtomicBool>>> = RefCell::new(None);
}

/// Whether the job executing on this thread was canceled with `may_interrupt`.
///
/// Long computations can poll this and bail out early. Always `false` outside
/// of a scheduler's worker threads.
pub fn cancellation_requested() -> bool {
  INTERRUPT.with(|i| {
             i.borrow()
              .as_ref()
              .map(|flag| flag.load(Ordering::SeqCst))
              .unwrap_or(false)
           })
}

/// Clears the thread's interrupt flag when dropped
struct InterruptScope;

impl Drop for InterruptScope {
  fn drop(&mut self) {
    INTERRUPT.with(|i| i.borrow_mut().take());
  }
}

/// Where a task is at
enum Status<O> {
  /// Waiting for its delay, or for an upstream job
  Pending,
  /// Handed to the job
  Running,
  /// Job returned
  Finished(Result<O>),
  /// Canceled before it finished
  Cancelled,
}

impl<O> Status<O> {
  fn is_resolved(&self) -> bool {
    matches!(self, Self::Finished(_) | Self::Cancelled)
  }
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// One execution of a job, shared between its future and the work item driving it
pub(crate) struct Task<O> {
  job: String,
  status: Mutex<Status<O>>,
  changed: Condvar,
  interrupt: Arc<AtomicBool>,
  /// Run once when a cancel succeeds; dropped once the task resolves
  on_cancel: Mutex<Option<CancelHook>>,
}

impl<O> Task<O> {
  pub(crate) fn new(job: impl Into<String>, on_cancel: impl FnOnce() + Send + 'static) -> Arc<Self> {
    Arc::new(Self { job: job.into(),
                    status: Mutex::new(Status::Pending),
                    changed: Condvar::new(),
                    interrupt: Arc::new(AtomicBool::new(false)),
                    on_cancel: Mutex::new(Some(Box::new(on_cancel))) })
  }

  /// Wait out `delay`, then claim the task for running.
  ///
  /// `false` if the task was cancelled first.
  pub(crate) fn start_after(&self, delay: Duration) -> bool {
    let settled = |s: &Status<O>| !matches!(s, Status::Pending);
    let status = lock_discard_poison(&self.status);

    let mut status = if delay == Duration::from_secs(0) {
      status
    } else {
      match Instant::now().checked_add(delay) {
        | Some(deadline) => wait_until_discard_poison(&self.changed, status, deadline, settled).0,
        | None => wait_discard_poison(&self.changed, status, settled),
      }
    };

    match *status {
      | Status::Pending => {
        *status = Status::Running;
        true
      },
      | _ => false,
    }
  }

  /// Run `f` with this task's interrupt flag visible to [`cancellation_requested`]
  pub(crate) fn interruptible<R>(&self, f: impl FnOnce() -> R) -> R {
    INTERRUPT.with(|i| *i.borrow_mut() = Some(Arc::clone(&self.interrupt)));
    let _scope = InterruptScope;
    f()
  }

  /// Record the job's result. Ignored if the task was cancelled meanwhile.
  pub(crate) fn finish(&self, result: Result<O>) {
    self.resolve(|s| matches!(s, Status::Running), Status::Finished(result));
  }

  /// Resolve a task that never started
  pub(crate) fn abandon(&self, err: Error) {
    self.resolve(|s| matches!(s, Status::Pending), Status::Finished(Err(err)));
  }

  fn resolve(&self, from: impl Fn(&Status<O>) -> bool, to: Status<O>) {
    let mut status = lock_discard_poison(&self.status);

    if from(&*status) {
      *status = to;
      self.changed.notify_all();
      drop(status);
      lock_discard_poison(&self.on_cancel).take();
    } else {
      log::debug!("job {:?}: result discarded, task already resolved", self.job);
    }
  }

  /// See [`JobFuture::cancel`]
  pub(crate) fn cancel(&self, may_interrupt: bool) -> bool {
    let mut status = lock_discard_poison(&self.status);

    match *status {
      | Status::Pending => (),
      | Status::Running if may_interrupt => self.interrupt.store(true, Ordering::SeqCst),
      | _ => return false,
    }

    *status = Status::Cancelled;
    self.changed.notify_all();
    drop(status);

    log::debug!("job {:?}: task cancelled", self.job);

    if let Some(hook) = lock_discard_poison(&self.on_cancel).take() {
      hook();
    }

    true
  }

  pub(crate) fn is_cancelled(&self) -> bool {
    matches!(*lock_discard_poison(&self.status), Status::Cancelled)
  }

  fn is_done(&self) -> bool {
    lock_discard_poison(&self.status).is_resolved()
  }
}

impl<O: Clone> Task<O> {
  fn get(&self, timeout: Option<Duration>) -> Result<O> {
    let status = lock_discard_poison(&self.status);
    let resolved = |s: &Status<O>| s.is_resolved();

    let status = match timeout.and_then(|t| Instant::now().checked_add(t).map(|d| (t, d))) {
      | Some((timeout, deadline)) => match wait_until_discard_poison(&self.changed, status, deadline, resolved) {
        | (status, true) => status,
        | (_, false) => return Err(Error::Timeout(timeout)),
      },
      | None => wait_discard_poison(&self.changed, status, resolved),
    };

    match &*status {
      | Status::Finished(result) => result.clone(),
      | _ => Err(Error::Canceled { job: self.job.clone() }),
    }
  }
}

/// Handle to a scheduled execution of a job: wait for its output, or cancel it
pub struct JobFuture<O> {
  task: Arc<Task<O>>,
}

impl<O> Clone for JobFuture<O> {
  fn clone(&self) -> Self {
    Self { task: Arc::clone(&self.task) }
  }
}

impl<O> fmt::Debug for JobFuture<O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobFuture")
     .field("job", &self.task.job)
     .field("done", &self.is_done())
     .field("cancelled", &self.is_cancelled())
     .finish()
  }
}

impl<O> JobFuture<O> {
  pub(crate) fn new(task: Arc<Task<O>>) -> Self {
    Self { task }
  }

  /// Name of the job this future belongs to
  pub fn job_name(&self) -> &str {
    &self.task.job
  }

  /// Try to cancel the execution.
  ///
  /// Succeeds if the job hasn't started yet (still delayed, or waiting on an
  /// upstream job), or if it is running and `may_interrupt` is set. In the
  /// latter case the running computation keeps going until it checks
  /// [`cancellation_requested`]; its result is discarded. On success the job
  /// moves to `Canceled` and its listeners get `on_cancel`.
  ///
  /// `false` if the job already finished, was already cancelled, or is
  /// running and `may_interrupt` is not set.
  pub fn cancel(&self, may_interrupt: bool) -> bool {
    self.task.cancel(may_interrupt)
  }

  /// Whether the execution finished or was cancelled
  pub fn is_done(&self) -> bool {
    self.task.is_done()
  }

  /// Whether the execution was cancelled
  pub fn is_cancelled(&self) -> bool {
    self.task.is_cancelled()
  }
}

impl<O: Clone> JobFuture<O> {
  /// Block until the job's output is available.
  ///
  /// The job's own failure comes back as [`Error::Failed`], a cancelled
  /// execution as [`Error::Canceled`].
  pub fn get(&self) -> Result<O> {
    self.task.get(None)
  }

  /// Like [`JobFuture::get`], giving up with [`Error::Timeout`] after `timeout`.
  /// The job itself keeps running.
  pub fn get_timeout(&self, timeout: Duration) -> Result<O> {
    self.task.get(Some(timeout))
  }
}
