use std::{fmt,
          sync::{Arc, Mutex},
          time::Duration};

use crate::{config::Config,
            error::{Error, Result},
            job::{Job, ListenerId},
            mutex_extra::lock_discard_poison};

mod chain;
mod pool;
mod task;

use chain::Continuation;
use pool::{Pool, Work};
use task::Task;
pub use task::{cancellation_requested, JobFuture};

/// Runs jobs asynchronously on a cached, unbounded thread pool.
///
/// Dropping a scheduler shuts it down, waiting up to
/// [`Config::shutdown_grace`] for in-flight jobs.
pub struct Scheduler {
  pool: Pool,
  config: Config,
}

impl fmt::Debug for Scheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scheduler")
     .field("config", &self.config)
     .field("workers", &self.workers())
     .field("closed", &self.is_shut_down())
     .finish()
  }
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

/// Work item: wait out `delay`, run the job, resolve the task
pub(crate) fn work<I, O>(task: Arc<Task<O>>, job: Job<I, O>, input: I, delay: Duration) -> Work
  where I: Send + 'static,
        O: Clone + Send + Sync + 'static
{
  Box::new(move || {
    if !task.start_after(delay) {
      log::debug!("job {:?}: canceled before it started", job.name());
      return;
    }

    let result = task.interruptible(|| job.run(input));
    task.finish(result);
  })
}

impl Scheduler {
  /// Scheduler with the default [`Config`]
  pub fn new() -> Self {
    Self::with_config(Config::default())
  }

  /// Scheduler configured from the environment, see [`Config::from_env`]
  pub fn from_env() -> Self {
    Self::with_config(Config::from_env())
  }

  /// Scheduler with the given configuration
  pub fn with_config(config: Config) -> Self {
    Self { pool: Pool::new(&config),
           config }
  }

  /// This scheduler's configuration
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Live worker threads, busy or idle
  pub fn workers(&self) -> usize {
    self.pool.threads()
  }

  /// Whether [`Scheduler::shutdown`] was called
  pub fn is_shut_down(&self) -> bool {
    self.pool.is_closed()
  }

  /// Run `job` on a worker thread as soon as possible
  pub fn schedule<I, O>(&self, job: &Job<I, O>, input: I) -> Result<JobFuture<O>>
    where I: Send + 'static,
          O: Clone + Send + Sync + 'static
  {
    self.schedule_in(job, input, Duration::from_secs(0))
  }

  /// Run `job` on a worker thread once `delay` has passed.
  ///
  /// The job is `Scheduled` (and its listeners notified) before the delay starts.
  /// A job built without a computation is refused with
  /// [`Error::UndefinedComputation`] and stays `Ready`.
  pub fn schedule_in<I, O>(&self, job: &Job<I, O>, input: I, delay: Duration) -> Result<JobFuture<O>>
    where I: Send + 'static,
          O: Clone + Send + Sync + 'static
  {
    if self.pool.is_closed() {
      return Err(Error::SchedulerClosed);
    }

    job.mark_scheduled()?;

    let task = Task::new(job.name(), {
      let job = job.clone();
      move || {
        job.cancel();
      }
    });

    if let Err(e) = self.pool.submit(work(Arc::clone(&task), job.clone(), input, delay)) {
      log::warn!("job {:?}: rejected: {}", job.name(), e);
      job.cancel();
      task.abandon(e.clone());
      return Err(e);
    }

    log::debug!("job {:?}: submitted, delay {:?}", job.name(), delay);
    Ok(JobFuture::new(task))
  }

  /// [`Scheduler::schedule`] for jobs without input
  pub fn schedule_unit<O>(&self, job: &Job<(), O>) -> Result<JobFuture<O>>
    where O: Clone + Send + Sync + 'static
  {
    self.schedule(job, ())
  }

  /// [`Scheduler::schedule_in`] for jobs without input
  pub fn schedule_unit_in<O>(&self, job: &Job<(), O>, delay: Duration) -> Result<JobFuture<O>>
    where O: Clone + Send + Sync + 'static
  {
    self.schedule_in(job, (), delay)
  }

  /// Run `later` once `earlier` is done, with `transform(earlier's output)` as input.
  ///
  /// See [`Scheduler::schedule_after_in`].
  pub fn schedule_after<I, O, I1, O1, T>(&self,
                                         later: &Job<I, O>,
                                         earlier: &Job<I1, O1>,
                                         transform: T)
                                         -> Result<JobFuture<O>>
    where I: Send + 'static,
          O: Clone + Send + Sync + 'static,
          I1: 'static,
          O1: Clone + Send + 'static,
          T: Fn(&O1) -> I + Send + Sync + 'static
  {
    self.schedule_after_in(later, earlier, transform, Duration::from_secs(0))
  }

  /// Run `later` once `earlier` is done, with `transform(earlier's output)` as
  /// input, after a further `delay`.
  ///
  /// Returns right away; nothing occupies a worker until `earlier` is done.
  /// `later` is `Scheduled` immediately. If `earlier` fails or is canceled,
  /// `later` is canceled without running and the returned future reports
  /// cancellation. Cancelling the returned future cancels `later`, whether it
  /// is still waiting on `earlier` or already submitted.
  ///
  /// Fails with [`Error::AlreadyFinished`] if `earlier` already finished, and
  /// with [`Error::UndefinedComputation`] if `later` has no computation.
  pub fn schedule_after_in<I, O, I1, O1, T>(&self,
                                            later: &Job<I, O>,
                                            earlier: &Job<I1, O1>,
                                            transform: T,
                                            delay: Duration)
                                            -> Result<JobFuture<O>>
    where I: Send + 'static,
          O: Clone + Send + Sync + 'static,
          I1: 'static,
          O1: Clone + Send + 'static,
          T: Fn(&O1) -> I + Send + Sync + 'static
  {
    if earlier.is_finished() {
      return Err(Error::AlreadyFinished { later: later.name().into(),
                                          earlier: earlier.name().into() });
    }

    if self.pool.is_closed() {
      return Err(Error::SchedulerClosed);
    }

    later.mark_scheduled()?;

    let registration = Arc::new(Mutex::new(None::<ListenerId>));

    let task = Task::new(later.name(), {
      let later = later.clone();
      let earlier = earlier.downgrade();
      let registration = Arc::clone(&registration);
      move || {
        later.cancel();

        let id = lock_discard_poison(&registration).take();
        if let (Some(earlier), Some(id)) = (earlier.upgrade(), id) {
          earlier.remove_listener(id);
        }
      }
    });

    let continuation = Arc::new(Continuation { later: later.clone(),
                                               task: Arc::clone(&task),
                                               transform,
                                               delay,
                                               pool: self.pool.clone(),
                                               registration: Arc::clone(&registration) });

    match earlier.add_listener_unless_finished(continuation.clone()) {
      | Some(id) => {
        *lock_discard_poison(&registration) = Some(id);

        // fired or cancelled before the id was recorded, nothing detached us
        if task.is_cancelled() || earlier.is_finished() {
          earlier.remove_listener(id);
        }

        log::debug!("job {:?}: waiting on {:?}", later.name(), earlier.name());
      },
      | None => continuation.resume_from(earlier),
    }

    Ok(JobFuture::new(task))
  }

  /// [`Scheduler::schedule_after`] passing `earlier`'s output through unchanged
  pub fn chain<I, O, I1>(&self, later: &Job<I, O>, earlier: &Job<I1, I>) -> Result<JobFuture<O>>
    where I: Clone + Send + Sync + 'static,
          O: Clone + Send + Sync + 'static,
          I1: 'static
  {
    self.schedule_after(later, earlier, |output: &I| output.clone())
  }

  /// [`Scheduler::schedule_after_in`] passing `earlier`'s output through unchanged
  pub fn chain_in<I, O, I1>(&self, later: &Job<I, O>, earlier: &Job<I1, I>, delay: Duration) -> Result<JobFuture<O>>
    where I: Clone + Send + Sync + 'static,
          O: Clone + Send + Sync + 'static,
          I1: 'static
  {
    self.schedule_after_in(later, earlier, |output: &I| output.clone(), delay)
  }

  /// Stop accepting jobs; later submissions fail with [`Error::SchedulerClosed`].
  ///
  /// Jobs already submitted keep running. With a non-zero `timeout`, blocks
  /// up to `timeout` for them to finish. Returns whether every worker exited.
  pub fn shutdown(&self, timeout: Duration) -> bool {
    self.pool.close();
    let drained = self.pool.await_termination(timeout);

    if drained {
      log::info!("scheduler {:?}: shut down", self.config.thread_name);
    } else if timeout > Duration::from_secs(0) {
      log::warn!("scheduler {:?}: jobs still running after {:?}",
                 self.config.thread_name,
                 timeout);
    }

    drained
  }
}

impl Drop for Scheduler {
  fn drop(&mut self) {
    self.shutdown(self.config.shutdown_grace);
  }
}
