use std::{collections::VecDeque,
          panic::{self, AssertUnwindSafe},
          sync::{Arc, Condvar, Mutex},
          thread,
          time::{Duration, Instant}};

use crate::{config::Config,
            error::{Error, Panicked, Result},
            mutex_extra::{lock_discard_poison, wait_discard_poison, wait_until_discard_poison}};

/// Work to be picked up by a worker thread
pub(crate) type Work = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
  work: VecDeque<Work>,
  /// Workers parked waiting for work
  idle: usize,
  /// Live worker threads, idle or busy
  threads: usize,
  /// Threads ever spawned, used for naming
  spawned: usize,
  closed: bool,
}

struct Shared {
  queue: Mutex<Queue>,
  /// Notifies an idle worker that work was queued (or that the pool closed)
  work_queued: Condvar,
  /// Notified when the last worker thread exits
  drained: Condvar,
  keep_alive: Duration,
  thread_name: String,
}

/// A cached, unbounded pool of worker threads.
///
/// Queued work is handed to an idle worker when there is one, otherwise a new
/// thread is spawned. Idle workers exit after `keep_alive`.
#[derive(Clone)]
pub(crate) struct Pool {
  shared: Arc<Shared>,
}

impl Pool {
  pub(crate) fn new(config: &Config) -> Self {
    let queue = Queue { work: VecDeque::new(),
                        idle: 0,
                        threads: 0,
                        spawned: 0,
                        closed: false };

    Self { shared: Arc::new(Shared { queue: Mutex::new(queue),
                                     work_queued: Condvar::new(),
                                     drained: Condvar::new(),
                                     keep_alive: config.keep_alive,
                                     thread_name: config.thread_name.clone() }) }
  }

  /// Queue work, spawning a worker if none is idle
  pub(crate) fn submit(&self, work: Work) -> Result<()> {
    let mut q = lock_discard_poison(&self.shared.queue);

    if q.closed {
      return Err(Error::SchedulerClosed);
    }

    q.work.push_back(work);

    if q.idle >= q.work.len() {
      self.shared.work_queued.notify_one();
      return Ok(());
    }

    q.spawned += 1;
    let name = format!("{}-{}", self.shared.thread_name, q.spawned);
    let shared = Arc::clone(&self.shared);

    match thread::Builder::new().name(name.clone()).spawn(move || worker(shared)) {
      | Ok(_) => {
        q.threads += 1;
        log::debug!("{}: worker spawned ({} live)", name, q.threads);
        Ok(())
      },
      | Err(e) if q.threads > 0 => {
        // a busy worker will pick the work up once it frees up
        log::warn!("{}: failed to spawn, leaving work queued: {}", name, e);
        Ok(())
      },
      | Err(e) => {
        q.work.pop_back();
        Err(Error::Spawn { reason: e.to_string() })
      },
    }
  }

  /// Stop accepting work. Queued and running work still completes.
  pub(crate) fn close(&self) {
    let mut q = lock_discard_poison(&self.shared.queue);
    if !q.closed {
      q.closed = true;
      log::info!("{}: pool closed, {} worker(s) live", self.shared.thread_name, q.threads);
    }

    self.shared.work_queued.notify_all();
  }

  pub(crate) fn is_closed(&self) -> bool {
    lock_discard_poison(&self.shared.queue).closed
  }

  /// Live worker threads
  pub(crate) fn threads(&self) -> usize {
    lock_discard_poison(&self.shared.queue).threads
  }

  /// Wait up to `timeout` for every worker to exit. Only meaningful after [`Pool::close`].
  pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
    let q = lock_discard_poison(&self.shared.queue);
    let drained = |q: &Queue| q.threads == 0 && q.work.is_empty();

    match Instant::now().checked_add(timeout) {
      | Some(deadline) => wait_until_discard_poison(&self.shared.drained, q, deadline, drained).1,
      | None => drained(&*wait_discard_poison(&self.shared.drained, q, drained)),
    }
  }
}

/// Worker thread logic
fn worker(shared: Arc<Shared>) {
  let mut q = lock_discard_poison(&shared.queue);

  loop {
    if let Some(work) = q.work.pop_front() {
      drop(q);

      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        log::error!("{}: work panicked: {}",
                    thread::current().name().unwrap_or("worker"),
                    Panicked::from_payload(payload).0);
      }

      q = lock_discard_poison(&shared.queue);
      continue;
    }

    if q.closed {
      break;
    }

    q.idle += 1;
    let (guard, timed_out) = shared.work_queued
                                   .wait_timeout(q, shared.keep_alive)
                                   .map(|(g, t)| (g, t.timed_out()))
                                   .unwrap_or_else(|e| {
                                     let (g, t) = e.into_inner();
                                     (g, t.timed_out())
                                   });
    q = guard;
    q.idle -= 1;

    if timed_out && q.work.is_empty() {
      break;
    }
  }

  q.threads -= 1;
  log::debug!("{}: worker exiting ({} live)",
              thread::current().name().unwrap_or("worker"),
              q.threads);

  if q.threads == 0 {
    shared.drained.notify_all();
  }
}
