//! # jobchain
//! In-process jobs with lifecycle listeners, a thread-pool scheduler, and chained execution.
//!
//! A [`Job`] wraps a computation `Fn(&I) -> Result<O, E>`. It moves through
//! `Ready -> Scheduled -> Running -> Done | Failed | Canceled` and tells its
//! [`Listener`]s about every step.
//!
//! # Flow
//! - build a job with [`Job::named`] or [`Job::builder`]
//! - attach listeners (e.g. [`job::hooks::logging`])
//! - either `run` it on the current thread, or hand it to a [`Scheduler`]
//!   and wait on the returned [`JobFuture`]
//! - chain jobs with [`Scheduler::schedule_after`]: the downstream job runs
//!   with a transform of the upstream output once it is done, and is canceled
//!   if the upstream job fails or is canceled
//!
//! ```
//! use jobchain::{Job, Scheduler};
//!
//! let square = Job::named("square", |x: &u64| Ok::<_, String>(x * x));
//! let digits = Job::named("digits", |s: &String| Ok::<_, String>(s.len()));
//!
//! let scheduler = Scheduler::new();
//! let digits_fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
//!                           .unwrap();
//! scheduler.schedule(&square, 10).unwrap();
//!
//! assert_eq!(digits_fut.get().unwrap(), 3);
//! ```
//!
//! # Configuration
//! [`Config::from_env`] reads `.env` and then:
//!   - `JOBCHAIN_SHUTDOWN_GRACE_MS`: how long dropping a scheduler waits for running jobs
//!   - `JOBCHAIN_KEEP_ALIVE_MS`: how long idle worker threads linger
//!   - `JOBCHAIN_THREAD_NAME`: worker thread name prefix

#![cfg_attr(not(test), forbid(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code, missing_copy_implementations))]

/// Scheduler configuration
pub mod config;

/// Error taxonomy
pub mod error;

/// Jobs, listeners and scheduling
pub mod job;

/// Helper mutex functions
pub mod mutex_extra;

pub use config::Config;
pub use error::{BoxError, Error, Failure, Panicked, Result};
pub use job::{aggregate::Aggregate,
              exec::{cancellation_requested, JobFuture, Scheduler},
              pipe::{pipe, pipe_same},
              Builder,
              Event,
              Job,
              Listener,
              ListenerId,
              Report,
              State,
              Statistics};
