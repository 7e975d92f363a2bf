use std::{env, str::FromStr, time::Duration};

/// Env var: milliseconds `Drop for Scheduler` waits for in-flight jobs
pub const SHUTDOWN_GRACE_MS: &str = "JOBCHAIN_SHUTDOWN_GRACE_MS";
/// Env var: milliseconds an idle worker thread lingers before exiting
pub const KEEP_ALIVE_MS: &str = "JOBCHAIN_KEEP_ALIVE_MS";
/// Env var: name given to worker threads
pub const THREAD_NAME: &str = "JOBCHAIN_THREAD_NAME";

/// Scheduler configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
  /// How long dropping a scheduler waits for in-flight jobs to drain
  pub shutdown_grace: Duration,
  /// How long an idle worker waits for new work before its thread exits
  pub keep_alive: Duration,
  /// Name given to worker threads
  pub thread_name: String,
}

impl Default for Config {
  fn default() -> Self {
    Self { shutdown_grace: Duration::from_millis(2000),
           keep_alive: Duration::from_secs(60),
           thread_name: "jobchain-worker".into() }
  }
}

impl Config {
  /// Read configuration from the environment (loading `./.env` if present),
  /// falling back to defaults for anything unset or unparsable.
  pub fn from_env() -> Self {
    dotenv::dotenv().ok();

    let default = Self::default();

    Self { shutdown_grace: millis(SHUTDOWN_GRACE_MS).unwrap_or(default.shutdown_grace),
           keep_alive: millis(KEEP_ALIVE_MS).unwrap_or(default.keep_alive),
           thread_name: env::var(THREAD_NAME).ok()
                                             .filter(|s| !s.trim().is_empty())
                                             .unwrap_or(default.thread_name) }
  }
}

fn millis(key: &str) -> Option<Duration> {
  parse::<u64>(key).map(Duration::from_millis)
}

fn parse<T: FromStr>(key: &str) -> Option<T> {
  let raw = env::var(key).ok()?;

  match raw.trim().parse() {
    | Ok(v) => Some(v),
    | Err(_) => {
      log::warn!("{}={:?} is not valid, using the default", key, raw);
      None
    },
  }
}
