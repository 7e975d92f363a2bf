use chrono::{DateTime, Duration, Utc};
use serde::Serialize as Ser;

use super::State;

/// Timestamps of a job's state changes
#[derive(Clone, Copy, Debug, PartialEq, Ser)]
pub struct Statistics {
  /// Creation timestamp
  pub created_at: DateTime<Utc>,
  /// When the job was handed to a scheduler
  pub scheduled_at: Option<DateTime<Utc>>,
  /// When the job's computation started
  pub started_at: Option<DateTime<Utc>>,
  /// When the job finished successfully
  pub succeeded_at: Option<DateTime<Utc>>,
  /// When the job was canceled
  pub canceled_at: Option<DateTime<Utc>>,
  /// When the job failed
  pub failed_at: Option<DateTime<Utc>>,
}

impl Default for Statistics {
  fn default() -> Self {
    Self::new()
  }
}

impl Statistics {
  /// Fresh statistics, created now
  pub fn new() -> Self {
    Self { created_at: Utc::now(),
           scheduled_at: None,
           started_at: None,
           succeeded_at: None,
           canceled_at: None,
           failed_at: None }
  }

  /// Stamp the timestamp belonging to `state`.
  ///
  /// A timestamp that is already set is never overwritten.
  pub fn record(&mut self, state: State) {
    let now = Utc::now();
    let slot = match state {
      | State::Scheduled => &mut self.scheduled_at,
      | State::Running => &mut self.started_at,
      | State::Done => &mut self.succeeded_at,
      | State::Canceled => &mut self.canceled_at,
      | State::Failed => &mut self.failed_at,
      | State::Ready => {
        log::warn!("ignoring unexpected change to {:?}", State::Ready);
        return;
      },
    };

    slot.get_or_insert(now);
  }

  /// When the job finished successfully, failed, or was canceled
  pub fn finished_at(&self) -> Option<DateTime<Utc>> {
    self.succeeded_at.or(self.canceled_at).or(self.failed_at)
  }

  /// Time between start and finish
  pub fn duration(&self) -> Option<Duration> {
    match (self.started_at, self.finished_at()) {
      | (Some(start), Some(end)) => Some(end.signed_duration_since(start)),
      | _ => None,
    }
  }

  /// Time since creation, never negative
  pub fn age(&self) -> Duration {
    Utc::now().signed_duration_since(self.created_at).max(Duration::zero())
  }
}
