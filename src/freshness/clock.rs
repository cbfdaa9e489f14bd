use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Source of the current instant, injectable for tests.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// The publisher releases on US Eastern time, whatever the device's zone is.
pub fn publisher_time(now: DateTime<Utc>) -> DateTime<Tz> {
  now.with_timezone(&New_York)
}

/// 00:00 to 00:05 Eastern: the day's page may not have rolled over yet.
pub fn in_rollover_window(eastern: &DateTime<Tz>) -> bool {
  eastern.hour() == 0 && eastern.minute() < 5
}
