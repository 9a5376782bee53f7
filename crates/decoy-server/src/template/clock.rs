//! Time source for `now` placeholders.

use chrono::{DateTime, SecondsFormat, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Format `now.<variant>`; `None` for an unknown variant.
pub(crate) fn format_now(now: DateTime<Utc>, variant: Option<&str>) -> Option<String> {
    match variant {
        None | Some("iso") => Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Some("unix") => Some(now.timestamp().to_string()),
        Some("unixMillis") => Some(now.timestamp_millis().to_string()),
        Some("date") => Some(now.format("%Y-%m-%d").to_string()),
        Some("time") => Some(now.format("%H:%M:%S").to_string()),
        Some(_) => None,
    }
}
