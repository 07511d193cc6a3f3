// File: koalabot-core/src/utils/time.rs

use chrono::Utc;

const MS_PER_DAY: f64 = 86_400_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A millisecond span broken into days, hours, minutes and fractional seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanDuration {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
}

impl HumanDuration {
    /// Days and hours are peeled off by repeated subtraction while strictly
    /// greater than one unit, so exactly one day reads as `0d 23h 60m`.
    /// Replies have always been worded that way; keep it.
    pub fn from_millis(ms: f64) -> Self {
        let mut remaining = ms.max(0.0);
        let mut days = 0;
        let mut hours = 0;

        while remaining > MS_PER_DAY {
            remaining -= MS_PER_DAY;
            days += 1;
        }
        while remaining > MS_PER_HOUR {
            remaining -= MS_PER_HOUR;
            hours += 1;
        }

        let minutes = (remaining / MS_PER_MINUTE).floor() as u64;
        let seconds = (remaining % MS_PER_MINUTE) / 1000.0;

        Self { days, hours, minutes, seconds }
    }

    /// `"{d}d {h}h {m}m {s}s"`
    pub fn short(&self) -> String {
        format!("{}d {}h {}m {:.0}s", self.days, self.hours, self.minutes, self.seconds)
    }

    /// `"{d} days {h} hours and {m}m{s}s"`
    pub fn long(&self) -> String {
        format!(
            "{} days {} hours and {}m{:.0}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}
