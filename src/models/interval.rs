use std::fmt;

use serde::{Deserialize, Serialize};

/// Candle time interval.
///
/// The six supported bucket widths. `floor` maps a unix timestamp to the
/// start of its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    pub fn seconds(&self) -> u64 {
        match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::OneHour => 3600,
            Interval::FourHours => 14400,
            Interval::OneDay => 86400,
        }
    }

    /// Round a timestamp down to the start of its bucket.
    pub fn floor(&self, timestamp: u64) -> u64 {
        (timestamp / self.seconds()) * self.seconds()
    }

    /// Parse one of the six interval tokens (`1m`, `5m`, `15m`, `1h`, `4h`, `1d`).
    pub fn parse(s: &str) -> Option<Interval> {
        match s {
            "1m" => Some(Interval::OneMinute),
            "5m" => Some(Interval::FiveMinutes),
            "15m" => Some(Interval::FifteenMinutes),
            "1h" => Some(Interval::OneHour),
            "4h" => Some(Interval::FourHours),
            "1d" => Some(Interval::OneDay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_aligns_to_bucket_start() {
        assert_eq!(Interval::OneMinute.floor(1_700_000_030), 1_700_000_000);
        assert_eq!(Interval::OneMinute.floor(1_700_000_061), 1_700_000_060);
        assert_eq!(Interval::OneHour.floor(7199), 3600);
        assert_eq!(Interval::OneDay.floor(86399), 0);
    }

    #[test]
    fn floor_is_idempotent() {
        for interval in Interval::ALL {
            for ts in [0u64, 59, 1_700_000_030, 1_700_000_061, u32::MAX as u64] {
                let floored = interval.floor(ts);
                assert_eq!(interval.floor(floored), floored);
            }
        }
    }

    #[test]
    fn parse_accepts_only_the_six_tokens() {
        assert_eq!(Interval::parse("1m"), Some(Interval::OneMinute));
        assert_eq!(Interval::parse("4h"), Some(Interval::FourHours));
        assert_eq!(Interval::parse("1d"), Some(Interval::OneDay));
        assert_eq!(Interval::parse("2m"), None);
        assert_eq!(Interval::parse("1M"), None);
        assert_eq!(Interval::parse(""), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for interval in Interval::ALL {
            assert_eq!(Interval::parse(interval.as_str()), Some(interval));
        }
    }
}
