use std::{
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;


const SECONDS_PER_DAY: i64 = 86_400;
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;


/// A UTC instant with whole-second resolution.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    pub fn from_utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let days = days_from_civil(year as i64, month as i64, day as i64);
        Self(days * SECONDS_PER_DAY + hour as i64 * 3600 + minute as i64 * 60 + second as i64)
    }

    pub const fn unix_seconds(&self) -> i64 {
        self.0
    }

    pub fn julian_day(&self) -> f64 {
        self.0 as f64 / SECONDS_PER_DAY as f64 + UNIX_EPOCH_JULIAN_DAY
    }

    /// Minutes elapsed since 00:00 UTC of the same day.
    pub fn utc_minutes_of_day(&self) -> f64 {
        self.0.rem_euclid(SECONDS_PER_DAY) as f64 / 60.0
    }

    pub const fn plus_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + seconds)
    }

    pub const fn seconds_until(&self, later: Timestamp) -> i64 {
        later.0 - self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.0.div_euclid(SECONDS_PER_DAY);
        let secs = self.0.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            year,
            month,
            day,
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
        )
    }
}

/// Parses `YYYY-MM-DDTHH:MM[:SS][Z]` (UTC only) or a bare unix second count.
impl FromStr for Timestamp {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(seconds) = s.parse::<i64>() {
            return Ok(Self(seconds));
        }

        let s = s.strip_suffix('Z').unwrap_or(s);
        let (date, time) = s
            .split_once(['T', ' '])
            .ok_or_else(|| invalid(format!("expected YYYY-MM-DDTHH:MM[:SS]Z, got '{s}'")))?;

        let date: Vec<&str> = date.split('-').collect();
        let time: Vec<&str> = time.split(':').collect();
        if date.len() != 3 || !(2..=3).contains(&time.len()) {
            return Err(invalid(format!("expected YYYY-MM-DDTHH:MM[:SS]Z, got '{s}'")));
        }

        let field = |v: &str| v.parse::<u32>().map_err(|e| invalid(format!("invalid field '{v}': {e}")));
        let year = date[0].parse::<i32>().map_err(|e| invalid(format!("invalid year '{}': {e}", date[0])))?;
        let month = field(date[1])?;
        let day = field(date[2])?;
        let hour = field(time[0])?;
        let minute = field(time[1])?;
        let second = match time.get(2) {
            Some(v) => field(v)?,
            None => 0,
        };

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60 {
            return Err(invalid(format!("timestamp field out of range in '{s}'")));
        }

        Ok(Self::from_utc(year, month, day, hour, minute, second))
    }
}

fn invalid(msg: String) -> AnalysisError {
    AnalysisError::InvalidTimestamp(msg)
}

// proleptic gregorian day counts, see http://howardhinnant.github.io/date_algorithms.html
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let doy = (153 * (month + if month > 2 { -3 } else { 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}


/// One accumulation step of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSample {
    pub index: usize,
    pub time: Timestamp,
}


/// Ordered timestamps covering `[start, stop)` at a fixed minute interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeries {
    pub start: Timestamp,
    pub stop: Timestamp,
    pub interval_minutes: u32,
    samples: Vec<TimeSample>,
}

impl TimeSeries {
    /// Steps start at `start`; a trailing step that would not fit before `stop` is dropped.
    /// A non-empty window shorter than one interval still gets the step at `start`.
    pub fn plan(start: Timestamp, stop: Timestamp, interval_minutes: u32) -> Self {
        let interval_minutes = interval_minutes.max(1);
        let interval_seconds = interval_minutes as i64 * 60;
        let span = start.seconds_until(stop).max(0);
        let count = if span > 0 {
            ((span / interval_seconds) as usize).max(1)
        } else {
            0
        };

        let samples = (0..count)
            .map(|index| TimeSample {
                index,
                time: start.plus_seconds(index as i64 * interval_seconds),
            })
            .collect();

        Self {
            start,
            stop,
            interval_minutes,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TimeSample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeSample> {
        self.samples.iter()
    }

    /// Per-step contribution of a lit sample to the accumulated ratio.
    pub fn step_weight(&self) -> f32 {
        if self.samples.is_empty() {
            0.0
        } else {
            1.0 / self.samples.len() as f32
        }
    }

    pub fn window_minutes(&self) -> f64 {
        self.start.seconds_until(self.stop).max(0) as f64 / 60.0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_round_trip() {
        let t = Timestamp::from_utc(2024, 6, 21, 8, 30, 15);
        assert_eq!(t.to_string(), "2024-06-21T08:30:15Z");
        assert_eq!("2024-06-21T08:30:15Z".parse::<Timestamp>(), Ok(t));
        assert_eq!(Timestamp::from_utc(1970, 1, 1, 0, 0, 0).unix_seconds(), 0);
        assert_eq!(Timestamp::from_utc(2000, 1, 1, 12, 0, 0).julian_day(), 2_451_545.0);
    }

    #[test]
    fn count_is_floor_of_window_over_interval() {
        let start = Timestamp::from_utc(2024, 6, 21, 8, 0, 0);
        let stop = Timestamp::from_utc(2024, 6, 21, 18, 0, 0);

        let series = TimeSeries::plan(start, stop, 60);
        assert_eq!(series.len(), 10);

        let series = TimeSeries::plan(start, stop.plus_seconds(59 * 60), 60);
        assert_eq!(series.len(), 10);

        let series = TimeSeries::plan(start, stop, 7);
        assert_eq!(series.len(), (10 * 60) / 7);
        for sample in series.iter() {
            assert!(sample.time < stop);
        }
        let last = series.get(series.len() - 1).unwrap();
        assert!(last.time < stop);
    }

    #[test]
    fn interval_is_clamped_to_one_minute() {
        let start = Timestamp::from_utc(2024, 1, 1, 0, 0, 0);
        let series = TimeSeries::plan(start, start.plus_seconds(300), 0);
        assert_eq!(series.interval_minutes, 1);
        assert_eq!(series.len(), 5);
    }

    #[test]
    fn window_shorter_than_interval_keeps_one_step() {
        let start = Timestamp::from_utc(2024, 6, 21, 4, 0, 0);
        let series = TimeSeries::plan(start, start.plus_seconds(30 * 60), 60);
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(0).unwrap().time, start);
        assert_eq!(series.step_weight(), 1.0);
        assert_eq!(series.window_minutes(), 30.0);

        assert!(TimeSeries::plan(start, start, 60).is_empty());
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        for text in ["2024-06-21", "2024-13-01T00:00Z", "2024-06-21T08:xxZ"] {
            assert!(matches!(text.parse::<Timestamp>(), Err(AnalysisError::InvalidTimestamp(_))), "{text}");
        }
    }

    #[test]
    fn timestamps_strictly_increase() {
        let start = Timestamp::from_utc(2024, 3, 1, 6, 0, 0);
        let series = TimeSeries::plan(start, start.plus_seconds(6 * 3600), 15);
        let times: Vec<_> = series.iter().map(|s| s.time).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(times[0], start);
    }
}
