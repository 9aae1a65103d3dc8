//! Local-day arithmetic over absolute timestamps.
//!
//! Every timestamp is stored in UTC. "Today" and the day a reward or
//! price belongs to are decided in the configured zone, which is passed
//! in explicitly instead of living in process-wide state.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq)]
enum NowSource {
    System,
    Fixed(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalClock {
    tz:  Tz,
    now: NowSource,
}

impl LocalClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz, now: NowSource::System }
    }

    /// A clock frozen at `now`. Used by tests and replay tooling.
    pub fn fixed(tz: Tz, now: DateTime<Utc>) -> Self {
        Self { tz, now: NowSource::Fixed(now) }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self.now {
            NowSource::System   => Utc::now(),
            NowSource::Fixed(t) => t,
        }
    }

    /// Local calendar day an instant falls on.
    pub fn local_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_day(self.now())
    }

    /// First instant of `day` in the local zone.
    /// Zones that skip midnight start the day at the first valid hour.
    pub fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        let mut local = day.and_time(NaiveTime::MIN);
        for _ in 0..24 {
            if let Some(start) = self.tz.from_local_datetime(&local).earliest() {
                return start.with_timezone(&Utc);
            }
            local += Duration::hours(1);
        }
        // Unreachable for real zones; treat the naive time as UTC.
        Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
    }

    /// Half-open `[start, end)` bounds of a local calendar day.
    pub fn day_range(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let next = day.succ_opt().unwrap_or(day);
        (self.day_start(day), self.day_start(next))
    }

    pub fn today_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.day_range(self.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn kolkata_day_starts_at_1830_utc() {
        let clock = LocalClock::fixed(chrono_tz::Asia::Kolkata, utc("2024-03-10T20:00:00Z"));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        let (start, end) = clock.today_range();
        assert_eq!(start, utc("2024-03-10T18:30:00Z"));
        assert_eq!(end, utc("2024-03-11T18:30:00Z"));
    }

    #[test]
    fn local_day_differs_from_utc_day() {
        let clock = LocalClock::new(chrono_tz::Asia::Kolkata);
        let late_utc = utc("2024-03-10T19:00:00Z");
        assert_eq!(clock.local_day(late_utc), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[test]
    fn dst_day_is_23_hours() {
        let clock = LocalClock::new(chrono_tz::Europe::London);
        let (start, end) = clock.day_range(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(end - start, Duration::hours(23));
    }
}
