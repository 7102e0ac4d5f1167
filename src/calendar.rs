//! Civil-calendar context for every date-sensitive computation.
//!
//! Trip files carry naive local timestamps and week buckets are aligned to
//! Sundays in the operator's timezone, so the timezone is threaded through
//! explicitly as a [`Calendar`] rather than looked up from a global.

use anyhow::{Result, anyhow};
use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;

/// The timezone the Bay Area system publishes its data in.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl Calendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Builds a calendar from an IANA zone name such as `"America/Los_Angeles"`.
    pub fn from_name(name: &str) -> Result<Self> {
        let tz = name
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone {name:?}: {e}"))?;
        Ok(Self::new(tz))
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Interprets a wall-clock time in this calendar's zone.
    ///
    /// Ambiguous times (the repeated hour in autumn) resolve to the earlier
    /// instant; times inside the spring-forward gap are pushed past it.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => self.localize(naive + TimeDelta::hours(1)),
        }
    }

    /// The instant of local midnight at the start of `date`.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.localize(date.and_time(NaiveTime::MIN))
    }

    pub fn date_of(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.tz).date_naive()
    }

    pub fn weekday_of(&self, t: DateTime<Utc>) -> Weekday {
        t.with_timezone(&self.tz).weekday()
    }

    pub fn hour_of(&self, t: DateTime<Utc>) -> u32 {
        t.with_timezone(&self.tz).hour()
    }

    /// The Sunday that begins the week containing `t`.
    pub fn week_start(&self, t: DateTime<Utc>) -> NaiveDate {
        sunday_on_or_before(self.date_of(t))
    }

    /// Start of the trailing seven-day window ending on the day of `latest`:
    /// local midnight six days before that day.
    pub fn seven_days_before(&self, latest: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.date_of(latest) - Days::new(6))
    }

    /// First week start that is *not* complete given data ending at `latest`.
    ///
    /// This is the Sunday strictly after the date six days before `latest`;
    /// every week beginning on or after it is treated as partial.
    pub fn last_complete_sunday(&self, latest: DateTime<Utc>) -> NaiveDate {
        let week_before = self.date_of(latest) - Days::new(6);
        let offset = 7 - u64::from(week_before.weekday().num_days_from_sunday());
        week_before + Days::new(offset)
    }
}

pub fn sunday_on_or_before(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_sunday()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sunday_alignment() {
        // 2018-08-16 was a Thursday.
        assert_eq!(sunday_on_or_before(ymd(2018, 8, 16)), ymd(2018, 8, 12));
        assert_eq!(sunday_on_or_before(ymd(2018, 8, 12)), ymd(2018, 8, 12));
        assert_eq!(sunday_on_or_before(ymd(2018, 8, 11)), ymd(2018, 8, 5));
    }

    #[test]
    fn test_week_start_uses_local_date() {
        let cal = Calendar::default();
        // 2018-08-13 03:00 UTC is still Sunday the 12th in Los Angeles.
        let t = Utc.with_ymd_and_hms(2018, 8, 13, 3, 0, 0).unwrap();
        assert_eq!(cal.date_of(t), ymd(2018, 8, 12));
        assert_eq!(cal.week_start(t), ymd(2018, 8, 12));
        assert_eq!(cal.weekday_of(t), Weekday::Sun);
    }

    #[test]
    fn test_seven_days_before_is_about_a_week() {
        let cal = Calendar::default();
        let latest = cal.localize(ymd(2018, 8, 16).and_hms_opt(23, 59, 59).unwrap());
        let week_ago = cal.seven_days_before(latest);
        assert_eq!(week_ago, cal.midnight(ymd(2018, 8, 10)));
        let days = (latest - week_ago).num_seconds() as f64 / 86_400.0;
        assert!(days > 6.7 && days < 7.3, "got {days}");
    }

    #[test]
    fn test_last_complete_sunday() {
        let cal = Calendar::default();
        // Thursday: the week of the 12th is partial.
        let thu = cal.localize(ymd(2018, 8, 16).and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(cal.last_complete_sunday(thu), ymd(2018, 8, 12));
        // Saturday: the week of the 12th just completed.
        let sat = cal.localize(ymd(2018, 8, 18).and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(cal.last_complete_sunday(sat), ymd(2018, 8, 19));
    }

    #[test]
    fn test_localize_spring_forward_gap() {
        let cal = Calendar::default();
        // 02:30 does not exist on 2018-03-11 in Los Angeles.
        let t = cal.localize(ymd(2018, 3, 11).and_hms_opt(2, 30, 0).unwrap());
        assert_eq!(t, Utc.with_ymd_and_hms(2018, 3, 11, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_from_name() {
        assert!(Calendar::from_name("America/New_York").is_ok());
        assert!(Calendar::from_name("Mars/Olympus_Mons").is_err());
    }
}
