use chrono::{DateTime, Utc};

use crate::calendar::Calendar;
use crate::trip::Trip;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// A per-weekday tally, indexed from Monday.
pub type WeekdayCounts = [usize; 7];

/// Typical weekday volume: the mean of Tuesday, Wednesday and Thursday.
///
/// Mondays and Fridays run light around holidays and long weekends, so they
/// are left out along with the weekend.
pub fn trimmed_weekday_mean(counts: &WeekdayCounts) -> f64 {
    (counts[1] + counts[2] + counts[3]) as f64 / 3.0
}

pub fn weekday_index(calendar: &Calendar, t: DateTime<Utc>) -> usize {
    calendar.weekday_of(t).num_days_from_monday() as usize
}

/// Start time of the most recent trip in the dataset.
pub fn latest_start(trips: &[Trip]) -> Option<DateTime<Utc>> {
    trips.iter().map(|t| t.start_time).max()
}

/// Trips starting in the dataset's own trailing seven days.
pub fn last_7_days<'t>(trips: &'t [Trip], calendar: &Calendar) -> impl Iterator<Item = &'t Trip> {
    let window_start = latest_start(trips).map(|latest| calendar.seven_days_before(latest));
    trips
        .iter()
        .filter(move |t| window_start.is_some_and(|start| t.start_time >= start))
}
