use chrono::TimeDelta;

use super::types::Histogram;
use super::utility::last_7_days;
use crate::calendar::Calendar;
use crate::trip::Trip;

/// Trip distances over the last seven days, in `width_miles` buckets.
pub fn distance_buckets_last_week(
    trips: &[Trip],
    calendar: &Calendar,
    width_miles: f64,
    buckets: usize,
) -> Histogram {
    let distances: Vec<f64> = last_7_days(trips, calendar)
        .filter(|t| t.has_valid_times())
        .map(Trip::distance_miles)
        .collect();
    Histogram::build(&distances, width_miles, buckets)
}

/// Trip durations over the last seven days. Widths and the mean are in minutes.
pub fn duration_buckets_last_week(
    trips: &[Trip],
    calendar: &Calendar,
    width: TimeDelta,
    buckets: usize,
) -> Histogram {
    let minutes = |d: TimeDelta| d.num_milliseconds() as f64 / 60_000.0;
    let durations: Vec<f64> = last_7_days(trips, calendar)
        .filter(|t| t.has_valid_times())
        .map(|t| minutes(t.duration))
        .collect();
    Histogram::build(&durations, minutes(width), buckets)
}

/// Trip starts by local hour of day, across the whole dataset.
pub fn trips_by_hour(trips: &[Trip], calendar: &Calendar) -> [usize; 24] {
    let mut hours = [0; 24];
    for trip in trips {
        hours[calendar.hour_of(trip.start_time) as usize] += 1;
    }
    hours
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::fixtures::trip;
    use chrono::{DateTime, TimeZone, Utc};

    fn local(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 8, d, hour + 7, 0, 0).unwrap()
    }

    #[test]
    fn test_duration_buckets() {
        let mut trips = Vec::new();
        for (i, mins) in [3, 12, 14, 95].into_iter().enumerate() {
            let mut t = trip(local(15, 8), ("1", "a"), ("2", "b"), i as i64);
            t.duration = TimeDelta::minutes(mins);
            t.end_time = t.start_time + t.duration;
            trips.push(t);
        }
        // Ends before it starts.
        let mut bad = trip(local(15, 9), ("1", "a"), ("2", "b"), 9);
        bad.end_time = bad.start_time - TimeDelta::minutes(1);
        trips.push(bad);
        // Outside the window.
        trips.push(trip(local(1, 9), ("1", "a"), ("2", "b"), 10));

        let h = duration_buckets_last_week(&trips, &Calendar::default(), TimeDelta::minutes(10), 4);
        assert_eq!(h.bucket_width, 10.0);
        assert_eq!(h.counts, vec![1, 2, 0, 1]);
        assert_eq!(h.mean, 31.0);
    }

    #[test]
    fn test_distance_buckets() {
        let mut far = trip(local(15, 8), ("1", "a"), ("2", "b"), 1);
        // Roughly 6.9 miles of latitude.
        far.end.latitude += 0.1;
        let near = trip(local(15, 8), ("1", "a"), ("2", "b"), 2);

        let h = distance_buckets_last_week(&[far, near], &Calendar::default(), 0.5, 6);
        assert_eq!(h.counts, vec![1, 0, 0, 0, 0, 1]);
        assert!((h.mean - 3.45).abs() < 0.05);
    }

    #[test]
    fn test_trips_by_hour() {
        let trips = vec![
            trip(local(15, 8), ("1", "a"), ("2", "b"), 1),
            trip(local(15, 8), ("1", "a"), ("2", "b"), 2),
            trip(local(16, 17), ("1", "a"), ("2", "b"), 3),
        ];
        let hours = trips_by_hour(&trips, &Calendar::default());
        assert_eq!(hours[8], 2);
        assert_eq!(hours[17], 1);
        assert_eq!(hours.iter().sum::<usize>(), 3);
    }
}
