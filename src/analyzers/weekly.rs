//! Week-bucketed series over the trip history.
//!
//! Every series runs from the first week with data to the last complete week,
//! one bucket per week with nothing skipped. The trailing partial week is
//! always dropped (see [`Calendar::last_complete_sunday`]).

use std::collections::HashSet;

use chrono::{Days, NaiveDate};

use super::types::WeeklyBucket;
use super::utility::latest_start;
use crate::calendar::Calendar;
use crate::trip::Trip;

/// A per-week reduction over trips.
pub trait WeeklyMetric {
    /// Per-week state. May borrow from the trips being scanned.
    type Acc<'t>: Default;

    /// Trips rejected here do not count toward any week, and do not open the
    /// series either.
    fn includes(&self, _trip: &Trip) -> bool {
        true
    }

    fn accumulate<'t>(&self, acc: &mut Self::Acc<'t>, trip: &'t Trip);

    fn finish(&self, acc: Self::Acc<'_>) -> f64;
}

fn week_offset(first: NaiveDate, week: NaiveDate) -> usize {
    (week.signed_duration_since(first).num_days() / 7) as usize
}

/// Buckets `trips` by week and reduces each week with `metric`.
pub fn weekly_series<M: WeeklyMetric>(
    trips: &[Trip],
    calendar: &Calendar,
    metric: &M,
) -> Vec<WeeklyBucket> {
    let Some(latest) = latest_start(trips) else {
        return Vec::new();
    };
    let cutoff = calendar.last_complete_sunday(latest);

    let weeks: Vec<(NaiveDate, &Trip)> = trips
        .iter()
        .filter(|t| metric.includes(t))
        .map(|t| (calendar.week_start(t.start_time), t))
        .filter(|(week, _)| *week < cutoff)
        .collect();

    let (Some(first), Some(last)) = (
        weeks.iter().map(|(w, _)| *w).min(),
        weeks.iter().map(|(w, _)| *w).max(),
    ) else {
        return Vec::new();
    };

    let mut accs: Vec<M::Acc<'_>> = (0..=week_offset(first, last))
        .map(|_| Default::default())
        .collect();
    for (week, trip) in weeks {
        metric.accumulate(&mut accs[week_offset(first, week)], trip);
    }

    accs.into_iter()
        .enumerate()
        .map(|(i, acc)| WeeklyBucket {
            week_start: first + Days::new(7 * i as u64),
            value: metric.finish(acc),
        })
        .collect()
}

pub struct TripCount;

impl WeeklyMetric for TripCount {
    type Acc<'t> = usize;

    fn accumulate<'t>(&self, acc: &mut usize, _trip: &'t Trip) {
        *acc += 1;
    }

    fn finish(&self, acc: usize) -> f64 {
        acc as f64
    }
}

/// Distinct docked start stations.
pub struct UniqueStartStations;

impl WeeklyMetric for UniqueStartStations {
    type Acc<'t> = HashSet<&'t str>;

    fn accumulate<'t>(&self, acc: &mut HashSet<&'t str>, trip: &'t Trip) {
        if let Some(id) = trip.start.station_id.as_deref() {
            acc.insert(id);
        }
    }

    fn finish(&self, acc: HashSet<&str>) -> f64 {
        acc.len() as f64
    }
}

pub struct UniqueBikes;

impl WeeklyMetric for UniqueBikes {
    type Acc<'t> = HashSet<i64>;

    fn accumulate<'t>(&self, acc: &mut HashSet<i64>, trip: &'t Trip) {
        acc.insert(trip.bike_id);
    }

    fn finish(&self, acc: HashSet<i64>) -> f64 {
        acc.len() as f64
    }
}

/// Average number of trips each active bike made that week.
pub struct TripsPerBike;

impl WeeklyMetric for TripsPerBike {
    type Acc<'t> = (usize, HashSet<i64>);

    fn accumulate<'t>(&self, acc: &mut (usize, HashSet<i64>), trip: &'t Trip) {
        acc.0 += 1;
        acc.1.insert(trip.bike_id);
    }

    fn finish(&self, (trips, bikes): (usize, HashSet<i64>)) -> f64 {
        if bikes.is_empty() {
            return 0.0;
        }
        trips as f64 / bikes.len() as f64
    }
}

pub struct BikeShareForAll;

impl WeeklyMetric for BikeShareForAll {
    type Acc<'t> = usize;

    fn includes(&self, trip: &Trip) -> bool {
        trip.bike_share_for_all_trip
    }

    fn accumulate<'t>(&self, acc: &mut usize, _trip: &'t Trip) {
        *acc += 1;
    }

    fn finish(&self, acc: usize) -> f64 {
        acc as f64
    }
}

/// Estimated revenue in dollars.
pub struct Revenue;

impl WeeklyMetric for Revenue {
    type Acc<'t> = u64;

    fn accumulate<'t>(&self, acc: &mut u64, trip: &'t Trip) {
        *acc += u64::from(trip.revenue_cents());
    }

    fn finish(&self, acc: u64) -> f64 {
        acc as f64 / 100.0
    }
}

pub fn trips_per_week(trips: &[Trip], calendar: &Calendar) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &TripCount)
}

pub fn unique_stations_per_week(trips: &[Trip], calendar: &Calendar) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &UniqueStartStations)
}

pub fn unique_bikes_per_week(trips: &[Trip], calendar: &Calendar) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &UniqueBikes)
}

pub fn trips_per_bike_per_week(trips: &[Trip], calendar: &Calendar) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &TripsPerBike)
}

pub fn bike_share_for_all_trips_per_week(
    trips: &[Trip],
    calendar: &Calendar,
) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &BikeShareForAll)
}

pub fn revenue_per_week(trips: &[Trip], calendar: &Calendar) -> Vec<WeeklyBucket> {
    weekly_series(trips, calendar, &Revenue)
}
