//! Station and city rankings over the dataset's last seven days.

use std::collections::HashMap;

use super::types::{NeighborStation, StationCount, StationInfo};
use super::utility::{WeekdayCounts, last_7_days, trimmed_weekday_mean, weekday_index};
use crate::boundary::CityBoundary;
use crate::calendar::Calendar;
use crate::trip::{Endpoint, Trip, is_internal_station};

#[derive(Default)]
struct NeighborCount<'t> {
    name: &'t str,
    trips: usize,
}

struct StationAggregate<'t> {
    endpoint: &'t Endpoint,
    weekdays: WeekdayCounts,
    bike_share_for_all_weekdays: WeekdayCounts,
    inbound: HashMap<&'t str, NeighborCount<'t>>,
    outbound: HashMap<&'t str, NeighborCount<'t>>,
}

impl<'t> StationAggregate<'t> {
    fn new(endpoint: &'t Endpoint) -> Self {
        Self {
            endpoint,
            weekdays: [0; 7],
            bike_share_for_all_weekdays: [0; 7],
            inbound: HashMap::new(),
            outbound: HashMap::new(),
        }
    }
}

fn bump<'t>(neighbors: &mut HashMap<&'t str, NeighborCount<'t>>, id: &'t str, name: &'t str) {
    let entry = neighbors.entry(id).or_default();
    entry.name = name;
    entry.trips += 1;
}

/// Most trips wins; ties go to the greater name, then the greater id.
fn busiest(neighbors: &HashMap<&str, NeighborCount<'_>>) -> Option<NeighborStation> {
    neighbors
        .iter()
        .max_by(|(a_id, a), (b_id, b)| {
            a.trips
                .cmp(&b.trips)
                .then_with(|| a.name.cmp(b.name))
                .then_with(|| a_id.cmp(b_id))
        })
        .map(|(id, n)| NeighborStation {
            id: id.to_string(),
            name: n.name.to_string(),
            trips: n.trips,
        })
}

fn station_aggregates<'t>(
    trips: &'t [Trip],
    calendar: &Calendar,
) -> HashMap<&'t str, StationAggregate<'t>> {
    let mut stations: HashMap<&str, StationAggregate> = HashMap::new();
    for trip in last_7_days(trips, calendar) {
        if trip.is_dockless() {
            continue;
        }
        let (Some(from), Some(to)) = (
            trip.start.station_id.as_deref(),
            trip.end.station_id.as_deref(),
        ) else {
            continue;
        };

        let day = weekday_index(calendar, trip.start_time);
        let origin = stations
            .entry(from)
            .or_insert_with(|| StationAggregate::new(&trip.start));
        origin.weekdays[day] += 1;
        if trip.bike_share_for_all_trip {
            origin.bike_share_for_all_weekdays[day] += 1;
        }
        bump(&mut origin.outbound, to, &trip.end.name);

        let destination = stations
            .entry(to)
            .or_insert_with(|| StationAggregate::new(&trip.end));
        bump(&mut destination.inbound, from, &trip.start.name);
    }
    stations
}

fn rank(
    trips: &[Trip],
    calendar: &Calendar,
    n: usize,
    key: fn(&StationCount) -> usize,
) -> Vec<StationCount> {
    let mut ranked: Vec<StationCount> = station_aggregates(trips, calendar)
        .into_iter()
        .filter(|(id, _)| !is_internal_station(id))
        .map(|(id, agg)| StationCount {
            station: StationInfo {
                id: id.to_string(),
                name: agg.endpoint.name.clone(),
                latitude: agg.endpoint.latitude,
                longitude: agg.endpoint.longitude,
            },
            count: agg.weekdays.iter().sum(),
            bike_share_for_all_count: agg.bike_share_for_all_weekdays.iter().sum(),
            weekday_ridership: trimmed_weekday_mean(&agg.weekdays),
            top_origin: busiest(&agg.inbound),
            top_destination: busiest(&agg.outbound),
        })
        .filter(|s| key(s) > 0)
        .collect();

    ranked.sort_by(|a, b| {
        key(b)
            .cmp(&key(a))
            .then_with(|| b.station.name.cmp(&a.station.name))
    });
    ranked.truncate(n);
    ranked
}

/// The `n` busiest docked stations by departures.
pub fn popular_stations_last_7_days(
    trips: &[Trip],
    calendar: &Calendar,
    n: usize,
) -> Vec<StationCount> {
    rank(trips, calendar, n, |s| s.count)
}

/// Like [`popular_stations_last_7_days`], ranked by Bike Share For All departures.
pub fn popular_bs4a_stations_last_7_days(
    trips: &[Trip],
    calendar: &Calendar,
    n: usize,
) -> Vec<StationCount> {
    rank(trips, calendar, n, |s| s.bike_share_for_all_count)
}

/// Typical system-wide weekday trip volume over the last seven days.
pub fn average_weekday_trips(trips: &[Trip], calendar: &Calendar) -> f64 {
    let mut weekdays: WeekdayCounts = [0; 7];
    for trip in last_7_days(trips, calendar) {
        weekdays[weekday_index(calendar, trip.start_time)] += 1;
    }
    trimmed_weekday_mean(&weekdays)
}

/// Trips over the last seven days starting inside each city, in input order.
pub fn trips_last_week_per_city(
    trips: &[Trip],
    calendar: &Calendar,
    cities: &[&dyn CityBoundary],
) -> Vec<usize> {
    let mut counts = vec![0; cities.len()];
    for trip in last_7_days(trips, calendar) {
        for (count, city) in counts.iter_mut().zip(cities) {
            if city.contains_point(trip.start.latitude, trip.start.longitude) {
                *count += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::polygon_from_lat_lon;
    use crate::trip::fixtures::trip;
    use chrono::{DateTime, TimeZone, Utc};

    // Mon 2018-08-13 .. Sun 2018-08-19, at the given Los Angeles hour.
    fn day(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 8, d, hour + 7, 0, 0).unwrap()
    }

    fn repeat(n: usize, t: DateTime<Utc>, from: (&str, &str), to: (&str, &str)) -> Vec<Trip> {
        (0..n).map(|i| trip(t, from, to, i as i64)).collect()
    }

    #[test]
    fn test_average_weekday_trips_trims_monday_and_friday() {
        let mut trips = Vec::new();
        for (d, n) in [(13, 10), (14, 50), (15, 60), (16, 55), (17, 5), (19, 1)] {
            trips.extend(repeat(n, day(d, 9), ("1", "a"), ("2", "b")));
        }
        assert_eq!(average_weekday_trips(&trips, &Calendar::default()), 55.0);
    }

    #[test]
    fn test_popular_stations_order_and_neighbors() {
        let mut trips = Vec::new();
        for d in 14..=16 {
            trips.extend(repeat(6, day(d, 8), ("1", "Alpha"), ("2", "Bravo")));
            trips.extend(repeat(3, day(d, 8), ("1", "Alpha"), ("3", "Charlie")));
            trips.extend(repeat(3, day(d, 8), ("3", "Charlie"), ("1", "Alpha")));
            trips.extend(repeat(3, day(d, 8), ("2", "Bravo"), ("1", "Alpha")));
        }
        // Dockless and depot trips never rank.
        trips.extend(repeat(50, day(15, 8), ("", "NULL"), ("1", "Alpha")));
        trips.extend(repeat(50, day(15, 8), ("344", "Depot"), ("1", "Alpha")));
        trips.push(trip(day(19, 8), ("4", "Delta"), ("1", "Alpha"), 0));

        let ranked = popular_stations_last_7_days(&trips, &Calendar::default(), 10);
        let names: Vec<_> = ranked.iter().map(|s| s.station.name.as_str()).collect();
        // Charlie and Bravo tie; the greater name comes first.
        assert_eq!(names, vec!["Alpha", "Charlie", "Bravo", "Delta"]);

        let alpha = &ranked[0];
        assert_eq!(alpha.count, 27);
        assert_eq!(alpha.weekday_ridership, 9.0);
        // Sunday trips count toward the total but not the weekday figure.
        assert_eq!((ranked[3].count, ranked[3].weekday_ridership), (1, 0.0));
        assert_eq!(alpha.top_destination.as_ref().unwrap().name, "Bravo");
        // Depot sends 50, Charlie and Bravo 9 each.
        assert_eq!(alpha.top_origin.as_ref().unwrap().id, "344");

        let bravo = &ranked[2];
        let origin = bravo.top_origin.as_ref().unwrap();
        assert_eq!((origin.name.as_str(), origin.trips), ("Alpha", 18));

        assert_eq!(
            popular_stations_last_7_days(&trips, &Calendar::default(), 1).len(),
            1
        );
    }

    #[test]
    fn test_weekend_station_ranks_by_total() {
        let mut trips = repeat(20, day(18, 10), ("1", "Weekend"), ("2", "Other"));
        trips.extend(repeat(20, day(19, 10), ("1", "Weekend"), ("2", "Other")));
        trips.extend(repeat(3, day(14, 10), ("3", "Tuesday"), ("2", "Other")));

        let ranked = popular_stations_last_7_days(&trips, &Calendar::default(), 10);
        let totals: Vec<_> = ranked
            .iter()
            .map(|s| (s.station.name.as_str(), s.count, s.weekday_ridership))
            .collect();
        assert_eq!(totals, vec![("Weekend", 40, 0.0), ("Tuesday", 3, 1.0)]);
    }

    #[test]
    fn test_neighbor_tie_goes_to_greater_name() {
        let mut trips = repeat(2, day(14, 8), ("1", "Alpha"), ("2", "Bravo"));
        trips.extend(repeat(2, day(14, 8), ("1", "Alpha"), ("3", "Zulu")));
        let ranked = popular_stations_last_7_days(&trips, &Calendar::default(), 5);
        assert_eq!(ranked[0].top_destination.as_ref().unwrap().name, "Zulu");
    }

    #[test]
    fn test_bs4a_ranking() {
        let mut trips = repeat(9, day(15, 8), ("1", "Alpha"), ("2", "Bravo"));
        let mut member = repeat(3, day(15, 8), ("2", "Bravo"), ("1", "Alpha"));
        member.iter_mut().for_each(|t| t.bike_share_for_all_trip = true);
        trips.extend(member);

        let ranked = popular_bs4a_stations_last_7_days(&trips, &Calendar::default(), 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].station.name, "Bravo");
        assert_eq!(ranked[0].bike_share_for_all_count, 3);
        assert_eq!(ranked[0].bike_share_for_all_pct(), 100.0);
    }

    #[test]
    fn test_trips_per_city() {
        let trips = repeat(4, day(15, 8), ("1", "Alpha"), ("2", "Bravo"));
        let oakland = polygon_from_lat_lon(&[
            (37.79, -122.29),
            (37.79, -122.25),
            (37.82, -122.25),
            (37.82, -122.29),
        ]);
        let elsewhere = polygon_from_lat_lon(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        let counts =
            trips_last_week_per_city(&trips, &Calendar::default(), &[&oakland, &elsewhere]);
        assert_eq!(counts, vec![4, 0]);
    }
}
