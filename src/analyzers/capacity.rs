//! Station availability over time, from the capacity log.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use super::types::{StationDowntime, TimePoint, TimeSeries};
use crate::record::StationSnapshot;

/// Per-station snapshot history, oldest first.
pub type StatusMap = HashMap<String, Vec<StationSnapshot>>;

pub fn status_map(snapshots: impl IntoIterator<Item = StationSnapshot>) -> StatusMap {
    let mut map = StatusMap::new();
    for snapshot in snapshots {
        map.entry(snapshot.station_id.clone())
            .or_default()
            .push(snapshot);
    }
    for history in map.values_mut() {
        history.sort_by_key(|s| s.last_reported);
    }
    map
}

/// An operating station with no bikes to rent.
pub fn is_empty(s: &StationSnapshot) -> bool {
    s.is_installed && s.is_renting && s.num_bikes_available == 0
}

/// An operating station with no free docks.
pub fn is_full(s: &StationSnapshot) -> bool {
    s.is_installed && s.is_renting && s.num_docks_available == 0
}

/// Counts, at each tick from `start` to `end` inclusive, the stations whose
/// most recent snapshot satisfies `predicate`.
///
/// A snapshot stays in effect until the station's next one. Ticks before the
/// first snapshot of any station, or after the last snapshot of every
/// station, produce no point.
pub fn status_filter_over_time<P>(
    by_station: &StatusMap,
    predicate: P,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: TimeDelta,
) -> TimeSeries
where
    P: Fn(&StationSnapshot) -> bool,
{
    let mut series = TimeSeries::new();
    if interval <= TimeDelta::zero() {
        return series;
    }
    let Some(coverage_end) = by_station
        .values()
        .filter_map(|history| history.last())
        .map(|s| s.last_reported)
        .max()
    else {
        return series;
    };

    let histories: Vec<&[StationSnapshot]> = by_station.values().map(Vec::as_slice).collect();
    // Index of the first snapshot after the current tick, per station.
    let mut cursors = vec![0usize; histories.len()];

    let mut tick = start;
    while tick <= end && tick <= coverage_end {
        let mut observed = false;
        let mut matching = 0usize;
        for (history, cursor) in histories.iter().zip(cursors.iter_mut()) {
            while *cursor < history.len() && history[*cursor].last_reported <= tick {
                *cursor += 1;
            }
            if *cursor == 0 {
                continue;
            }
            observed = true;
            if predicate(&history[*cursor - 1]) {
                matching += 1;
            }
        }
        if observed {
            series.push(TimePoint {
                at: tick,
                value: matching as f64,
            });
        }
        tick += interval;
    }
    series
}

/// Total time each station spent empty and full, summed over the gaps
/// between its consecutive snapshots.
pub fn empty_and_full_durations(by_station: &StatusMap) -> Vec<StationDowntime> {
    let mut downtime: Vec<StationDowntime> = by_station
        .iter()
        .map(|(id, history)| {
            let mut empty = TimeDelta::zero();
            let mut full = TimeDelta::zero();
            for pair in history.windows(2) {
                let gap = pair[1].last_reported - pair[0].last_reported;
                if is_empty(&pair[0]) {
                    empty += gap;
                }
                if is_full(&pair[0]) {
                    full += gap;
                }
            }
            StationDowntime {
                station_id: id.clone(),
                empty,
                full,
            }
        })
        .collect();
    downtime.sort_by(|a, b| {
        (b.empty + b.full)
            .cmp(&(a.empty + a.full))
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
    downtime
}
