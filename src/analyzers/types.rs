//! Output types produced by the aggregators.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::ser::{Serialize, SerializeTuple, Serializer};

/// One week of a weekly series. `week_start` is the Sunday opening the week.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct WeeklyBucket {
    pub week_start: NaiveDate,
    pub value: f64,
}

/// A sampled value, serialized as `[epoch_millis, value]` for charting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl Serialize for TimePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.at.timestamp_millis())?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

pub type TimeSeries = Vec<TimePoint>;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StationInfo {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// The most frequent station at the other end of a station's trips.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NeighborStation {
    pub id: String,
    pub name: String,
    pub trips: usize,
}

/// A ranked station with its trip totals over the ranking window.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StationCount {
    pub station: StationInfo,
    /// Trips starting here.
    pub count: usize,
    /// Bike Share For All trips starting here.
    pub bike_share_for_all_count: usize,
    /// Trimmed weekday mean of trips starting here.
    pub weekday_ridership: f64,
    /// Where trips ending here most often came from.
    pub top_origin: Option<NeighborStation>,
    /// Where trips starting here most often went.
    pub top_destination: Option<NeighborStation>,
}

impl StationCount {
    pub fn bike_share_for_all_pct(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        100.0 * self.bike_share_for_all_count as f64 / self.count as f64
    }
}

/// Fixed-width histogram whose last bucket also holds everything beyond it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Histogram {
    pub bucket_width: f64,
    pub counts: Vec<usize>,
    pub mean: f64,
}

impl Histogram {
    pub(crate) fn build(values: &[f64], bucket_width: f64, buckets: usize) -> Self {
        let mut counts = vec![0; buckets];
        if buckets > 0 && bucket_width > 0.0 {
            for value in values {
                let idx = ((value / bucket_width).max(0.0) as usize).min(buckets - 1);
                counts[idx] += 1;
            }
        }
        Histogram {
            bucket_width,
            counts,
            mean: super::utility::mean(values),
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Time a station spent unable to rent (empty) or unable to accept returns (full).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationDowntime {
    pub station_id: String,
    pub empty: TimeDelta,
    pub full: TimeDelta,
}
