//! Row decoder for historical trip files.
//!
//! Two layouts have been published. Both share the first thirteen columns:
//!
//! ```text
//! duration_sec,start_time,end_time,
//! start_station_id,start_station_name,start_station_latitude,start_station_longitude,
//! end_station_id,end_station_name,end_station_latitude,end_station_longitude,
//! bike_id,user_type
//! ```
//!
//! The older files follow these with `member_birth_year,member_gender,
//! bike_share_for_all_trip`; the newer ones with
//! `bike_share_for_all_trip,rental_access_method`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use csv::StringRecord;
use thiserror::Error;

use crate::calendar::Calendar;
use crate::trip::{Endpoint, Trip, UserType};

/// Station 347 was renumbered; trips still reference the old id.
const RENUMBERED_STATION: (&str, &str) = ("347", "136");

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SHARED_COLUMNS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Trailing columns: birth year, gender, bike share for all.
    MemberDemographics,
    /// Trailing columns: bike share for all, rental access method.
    RentalAccess,
}

/// Column positions of the layout-specific fields.
struct Layout {
    member_birth_year: Option<usize>,
    member_gender: Option<usize>,
    bike_share_for_all_trip: usize,
    rental_access_method: Option<usize>,
}

const MEMBER_DEMOGRAPHICS: Layout = Layout {
    member_birth_year: Some(13),
    member_gender: Some(14),
    bike_share_for_all_trip: 15,
    rental_access_method: None,
};

const RENTAL_ACCESS: Layout = Layout {
    member_birth_year: None,
    member_gender: None,
    bike_share_for_all_trip: 13,
    rental_access_method: Some(14),
};

impl SchemaVersion {
    pub fn from_year_month(year: i32, month: u32) -> Self {
        let rental_access = year >= 2020 || (year == 2019 && matches!(month, 5 | 6 | 10..=12));
        if rental_access {
            SchemaVersion::RentalAccess
        } else {
            SchemaVersion::MemberDemographics
        }
    }

    /// Infers the layout from the `YYYYMM` prefix of a file name such as
    /// `201907-baywheels-tripdata.csv`. The first year was published as a
    /// single `2017-fordgobike-tripdata.csv`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if let Some(date) = name
            .get(..6)
            .and_then(|prefix| NaiveDate::parse_from_str(&format!("{prefix}01"), "%Y%m%d").ok())
        {
            return Some(Self::from_year_month(date.year(), date.month()));
        }
        let (year, rest) = (name.get(..4)?, name.get(4..)?);
        if !rest.starts_with('-') || !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self::from_year_month(year.parse().ok()?, 1))
    }

    fn layout(self) -> &'static Layout {
        match self {
            SchemaVersion::MemberDemographics => &MEMBER_DEMOGRAPHICS,
            SchemaVersion::RentalAccess => &RENTAL_ACCESS,
        }
    }
}

#[derive(Debug, Error)]
pub enum TripError {
    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },
    #[error("invalid {column} {value:?}: {reason}")]
    Malformed {
        column: &'static str,
        value: String,
        reason: String,
    },
    /// Station ids feed integer-keyed lookups downstream, so anything that is
    /// not an integer is rejected outright.
    #[error("{column} {value:?} is not an integer station id")]
    SchemaViolation { column: &'static str, value: String },
}

fn malformed(column: &'static str, value: &str, reason: impl ToString) -> TripError {
    TripError::Malformed {
        column,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn column(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn optional(record: &StringRecord, idx: Option<usize>) -> &str {
    idx.map_or("", |i| column(record, i))
}

fn parse_time(calendar: &Calendar, column: &'static str, raw: &str) -> Result<DateTime<Utc>, TripError> {
    let naive =
        NaiveDateTime::parse_from_str(raw, TIME_FORMAT).map_err(|e| malformed(column, raw, e))?;
    Ok(calendar.localize(naive))
}

fn parse_station_id(column: &'static str, raw: &str) -> Result<Option<String>, TripError> {
    match raw {
        "" | "NULL" => Ok(None),
        id if id == RENUMBERED_STATION.0 => Ok(Some(RENUMBERED_STATION.1.to_string())),
        id => {
            id.parse::<i64>()
                .map_err(|_| TripError::SchemaViolation {
                    column,
                    value: id.to_string(),
                })?;
            Ok(Some(id.to_string()))
        }
    }
}

fn parse_coordinate(column: &'static str, raw: &str) -> Result<f64, TripError> {
    raw.parse::<f64>().map_err(|e| malformed(column, raw, e))
}

fn parse_yes_no(column: &'static str, raw: &str) -> Result<bool, TripError> {
    match raw {
        "Yes" => Ok(true),
        "No" | "" => Ok(false),
        other => Err(malformed(column, other, "expected Yes or No")),
    }
}

fn parse_birth_year(raw: &str) -> Result<Option<i32>, TripError> {
    const COLUMN: &str = "member_birth_year";
    if raw.is_empty() || raw == "NULL" {
        return Ok(None);
    }
    let year = raw.parse::<i32>().map_err(|e| malformed(COLUMN, raw, e))?;
    if !(1850..=2030).contains(&year) {
        return Err(malformed(COLUMN, raw, "out of range"));
    }
    Ok(Some(year))
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Reads the id, name, latitude and longitude columns starting at `first`.
fn parse_endpoint(
    record: &StringRecord,
    first: usize,
    [id_col, lat_col, lon_col]: [&'static str; 3],
) -> Result<Endpoint, TripError> {
    Ok(Endpoint {
        station_id: parse_station_id(id_col, column(record, first))?,
        name: column(record, first + 1).to_string(),
        latitude: parse_coordinate(lat_col, column(record, first + 2))?,
        longitude: parse_coordinate(lon_col, column(record, first + 3))?,
    })
}

/// Decodes one data row.
pub fn parse_trip(
    record: &StringRecord,
    version: SchemaVersion,
    calendar: &Calendar,
) -> Result<Trip, TripError> {
    if record.len() < SHARED_COLUMNS {
        return Err(TripError::TooFewColumns {
            expected: SHARED_COLUMNS,
            found: record.len(),
        });
    }
    let raw_duration = column(record, 0);
    if raw_duration.is_empty() {
        return Err(malformed("duration_sec", raw_duration, "missing"));
    }
    let seconds = raw_duration
        .parse::<i64>()
        .map_err(|e| malformed("duration_sec", raw_duration, e))?;

    let start_time = parse_time(calendar, "start_time", column(record, 1))?;
    let end_time = parse_time(calendar, "end_time", column(record, 2))?;

    let start = parse_endpoint(
        record,
        3,
        [
            "start_station_id",
            "start_station_latitude",
            "start_station_longitude",
        ],
    )?;
    let end = parse_endpoint(
        record,
        7,
        [
            "end_station_id",
            "end_station_latitude",
            "end_station_longitude",
        ],
    )?;

    let bike_id = column(record, 11)
        .parse::<i64>()
        .map_err(|e| malformed("bike_id", column(record, 11), e))?;
    let user_type = column(record, 12)
        .parse::<UserType>()
        .map_err(|e| malformed("user_type", column(record, 12), e))?;

    let layout = version.layout();
    let member_birth_year = parse_birth_year(optional(record, layout.member_birth_year))?;
    let member_gender = non_empty(optional(record, layout.member_gender));
    let bike_share_for_all_trip = parse_yes_no(
        "bike_share_for_all_trip",
        optional(record, Some(layout.bike_share_for_all_trip)),
    )?;
    let rental_access_method = non_empty(optional(record, layout.rental_access_method));

    Ok(Trip {
        duration: TimeDelta::seconds(seconds),
        start_time,
        end_time,
        start,
        end,
        bike_id,
        user_type,
        member_birth_year,
        member_gender,
        bike_share_for_all_trip,
        rental_access_method,
    })
}

#[cfg(test)]
pub(crate) fn record_from_line(line: &str) -> StringRecord {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = StringRecord::new();
    rdr.read_record(&mut record).unwrap();
    record
}
