//! Station snapshots and their one-line log encoding.
//!
//! A line looks like
//!
//! ```text
//! 2018-08-01T19:00:00Z,81,3,0,1,31,0,t,t,t
//! ```
//!
//! i.e. timestamp, station id, the five availability counters and the
//! installed/renting/returning flags.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One station's availability as of `last_reported`.
///
/// Only ids accepted by [`is_encodable_station_id`] can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station_id: String,
    pub last_reported: DateTime<Utc>,

    pub num_bikes_available: u16,
    pub num_ebikes_available: u16,
    pub num_bikes_disabled: u16,
    pub num_docks_available: u16,
    pub num_docks_disabled: u16,

    pub is_installed: bool,
    pub is_renting: bool,
    pub is_returning: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing delimiter after {field}")]
    MissingDelimiter { field: &'static str },
    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },
    #[error("empty station_id")]
    EmptyStationId,
    #[error("invalid {field} {value:?}: expected a small non-negative integer")]
    Counter { field: &'static str, value: String },
    #[error("truncated flags: {field} is missing")]
    TruncatedFlags { field: &'static str },
    #[error("invalid {field} flag {value:?}: expected 't' or 'f'")]
    Flag { field: &'static str, value: String },
    #[error("unexpected trailing data {0:?}")]
    Trailing(String),
}

const COUNTER_FIELDS: [&str; 5] = [
    "num_bikes_available",
    "num_ebikes_available",
    "num_bikes_disabled",
    "num_docks_available",
    "num_docks_disabled",
];

const FLAG_FIELDS: [&str; 3] = ["is_installed", "is_renting", "is_returning"];

impl StationSnapshot {
    fn counters(&self) -> [u16; 5] {
        [
            self.num_bikes_available,
            self.num_ebikes_available,
            self.num_bikes_disabled,
            self.num_docks_available,
            self.num_docks_disabled,
        ]
    }

    fn flags(&self) -> [bool; 3] {
        [self.is_installed, self.is_renting, self.is_returning]
    }
}

/// Whether `id` survives an encode/decode round trip: non-empty and free of
/// the field and line separators.
pub fn is_encodable_station_id(id: &str) -> bool {
    !id.is_empty() && !id.contains([',', '\n', '\r'])
}

/// Encodes a snapshot as a newline-terminated log line.
pub fn encode(snapshot: &StationSnapshot) -> String {
    let mut line = String::with_capacity(48);
    encode_into(&mut line, snapshot);
    line
}

/// Appends the encoded line for `snapshot` to `buf`.
pub fn encode_into(buf: &mut String, snapshot: &StationSnapshot) {
    buf.push_str(
        &snapshot
            .last_reported
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );
    buf.push(',');
    buf.push_str(&snapshot.station_id);
    for counter in snapshot.counters() {
        buf.push(',');
        buf.push_str(&counter.to_string());
    }
    for flag in snapshot.flags() {
        buf.push(',');
        buf.push(if flag { 't' } else { 'f' });
    }
    buf.push('\n');
}

fn next_field<'a>(line: &'a str, field: &'static str) -> Result<(&'a str, &'a str), RecordError> {
    line.split_once(',')
        .ok_or(RecordError::MissingDelimiter { field })
}

/// Decodes one log line. A single trailing `\n` or `\r\n` is accepted.
pub fn decode(line: &str) -> Result<StationSnapshot, RecordError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let (raw_time, rest) = next_field(line, "timestamp")?;
    let last_reported = DateTime::parse_from_rfc3339(raw_time)
        .map_err(|e| RecordError::Timestamp {
            value: raw_time.to_string(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    let (station_id, mut rest) = next_field(rest, "station_id")?;
    if station_id.is_empty() {
        return Err(RecordError::EmptyStationId);
    }

    let mut counters = [0u16; 5];
    for (slot, field) in counters.iter_mut().zip(COUNTER_FIELDS) {
        let (raw, tail) = next_field(rest, field)?;
        *slot = raw.parse().map_err(|_| RecordError::Counter {
            field,
            value: raw.to_string(),
        })?;
        rest = tail;
    }

    let mut flags = [false; 3];
    let mut parts = rest.split(',');
    for (slot, field) in flags.iter_mut().zip(FLAG_FIELDS) {
        *slot = match parts.next() {
            Some("t") => true,
            Some("f") => false,
            None | Some("") => return Err(RecordError::TruncatedFlags { field }),
            Some(other) => {
                return Err(RecordError::Flag {
                    field,
                    value: other.to_string(),
                });
            }
        };
    }
    if let Some(extra) = parts.next() {
        return Err(RecordError::Trailing(extra.to_string()));
    }

    let [
        num_bikes_available,
        num_ebikes_available,
        num_bikes_disabled,
        num_docks_available,
        num_docks_disabled,
    ] = counters;
    let [is_installed, is_renting, is_returning] = flags;

    Ok(StationSnapshot {
        station_id: station_id.to_string(),
        last_reported,
        num_bikes_available,
        num_ebikes_available,
        num_bikes_disabled,
        num_docks_available,
        num_docks_disabled,
        is_installed,
        is_renting,
        is_returning,
    })
}
