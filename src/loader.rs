//! Parallel loading of trip and capacity directories.
//!
//! Every matching file is parsed on the blocking pool, with a semaphore
//! capping how many are open at once. The first failure closes the semaphore
//! and aborts the rest, so callers get either every row or an error that
//! names the offending file and row.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::calendar::Calendar;
use crate::parser::{SchemaVersion, TripError, parse_trip};
use crate::record::{self, RecordError, StationSnapshot};
use crate::trip::Trip;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const TRIP_FILE_SUFFIXES: &[&str] = &["-fordgobike-tripdata.csv", "-baywheels-tripdata.csv"];
pub const CAPACITY_FILE_SUFFIX: &str = "-capacity.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error accessing '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot infer trip file layout from name '{}'", .0.display())]
    FileName(PathBuf),
    #[error("{}: {source}", file.display())]
    Csv {
        file: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{}: row {row}: {source}", file.display())]
    Trip {
        file: PathBuf,
        row: u64,
        #[source]
        source: TripError,
    },
    #[error("{}: line {line}: {source}", file.display())]
    Record {
        file: PathBuf,
        line: u64,
        #[source]
        source: RecordError,
    },
    #[error("loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn io_error(path: &Path, source: io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads a trip CSV (header row first). `file` is only used for error context.
pub fn read_trips<R: Read>(
    file: &Path,
    reader: R,
    version: SchemaVersion,
    calendar: &Calendar,
) -> Result<Vec<Trip>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut record = StringRecord::new();
    let mut trips = Vec::new();

    loop {
        let more = rdr.read_record(&mut record).map_err(|source| LoadError::Csv {
            file: file.to_path_buf(),
            source,
        })?;
        if !more {
            break;
        }
        let trip = parse_trip(&record, version, calendar).map_err(|source| LoadError::Trip {
            file: file.to_path_buf(),
            row: record.position().map_or(0, |p| p.line()),
            source,
        })?;
        trips.push(trip);
    }

    Ok(trips)
}

/// Reads a capacity log, one encoded snapshot per line.
pub fn read_capacity<R: BufRead>(file: &Path, reader: R) -> Result<Vec<StationSnapshot>, LoadError> {
    let mut statuses = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| io_error(file, e))?;
        let snapshot = record::decode(&line).map_err(|source| LoadError::Record {
            file: file.to_path_buf(),
            line: idx as u64 + 1,
            source,
        })?;
        statuses.push(snapshot);
    }
    Ok(statuses)
}

/// Loads one trip file, inferring its layout from the file name.
pub fn load_trip_file(path: &Path, calendar: &Calendar) -> Result<Vec<Trip>, LoadError> {
    let version = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(SchemaVersion::from_file_name)
        .ok_or_else(|| LoadError::FileName(path.to_path_buf()))?;
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    read_trips(path, BufReader::new(file), version, calendar)
}

pub fn load_capacity_file(path: &Path) -> Result<Vec<StationSnapshot>, LoadError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    read_capacity(path, BufReader::new(file))
}

fn matching_files(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if suffixes.iter().any(|s| name.ends_with(s)) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

async fn load_dir<T, F>(
    dir: &Path,
    suffixes: &[&str],
    concurrency: usize,
    parse: F,
) -> Result<Vec<T>, LoadError>
where
    T: Send + 'static,
    F: Fn(&Path) -> Result<Vec<T>, LoadError> + Send + Sync + 'static,
{
    let paths = matching_files(dir, suffixes)?;
    info!(files = paths.len(), concurrency, "Loading directory");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let parse = Arc::new(parse);
    let mut tasks = JoinSet::new();

    for path in paths {
        let semaphore = semaphore.clone();
        let parse = parse.clone();
        tasks.spawn(async move {
            // A closed semaphore means another file already failed.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Ok(None);
            };
            let rows = tokio::task::spawn_blocking(move || {
                let rows = parse(&path)?;
                debug!(file = %path.display(), rows = rows.len(), "Parsed file");
                Ok::<_, LoadError>(rows)
            })
            .await??;
            Ok::<_, LoadError>(Some(rows))
        });
    }

    let mut merged = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(LoadError::Join(e)),
        };
        match outcome {
            Ok(Some(rows)) => merged.extend(rows),
            Ok(None) => {}
            Err(e) => {
                semaphore.close();
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    Ok(merged)
}

/// Loads every trip file in `dir`, sorted by start time.
#[tracing::instrument(skip(calendar))]
pub async fn load_trip_dir(
    dir: &Path,
    calendar: Calendar,
    concurrency: usize,
) -> Result<Vec<Trip>, LoadError> {
    let mut trips = load_dir(dir, TRIP_FILE_SUFFIXES, concurrency, move |path| {
        load_trip_file(path, &calendar)
    })
    .await?;
    trips.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.end_time.cmp(&b.end_time))
            .then(a.bike_id.cmp(&b.bike_id))
    });
    info!(trips = trips.len(), "Trips loaded");
    Ok(trips)
}

/// Loads every capacity log in `dir`. No ordering across files is implied;
/// see [`crate::analyzers::capacity::status_map`].
#[tracing::instrument]
pub async fn load_capacity_dir(
    dir: &Path,
    concurrency: usize,
) -> Result<Vec<StationSnapshot>, LoadError> {
    let statuses = load_dir(dir, &[CAPACITY_FILE_SUFFIX], concurrency, load_capacity_file).await?;
    info!(statuses = statuses.len(), "Capacity logs loaded");
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "duration_sec,start_time,end_time,start_station_id,start_station_name,start_station_latitude,start_station_longitude,end_station_id,end_station_name,end_station_latitude,end_station_longitude,bike_id,user_type,member_birth_year,member_gender,bike_share_for_all_trip\n";

    fn legacy_row(start: &str, bike: u32) -> String {
        format!("600,{start},{start},81,Berry St,37.77,-122.39,82,King St,37.78,-122.40,{bike},Subscriber,1980,Female,No\n")
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_load_trip_dir_merges_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "201808-fordgobike-tripdata.csv",
            &format!(
                "{HEADER}{}{}",
                legacy_row("2018-08-03 09:00:00", 2),
                legacy_row("2018-08-01 09:00:00", 1)
            ),
        );
        write(
            dir.path(),
            "201910-baywheels-tripdata.csv",
            "duration_sec,start_time,end_time,start_station_id,start_station_name,start_station_latitude,start_station_longitude,end_station_id,end_station_name,end_station_latitude,end_station_longitude,bike_id,user_type,bike_share_for_all_trip,rental_access_method\n\
             300,2019-10-02 10:00:00,2019-10-02 10:05:00,81,Berry St,37.77,-122.39,82,King St,37.78,-122.40,3,Customer,Yes,app\n",
        );
        write(dir.path(), "notes.csv", "not,a,trip\n");

        let trips = load_trip_dir(dir.path(), Calendar::default(), 2).await.unwrap();
        let bikes: Vec<i64> = trips.iter().map(|t| t.bike_id).collect();
        assert_eq!(bikes, vec![1, 2, 3]);
        assert_eq!(trips[2].rental_access_method.as_deref(), Some("app"));
        assert!(trips.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    }

    #[tokio::test]
    async fn test_load_trip_dir_fails_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        for month in 1..=6 {
            write(
                dir.path(),
                &format!("20180{month}-fordgobike-tripdata.csv"),
                &format!("{HEADER}{}", legacy_row("2018-01-01 09:00:00", month)),
            );
        }
        write(
            dir.path(),
            "201807-fordgobike-tripdata.csv",
            &format!(
                "{HEADER}{}{}",
                legacy_row("2018-07-01 09:00:00", 7),
                legacy_row("2018-07-01 09:00:00", 8).replace(",82,", ",x82,")
            ),
        );

        let err = load_trip_dir(dir.path(), Calendar::default(), 2)
            .await
            .unwrap_err();
        match err {
            LoadError::Trip { file, row, source } => {
                assert!(file.ends_with("201807-fordgobike-tripdata.csv"));
                assert_eq!(row, 3);
                assert!(matches!(source, TripError::SchemaViolation { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_load_trip_dir_rejects_unknown_layout_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "latest-baywheels-tripdata.csv", HEADER);
        let err = load_trip_dir(dir.path(), Calendar::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::FileName(_)));
    }

    #[tokio::test]
    async fn test_load_capacity_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "2018-08-01-capacity.csv",
            "2018-08-01T19:00:00Z,81,3,0,1,31,0,t,t,t\n2018-08-01T19:05:00Z,82,0,0,0,20,0,t,t,t\n",
        );
        write(
            dir.path(),
            "2018-08-02-capacity.csv",
            "2018-08-02T08:00:00Z,81,4,0,1,30,0,t,t,t\n",
        );
        write(dir.path(), "capacity.lock", "");

        let statuses = load_capacity_dir(dir.path(), 4).await.unwrap();
        assert_eq!(statuses.len(), 3);
    }

    #[tokio::test]
    async fn test_load_capacity_dir_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "2018-08-01-capacity.csv",
            "2018-08-01T19:00:00Z,81,3,0,1,31,0,t,t,t\n2018-08-01T19:05:00Z,82,0,0\n",
        );
        let err = load_capacity_dir(dir.path(), 4).await.unwrap_err();
        assert!(matches!(err, LoadError::Record { line: 2, .. }), "{err}");
    }
}
