//! The capacity monitor daemon.
//!
//! [`Monitor::recover`] takes the directory's writer lock and rebuilds the
//! per-station dedup index from the existing day files. [`Monitor::run`] then
//! polls the feed on a fixed tick, appending every snapshot whose
//! `last_reported` moved forward and rotating to a new file when the reported
//! date crosses midnight.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::calendar::Calendar;
use crate::daylog::{self, DayLog};
use crate::fetch::FeedClient;
use crate::loader::{self, LoadError};
use crate::lock::{LockError, LockGuard};
use crate::record::{self, StationSnapshot};

/// Log a status line every this many written rows.
pub const STATUS_LOG_EVERY: u64 = 5000;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("could not open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write to '{}' failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sync of '{}' failed: {source}", path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not replay existing log: {0}")]
    Replay(#[source] LoadError),
    #[error("feed fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("feed fetch did not finish within {0:?}")]
    FetchTimeout(Duration),
}

impl MonitorError {
    /// Feed problems cost one tick; anything touching the lock or the log
    /// stops the daemon.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MonitorError::Fetch(_) | MonitorError::FetchTimeout(_))
    }
}

/// What one poll did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub written: usize,
    pub stale: usize,
    /// Snapshots whose station id cannot be written to the log.
    pub rejected: usize,
    pub rotations: usize,
    pub full_stations: usize,
    pub empty_stations: usize,
}

pub struct Monitor<F> {
    feed: F,
    dir: PathBuf,
    calendar: Calendar,
    fetch_timeout: Duration,
    last_reported: HashMap<String, DateTime<Utc>>,
    buf: String,
    rows_written: u64,
    // Field order matters: the log is synced and closed before the lock is
    // released.
    log: DayLog,
    lock: LockGuard,
}

fn replay_into(
    path: &Path,
    index: &mut HashMap<String, DateTime<Utc>>,
) -> Result<usize, MonitorError> {
    let statuses = loader::load_capacity_file(path).map_err(MonitorError::Replay)?;
    let count = statuses.len();
    for status in statuses {
        let entry = index.entry(status.station_id).or_insert(status.last_reported);
        if status.last_reported > *entry {
            *entry = status.last_reported;
        }
    }
    Ok(count)
}

impl<F: FeedClient> Monitor<F> {
    /// Takes the writer lock on `dir`, opens the day file for `now` and
    /// replays it (and the previous day's file, if any) into the dedup index.
    #[tracing::instrument(skip_all, fields(dir = %dir.display(), %now))]
    pub fn recover(
        dir: &Path,
        feed: F,
        calendar: Calendar,
        fetch_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, MonitorError> {
        std::fs::create_dir_all(dir).map_err(|source| MonitorError::Open {
            path: dir.to_path_buf(),
            source,
        })?;
        let lock = LockGuard::acquire(dir)?;

        let today = calendar.date_of(now);
        let mut last_reported = HashMap::new();
        let mut replayed = 0;
        if let Some(yesterday) = today.pred_opt() {
            let path = daylog::file_path(dir, yesterday);
            if path.exists() {
                replayed += replay_into(&path, &mut last_reported)?;
            }
        }

        let log = DayLog::open(dir, today).map_err(|source| MonitorError::Open {
            path: daylog::file_path(dir, today),
            source,
        })?;
        replayed += replay_into(&log.path(), &mut last_reported)?;

        info!(
            date = %today,
            replayed,
            stations = last_reported.len(),
            "Recovered capacity log"
        );

        Ok(Self {
            feed,
            dir: dir.to_path_buf(),
            calendar,
            fetch_timeout,
            last_reported,
            buf: String::new(),
            rows_written: 0,
            log,
            lock,
        })
    }

    pub fn active_date(&self) -> NaiveDate {
        self.log.date()
    }

    pub fn active_path(&self) -> PathBuf {
        self.log.path()
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    pub fn last_reported(&self, station_id: &str) -> Option<DateTime<Utc>> {
        self.last_reported.get(station_id).copied()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn flush(&mut self) -> Result<(), MonitorError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.log
            .append(self.buf.as_bytes())
            .map_err(|source| MonitorError::Write {
                path: self.log.path(),
                source,
            })?;
        self.log.sync().map_err(|source| MonitorError::Sync {
            path: self.log.path(),
            source,
        })?;
        self.buf.clear();
        Ok(())
    }

    fn rotate(&mut self, date: NaiveDate) -> Result<(), MonitorError> {
        self.flush()?;
        self.log
            .switch_to(date)
            .map_err(|source| MonitorError::Open {
                path: daylog::file_path(&self.dir, date),
                source,
            })
    }

    /// Deduplicates one batch of snapshots and appends the new ones.
    ///
    /// The batch is processed in `last_reported` order, so a batch spanning
    /// midnight rotates exactly once and never writes a day's rows into the
    /// next day's file.
    pub fn ingest(
        &mut self,
        mut snapshots: Vec<StationSnapshot>,
    ) -> Result<TickSummary, MonitorError> {
        snapshots.sort_by(|a, b| a.last_reported.cmp(&b.last_reported));
        let mut summary = TickSummary {
            fetched: snapshots.len(),
            ..Default::default()
        };

        for snapshot in &snapshots {
            if !record::is_encodable_station_id(&snapshot.station_id) {
                warn!(station_id = ?snapshot.station_id, "Skipping snapshot with unloggable station id");
                summary.rejected += 1;
                continue;
            }
            if snapshot.num_docks_available == 0 {
                summary.full_stations += 1;
            }
            if snapshot.num_bikes_available == 0 {
                summary.empty_stations += 1;
            }
            let is_new = self
                .last_reported
                .get(&snapshot.station_id)
                .is_none_or(|last| snapshot.last_reported > *last);
            if !is_new {
                summary.stale += 1;
                continue;
            }

            let date = self.calendar.date_of(snapshot.last_reported);
            if date > self.log.date() {
                self.rotate(date)?;
                summary.rotations += 1;
            }

            record::encode_into(&mut self.buf, snapshot);
            self.last_reported
                .insert(snapshot.station_id.clone(), snapshot.last_reported);
            summary.written += 1;
        }
        self.flush()?;

        let before = self.rows_written / STATUS_LOG_EVERY;
        self.rows_written += summary.written as u64;
        if self.rows_written / STATUS_LOG_EVERY > before {
            info!(
                rows = self.rows_written,
                full_stations = summary.full_stations,
                empty_stations = summary.empty_stations,
                "Processing"
            );
        }
        Ok(summary)
    }

    /// Fetches once, bounded by the fetch timeout, and ingests the result.
    pub async fn poll_once(&mut self) -> Result<TickSummary, MonitorError> {
        let snapshots = match tokio::time::timeout(self.fetch_timeout, self.feed.fetch()).await {
            Err(_) => return Err(MonitorError::FetchTimeout(self.fetch_timeout)),
            Ok(Err(e)) => return Err(MonitorError::Fetch(e)),
            Ok(Ok(snapshots)) => snapshots,
        };
        self.ingest(snapshots)
    }

    /// Polls every `interval` until `shutdown` resolves or a fatal error
    /// occurs. A slow poll delays the next tick rather than overlapping it.
    pub async fn run(
        mut self,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), MonitorError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = interval.as_secs(), path = %self.log.path().display(), "Monitoring");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(rows = self.rows_written, "Shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(summary) => debug!(
                    fetched = summary.fetched,
                    written = summary.written,
                    stale = summary.stale,
                    "Tick complete"
                ),
                Err(e) if !e.is_fatal() => warn!(error = %e, "Skipping tick"),
                Err(e) => {
                    error!(error = %e, "Fatal error, stopping monitor");
                    return Err(e);
                }
            }
        }
    }
}
