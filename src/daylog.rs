//! Date-partitioned append-only capacity log.
//!
//! Each calendar day gets its own `YYYY-MM-DD-capacity.csv`. Only the active
//! day's file is ever open for writing.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::loader::CAPACITY_FILE_SUFFIX;

pub fn file_name(date: NaiveDate) -> String {
    format!("{}{}", date.format("%Y-%m-%d"), CAPACITY_FILE_SUFFIX)
}

pub fn file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(file_name(date))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().append(true).create(true).open(path)
}

/// The active day file. Dropping it syncs whatever was written.
#[derive(Debug)]
pub struct DayLog {
    dir: PathBuf,
    date: NaiveDate,
    file: File,
}

impl DayLog {
    /// Opens (creating if needed) the file for `date` in append mode.
    pub fn open(dir: &Path, date: NaiveDate) -> io::Result<Self> {
        let path = file_path(dir, date);
        let file_exists = path.exists();
        let file = open_append(&path)?;
        debug!(path = %path.display(), file_exists, "Opened day log");
        Ok(Self {
            dir: dir.to_path_buf(),
            date,
            file,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn path(&self) -> PathBuf {
        file_path(&self.dir, self.date)
    }

    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Closes the current file and makes `date` the active partition.
    ///
    /// The caller is expected to have synced; the old handle is closed only
    /// after the new file opens successfully.
    pub fn switch_to(&mut self, date: NaiveDate) -> io::Result<()> {
        let next = open_append(&file_path(&self.dir, date))?;
        let previous = std::mem::replace(&mut self.file, next);
        drop(previous);
        info!(from = %self.date, to = %date, "Rotated day log");
        self.date = date;
        Ok(())
    }
}

impl Drop for DayLog {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            warn!(path = %self.path().display(), error = %e, "Failed to sync day log on close");
        }
    }
}
