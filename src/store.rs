//! Local append-only CSV storage.
//!
//! Layout: `<root>/<directory_key>/<file_key>.csv`. A file receives the header
//! row exactly once, when it is created; every later write is a single appended
//! data row. Single-writer: running two appenders against one file is
//! unsupported.

use crate::error::StorageFault;
use crate::reading::{Reading, HEADER};
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory/file key format for daily periods, e.g. `17-10-26`.
pub const PERIOD_KEY_FORMAT: &str = "%d-%m-%y";

/// Identifies the log file a reading belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    directory_key: String,
    file_key: String,
}

impl Period {
    /// Period with explicit keys.
    pub fn new(directory_key: impl Into<String>, file_key: impl Into<String>) -> Self {
        Self {
            directory_key: directory_key.into(),
            file_key: file_key.into(),
        }
    }

    /// One directory and one file per calendar day, both keyed `%d-%m-%y`.
    pub fn daily(date: NaiveDate) -> Self {
        let key = date.format(PERIOD_KEY_FORMAT).to_string();
        Self::new(key.clone(), key)
    }

    /// Name of the directory holding the file.
    pub fn directory_key(&self) -> &str {
        &self.directory_key
    }

    /// File name without the `.csv` extension.
    pub fn file_key(&self) -> &str {
        &self.file_key
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}.csv", self.directory_key, self.file_key)
    }
}

/// Writer for the per-period CSV files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `period`.
    pub fn directory_for(&self, period: &Period) -> PathBuf {
        self.root.join(&period.directory_key)
    }

    /// Log file of `period`.
    pub fn file_path(&self, period: &Period) -> PathBuf {
        self.directory_for(period)
            .join(format!("{}.csv", period.file_key))
    }

    /// Create the period's directory if it does not exist yet.
    pub fn ensure_directory(&self, period: &Period) -> Result<PathBuf, StorageFault> {
        let dir = self.directory_for(period);
        std::fs::create_dir_all(&dir).map_err(|source| StorageFault::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Append one reading to the period's file, writing the header first if
    /// this call creates the file. Returns the file path.
    pub fn append(&self, period: &Period, reading: &Reading) -> Result<PathBuf, StorageFault> {
        self.ensure_directory(period)?;
        let path = self.file_path(period);
        let record = reading.to_record();

        let (file, created) = open_for_append(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if created {
            tracing::info!(path = %path.display(), "Created new log file");
            writer
                .write_record(HEADER)
                .map_err(|source| StorageFault::Write {
                    path: path.clone(),
                    source,
                })?;
        }
        writer
            .write_record(&record)
            .map_err(|source| StorageFault::Write {
                path: path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| StorageFault::Flush {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// Open `path` for appending. The boolean is true when this call created it.
///
/// `create_new` makes "does the file exist" and "create it" one step, so the
/// header decision cannot race with a file appearing in between.
fn open_for_append(path: &Path) -> Result<(File, bool), StorageFault> {
    let open_err = |source| StorageFault::Open {
        path: path.to_path_buf(),
        source,
    };
    match OpenOptions::new().append(true).create_new(true).open(path) {
        Ok(file) => Ok((file, true)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => OpenOptions::new()
            .append(true)
            .open(path)
            .map(|file| (file, false))
            .map_err(open_err),
        Err(e) => Err(open_err(e)),
    }
}
