//! Append-only log of files that failed with a device I/O error.
//!
//! One line per failure: `RFC3339 timestamp - path - detail`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};

#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry stamped with the current local time.
    pub fn append(&self, file: &Path, detail: &str) -> io::Result<()> {
        let line = format_entry(&Local::now().fixed_offset(), file, detail);
        let mut out = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(&self.path)?;
        out.write_all(line.as_bytes())
    }
}

fn format_entry(at: &DateTime<FixedOffset>, file: &Path, detail: &str) -> String {
    format!(
        "{} - {} - {}\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        file.display(),
        detail
    )
}
