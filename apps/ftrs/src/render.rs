//! Single-line terminal progress display.

use std::io::Write;
use std::sync::Arc;

use ftrs_transfer::{ProgressCallback, ProgressSnapshot, format_with_commas, mib_per_sec};

/// Callback that redraws the progress line on stderr.
pub fn progress_printer() -> ProgressCallback {
    Arc::new(|snapshot: &ProgressSnapshot| {
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[K{}", format_progress(snapshot));
        if snapshot.finished {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    })
}

pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    format!(
        "progress: {:.2}% ({}/{} bytes), speed: {:.2} MB/s",
        snapshot.percent,
        format_with_commas(snapshot.transferred),
        format_with_commas(snapshot.total),
        mib_per_sec(snapshot.bytes_per_sec)
    )
}
