//! Per-job summaries and the end-of-batch report.

use crate::supervisor::JobResult;
use std::fmt;
use std::path::{Path, PathBuf};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Binary megabytes; unknown sizes (negative) count as zero.
pub fn bytes_to_megabytes(bytes: i64) -> f64 {
    bytes.max(0) as f64 / BYTES_PER_MEGABYTE
}

/// Whole megabytes with an explicit sign, e.g. `-120MB` or `+3MB`.
pub fn signed_megabytes(delta_bytes: i64) -> String {
    let mb = (delta_bytes.unsigned_abs() as f64 / BYTES_PER_MEGABYTE).round() as u64;
    if delta_bytes < 0 {
        format!("-{}MB", mb)
    } else {
        format!("+{}MB", mb)
    }
}

/// `after / before`, `None` when either size is unknown or `before` is zero.
pub fn size_ratio(before: i64, after: i64) -> Option<f64> {
    if before <= 0 || after < 0 {
        return None;
    }
    Some(after as f64 / before as f64)
}

/// One line describing a finished job: `[2/5] a.mkv: 1200MB -> 1080MB (-120MB, 90.0%)`.
pub fn summary_line(index: usize, total: usize, result: &JobResult) -> String {
    let name = display_name(&result.source);
    if !result.success {
        let code = result
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return format!("[{}/{}] {}: encoder failed (exit {})", index, total, name, code);
    }

    let ratio = size_ratio(result.source_size, result.destination_size)
        .map(|r| format!(", {:.1}%", r * 100.0))
        .unwrap_or_default();
    format!(
        "[{}/{}] {}: {:.0}MB -> {:.0}MB ({}{})",
        index,
        total,
        name,
        bytes_to_megabytes(result.source_size),
        bytes_to_megabytes(result.destination_size),
        signed_megabytes(result.destination_size.max(0) - result.source_size.max(0)),
        ratio
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// A queued file that did not produce a result.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub source: PathBuf,
    pub reason: String,
}

/// Everything a batch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Regular files found under the root.
    pub scanned: usize,
    /// Files admitted by the candidate filter.
    pub queued: usize,
    pub results: Vec<JobResult>,
    pub failures: Vec<JobFailure>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Unsuccessful encoder runs plus jobs that errored before a result.
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count() + self.failures.len()
    }

    pub fn bytes_before(&self) -> i64 {
        self.successful().map(|r| r.source_size.max(0)).sum()
    }

    pub fn bytes_after(&self) -> i64 {
        self.successful().map(|r| r.destination_size.max(0)).sum()
    }

    fn successful(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.success)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scanned {} files, queued {}, completed {}, failed {}",
            self.scanned,
            self.queued,
            self.completed(),
            self.failed()
        )?;
        if self.completed() > 0 {
            let before = self.bytes_before();
            let after = self.bytes_after();
            write!(
                f,
                "Total: {:.0}MB -> {:.0}MB ({})",
                bytes_to_megabytes(before),
                bytes_to_megabytes(after),
                signed_megabytes(after - before)
            )?;
            if let Some(ratio) = size_ratio(before, after) {
                write!(f, ", {:.1}%", ratio * 100.0)?;
            }
            writeln!(f)?;
        }
        for failure in &self.failures {
            writeln!(f, "  failed: {} ({})", failure.source.display(), failure.reason)?;
        }
        Ok(())
    }
}
