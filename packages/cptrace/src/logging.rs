//! Run history log
//!
//! Appends one JSON object per command invocation to a file in JSON Lines
//! format, so runs can be compared later.

use crate::session::RunReport;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single log entry representing one invocation
#[derive(Debug, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// Unix timestamp of the invocation
    pub timestamp: u64,
    /// ISO 8601 formatted date string
    pub datetime: String,
    /// Subcommand that produced the entry (run, analyze, test)
    pub mode: String,
    /// Program or files involved
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Last line of the error report, if the program failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace_collected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_skipped: Option<String>,
    pub loop_sites: usize,
    pub condition_sites: usize,
    pub calls: usize,
    /// Files that failed to parse, or cases that failed
    pub failures: usize,
}

fn now() -> (u64, String) {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (timestamp, format_datetime(timestamp))
}

impl RunLogEntry {
    /// Entry for one traced run of `path`
    pub fn from_report(path: &str, report: &RunReport) -> Self {
        let (timestamp, datetime) = now();
        let trace = report.trace.as_ref();
        Self {
            timestamp,
            datetime,
            mode: "run".to_string(),
            paths: vec![path.to_string()],
            backend: Some(report.backend.to_string()),
            elapsed_ms: Some(report.elapsed_ms.min(u64::MAX as u128) as u64),
            error: report.outcome.error.clone(),
            trace_collected: trace.is_some(),
            trace_skipped: report.trace_skipped.clone(),
            loop_sites: trace.map_or(0, |t| t.loops.len()),
            condition_sites: trace.map_or(0, |t| t.conditions.len()),
            calls: trace.map_or(0, |t| t.recursion.len()),
            failures: 0,
        }
    }

    /// Entry for one static analysis pass
    pub fn from_analysis(paths: &[String], failures: usize) -> Self {
        let (timestamp, datetime) = now();
        Self {
            timestamp,
            datetime,
            mode: "analyze".to_string(),
            paths: paths.to_vec(),
            backend: None,
            elapsed_ms: None,
            error: None,
            trace_collected: false,
            trace_skipped: None,
            loop_sites: 0,
            condition_sites: 0,
            calls: 0,
            failures,
        }
    }

    /// Entry for one `test` invocation of `path`
    pub fn from_tests(path: &str, backend: &str, failures: usize) -> Self {
        Self {
            mode: "test".to_string(),
            backend: Some(backend.to_string()),
            ..Self::from_analysis(&[path.to_string()], failures)
        }
    }
}

/// Logger that appends run entries to a file
pub struct RunLogger {
    writer: Option<BufWriter<File>>,
    log_path: String,
}

impl RunLogger {
    /// Open `log_path` for appending, creating it and its parent directories
    pub fn new(log_path: &str) -> std::io::Result<Self> {
        let path = Path::new(log_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            log_path: log_path.to_string(),
        })
    }

    pub fn log(&mut self, entry: &RunLogEntry) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            let json = serde_json::to_string(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }
}

/// Format a unix timestamp as ISO 8601 datetime string
fn format_datetime(timestamp: u64) -> String {
    let datetime = chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp as i64, 0).unwrap_or_default();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::session::Session;
    use tempfile::TempDir;

    #[test]
    fn test_format_datetime() {
        assert_eq!(format_datetime(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_datetime(1_700_000_000), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_entry_from_report() {
        let report = Session::new(TraceConfig::default()).run("for i in range(2):\n    if i:\n        print(i)\n", "");
        let entry = RunLogEntry::from_report("a.py", &report);
        assert_eq!(entry.mode, "run");
        assert_eq!(entry.backend.as_deref(), Some("python"));
        assert!(entry.trace_collected);
        assert_eq!(entry.loop_sites, 1);
        assert_eq!(entry.condition_sites, 1);
        assert_eq!(entry.calls, 0);

        let entry = RunLogEntry::from_tests("a.py", &report.backend, 2);
        assert_eq!(entry.mode, "test");
        assert_eq!(entry.paths, vec!["a.py"]);
        assert_eq!(entry.failures, 2);
    }

    #[test]
    fn test_logger_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs").join("runs.jsonl");
        let log_path_str = log_path.to_string_lossy().to_string();

        let mut logger = RunLogger::new(&log_path_str).unwrap();
        logger
            .log(&RunLogEntry::from_analysis(&["a.py".to_string()], 0))
            .unwrap();
        logger
            .log(&RunLogEntry::from_analysis(&["b.py".to_string()], 1))
            .unwrap();
        assert_eq!(logger.log_path(), log_path_str);

        let content = std::fs::read_to_string(&log_path).unwrap();
        let entries: Vec<RunLogEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].paths, vec!["b.py"]);
        assert_eq!(entries[1].failures, 1);
        assert!(!content.contains("backend"));
    }
}
