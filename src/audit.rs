//! Append-only audit trail shared by every step in a run.
//!
//! One timestamped line per event, `[MM/dd/yy HH:mm:ss] - <message>`, the
//! format the device-management agent's log collector already ingests.
//! Logging is strictly best-effort: a full disk or unwritable directory
//! degrades the log to standard output and never fails the run.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

enum Sink {
    File(File),
    /// Fallback after open or write failure; also used for dry runs.
    Stdout,
}

/// Audit log handle. Constructed once per run and passed by reference into
/// the engine; there is no process-wide singleton.
pub struct AuditLog {
    sink: Mutex<Sink>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open (or create) the log file at `path`, creating parent directories
    /// as needed. Failure to open is reported on stdout and the log runs in
    /// fallback mode instead of erroring.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }

        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                sink: Mutex::new(Sink::File(file)),
                path: Some(path.to_path_buf()),
            },
            Err(err) => {
                println!(
                    "audit log unavailable ({}): falling back to stdout",
                    err
                );
                Self {
                    sink: Mutex::new(Sink::Stdout),
                    path: Some(path.to_path_buf()),
                }
            }
        }
    }

    /// Log straight to stdout. Used by dry runs and tests.
    pub fn stdout() -> Self {
        Self {
            sink: Mutex::new(Sink::Stdout),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one timestamped line. Never fails: a write error demotes the
    /// sink to stdout and the entry is emitted there.
    pub fn record(&self, message: &str) {
        let line = format!(
            "[{}] - {}",
            Local::now().format("%m/%d/%y %H:%M:%S"),
            message
        );

        let mut sink = self.sink.lock().unwrap();
        if let Sink::File(file) = &mut *sink {
            if writeln!(file, "{}", line).is_ok() {
                return;
            }
            println!("audit log write failed: falling back to stdout");
            *sink = Sink::Stdout;
        }
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_directory_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("remedyctl.log");

        let log = AuditLog::open(&path);
        log.record("first entry");
        log.record("second entry");

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("- first entry"));
        assert!(lines[1].ends_with("- second entry"));
        // [MM/dd/yy HH:mm:ss] prefix
        assert!(lines[0].starts_with('['));
        assert_eq!(lines[0].as_bytes()[18], b']');
        assert!(lines[0].contains("] - "));
    }

    #[test]
    fn unwritable_path_degrades_without_error() {
        // A path whose parent is a regular file cannot be created.
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let log = AuditLog::open(&blocker.join("remedyctl.log"));
        // Must not panic or error; entries go to stdout.
        log.record("still alive");
    }

    #[test]
    fn stdout_sink_records_without_file() {
        let log = AuditLog::stdout();
        assert!(log.path().is_none());
        log.record("hello");
    }
}
