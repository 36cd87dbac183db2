//! Crontab-backed schedule registry
//!
//! Each schedule is one crontab line that POSTs back to this service. Lines
//! not carrying our marker are passed through untouched on every rewrite.

use super::cron::{ScheduleEntry, ScheduleRequest};
use super::{ScheduleError, ScheduleResult};
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Where crontab text lives
pub trait CronTable: Send + Sync {
    /// Current contents; an absent table reads as empty
    fn read(&self) -> ScheduleResult<String>;

    /// Replace the contents
    fn write(&self, contents: &str) -> ScheduleResult<()>;

    fn describe(&self) -> String;
}

/// The invoking user's crontab, through the `crontab` binary
pub struct UserCrontab {
    binary: String,
}

impl UserCrontab {
    pub fn new() -> Self {
        Self {
            binary: "crontab".to_string(),
        }
    }
}

impl Default for UserCrontab {
    fn default() -> Self {
        Self::new()
    }
}

impl CronTable for UserCrontab {
    fn read(&self) -> ScheduleResult<String> {
        let output = Command::new(&self.binary)
            .arg("-l")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ScheduleError::Crontab(format!("failed to run {} -l: {e}", self.binary)))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            return Ok(String::new());
        }
        Err(ScheduleError::Crontab(format!(
            "{} -l failed: {}",
            self.binary,
            stderr.trim()
        )))
    }

    fn write(&self, contents: &str) -> ScheduleResult<()> {
        let mut child = Command::new(&self.binary)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScheduleError::Crontab(format!("failed to run {} -: {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScheduleError::Crontab("failed to open crontab stdin".to_string()))?;
        stdin.write_all(contents.as_bytes())?;
        drop(stdin);

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ScheduleError::Crontab(format!(
                "{} - failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "user crontab".to_string()
    }
}

/// A plain file in crontab format, for hosts managed by other means
pub struct FileCrontab {
    path: PathBuf,
}

impl FileCrontab {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CronTable for FileCrontab {
    fn read(&self) -> ScheduleResult<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> ScheduleResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("crontab file {}", self.path.display())
    }
}

pub struct ScheduleStore {
    table: Box<dyn CronTable>,
    base_url: String,
    // Serializes read-modify-write cycles on the table
    lock: Mutex<()>,
}

impl ScheduleStore {
    /// `base_url` is where scheduled jobs reach this service
    pub fn new(table: Box<dyn CronTable>, base_url: impl Into<String>) -> Self {
        let store = Self {
            table,
            base_url: base_url.into(),
            lock: Mutex::new(()),
        };
        tracing::info!(
            "Schedules stored in {} (triggering {})",
            store.table.describe(),
            store.base_url
        );
        store
    }

    pub fn list(&self) -> ScheduleResult<Vec<ScheduleEntry>> {
        let _guard = self.lock.lock();
        Ok(parse_entries(&self.table.read()?))
    }

    /// Register a recurring capture. A second entry with the same key is a `Duplicate`.
    pub fn add(&self, request: &ScheduleRequest) -> ScheduleResult<ScheduleEntry> {
        let entry = ScheduleEntry::from_request(request)?;

        let _guard = self.lock.lock();
        let contents = self.table.read()?;
        if parse_entries(&contents).iter().any(|e| e.id == entry.id) {
            return Err(ScheduleError::Duplicate(entry.id));
        }

        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        lines.push(entry.job_line(&self.base_url));
        self.table.write(&join_lines(&lines))?;

        tracing::info!("Schedule added: {} ({})", entry.id, entry.cron);
        Ok(entry)
    }

    pub fn remove(&self, id: &str) -> ScheduleResult<ScheduleEntry> {
        let _guard = self.lock.lock();
        let contents = self.table.read()?;

        let mut removed = None;
        let mut kept = Vec::new();
        for line in contents.lines() {
            match ScheduleEntry::parse_job_line(line) {
                Some(entry) if entry.id == id => removed = Some(entry),
                _ => kept.push(line.to_string()),
            }
        }

        let removed = removed.ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        self.table.write(&join_lines(&kept))?;
        tracing::info!("Schedule removed: {}", id);
        Ok(removed)
    }
}

fn parse_entries(contents: &str) -> Vec<ScheduleEntry> {
    contents.lines().filter_map(ScheduleEntry::parse_job_line).collect()
}

/// crontab requires a trailing newline
fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
