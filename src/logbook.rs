use crate::errors::{run_blocking, AppResult};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serialises access to files shared by every session of a subject: the
/// subject definition copy and the subject log.
pub type SharedFileLock = Arc<Mutex<()>>;

pub fn shared_file_lock() -> SharedFileLock {
    Arc::new(Mutex::new(()))
}

/// Append-only per-subject log. Lines are never rewritten.
#[derive(Clone)]
pub struct Logbook {
    lock: SharedFileLock,
}

impl Logbook {
    pub fn new(lock: SharedFileLock) -> Self {
        Self { lock }
    }

    pub async fn append(&self, path: &Path, text: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let path = path.to_path_buf();
        let text = text.to_string();
        run_blocking(move || {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{}", text)?;
            Ok(())
        })
        .await
    }

    pub async fn session_marker(&self, path: &Path, at: DateTime<Local>) -> AppResult<()> {
        self.append(path, &session_marker_line(at)).await
    }

    pub async fn success(&self, path: &Path, reynolds: &str, attempt: u32) -> AppResult<()> {
        self.append(path, &success_line(reynolds, attempt)).await
    }

    pub async fn failure(&self, path: &Path, reynolds: &str, tries_max: u32) -> AppResult<()> {
        self.append(path, &failure_line(reynolds, tries_max)).await
    }

    pub async fn missing_input(&self, path: &Path, profile: &str) -> AppResult<()> {
        self.append(path, &missing_input_line(profile)).await
    }

    pub async fn total_time(&self, path: &Path, seconds: u64) -> AppResult<()> {
        self.append(path, &format!("Total time: {} seconds", seconds)).await
    }
}

pub fn session_marker_line(at: DateTime<Local>) -> String {
    at.format("\n----- %Y-%m-%d %H:%M -----").to_string()
}

pub fn success_line(reynolds: &str, attempt: u32) -> String {
    format!("Reynolds = {}, success on try {}", reynolds, attempt)
}

pub fn failure_line(reynolds: &str, tries_max: u32) -> String {
    format!("Reynolds = {}, failed {} times", reynolds, tries_max)
}

pub fn missing_input_line(profile: &str) -> String {
    format!("No data for profile: {}", profile)
}
