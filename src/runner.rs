use crate::engine::EngineHost;
use crate::errors::{run_blocking, AppResult};
use crate::logbook::{shared_file_lock, Logbook, SharedFileLock};
use crate::models::{BatchSettings, PolarTask};
use crate::scheduler::{Executor, ExecutorFuture, Scheduler};
use crate::session::SessionRunner;
use chrono::Local;
use std::sync::Arc;
use std::time::Instant;

/// Computes every (profile, Reynolds) polar of a batch. Profiles are handled
/// one after another; the Reynolds values of a profile run concurrently.
pub struct BatchRunner {
    settings: BatchSettings,
    host: Arc<dyn EngineHost>,
    scheduler: Scheduler,
    file_lock: SharedFileLock,
    logbook: Logbook,
}

impl BatchRunner {
    /// `settings` is expected to have gone through `policy::validate_settings`.
    pub fn new(settings: BatchSettings, host: Arc<dyn EngineHost>) -> Self {
        let scheduler = Scheduler::new(
            settings.max_running,
            settings.polling.scheduler_poll_interval(),
        );
        let file_lock = shared_file_lock();
        Self {
            logbook: Logbook::new(file_lock.clone()),
            settings,
            host,
            scheduler,
            file_lock,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub async fn run(&self) -> AppResult<()> {
        let root = self.settings.root_dir.clone();
        run_blocking(move || Ok(std::fs::create_dir_all(root)?)).await?;
        for profile in &self.settings.profiles {
            if self.scheduler.is_cancelled() {
                tracing::warn!(subject = %profile, "batch cancelled before subject started");
                break;
            }
            self.run_subject(profile).await?;
        }
        Ok(())
    }

    async fn run_subject(&self, profile: &str) -> AppResult<()> {
        let subject_dir = self.settings.subject_dir(profile);
        run_blocking(move || Ok(std::fs::create_dir_all(subject_dir)?)).await?;
        let log_path = self.settings.log_path(profile);
        tracing::info!(subject = %profile, reynolds = self.settings.reynolds.len(), "starting subject");

        let started = Instant::now();
        self.logbook.session_marker(&log_path, Local::now()).await?;

        self.scheduler
            .run_all(self.settings.tasks_for(profile), self.session_executor())
            .await;

        let seconds = started.elapsed().as_secs();
        tracing::info!(subject = %profile, seconds, "subject finished");
        self.logbook.total_time(&log_path, seconds).await
    }

    fn session_executor(&self) -> Executor {
        let host = self.host.clone();
        let file_lock = self.file_lock.clone();
        let logbook = self.logbook.clone();
        let polling = self.settings.polling.clone();
        Arc::new(move |task: PolarTask| {
            let session = SessionRunner::new(
                task,
                host.clone(),
                file_lock.clone(),
                logbook.clone(),
                &polling,
            );
            let future: ExecutorFuture = Box::pin(async move {
                let outcome = session.run().await;
                tracing::debug!(outcome = outcome.as_str(), "session finished");
            });
            future
        })
    }
}

#[cfg(test)]
mod tests {
    use super::BatchRunner;
    use crate::engine::fake::PolarHost;
    use crate::models::{BatchSettings, PollingSettings};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_marker_outcomes_and_total_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = BatchSettings {
            root_dir: dir.path().join("Polars"),
            profiles: vec!["Naca0012".to_string()],
            reynolds: vec!["1e5".to_string(), "1e6".to_string()],
            max_running: 2,
            polling: PollingSettings {
                idle_sample_ms: 1,
                idle_window_ms: 2,
                window_poll_ms: 1,
                scheduler_poll_ms: 1,
                window_timeout_ms: None,
            },
            ..BatchSettings::default()
        };
        let host = Arc::new(PolarHost::new(&[Some(42), Some(42)]));
        let runner = BatchRunner::new(settings.clone(), host.clone());
        runner.run().await.expect("batch");

        assert_eq!(host.launches.load(Ordering::SeqCst), 2);
        assert!(settings.subject_dir("Naca0012").join("RE1e5.dat").exists());
        assert!(settings.subject_dir("Naca0012").join("RE1e6.dat").exists());

        let log = std::fs::read_to_string(settings.log_path("Naca0012")).expect("log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], "");
        assert!(lines[1].starts_with("----- "));
        assert!(lines.contains(&"Reynolds = 1e5, success on try 1"));
        assert!(lines.contains(&"Reynolds = 1e6, success on try 1"));
        assert!(lines[lines.len() - 1].starts_with("Total time: "));
    }
}
