use crate::engine::{EngineHost, EngineProcess, LaunchSpec};
use crate::errors::{run_blocking, AppError, AppResult};
use crate::harness::idle::IdleDetector;
use crate::harness::injector::CommandInjector;
use crate::harness::polar_file;
use crate::harness::script::{polar_script, ScriptStep};
use crate::harness::window::WindowLocator;
use crate::logbook::{Logbook, SharedFileLock};
use crate::models::{PolarTask, PollingSettings, SessionOutcome, SubjectKind};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Per-task state carried across retries.
#[derive(Debug)]
struct SessionState {
    attempt: u32,
    /// Best data captured so far, from an earlier run or an earlier attempt.
    previous_lines: Vec<String>,
    /// An earlier polar exists on disk but could not be read.
    prior_unreadable: bool,
}

#[derive(Debug, PartialEq)]
enum Verdict {
    Accept {
        lines: Vec<String>,
        met_threshold: bool,
    },
    Retry {
        best_lines: Vec<String>,
    },
}

/// Threshold once an attempt reproduces the previous line count exactly. It
/// shrinks with the remaining budget and is truncated, so it may reach zero.
fn shrunk_threshold(base: f64, tries_max: u32, attempt: u32) -> f64 {
    let remaining = i64::from(tries_max) - i64::from(attempt) + 1;
    (base * remaining as f64 / f64::from(tries_max.max(1))).trunc()
}

fn judge(
    captured: Option<Vec<String>>,
    previous: &[String],
    base_threshold: f64,
    attempt: u32,
    tries_max: u32,
) -> Verdict {
    let last_attempt = attempt >= tries_max;
    let Some(mut lines) = captured else {
        if last_attempt {
            return Verdict::Accept {
                lines: previous.to_vec(),
                met_threshold: false,
            };
        }
        return Verdict::Retry {
            best_lines: previous.to_vec(),
        };
    };

    let mut threshold = base_threshold;
    if lines.len() == previous.len() {
        threshold = shrunk_threshold(base_threshold, tries_max, attempt);
    } else if lines.len() < previous.len() {
        lines = previous.to_vec();
    }

    let met_threshold = lines.len() as f64 >= threshold;
    if met_threshold || last_attempt {
        Verdict::Accept {
            lines,
            met_threshold,
        }
    } else {
        Verdict::Retry { best_lines: lines }
    }
}

/// Drives the engine through one polar for one task, retrying until the
/// output is complete enough or the budget runs out. Never fails outward:
/// every outcome ends up in the polar file and the subject log.
pub struct SessionRunner {
    task: PolarTask,
    host: Arc<dyn EngineHost>,
    file_lock: SharedFileLock,
    logbook: Logbook,
    locator: WindowLocator,
    idle: IdleDetector,
    injector: CommandInjector,
}

impl SessionRunner {
    pub fn new(
        task: PolarTask,
        host: Arc<dyn EngineHost>,
        file_lock: SharedFileLock,
        logbook: Logbook,
        polling: &PollingSettings,
    ) -> Self {
        let idle = IdleDetector::from_polling(polling);
        Self {
            task,
            host,
            file_lock,
            logbook,
            locator: WindowLocator::from_polling(polling),
            idle,
            injector: CommandInjector::new(idle),
        }
    }

    pub async fn run(self) -> SessionOutcome {
        let span = tracing::info_span!(
            "session",
            session_id = %Uuid::new_v4(),
            subject = %self.task.profile,
            reynolds = %self.task.reynolds,
        );
        self.drive().instrument(span).await
    }

    async fn drive(&self) -> SessionOutcome {
        let kind = self.task.subject_kind();
        let mut state = SessionState {
            attempt: 1,
            previous_lines: Vec::new(),
            prior_unreadable: false,
        };

        loop {
            let captured = match self.provision(&kind, &mut state).await {
                Ok(()) => self.attempt(state.attempt).await,
                Err(AppError::MissingInput(_)) => return self.missing_input().await,
                Err(error) => {
                    tracing::warn!(attempt = state.attempt, error = %error, "provisioning failed");
                    None
                }
            };
            // Only a file this attempt produced may be discarded on retry.
            let produced = captured.is_some();

            match judge(
                captured,
                &state.previous_lines,
                self.task.min_data_lines(),
                state.attempt,
                self.task.tries_max,
            ) {
                Verdict::Accept {
                    lines,
                    met_threshold,
                } => return self.settle(&state, lines, met_threshold).await,
                Verdict::Retry { best_lines } => {
                    if produced {
                        let polar_path = self.task.polar_path();
                        if let Err(error) =
                            run_blocking(move || polar_file::remove_if_exists(&polar_path)).await
                        {
                            tracing::warn!(error = %error, "could not discard incomplete polar");
                        }
                    }
                    tracing::info!(
                        attempt = state.attempt,
                        lines = best_lines.len(),
                        "polar incomplete, retrying"
                    );
                    state.previous_lines = best_lines;
                    state.attempt += 1;
                }
            }
        }
    }

    async fn provision(&self, kind: &SubjectKind, state: &mut SessionState) -> AppResult<()> {
        if !kind.is_generated() {
            let target = self.task.profile_path();
            if !target.exists() {
                let _guard = self.file_lock.lock().await;
                let source = self.task.profile_source_path();
                let profile = self.task.profile.clone();
                run_blocking(move || {
                    if target.exists() {
                        return Ok(());
                    }
                    std::fs::copy(&source, &target).map_err(|error| {
                        tracing::debug!(source = %source.display(), error = %error, "definition copy failed");
                        AppError::MissingInput(profile)
                    })?;
                    tracing::debug!(target = %target.display(), "subject definition provisioned");
                    Ok(())
                })
                .await?;
            }
        }

        let polar_path = self.task.polar_path();
        if !polar_path.exists() {
            return Ok(());
        }
        let read_path = polar_path.clone();
        match run_blocking(move || polar_file::read_lines(&read_path)).await {
            Ok(lines) => {
                tracing::debug!(lines = lines.len(), "kept lines of existing polar");
                state.previous_lines = lines;
                state.prior_unreadable = false;
            }
            Err(error) => {
                // Leave it in place; the engine would append to it.
                state.prior_unreadable = true;
                return Err(error);
            }
        }
        run_blocking(move || polar_file::remove_if_exists(&polar_path)).await
    }

    /// Launch, script and kill the engine once. Returns the data lines it
    /// wrote, if it wrote the polar file at all.
    async fn attempt(&self, attempt: u32) -> Option<Vec<String>> {
        let spec = LaunchSpec {
            program: self.task.engine_path.clone(),
            cwd: self.task.polar_dir(),
            input_class: self.task.input_class.clone(),
        };

        match self.host.launch(&spec) {
            Ok(mut process) => {
                tracing::debug!(attempt, pid = process.pid(), "engine launched");
                // A crashed or hung engine still leaves partial output worth judging.
                if let Err(error) = self.script(process.as_mut()).await {
                    tracing::warn!(attempt, error = %error, "script interrupted");
                }
                let stopped = run_blocking(move || {
                    process.terminate();
                    Ok(())
                })
                .await;
                if let Err(error) = stopped {
                    tracing::error!(attempt, error = %error, "engine shutdown failed");
                }
            }
            Err(error) => {
                tracing::warn!(attempt, error = %error, "engine launch failed");
            }
        }

        self.collect().await
    }

    async fn script(&self, process: &mut dyn EngineProcess) -> AppResult<()> {
        self.locator.locate(process).await?;
        for step in polar_script(&self.task) {
            match step {
                ScriptStep::Line(text) => self.injector.send_line(process, &text).await?,
                ScriptStep::AwaitIdle => self.idle.wait(process).await?,
            }
        }
        // The accumulation file is only complete once the engine goes quiet.
        self.idle.wait(process).await
    }

    async fn collect(&self) -> Option<Vec<String>> {
        let path = self.task.polar_path();
        if !path.exists() {
            return None;
        }
        match run_blocking(move || polar_file::read_data_lines(&path)).await {
            Ok(lines) => Some(lines),
            Err(error) => {
                tracing::warn!(error = %error, "unreadable polar file");
                None
            }
        }
    }

    async fn settle(
        &self,
        state: &SessionState,
        lines: Vec<String>,
        met_threshold: bool,
    ) -> SessionOutcome {
        let lines = polar_file::finalize_lines(lines);
        if lines.is_empty() && state.prior_unreadable {
            tracing::warn!("existing polar could not be read, leaving it untouched");
        } else {
            let polar_path = self.task.polar_path();
            let content = lines.clone();
            if let Err(error) =
                run_blocking(move || polar_file::write_lines(&polar_path, &content)).await
            {
                tracing::error!(error = %error, "failed to write polar");
            }
        }

        let log_path = self.task.log_path();
        let (outcome, logged) = if met_threshold {
            tracing::info!(attempt = state.attempt, lines = lines.len(), "polar complete");
            (
                SessionOutcome::Success {
                    attempts: state.attempt,
                    lines: lines.len(),
                },
                self.logbook
                    .success(&log_path, &self.task.reynolds, state.attempt)
                    .await,
            )
        } else {
            tracing::warn!(
                tries_max = self.task.tries_max,
                lines = lines.len(),
                "polar still incomplete after all tries"
            );
            (
                SessionOutcome::Exhausted {
                    tries_max: self.task.tries_max,
                    lines: lines.len(),
                },
                self.logbook
                    .failure(&log_path, &self.task.reynolds, self.task.tries_max)
                    .await,
            )
        };
        if let Err(error) = logged {
            tracing::error!(error = %error, "failed to append outcome to subject log");
        }
        outcome
    }

    async fn missing_input(&self) -> SessionOutcome {
        tracing::warn!(source = %self.task.profile_source_path().display(), "subject definition missing");
        if let Err(error) = self
            .logbook
            .missing_input(&self.task.log_path(), &self.task.profile)
            .await
        {
            tracing::error!(error = %error, "failed to append to subject log");
        }
        SessionOutcome::MissingInput
    }
}
