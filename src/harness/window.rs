use crate::engine::EngineProcess;
use crate::errors::{AppError, AppResult};
use crate::models::PollingSettings;
use std::time::Duration;
use tokio::time::Instant;

/// How long to keep looking for the engine's input window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowWait {
    /// Poll until found. The engine is expected to open its window eventually.
    Unbounded,
    Within(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct WindowLocator {
    poll_interval: Duration,
    wait: WindowWait,
}

impl WindowLocator {
    pub fn new(poll_interval: Duration, wait: WindowWait) -> Self {
        Self {
            poll_interval,
            wait,
        }
    }

    pub fn from_polling(polling: &PollingSettings) -> Self {
        let wait = match polling.window_timeout() {
            Some(limit) => WindowWait::Within(limit),
            None => WindowWait::Unbounded,
        };
        Self::new(polling.window_poll_interval(), wait)
    }

    pub async fn locate(&self, process: &mut dyn EngineProcess) -> AppResult<()> {
        let started = Instant::now();
        let mut polls = 0u64;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            match process.locate_input_surface() {
                Ok(true) => {
                    tracing::debug!(pid = process.pid(), polls, "input surface ready");
                    return Ok(());
                }
                Ok(false) => {}
                // A backend errors once the engine is gone; no window will ever appear.
                Err(error) => {
                    tracing::warn!(pid = process.pid(), polls, error = %error, "engine lost before its window appeared");
                    return Err(error);
                }
            }
            if let WindowWait::Within(limit) = self.wait {
                if started.elapsed() >= limit {
                    return Err(AppError::Script(format!(
                        "input window not found after {} ms",
                        limit.as_millis()
                    )));
                }
            }
        }
    }
}
