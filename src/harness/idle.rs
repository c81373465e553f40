use crate::engine::EngineProcess;
use crate::errors::AppResult;
use crate::models::PollingSettings;
use std::time::Duration;

/// Blocks until the engine has used no CPU for a whole trailing window of
/// samples. There is no timeout: a busy engine keeps the caller waiting.
#[derive(Debug, Clone, Copy)]
pub struct IdleDetector {
    sample_interval: Duration,
    window_samples: usize,
}

impl IdleDetector {
    pub fn new(sample_interval: Duration, window_samples: usize) -> Self {
        Self {
            sample_interval,
            window_samples: window_samples.max(1),
        }
    }

    pub fn from_polling(polling: &PollingSettings) -> Self {
        Self::new(polling.idle_sample_interval(), polling.idle_window_samples())
    }

    pub async fn wait(&self, process: &mut dyn EngineProcess) -> AppResult<()> {
        // The window starts out busy, so at least `window_samples` samples are taken.
        let mut quiet = 0usize;
        while quiet < self.window_samples {
            let cpu = process.sample_cpu()?;
            if cpu > 0.0 {
                quiet = 0;
            } else {
                quiet += 1;
            }
            tokio::time::sleep(self.sample_interval).await;
        }
        Ok(())
    }
}
