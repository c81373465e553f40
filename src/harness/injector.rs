use crate::engine::EngineProcess;
use crate::errors::AppResult;
use crate::harness::idle::IdleDetector;

/// Types one command line into the engine and waits until it has reacted.
///
/// Nothing acknowledges the line; a rejected command only shows up later as
/// missing output.
#[derive(Debug, Clone, Copy)]
pub struct CommandInjector {
    idle: IdleDetector,
}

impl CommandInjector {
    pub fn new(idle: IdleDetector) -> Self {
        Self { idle }
    }

    pub async fn send_line(&self, process: &mut dyn EngineProcess, line: &str) -> AppResult<()> {
        for ch in line.chars().chain(std::iter::once('\n')) {
            process.send_keystroke(ch)?;
        }
        self.idle.wait(process).await
    }
}

#[cfg(test)]
mod tests {
    use super::CommandInjector;
    use crate::engine::fake::ScriptedProcess;
    use crate::harness::idle::IdleDetector;
    use std::time::Duration;

    fn injector() -> CommandInjector {
        CommandInjector::new(IdleDetector::new(Duration::from_millis(1), 2))
    }

    #[tokio::test]
    async fn appends_newline_and_waits_for_idle() {
        let mut process = ScriptedProcess::default();
        injector().send_line(&mut process, "visc").await.expect("send");
        injector().send_line(&mut process, "").await.expect("send empty");
        assert_eq!(process.typed, "visc\n\n");
        assert_eq!(process.samples_taken, 4);
    }

    #[tokio::test]
    async fn stops_at_first_failed_keystroke() {
        let mut process = ScriptedProcess {
            fail_after_keystrokes: Some(2),
            ..ScriptedProcess::default()
        };
        let err = injector()
            .send_line(&mut process, "oper")
            .await
            .expect_err("window vanished");
        assert!(err.to_string().starts_with("SCRIPT_INTERRUPTED"));
        assert_eq!(process.typed, "op");
        assert_eq!(process.samples_taken, 0);
    }
}
