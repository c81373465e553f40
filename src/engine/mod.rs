#[cfg(test)]
pub(crate) mod fake;
#[cfg(unix)]
pub mod pipe;
#[cfg(windows)]
pub mod win32;

use crate::errors::{AppError, AppResult};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::Duration;
use wait_timeout::ChildExt;

#[cfg(unix)]
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_millis(1500);
const FORCED_EXIT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub cwd: PathBuf,
    /// Window class of the engine's text input control.
    pub input_class: String,
}

/// Starts engine processes. One host is shared by every session of a batch.
pub trait EngineHost: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> AppResult<Box<dyn EngineProcess>>;
}

/// A live engine process, owned by exactly one session.
///
/// Implementations kill the process when dropped.
pub trait EngineProcess: Send {
    fn pid(&self) -> u32;
    /// Rescans the process for its input surface. `Ok(true)` once it is known.
    fn locate_input_surface(&mut self) -> AppResult<bool>;
    fn send_keystroke(&mut self, ch: char) -> AppResult<()>;
    /// CPU utilisation since the previous sample, as a percentage of one core.
    fn sample_cpu(&mut self) -> AppResult<f64>;
    fn terminate(&mut self);
}

pub fn native_host() -> AppResult<Arc<dyn EngineHost>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(pipe::PipeHost))
    }
    #[cfg(windows)]
    {
        Ok(Arc::new(win32::Win32Host))
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(AppError::Platform(
            "no engine backend for this platform".to_string(),
        ))
    }
}

/// Owns the engine child and guarantees it is reaped.
pub(crate) struct ChildGuard {
    child: Option<Child>,
    pid: u32,
}

impl ChildGuard {
    pub(crate) fn spawn(command: &mut Command, spec: &LaunchSpec) -> AppResult<Self> {
        if !spec.cwd.is_dir() {
            return Err(AppError::Io(format!(
                "working directory not found: {}",
                spec.cwd.display()
            )));
        }
        let child = command.spawn().map_err(|error| {
            AppError::Io(format!(
                "failed to spawn {}: {}",
                spec.program.display(),
                error
            ))
        })?;
        let pid = child.id();
        tracing::debug!(pid, program = %spec.program.display(), "engine process started");
        Ok(Self {
            child: Some(child),
            pid,
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    pub(crate) fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Ok(raw) = i32::try_from(self.pid) {
                let _ = kill(Pid::from_raw(raw), Signal::SIGTERM);
            }
            if matches!(child.wait_timeout(GRACEFUL_EXIT_WAIT), Ok(Some(_))) {
                return;
            }
        }

        let _ = child.kill();
        if !matches!(child.wait_timeout(FORCED_EXIT_WAIT), Ok(Some(_))) {
            tracing::warn!(pid = self.pid, "engine process did not exit after kill");
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}
