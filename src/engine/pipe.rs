//! Unix backend. Keystrokes go to the engine's stdin and CPU time is read
//! from procfs.

use super::{ChildGuard, EngineHost, EngineProcess, LaunchSpec};
use crate::errors::{AppError, AppResult};
use std::io::Write;
use std::process::{ChildStdin, Command, Stdio};
use std::time::Instant;

const FALLBACK_CLOCK_TICKS: f64 = 100.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PipeHost;

impl EngineHost for PipeHost {
    fn launch(&self, spec: &LaunchSpec) -> AppResult<Box<dyn EngineProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut guard = ChildGuard::spawn(&mut command, spec)?;
        let stdin = guard_stdin(&mut guard);
        let baseline = read_cpu_ticks(guard.pid()).unwrap_or(0);
        Ok(Box::new(PipeProcess {
            guard,
            stdin,
            last_ticks: baseline,
            last_sampled_at: Instant::now(),
            clock_ticks: clock_ticks_per_second(),
        }))
    }
}

fn guard_stdin(guard: &mut ChildGuard) -> Option<ChildStdin> {
    guard.child.as_mut().and_then(|child| child.stdin.take())
}

pub struct PipeProcess {
    guard: ChildGuard,
    stdin: Option<ChildStdin>,
    last_ticks: u64,
    last_sampled_at: Instant,
    clock_ticks: f64,
}

impl EngineProcess for PipeProcess {
    fn pid(&self) -> u32 {
        self.guard.pid()
    }

    fn locate_input_surface(&mut self) -> AppResult<bool> {
        if self.guard.has_exited() {
            return Err(AppError::Script("engine exited before accepting input".to_string()));
        }
        Ok(self.stdin.is_some())
    }

    fn send_keystroke(&mut self, ch: char) -> AppResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AppError::Script("engine input is closed".to_string()));
        };
        let mut buf = [0u8; 4];
        stdin
            .write_all(ch.encode_utf8(&mut buf).as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|error| AppError::Script(format!("keystroke not delivered: {}", error)))
    }

    fn sample_cpu(&mut self) -> AppResult<f64> {
        let ticks = read_cpu_ticks(self.guard.pid())?;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sampled_at).as_secs_f64();
        let delta = ticks.saturating_sub(self.last_ticks);
        self.last_ticks = ticks;
        self.last_sampled_at = now;
        if delta == 0 || elapsed <= 0.0 {
            return Ok(0.0);
        }
        Ok(delta as f64 / self.clock_ticks / elapsed * 100.0)
    }

    fn terminate(&mut self) {
        self.stdin = None;
        self.guard.terminate();
    }
}

/// utime + stime of `pid`, in clock ticks.
fn read_cpu_ticks(pid: u32) -> AppResult<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .map_err(|error| AppError::Script(format!("engine process gone: {}", error)))?;
    parse_cpu_ticks(&stat)
        .ok_or_else(|| AppError::Internal(format!("unreadable stat line for pid {}", pid)))
}

fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    // The command name may contain spaces; fields restart after its closing paren.
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime = fields.get(11)?.parse::<u64>().ok()?;
    let stime = fields.get(12)?.parse::<u64>().ok()?;
    Some(utime + stime)
}

fn clock_ticks_per_second() -> f64 {
    use nix::unistd::{sysconf, SysconfVar};
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => FALLBACK_CLOCK_TICKS,
    }
}
