use super::{EngineHost, EngineProcess, LaunchSpec};
use crate::errors::{AppError, AppResult};
use crate::harness::polar_file::HEADER_LINES;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory engine used by unit tests.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProcess {
    pub typed: String,
    pub cpu_samples: VecDeque<f64>,
    pub samples_taken: usize,
    pub locate_polls_needed: usize,
    pub locate_polls: usize,
    pub fail_after_keystrokes: Option<usize>,
    pub exited: bool,
    pub terminated: bool,
}

impl ScriptedProcess {
    pub fn with_cpu(samples: &[f64]) -> Self {
        Self {
            cpu_samples: samples.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn typed_lines(&self) -> Vec<&str> {
        self.typed.split_terminator('\n').collect()
    }
}

impl EngineProcess for ScriptedProcess {
    fn pid(&self) -> u32 {
        4242
    }

    fn locate_input_surface(&mut self) -> AppResult<bool> {
        self.locate_polls += 1;
        if self.exited {
            return Err(AppError::Script("engine exited before accepting input".to_string()));
        }
        Ok(self.locate_polls > self.locate_polls_needed)
    }

    fn send_keystroke(&mut self, ch: char) -> AppResult<()> {
        if let Some(limit) = self.fail_after_keystrokes {
            if self.typed.chars().count() >= limit {
                return Err(AppError::Script("window vanished".to_string()));
            }
        }
        self.typed.push(ch);
        Ok(())
    }

    fn sample_cpu(&mut self) -> AppResult<f64> {
        self.samples_taken += 1;
        Ok(self.cpu_samples.pop_front().unwrap_or(0.0))
    }

    fn terminate(&mut self) {
        self.terminated = true;
    }
}

/// Host whose engines write a polar file with a planned number of data rows
/// when killed. `None` in the plan means the engine never wrote the file.
pub(crate) struct PolarHost {
    plan: Mutex<VecDeque<Option<usize>>>,
    interruptions: Mutex<VecDeque<Option<usize>>>,
    pub launches: AtomicUsize,
}

impl PolarHost {
    pub fn new(plan: &[Option<usize>]) -> Self {
        Self {
            plan: Mutex::new(plan.iter().copied().collect()),
            interruptions: Mutex::new(VecDeque::new()),
            launches: AtomicUsize::new(0),
        }
    }

    /// Per launch, the number of keystrokes accepted before the window vanishes.
    pub fn with_interruptions(self, keystrokes: &[Option<usize>]) -> Self {
        Self {
            interruptions: Mutex::new(keystrokes.iter().copied().collect()),
            ..self
        }
    }
}

impl EngineHost for PolarHost {
    fn launch(&self, spec: &LaunchSpec) -> AppResult<Box<dyn EngineProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let rows = self.plan.lock().expect("plan lock").pop_front().flatten();
        let fail_after_keystrokes = self
            .interruptions
            .lock()
            .expect("interruptions lock")
            .pop_front()
            .flatten();
        Ok(Box::new(PolarEngine {
            cwd: spec.cwd.clone(),
            rows,
            inner: ScriptedProcess {
                fail_after_keystrokes,
                ..ScriptedProcess::default()
            },
        }))
    }
}

struct PolarEngine {
    cwd: PathBuf,
    rows: Option<usize>,
    inner: ScriptedProcess,
}

/// Rows with distinct, deliberately unsorted angles.
pub(crate) fn polar_rows(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let step = (i / 2) as f64 * 0.5;
            let alpha = if i % 2 == 0 { step } else { -(step + 0.5) };
            format!("{:8.3}  {:7.4}", alpha, alpha * 0.1)
        })
        .collect()
}

impl EngineProcess for PolarEngine {
    fn pid(&self) -> u32 {
        self.inner.pid()
    }

    fn locate_input_surface(&mut self) -> AppResult<bool> {
        self.inner.locate_input_surface()
    }

    fn send_keystroke(&mut self, ch: char) -> AppResult<()> {
        self.inner.send_keystroke(ch)
    }

    fn sample_cpu(&mut self) -> AppResult<f64> {
        self.inner.sample_cpu()
    }

    fn terminate(&mut self) {
        self.inner.terminate();
        let Some(count) = self.rows.take() else {
            return;
        };
        let lines = self.inner.typed_lines();
        let Some(name) = lines
            .iter()
            .position(|line| *line == "pacc")
            .and_then(|index| lines.get(index + 1))
        else {
            return;
        };
        // Real banners carry Latin-1 bytes such as the degree sign.
        let mut content: Vec<u8> = Vec::new();
        for i in 0..HEADER_LINES {
            if i == HEADER_LINES - 2 {
                content.extend_from_slice(b"   alpha \xB0     CL\n");
            } else {
                content.extend_from_slice(format!(" header {}\n", i).as_bytes());
            }
        }
        for row in polar_rows(count) {
            content.extend_from_slice(row.as_bytes());
            content.push(b'\n');
        }
        std::fs::write(self.cwd.join(name), content).expect("write polar");
    }
}
