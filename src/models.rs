use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INPUT_CLASS: &str = "rfoil01Graphic";
pub const GENERATED_PREFIX: &str = "Naca";
const GENERATED_NAME_LENGTHS: [usize; 2] = [8, 9];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    pub idle_sample_ms: u64,
    pub idle_window_ms: u64,
    pub window_poll_ms: u64,
    pub scheduler_poll_ms: u64,
    pub window_timeout_ms: Option<u64>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            idle_sample_ms: 10,
            idle_window_ms: 50,
            window_poll_ms: 100,
            scheduler_poll_ms: 100,
            window_timeout_ms: None,
        }
    }
}

impl PollingSettings {
    pub fn idle_sample_interval(&self) -> Duration {
        Duration::from_millis(self.idle_sample_ms)
    }

    /// Number of consecutive zero samples that make up one idle window.
    pub fn idle_window_samples(&self) -> usize {
        let samples = self.idle_window_ms / self.idle_sample_ms.max(1);
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }

    pub fn window_poll_interval(&self) -> Duration {
        Duration::from_millis(self.window_poll_ms)
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_ms)
    }

    pub fn window_timeout(&self) -> Option<Duration> {
        self.window_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSettings {
    pub engine_path: PathBuf,
    pub root_dir: PathBuf,
    pub profile_source_dir: PathBuf,
    pub profiles: Vec<String>,
    pub reynolds: Vec<String>,
    pub mach: f64,
    pub angle_max: f64,
    pub angle_step: f64,
    pub tries_max: u32,
    pub max_running: usize,
    pub input_class: String,
    pub polling: PollingSettings,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("C:/rFoil/rfoil01.exe"),
            root_dir: PathBuf::from("Polars"),
            profile_source_dir: PathBuf::from("."),
            profiles: vec!["Naca0018".to_string()],
            reynolds: ["1e5", "5e5", "1e6", "5e6", "1e7", "5e7"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            mach: 0.1,
            angle_max: 20.0,
            angle_step: 0.5,
            tries_max: 5,
            max_running: 2,
            input_class: DEFAULT_INPUT_CLASS.to_string(),
            polling: PollingSettings::default(),
        }
    }
}

impl BatchSettings {
    pub fn subject_dir(&self, profile: &str) -> PathBuf {
        self.root_dir.join(profile)
    }

    pub fn log_path(&self, profile: &str) -> PathBuf {
        self.subject_dir(profile).join(format!("{}.log", profile))
    }

    /// One task per Reynolds value, in configured order.
    pub fn tasks_for(&self, profile: &str) -> Vec<PolarTask> {
        self.reynolds
            .iter()
            .map(|reynolds| PolarTask {
                engine_path: self.engine_path.clone(),
                root_dir: self.root_dir.clone(),
                profile_source_dir: self.profile_source_dir.clone(),
                profile: profile.to_string(),
                reynolds: reynolds.clone(),
                mach: self.mach,
                angle_max: self.angle_max,
                angle_step: self.angle_step,
                tries_max: self.tries_max,
                input_class: self.input_class.clone(),
            })
            .collect()
    }
}

/// One (profile, Reynolds) unit of work. Never mutated once scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarTask {
    pub engine_path: PathBuf,
    pub root_dir: PathBuf,
    pub profile_source_dir: PathBuf,
    pub profile: String,
    pub reynolds: String,
    pub mach: f64,
    pub angle_max: f64,
    pub angle_step: f64,
    pub tries_max: u32,
    pub input_class: String,
}

impl PolarTask {
    pub fn polar_dir(&self) -> PathBuf {
        self.root_dir.join(&self.profile)
    }

    pub fn profile_file_name(&self) -> String {
        format!("{}.dat", self.profile)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.polar_dir().join(self.profile_file_name())
    }

    pub fn profile_source_path(&self) -> PathBuf {
        self.profile_source_dir.join(self.profile_file_name())
    }

    pub fn polar_file_name(&self) -> String {
        format!("RE{}.dat", self.reynolds)
    }

    pub fn polar_path(&self) -> PathBuf {
        self.polar_dir().join(self.polar_file_name())
    }

    pub fn log_path(&self) -> PathBuf {
        self.polar_dir().join(format!("{}.log", self.profile))
    }

    pub fn subject_kind(&self) -> SubjectKind {
        SubjectKind::classify(&self.profile)
    }

    /// Points expected from one full sweep, plus the two end points.
    pub fn min_data_lines(&self) -> f64 {
        self.angle_max / self.angle_step + 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectKind {
    /// Shape synthesised by the engine itself from a designation number.
    Generated { command: String, digits: String },
    FileBacked,
}

impl SubjectKind {
    pub fn classify(profile: &str) -> Self {
        let generated = profile.starts_with(GENERATED_PREFIX)
            && GENERATED_NAME_LENGTHS.contains(&profile.chars().count());
        if !generated {
            return Self::FileBacked;
        }
        let digits = profile[GENERATED_PREFIX.len()..].to_string();
        Self::Generated {
            command: format!("nac{}", digits.chars().count()),
            digits,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }
}

/// How a single session resolved. Only used for tracing and tests; callers of
/// the batch observe results through files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success { attempts: u32, lines: usize },
    Exhausted { tries_max: u32, lines: usize },
    MissingInput,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Exhausted { .. } => "exhausted",
            Self::MissingInput => "missing-input",
        }
    }
}
