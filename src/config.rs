use crate::errors::{AppError, AppResult};
use crate::models::BatchSettings;
use crate::policy::split_list;
use std::path::{Path, PathBuf};

/// Values given on the command line. Each `Some` replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub engine_path: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
    pub profile_source_dir: Option<PathBuf>,
    pub profiles: Option<String>,
    pub reynolds: Option<String>,
    pub mach: Option<f64>,
    pub angle_max: Option<f64>,
    pub angle_step: Option<f64>,
    pub tries_max: Option<u32>,
    pub max_running: Option<usize>,
    pub input_class: Option<String>,
    pub window_timeout_ms: Option<u64>,
}

/// Reads settings from a YAML or JSON file. Without a path the defaults are
/// used; fields missing from the file keep their default.
pub fn load_settings(path: Option<&Path>) -> AppResult<BatchSettings> {
    let Some(path) = path else {
        return Ok(BatchSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let settings = match extension.as_deref() {
        Some("json") => serde_json::from_str(&raw)?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
        _ => {
            return Err(AppError::Config(format!(
                "unsupported settings file {} (expected .json, .yaml or .yml)",
                path.display()
            )))
        }
    };
    tracing::debug!(path = %path.display(), "settings file loaded");
    Ok(settings)
}

pub fn apply_overrides(mut settings: BatchSettings, overrides: SettingsOverrides) -> BatchSettings {
    if let Some(engine_path) = overrides.engine_path {
        settings.engine_path = engine_path;
    }
    if let Some(root_dir) = overrides.root_dir {
        settings.root_dir = root_dir;
    }
    if let Some(source) = overrides.profile_source_dir {
        settings.profile_source_dir = source;
    }
    if let Some(profiles) = overrides.profiles {
        settings.profiles = split_list(&profiles);
    }
    if let Some(reynolds) = overrides.reynolds {
        settings.reynolds = split_list(&reynolds);
    }
    if let Some(mach) = overrides.mach {
        settings.mach = mach;
    }
    if let Some(angle_max) = overrides.angle_max {
        settings.angle_max = angle_max;
    }
    if let Some(angle_step) = overrides.angle_step {
        settings.angle_step = angle_step;
    }
    if let Some(tries_max) = overrides.tries_max {
        settings.tries_max = tries_max;
    }
    if let Some(max_running) = overrides.max_running {
        settings.max_running = max_running;
    }
    if let Some(input_class) = overrides.input_class {
        settings.input_class = input_class;
    }
    if overrides.window_timeout_ms.is_some() {
        settings.polling.window_timeout_ms = overrides.window_timeout_ms;
    }
    settings
}
