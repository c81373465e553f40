use crate::errors::{AppError, AppResult};
use crate::models::BatchSettings;
use once_cell::sync::Lazy;

const MIN_TRIES: u32 = 1;
const MAX_TRIES_ALLOWED: u32 = 50;
const MIN_RUNNING: usize = 1;
const MAX_RUNNING_ALLOWED: usize = 64;

static LIST_SEPARATOR_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[,; ]+").expect("valid list separator regex"));

/// Splits a user-entered list such as `"1e5, 5e5;1e6 5e6"`.
pub fn split_list(raw: &str) -> Vec<String> {
    LIST_SEPARATOR_RE
        .split(raw.trim())
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// `naca0018` and `NACA0018` both become `Naca0018`.
pub fn capitalize_profile(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Validates the settings and returns a normalised copy ready to schedule.
pub fn validate_settings(settings: &BatchSettings) -> AppResult<BatchSettings> {
    let mut normalized = settings.clone();

    if normalized.engine_path.as_os_str().is_empty() {
        return Err(AppError::Config("engine path cannot be empty".to_string()));
    }

    let mut profiles: Vec<String> = Vec::new();
    for profile in settings.profiles.iter().map(|raw| capitalize_profile(raw)) {
        if profile.is_empty() || profiles.contains(&profile) {
            continue;
        }
        if profile.contains(['/', '\\']) || profile.contains("..") {
            return Err(AppError::Config(format!(
                "profile '{}' must be a bare name",
                profile
            )));
        }
        profiles.push(profile);
    }
    if profiles.is_empty() {
        return Err(AppError::Config("at least one profile is required".to_string()));
    }
    normalized.profiles = profiles;

    // Each Reynolds value owns one polar file, so duplicates would share it.
    let mut reynolds: Vec<String> = Vec::new();
    for value in settings.reynolds.iter().map(|raw| raw.trim().to_string()) {
        if value.is_empty() || reynolds.contains(&value) {
            continue;
        }
        if value.contains(['/', '\\']) || value.contains("..") {
            return Err(AppError::Config(format!(
                "Reynolds value '{}' cannot contain a path",
                value
            )));
        }
        reynolds.push(value);
    }
    normalized.reynolds = reynolds;
    if normalized.reynolds.is_empty() {
        return Err(AppError::Config(
            "at least one Reynolds value is required".to_string(),
        ));
    }

    if !normalized.angle_step.is_finite() || normalized.angle_step <= 0.0 {
        return Err(AppError::Config(format!(
            "angleStep must be positive (got {})",
            normalized.angle_step
        )));
    }
    if !normalized.angle_max.is_finite() || normalized.angle_max < 0.0 {
        return Err(AppError::Config(format!(
            "angleMax must be zero or positive (got {})",
            normalized.angle_max
        )));
    }
    if !normalized.mach.is_finite() || normalized.mach < 0.0 {
        return Err(AppError::Config(format!(
            "mach must be zero or positive (got {})",
            normalized.mach
        )));
    }

    if !(MIN_TRIES..=MAX_TRIES_ALLOWED).contains(&normalized.tries_max) {
        return Err(AppError::Config(format!(
            "triesMax must be between {} and {}",
            MIN_TRIES, MAX_TRIES_ALLOWED
        )));
    }
    if !(MIN_RUNNING..=MAX_RUNNING_ALLOWED).contains(&normalized.max_running) {
        return Err(AppError::Config(format!(
            "maxRunning must be between {} and {}",
            MIN_RUNNING, MAX_RUNNING_ALLOWED
        )));
    }

    if normalized.input_class.trim().is_empty() {
        return Err(AppError::Config("inputClass cannot be empty".to_string()));
    }

    let polling = &normalized.polling;
    if polling.idle_sample_ms == 0 || polling.window_poll_ms == 0 || polling.scheduler_poll_ms == 0 {
        return Err(AppError::Config(
            "polling intervals must be at least 1 ms".to_string(),
        ));
    }
    if polling.idle_window_ms < polling.idle_sample_ms {
        return Err(AppError::Config(
            "idleWindowMs must cover at least one sample".to_string(),
        ));
    }

    Ok(normalized)
}
