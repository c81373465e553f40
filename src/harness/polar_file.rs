use crate::errors::AppResult;
use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;

/// Lines of banner and column headings the engine writes before any data.
pub const HEADER_LINES: usize = 13;
/// Width of the leading angle column used as the sort key.
pub const KEY_WIDTH: usize = 8;

/// The engine writes Latin-1 banners, so bytes are decoded lossily.
pub fn read_lines(path: &Path) -> AppResult<Vec<String>> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(ToString::to_string)
        .collect())
}

/// Engine output with the header stripped.
pub fn read_data_lines(path: &Path) -> AppResult<Vec<String>> {
    Ok(read_lines(path)?.into_iter().skip(HEADER_LINES).collect())
}

pub fn sort_key(line: &str) -> Option<f64> {
    let field: String = line.chars().take(KEY_WIDTH).collect();
    field.trim().parse::<f64>().ok()
}

/// Sorts by the leading key, drops exact duplicates and lines with no key.
pub fn finalize_lines(lines: Vec<String>) -> Vec<String> {
    let mut keyed: Vec<(f64, String)> = Vec::with_capacity(lines.len());
    for line in lines {
        match sort_key(&line) {
            Some(key) => keyed.push((key, line)),
            None if line.trim().is_empty() => {}
            None => tracing::warn!(line = %line, "dropping polar line without a numeric key"),
        }
    }
    keyed.sort_by(|a, b| match a.0.total_cmp(&b.0) {
        Ordering::Equal => a.1.cmp(&b.1),
        other => other,
    });
    keyed.dedup_by(|a, b| a.1 == b.1);
    keyed.into_iter().map(|(_, line)| line).collect()
}

pub fn write_lines(path: &Path, lines: &[String]) -> AppResult<()> {
    let mut file = std::fs::File::create(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    Ok(())
}

pub fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
