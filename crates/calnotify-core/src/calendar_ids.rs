//! The calendar id list: one identifier per line.

use std::path::Path;

use crate::error::ConfigError;

/// Parse calendar ids, skipping blank lines, `#` comments and duplicates.
pub fn parse_calendar_ids(contents: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !ids.iter().any(|id| id == trimmed) {
            ids.push(trimmed.to_string());
        }
    }
    ids
}

/// Read the calendar id list from disk.
pub fn read_calendar_ids(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
        _ => ConfigError::Invalid(format!("{}: {}", path.display(), e)),
    })?;
    Ok(parse_calendar_ids(&contents))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comments() {
        let ids = parse_calendar_ids(
            "primary\n\n  # team calendars\nteam@group.calendar.google.com  \nprimary\n",
        );
        assert_eq!(ids, vec!["primary", "team@group.calendar.google.com"]);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_calendar_ids(&dir.path().join("calendar_ids.txt"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar_ids.txt");
        std::fs::write(&path, "primary\nholidays@group.v.calendar.google.com\n").unwrap();
        let ids = read_calendar_ids(&path).unwrap();
        assert_eq!(ids.len(), 2);
    }
}
