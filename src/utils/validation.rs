//! Centralized validation helpers for pool records.

use std::collections::BTreeSet;

/// Maximum number of participant records accepted from one pool file (DOS protection)
pub const MAX_POOL_RECORDS: usize = 100_000;

/// Longest accepted group / workplace name
pub const MAX_LABEL_LENGTH: usize = 200;

/// Normalize a free-text label such as a study group or department name.
///
/// Surrounding whitespace is trimmed. Returns None for empty or overlong labels.
///
/// # Examples
///
/// ```
/// use pair_solver::utils::validation::normalize_label;
///
/// assert_eq!(normalize_label("  M3100 "), Some("M3100".to_string()));
/// assert_eq!(normalize_label("   "), None);
/// ```
#[must_use]
pub fn normalize_label(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_LABEL_LENGTH {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse every tag with `parse`, returning the first value that fails.
///
/// # Errors
///
/// Returns the offending raw value if any tag is not recognized.
pub fn parse_tags<T, F>(values: &[String], parse: F) -> Result<BTreeSet<T>, String>
where
    T: Ord,
    F: Fn(&str) -> Option<T>,
{
    values
        .iter()
        .map(|v| parse(v).ok_or_else(|| v.clone()))
        .collect()
}

/// Normalize every label, returning the first value that is empty or too long.
///
/// # Errors
///
/// Returns the offending raw value if any label is rejected.
pub fn normalize_labels(values: &[String]) -> Result<BTreeSet<String>, String> {
    values
        .iter()
        .map(|v| normalize_label(v).ok_or_else(|| v.clone()))
        .collect()
}

/// Check the number of records against [`MAX_POOL_RECORDS`].
/// Returns an error message if the limit is exceeded, None if safe.
#[must_use]
pub fn check_pool_size(count: usize) -> Option<String> {
    if count > MAX_POOL_RECORDS {
        Some(format!(
            "Too many participant records: {count} exceeds maximum of {MAX_POOL_RECORDS}"
        ))
    } else {
        None
    }
}
