//! Input normalization for labels, names and colors.

use crate::error::{MatrixError, MatrixResult};
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#[0-9a-fA-F]{3}|#[0-9a-fA-F]{6}|[a-zA-Z]+)$").expect("valid color regex")
});

/// Trims and collapses whitespace; rejects blank or over-long values.
///
/// `field` names the input in the returned `InvalidArgument` message.
pub fn normalize_label(value: &str, field: &str, max_chars: usize) -> MatrixResult<String> {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return Err(MatrixError::invalid(format!("{field} must not be blank")));
    }
    let length = collapsed.chars().count();
    if length > max_chars {
        return Err(MatrixError::invalid(format!(
            "{field} is {length} characters; at most {max_chars} allowed"
        )));
    }
    Ok(collapsed)
}

/// Accepts an empty color, `#rgb`, `#rrggbb` or a plain color word.
///
/// Hex colors are lowercased so equal colors compare equal.
pub fn normalize_color(value: &str) -> MatrixResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !COLOR_RE.is_match(trimmed) {
        return Err(MatrixError::invalid(format!(
            "color `{trimmed}` must be #rgb, #rrggbb or a color name"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Trims an external id and rejects blank values.
pub fn normalize_external_id(value: &str, field: &str) -> MatrixResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MatrixError::invalid(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}
