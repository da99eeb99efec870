// ABOUTME: Utility functions for the stepdeck crate
// ABOUTME: Provides validation and normalization helpers shared across modules

use crate::errors::{DeckError, Result};
use std::path::Path;

pub const POSITION_LIMIT: f64 = 50_000.0;

/// Clamp a step coordinate into the canvas range. NaN becomes the origin.
pub fn clamp_position(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-POSITION_LIMIT, POSITION_LIMIT)
}

/// Whether `value` is a `#RRGGBB` color
pub fn is_hex_color(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(|b| b.is_ascii_hexdigit())
}

/// Validate a `#RRGGBB` color
pub fn validate_hex_color(value: &str) -> Result<()> {
    if is_hex_color(value) {
        Ok(())
    } else {
        Err(DeckError::ValidationError(format!(
            "Invalid hex color format: {:?}. Must be #RRGGBB",
            value
        )))
    }
}

/// `value` if it is a valid `#RRGGBB` color, `fallback` otherwise
pub fn color_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if is_hex_color(value) {
        value
    } else {
        fallback
    }
}

/// Validate a canvas dimension (data-width / data-height)
pub fn validate_dimension(value: u32, name: &str) -> Result<()> {
    if (500..=4000).contains(&value) {
        Ok(())
    } else {
        Err(DeckError::ValidationError(format!(
            "{} must be between 500 and 4000, got {}",
            name, value
        )))
    }
}

/// File name suggested for a downloaded export of a deck titled `title`
pub fn export_filename(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "presentation.html".to_string()
    } else {
        format!("{}.html", cleaned)
    }
}

/// Extension of an uploaded file name, if it has one
pub fn file_extension(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains(['/', '\\']))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(DeckError::ValidationError(format!(
            "Path exists but is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}
