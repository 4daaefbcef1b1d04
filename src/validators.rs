//! Input validation for templates, recipients and configured paths.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;

/// Phone-like run: optional `+` and country `1`, then 3-3-4 digits with
/// optional separators and an optionally parenthesised area code.
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?1?[\s.\-]?\(?\d{3}\)?[\s.\-]?\d{3}[\s.\-]?\d{4}")
        .expect("PHONE_REGEX is a valid regex pattern")
});

/// Validate a template name.
/// Returns an error message if validation fails, None if valid.
pub fn validate_template_name(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        Some("Template name cannot be empty".to_string())
    } else {
        None
    }
}

/// Validate a template message body.
/// Returns an error message if validation fails, None if valid.
pub fn validate_template_message(message: &str) -> Option<String> {
    if message.trim().is_empty() {
        Some("Template message cannot be empty".to_string())
    } else {
        None
    }
}

/// Validate a recipient after normalization.
/// Returns an error message if validation fails, None if valid.
pub fn validate_recipient(normalized: &str) -> Option<String> {
    if normalized.is_empty() {
        Some("Recipient cannot be empty".to_string())
    } else {
        None
    }
}

/// Find the first phone-like substring in free text.
pub fn extract_phone(text: &str) -> Option<String> {
    PHONE_REGEX
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

/// Check if metadata indicates a valid executable file (pure function).
/// Returns an error message if validation fails, None if valid.
///
/// Parameters:
/// - `is_file`: whether the path is a file
/// - `mode`: Unix permission mode (ignored on non-Unix platforms)
#[allow(unused_variables)]
fn check_executable_metadata(is_file: bool, mode: u32) -> Option<String> {
    if !is_file {
        return Some("Path is not a file".to_string());
    }

    #[cfg(unix)]
    {
        if mode & 0o111 == 0 {
            return Some("File is not executable".to_string());
        }
    }

    None
}

/// Convert an I/O error to an appropriate error message for file validation.
fn file_error_message(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::NotFound => "File not found".to_string(),
        std::io::ErrorKind::PermissionDenied => "Cannot access file".to_string(),
        _ => "Invalid path".to_string(),
    }
}

/// Validate that a path points to an executable file.
/// Returns an error message if validation fails, None if valid.
pub fn validate_executable_path(path: &str) -> Option<String> {
    if path.is_empty() {
        return Some("Path cannot be empty".to_string());
    }

    let expanded = Config::expand_tilde(path);

    match std::fs::metadata(&expanded) {
        Ok(metadata) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                check_executable_metadata(metadata.is_file(), metadata.permissions().mode())
            }
            #[cfg(not(unix))]
            {
                check_executable_metadata(metadata.is_file(), 0)
            }
        }
        Err(e) => Some(file_error_message(&e)),
    }
}
