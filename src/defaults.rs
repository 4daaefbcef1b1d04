//! Built-in template list.
//!
//! The shipped defaults live in `assets/default_templates.json` and can be
//! replaced wholesale by pointing `store.defaults_path` at another file.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::store::{Template, parse_templates};

/// Default templates bundled into the binary.
const BUILTIN_TEMPLATES_JSON: &str = include_str!("../assets/default_templates.json");

/// Parse a defaults list. Unlike a saved store, defaults must not be empty.
fn parse_defaults(contents: &str) -> Result<Vec<Template>, String> {
    let templates = parse_templates(contents)?;
    if templates.is_empty() {
        return Err("Template list is empty".to_string());
    }
    Ok(templates)
}

/// Returns the bundled default templates.
pub fn builtin_templates() -> Vec<Template> {
    match parse_defaults(BUILTIN_TEMPLATES_JSON) {
        Ok(templates) => templates,
        Err(e) => {
            warn!(error = %e, "builtin_templates_invalid");
            vec![Template {
                name: "Stop Request".to_string(),
                message: "STOP".to_string(),
            }]
        }
    }
}

/// Load defaults from `path` when configured, otherwise the bundled set.
///
/// A file that can't be read or parsed falls back to the bundled set.
pub fn load_defaults(path: Option<&Path>) -> Vec<Template> {
    let Some(path) = path else {
        return builtin_templates();
    };

    let result = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read defaults file: {}", e))
        .and_then(|contents| parse_defaults(&contents));

    match result {
        Ok(templates) => {
            info!(path = ?path, count = templates.len(), "custom_defaults_loaded");
            templates
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "custom_defaults_failed");
            builtin_templates()
        }
    }
}
