//! Response template store.
//!
//! Owns the ordered list of templates and keeps it in sync with a single JSON
//! file. Order is significant: it is the list order in the UI and the basis
//! for index-based selection.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::validators::{validate_template_message, validate_template_name};

/// A named canned message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub message: String,
}

impl Template {
    /// Build a template from user input, trimming surrounding whitespace.
    pub fn new(name: &str, message: &str) -> Result<Self, StoreError> {
        let name = name.trim();
        let message = message.trim();

        if let Some(e) = validate_template_name(name) {
            return Err(StoreError::Validation(e));
        }
        if let Some(e) = validate_template_message(message) {
            return Err(StoreError::Validation(e));
        }

        Ok(Self {
            name: name.to_string(),
            message: message.to_string(),
        })
    }

    fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.message.trim().is_empty()
    }
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected input: empty fields or an index outside the list.
    #[error("{0}")]
    Validation(String),

    /// The backing file could not be written. In-memory state is still valid.
    #[error("Failed to save templates to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What to do when the backing file exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptPolicy {
    /// Use the built-in defaults; the next save overwrites the file.
    Defaults,
    /// Use the built-in defaults and move the bad file to `<file>.corrupt`.
    #[default]
    Backup,
}

/// Where the current in-memory list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Parsed from the backing file.
    File,
    /// No backing file yet; built-in defaults.
    Missing,
    /// The file could not be read; built-in defaults.
    Unreadable(String),
    /// The file did not hold a valid template list; built-in defaults.
    Corrupt(String),
}

impl LoadSource {
    pub fn used_defaults(&self) -> bool {
        !matches!(self, LoadSource::File)
    }
}

/// Which template the UI selects on open.
///
/// Deserializes from either an integer (`preselect = 2`) or a name
/// (`preselect = "Stop Request"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Preselect {
    Index(usize),
    Name(String),
}

impl Default for Preselect {
    fn default() -> Self {
        Preselect::Index(0)
    }
}

/// Parse and validate a JSON template list.
///
/// Any element with a blank name or message is rejected. An empty list is
/// valid: deleting every template saves `[]`.
pub fn parse_templates(contents: &str) -> Result<Vec<Template>, String> {
    let templates: Vec<Template> =
        serde_json::from_str(contents).map_err(|e| format!("Invalid JSON: {}", e))?;

    if let Some(pos) = templates.iter().position(|t| !t.is_valid()) {
        return Err(format!("Template {} has an empty name or message", pos));
    }

    Ok(templates)
}

/// Path used to park a corrupt backing file.
pub fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("responses.json"));
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Read the backing file, falling back to `defaults` on any problem.
///
/// Never fails: a missing, unreadable or malformed file yields a copy of
/// `defaults` plus the reason in the returned [`LoadSource`].
pub fn load_templates(
    path: &Path,
    defaults: &[Template],
    on_corrupt: CorruptPolicy,
) -> (Vec<Template>, LoadSource) {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?path, "template_file_missing");
            return (defaults.to_vec(), LoadSource::Missing);
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "template_file_unreadable");
            return (defaults.to_vec(), LoadSource::Unreadable(e.to_string()));
        }
    };

    match parse_templates(&contents) {
        Ok(templates) => {
            info!(path = ?path, count = templates.len(), "templates_loaded");
            (templates, LoadSource::File)
        }
        Err(reason) => {
            match on_corrupt {
                CorruptPolicy::Defaults => {
                    debug!(path = ?path, reason = %reason, "template_file_corrupt");
                }
                CorruptPolicy::Backup => {
                    let backup = corrupt_backup_path(path);
                    match fs::rename(path, &backup) {
                        Ok(()) => {
                            warn!(path = ?path, backup = ?backup, reason = %reason, "template_file_corrupt_backed_up")
                        }
                        Err(e) => {
                            warn!(path = ?path, reason = %reason, error = %e, "template_file_backup_failed")
                        }
                    }
                }
            }
            (defaults.to_vec(), LoadSource::Corrupt(reason))
        }
    }
}

/// Serialize the full list to `path`, overwriting it.
pub fn save_templates(path: &Path, templates: &[Template]) -> Result<(), StoreError> {
    let persistence = |source: io::Error| StoreError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(persistence)?;
    }

    let json = serde_json::to_string_pretty(templates).map_err(|e| persistence(io::Error::other(e)))?;
    fs::write(path, json).map_err(persistence)?;

    debug!(path = ?path, count = templates.len(), "templates_saved");
    Ok(())
}

/// The ordered template collection and its backing file.
///
/// Every mutating call persists the whole list. If the write fails the
/// in-memory change is kept so the session stays usable, and the
/// [`StoreError::Persistence`] is returned for the caller to report.
#[derive(Debug)]
pub struct TemplateStore {
    path: PathBuf,
    defaults: Vec<Template>,
    on_corrupt: CorruptPolicy,
    templates: Vec<Template>,
    source: LoadSource,
}

impl TemplateStore {
    /// Open the store at `path`, loading its contents immediately.
    pub fn open(path: impl Into<PathBuf>, defaults: Vec<Template>, on_corrupt: CorruptPolicy) -> Self {
        let path = path.into();
        let (templates, source) = load_templates(&path, &defaults, on_corrupt);
        Self {
            path,
            defaults,
            on_corrupt,
            templates,
            source,
        }
    }

    /// Re-read the backing file, replacing the in-memory list.
    pub fn load(&mut self) -> &[Template] {
        let (templates, source) = load_templates(&self.path, &self.defaults, self.on_corrupt);
        self.templates = templates;
        self.source = source;
        &self.templates
    }

    /// Write the current list to the backing file.
    pub fn save(&self) -> Result<(), StoreError> {
        save_templates(&self.path, &self.templates)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Template, StoreError> {
        self.check_index(index)?;
        Ok(&self.templates[index])
    }

    /// Append a new template and persist.
    pub fn create(&mut self, name: &str, message: &str) -> Result<Template, StoreError> {
        let template = Template::new(name, message)?;
        self.templates.push(template.clone());
        info!(index = self.templates.len() - 1, name = %template.name, "template_created");
        self.save()?;
        Ok(template)
    }

    /// Replace the template at `index` in place and persist.
    pub fn update(&mut self, index: usize, name: &str, message: &str) -> Result<Template, StoreError> {
        self.check_index(index)?;
        let template = Template::new(name, message)?;
        self.templates[index] = template.clone();
        info!(index, name = %template.name, "template_updated");
        self.save()?;
        Ok(template)
    }

    /// Remove the template at `index`, shifting later ones left, and persist.
    ///
    /// Returns the removed template.
    pub fn delete(&mut self, index: usize) -> Result<Template, StoreError> {
        self.check_index(index)?;
        let removed = self.templates.remove(index);
        info!(index, name = %removed.name, "template_deleted");
        self.save()?;
        Ok(removed)
    }

    /// Replace the whole list with the configured defaults and persist.
    pub fn reset_to_defaults(&mut self) -> Result<(), StoreError> {
        self.templates = self.defaults.clone();
        info!(count = self.templates.len(), "templates_reset");
        self.save()
    }

    /// First template whose name matches `name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        let needle = name.trim().to_lowercase();
        self.templates
            .iter()
            .position(|t| t.name.to_lowercase() == needle)
    }

    /// Resolve a preselection, falling back to the first template.
    ///
    /// Returns `None` only when the store is empty.
    pub fn preselect_index(&self, preselect: &Preselect) -> Option<usize> {
        if self.templates.is_empty() {
            return None;
        }
        let resolved = match preselect {
            Preselect::Index(i) if *i < self.templates.len() => Some(*i),
            Preselect::Index(_) => None,
            Preselect::Name(name) => self.find_by_name(name),
        };
        Some(resolved.unwrap_or(0))
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        if index < self.templates.len() {
            Ok(())
        } else {
            Err(StoreError::Validation(format!(
                "Template index {} is out of range (have {})",
                index,
                self.templates.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn defaults() -> Vec<Template> {
        vec![
            Template::new("Polite Decline", "Please remove my number.").unwrap(),
            Template::new("Stop Request", "STOP").unwrap(),
            Template::new("Duck", "Quack.").unwrap(),
        ]
    }

    fn create_test_store() -> (TemplateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("responses.json");
        let store = TemplateStore::open(path, defaults(), CorruptPolicy::Defaults);
        (store, temp_dir)
    }

    fn names(store: &TemplateStore) -> Vec<&str> {
        store.templates().iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.templates(), defaults().as_slice());
        assert_eq!(store.source(), &LoadSource::Missing);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("responses.json");
        fs::write(&path, "{ not json").unwrap();

        let store = TemplateStore::open(&path, defaults(), CorruptPolicy::Defaults);
        assert_eq!(store.templates(), defaults().as_slice());
        assert!(matches!(store.source(), LoadSource::Corrupt(_)));
        // Defaults policy leaves the file alone
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_elements_count_as_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("responses.json");
        fs::write(&path, r#"[{"name": "", "message": "hi"}]"#).unwrap();

        let store = TemplateStore::open(&path, defaults(), CorruptPolicy::Defaults);
        assert_eq!(store.templates(), defaults().as_slice());
    }

    #[test]
    fn test_deleting_every_template_survives_reopen() {
        let (mut store, temp) = create_test_store();
        while !store.is_empty() {
            store.delete(0).unwrap();
        }

        let path = temp.path().join("responses.json");
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");

        let reopened = TemplateStore::open(&path, defaults(), CorruptPolicy::Backup);
        assert_eq!(reopened.source(), &LoadSource::File);
        assert!(reopened.is_empty());
        assert_eq!(reopened.preselect_index(&Preselect::default()), None);
        assert!(path.exists());
        assert!(!corrupt_backup_path(&path).exists());
    }

    #[test]
    fn test_corrupt_file_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("responses.json");
        fs::write(&path, "garbage").unwrap();

        let store = TemplateStore::open(&path, defaults(), CorruptPolicy::Backup);
        assert!(store.source().used_defaults());
        assert!(!path.exists());

        let backup = corrupt_backup_path(&path);
        assert_eq!(fs::read_to_string(backup).unwrap(), "garbage");
    }

    #[test]
    fn test_corrupt_backup_path() {
        assert_eq!(
            corrupt_backup_path(Path::new("/tmp/x/responses.json")),
            PathBuf::from("/tmp/x/responses.json.corrupt")
        );
    }

    #[test]
    fn test_create_then_reload() {
        let (mut store, temp) = create_test_store();
        let n = store.len();

        let created = store.create("Test", "Hi").unwrap();
        assert_eq!(created, Template::new("Test", "Hi").unwrap());
        assert_eq!(store.len(), n + 1);
        assert_eq!(store.templates().last(), Some(&created));

        // Fresh store simulates a restart
        let reopened = TemplateStore::open(
            temp.path().join("responses.json"),
            Vec::new(),
            CorruptPolicy::Defaults,
        );
        assert_eq!(reopened.source(), &LoadSource::File);
        assert_eq!(reopened.templates(), store.templates());
        assert_eq!(reopened.get(n).unwrap(), &created);
    }

    #[test]
    fn test_create_trims_input() {
        let (mut store, _temp) = create_test_store();
        let created = store.create("  Padded  ", "\n body \n").unwrap();
        assert_eq!(created.name, "Padded");
        assert_eq!(created.message, "body");
    }

    #[test]
    fn test_create_rejects_empty_fields() {
        let (mut store, _temp) = create_test_store();
        let before = store.templates().to_vec();

        assert!(matches!(store.create("", "Hi"), Err(StoreError::Validation(_))));
        assert!(matches!(store.create("Name", "   "), Err(StoreError::Validation(_))));

        assert_eq!(store.templates(), before.as_slice());
        // Nothing was persisted either
        assert!(!store.path().exists());
    }

    #[test]
    fn test_update_changes_only_target() {
        let (mut store, _temp) = create_test_store();
        let before = store.templates().to_vec();

        store.update(1, "Unsubscribe", "UNSUBSCRIBE").unwrap();

        assert_eq!(store.len(), before.len());
        assert_eq!(store.get(0).unwrap(), &before[0]);
        assert_eq!(store.get(1).unwrap().name, "Unsubscribe");
        assert_eq!(store.get(1).unwrap().message, "UNSUBSCRIBE");
        assert_eq!(store.get(2).unwrap(), &before[2]);
    }

    #[test]
    fn test_update_rejects_bad_input() {
        let (mut store, _temp) = create_test_store();
        let before = store.templates().to_vec();

        assert!(matches!(store.update(3, "a", "b"), Err(StoreError::Validation(_))));
        assert!(matches!(store.update(0, "", "b"), Err(StoreError::Validation(_))));
        assert!(matches!(store.update(0, "a", ""), Err(StoreError::Validation(_))));

        assert_eq!(store.templates(), before.as_slice());
    }

    #[test]
    fn test_delete_shifts_left() {
        let (mut store, _temp) = create_test_store();

        let removed = store.delete(0).unwrap();
        assert_eq!(removed.name, "Polite Decline");
        assert_eq!(names(&store), vec!["Stop Request", "Duck"]);

        assert!(matches!(store.delete(2), Err(StoreError::Validation(_))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_out_of_range() {
        let (store, _temp) = create_test_store();
        let err = store.get(99).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_scenario_defaults_create_save_reload() {
        let (mut store, temp) = create_test_store();
        let n = store.len();
        assert!(n > 0);

        store.create("Test", "Hi").unwrap();
        assert_eq!(store.len(), n + 1);
        assert_eq!(
            store.templates().last().unwrap(),
            &Template {
                name: "Test".to_string(),
                message: "Hi".to_string()
            }
        );

        store.save().unwrap();
        let mut fresh = TemplateStore::open(
            temp.path().join("responses.json"),
            defaults(),
            CorruptPolicy::Defaults,
        );
        assert_eq!(fresh.load(), store.templates());
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail
        let path = temp_dir.path().join("responses.json");
        fs::create_dir(&path).unwrap();

        let mut store = TemplateStore::open(&path, defaults(), CorruptPolicy::Defaults);
        let n = store.len();

        let err = store.create("Test", "Hi").unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert_eq!(store.len(), n + 1);
        assert_eq!(store.get(n).unwrap().name, "Test");
    }

    #[test]
    fn test_saved_file_is_plain_array() {
        let (store, _temp) = create_test_store();
        store.save().unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1]["name"], "Stop Request");
        assert_eq!(items[1]["message"], "STOP");
        assert!(raw.contains("\n  {"));
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut store, _temp) = create_test_store();
        store.delete(0).unwrap();
        store.create("Extra", "x").unwrap();

        store.reset_to_defaults().unwrap();
        assert_eq!(store.templates(), defaults().as_slice());
    }

    #[test]
    fn test_find_by_name() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.find_by_name("stop request"), Some(1));
        assert_eq!(store.find_by_name("nope"), None);
    }

    #[test]
    fn test_preselect_index() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.preselect_index(&Preselect::Index(2)), Some(2));
        assert_eq!(store.preselect_index(&Preselect::Index(7)), Some(0));
        assert_eq!(
            store.preselect_index(&Preselect::Name("Duck".to_string())),
            Some(2)
        );
        assert_eq!(
            store.preselect_index(&Preselect::Name("Missing".to_string())),
            Some(0)
        );
    }

    #[test]
    fn test_parse_templates_errors() {
        assert!(parse_templates("nope").unwrap_err().starts_with("Invalid JSON"));
        assert_eq!(parse_templates("[]").unwrap(), Vec::new());
        assert!(parse_templates(r#"[{"name": "a"}]"#).is_err());
    }
}
