//! Application state and core logic.

use std::io;
use std::path::PathBuf;
use std::process::Command;

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::style::Color;
use tracing::{debug, warn};

use crate::delivery::{Connectivity, DeliveryShim, ImageOutcome};
use crate::modals::{
    DeleteConfirm, TemplateForm, handle_delete_confirm_input, handle_template_form_input,
};
use crate::store::{LoadSource, Preselect, StoreError, TemplateStore};
use crate::validators::extract_phone;

/// Severity of the status line message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusKind {
    pub fn color(&self) -> Color {
        match self {
            StatusKind::Info => Color::Cyan,
            StatusKind::Success => Color::Green,
            StatusKind::Warning => Color::Yellow,
            StatusKind::Error => Color::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

/// Which pane receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    List,
    Recipient,
}

impl Focus {
    pub fn toggle(self) -> Self {
        match self {
            Self::List => Self::Recipient,
            Self::Recipient => Self::List,
        }
    }
}

/// Logging details shown in the header.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub log_directory: Option<PathBuf>,
    pub logging_error: Option<String>,
}

/// Reads the system clipboard.
pub type ClipboardReader = fn() -> io::Result<String>;

/// Clipboard contents via `pbpaste`.
pub fn read_clipboard() -> io::Result<String> {
    let output = Command::new("pbpaste").output()?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "pbpaste exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Main application state.
pub struct App {
    pub store: TemplateStore,
    pub shim: DeliveryShim,
    pub image_urls: Vec<String>,
    /// Raw recipient as typed or pasted; normalized by the shim on send.
    pub recipient: String,
    pub selected: usize,
    pub focus: Focus,
    pub status: Option<StatusMessage>,
    /// Add/edit form (when open).
    pub form: Option<TemplateForm>,
    /// Pending delete confirmation (when open).
    pub delete_confirm: Option<DeleteConfirm>,
    pub show_help: bool,
    pub session: SessionInfo,
    pub should_quit: bool,
    clipboard: ClipboardReader,
}

impl App {
    pub fn new(
        store: TemplateStore,
        shim: DeliveryShim,
        image_urls: Vec<String>,
        preselect: &Preselect,
        session: SessionInfo,
    ) -> Self {
        let selected = store.preselect_index(preselect).unwrap_or(0);

        let status = match store.source() {
            LoadSource::File | LoadSource::Missing => None,
            LoadSource::Unreadable(reason) | LoadSource::Corrupt(reason) => Some(StatusMessage {
                text: format!("Using default templates: {}", reason),
                kind: StatusKind::Warning,
            }),
        };

        Self {
            store,
            shim,
            image_urls,
            recipient: String::new(),
            selected,
            focus: Focus::default(),
            status,
            form: None,
            delete_confirm: None,
            show_help: false,
            session,
            should_quit: false,
            clipboard: read_clipboard,
        }
    }

    /// Replace the clipboard source.
    pub fn with_clipboard(mut self, reader: ClipboardReader) -> Self {
        self.clipboard = reader;
        self
    }

    pub fn set_status(&mut self, kind: StatusKind, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.store.len() {
            self.selected += 1;
        }
    }

    /// Keep the selection inside the list after it shrinks.
    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.store.len().saturating_sub(1));
    }

    /// Set the recipient, preferring a phone number found in `text`.
    pub fn fill_recipient(&mut self, text: &str) {
        self.recipient = extract_phone(text).unwrap_or_else(|| text.trim().to_string());
    }

    pub fn paste_recipient(&mut self) {
        match (self.clipboard)() {
            Ok(text) if !text.trim().is_empty() => {
                self.fill_recipient(&text);
                self.set_status(
                    StatusKind::Info,
                    format!("Recipient set to {}", self.recipient),
                );
            }
            Ok(_) => self.set_status(StatusKind::Warning, "Clipboard is empty"),
            Err(e) => {
                warn!(error = %e, "clipboard_read_failed");
                self.set_status(StatusKind::Warning, format!("Could not read clipboard: {}", e));
            }
        }
    }

    /// Pre-fill the recipient from the frontmost Messages conversation.
    pub fn detect_recipient(&mut self) {
        match self.shim.active_participant() {
            Ok(Some(participant)) => {
                self.fill_recipient(&participant);
                self.set_status(
                    StatusKind::Success,
                    format!("Detected recipient {}", self.recipient),
                );
            }
            Ok(None) => self.set_status(
                StatusKind::Warning,
                "No active conversation detected; enter a recipient",
            ),
            Err(e) => self.set_status(StatusKind::Warning, format!("Detection failed: {}", e)),
        }
    }

    fn require_recipient(&mut self) -> Option<String> {
        let recipient = self.recipient.trim().to_string();
        if recipient.is_empty() {
            self.set_status(StatusKind::Warning, "Enter a recipient first");
            self.focus = Focus::Recipient;
            None
        } else {
            Some(recipient)
        }
    }

    pub fn send_selected(&mut self) {
        let Some(recipient) = self.require_recipient() else {
            return;
        };
        let template = match self.store.get(self.selected) {
            Ok(t) => t.clone(),
            Err(e) => {
                self.set_status(StatusKind::Error, e.to_string());
                return;
            }
        };

        match self.shim.send_text(&recipient, &template.message) {
            Ok(()) => self.set_status(
                StatusKind::Success,
                format!("Sent '{}' to {}", template.name, recipient),
            ),
            Err(e) => self.set_status(StatusKind::Error, format!("Send failed: {}", e)),
        }
    }

    pub fn send_image(&mut self) {
        let Some(recipient) = self.require_recipient() else {
            return;
        };
        match self
            .shim
            .fetch_and_send_random_image(&recipient, &self.image_urls)
        {
            Ok(ImageOutcome::Delivered { .. }) => {
                self.set_status(StatusKind::Success, format!("Sent image to {}", recipient))
            }
            Ok(ImageOutcome::FellBackToText { reason }) => self.set_status(
                StatusKind::Warning,
                format!("Image failed ({}); sent fallback text", reason),
            ),
            Err(e) => self.set_status(StatusKind::Error, format!("Send failed: {}", e)),
        }
    }

    pub fn test_connection(&mut self) {
        match self.shim.test_connectivity() {
            Ok(Connectivity::Reachable) => {
                self.set_status(StatusKind::Success, "Messages is reachable")
            }
            Ok(Connectivity::Unreachable { diagnostic }) => {
                self.set_status(StatusKind::Error, format!("Messages unreachable: {}", diagnostic))
            }
            Err(e) => self.set_status(StatusKind::Error, format!("Test failed: {}", e)),
        }
    }

    pub fn open_add_form(&mut self) {
        debug!("template_form_opened");
        self.form = Some(TemplateForm::add());
    }

    pub fn open_edit_form(&mut self) {
        match self.store.get(self.selected) {
            Ok(template) => {
                debug!(index = self.selected, "template_form_opened");
                self.form = Some(TemplateForm::edit(self.selected, template));
            }
            Err(e) => self.set_status(StatusKind::Warning, e.to_string()),
        }
    }

    pub fn open_delete_confirm(&mut self) {
        match self.store.get(self.selected) {
            Ok(template) => {
                self.delete_confirm = Some(DeleteConfirm {
                    index: self.selected,
                    name: template.name.clone(),
                })
            }
            Err(e) => self.set_status(StatusKind::Warning, e.to_string()),
        }
    }

    /// Report the outcome of a store mutation.
    ///
    /// A persistence failure keeps the in-memory change, so it is a warning.
    pub fn report_store_result(&mut self, result: Result<String, StoreError>) {
        match result {
            Ok(message) => self.set_status(StatusKind::Success, message),
            Err(e @ StoreError::Persistence { .. }) => {
                self.set_status(StatusKind::Warning, format!("Changed for this session only: {}", e))
            }
            Err(e) => self.set_status(StatusKind::Error, e.to_string()),
        }
        self.clamp_selection();
    }

    /// Re-read the template file, discarding nothing but the in-memory list.
    pub fn reload_templates(&mut self) {
        let count = self.store.load().len();
        self.clamp_selection();
        match self.store.source() {
            LoadSource::File => {
                self.set_status(StatusKind::Info, format!("Reloaded {} templates", count))
            }
            LoadSource::Missing => self.set_status(
                StatusKind::Info,
                format!("No template file yet; showing {} defaults", count),
            ),
            LoadSource::Unreadable(reason) | LoadSource::Corrupt(reason) => {
                let text = format!("Using default templates: {}", reason);
                self.set_status(StatusKind::Warning, text)
            }
        }
    }

    pub fn delete_template(&mut self, index: usize) {
        let result = self
            .store
            .delete(index)
            .map(|removed| format!("Deleted '{}'", removed.name));
        self.report_store_result(result);
    }

    /// Route a key press to the open modal or the main view.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        if self.form.is_some() {
            handle_template_form_input(self, code, modifiers);
            return;
        }
        if self.delete_confirm.is_some() {
            handle_delete_confirm_input(self, code);
            return;
        }
        if self.show_help {
            if matches!(code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter) {
                self.show_help = false;
            }
            return;
        }

        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        match code {
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('v') if ctrl => self.paste_recipient(),
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab => self.focus = self.focus.toggle(),
            KeyCode::Up => self.select_prev(),
            KeyCode::Down => self.select_next(),
            KeyCode::Enter => self.send_selected(),
            _ if self.focus == Focus::Recipient => self.edit_recipient(code),
            KeyCode::Char('k') => self.select_prev(),
            KeyCode::Char('j') => self.select_next(),
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('s') => self.send_selected(),
            KeyCode::Char('i') => self.send_image(),
            KeyCode::Char('p') => self.paste_recipient(),
            KeyCode::Char('a') => self.open_add_form(),
            KeyCode::Char('e') => self.open_edit_form(),
            KeyCode::Char('d') => self.open_delete_confirm(),
            KeyCode::Char('t') => self.test_connection(),
            KeyCode::Char('r') => self.reload_templates(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn edit_recipient(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char(c) => self.recipient.push(c),
            KeyCode::Backspace => {
                self.recipient.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::tests::{FakeFetcher, FakeRunner, failed_output, ok_output};
    use crate::store::{CorruptPolicy, Template};
    use tempfile::TempDir;

    fn defaults() -> Vec<Template> {
        vec![
            Template::new("Polite Decline", "No thanks").unwrap(),
            Template::new("Stop Request", "STOP").unwrap(),
            Template::new("Duck", "QUACK").unwrap(),
        ]
    }

    fn app_with(temp: &TempDir, runner: &FakeRunner, preselect: Preselect) -> App {
        let store = TemplateStore::open(
            temp.path().join("responses.json"),
            defaults(),
            CorruptPolicy::Backup,
        );
        let shim = DeliveryShim::new(Box::new(runner.clone()), Box::new(FakeFetcher::new(true)))
            .with_temp_dir(temp.path());
        App::new(
            store,
            shim,
            vec!["https://example.com/a.jpg".to_string()],
            &preselect,
            SessionInfo::default(),
        )
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(code, KeyModifiers::NONE);
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_preselect_by_name() {
        let temp = TempDir::new().unwrap();
        let app = app_with(
            &temp,
            &FakeRunner::default(),
            Preselect::Name("stop request".to_string()),
        );
        assert_eq!(app.selected, 1);
        assert!(app.status.is_none());
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("responses.json"), "{not json").unwrap();
        let app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0));

        assert_eq!(app.store.templates(), defaults().as_slice());
        let status = app.status.as_ref().unwrap();
        assert_eq!(status.kind, StatusKind::Warning);
        assert!(status.text.starts_with("Using default templates"));
    }

    #[test]
    fn test_selection_is_clamped() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0));

        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.selected, 0);
        for _ in 0..5 {
            press(&mut app, KeyCode::Char('j'));
        }
        assert_eq!(app.selected, 2);
        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn test_send_requires_recipient() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut app = app_with(&temp, &runner, Preselect::Index(1));

        press(&mut app, KeyCode::Char('s'));
        assert!(runner.calls.borrow().is_empty());
        assert_eq!(app.focus, Focus::Recipient);
        assert_eq!(app.status.as_ref().unwrap().kind, StatusKind::Warning);
    }

    #[test]
    fn test_type_recipient_and_send() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut app = app_with(&temp, &runner, Preselect::Index(1));

        press(&mut app, KeyCode::Tab);
        type_str(&mut app, "(555) 123-45678");
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.recipient, "(555) 123-4567");

        press(&mut app, KeyCode::Enter);

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[0], "5551234567");
        assert_eq!(calls[0].args[1], "STOP");
        assert_eq!(
            app.status.as_ref().unwrap().text,
            "Sent 'Stop Request' to (555) 123-4567"
        );
    }

    #[test]
    fn test_send_failure_lands_in_status() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::answering(vec![failed_output("no such buddy")]);
        let mut app = app_with(&temp, &runner, Preselect::Index(0));
        app.recipient = "5550001111".to_string();

        press(&mut app, KeyCode::Char('s'));
        let status = app.status.as_ref().unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert!(status.text.contains("no such buddy"));
        assert!(!app.should_quit);
    }

    #[test]
    fn test_image_fallback_is_warning() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::default();
        let mut app = app_with(&temp, &runner, Preselect::Index(0));
        app.recipient = "5550001111".to_string();

        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.status.as_ref().unwrap().kind, StatusKind::Warning);
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_paste_extracts_phone() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0))
            .with_clipboard(|| Ok("Msg from +1 (555) 987-6543: you won!".to_string()));

        app.handle_key(KeyCode::Char('v'), KeyModifiers::CONTROL);
        assert_eq!(app.recipient, "+1 (555) 987-6543");
    }

    #[test]
    fn test_paste_failure_is_warning() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0))
            .with_clipboard(|| Err(io::Error::other("pbpaste missing")));

        press(&mut app, KeyCode::Char('p'));
        assert!(app.recipient.is_empty());
        let status = app.status.as_ref().unwrap();
        assert_eq!(status.kind, StatusKind::Warning);
        assert!(status.text.contains("pbpaste missing"));
    }

    #[test]
    fn test_detect_recipient() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::answering(vec![
            ok_output("tel:+15550001111\n"),
            ok_output("No active conversation found"),
        ]);
        let mut app = app_with(&temp, &runner, Preselect::Index(0));

        app.detect_recipient();
        assert_eq!(app.recipient, "+15550001111");

        app.recipient.clear();
        app.detect_recipient();
        assert!(app.recipient.is_empty());
        assert_eq!(app.status.as_ref().unwrap().kind, StatusKind::Warning);
    }

    #[test]
    fn test_delete_with_confirmation() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(2));

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.store.len(), 3);
        assert!(app.delete_confirm.is_none());

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.store.len(), 2);
        assert_eq!(app.selected, 1);
        assert_eq!(app.status.as_ref().unwrap().text, "Deleted 'Duck'");
    }

    #[test]
    fn test_reload_picks_up_external_edits() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(2));

        std::fs::write(
            temp.path().join("responses.json"),
            r#"[{"name": "Only", "message": "one"}]"#,
        )
        .unwrap();
        press(&mut app, KeyCode::Char('r'));

        assert_eq!(app.store.templates(), &[Template::new("Only", "one").unwrap()]);
        assert_eq!(app.selected, 0);
        assert_eq!(app.status.as_ref().unwrap().text, "Reloaded 1 templates");
    }

    #[test]
    fn test_quit_keys() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0));

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        assert_eq!(app.recipient, "q");

        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn test_help_toggle() {
        let temp = TempDir::new().unwrap();
        let mut app = app_with(&temp, &FakeRunner::default(), Preselect::Index(0));

        press(&mut app, KeyCode::Char('?'));
        assert!(app.show_help);
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Esc);
        assert!(!app.show_help);
        assert!(!app.should_quit);
    }
}
