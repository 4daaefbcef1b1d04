//! Modal state and input handling for the template form and delete prompt.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::debug;

use crate::app::App;
use crate::store::{StoreError, Template};
use crate::validators::{validate_template_message, validate_template_name};

/// Which field is focused in the template form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Name,
    Message,
    SaveButton,
    CancelButton,
}

impl FormField {
    pub fn next(self) -> Self {
        match self {
            Self::Name => Self::Message,
            Self::Message => Self::SaveButton,
            Self::SaveButton => Self::CancelButton,
            Self::CancelButton => Self::Name,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Self::Name => Self::CancelButton,
            Self::Message => Self::Name,
            Self::SaveButton => Self::Message,
            Self::CancelButton => Self::SaveButton,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, Self::Name | Self::Message)
    }
}

/// Whether the form creates a template or edits one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Add,
    Edit(usize),
}

/// State for the add/edit template form.
#[derive(Debug, Clone)]
pub struct TemplateForm {
    pub mode: FormMode,
    pub focus: FormField,
    pub name: String,
    pub message: String,
    /// Cursor position within the focused text field, in chars.
    pub cursor_pos: usize,
    /// Error from the last save attempt.
    pub error: Option<String>,
    /// Validation errors per field.
    pub validation_errors: HashMap<FormField, String>,
}

/// Byte offset of the `char_pos`-th char, or the end of `s`.
fn byte_offset(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl TemplateForm {
    pub fn add() -> Self {
        Self {
            mode: FormMode::Add,
            focus: FormField::Name,
            name: String::new(),
            message: String::new(),
            cursor_pos: 0,
            error: None,
            validation_errors: HashMap::new(),
        }
    }

    pub fn edit(index: usize, template: &Template) -> Self {
        Self {
            mode: FormMode::Edit(index),
            focus: FormField::Name,
            name: template.name.clone(),
            message: template.message.clone(),
            cursor_pos: template.name.chars().count(),
            error: None,
            validation_errors: HashMap::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            FormMode::Add => " New Template ",
            FormMode::Edit(_) => " Edit Template ",
        }
    }

    pub fn current_field_value(&self) -> Option<&String> {
        match self.focus {
            FormField::Name => Some(&self.name),
            FormField::Message => Some(&self.message),
            _ => None,
        }
    }

    fn current_field_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            FormField::Name => Some(&mut self.name),
            FormField::Message => Some(&mut self.message),
            _ => None,
        }
    }

    fn current_len(&self) -> usize {
        self.current_field_value()
            .map(|v| v.chars().count())
            .unwrap_or(0)
    }

    /// Move focus to the next field, validating the one being left.
    pub fn focus_next(&mut self) {
        let leaving = self.focus;
        self.focus = self.focus.next();
        self.cursor_pos = self.current_len();
        self.validate_field(leaving);
    }

    /// Move focus to the previous field, validating the one being left.
    pub fn focus_prev(&mut self) {
        let leaving = self.focus;
        self.focus = self.focus.prev();
        self.cursor_pos = self.current_len();
        self.validate_field(leaving);
    }

    pub fn insert_char(&mut self, c: char) {
        let cursor = self.cursor_pos;
        let Some(value) = self.current_field_mut() else {
            return;
        };
        let at = byte_offset(value, cursor);
        value.insert(at, c);
        self.cursor_pos += 1;
        self.clear_current_field_error();
    }

    /// Backspace.
    pub fn delete_char_before(&mut self) {
        if self.cursor_pos == 0 {
            return;
        }
        let cursor = self.cursor_pos;
        let Some(value) = self.current_field_mut() else {
            return;
        };
        let at = byte_offset(value, cursor - 1);
        value.remove(at);
        self.cursor_pos -= 1;
        self.clear_current_field_error();
    }

    /// Delete key.
    pub fn delete_char_at(&mut self) {
        let cursor = self.cursor_pos;
        let Some(value) = self.current_field_mut() else {
            return;
        };
        if cursor < value.chars().count() {
            let at = byte_offset(value, cursor);
            value.remove(at);
            self.clear_current_field_error();
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        if self.cursor_pos < self.current_len() {
            self.cursor_pos += 1;
        }
    }

    pub fn cursor_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor_pos = self.current_len();
    }

    pub fn has_validation_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    pub fn validate_field(&mut self, field: FormField) {
        let error = match field {
            FormField::Name => validate_template_name(&self.name),
            FormField::Message => validate_template_message(&self.message),
            _ => None,
        };

        if let Some(msg) = error {
            self.validation_errors.insert(field, msg);
        } else {
            self.validation_errors.remove(&field);
        }
    }

    pub fn validate_all(&mut self) {
        self.validate_field(FormField::Name);
        self.validate_field(FormField::Message);
    }

    fn clear_current_field_error(&mut self) {
        self.validation_errors.remove(&self.focus);
    }
}

/// Pending delete awaiting y/n.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirm {
    pub index: usize,
    pub name: String,
}

/// Apply the form to the store and close it.
///
/// Validation failures keep the form open. A persistence failure closes it
/// since the change is live in memory.
fn submit_template_form(app: &mut App) {
    let Some(form) = app.form.as_mut() else {
        return;
    };

    form.validate_all();
    if form.has_validation_errors() {
        return;
    }

    let mode = form.mode;
    let (name, message) = (form.name.clone(), form.message.clone());
    let result = match mode {
        FormMode::Add => app
            .store
            .create(&name, &message)
            .map(|t| format!("Added '{}'", t.name)),
        FormMode::Edit(index) => app
            .store
            .update(index, &name, &message)
            .map(|t| format!("Updated '{}'", t.name)),
    };

    match result {
        Err(StoreError::Validation(e)) => {
            if let Some(form) = app.form.as_mut() {
                form.error = Some(e);
            }
        }
        other => {
            debug!(?mode, ok = other.is_ok(), "template_form_submitted");
            app.form = None;
            if mode == FormMode::Add && other.is_ok() {
                app.selected = app.store.len().saturating_sub(1);
            }
            app.report_store_result(other);
        }
    }
}

/// Handle keyboard input for the template form.
pub fn handle_template_form_input(app: &mut App, key_code: KeyCode, modifiers: KeyModifiers) {
    let Some(state) = &mut app.form else {
        return;
    };

    if state.error.is_some() && key_code != KeyCode::Esc {
        state.error = None;
    }

    match key_code {
        KeyCode::Tab => {
            if modifiers.contains(KeyModifiers::SHIFT) {
                state.focus_prev();
            } else {
                state.focus_next();
            }
        }
        KeyCode::BackTab => state.focus_prev(),

        KeyCode::Esc => {
            app.form = None;
        }

        KeyCode::Enter
            if state.focus == FormField::Message
                && modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) =>
        {
            state.insert_char('\n')
        }

        KeyCode::Enter => match state.focus {
            FormField::SaveButton => submit_template_form(app),
            FormField::CancelButton => {
                app.form = None;
            }
            _ => state.focus_next(),
        },

        KeyCode::Char('s') if modifiers.contains(KeyModifiers::CONTROL) => {
            submit_template_form(app)
        }

        KeyCode::Char(c) => {
            if state.focus.is_text() {
                state.insert_char(c);
            }
        }

        KeyCode::Backspace => state.delete_char_before(),
        KeyCode::Delete => state.delete_char_at(),
        KeyCode::Left => state.cursor_left(),
        KeyCode::Right => state.cursor_right(),
        KeyCode::Home => state.cursor_home(),
        KeyCode::End => state.cursor_end(),

        KeyCode::Up => {
            if !state.focus.is_text() {
                state.focus_prev();
            }
        }
        KeyCode::Down => {
            if !state.focus.is_text() {
                state.focus_next();
            }
        }

        _ => {}
    }
}

/// Handle keyboard input for the delete confirmation.
pub fn handle_delete_confirm_input(app: &mut App, key_code: KeyCode) {
    let Some(confirm) = app.delete_confirm.take() else {
        return;
    };

    match key_code {
        KeyCode::Char('y') | KeyCode::Char('Y') => app.delete_template(confirm.index),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
        _ => app.delete_confirm = Some(confirm),
    }
}
