//! UI rendering functions.

use std::path::Path;

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Focus};
use crate::modals::{FormField, TemplateForm};

/// Contract a path by replacing the home directory with `~` for display.
pub fn contract_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(suffix) = path.strip_prefix(&home)
    {
        return format!("~/{}", suffix.display());
    }
    path.display().to_string()
}

/// Truncates a string to the given display width, appending "..." if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    // Replace newlines with spaces for single-line display
    let single_line: String = s.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();

    if single_line.width() <= max_width {
        return single_line;
    }

    let budget = max_width.saturating_sub(3);
    let mut width = 0;
    let mut out = String::new();
    for c in single_line.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let color = if focused { Color::Cyan } else { Color::DarkGray };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .title(title)
}

/// Draw the main UI.
pub fn draw_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Body
            Constraint::Length(1), // Status line
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    draw_template_list(f, app, body[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(body[1]);

    draw_recipient(f, app, right[0]);
    draw_preview(f, app, right[1]);
    draw_status_line(f, app, chunks[2]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "[s] Send  [i] Image  [p] Paste  [a/e/d] Add/Edit/Delete  [t] Test  [?] Help  [q] Quit",
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(footer, chunks[3]);

    if let Some(form) = &app.form {
        draw_template_form(f, form);
    } else if let Some(confirm) = &app.delete_confirm {
        draw_delete_confirm(f, &confirm.name);
    } else if app.show_help {
        draw_help_modal(f);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            "spam-reply",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("    Templates: "),
        Span::styled(
            contract_path(app.store.path()),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ];

    spans.push(Span::raw("    "));
    if let Some(error) = &app.session.logging_error {
        spans.push(Span::styled("⚠ ", Style::default().fg(Color::Yellow)));
        spans.push(Span::styled(error.as_str(), Style::default().fg(Color::Yellow)));
    } else {
        if let Some(session_id) = &app.session.session_id {
            spans.push(Span::raw("Session: "));
            spans.push(Span::styled(
                session_id.as_str(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        if let Some(log_dir) = &app.session.log_directory {
            spans.push(Span::raw("    Logs: "));
            spans.push(Span::styled(
                contract_path(log_dir),
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn draw_template_list(f: &mut Frame, app: &App, area: Rect) {
    let name_width = area.width.saturating_sub(6) as usize;
    let items: Vec<ListItem> = app
        .store
        .templates()
        .iter()
        .map(|t| ListItem::new(truncate_str(&t.name, name_width)))
        .collect();

    let list = List::new(items)
        .block(pane_block(" Templates ", app.focus == Focus::List))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_recipient(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Recipient;
    let mut spans = Vec::new();
    if app.recipient.is_empty() && !focused {
        spans.push(Span::styled(
            "Tab to type, p to paste",
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        spans.push(Span::styled(
            app.recipient.as_str(),
            Style::default().fg(Color::White),
        ));
    }
    if focused {
        spans.push(Span::styled(" ", Style::default().bg(Color::White)));
    }

    let input = Paragraph::new(Line::from(spans)).block(pane_block(" Recipient ", focused));
    f.render_widget(input, area);
}

fn draw_preview(f: &mut Frame, app: &App, area: Rect) {
    let text = app
        .store
        .get(app.selected)
        .map(|t| t.message.clone())
        .unwrap_or_default();

    let preview = Paragraph::new(text)
        .block(pane_block(" Message ", false))
        .wrap(Wrap { trim: false });
    f.render_widget(preview, area);
}

fn draw_status_line(f: &mut Frame, app: &App, area: Rect) {
    let Some(status) = &app.status else {
        return;
    };
    let line = Line::from(vec![
        Span::styled("● ", Style::default().fg(status.kind.color())),
        Span::styled(
            truncate_str(&status.text, area.width.saturating_sub(2) as usize),
            Style::default().fg(status.kind.color()),
        ),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

/// Render a text input, highlighting the cursor cell when focused.
/// Shown in place of a newline inside a one-line field.
const NEWLINE_GLYPH: char = '⏎';

fn render_field(value: &str, focused: bool, cursor_pos: usize) -> Vec<Span<'static>> {
    let value: String = value
        .chars()
        .map(|c| if c == '\n' { NEWLINE_GLYPH } else { c })
        .collect();
    if !focused {
        return vec![Span::styled(value, Style::default().fg(Color::White))];
    }

    let before: String = value.chars().take(cursor_pos).collect();
    let cursor_char = value
        .chars()
        .nth(cursor_pos)
        .map(String::from)
        .unwrap_or_else(|| " ".to_string());
    let rest: String = value.chars().skip(cursor_pos + 1).collect();

    vec![
        Span::styled(before, Style::default().fg(Color::White)),
        Span::styled(
            cursor_char,
            Style::default().fg(Color::Black).bg(Color::White),
        ),
        Span::styled(rest, Style::default().fg(Color::White)),
    ]
}

fn button(label: &str, focused: bool) -> Span<'static> {
    let style = if focused {
        Style::default().fg(Color::Black).bg(Color::Cyan)
    } else {
        Style::default().fg(Color::Cyan)
    };
    Span::styled(format!("[ {} ]", label), style)
}

/// Draw the add/edit template form.
pub fn draw_template_form(f: &mut Frame, form: &TemplateForm) {
    let modal_area = centered_rect(64, 14, f.area());
    f.render_widget(Clear, modal_area);

    let label_style = Style::default().fg(Color::DarkGray);
    let focused_label_style = Style::default().fg(Color::Cyan);
    let error_style = Style::default().fg(Color::Yellow);

    let mut content: Vec<Line> = Vec::new();
    for (field, label, value) in [
        (FormField::Name, "  Name:    ", form.name.as_str()),
        (FormField::Message, "  Message: ", form.message.as_str()),
    ] {
        let focused = form.focus == field;
        let style = if focused { focused_label_style } else { label_style };
        let mut line = vec![Span::styled(label, style)];
        line.extend(render_field(value, focused, form.cursor_pos));
        content.push(Line::from(line));
        if let Some(error) = form.validation_errors.get(&field) {
            content.push(Line::from(Span::styled(
                format!("           \u{26a0} {}", error),
                error_style,
            )));
        }
        content.push(Line::from(""));
    }

    content.push(Line::from(vec![
        Span::raw("  "),
        button("Save", form.focus == FormField::SaveButton),
        Span::raw("  "),
        button("Cancel", form.focus == FormField::CancelButton),
    ]));

    if let Some(error) = &form.error {
        content.push(Line::from(""));
        content.push(Line::from(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
        )));
    }

    let modal = Paragraph::new(content)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(form.title())
                .title_alignment(Alignment::Center)
                .style(Style::default().fg(Color::White)),
        );
    f.render_widget(modal, modal_area);
}

fn draw_delete_confirm(f: &mut Frame, name: &str) {
    let popup_area = centered_rect(50, 5, f.area());
    f.render_widget(Clear, popup_area);
    let popup = Paragraph::new(vec![
        Line::from(format!("Delete '{}'?", truncate_str(name, 34))),
        Line::from(Span::styled("[y] Yes  [n] No", Style::default().fg(Color::DarkGray))),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Confirm ")
            .style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(popup, popup_area);
}

/// Draw the keybinding help.
pub fn draw_help_modal(f: &mut Frame) {
    let modal_width: u16 = 50;
    let modal_height: u16 = 24;
    let modal_area = centered_rect(modal_width, modal_height, f.area());
    f.render_widget(Clear, modal_area);

    let key_style = Style::default().fg(Color::Cyan);
    let desc_style = Style::default().fg(Color::DarkGray);
    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::raw("    "),
            Span::styled(key, key_style),
            Span::styled(format!("  {}", desc), desc_style),
        ])
    };

    let inner_width = modal_width.saturating_sub(4) as usize;
    let footer_text = "? or Esc to close";
    let footer_padding = inner_width.saturating_sub(footer_text.len());

    let content: Vec<Line> = vec![
        Line::from(Span::styled("  Send", header_style)),
        entry("s/Enter", "Send selected template"),
        entry("i", "Send a random image"),
        entry("t", "Test Messages connection"),
        Line::from(""),
        Line::from(Span::styled("  Recipient", header_style)),
        entry("Tab", "Switch list/recipient focus"),
        entry("p/Ctrl+v", "Paste number from clipboard"),
        Line::from(""),
        Line::from(Span::styled("  Templates", header_style)),
        entry("j/k ↑/↓", "Select"),
        entry("a", "Add"),
        entry("e", "Edit"),
        entry("d", "Delete"),
        entry("r", "Reload from disk"),
        entry("Alt+Enter", "New line in a message"),
        Line::from(""),
        entry("q/Esc", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::raw(" ".repeat(footer_padding)),
            Span::styled(footer_text, desc_style),
        ]),
    ];

    let modal = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(Color::White)),
    );
    f.render_widget(modal, modal_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SessionInfo;
    use crate::delivery::DeliveryShim;
    use crate::delivery::tests::{FakeFetcher, FakeRunner};
    use crate::store::{CorruptPolicy, Preselect, Template, TemplateStore};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("line\nbreak", 20), "line break");
        assert_eq!(truncate_str("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_str_wide_chars() {
        // Each duck is two columns wide
        assert_eq!(truncate_str("🦆🦆🦆🦆", 8), "🦆🦆🦆🦆");
        assert_eq!(truncate_str("🦆🦆🦆🦆🦆", 8), "🦆🦆...");
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 40);
        assert_eq!(centered_rect(50, 10, area), Rect::new(25, 15, 50, 10));
        assert_eq!(centered_rect(200, 80, area), Rect::new(0, 0, 100, 40));
    }

    #[test]
    fn test_render_field_cursor() {
        let spans = render_field("🦆ab", true, 1);
        assert_eq!(spans[0].content, "🦆");
        assert_eq!(spans[1].content, "a");
        assert_eq!(spans[2].content, "b");

        let spans = render_field("ab", true, 2);
        assert_eq!(spans[1].content, " ");
    }

    #[test]
    fn test_render_field_shows_newlines() {
        let spans = render_field("a\nb", true, 1);
        assert_eq!(spans[0].content, "a");
        assert_eq!(spans[1].content, "⏎");
        assert_eq!(spans[2].content, "b");

        let spans = render_field("a\nb", false, 0);
        assert_eq!(spans[0].content, "a⏎b");
    }

    #[test]
    fn test_draw_ui_smoke() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::open(
            temp.path().join("responses.json"),
            vec![Template::new("Stop Request", "STOP").unwrap()],
            CorruptPolicy::Backup,
        );
        let shim = DeliveryShim::new(
            Box::new(FakeRunner::default()),
            Box::new(FakeFetcher::new(true)),
        );
        let mut app = App::new(store, shim, Vec::new(), &Preselect::default(), SessionInfo::default());

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw_ui(f, &app)).unwrap();
        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("Stop Request"));
        assert!(rendered.contains("STOP"));

        app.open_add_form();
        terminal.draw(|f| draw_ui(f, &app)).unwrap();
        app.form = None;
        app.show_help = true;
        terminal.draw(|f| draw_ui(f, &app)).unwrap();
    }
}
