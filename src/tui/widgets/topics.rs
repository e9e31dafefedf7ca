use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::truncate;
use crate::models::TopicClassification;
use crate::tui::{App, GapRow};

pub fn class_color(class: TopicClassification) -> Color {
    match class {
        TopicClassification::Weak => Color::Red,
        TopicClassification::Unknown => Color::Magenta,
        TopicClassification::Developing => Color::Yellow,
        TopicClassification::Strong => Color::Green,
    }
}

fn flag_text(row: &GapRow) -> String {
    row.pattern
        .as_ref()
        .map(|p| {
            p.flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let title = if let Some(needle) = &app.filter_topic {
        format!(" Gaps (filter: {}) ", needle)
    } else {
        " Gaps ".to_string()
    };

    let items: Vec<ListItem> = app
        .gaps
        .items
        .iter()
        .map(|row| {
            let class_label = if row.overridden {
                format!("{}*", row.class.label())
            } else {
                row.class.label().to_string()
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<26}", truncate(&row.topic, 24)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<13}", class_label),
                    Style::default().fg(class_color(row.class)),
                ),
                Span::styled(
                    format!("{:<10}", row.attempts),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(flag_text(row), Style::default().fg(Color::Red)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    if items.is_empty() {
        let paragraph = Paragraph::new("No topics. Load a problem bank or log an attempt.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    }

    let bold_gray = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("{:<26}", "Topic"), bold_gray),
        Span::styled(format!("{:<13}", "Class"), bold_gray),
        Span::styled(format!("{:<10}", "Attempts"), bold_gray),
        Span::styled("Flags", bold_gray),
    ]);

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.gaps.selected);

    // Header sits on the first row inside the border
    let header_area = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: 1,
    };
    f.render_widget(Paragraph::new(header), header_area);

    let list_area = Rect {
        x: area.x,
        y: area.y + 1,
        width: area.width,
        height: area.height.saturating_sub(1),
    };

    f.render_stateful_widget(list, list_area, &mut state);
}
