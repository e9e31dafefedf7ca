use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use super::topics::class_color;
use super::{format_num, format_rate, truncate};
use crate::models::BehaviorPattern;
use crate::tui::{App, GapRow};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(row) = &app.selected_gap else {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Topic Detail ");
        let paragraph = Paragraph::new("No topic selected").block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Classification
            Constraint::Length(8), // Behavior
            Constraint::Min(0),    // Attempts
        ])
        .split(area);

    draw_header(f, app, row, chunks[0]);
    draw_behavior(f, row.pattern.as_ref(), chunks[1]);
    draw_attempts(f, app, chunks[2]);
}

fn draw_header(f: &mut Frame, app: &App, row: &GapRow, area: Rect) {
    let problems = app.catalog.problems(&row.topic).len();
    let source = if row.overridden { "override" } else { "ledger" };

    let text = vec![
        Line::from(vec![
            Span::styled("Class: ", Style::default().fg(Color::Gray)),
            Span::styled(
                row.class.label(),
                Style::default()
                    .fg(class_color(row.class))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" ({})", source), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::styled("Attempts: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{}", row.attempts), Style::default().fg(Color::White)),
            Span::raw("  "),
            Span::styled("Bank: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} problems", problems),
                Style::default().fg(Color::White),
            ),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", row.topic))
        .title_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_behavior(f: &mut Frame, pattern: Option<&BehaviorPattern>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Behavior ")
        .title_style(Style::default().fg(Color::Cyan));

    let Some(p) = pattern else {
        let paragraph = Paragraph::new("No hint activity recorded")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let mut text = vec![
        Line::from(vec![
            Span::styled("Time to hint: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} min", format_num(p.avg_time_to_hint_min)),
                Style::default().fg(Color::White),
            ),
            Span::raw("  "),
            Span::styled("Hint level: ", Style::default().fg(Color::Gray)),
            Span::styled(format_num(p.avg_hint_level), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Effectiveness: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format_rate(p.hint_effectiveness),
                Style::default().fg(Color::White),
            ),
            Span::raw("  "),
            Span::styled("Calibration: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format_num(p.calibration_delta),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!("  ({} samples)", p.sample_count),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ];

    for flag in &p.flags {
        text.push(Line::from(vec![
            Span::styled("• ", Style::default().fg(Color::Red)),
            Span::styled(flag.as_str(), Style::default().fg(Color::Yellow)),
            Span::styled(
                format!(": {}", flag.advice()),
                Style::default().fg(Color::Gray),
            ),
        ]));
    }

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_attempts(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .selected_topic_attempts
        .iter()
        .map(|record| {
            let (rating_text, rating_color) = match record.rating {
                Some(r) if r >= 4 => (format!("{}/5", r), Color::Green),
                Some(3) => ("3/5".to_string(), Color::Yellow),
                Some(r) => (format!("{}/5", r), Color::Red),
                None => ("-".to_string(), Color::DarkGray),
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<12}", record.date),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<32}", truncate(&record.slug, 30)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<6}", rating_text),
                    Style::default().fg(rating_color),
                ),
                Span::styled(
                    record.next_review.as_deref().unwrap_or("-").to_string(),
                    Style::default().fg(Color::Cyan),
                ),
            ]))
        })
        .collect();

    let title = if app.selected_topic_attempts.is_empty() {
        " Recent Attempts (none) ".to_string()
    } else {
        format!(" Recent Attempts ({}) ", app.selected_topic_attempts.len())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Magenta));

    if items.is_empty() {
        let paragraph = Paragraph::new("No attempts yet. Log one with `grind log`.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
    } else {
        let list = List::new(items).block(block);
        f.render_widget(list, area);
    }
}
