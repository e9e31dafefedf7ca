use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::truncate;
use crate::models::{DayType, Target};
use crate::progress;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9), // Stats + target row
            Constraint::Min(0),    // Today + due reviews
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let bottom_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    draw_stats(f, app, top_chunks[0]);
    draw_target(f, app, top_chunks[1]);
    draw_today(f, app, bottom_chunks[0]);
    draw_due_reviews(f, app, bottom_chunks[1]);
}

fn stat_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let text = vec![
        Line::from(vec![
            Span::styled("Attempts: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_attempts),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        stat_line("Solved", format!("{}", stats.unique_solved), Color::Green),
        stat_line("Week", format!("{}", stats.weekly_solved), Color::Green),
        stat_line(
            "Due",
            format!("{}", stats.due_now),
            if stats.due_now > 0 {
                Color::Yellow
            } else {
                Color::White
            },
        ),
        stat_line("Avg Rating", format!("{:.1}", stats.avg_rating), Color::Cyan),
        stat_line("Streak", format!("{}d", stats.streak_days), Color::Magenta),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Stats ")
        .title_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn target_lines(target: &Target) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            target.company.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            target
                .role
                .as_deref()
                .map(|r| format!("  {}", r))
                .unwrap_or_default(),
            Style::default().fg(Color::White),
        ),
    ])];

    lines.push(stat_line(
        "Interview",
        target
            .interview_date
            .clone()
            .unwrap_or_else(|| "not set".to_string()),
        Color::White,
    ));

    match &target.plan {
        Some(plan) => {
            let p = progress::summary(plan);
            lines.push(stat_line(
                "Plan",
                format!("{}/{} days", p.done, p.total),
                if p.done == p.total {
                    Color::Green
                } else {
                    Color::Cyan
                },
            ));
            lines.push(stat_line(
                "Mocks",
                format!(
                    "{}/{}",
                    plan.mock_sessions_completed, plan.mock_sessions_target
                ),
                Color::Magenta,
            ));
        }
        None => lines.push(Line::from(Span::styled(
            "No plan. Run `grind plan generate`.",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    lines
}

fn draw_target(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Target ")
        .title_style(Style::default().fg(Color::Yellow));

    let paragraph = match &app.active {
        Some(target) => Paragraph::new(target_lines(target)),
        None => Paragraph::new("No active target. Run `grind target add`.")
            .style(Style::default().fg(Color::DarkGray)),
    };
    f.render_widget(paragraph.block(block), area);
}

fn draw_today(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Next Up ")
        .title_style(Style::default().fg(Color::Green));

    let next = app
        .active
        .as_ref()
        .and_then(|t| t.plan.as_ref())
        .and_then(|p| p.days.iter().find(|d| !d.completed));

    let Some(day) = next else {
        let paragraph = Paragraph::new("Nothing scheduled")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let mut text = vec![
        Line::from(vec![
            Span::styled(
                format!("Day {} ", day.number),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                day.date.format("%b %d").to_string(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        stat_line("Type", day.kind.label().to_string(), Color::Cyan),
        stat_line("Focus", day.focus.clone(), Color::Yellow),
    ];

    if day.kind == DayType::Coding {
        for slug in &day.problems {
            text.push(Line::from(vec![
                Span::styled("• ", Style::default().fg(Color::Green)),
                Span::styled(truncate(slug, 40), Style::default().fg(Color::White)),
            ]));
        }
    }

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_due_reviews(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .due
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let overdue = record
                .next_review_date()
                .map(|d| (app.today - d).num_days())
                .unwrap_or(0);
            let style = if overdue > 0 {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Yellow)
            };

            ListItem::new(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<28}", truncate(&record.slug, 26)), style),
                Span::styled(
                    truncate(&record.topic, 16),
                    Style::default().fg(Color::Cyan),
                ),
            ]))
        })
        .collect();

    let title = if app.stats.due_now > app.due.len() {
        format!(" Due Reviews ({} of {}) ", app.due.len(), app.stats.due_now)
    } else {
        " Due Reviews ".to_string()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Yellow));

    if items.is_empty() {
        let paragraph = Paragraph::new("No reviews due")
            .style(Style::default().fg(Color::Green))
            .block(block);
        f.render_widget(paragraph, area);
    } else {
        let list = List::new(items).block(block);
        f.render_widget(list, area);
    }
}
