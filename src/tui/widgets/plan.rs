use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::truncate;
use crate::models::{Day, DayType};
use crate::progress;
use crate::tui::App;

fn kind_color(kind: DayType) -> Color {
    match kind {
        DayType::Coding => Color::Cyan,
        DayType::SystemDesign => Color::Blue,
        DayType::Behavioral => Color::Magenta,
        DayType::Mock => Color::Yellow,
    }
}

fn day_item(day: &Day) -> ListItem<'static> {
    let (mark, mark_color) = if day.completed {
        ("[x] ", Color::Green)
    } else {
        ("[ ] ", Color::DarkGray)
    };
    let problems = day.problems.join(", ");

    ListItem::new(Line::from(vec![
        Span::styled(mark, Style::default().fg(mark_color)),
        Span::styled(
            format!("{:<5}", day.number),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("{:<8}", day.date.format("%b %d")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{:<15}", day.kind.label()),
            Style::default().fg(kind_color(day.kind)),
        ),
        Span::styled(
            format!("{:<18}", truncate(&day.focus, 16)),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(truncate(&problems, 60), Style::default().fg(Color::Gray)),
    ]))
}

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(target) = &app.active else {
        let block = Block::default().borders(Borders::ALL).title(" Plan ");
        let paragraph = Paragraph::new("No active target. Run `grind target add`.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let Some(plan) = &target.plan else {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Plan: {} ", target.company));
        let paragraph = Paragraph::new("No plan yet. Run `grind plan generate`.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let p = progress::summary(plan);
    let title = format!(
        " Plan: {} ({}/{} days, mocks {}/{}) ",
        target.company, p.done, p.total, plan.mock_sessions_completed, plan.mock_sessions_target
    );

    let items: Vec<ListItem> = app.days.items.iter().map(day_item).collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    let bold_gray = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("{:<4}{:<5}", "", "Day"), bold_gray),
        Span::styled(format!("{:<8}", "Date"), bold_gray),
        Span::styled(format!("{:<15}", "Type"), bold_gray),
        Span::styled(format!("{:<18}", "Focus"), bold_gray),
        Span::styled("Problems", bold_gray),
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
    state.select(app.days.selected);

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
