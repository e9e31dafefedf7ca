mod ui;
mod widgets;

pub use widgets::truncate;

use std::io;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::behavior;
use crate::catalog::ProblemCatalog;
use crate::db::{Database, Stats};
use crate::gap;
use crate::models::{BehaviorEvent, BehaviorPattern, Day, RatingRecord, Target, TopicClassification};
use crate::progress;
use crate::sm2;

const DUE_PREVIEW: usize = 5;
const TOPIC_HISTORY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Gaps,
    TopicDetail,
    Plan,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Dashboard => View::Gaps,
            View::Gaps => View::Plan,
            View::TopicDetail => View::Gaps,
            View::Plan => View::Dashboard,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Dashboard => View::Plan,
            View::Gaps => View::Dashboard,
            View::TopicDetail => View::Gaps,
            View::Plan => View::Gaps,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.selected = Some(i);
    }

    fn first(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(0);
        }
    }

    fn last(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(self.items.len() - 1);
        }
    }

    fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

// One row of the gap view
#[derive(Debug, Clone, PartialEq)]
pub struct GapRow {
    pub topic: String,
    pub class: TopicClassification,
    pub overridden: bool,
    pub attempts: usize,
    pub pattern: Option<BehaviorPattern>,
}

/// Gap rows ordered weakest first, then by topic name.
pub fn build_gap_rows(
    ledger: &[RatingRecord],
    events: &[BehaviorEvent],
    overrides: &std::collections::BTreeMap<String, TopicClassification>,
    catalog: &ProblemCatalog,
    today: NaiveDate,
) -> Vec<GapRow> {
    let topics = gap::topic_universe(catalog.topics(), ledger, overrides);
    let classes = gap::classify(ledger, overrides, topics.iter().map(String::as_str), today);
    let mut patterns = behavior::analyze(events);

    let mut rows: Vec<GapRow> = classes
        .into_iter()
        .map(|(topic, class)| GapRow {
            overridden: overrides.contains_key(&topic),
            attempts: ledger.iter().filter(|r| r.topic == topic).count(),
            pattern: patterns.remove(&topic),
            class,
            topic,
        })
        .collect();
    rows.sort_by(|a, b| gap_rank(a.class).cmp(&gap_rank(b.class)).then_with(|| a.topic.cmp(&b.topic)));
    rows
}

fn gap_rank(class: TopicClassification) -> u8 {
    match class {
        TopicClassification::Weak => 0,
        TopicClassification::Unknown => 1,
        TopicClassification::Developing => 2,
        TopicClassification::Strong => 3,
    }
}

pub struct App {
    db: Database,
    catalog: ProblemCatalog,
    pub today: NaiveDate,
    pub view: View,
    pub stats: Stats,
    pub active: Option<Target>,
    pub due: Vec<RatingRecord>,
    pub gaps: StatefulList<GapRow>,
    pub days: StatefulList<Day>,
    pub selected_gap: Option<GapRow>,
    pub selected_topic_attempts: Vec<RatingRecord>,
    pub filter_topic: Option<String>,
    pub filter_input: String,
    pub filter_mode: bool,
    pub status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(db: Database, catalog: ProblemCatalog) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_today(db, catalog, Local::now().date_naive())
    }

    fn with_today(
        db: Database,
        catalog: ProblemCatalog,
        today: NaiveDate,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut app = Self {
            stats: db.get_stats(today, None)?,
            db,
            catalog,
            today,
            view: View::Dashboard,
            active: None,
            due: Vec::new(),
            gaps: StatefulList::with_items(Vec::new()),
            days: StatefulList::with_items(Vec::new()),
            selected_gap: None,
            selected_topic_attempts: Vec::new(),
            filter_topic: None,
            filter_input: String::new(),
            filter_mode: false,
            status: None,
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn refresh_data(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let ledger = self.db.list_attempts()?;
        self.stats = self.db.get_stats(self.today, None)?;
        self.due = sm2::due_reviews(&ledger, self.today)
            .into_iter()
            .take(DUE_PREVIEW)
            .cloned()
            .collect();
        self.active = self.db.active_target()?;
        self.days = StatefulList::with_items(
            self.active
                .as_ref()
                .and_then(|t| t.plan.as_ref())
                .map(|p| p.days.clone())
                .unwrap_or_default(),
        );
        self.apply_filter_with(&ledger)?;
        Ok(())
    }

    fn apply_filter(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let ledger = self.db.list_attempts()?;
        self.apply_filter_with(&ledger)
    }

    fn apply_filter_with(&mut self, ledger: &[RatingRecord]) -> Result<(), Box<dyn std::error::Error>> {
        let events = self.db.list_behavior_events()?;
        let overrides = self.db.list_overrides()?;
        let mut rows = build_gap_rows(ledger, &events, &overrides, &self.catalog, self.today);
        if let Some(needle) = &self.filter_topic {
            rows.retain(|r| r.topic.contains(needle.as_str()));
        }
        self.gaps = StatefulList::with_items(rows);
        Ok(())
    }

    fn select_topic(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(row) = self.gaps.selected_item() {
            let topic = row.topic.clone();
            self.selected_gap = Some(row.clone());
            let mut attempts: Vec<RatingRecord> = self
                .db
                .list_attempts()?
                .into_iter()
                .filter(|r| r.topic == topic)
                .collect();
            attempts.reverse();
            attempts.truncate(TOPIC_HISTORY);
            self.selected_topic_attempts = attempts;
            self.view = View::TopicDetail;
        }
        Ok(())
    }

    // Mark the highlighted plan day complete
    fn complete_selected_day(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(number) = self.days.selected_item().map(|d| d.number) else {
            return Ok(());
        };
        let Some(target) = self.active.as_mut() else {
            return Ok(());
        };
        let Some(plan) = target.plan.as_mut() else {
            return Ok(());
        };

        if progress::complete_day(plan, number)? {
            self.db.update_day_completion(&target.id, number, true)?;
            let s = progress::summary(plan);
            self.status = Some(format!("Day {} complete ({}/{})", number, s.done, s.total));
        } else {
            self.status = Some(format!("Day {} was already complete", number));
        }

        let selected = self.days.selected;
        self.days = StatefulList::with_items(plan.days.clone());
        self.days.selected = selected;
        Ok(())
    }

    fn leave_detail(&mut self) {
        self.view = View::Gaps;
        self.selected_gap = None;
        self.selected_topic_attempts.clear();
    }

    fn handle_key(
        &mut self,
        key: KeyCode,
        modifiers: KeyModifiers,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.filter_mode {
            match key {
                KeyCode::Esc => {
                    self.filter_mode = false;
                    self.filter_input.clear();
                }
                KeyCode::Enter => {
                    self.filter_mode = false;
                    self.filter_topic = if self.filter_input.is_empty() {
                        None
                    } else {
                        Some(self.filter_input.clone())
                    };
                    self.apply_filter()?;
                }
                KeyCode::Backspace => {
                    self.filter_input.pop();
                }
                KeyCode::Char(c) => {
                    self.filter_input.push(c);
                }
                _ => {}
            }
            return Ok(());
        }

        self.status = None;

        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data()?;
                self.status = Some("Refreshed".to_string());
            }

            KeyCode::Char('/') if self.view == View::Gaps => {
                self.filter_mode = true;
                self.filter_input.clear();
            }

            KeyCode::Esc => match self.view {
                View::TopicDetail => self.leave_detail(),
                View::Gaps if self.filter_topic.is_some() => {
                    self.filter_topic = None;
                    self.filter_input.clear();
                    self.apply_filter()?;
                }
                _ => {}
            },

            KeyCode::Char('h') | KeyCode::Left => match self.view {
                View::TopicDetail => self.leave_detail(),
                _ => self.view = self.view.prev(),
            },
            KeyCode::Char('l') | KeyCode::Right => match self.view {
                View::Gaps => self.select_topic()?,
                _ => self.view = self.view.next(),
            },

            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
            }

            KeyCode::Char('j') | KeyCode::Down => match self.view {
                View::Gaps => self.gaps.next(),
                View::Plan => self.days.next(),
                _ => {}
            },
            KeyCode::Char('k') | KeyCode::Up => match self.view {
                View::Gaps => self.gaps.previous(),
                View::Plan => self.days.previous(),
                _ => {}
            },

            KeyCode::Char('g') => match self.view {
                View::Gaps => self.gaps.first(),
                View::Plan => self.days.first(),
                _ => {}
            },
            KeyCode::Char('G') => match self.view {
                View::Gaps => self.gaps.last(),
                View::Plan => self.days.last(),
                _ => {}
            },

            KeyCode::Char('x') if self.view == View::Plan => self.complete_selected_day()?,

            KeyCode::Enter => {
                if self.view == View::Gaps {
                    self.select_topic()?;
                }
            }

            _ => {}
        }
        Ok(())
    }
}

pub fn run(db: Database, catalog: ProblemCatalog) -> Result<(), Box<dyn std::error::Error>> {
    // Load before touching the terminal so errors print normally
    let mut app = App::new(db, catalog)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers)?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intelligence, Problem};
    use std::collections::BTreeMap;

    fn day(s: &str) -> NaiveDate {
        crate::models::parse_date(s).unwrap()
    }

    fn catalog() -> ProblemCatalog {
        ProblemCatalog::from_problems(["arrays", "dp", "graphs"].iter().map(|t| Problem {
            slug: format!("{}-0", t),
            topic: t.to_string(),
            difficulty: "easy".to_string(),
            title: None,
        }))
    }

    fn setup_app() -> App {
        let db = Database::open(":memory:").unwrap();
        db.init().unwrap();
        App::with_today(db, catalog(), day("2026-03-02")).unwrap()
    }

    mod list_tests {
        use super::*;

        #[test]
        fn navigation_wraps() {
            let mut list = StatefulList::with_items(vec![1, 2, 3]);
            assert_eq!(list.selected, Some(0));
            list.previous();
            assert_eq!(list.selected, Some(2));
            list.next();
            assert_eq!(list.selected, Some(0));
            list.last();
            assert_eq!(list.selected_item(), Some(&3));
        }

        #[test]
        fn empty_list_stays_unselected() {
            let mut list: StatefulList<u8> = StatefulList::with_items(vec![]);
            list.next();
            list.first();
            assert!(list.selected.is_none());
            assert!(list.selected_item().is_none());
        }
    }

    mod gap_row_tests {
        use super::*;

        fn record(slug: &str, topic: &str, rating: u8) -> RatingRecord {
            RatingRecord {
                slug: slug.to_string(),
                topic: topic.to_string(),
                rating: Some(rating),
                difficulty: "easy".to_string(),
                date: "2026-03-01".to_string(),
                ease: 2.5,
                interval: 1,
                repetition: 1,
                next_review: Some("2026-03-02".to_string()),
            }
        }

        #[test]
        fn weakest_first() {
            let ledger = vec![
                record("a", "arrays", 5),
                record("b", "arrays", 5),
                record("c", "arrays", 5),
                record("d", "dp", 1),
            ];
            let mut overrides = BTreeMap::new();
            overrides.insert("graphs".to_string(), TopicClassification::Developing);

            let rows = build_gap_rows(&ledger, &[], &overrides, &catalog(), day("2026-03-01"));
            let order: Vec<(&str, TopicClassification)> =
                rows.iter().map(|r| (r.topic.as_str(), r.class)).collect();
            assert_eq!(
                order,
                vec![
                    ("dp", TopicClassification::Weak),
                    ("graphs", TopicClassification::Developing),
                    ("arrays", TopicClassification::Strong),
                ]
            );
            assert!(rows[1].overridden);
            assert_eq!(rows[2].attempts, 3);
        }
    }

    mod app_tests {
        use super::*;

        #[test]
        fn view_cycle() {
            let mut app = setup_app();
            assert_eq!(app.view, View::Dashboard);
            app.handle_key(KeyCode::Char('l'), KeyModifiers::NONE).unwrap();
            assert_eq!(app.view, View::Gaps);
            app.handle_key(KeyCode::Tab, KeyModifiers::NONE).unwrap();
            assert_eq!(app.view, View::Plan);
            app.handle_key(KeyCode::Char('h'), KeyModifiers::NONE).unwrap();
            assert_eq!(app.view, View::Gaps);
        }

        #[test]
        fn open_topic_detail_and_back() {
            let mut app = setup_app();
            app.view = View::Gaps;
            app.handle_key(KeyCode::Enter, KeyModifiers::NONE).unwrap();
            assert_eq!(app.view, View::TopicDetail);
            assert_eq!(app.selected_gap.as_ref().unwrap().topic, "arrays");

            app.handle_key(KeyCode::Esc, KeyModifiers::NONE).unwrap();
            assert_eq!(app.view, View::Gaps);
            assert!(app.selected_gap.is_none());
        }

        #[test]
        fn filter_topics() {
            let mut app = setup_app();
            app.view = View::Gaps;
            app.handle_key(KeyCode::Char('/'), KeyModifiers::NONE).unwrap();
            for c in "gra".chars() {
                app.handle_key(KeyCode::Char(c), KeyModifiers::NONE).unwrap();
            }
            app.handle_key(KeyCode::Enter, KeyModifiers::NONE).unwrap();
            assert_eq!(app.gaps.items.len(), 1);
            assert_eq!(app.gaps.items[0].topic, "graphs");

            app.handle_key(KeyCode::Esc, KeyModifiers::NONE).unwrap();
            assert_eq!(app.gaps.items.len(), 3);
        }

        #[test]
        fn complete_plan_day_from_plan_view() {
            let db = Database::open(":memory:").unwrap();
            db.init().unwrap();
            let mut target = db
                .add_target("TestCo", None, Some("2026-03-08"), &Intelligence::default())
                .unwrap();
            db.set_active_target(&target.id).unwrap();
            let now = day("2026-03-01").and_hms_opt(9, 0, 0).unwrap();
            crate::planner::generate_for_target(
                &mut target,
                &[],
                &BTreeMap::new(),
                &catalog(),
                &std::collections::HashSet::new(),
                now,
            )
            .unwrap();
            db.save_plan(&target.id, target.plan.as_ref().unwrap()).unwrap();

            let mut app = App::with_today(db, catalog(), day("2026-03-02")).unwrap();
            app.view = View::Plan;
            assert!(!app.days.items.is_empty());
            app.handle_key(KeyCode::Char('x'), KeyModifiers::NONE).unwrap();
            assert!(app.days.items[0].completed);

            app.refresh_data().unwrap();
            assert!(app.days.items[0].completed);
        }

        #[test]
        fn quit() {
            let mut app = setup_app();
            app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE).unwrap();
            assert!(app.should_quit);
        }
    }
}
