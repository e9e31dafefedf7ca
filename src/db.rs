use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    parse_date, BehaviorEvent, Day, DayType, Intelligence, Plan, RatingRecord, Session,
    SessionClose, SessionProblem, Target, TopicClassification, DATE_FORMAT, TIMESTAMP_FORMAT,
};
use crate::sm2::{self, Sm2State};

const ACTIVE_TARGET_KEY: &str = "active_target";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Practice ledger: one row per attempt, append-only
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                topic TEXT NOT NULL DEFAULT '',
                difficulty TEXT NOT NULL DEFAULT '',
                rating INTEGER,
                date TEXT NOT NULL,
                ease REAL NOT NULL,
                interval INTEGER NOT NULL,
                repetition INTEGER NOT NULL,
                next_review TEXT
            );

            CREATE TABLE IF NOT EXISTS behavior_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                slug TEXT,
                topic TEXT NOT NULL,
                event TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS behavior_archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                slug TEXT,
                topic TEXT NOT NULL,
                event TEXT NOT NULL,
                payload TEXT NOT NULL,
                archived_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS targets (
                id TEXT PRIMARY KEY,
                company TEXT NOT NULL,
                role TEXT,
                interview_date TEXT,
                reported_problems TEXT NOT NULL DEFAULT '[]',
                rounds TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS plans (
                target_id TEXT PRIMARY KEY,
                generated_at TEXT NOT NULL,
                days_remaining INTEGER NOT NULL,
                mock_sessions_target INTEGER NOT NULL,
                mock_sessions_completed INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (target_id) REFERENCES targets(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS plan_days (
                target_id TEXT NOT NULL,
                day INTEGER NOT NULL,
                date TEXT NOT NULL,
                type TEXT NOT NULL CHECK(type IN ('coding', 'system-design', 'behavioral', 'mock')),
                problems TEXT NOT NULL DEFAULT '[]',
                focus TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (target_id, day),
                FOREIGN KEY (target_id) REFERENCES plans(target_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS gap_overrides (
                topic TEXT PRIMARY KEY,
                classification TEXT NOT NULL CHECK(classification IN ('unknown', 'weak', 'developing', 'strong')),
                set_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Practice sessions: clean_exit stays 0 until the session is closed
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                clean_exit INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS session_problems (
                session_id INTEGER NOT NULL,
                slug TEXT NOT NULL,
                topic TEXT NOT NULL DEFAULT '',
                difficulty TEXT NOT NULL DEFAULT '',
                rating INTEGER,
                logged INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (session_id, slug),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS session_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_slug ON attempts(slug);
            CREATE INDEX IF NOT EXISTS idx_attempts_date ON attempts(date);
            CREATE INDEX IF NOT EXISTS idx_behavior_ts ON behavior_events(ts);
            CREATE INDEX IF NOT EXISTS idx_behavior_topic ON behavior_events(topic);
            "#,
        )?;
        Ok(())
    }

    // Ledger operations

    /// Append an attempt, chaining SM-2 state from the slug's latest attempt.
    pub fn log_attempt(
        &self,
        slug: &str,
        topic: &str,
        difficulty: &str,
        rating: u8,
        date: NaiveDate,
    ) -> Result<RatingRecord> {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::Invalid(format!(
                "Rating must be 1-5, got {}",
                rating
            )));
        }

        let prev = self
            .conn
            .query_row(
                "SELECT ease, interval, repetition FROM attempts WHERE slug = ?1 ORDER BY id DESC LIMIT 1",
                params![slug],
                |row| {
                    Ok(Sm2State {
                        ease: row.get(0)?,
                        interval: row.get(1)?,
                        repetition: row.get(2)?,
                    })
                },
            )
            .optional()?
            .unwrap_or_default();

        let next = sm2::compute(rating, prev.ease, prev.interval, prev.repetition);
        let record = RatingRecord {
            slug: slug.to_string(),
            topic: topic.to_string(),
            rating: Some(rating),
            difficulty: difficulty.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            ease: next.ease,
            interval: next.interval,
            repetition: next.repetition,
            next_review: Some(
                (date + Duration::days(i64::from(next.interval)))
                    .format(DATE_FORMAT)
                    .to_string(),
            ),
        };

        self.conn.execute(
            r#"
            INSERT INTO attempts (slug, topic, difficulty, rating, date, ease, interval, repetition, next_review)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.slug,
                record.topic,
                record.difficulty,
                record.rating,
                record.date,
                record.ease,
                record.interval,
                record.repetition,
                record.next_review
            ],
        )?;
        tracing::info!(
            slug,
            rating,
            interval = record.interval,
            "logged attempt, next review {}",
            record.next_review.as_deref().unwrap_or("-")
        );

        Ok(record)
    }

    /// Full ledger in the order it was written.
    pub fn list_attempts(&self) -> Result<Vec<RatingRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT slug, topic, difficulty, rating, date, ease, interval, repetition, next_review
            FROM attempts
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RatingRecord {
                slug: row.get(0)?,
                topic: row.get(1)?,
                difficulty: row.get(2)?,
                rating: row.get(3)?,
                date: row.get(4)?,
                ease: row.get(5)?,
                interval: row.get(6)?,
                repetition: row.get(7)?,
                next_review: row.get(8)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn solved_slugs(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT slug FROM attempts")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<String>>>()?)
    }

    // Behavior log operations

    pub fn record_behavior_event(&self, event: &BehaviorEvent) -> Result<i64> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO behavior_events (ts, slug, topic, event, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.ts.format(TIMESTAMP_FORMAT).to_string(),
                event.slug,
                event.topic,
                event.kind.as_str(),
                payload
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Live behavior events, oldest first. Rows that fail to parse are skipped.
    pub fn list_behavior_events(&self) -> Result<Vec<BehaviorEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM behavior_events ORDER BY ts, id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str::<BehaviorEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("skipping behavior event {}: {}", id, e),
            }
        }
        Ok(events)
    }

    /// Move events strictly older than `before` into the archive table.
    pub fn archive_behavior_events(&self, before: NaiveDate) -> Result<usize> {
        let cutoff = before.format(DATE_FORMAT).to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO behavior_archive (ts, slug, topic, event, payload, archived_at)
            SELECT ts, slug, topic, event, payload, ?2
            FROM behavior_events
            WHERE ts < ?1
            ORDER BY id
            "#,
            params![cutoff, Utc::now().to_rfc3339()],
        )?;
        let moved = tx.execute("DELETE FROM behavior_events WHERE ts < ?1", params![cutoff])?;
        tx.commit()?;

        if moved > 0 {
            tracing::info!("archived {} behavior events before {}", moved, cutoff);
        }
        Ok(moved)
    }

    pub fn archived_event_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM behavior_archive", [], |row| row.get(0))?)
    }

    // Target operations

    pub fn next_target_id(&self, company: &str) -> Result<String> {
        let prefix = format!("{}-", company_slug(company));
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM targets WHERE substr(id, 1, ?2) = ?1")?;
        let rows = stmt.query_map(params![prefix, prefix.len() as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut highest = 0u32;
        for id in rows {
            let id = id?;
            if let Ok(n) = id[prefix.len()..].parse::<u32>() {
                highest = highest.max(n);
            }
        }
        Ok(format!("{}{:03}", prefix, highest + 1))
    }

    pub fn add_target(
        &self,
        company: &str,
        role: Option<&str>,
        interview_date: Option<&str>,
        intelligence: &Intelligence,
    ) -> Result<Target> {
        if let Some(date) = interview_date {
            validate_date(date)?;
        }

        let id = self.next_target_id(company)?;
        let created_at = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO targets (id, company, role, interview_date, reported_problems, rounds, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id,
                company,
                role,
                interview_date,
                serde_json::to_string(&intelligence.reported_problems)?,
                serde_json::to_string(&intelligence.rounds)?,
                created_at
            ],
        )?;
        tracing::info!("added target {} ({})", id, company);

        Ok(Target {
            id,
            company: company.to_string(),
            role: role.map(str::to_string),
            interview_date: interview_date.map(str::to_string),
            intelligence: intelligence.clone(),
            plan: None,
            created_at,
        })
    }

    pub fn get_target(&self, id: &str) -> Result<Option<Target>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, company, role, interview_date, reported_problems, rounds, created_at
                FROM targets
                WHERE id = ?1
                "#,
                params![id],
                TargetRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let plan = self.load_plan(id)?;
                Ok(Some(row.into_target(plan)?))
            }
            None => Ok(None),
        }
    }

    pub fn list_targets(&self) -> Result<Vec<Target>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, company, role, interview_date, reported_problems, rounds, created_at
            FROM targets
            ORDER BY created_at, id
            "#,
        )?;
        let rows = stmt
            .query_map([], TargetRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|row| {
                let plan = self.load_plan(&row.id)?;
                row.into_target(plan)
            })
            .collect()
    }

    /// Update one editable field. List fields take comma-separated values.
    pub fn update_target_field(&self, id: &str, field: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let changed = match field {
            "company" => self.conn.execute(
                "UPDATE targets SET company = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            "role" => self.conn.execute(
                "UPDATE targets SET role = ?1 WHERE id = ?2",
                params![none_if_empty(value), id],
            )?,
            "interview_date" => {
                if !value.is_empty() {
                    validate_date(value)?;
                }
                self.conn.execute(
                    "UPDATE targets SET interview_date = ?1 WHERE id = ?2",
                    params![none_if_empty(value), id],
                )?
            }
            "rounds" => self.conn.execute(
                "UPDATE targets SET rounds = ?1 WHERE id = ?2",
                params![serde_json::to_string(&split_list(value))?, id],
            )?,
            "reported_problems" => self.conn.execute(
                "UPDATE targets SET reported_problems = ?1 WHERE id = ?2",
                params![serde_json::to_string(&split_list(value))?, id],
            )?,
            other => {
                return Err(StoreError::Invalid(format!(
                    "Unknown field '{}'. Use: company, role, interview_date, rounds, reported_problems",
                    other
                )))
            }
        };

        if changed == 0 {
            return Err(target_not_found(id));
        }
        Ok(())
    }

    pub fn delete_target(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        if rows > 0 && self.active_target_id()?.as_deref() == Some(id) {
            self.conn.execute(
                "DELETE FROM settings WHERE key = ?1",
                params![ACTIVE_TARGET_KEY],
            )?;
        }
        Ok(rows > 0)
    }

    pub fn set_active_target(&self, id: &str) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM targets WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(target_not_found(id));
        }
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ACTIVE_TARGET_KEY, id],
        )?;
        Ok(())
    }

    pub fn active_target_id(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![ACTIVE_TARGET_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn active_target(&self) -> Result<Option<Target>> {
        match self.active_target_id()? {
            Some(id) => self.get_target(&id),
            None => Ok(None),
        }
    }

    // Plan operations

    /// Replace the target's plan and all of its days.
    pub fn save_plan(&self, target_id: &str, plan: &Plan) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM plan_days WHERE target_id = ?1", params![target_id])?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO plans (target_id, generated_at, days_remaining, mock_sessions_target, mock_sessions_completed)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                target_id,
                plan.generated_at.format(TIMESTAMP_FORMAT).to_string(),
                plan.days_remaining,
                plan.mock_sessions_target,
                plan.mock_sessions_completed
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO plan_days (target_id, day, date, type, problems, focus, completed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for day in &plan.days {
                stmt.execute(params![
                    target_id,
                    day.number,
                    day.date.format(DATE_FORMAT).to_string(),
                    day.kind.as_str(),
                    serde_json::to_string(&day.problems)?,
                    day.focus,
                    day.completed
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_plan(&self, target_id: &str) -> Result<Option<Plan>> {
        let header = self
            .conn
            .query_row(
                r#"
                SELECT generated_at, days_remaining, mock_sessions_target, mock_sessions_completed
                FROM plans
                WHERE target_id = ?1
                "#,
                params![target_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((generated_at, days_remaining, mock_target, mock_done)) = header else {
            return Ok(None);
        };
        let generated_at = NaiveDateTime::parse_from_str(&generated_at, TIMESTAMP_FORMAT)
            .map_err(|_| StoreError::Corrupt(format!("plan timestamp '{}'", generated_at)))?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT day, date, type, problems, focus, completed
            FROM plan_days
            WHERE target_id = ?1
            ORDER BY day
            "#,
        )?;
        let rows = stmt
            .query_map(params![target_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut days = Vec::with_capacity(rows.len());
        for (number, date, kind, problems, focus, completed) in rows {
            days.push(Day {
                number,
                date: parse_date(&date)
                    .ok_or_else(|| StoreError::Corrupt(format!("plan day date '{}'", date)))?,
                kind: DayType::from_str(&kind)
                    .ok_or_else(|| StoreError::Corrupt(format!("plan day type '{}'", kind)))?,
                problems: serde_json::from_str(&problems)?,
                focus,
                completed,
            });
        }

        Ok(Some(Plan {
            generated_at,
            days_remaining,
            mock_sessions_target: mock_target,
            mock_sessions_completed: mock_done,
            days,
        }))
    }

    pub fn update_day_completion(&self, target_id: &str, day: u32, completed: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE plan_days SET completed = ?1 WHERE target_id = ?2 AND day = ?3",
            params![completed, target_id, day],
        )?;
        Ok(rows > 0)
    }

    pub fn update_mock_sessions(&self, target_id: &str, completed: u32) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE plans SET mock_sessions_completed = ?1 WHERE target_id = ?2",
            params![completed, target_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!(
                "Target '{}' has no plan. Run: grind plan generate {}",
                target_id, target_id
            )));
        }
        Ok(())
    }

    // Gap override operations

    pub fn set_override(&self, topic: &str, class: TopicClassification) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO gap_overrides (topic, classification, set_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(topic) DO UPDATE SET classification = excluded.classification, set_at = excluded.set_at
            "#,
            params![topic, class.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn clear_override(&self, topic: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM gap_overrides WHERE topic = ?1", params![topic])?;
        Ok(rows > 0)
    }

    pub fn list_overrides(&self) -> Result<BTreeMap<String, TopicClassification>> {
        let mut stmt = self
            .conn
            .prepare("SELECT topic, classification FROM gap_overrides ORDER BY topic")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut overrides = BTreeMap::new();
        for row in rows {
            let (topic, class) = row?;
            match TopicClassification::from_str(&class) {
                Some(c) => {
                    overrides.insert(topic, c);
                }
                None => tracing::warn!("ignoring override for {}: unknown class '{}'", topic, class),
            }
        }
        Ok(overrides)
    }

    // Session operations

    /// Open a new practice session. Fails while an earlier one is still open.
    pub fn start_session(&self, now: NaiveDateTime) -> Result<Session> {
        if let Some(open) = self.open_session()? {
            return Err(StoreError::Invalid(format!(
                "Session {} is still open (started {}). Run `grind session end` or `grind session recover`.",
                open.id,
                open.started_at.format("%Y-%m-%d %H:%M")
            )));
        }

        self.conn.execute(
            "INSERT INTO sessions (started_at) VALUES (?1)",
            params![now.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!("started session {}", id);

        Ok(Session {
            id,
            started_at: now,
            ended_at: None,
            clean_exit: false,
            problems: Vec::new(),
            hint_events: Vec::new(),
        })
    }

    /// The latest session that was never closed.
    pub fn open_session(&self) -> Result<Option<Session>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sessions WHERE clean_exit = 0 ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => self.get_session(id),
            None => Ok(None),
        }
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let row = self
            .conn
            .query_row(
                "SELECT started_at, ended_at, clean_exit FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((started_at, ended_at, clean_exit)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT slug, topic, difficulty, rating, logged
            FROM session_problems
            WHERE session_id = ?1
            ORDER BY rowid
            "#,
        )?;
        let problems = stmt
            .query_map(params![id], |row| {
                Ok(SessionProblem {
                    slug: row.get(0)?,
                    topic: row.get(1)?,
                    difficulty: row.get(2)?,
                    rating: row.get(3)?,
                    logged: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM session_events WHERE session_id = ?1 ORDER BY id")?;
        let hint_events = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .map(|payload| serde_json::from_str(payload))
            .collect::<serde_json::Result<Vec<BehaviorEvent>>>()?;

        Ok(Some(Session {
            id,
            started_at: parse_timestamp(&started_at, "session start")?,
            ended_at: ended_at
                .as_deref()
                .map(|ts| parse_timestamp(ts, "session end"))
                .transpose()?,
            clean_exit,
            problems,
            hint_events,
        }))
    }

    /// Hold a behavior event until the session closes.
    pub fn add_session_event(&self, session_id: i64, event: &BehaviorEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session_events (session_id, payload) VALUES (?1, ?2)",
            params![session_id, serde_json::to_string(event)?],
        )?;
        Ok(())
    }

    /// Record (or re-record) a problem worked in the session.
    pub fn record_session_problem(&self, session_id: i64, problem: &SessionProblem) -> Result<()> {
        if let Some(rating) = problem.rating.filter(|r| !(1..=5).contains(r)) {
            return Err(StoreError::Invalid(format!(
                "Rating must be 1-5, got {}",
                rating
            )));
        }

        self.conn.execute(
            r#"
            INSERT INTO session_problems (session_id, slug, topic, difficulty, rating, logged)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id, slug) DO UPDATE SET
                topic = excluded.topic,
                difficulty = excluded.difficulty,
                rating = excluded.rating,
                logged = excluded.logged
            "#,
            params![
                session_id,
                problem.slug,
                problem.topic,
                problem.difficulty,
                problem.rating,
                problem.logged
            ],
        )?;
        Ok(())
    }

    /// Close a session: rated problems that never reached the ledger are
    /// logged on `log_date`, held hint events are flushed to the behavior log,
    /// and the session is marked as a clean exit.
    pub fn close_session(
        &self,
        session_id: i64,
        log_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<SessionClose> {
        let session = self
            .get_session(session_id)?
            .ok_or_else(|| StoreError::NotFound(format!("Session {} not found.", session_id)))?;
        if session.clean_exit {
            return Err(StoreError::Invalid(format!(
                "Session {} is already closed.",
                session_id
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut logged = Vec::new();
        for problem in session.unlogged() {
            if let Some(rating) = problem.rating {
                self.log_attempt(&problem.slug, &problem.topic, &problem.difficulty, rating, log_date)?;
                tx.execute(
                    "UPDATE session_problems SET logged = 1 WHERE session_id = ?1 AND slug = ?2",
                    params![session_id, problem.slug],
                )?;
                logged.push(problem.slug.clone());
            }
        }
        for event in &session.hint_events {
            self.record_behavior_event(event)?;
        }
        tx.execute(
            "DELETE FROM session_events WHERE session_id = ?1",
            params![session_id],
        )?;
        tx.execute(
            "UPDATE sessions SET clean_exit = 1, ended_at = ?2 WHERE id = ?1",
            params![session_id, now.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        tx.commit()?;

        tracing::info!(
            "closed session {}: {} events flushed, {} attempts logged",
            session_id,
            session.hint_events.len(),
            logged.len()
        );
        Ok(SessionClose {
            session_id,
            events_flushed: session.hint_events.len(),
            logged,
        })
    }

    // Stats

    /// Practice statistics, optionally restricted to one topic.
    pub fn get_stats(&self, today: NaiveDate, topic: Option<&str>) -> Result<Stats> {
        let total_attempts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE (?1 IS NULL OR topic = ?1)",
            params![topic],
            |row| row.get(0),
        )?;

        let unique_solved: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT slug) FROM attempts WHERE (?1 IS NULL OR topic = ?1)",
            params![topic],
            |row| row.get(0),
        )?;

        let week_start = (today - Duration::days(WEEK_DAYS - 1))
            .format(DATE_FORMAT)
            .to_string();
        let weekly_solved: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(DISTINCT slug) FROM attempts
            WHERE (?1 IS NULL OR topic = ?1) AND date >= ?2 AND date <= ?3
            "#,
            params![topic, week_start, today.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;

        let avg_rating: f64 = self.conn.query_row(
            "SELECT COALESCE(AVG(rating), 0) FROM attempts WHERE rating IS NOT NULL AND (?1 IS NULL OR topic = ?1)",
            params![topic],
            |row| row.get(0),
        )?;

        let ledger: Vec<RatingRecord> = self
            .list_attempts()?
            .into_iter()
            .filter(|r| topic.map_or(true, |t| r.topic == t))
            .collect();
        let due_now = sm2::due_reviews(&ledger, today).len();

        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT date FROM attempts WHERE (?1 IS NULL OR topic = ?1) ORDER BY date DESC",
        )?;
        let dates: Vec<NaiveDate> = stmt
            .query_map(params![topic], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .filter_map(|d| parse_date(d))
            .collect();

        Ok(Stats {
            topic: topic.map(str::to_string),
            total_attempts,
            unique_solved,
            weekly_solved,
            due_now,
            avg_rating,
            streak_days: streak(&dates, today),
            trends: topic_trends(&ledger),
        })
    }
}

const WEEK_DAYS: i64 = 7;
const TREND_MIN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub total_attempts: i64,
    pub unique_solved: i64,
    // Distinct problems attempted in the last seven days, today included
    pub weekly_solved: i64,
    pub due_now: usize,
    pub avg_rating: f64,
    pub streak_days: u32,
    pub trends: Vec<TopicTrend>,
}

/// Average rating of a topic's earlier attempts against its later ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicTrend {
    pub topic: String,
    pub attempts: usize,
    pub early_avg: f64,
    pub recent_avg: f64,
}

impl TopicTrend {
    pub fn arrow(&self) -> &'static str {
        if self.recent_avg > self.early_avg {
            "↑"
        } else if self.recent_avg < self.early_avg {
            "↓"
        } else {
            "="
        }
    }
}

// Ledger order splits each topic's ratings in half; odd counts put the extra one in the recent half
fn topic_trends(ledger: &[RatingRecord]) -> Vec<TopicTrend> {
    let mut by_topic: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in ledger.iter().filter(|r| !r.topic.is_empty()) {
        if let Some(rating) = record.rating {
            by_topic
                .entry(record.topic.as_str())
                .or_default()
                .push(f64::from(rating));
        }
    }

    by_topic
        .into_iter()
        .filter(|(_, ratings)| ratings.len() >= TREND_MIN_ATTEMPTS)
        .map(|(topic, ratings)| {
            let (early, recent) = ratings.split_at(ratings.len() / 2);
            TopicTrend {
                topic: topic.to_string(),
                attempts: ratings.len(),
                early_avg: mean(early),
                recent_avg: mean(recent),
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn parse_timestamp(value: &str, what: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|_| StoreError::Corrupt(format!("{} '{}'", what, value)))
}

// Consecutive practice days ending today, or yesterday if nothing logged yet today
fn streak(dates_desc: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut expected = match dates_desc.first() {
        Some(d) if *d == today => today,
        Some(d) if *d == today - Duration::days(1) => *d,
        _ => return 0,
    };

    let mut count = 0;
    for date in dates_desc {
        if *date != expected {
            break;
        }
        count += 1;
        expected -= Duration::days(1);
    }
    count
}

struct TargetRow {
    id: String,
    company: String,
    role: Option<String>,
    interview_date: Option<String>,
    reported_problems: String,
    rounds: String,
    created_at: String,
}

impl TargetRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            company: row.get(1)?,
            role: row.get(2)?,
            interview_date: row.get(3)?,
            reported_problems: row.get(4)?,
            rounds: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_target(self, plan: Option<Plan>) -> Result<Target> {
        Ok(Target {
            id: self.id,
            company: self.company,
            role: self.role,
            interview_date: self.interview_date,
            intelligence: Intelligence {
                reported_problems: serde_json::from_str(&self.reported_problems)?,
                rounds: serde_json::from_str(&self.rounds)?,
            },
            plan,
            created_at: self.created_at,
        })
    }
}

/// Lowercase alphanumeric runs joined by dashes: "BMW Group" -> "bmw-group".
pub fn company_slug(company: &str) -> String {
    let slug = company
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "target".to_string()
    } else {
        slug
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn none_if_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn validate_date(value: &str) -> Result<NaiveDate> {
    parse_date(value).ok_or_else(|| {
        StoreError::Invalid(format!(
            "Invalid date format: {} (expected YYYY-MM-DD)",
            value
        ))
    })
}

fn target_not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("Target '{}' not found.", id))
}
