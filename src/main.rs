mod behavior;
mod catalog;
mod config;
mod db;
mod gap;
mod models;
mod planner;
mod progress;
mod sm2;
mod tui;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catalog::ProblemCatalog;
use config::{Config, LOG_ENV};
use db::Database;
use models::{
    parse_date, BehaviorEvent, BehaviorEventKind, BehaviorFlag, Intelligence, JsonOutput,
    SessionClose, SessionProblem, Target, TopicClassification,
};
use planner::PlanError;
use tui::truncate;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "grind")]
#[command(about = "Gap-driven interview prep: practice ledger, topic gaps and day-by-day study plans")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Database path (overrides GRIND_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Problem bank path (overrides GRIND_PROBLEMS)
    #[arg(long, global = true)]
    problems: Option<PathBuf>,

    /// Log state changes to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Log a practice attempt
    Log {
        /// Problem slug
        slug: String,

        /// Recall rating 1-5 (1 = blank, 5 = effortless)
        #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,

        /// Topic (defaults to the problem bank entry)
        #[arg(long, short)]
        topic: Option<String>,

        /// Difficulty (defaults to the problem bank entry)
        #[arg(long)]
        difficulty: Option<String>,

        /// Attempt date YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// List problems due for review
    Due,

    /// Topic gap analysis
    #[command(subcommand)]
    Gap(GapCommands),

    /// Coaching behavior log
    #[command(subcommand)]
    Behavior(BehaviorCommands),

    /// Manage interview targets
    #[command(subcommand)]
    Target(TargetCommands),

    /// Study plans
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Practice sessions: hold hint events until the sitting ends
    #[command(subcommand)]
    Session(SessionCommands),

    /// Show practice statistics
    Stats {
        /// Only count attempts on this topic
        #[arg(long, short)]
        topic: Option<String>,
    },

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Subcommand)]
enum GapCommands {
    /// Classify every topic
    Show,

    /// Pin a topic's classification
    Set {
        /// Topic name
        topic: String,

        /// unknown/weak/developing/strong
        classification: String,
    },

    /// Remove a pinned classification
    Clear {
        /// Topic name
        topic: String,
    },
}

#[derive(Subcommand)]
enum BehaviorCommands {
    /// Show per-topic patterns and flags
    Show,

    /// Record that a hint was given
    Hint {
        /// Topic name
        topic: String,

        /// Hint level 1-4
        #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=4))]
        level: u8,

        /// Minutes spent before asking
        #[arg(long, short)]
        minutes: f64,

        /// Problem slug
        #[arg(long, short)]
        slug: Option<String>,
    },

    /// Record whether a hint helped
    Assess {
        /// Topic name
        topic: String,

        /// Whether the hint was effective
        #[arg(long, short, action = clap::ArgAction::Set)]
        effective: bool,

        /// Hint level being assessed
        #[arg(long, short)]
        level: Option<u8>,

        /// Problem slug
        #[arg(long, short)]
        slug: Option<String>,
    },

    /// Record a self-rating next to the rating the hints suggest
    Calibrate {
        /// Topic name
        topic: String,

        /// Rating you gave yourself
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        self_rating: u8,

        /// Rating expected from the hints used
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        expected: u8,

        /// Problem slug
        #[arg(long, short)]
        slug: Option<String>,
    },

    /// Move old events out of the live log
    Archive {
        /// Archive events before YYYY-MM-DD (defaults to 90 days ago)
        #[arg(long)]
        before: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a practice session
    Start,

    /// Show the open session
    Show,

    /// Record a hint given during the session
    Event {
        /// Topic name
        topic: String,

        /// Hint level 1-4
        #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=4))]
        level: u8,

        /// Minutes spent before asking
        #[arg(long, short)]
        minutes: f64,

        /// Problem slug
        #[arg(long, short)]
        slug: Option<String>,
    },

    /// Rate a problem without logging it yet
    Rate {
        /// Problem slug
        slug: String,

        /// Recall rating 1-5
        #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,

        /// Topic (defaults to the problem bank entry)
        #[arg(long, short)]
        topic: Option<String>,
    },

    /// End the session: log rated problems and flush hint events
    End,

    /// Close a session left open by an earlier run
    Recover,
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Add a target company (becomes the active target)
    Add {
        /// Company name
        company: String,

        /// Role title
        #[arg(long, short)]
        role: Option<String>,

        /// Interview date YYYY-MM-DD
        #[arg(long, short)]
        date: Option<String>,

        /// Comma-separated interview rounds
        #[arg(long)]
        rounds: Option<String>,

        /// Comma-separated slugs the company is known to ask
        #[arg(long)]
        reported: Option<String>,
    },

    /// List targets
    List,

    /// Show target details
    Show {
        /// Target ID
        id: String,
    },

    /// Make a target active
    Use {
        /// Target ID
        id: String,
    },

    /// Update one target field
    Update {
        /// Target ID
        id: String,

        /// company/role/interview_date/rounds/reported_problems
        #[arg(long, short)]
        field: String,

        /// New value (comma-separated for lists)
        #[arg(long)]
        value: String,
    },

    /// Delete a target and its plan
    Delete {
        /// Target ID
        id: String,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Generate (or regenerate) a plan
    Generate {
        /// Target ID (defaults to the active target)
        id: Option<String>,
    },

    /// Show a plan
    Show {
        /// Target ID (defaults to the active target)
        id: Option<String>,
    },

    /// Mark a day complete
    Complete {
        /// Day number
        day: u32,

        /// Target ID (defaults to the active target)
        id: Option<String>,
    },

    /// Record a finished mock interview
    Mock {
        /// Target ID (defaults to the active target)
        id: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // The TUI owns the terminal; log lines would corrupt the alternate screen
    if !matches!(cli.command, Commands::Tui) {
        init_logging(cli.verbose);
    }

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            match serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                Ok(out) => println!("{}", out),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = Config::from_env(cli.db, cli.problems);
    config.ensure_db_dir()?;
    let db = Database::open(&config.db_path)?;
    db.init()?;

    let today = Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "db_path": config.db_path,
                        "problems_path": config.problems_path
                    })))?
                );
            } else {
                println!("Database initialized at: {}", config.db_path.display());
                println!("Problem bank expected at: {}", config.problems_path.display());
            }
        }

        Commands::Log {
            slug,
            rating,
            topic,
            difficulty,
            date,
        } => {
            let catalog = load_catalog(&config);
            let entry = catalog.find(&slug);
            let topic = topic
                .or_else(|| entry.map(|p| p.topic.clone()))
                .unwrap_or_default();
            let difficulty = difficulty
                .or_else(|| entry.map(|p| p.difficulty.clone()))
                .unwrap_or_default();
            let date = match date {
                Some(d) => parse_date(&d)
                    .ok_or_else(|| format!("Invalid date format: {} (expected YYYY-MM-DD)", d))?,
                None => today,
            };

            let record = db.log_attempt(&slug, &topic, &difficulty, rating, date)?;
            if let Some(session) = db.open_session()? {
                let problem = SessionProblem {
                    slug: slug.clone(),
                    topic: topic.clone(),
                    difficulty: difficulty.clone(),
                    rating: Some(rating),
                    logged: true,
                };
                db.record_session_problem(session.id, &problem)?;
            }
            let progress = reconcile_active_plan(&db)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "record": record,
                        "plan_progress": progress
                    })))?
                );
            } else {
                println!(
                    "Logged {} (rating {}). Next review: {} (in {} day{})",
                    record.slug,
                    rating,
                    record.next_review.as_deref().unwrap_or("-"),
                    record.interval,
                    if record.interval == 1 { "" } else { "s" }
                );
                if topic.is_empty() {
                    println!("No topic known for '{}'; pass --topic to include it in gap analysis.", slug);
                }
                if let Some(p) = progress {
                    println!("Plan progress: {}/{} days complete", p.done, p.total);
                }
            }
        }

        Commands::Due => {
            let ledger = db.list_attempts()?;
            let due = sm2::due_reviews(&ledger, today);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&due))?);
            } else if due.is_empty() {
                println!("Nothing due for review.");
            } else {
                println!("{:<40} {:<20} {:<12} EASE", "SLUG", "TOPIC", "DUE");
                println!("{}", "-".repeat(80));
                for r in due {
                    println!(
                        "{:<40} {:<20} {:<12} {:.2}",
                        truncate(&r.slug, 38),
                        truncate(if r.topic.is_empty() { "-" } else { r.topic.as_str() }, 18),
                        r.next_review.as_deref().unwrap_or("-"),
                        r.ease
                    );
                }
            }
        }

        Commands::Gap(gap_cmd) => match gap_cmd {
            GapCommands::Show => {
                let catalog = load_catalog(&config);
                let ledger = db.list_attempts()?;
                let overrides = db.list_overrides()?;
                let topics = gap::topic_universe(catalog.topics(), &ledger, &overrides);
                let classes = gap::classify(
                    &ledger,
                    &overrides,
                    topics.iter().map(String::as_str),
                    today,
                );
                let patterns = behavior::analyze(&db.list_behavior_events()?);

                if cli.json {
                    let data: BTreeMap<&String, serde_json::Value> = classes
                        .iter()
                        .map(|(topic, class)| {
                            let flags = patterns
                                .get(topic)
                                .map(|p| p.flags.iter().map(BehaviorFlag::as_str).collect())
                                .unwrap_or_else(Vec::new);
                            (
                                topic,
                                serde_json::json!({
                                    "classification": class,
                                    "overridden": overrides.contains_key(topic),
                                    "flags": flags
                                }),
                            )
                        })
                        .collect();
                    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
                } else if classes.is_empty() {
                    println!("No topics yet. Add a problem bank or log some attempts.");
                } else {
                    println!("{:<28} {:<12} FLAGS", "TOPIC", "CLASS");
                    println!("{}", "-".repeat(70));
                    for (topic, class) in &classes {
                        let pinned = if overrides.contains_key(topic) { "*" } else { "" };
                        let flags = patterns
                            .get(topic)
                            .map(|p| {
                                p.flags
                                    .iter()
                                    .map(BehaviorFlag::as_str)
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            })
                            .filter(|f| !f.is_empty())
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{:<28} {:<12} {}",
                            truncate(topic, 26),
                            format!("{}{}", class.as_str(), pinned),
                            flags
                        );
                    }
                    if !overrides.is_empty() {
                        println!();
                        println!("* pinned with `grind gap set`");
                    }
                }
            }

            GapCommands::Set {
                topic,
                classification,
            } => {
                let class = TopicClassification::from_str(&classification).ok_or_else(|| {
                    format!(
                        "Invalid classification '{}'. Use: unknown, weak, developing, or strong",
                        classification
                    )
                })?;
                db.set_override(&topic, class)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Pinned {} as {}.", topic, class.label());
                }
            }

            GapCommands::Clear { topic } => {
                let cleared = db.clear_override(&topic)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(cleared))?);
                } else if cleared {
                    println!("Cleared override for {}.", topic);
                } else {
                    println!("No override set for {}.", topic);
                }
            }
        },

        Commands::Behavior(behavior_cmd) => match behavior_cmd {
            BehaviorCommands::Show => {
                let patterns = behavior::analyze(&db.list_behavior_events()?);
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&patterns))?);
                } else if patterns.is_empty() {
                    println!("No hint events recorded yet.");
                } else {
                    println!(
                        "{:<24} {:>5} {:>8} {:>7} {:>6} {:>6}  FLAGS",
                        "TOPIC", "HINTS", "AVG_MIN", "AVG_LVL", "EFF", "CAL"
                    );
                    println!("{}", "-".repeat(80));
                    for (topic, p) in &patterns {
                        println!(
                            "{:<24} {:>5} {:>8} {:>7} {:>6} {:>6}  {}",
                            truncate(topic, 22),
                            p.sample_count,
                            fmt_opt(p.avg_time_to_hint_min),
                            fmt_opt(p.avg_hint_level),
                            fmt_opt(p.hint_effectiveness),
                            fmt_opt(p.calibration_delta),
                            p.flags
                                .iter()
                                .map(BehaviorFlag::as_str)
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                    }
                    for (topic, p) in &patterns {
                        for flag in &p.flags {
                            println!("  {}: {}", topic, flag.advice());
                        }
                    }
                }
            }

            BehaviorCommands::Hint {
                topic,
                level,
                minutes,
                slug,
            } => {
                if !minutes.is_finite() || minutes < 0.0 {
                    return Err(format!("Invalid minutes '{}'. Use a non-negative number", minutes).into());
                }
                let kind = BehaviorEventKind::HintGiven {
                    hint_level: level,
                    time_to_hint_min: minutes,
                };
                record_event(&db, cli.json, topic, slug, kind)?;
            }

            BehaviorCommands::Assess {
                topic,
                effective,
                level,
                slug,
            } => {
                let kind = BehaviorEventKind::HintAssessed {
                    hint_level: level,
                    effective,
                };
                record_event(&db, cli.json, topic, slug, kind)?;
            }

            BehaviorCommands::Calibrate {
                topic,
                self_rating,
                expected,
                slug,
            } => {
                let kind = BehaviorEventKind::RatingCalibration {
                    self_rating,
                    expected_rating: expected,
                };
                record_event(&db, cli.json, topic, slug, kind)?;
            }

            BehaviorCommands::Archive { before } => {
                let before = match before {
                    Some(d) => Some(parse_date(&d).ok_or_else(|| {
                        format!("Invalid date format: {} (expected YYYY-MM-DD)", d)
                    })?),
                    None => None,
                };
                let cutoff = behavior::archive_cutoff(before, today);
                let moved = db.archive_behavior_events(cutoff)?;

                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "archived": moved,
                            "before": cutoff,
                            "archive_total": db.archived_event_count()?
                        })))?
                    );
                } else {
                    println!("Archived {} events from before {}.", moved, cutoff);
                }
            }
        },

        Commands::Target(target_cmd) => match target_cmd {
            TargetCommands::Add {
                company,
                role,
                date,
                rounds,
                reported,
            } => {
                let intelligence = Intelligence {
                    reported_problems: reported.as_deref().map(db::split_list).unwrap_or_default(),
                    rounds: rounds.as_deref().map(db::split_list).unwrap_or_default(),
                };
                let target =
                    db.add_target(&company, role.as_deref(), date.as_deref(), &intelligence)?;
                db.set_active_target(&target.id)?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&target))?);
                } else {
                    println!("Added target '{}' with ID: {} (now active)", company, target.id);
                    if target.interview_date.is_none() {
                        println!(
                            "Set the interview date before generating a plan: grind target update {} --field interview_date --value YYYY-MM-DD",
                            target.id
                        );
                    }
                }
            }

            TargetCommands::List => {
                let targets = db.list_targets()?;
                let active = db.active_target_id()?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "active": active,
                            "targets": targets
                        })))?
                    );
                } else if targets.is_empty() {
                    println!("No targets found.");
                } else {
                    println!(
                        "  {:<22} {:<20} {:<16} {:<12} PLAN",
                        "ID", "COMPANY", "ROLE", "INTERVIEW"
                    );
                    println!("{}", "-".repeat(84));
                    for t in &targets {
                        let marker = if active.as_deref() == Some(t.id.as_str()) { "*" } else { " " };
                        let plan = t
                            .plan
                            .as_ref()
                            .map(|p| {
                                let s = progress::summary(p);
                                format!("{}/{}", s.done, s.total)
                            })
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{} {:<22} {:<20} {:<16} {:<12} {}",
                            marker,
                            truncate(&t.id, 20),
                            truncate(&t.company, 18),
                            truncate(t.role.as_deref().unwrap_or("-"), 14),
                            t.interview_date.as_deref().unwrap_or("-"),
                            plan
                        );
                    }
                }
            }

            TargetCommands::Show { id } => {
                let target = find_target(&db, Some(&id))?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&target))?);
                } else {
                    print_target(&target, today);
                }
            }

            TargetCommands::Use { id } => {
                db.set_active_target(&id)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Active target: {}", id);
                }
            }

            TargetCommands::Update { id, field, value } => {
                db.update_target_field(&id, &field, &value)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Updated {} for target {}.", field, id);
                }
            }

            TargetCommands::Delete { id } => {
                if db.delete_target(&id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Target {} deleted.", id);
                    }
                } else {
                    return Err(PlanError::TargetNotFound(id).into());
                }
            }
        },

        Commands::Plan(plan_cmd) => match plan_cmd {
            PlanCommands::Generate { id } => {
                let mut target = find_target(&db, id.as_deref())?;
                let catalog = load_catalog(&config);
                let ledger = db.list_attempts()?;
                let overrides = db.list_overrides()?;
                let solved = db.solved_slugs()?;

                let message = planner::generate_for_target(
                    &mut target,
                    &ledger,
                    &overrides,
                    &catalog,
                    &solved,
                    Local::now().naive_local(),
                )?;
                if let Some(plan) = &target.plan {
                    db.save_plan(&target.id, plan)?;
                }

                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "message": message,
                            "plan": target.plan
                        })))?
                    );
                } else {
                    println!("{}", message);
                    println!("Run `grind plan show` to see the schedule.");
                }
            }

            PlanCommands::Show { id } => {
                let target = find_target(&db, id.as_deref())?;
                let plan = target.plan.as_ref().ok_or_else(|| no_plan(&target.id))?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(plan))?);
                } else {
                    let summary = progress::summary(plan);
                    println!(
                        "=== Plan for {} ({}) ===",
                        target.company,
                        target.interview_date.as_deref().unwrap_or("-")
                    );
                    println!(
                        "Progress: {}/{} days | Mock interviews: {}/{}",
                        summary.done,
                        summary.total,
                        plan.mock_sessions_completed,
                        plan.mock_sessions_target
                    );
                    println!();
                    println!("{:<4} {:<11} {:<14} {:<16} {:<5} PROBLEMS", "DAY", "DATE", "TYPE", "FOCUS", "DONE");
                    println!("{}", "-".repeat(90));
                    for day in &plan.days {
                        let marker = if day.date == today { ">" } else { "" };
                        println!(
                            "{:<4} {:<11} {:<14} {:<16} {:<5} {}",
                            format!("{}{}", marker, day.number),
                            day.date,
                            day.kind.label(),
                            truncate(&day.focus, 14),
                            if day.completed { "[x]" } else { "[ ]" },
                            if day.problems.is_empty() {
                                "-".to_string()
                            } else {
                                day.problems.join(", ")
                            }
                        );
                    }
                }
            }

            PlanCommands::Complete { day, id } => {
                let mut target = find_target(&db, id.as_deref())?;
                let plan = target.plan.as_mut().ok_or_else(|| no_plan(&target.id))?;
                let changed = progress::complete_day(plan, day)?;
                if changed {
                    db.update_day_completion(&target.id, day, true)?;
                }
                let summary = progress::summary(plan);

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&summary))?);
                } else if changed {
                    println!("Day {} complete. Progress: {}/{} days", day, summary.done, summary.total);
                } else {
                    println!("Day {} was already complete.", day);
                }
            }

            PlanCommands::Mock { id } => {
                let mut target = find_target(&db, id.as_deref())?;
                let plan = target.plan.as_mut().ok_or_else(|| no_plan(&target.id))?;
                let completed = progress::record_mock_session(plan);
                db.update_mock_sessions(&target.id, completed)?;

                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "mock_sessions_completed": completed,
                            "mock_sessions_target": plan.mock_sessions_target
                        })))?
                    );
                } else {
                    println!(
                        "Mock interviews: {}/{}",
                        completed, plan.mock_sessions_target
                    );
                }
            }
        },

        Commands::Session(session_cmd) => run_session(&db, &config, session_cmd, cli.json, today)?,

        Commands::Stats { topic } => {
            let stats = db.get_stats(today, topic.as_deref())?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else if stats.total_attempts == 0 {
                match &stats.topic {
                    Some(t) => println!("No problems logged for {} yet.", t),
                    None => println!("No problems logged yet."),
                }
            } else {
                match &stats.topic {
                    Some(t) => println!("=== Practice Statistics: {} ===", t),
                    None => println!("=== Practice Statistics ==="),
                }
                println!("Attempts logged: {}", stats.total_attempts);
                println!("Problems solved: {}", stats.unique_solved);
                println!("Weekly: {} solved in the last 7 days", stats.weekly_solved);
                println!("Due for review: {}", stats.due_now);
                println!("Average rating: {:.1}/5", stats.avg_rating);
                println!("Streak: {} day{}", stats.streak_days, if stats.streak_days == 1 { "" } else { "s" });

                if !stats.trends.is_empty() {
                    println!();
                    println!("Rating trend (earlier → recent):");
                    for t in &stats.trends {
                        println!(
                            "  {:<24} {:.1} → {:.1} {} ({} attempts)",
                            truncate(&t.topic, 22),
                            t.early_avg,
                            t.recent_avg,
                            t.arrow(),
                            t.attempts
                        );
                    }
                }
            }
        }

        Commands::Tui => {
            let catalog = load_catalog(&config);
            tui::run(db, catalog)?;
        }
    }

    Ok(())
}

// A missing or broken bank degrades to an empty catalog; plan generation reports it
fn load_catalog(config: &Config) -> ProblemCatalog {
    ProblemCatalog::load(&config.problems_path).unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        ProblemCatalog::default()
    })
}

fn find_target(db: &Database, id: Option<&str>) -> CliResult<Target> {
    match id {
        Some(id) => Ok(db
            .get_target(id)?
            .ok_or_else(|| PlanError::TargetNotFound(id.to_string()))?),
        None => Ok(db
            .active_target()?
            .ok_or("No active target. Add one with `grind target add` or pick one with `grind target use <id>`.")?),
    }
}

fn no_plan(id: &str) -> String {
    format!("Target '{}' has no plan. Run: grind plan generate {}", id, id)
}

// Auto-complete plan days whose problems have all been solved
fn reconcile_active_plan(db: &Database) -> CliResult<Option<progress::PlanProgress>> {
    let Some(mut target) = db.active_target()? else {
        return Ok(None);
    };
    let Some(plan) = target.plan.as_mut() else {
        return Ok(None);
    };

    let solved = db.solved_slugs()?;
    if !progress::reconcile(plan, &solved) {
        return Ok(None);
    }
    db.save_plan(&target.id, plan)?;
    Ok(Some(progress::summary(plan)))
}

fn record_event(
    db: &Database,
    json: bool,
    topic: String,
    slug: Option<String>,
    kind: BehaviorEventKind,
) -> CliResult<()> {
    let event = BehaviorEvent {
        ts: Local::now().naive_local(),
        slug,
        topic,
        kind,
    };
    db.record_behavior_event(&event)?;

    if json {
        println!("{}", serde_json::to_string(&JsonOutput::ok(&event))?);
    } else {
        println!("Recorded {} for {}.", event.kind.as_str(), event.topic);
    }
    Ok(())
}

fn print_target(target: &Target, today: NaiveDate) {
    println!("Target: {} ({})", target.company, target.id);
    if let Some(role) = &target.role {
        println!("Role: {}", role);
    }
    match target.interview_date.as_deref().and_then(parse_date) {
        Some(date) => println!(
            "Interview: {} ({} days away)",
            date,
            (date - today).num_days()
        ),
        None => println!(
            "Interview: {}",
            target.interview_date.as_deref().unwrap_or("-")
        ),
    }
    println!(
        "Rounds: {}",
        if target.intelligence.rounds.is_empty() {
            "-".to_string()
        } else {
            target.intelligence.rounds.join(", ")
        }
    );
    println!(
        "Reported problems: {}",
        if target.intelligence.reported_problems.is_empty() {
            "-".to_string()
        } else {
            target.intelligence.reported_problems.join(", ")
        }
    );
    println!("Created: {}", target.created_at);

    if let Some(plan) = &target.plan {
        let summary = progress::summary(plan);
        println!();
        println!("--- Plan ---");
        println!("Generated: {}", plan.generated_at.format("%Y-%m-%d %H:%M"));
        println!("Progress: {}/{} days", summary.done, summary.total);
        if let Some(next) = summary.next_day {
            println!("Next: day {}", next);
        }
        println!(
            "Mock interviews: {}/{}",
            plan.mock_sessions_completed, plan.mock_sessions_target
        );
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{}", v)).unwrap_or_else(|| "-".to_string())
}

fn run_session(
    db: &Database,
    config: &Config,
    cmd: SessionCommands,
    json: bool,
    today: NaiveDate,
) -> CliResult<()> {
    let now = Local::now().naive_local();

    match cmd {
        SessionCommands::Start => {
            let session = db.start_session(now)?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&session))?);
            } else {
                println!("Session {} started.", session.id);
            }
        }

        SessionCommands::Show => {
            let session = db.open_session()?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&session))?);
                return Ok(());
            }
            let Some(session) = session else {
                println!("No open session.");
                return Ok(());
            };
            println!(
                "Session {} (started {})",
                session.id,
                session.started_at.format("%Y-%m-%d %H:%M")
            );
            println!("Hint events held: {}", session.hint_events.len());
            for p in &session.problems {
                println!(
                    "  {:<32} {:<6} {}",
                    truncate(&p.slug, 30),
                    p.rating.map(|r| format!("{}/5", r)).unwrap_or_else(|| "-".to_string()),
                    if p.logged { "logged" } else { "not logged" }
                );
            }
        }

        SessionCommands::Event {
            topic,
            level,
            minutes,
            slug,
        } => {
            if !minutes.is_finite() || minutes < 0.0 {
                return Err(format!("Invalid minutes '{}'. Use a non-negative number", minutes).into());
            }
            let session = db.open_session()?.ok_or(NO_SESSION)?;
            let event = BehaviorEvent {
                ts: now,
                slug,
                topic,
                kind: BehaviorEventKind::HintGiven {
                    hint_level: level,
                    time_to_hint_min: minutes,
                },
            };
            db.add_session_event(session.id, &event)?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&event))?);
            } else {
                println!("Held hint for {} in session {}.", event.topic, session.id);
            }
        }

        SessionCommands::Rate {
            slug,
            rating,
            topic,
        } => {
            let session = db.open_session()?.ok_or(NO_SESSION)?;
            let catalog = load_catalog(config);
            let entry = catalog.find(&slug);
            let problem = SessionProblem {
                topic: topic
                    .or_else(|| entry.map(|p| p.topic.clone()))
                    .unwrap_or_default(),
                difficulty: entry.map(|p| p.difficulty.clone()).unwrap_or_default(),
                slug,
                rating: Some(rating),
                logged: false,
            };
            db.record_session_problem(session.id, &problem)?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&problem))?);
            } else {
                println!("Rated {} {}/5; it is logged when the session ends.", problem.slug, rating);
            }
        }

        SessionCommands::End => {
            let session = db.open_session()?.ok_or(NO_SESSION)?;
            let closed = db.close_session(session.id, today, now)?;
            let progress = reconcile_active_plan(db)?;
            print_session_close(&closed, json, "ended")?;
            if !json {
                if let Some(p) = progress {
                    println!("Plan progress: {}/{} days complete", p.done, p.total);
                }
            }
        }

        SessionCommands::Recover => match db.open_session()? {
            Some(session) => {
                // Attempts are dated to the day the session was worked
                let closed = db.close_session(session.id, session.started_at.date(), now)?;
                reconcile_active_plan(db)?;
                print_session_close(&closed, json, "recovered")?;
            }
            None => {
                if json {
                    println!("{}", serde_json::to_string(&JsonOutput::<Option<()>>::ok(None))?);
                } else {
                    println!("Nothing to recover.");
                }
            }
        },
    }
    Ok(())
}

const NO_SESSION: &str = "No open session. Start one with `grind session start`.";

fn print_session_close(closed: &SessionClose, json: bool, verb: &str) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string(&JsonOutput::ok(closed))?);
        return Ok(());
    }
    println!(
        "Session {} {}: {} hint event{} flushed.",
        closed.session_id,
        verb,
        closed.events_flushed,
        if closed.events_flushed == 1 { "" } else { "s" }
    );
    if !closed.logged.is_empty() {
        println!("Logged rated problems: {}", closed.logged.join(", "));
    }
    Ok(())
}
