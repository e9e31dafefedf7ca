use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::catalog::ProblemCatalog;
use crate::gap;
use crate::models::{
    parse_date, Day, DayType, Plan, Problem, RatingRecord, Target, TopicClassification,
};

pub const PROBLEMS_PER_DAY: usize = 2;
pub const MIN_MOCK_SESSIONS: u32 = 3;

const MAX_MOCK_DAYS: u32 = 3;
const REPORTED_MIN_WEIGHT: f64 = 1.5;
const CODING_SHARE: f64 = 0.6;
const DESIGN_SHARE: f64 = 0.2;

pub const DESIGN_FOCUS: &str = "system-design";
pub const BEHAVIORAL_FOCUS: &str = "behavioral";
pub const MOCK_FOCUS: &str = "mock-interview";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Target '{0}' not found.")]
    TargetNotFound(String),
    #[error("Target has no interview_date. Set it: grind target update <id> --field interview_date --value YYYY-MM-DD")]
    MissingInterviewDate,
    #[error("Invalid date format: {0} (expected YYYY-MM-DD)")]
    InvalidInterviewDate(String),
    #[error("Problem bank is missing or empty; cannot generate plan.")]
    EmptyCatalog,
}

impl PlanError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, PlanError::EmptyCatalog)
    }
}

pub fn base_weight(class: TopicClassification) -> f64 {
    match class {
        TopicClassification::Unknown => 2.5,
        TopicClassification::Weak => 3.0,
        TopicClassification::Developing => 1.0,
        TopicClassification::Strong => 0.3,
    }
}

/// Scheduling weight per topic. Topics the company is known to ask about are
/// raised to at least 1.5.
pub fn topic_weights(
    classes: &BTreeMap<String, TopicClassification>,
    reported_topics: &HashSet<&str>,
) -> BTreeMap<String, f64> {
    classes
        .iter()
        .map(|(topic, class)| {
            let mut w = base_weight(*class);
            if reported_topics.contains(topic.as_str()) {
                w = w.max(REPORTED_MIN_WEIGHT);
            }
            (topic.clone(), w)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAllocation {
    pub coding: u32,
    pub design: u32,
    pub behavioral: u32,
    pub mock: u32,
}

impl DayAllocation {
    pub fn total(&self) -> u32 {
        self.coding + self.design + self.behavioral + self.mock
    }
}

pub fn allocate_days(days_remaining: u32, has_design_round: bool) -> DayAllocation {
    let mock = MAX_MOCK_DAYS.min(days_remaining / 7);
    let practice = days_remaining.saturating_sub(mock).max(1);
    let coding = (f64::from(practice) * CODING_SHARE).floor() as u32;
    let design = if has_design_round {
        (f64::from(practice) * DESIGN_SHARE).floor() as u32
    } else {
        0
    };

    DayAllocation {
        coding,
        design,
        behavioral: practice - coding - design,
        mock,
    }
}

struct Tier {
    topics: Vec<String>,
    cursor: usize,
}

// Weighted round-robin over per-topic problem queues
struct Scheduler<'a> {
    order: Vec<String>,
    tiers: Vec<Tier>,
    queues: HashMap<String, VecDeque<&'a Problem>>,
}

impl<'a> Scheduler<'a> {
    fn new(
        weights: &BTreeMap<String, f64>,
        catalog: &'a ProblemCatalog,
        solved: &HashSet<String>,
    ) -> Self {
        // BTreeMap iteration is lexical, so the stable sort breaks ties by name
        let mut order: Vec<String> = weights.keys().cloned().collect();
        order.sort_by(|a, b| weights[b].total_cmp(&weights[a]));

        let mut tiers: Vec<(i64, Tier)> = Vec::new();
        for topic in &order {
            let key = (weights[topic] * 10.0).round() as i64;
            match tiers.iter_mut().find(|(k, _)| *k == key) {
                Some((_, tier)) => tier.topics.push(topic.clone()),
                None => tiers.push((
                    key,
                    Tier {
                        topics: vec![topic.clone()],
                        cursor: 0,
                    },
                )),
            }
        }
        tiers.sort_by(|a, b| b.0.cmp(&a.0));

        let queues = order
            .iter()
            .map(|topic| {
                let queue = catalog
                    .problems(topic)
                    .iter()
                    .filter(|p| !solved.contains(&p.slug))
                    .collect();
                (topic.clone(), queue)
            })
            .collect();

        Self {
            order,
            tiers: tiers.into_iter().map(|(_, t)| t).collect(),
            queues,
        }
    }

    // At most one topic per tier, then backfill from any topic not used today
    fn pick_day(&mut self, n: usize) -> Vec<(&'a Problem, String)> {
        let mut picked: Vec<(&'a Problem, String)> = Vec::with_capacity(n);

        for tier in &mut self.tiers {
            if picked.len() >= n {
                break;
            }
            let len = tier.topics.len();
            for i in 0..len {
                let idx = (tier.cursor + i) % len;
                let topic = &tier.topics[idx];
                if let Some(problem) = self.queues.get_mut(topic).and_then(VecDeque::pop_front) {
                    picked.push((problem, topic.clone()));
                    tier.cursor = (idx + 1) % len;
                    break;
                }
            }
        }

        for topic in &self.order {
            if picked.len() >= n {
                break;
            }
            if picked.iter().any(|(_, t)| t == topic) {
                continue;
            }
            if let Some(problem) = self.queues.get_mut(topic).and_then(VecDeque::pop_front) {
                picked.push((problem, topic.clone()));
            }
        }

        picked
    }
}

fn push_day(days: &mut Vec<Day>, start: NaiveDate, kind: DayType, problems: Vec<String>, focus: &str) {
    let number = days.len() as u32 + 1;
    days.push(Day {
        number,
        date: start + Duration::days(i64::from(number) - 1),
        kind,
        problems,
        focus: focus.to_string(),
        completed: false,
    });
}

/// Build a day-by-day study plan for `target`.
///
/// Coding days draw from the weakest topics first, rotating through topics of
/// equal weight; design, behavioral and mock days follow in that order.
/// Coding days stop early once every topic queue is exhausted.
pub fn generate(
    target: &Target,
    ledger: &[RatingRecord],
    overrides: &BTreeMap<String, TopicClassification>,
    catalog: &ProblemCatalog,
    solved: &HashSet<String>,
    now: NaiveDateTime,
) -> Result<Plan, PlanError> {
    let date_str = target
        .interview_date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(PlanError::MissingInterviewDate)?;
    let interview_date =
        parse_date(date_str).ok_or_else(|| PlanError::InvalidInterviewDate(date_str.to_string()))?;
    if catalog.is_empty() {
        return Err(PlanError::EmptyCatalog);
    }

    let today = now.date();
    let days_remaining = (interview_date - today).num_days().max(1) as u32;

    let topics = catalog.topics();
    let classes = gap::classify(ledger, overrides, topics.iter().map(String::as_str), today);

    let reported: HashSet<&str> = target
        .intelligence
        .reported_problems
        .iter()
        .filter_map(|slug| catalog.topic_of(slug))
        .collect();
    let weights = topic_weights(&classes, &reported);

    let alloc = allocate_days(days_remaining, target.intelligence.has_design_round());
    tracing::debug!(
        days_remaining,
        coding = alloc.coding,
        design = alloc.design,
        behavioral = alloc.behavioral,
        mock = alloc.mock,
        "allocated plan days for {}",
        target.id
    );

    let mut scheduler = Scheduler::new(&weights, catalog, solved);
    let mut days = Vec::with_capacity(alloc.total() as usize);

    for _ in 0..alloc.coding {
        let picks = scheduler.pick_day(PROBLEMS_PER_DAY);
        let Some((_, focus)) = picks.first() else {
            tracing::debug!("problem queues exhausted after {} coding days", days.len());
            break;
        };
        let focus = focus.clone();
        let slugs = picks.iter().map(|(p, _)| p.slug.clone()).collect();
        push_day(&mut days, today, DayType::Coding, slugs, &focus);
    }
    for _ in 0..alloc.design {
        push_day(&mut days, today, DayType::SystemDesign, Vec::new(), DESIGN_FOCUS);
    }
    for _ in 0..alloc.behavioral {
        push_day(&mut days, today, DayType::Behavioral, Vec::new(), BEHAVIORAL_FOCUS);
    }
    for _ in 0..alloc.mock {
        push_day(&mut days, today, DayType::Mock, Vec::new(), MOCK_FOCUS);
    }

    Ok(Plan {
        generated_at: now,
        days_remaining,
        mock_sessions_target: MIN_MOCK_SESSIONS.max(days_remaining / 5),
        mock_sessions_completed: 0,
        days,
    })
}

/// Generate a plan and store it on the target, replacing any previous plan.
pub fn generate_for_target(
    target: &mut Target,
    ledger: &[RatingRecord],
    overrides: &BTreeMap<String, TopicClassification>,
    catalog: &ProblemCatalog,
    solved: &HashSet<String>,
    now: NaiveDateTime,
) -> Result<String, PlanError> {
    let plan = generate(target, ledger, overrides, catalog, solved, now)?;
    let message = format!(
        "Plan generated: {} days until {}",
        plan.days.len(),
        target.interview_date.as_deref().unwrap_or_default().trim()
    );
    target.plan = Some(plan);
    Ok(message)
}
