use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Day, Plan};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Day {day} not in plan (1-{total}).")]
    DayOutOfRange { day: u32, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanProgress {
    pub done: usize,
    pub total: usize,
    pub next_day: Option<u32>,
}

fn is_solved(day: &Day, solved: &HashSet<String>) -> bool {
    !day.problems.is_empty() && day.problems.iter().all(|slug| solved.contains(slug))
}

/// Mark coding days complete once every scheduled problem has been solved.
///
/// Days without problems are left for `complete_day`. Returns whether any day
/// changed.
pub fn reconcile(plan: &mut Plan, solved: &HashSet<String>) -> bool {
    let mut changed = false;
    for day in plan.days.iter_mut().filter(|d| !d.completed) {
        if is_solved(day, solved) {
            day.completed = true;
            changed = true;
        }
    }

    if changed {
        let p = summary(plan);
        tracing::info!("Plan progress: {}/{} days complete", p.done, p.total);
    }
    changed
}

/// Mark a day complete by number. Returns false if it was already complete.
pub fn complete_day(plan: &mut Plan, day_number: u32) -> Result<bool, ProgressError> {
    let total = plan.days.len();
    let day = plan
        .days
        .iter_mut()
        .find(|d| d.number == day_number)
        .ok_or(ProgressError::DayOutOfRange {
            day: day_number,
            total,
        })?;

    if day.completed {
        return Ok(false);
    }
    day.completed = true;
    tracing::info!("Completed day {} ({})", day_number, day.focus);
    Ok(true)
}

pub fn record_mock_session(plan: &mut Plan) -> u32 {
    plan.mock_sessions_completed += 1;
    plan.mock_sessions_completed
}

pub fn summary(plan: &Plan) -> PlanProgress {
    PlanProgress {
        done: plan.days.iter().filter(|d| d.completed).count(),
        total: plan.days.len(),
        next_day: plan.days.iter().find(|d| !d.completed).map(|d| d.number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayType;
    use chrono::NaiveDate;

    fn make_day(number: u32, kind: DayType, problems: &[&str]) -> Day {
        Day {
            number,
            date: NaiveDate::from_ymd_opt(2026, 3, number).unwrap(),
            kind,
            problems: problems.iter().map(|s| s.to_string()).collect(),
            focus: "arrays".to_string(),
            completed: false,
        }
    }

    fn make_plan() -> Plan {
        Plan {
            generated_at: NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            days_remaining: 4,
            mock_sessions_target: 3,
            mock_sessions_completed: 0,
            days: vec![
                make_day(1, DayType::Coding, &["a", "b"]),
                make_day(2, DayType::Coding, &["c"]),
                make_day(3, DayType::Behavioral, &[]),
                make_day(4, DayType::Mock, &[]),
            ],
        }
    }

    fn solved(slugs: &[&str]) -> HashSet<String> {
        slugs.iter().map(|s| s.to_string()).collect()
    }

    mod reconcile_tests {
        use super::*;

        #[test]
        fn completes_fully_solved_day() {
            let mut plan = make_plan();
            assert!(reconcile(&mut plan, &solved(&["a", "b"])));
            assert!(plan.days[0].completed);
            assert!(!plan.days[1].completed);
        }

        #[test]
        fn partial_solve_is_not_enough() {
            let mut plan = make_plan();
            assert!(!reconcile(&mut plan, &solved(&["a", "c2"])));
            assert!(plan.days.iter().all(|d| !d.completed));
        }

        #[test]
        fn empty_days_are_never_auto_completed() {
            let mut plan = make_plan();
            reconcile(&mut plan, &solved(&["a", "b", "c"]));
            assert!(!plan.days[2].completed);
            assert!(!plan.days[3].completed);
        }

        #[test]
        fn second_pass_reports_no_change() {
            let mut plan = make_plan();
            assert!(reconcile(&mut plan, &solved(&["c"])));
            assert!(!reconcile(&mut plan, &solved(&["c"])));
        }

        #[test]
        fn completed_days_stay_completed() {
            let mut plan = make_plan();
            plan.days[0].completed = true;
            assert!(!reconcile(&mut plan, &HashSet::new()));
            assert!(plan.days[0].completed);
        }
    }

    mod complete_tests {
        use super::*;

        #[test]
        fn completes_behavioral_day() {
            let mut plan = make_plan();
            assert_eq!(complete_day(&mut plan, 3), Ok(true));
            assert!(plan.days[2].completed);
            assert_eq!(complete_day(&mut plan, 3), Ok(false));
        }

        #[test]
        fn unknown_day_number() {
            let mut plan = make_plan();
            assert_eq!(
                complete_day(&mut plan, 9),
                Err(ProgressError::DayOutOfRange { day: 9, total: 4 })
            );
            assert_eq!(
                complete_day(&mut plan, 0).unwrap_err().to_string(),
                "Day 0 not in plan (1-4)."
            );
        }

        #[test]
        fn mock_sessions_increment() {
            let mut plan = make_plan();
            assert_eq!(record_mock_session(&mut plan), 1);
            assert_eq!(record_mock_session(&mut plan), 2);
            assert_eq!(plan.mock_sessions_completed, 2);
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn fresh_plan() {
            let p = summary(&make_plan());
            assert_eq!(
                p,
                PlanProgress {
                    done: 0,
                    total: 4,
                    next_day: Some(1)
                }
            );
        }

        #[test]
        fn next_day_skips_completed() {
            let mut plan = make_plan();
            plan.days[0].completed = true;
            plan.days[2].completed = true;
            let p = summary(&plan);
            assert_eq!(p.done, 2);
            assert_eq!(p.next_day, Some(2));
        }

        #[test]
        fn finished_plan_has_no_next_day() {
            let mut plan = make_plan();
            for d in &mut plan.days {
                d.completed = true;
            }
            assert_eq!(summary(&plan).next_day, None);
        }
    }
}
