use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};

use crate::models::{BehaviorEvent, BehaviorEventKind, BehaviorFlag, BehaviorPattern};

const QUICK_GIVE_UP_MIN: f64 = 5.0;
const CHRONIC_HINT_LEVEL: f64 = 2.5;
const HINT_POSITIVE_RATE: f64 = 0.75;
const HINT_NEGATIVE_RATE: f64 = 0.40;
const OVERCONFIDENT_DELTA: f64 = 1.5;

pub const DEFAULT_ARCHIVE_DAYS: i64 = 90;

#[derive(Default)]
struct Samples {
    hint_times: Vec<f64>,
    hint_levels: Vec<f64>,
    effective: Vec<bool>,
    calibration: Vec<f64>,
}

/// Per-topic coaching patterns from the behavior log.
///
/// Only topics with at least one `hint_given` event are reported; a topic that
/// only shows up in assessments or calibrations has no entry.
pub fn analyze(events: &[BehaviorEvent]) -> BTreeMap<String, BehaviorPattern> {
    let mut by_topic: HashMap<&str, Samples> = HashMap::new();

    for event in events {
        let samples = by_topic.entry(event.topic.as_str()).or_default();
        match &event.kind {
            BehaviorEventKind::HintGiven {
                hint_level,
                time_to_hint_min,
            } => {
                samples.hint_times.push(*time_to_hint_min);
                samples.hint_levels.push(f64::from(*hint_level));
            }
            BehaviorEventKind::HintAssessed { effective, .. } => {
                samples.effective.push(*effective);
            }
            BehaviorEventKind::RatingCalibration {
                self_rating,
                expected_rating,
            } => {
                let delta = (f64::from(*self_rating) - f64::from(*expected_rating)).abs();
                samples.calibration.push(delta);
            }
        }
    }

    by_topic
        .into_iter()
        .filter(|(_, s)| !s.hint_levels.is_empty())
        .map(|(topic, s)| (topic.to_string(), pattern_for(&s)))
        .collect()
}

fn pattern_for(s: &Samples) -> BehaviorPattern {
    let avg_time = mean(&s.hint_times);
    let avg_level = mean(&s.hint_levels);
    let eff_rate = if s.effective.is_empty() {
        None
    } else {
        Some(s.effective.iter().filter(|e| **e).count() as f64 / s.effective.len() as f64)
    };
    let cal_delta = mean(&s.calibration);

    let mut flags = BTreeSet::new();
    if avg_time.is_some_and(|t| t < QUICK_GIVE_UP_MIN) {
        flags.insert(BehaviorFlag::QuickGiveUp);
    }
    if avg_level.is_some_and(|l| l > CHRONIC_HINT_LEVEL) {
        flags.insert(BehaviorFlag::ChronicHint);
    }
    if eff_rate.is_some_and(|r| r > HINT_POSITIVE_RATE) {
        flags.insert(BehaviorFlag::HintPositive);
    }
    if eff_rate.is_some_and(|r| r < HINT_NEGATIVE_RATE) {
        flags.insert(BehaviorFlag::HintNegative);
    }
    if cal_delta.is_some_and(|d| d > OVERCONFIDENT_DELTA) {
        flags.insert(BehaviorFlag::Overconfident);
    }

    BehaviorPattern {
        avg_time_to_hint_min: avg_time.map(|v| round_to(v, 1)),
        avg_hint_level: avg_level.map(|v| round_to(v, 2)),
        hint_effectiveness: eff_rate.map(|v| round_to(v, 2)),
        calibration_delta: cal_delta.map(|v| round_to(v, 1)),
        sample_count: s.hint_levels.len(),
        flags,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Cutoff for archiving: events strictly before this date are moved out.
pub fn archive_cutoff(before: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    before.unwrap_or_else(|| today - Duration::days(DEFAULT_ARCHIVE_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 18)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn hint_given(topic: &str, hint_level: u8, minutes: f64) -> BehaviorEvent {
        BehaviorEvent {
            ts: ts(),
            slug: Some("some-problem".to_string()),
            topic: topic.to_string(),
            kind: BehaviorEventKind::HintGiven {
                hint_level,
                time_to_hint_min: minutes,
            },
        }
    }

    fn hint_assessed(topic: &str, effective: bool) -> BehaviorEvent {
        BehaviorEvent {
            ts: ts(),
            slug: Some("some-problem".to_string()),
            topic: topic.to_string(),
            kind: BehaviorEventKind::HintAssessed {
                hint_level: Some(1),
                effective,
            },
        }
    }

    fn calibration(topic: &str, self_rating: u8, expected_rating: u8) -> BehaviorEvent {
        BehaviorEvent {
            ts: ts(),
            slug: None,
            topic: topic.to_string(),
            kind: BehaviorEventKind::RatingCalibration {
                self_rating,
                expected_rating,
            },
        }
    }

    mod flag_tests {
        use super::*;

        #[test]
        fn quick_give_up_flag() {
            let events = vec![
                hint_given("dp", 1, 3.0),
                hint_given("dp", 2, 4.0),
                hint_given("dp", 1, 2.0),
            ];
            let patterns = analyze(&events);
            assert!(patterns["dp"].flags.contains(&BehaviorFlag::QuickGiveUp));
            assert_eq!(patterns["dp"].avg_time_to_hint_min, Some(3.0));
        }

        #[test]
        fn no_quick_give_up_when_slow() {
            let events = vec![hint_given("dp", 1, 10.0), hint_given("dp", 2, 10.0)];
            let patterns = analyze(&events);
            assert!(!patterns["dp"].flags.contains(&BehaviorFlag::QuickGiveUp));
        }

        #[test]
        fn quick_give_up_boundary_is_strict() {
            let events = vec![hint_given("dp", 1, 4.0), hint_given("dp", 1, 6.0)];
            let patterns = analyze(&events);
            assert_eq!(patterns["dp"].avg_time_to_hint_min, Some(5.0));
            assert!(!patterns["dp"].flags.contains(&BehaviorFlag::QuickGiveUp));
        }

        #[test]
        fn chronic_hint_flag() {
            let events = vec![
                hint_given("graphs", 3, 8.0),
                hint_given("graphs", 4, 10.0),
                hint_given("graphs", 3, 7.0),
            ];
            let patterns = analyze(&events);
            assert!(patterns["graphs"].flags.contains(&BehaviorFlag::ChronicHint));
            assert_eq!(patterns["graphs"].avg_hint_level, Some(3.33));
        }

        #[test]
        fn hint_positive_flag() {
            let events = vec![
                hint_given("strings", 1, 9.0),
                hint_given("strings", 2, 11.0),
                hint_assessed("strings", true),
                hint_assessed("strings", true),
                hint_assessed("strings", true),
                hint_assessed("strings", true),
            ];
            let patterns = analyze(&events);
            assert!(patterns["strings"].flags.contains(&BehaviorFlag::HintPositive));
            assert_eq!(patterns["strings"].hint_effectiveness, Some(1.0));
        }

        #[test]
        fn hint_negative_flag() {
            let events = vec![
                hint_given("dp", 2, 8.0),
                hint_given("dp", 3, 10.0),
                hint_assessed("dp", false),
                hint_assessed("dp", false),
                hint_assessed("dp", true),
            ];
            let patterns = analyze(&events);
            assert!(patterns["dp"].flags.contains(&BehaviorFlag::HintNegative));
            assert!(!patterns["dp"].flags.contains(&BehaviorFlag::HintPositive));
            assert_eq!(patterns["dp"].hint_effectiveness, Some(0.33));
        }

        #[test]
        fn effectiveness_at_positive_threshold_is_not_flagged() {
            let events = vec![
                hint_given("heaps", 2, 10.0),
                hint_assessed("heaps", true),
                hint_assessed("heaps", true),
                hint_assessed("heaps", true),
                hint_assessed("heaps", false),
            ];
            let patterns = analyze(&events);
            assert_eq!(patterns["heaps"].hint_effectiveness, Some(0.75));
            assert!(!patterns["heaps"].flags.contains(&BehaviorFlag::HintPositive));
            assert!(!patterns["heaps"].flags.contains(&BehaviorFlag::HintNegative));
        }

        #[test]
        fn effectiveness_at_negative_threshold_is_not_flagged() {
            let events = vec![
                hint_given("tries", 2, 10.0),
                hint_assessed("tries", true),
                hint_assessed("tries", true),
                hint_assessed("tries", false),
                hint_assessed("tries", false),
                hint_assessed("tries", false),
            ];
            let patterns = analyze(&events);
            assert_eq!(patterns["tries"].hint_effectiveness, Some(0.4));
            assert!(!patterns["tries"].flags.contains(&BehaviorFlag::HintNegative));
            assert!(!patterns["tries"].flags.contains(&BehaviorFlag::HintPositive));
        }

        #[test]
        fn overconfident_flag() {
            let events = vec![
                hint_given("arrays", 1, 8.0),
                hint_given("arrays", 2, 10.0),
                calibration("arrays", 4, 2),
                calibration("arrays", 5, 2),
                calibration("arrays", 4, 2),
                calibration("arrays", 5, 3),
            ];
            let patterns = analyze(&events);
            assert!(patterns["arrays"].flags.contains(&BehaviorFlag::Overconfident));
            assert_eq!(patterns["arrays"].calibration_delta, Some(2.3));
        }

        #[test]
        fn underconfidence_counts_as_divergence() {
            let events = vec![
                hint_given("arrays", 1, 8.0),
                calibration("arrays", 1, 4),
            ];
            let patterns = analyze(&events);
            assert!(patterns["arrays"].flags.contains(&BehaviorFlag::Overconfident));
        }

        #[test]
        fn no_flags_when_well_calibrated() {
            let events = vec![
                hint_given("trees", 1, 8.0),
                hint_assessed("trees", true),
                calibration("trees", 4, 4),
            ];
            let patterns = analyze(&events);
            let flags = &patterns["trees"].flags;
            assert!(!flags.contains(&BehaviorFlag::QuickGiveUp));
            assert!(!flags.contains(&BehaviorFlag::Overconfident));
            assert!(!flags.contains(&BehaviorFlag::ChronicHint));
        }
    }

    mod topic_universe_tests {
        use super::*;

        #[test]
        fn empty_events() {
            assert!(analyze(&[]).is_empty());
        }

        #[test]
        fn multiple_topics_isolated() {
            let events = vec![
                hint_given("dp", 1, 3.0),
                hint_given("dp", 1, 4.0),
                hint_given("trees", 1, 12.0),
            ];
            let patterns = analyze(&events);
            assert!(patterns["dp"].flags.contains(&BehaviorFlag::QuickGiveUp));
            assert!(!patterns["trees"].flags.contains(&BehaviorFlag::QuickGiveUp));
        }

        #[test]
        fn calibration_only_topic_is_invisible() {
            let events = vec![
                calibration("graphs", 5, 1),
                calibration("graphs", 5, 1),
                hint_assessed("heap", false),
            ];
            assert!(analyze(&events).is_empty());
        }

        #[test]
        fn absent_samples_yield_absent_averages() {
            let patterns = analyze(&[hint_given("dp", 2, 7.0)]);
            let p = &patterns["dp"];
            assert!(p.hint_effectiveness.is_none());
            assert!(p.calibration_delta.is_none());
            assert_eq!(p.sample_count, 1);
            assert!(p.flags.is_empty());
        }

        #[test]
        fn sample_count_counts_hints_only() {
            let events = vec![
                hint_given("dp", 2, 7.0),
                hint_given("dp", 2, 9.0),
                hint_assessed("dp", true),
                calibration("dp", 3, 3),
            ];
            assert_eq!(analyze(&events)["dp"].sample_count, 2);
        }
    }

    mod archive_tests {
        use super::*;

        #[test]
        fn default_cutoff_is_ninety_days_back() {
            let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
            assert_eq!(
                archive_cutoff(None, today),
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
            );
        }

        #[test]
        fn explicit_cutoff_wins() {
            let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
            let before = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
            assert_eq!(archive_cutoff(Some(before), today), before);
        }
    }
}
