use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

// One logged practice attempt. Never mutated once written; a retry appends a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub slug: String,
    pub topic: String,
    pub rating: Option<u8>,
    pub difficulty: String,
    pub date: String,
    pub ease: f64,
    pub interval: u32,
    pub repetition: u32,
    pub next_review: Option<String>,
}

impl RatingRecord {
    pub fn next_review_date(&self) -> Option<NaiveDate> {
        self.next_review.as_deref().and_then(parse_date)
    }
}

// Mastery estimate for a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicClassification {
    Unknown,
    Weak,
    Developing,
    Strong,
}

impl TopicClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicClassification::Unknown => "unknown",
            TopicClassification::Weak => "weak",
            TopicClassification::Developing => "developing",
            TopicClassification::Strong => "strong",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unknown" | "u" => Some(TopicClassification::Unknown),
            "weak" | "w" => Some(TopicClassification::Weak),
            "developing" | "dev" | "d" => Some(TopicClassification::Developing),
            "strong" | "s" => Some(TopicClassification::Strong),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TopicClassification::Unknown => "Unknown",
            TopicClassification::Weak => "Weak",
            TopicClassification::Developing => "Developing",
            TopicClassification::Strong => "Strong",
        }
    }
}

// === Behavior log ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub ts: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub topic: String,
    #[serde(flatten)]
    pub kind: BehaviorEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BehaviorEventKind {
    HintGiven {
        hint_level: u8,
        time_to_hint_min: f64,
    },
    HintAssessed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint_level: Option<u8>,
        effective: bool,
    },
    RatingCalibration {
        self_rating: u8,
        #[serde(rename = "expected_rating_from_hints")]
        expected_rating: u8,
    },
}

impl BehaviorEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorEventKind::HintGiven { .. } => "hint_given",
            BehaviorEventKind::HintAssessed { .. } => "hint_assessed",
            BehaviorEventKind::RatingCalibration { .. } => "rating_calibration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorFlag {
    QuickGiveUp,
    ChronicHint,
    HintPositive,
    HintNegative,
    Overconfident,
}

impl BehaviorFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorFlag::QuickGiveUp => "quick_give_up",
            BehaviorFlag::ChronicHint => "chronic_hint",
            BehaviorFlag::HintPositive => "hint_positive",
            BehaviorFlag::HintNegative => "hint_negative",
            BehaviorFlag::Overconfident => "overconfident",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            BehaviorFlag::QuickGiveUp => "Reaches for hints within 5 minutes; sit with the problem longer",
            BehaviorFlag::ChronicHint => "Needs deep hints; revisit fundamentals before new problems",
            BehaviorFlag::HintPositive => "Hints land well; short nudges are enough",
            BehaviorFlag::HintNegative => "Hints rarely help; study a worked solution instead",
            BehaviorFlag::Overconfident => "Self-ratings run well above hint usage; rate more strictly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub avg_time_to_hint_min: Option<f64>,
    pub avg_hint_level: Option<f64>,
    pub hint_effectiveness: Option<f64>,
    pub calibration_delta: Option<f64>,
    pub sample_count: usize,
    pub flags: BTreeSet<BehaviorFlag>,
}

// === Targets and plans ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intelligence {
    // Slugs of problems the company is reported to ask
    #[serde(default, alias = "reported_topics")]
    pub reported_problems: Vec<String>,
    #[serde(default)]
    pub rounds: Vec<String>,
}

impl Intelligence {
    pub fn has_design_round(&self) -> bool {
        self.rounds
            .iter()
            .any(|r| r.to_lowercase().contains("design"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub company: String,
    pub role: Option<String>,
    pub interview_date: Option<String>,
    #[serde(default)]
    pub intelligence: Intelligence,
    pub plan: Option<Plan>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub generated_at: NaiveDateTime,
    pub days_remaining: u32,
    pub mock_sessions_target: u32,
    pub mock_sessions_completed: u32,
    pub days: Vec<Day>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayType {
    Coding,
    SystemDesign,
    Behavioral,
    Mock,
}

impl DayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Coding => "coding",
            DayType::SystemDesign => "system-design",
            DayType::Behavioral => "behavioral",
            DayType::Mock => "mock",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "coding" => Some(DayType::Coding),
            "system-design" | "system_design" | "design" => Some(DayType::SystemDesign),
            "behavioral" => Some(DayType::Behavioral),
            "mock" => Some(DayType::Mock),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayType::Coding => "Coding",
            DayType::SystemDesign => "System Design",
            DayType::Behavioral => "Behavioral",
            DayType::Mock => "Mock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    #[serde(rename = "day")]
    pub number: u32,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: DayType,
    pub problems: Vec<String>,
    pub focus: String,
    pub completed: bool,
}

// === Practice sessions ===

/// A practice sitting. Hint events are held here until the session closes;
/// `clean_exit` stays false until then, so a crashed session can be recovered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub clean_exit: bool,
    pub problems: Vec<SessionProblem>,
    pub hint_events: Vec<BehaviorEvent>,
}

impl Session {
    /// Problems rated during the session that never reached the ledger.
    pub fn unlogged(&self) -> impl Iterator<Item = &SessionProblem> {
        self.problems.iter().filter(|p| p.is_unlogged())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProblem {
    pub slug: String,
    pub topic: String,
    pub difficulty: String,
    pub rating: Option<u8>,
    pub logged: bool,
}

impl SessionProblem {
    pub fn is_unlogged(&self) -> bool {
        self.rating.is_some() && !self.logged
    }
}

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionClose {
    pub session_id: i64,
    pub events_flushed: usize,
    pub logged: Vec<String>,
}

// A problem bank entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub slug: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod record_tests {
        use super::*;

        fn make_record(next_review: Option<&str>) -> RatingRecord {
            RatingRecord {
                slug: "two-sum".to_string(),
                topic: "arrays".to_string(),
                rating: Some(4),
                difficulty: "easy".to_string(),
                date: "2026-01-01".to_string(),
                ease: 2.5,
                interval: 1,
                repetition: 1,
                next_review: next_review.map(str::to_string),
            }
        }

        #[test]
        fn next_review_date_parses_iso_date() {
            let r = make_record(Some("2026-01-02"));
            assert_eq!(
                r.next_review_date(),
                NaiveDate::from_ymd_opt(2026, 1, 2)
            );
        }

        #[test]
        fn next_review_date_missing() {
            assert!(make_record(None).next_review_date().is_none());
        }

        #[test]
        fn next_review_date_garbage() {
            assert!(make_record(Some("soon")).next_review_date().is_none());
            assert!(make_record(Some("")).next_review_date().is_none());
            assert!(make_record(Some("02/01/2026")).next_review_date().is_none());
        }
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn as_str_returns_correct_values() {
            assert_eq!(TopicClassification::Unknown.as_str(), "unknown");
            assert_eq!(TopicClassification::Weak.as_str(), "weak");
            assert_eq!(TopicClassification::Developing.as_str(), "developing");
            assert_eq!(TopicClassification::Strong.as_str(), "strong");
        }

        #[test]
        fn from_str_valid_inputs() {
            assert_eq!(
                TopicClassification::from_str("weak"),
                Some(TopicClassification::Weak)
            );
            assert_eq!(
                TopicClassification::from_str("Developing"),
                Some(TopicClassification::Developing)
            );
            assert_eq!(
                TopicClassification::from_str(" STRONG "),
                Some(TopicClassification::Strong)
            );
            assert_eq!(
                TopicClassification::from_str("u"),
                Some(TopicClassification::Unknown)
            );
        }

        #[test]
        fn from_str_invalid_returns_none() {
            assert_eq!(TopicClassification::from_str("mastered"), None);
            assert_eq!(TopicClassification::from_str(""), None);
        }

        #[test]
        fn serializes_lowercase() {
            let json = serde_json::to_string(&TopicClassification::Developing).unwrap();
            assert_eq!(json, "\"developing\"");
        }
    }

    mod behavior_event_tests {
        use super::*;

        #[test]
        fn deserializes_hint_given_log_line() {
            let line = r#"{"ts":"2026-02-18T10:00:00","slug":"coin-change","topic":"dp","event":"hint_given","hint_level":2,"time_to_hint_min":4,"hints_so_far":1}"#;
            let event: BehaviorEvent = serde_json::from_str(line).unwrap();
            assert_eq!(event.topic, "dp");
            assert_eq!(event.slug.as_deref(), Some("coin-change"));
            assert_eq!(
                event.kind,
                BehaviorEventKind::HintGiven {
                    hint_level: 2,
                    time_to_hint_min: 4.0
                }
            );
        }

        #[test]
        fn deserializes_calibration_with_expected_rating_key() {
            let line = r#"{"ts":"2026-02-18T10:10:00","topic":"arrays","event":"rating_calibration","self_rating":5,"expected_rating_from_hints":2}"#;
            let event: BehaviorEvent = serde_json::from_str(line).unwrap();
            assert!(event.slug.is_none());
            assert_eq!(
                event.kind,
                BehaviorEventKind::RatingCalibration {
                    self_rating: 5,
                    expected_rating: 2
                }
            );
        }

        #[test]
        fn serializes_event_tag() {
            let event = BehaviorEvent {
                ts: NaiveDate::from_ymd_opt(2026, 2, 18)
                    .unwrap()
                    .and_hms_opt(10, 5, 0)
                    .unwrap(),
                slug: None,
                topic: "trees".to_string(),
                kind: BehaviorEventKind::HintAssessed {
                    hint_level: None,
                    effective: true,
                },
            };
            let json = serde_json::to_string(&event).unwrap();
            assert!(json.contains("\"event\":\"hint_assessed\""));
            assert!(json.contains("\"effective\":true"));
            assert!(!json.contains("slug"));
        }

        #[test]
        fn unknown_event_kind_fails() {
            let line = r#"{"ts":"2026-02-18T10:00:00","topic":"dp","event":"coffee_break"}"#;
            assert!(serde_json::from_str::<BehaviorEvent>(line).is_err());
        }

        #[test]
        fn kind_as_str_matches_tag() {
            let kind = BehaviorEventKind::HintGiven {
                hint_level: 1,
                time_to_hint_min: 3.0,
            };
            assert_eq!(kind.as_str(), "hint_given");
        }
    }

    mod intelligence_tests {
        use super::*;

        #[test]
        fn detects_design_round() {
            let intel = Intelligence {
                reported_problems: vec![],
                rounds: vec!["technical".to_string(), "System Design".to_string()],
            };
            assert!(intel.has_design_round());
        }

        #[test]
        fn no_design_round() {
            let intel = Intelligence {
                reported_problems: vec![],
                rounds: vec!["technical".to_string(), "behavioral".to_string()],
            };
            assert!(!intel.has_design_round());
            assert!(!Intelligence::default().has_design_round());
        }

        #[test]
        fn accepts_reported_topics_alias() {
            let json = r#"{"reported_topics":["two-sum"],"rounds":["technical"]}"#;
            let intel: Intelligence = serde_json::from_str(json).unwrap();
            assert_eq!(intel.reported_problems, vec!["two-sum".to_string()]);
        }
    }

    mod day_type_tests {
        use super::*;

        #[test]
        fn serializes_kebab_case() {
            assert_eq!(
                serde_json::to_string(&DayType::SystemDesign).unwrap(),
                "\"system-design\""
            );
            assert_eq!(serde_json::to_string(&DayType::Mock).unwrap(), "\"mock\"");
        }

        #[test]
        fn from_str_accepts_stored_names() {
            for kind in [
                DayType::Coding,
                DayType::SystemDesign,
                DayType::Behavioral,
                DayType::Mock,
            ] {
                assert_eq!(DayType::from_str(kind.as_str()), Some(kind));
            }
            assert_eq!(DayType::from_str("rest"), None);
        }

        #[test]
        fn day_serializes_short_field_names() {
            let day = Day {
                number: 1,
                date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                kind: DayType::Coding,
                problems: vec!["two-sum".to_string()],
                focus: "arrays".to_string(),
                completed: false,
            };
            let json = serde_json::to_string(&day).unwrap();
            assert!(json.contains("\"day\":1"));
            assert!(json.contains("\"type\":\"coding\""));
            assert!(json.contains("\"date\":\"2026-03-01\""));
        }
    }

    mod session_tests {
        use super::*;

        fn problem(slug: &str, rating: Option<u8>, logged: bool) -> SessionProblem {
            SessionProblem {
                slug: slug.to_string(),
                topic: "arrays".to_string(),
                difficulty: "easy".to_string(),
                rating,
                logged,
            }
        }

        #[test]
        fn unlogged_needs_a_rating() {
            let session = Session {
                id: 1,
                started_at: NaiveDate::from_ymd_opt(2026, 2, 18)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
                ended_at: None,
                clean_exit: false,
                problems: vec![
                    problem("two-sum", Some(4), false),
                    problem("coin-change", None, false),
                    problem("valid-anagram", Some(5), true),
                ],
                hint_events: vec![],
            };

            let slugs: Vec<&str> = session.unlogged().map(|p| p.slug.as_str()).collect();
            assert_eq!(slugs, vec!["two-sum"]);
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_with_string() {
            let output = JsonOutput::ok("test data");
            assert!(output.success);
            assert_eq!(output.data, Some("test data"));
            assert!(output.error.is_none());
        }

        #[test]
        fn ok_with_unit() {
            let output = JsonOutput::<()>::ok(());
            assert!(output.success);
            assert_eq!(output.data, Some(()));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_with_string() {
            let output = JsonOutput::<()>::err("something went wrong");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("something went wrong".to_string()));
        }

        #[test]
        fn serializes_err_correctly() {
            let output = JsonOutput::<()>::err("error");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":false"));
            assert!(json.contains("\"data\":null"));
            assert!(json.contains("\"error\":\"error\""));
        }
    }
}
