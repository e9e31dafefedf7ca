use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::RatingRecord;

pub const DEFAULT_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2State {
    pub ease: f64,
    pub interval: u32,
    pub repetition: u32,
}

impl Default for Sm2State {
    // State before the first attempt of a problem
    fn default() -> Self {
        Self {
            ease: DEFAULT_EASE,
            interval: 0,
            repetition: 0,
        }
    }
}

/// Next SM-2 state for a recall rating (1 = blank, 5 = effortless).
///
/// Ratings below 3 count as a lapse: the interval resets to one day and the
/// repetition count to zero, while the ease is still adjusted. Ratings outside
/// 1..=5 are used as given.
pub fn compute(rating: u8, prev_ease: f64, prev_interval: u32, prev_repetition: u32) -> Sm2State {
    let q = 5.0 - f64::from(rating);
    let ease = (prev_ease + (0.1 - q * (0.08 + q * 0.02))).max(MIN_EASE);

    if rating < 3 {
        return Sm2State {
            ease,
            interval: 1,
            repetition: 0,
        };
    }

    let repetition = prev_repetition.saturating_add(1);
    let interval = match repetition {
        1 => 1,
        2 => 6,
        _ => ((f64::from(prev_interval) * ease).ceil() as u32).max(1),
    };

    Sm2State {
        ease,
        interval,
        repetition,
    }
}

/// Latest attempt of every slug whose review date has arrived.
pub fn due_reviews(ledger: &[RatingRecord], today: NaiveDate) -> Vec<&RatingRecord> {
    let mut latest: HashMap<&str, &RatingRecord> = HashMap::new();
    for record in ledger {
        latest.insert(record.slug.as_str(), record);
    }

    let mut due: Vec<(NaiveDate, &RatingRecord)> = latest
        .into_values()
        .filter_map(|r| r.next_review_date().map(|d| (d, r)))
        .filter(|(d, _)| *d <= today)
        .collect();
    due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.slug.cmp(&b.1.slug)));
    due.into_iter().map(|(_, r)| r).collect()
}
