use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::models::{RatingRecord, TopicClassification};

// Evidence loses ~63% of its weight per 30 days past its review date
const DECAY_DAYS: f64 = 30.0;
const MIN_SAMPLES: usize = 3;
const WEAK_BELOW: f64 = 3.0;
const DEVELOPING_BELOW: f64 = 4.0;

/// Weight of a rating given how far past its review date it is.
pub fn recency_weight(record: &RatingRecord, reference_date: NaiveDate) -> f64 {
    let days_overdue = record
        .next_review_date()
        .map(|due| (reference_date - due).num_days().max(0))
        .unwrap_or(0);
    (-(days_overdue as f64) / DECAY_DAYS).exp()
}

/// Classify every topic in `topics` from the rating ledger.
///
/// Overrides win verbatim. Topics without history are `Unknown`; fewer than
/// three ratings or a weighted average below 3.0 is `Weak`; below 4.0 is
/// `Developing`; anything else is `Strong`. Ledger rows without a topic or
/// rating are ignored.
pub fn classify<'a, I>(
    ledger: &[RatingRecord],
    overrides: &BTreeMap<String, TopicClassification>,
    topics: I,
    reference_date: NaiveDate,
) -> BTreeMap<String, TopicClassification>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut weighted: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for record in ledger {
        let Some(rating) = record.rating.filter(|r| *r > 0) else {
            continue;
        };
        if record.topic.is_empty() {
            continue;
        }
        weighted
            .entry(record.topic.as_str())
            .or_default()
            .push((f64::from(rating), recency_weight(record, reference_date)));
    }

    topics
        .into_iter()
        .map(|topic| {
            let class = match overrides.get(topic) {
                Some(o) => *o,
                None => classify_pairs(weighted.get(topic).map(Vec::as_slice).unwrap_or(&[])),
            };
            (topic.to_string(), class)
        })
        .collect()
}

/// Topics to classify: the catalog's when it has any, otherwise whatever the
/// ledger and overrides mention.
pub fn topic_universe(
    catalog_topics: Vec<String>,
    ledger: &[RatingRecord],
    overrides: &BTreeMap<String, TopicClassification>,
) -> Vec<String> {
    if !catalog_topics.is_empty() {
        return catalog_topics;
    }
    let topics: BTreeSet<String> = ledger
        .iter()
        .filter(|r| !r.topic.is_empty())
        .map(|r| r.topic.clone())
        .chain(overrides.keys().cloned())
        .collect();
    topics.into_iter().collect()
}

fn classify_pairs(pairs: &[(f64, f64)]) -> TopicClassification {
    if pairs.is_empty() {
        return TopicClassification::Unknown;
    }
    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    let mut wavg = pairs.iter().map(|(r, w)| r * w).sum::<f64>() / total_weight;
    // Every weight underflowed to zero: fall back to the plain mean
    if total_weight <= 0.0 || !wavg.is_finite() {
        wavg = pairs.iter().map(|(r, _)| r).sum::<f64>() / pairs.len() as f64;
    }

    if pairs.len() < MIN_SAMPLES || wavg < WEAK_BELOW {
        TopicClassification::Weak
    } else if wavg < DEVELOPING_BELOW {
        TopicClassification::Developing
    } else {
        TopicClassification::Strong
    }
}
