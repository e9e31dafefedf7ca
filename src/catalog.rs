use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::Problem;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Problem bank not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read problem bank: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid problem bank: {0}")]
    Parse(#[from] serde_json::Error),
}

// On-disk problem bank: named tracks (blind75, neetcode150, ...) each listing problems
#[derive(Debug, Default, Deserialize)]
pub struct ProblemBank {
    #[serde(default)]
    pub tracks: BTreeMap<String, Track>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub problems: Vec<Problem>,
}

/// Problems grouped by topic, deduplicated by slug across tracks.
#[derive(Debug, Clone, Default)]
pub struct ProblemCatalog {
    by_topic: BTreeMap<String, Vec<Problem>>,
    topic_by_slug: HashMap<String, String>,
}

impl ProblemCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let bank: ProblemBank = serde_json::from_str(&raw)?;
        let catalog = Self::from_bank(bank);
        tracing::debug!(
            problems = catalog.len(),
            topics = catalog.by_topic.len(),
            "loaded problem bank from {}",
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_bank(bank: ProblemBank) -> Self {
        Self::from_problems(bank.tracks.into_values().flat_map(|t| t.problems))
    }

    // First occurrence of a slug wins; problems without a topic are never scheduled
    pub fn from_problems<I: IntoIterator<Item = Problem>>(problems: I) -> Self {
        let mut seen = HashSet::new();
        let mut by_topic: BTreeMap<String, Vec<Problem>> = BTreeMap::new();
        let mut topic_by_slug = HashMap::new();

        for problem in problems {
            if problem.topic.trim().is_empty() {
                tracing::debug!("skipping {}: no topic", problem.slug);
                continue;
            }
            if !seen.insert(problem.slug.clone()) {
                continue;
            }
            topic_by_slug.insert(problem.slug.clone(), problem.topic.clone());
            by_topic
                .entry(problem.topic.clone())
                .or_default()
                .push(problem);
        }

        Self {
            by_topic,
            topic_by_slug,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topic_by_slug.is_empty()
    }

    pub fn len(&self) -> usize {
        self.topic_by_slug.len()
    }

    /// All topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.by_topic.keys().cloned().collect()
    }

    pub fn problems(&self, topic: &str) -> &[Problem] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn topic_of(&self, slug: &str) -> Option<&str> {
        self.topic_by_slug.get(slug).map(String::as_str)
    }

    pub fn find(&self, slug: &str) -> Option<&Problem> {
        let topic = self.topic_of(slug)?;
        self.problems(topic).iter().find(|p| p.slug == slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn problem(slug: &str, topic: &str) -> Problem {
        Problem {
            slug: slug.to_string(),
            topic: topic.to_string(),
            difficulty: "medium".to_string(),
            title: None,
        }
    }

    mod catalog_tests {
        use super::*;

        #[test]
        fn groups_by_topic_in_bank_order() {
            let catalog = ProblemCatalog::from_problems(vec![
                problem("two-sum", "arrays"),
                problem("coin-change", "dp"),
                problem("contains-duplicate", "arrays"),
            ]);
            assert_eq!(catalog.topics(), vec!["arrays", "dp"]);
            let slugs: Vec<&str> = catalog
                .problems("arrays")
                .iter()
                .map(|p| p.slug.as_str())
                .collect();
            assert_eq!(slugs, vec!["two-sum", "contains-duplicate"]);
            assert_eq!(catalog.len(), 3);
        }

        #[test]
        fn deduplicates_by_slug() {
            let catalog = ProblemCatalog::from_problems(vec![
                problem("two-sum", "arrays"),
                problem("two-sum", "hashing"),
            ]);
            assert_eq!(catalog.len(), 1);
            assert_eq!(catalog.topic_of("two-sum"), Some("arrays"));
            assert!(catalog.problems("hashing").is_empty());
        }

        #[test]
        fn problems_without_topic_are_skipped() {
            let catalog = ProblemCatalog::from_problems(vec![
                problem("mystery", ""),
                problem("blank", "  "),
                problem("two-sum", "arrays"),
            ]);
            assert_eq!(catalog.topics(), vec!["arrays"]);
            assert_eq!(catalog.len(), 1);
            assert!(catalog.topic_of("mystery").is_none());
            assert!(catalog.find("blank").is_none());
        }

        #[test]
        fn topicless_first_entry_does_not_shadow_later_one() {
            let catalog = ProblemCatalog::from_problems(vec![
                problem("two-sum", ""),
                problem("two-sum", "arrays"),
            ]);
            assert_eq!(catalog.topic_of("two-sum"), Some("arrays"));
        }

        #[test]
        fn unknown_lookups() {
            let catalog = ProblemCatalog::default();
            assert!(catalog.is_empty());
            assert!(catalog.problems("graphs").is_empty());
            assert!(catalog.topic_of("two-sum").is_none());
            assert!(catalog.find("two-sum").is_none());
        }

        #[test]
        fn find_returns_entry() {
            let catalog = ProblemCatalog::from_problems(vec![problem("coin-change", "dp")]);
            let p = catalog.find("coin-change").unwrap();
            assert_eq!(p.difficulty, "medium");
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn load_flattens_tracks() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(
                file,
                r#"{{"tracks": {{
                    "blind75": {{"problems": [
                        {{"slug": "two-sum", "topic": "arrays", "difficulty": "easy"}},
                        {{"slug": "coin-change", "topic": "dp", "difficulty": "medium"}}
                    ]}},
                    "neetcode150": {{"problems": [
                        {{"slug": "two-sum", "topic": "arrays", "difficulty": "easy"}},
                        {{"slug": "number-of-islands", "topic": "graphs", "difficulty": "medium", "title": "Number of Islands"}}
                    ]}}
                }}}}"#
            )
            .unwrap();

            let catalog = ProblemCatalog::load(file.path()).unwrap();
            assert_eq!(catalog.len(), 3);
            assert_eq!(catalog.topics(), vec!["arrays", "dp", "graphs"]);
            assert_eq!(
                catalog.find("number-of-islands").unwrap().title.as_deref(),
                Some("Number of Islands")
            );
        }

        #[test]
        fn load_missing_file() {
            let dir = tempfile::tempdir().unwrap();
            let result = ProblemCatalog::load(dir.path().join("problems.json"));
            assert!(matches!(result, Err(CatalogError::NotFound(_))));
        }

        #[test]
        fn load_malformed_json() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, "not json").unwrap();
            let result = ProblemCatalog::load(file.path());
            assert!(matches!(result, Err(CatalogError::Parse(_))));
        }

        #[test]
        fn load_bank_without_tracks_is_empty() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, "{{}}").unwrap();
            let catalog = ProblemCatalog::load(file.path()).unwrap();
            assert!(catalog.is_empty());
        }
    }
}
