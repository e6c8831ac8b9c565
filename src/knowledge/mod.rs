//! Knowledge store
//!
//! Durable, append-only store of insights distilled from failed attempts.
//! Grows monotonically within a run; a store file written by earlier runs
//! loads cleanly into a new one (no validation against the current goal).
//! Queries are pure reads ranked by a pluggable relevance scorer, ties
//! broken by recency.

pub mod scorer;

pub use scorer::{BagOfWordsScorer, RelevanceScorer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A distilled, reusable lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub text: String,
    /// Goal of the run that produced this insight; empty for seeds.
    #[serde(default)]
    pub goal: String,
    /// Iteration the insight came from; zero for seeds.
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub tag: String,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(text: impl Into<String>, goal: impl Into<String>, attempt: u32, tag: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            goal: goal.into(),
            attempt,
            tag: tag.to_string(),
            created_at: Utc::now(),
        }
    }

    fn seed(text: &str) -> Self {
        Self::new(text, "", 0, "seed")
    }
}

/// Starter strategies written when the store file does not exist yet.
const SEED_STRATEGIES: &[&str] = &[
    "decompose the problem, solve the simplest case first, then generalize",
    "print only the final answer in machine-readable form, with no prose",
    "prefer a simple well-known algorithm over a clever one on the first attempt",
    "check boundary conditions explicitly; off-by-one errors are the most common failure",
];

/// File-backed append-only knowledge store (JSONL, one insight per line).
pub struct KnowledgeStore {
    path: PathBuf,
    insights: Vec<Insight>,
    scorer: Box<dyn RelevanceScorer>,
}

impl KnowledgeStore {
    /// Open the store at `path`, creating and seeding it with starter
    /// strategies if it does not exist. Corrupt lines are skipped so a
    /// store from an older version still loads.
    pub fn open(path: PathBuf, scorer: Box<dyn RelevanceScorer>) -> Result<Self> {
        let mut store = Self {
            path,
            insights: Vec::new(),
            scorer,
        };

        if store.path.exists() {
            store.load()?;
        } else {
            for text in SEED_STRATEGIES {
                store.upsert(Insight::seed(text))?;
            }
            debug!("seeded knowledge store with {} strategies", SEED_STRATEGIES.len());
        }

        Ok(store)
    }

    /// In-memory store for tests; nothing is persisted.
    pub fn ephemeral(scorer: Box<dyn RelevanceScorer>) -> Self {
        Self {
            path: PathBuf::new(),
            insights: Vec::new(),
            scorer,
        }
    }

    fn load(&mut self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.path)?;
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Insight>(line) {
                Ok(insight) => self.insights.push(insight),
                Err(e) => warn!(
                    "skipping unreadable insight at {}:{}: {e}",
                    self.path.display(),
                    number + 1
                ),
            }
        }
        debug!(
            "loaded {} insights from {}",
            self.insights.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Append an insight. The disk write happens first; if it fails the
    /// insight is not kept in memory either, so a partial upsert is never
    /// observable.
    pub fn upsert(&mut self, insight: Insight) -> Result<()> {
        if !self.path.as_os_str().is_empty() {
            self.append_line(&insight)
                .map_err(|e| Error::Store(format!("failed to persist insight: {e}")))?;
        }
        self.insights.push(insight);
        Ok(())
    }

    fn append_line(&self, insight: &Insight) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(insight)?;
        line.push('\n');
        // One write_all of a full line keeps appends atomic for the
        // single-writer-per-run contract.
        file.write_all(line.as_bytes())
    }

    /// Top-`k` insights for a goal, most relevant first, recency breaking
    /// ties. Pure read.
    pub fn query(&self, goal: &str, k: usize) -> Vec<Insight> {
        let mut scored: Vec<(f64, &Insight)> = self
            .insights
            .iter()
            .map(|insight| {
                let basis = if insight.goal.is_empty() {
                    insight.text.clone()
                } else {
                    format!("{} {}", insight.goal, insight.text)
                };
                (self.scorer.score(goal, &basis), insight)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|(score_a, insight_a), (score_b, insight_b)| {
            score_b
                .total_cmp(score_a)
                .then(insight_b.created_at.cmp(&insight_a.created_at))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(_, insight)| insight.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> KnowledgeStore {
        KnowledgeStore::ephemeral(Box::new(BagOfWordsScorer::new()))
    }

    #[test]
    fn test_query_never_exceeds_k() {
        let mut store = test_store();
        for i in 0..10 {
            store
                .upsert(Insight::new(
                    format!("prime lesson {i}"),
                    "find primes",
                    i,
                    "failure-lesson",
                ))
                .unwrap();
        }
        assert_eq!(store.query("find primes", 3).len(), 3);
        assert!(store.query("find primes", 100).len() <= 10);
    }

    #[test]
    fn test_query_only_returns_upserted_insights() {
        let mut store = test_store();
        store
            .upsert(Insight::new(
                "check divisibility up to sqrt(n)",
                "find primes",
                1,
                "failure-lesson",
            ))
            .unwrap();
        let results = store.query("find the first primes", 5);
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("sqrt"));
    }

    #[test]
    fn test_query_ignores_unrelated_insights() {
        let mut store = test_store();
        store
            .upsert(Insight::new(
                "weather parsing tip",
                "parse tokyo weather",
                1,
                "failure-lesson",
            ))
            .unwrap();
        assert!(store.query("find prime numbers", 5).is_empty());
    }

    #[test]
    fn test_recency_breaks_relevance_ties() {
        let mut store = test_store();
        let mut older = Insight::new("prime tip alpha", "find primes", 1, "failure-lesson");
        older.created_at = Utc::now() - chrono::Duration::minutes(10);
        let newer = Insight::new("prime tip alpha", "find primes", 2, "failure-lesson");
        let newer_id = newer.id;
        store.upsert(older).unwrap();
        store.upsert(newer).unwrap();

        let results = store.query("find primes", 2);
        assert_eq!(results[0].id, newer_id);
    }

    #[test]
    fn test_store_seeds_on_first_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.jsonl");
        let store = KnowledgeStore::open(path, Box::new(BagOfWordsScorer::new())).unwrap();
        assert_eq!(store.len(), SEED_STRATEGIES.len());
    }

    #[test]
    fn test_store_survives_reopen_and_foreign_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.jsonl");

        {
            let mut store =
                KnowledgeStore::open(path.clone(), Box::new(BagOfWordsScorer::new())).unwrap();
            store
                .upsert(Insight::new(
                    "must check divisibility up to sqrt(n)",
                    "some earlier prime goal",
                    1,
                    "failure-lesson",
                ))
                .unwrap();
        }

        // A different run loads the same file without validating goals.
        let store = KnowledgeStore::open(path, Box::new(BagOfWordsScorer::new())).unwrap();
        assert_eq!(store.len(), SEED_STRATEGIES.len() + 1);
        let results = store.query("a new prime goal", 5);
        assert!(results.iter().any(|i| i.text.contains("sqrt")));
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.jsonl");
        let good = serde_json::to_string(&Insight::new("tip", "goal", 1, "failure-lesson")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json at all\n")).unwrap();

        let store = KnowledgeStore::open(path, Box::new(BagOfWordsScorer::new())).unwrap();
        assert_eq!(store.len(), 1);
    }
}
