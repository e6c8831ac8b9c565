//! Relevance scoring for insight retrieval
//!
//! The similarity metric is deliberately pluggable; the default is stemmed
//! bag-of-words cosine similarity, which needs no model downloads and
//! behaves predictably on short goal statements.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};

/// Scores how relevant a stored text is to a goal. Higher is more
/// relevant; zero means unrelated.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, goal: &str, text: &str) -> f64;
}

/// Stemmed bag-of-words cosine similarity.
pub struct BagOfWordsScorer {
    stemmer: Stemmer,
}

impl BagOfWordsScorer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    fn tokenize_and_stem(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|word| {
                let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                self.stemmer.stem(&clean).to_string()
            })
            .filter(|word| !word.is_empty())
            .collect()
    }

    fn bag_of_words(&self, tokens: &[String]) -> HashMap<String, f64> {
        let mut bag: HashMap<String, f64> = HashMap::new();
        for token in tokens {
            *bag.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        let total: f64 = bag.values().sum();
        if total > 0.0 {
            for value in bag.values_mut() {
                *value /= total;
            }
        }
        bag
    }
}

impl Default for BagOfWordsScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceScorer for BagOfWordsScorer {
    fn score(&self, goal: &str, text: &str) -> f64 {
        let goal_bag = self.bag_of_words(&self.tokenize_and_stem(goal));
        let text_bag = self.bag_of_words(&self.tokenize_and_stem(text));
        cosine_similarity(&goal_bag, &text_bag)
    }
}

fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;

    let words: HashSet<_> = a.keys().chain(b.keys()).collect();
    for word in words {
        let va = a.get(word).unwrap_or(&0.0);
        let vb = b.get(word).unwrap_or(&0.0);
        dot += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}
