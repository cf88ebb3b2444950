//! Collection statistics and a lexical relevance check for dashboards.

use crate::index::{indexed_text, DocId, InvertedIndex};
use crate::search::SearchHit;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total_documents: usize,
    pub unique_authors: usize,
    pub vocabulary_size: usize,
    pub avg_posting_len: f64,
    pub max_posting_len: usize,
}

impl CollectionStats {
    pub fn compute(index: &InvertedIndex) -> Self {
        let unique_authors: HashSet<&str> = index
            .docs()
            .values()
            .filter_map(|d| d.get("authors").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .collect();

        let lengths: Vec<usize> = index.posting_lengths().collect();
        let avg_posting_len = if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
        };

        Self {
            total_documents: index.docs().len(),
            unique_authors: unique_authors.len(),
            vocabulary_size: index.vocabulary_size(),
            avg_posting_len,
            max_posting_len: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Confusion counts and derived metrics for one query, judged against a naive
/// "query word appears literally in title/authors/year" relevance rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    pub fn compute(index: &InvertedIndex, query: &str, hits: &[SearchHit<'_>]) -> Self {
        let relevant = lexically_relevant(index, query);
        let retrieved: HashSet<DocId> = hits.iter().map(|h| h.doc_id).collect();

        let tp = retrieved.intersection(&relevant).count();
        let fp = retrieved.difference(&relevant).count();
        let fn_ = relevant.difference(&retrieved).count();
        let tn = index.docs().len().saturating_sub(tp + fp + fn_);
        let total = tp + tn + fp + fn_;

        let accuracy = (tp + tn) as f64 / total.max(1) as f64;
        let precision = tp as f64 / (tp + fp).max(1) as f64;
        let recall = tp as f64 / (tp + fn_).max(1) as f64;
        let f1 = 2.0 * precision * recall / (precision + recall).max(1.0);

        Self {
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

/// Documents whose lowercased indexed text contains any lowercased query word.
pub fn lexically_relevant(index: &InvertedIndex, query: &str) -> HashSet<DocId> {
    let lowered = query.to_lowercase();
    let words: HashSet<&str> = lowered.split_whitespace().collect();
    index
        .docs()
        .iter()
        .filter(|(_, d)| {
            let text = indexed_text(d).to_lowercase();
            words.iter().any(|w| text.contains(w))
        })
        .map(|(&id, _)| id)
        .collect()
}
