use crate::index::{DocId, DocVector, InvertedIndex, Record};
use crate::tokenizer::analyze;
use serde::Serialize;
use std::collections::BTreeMap;

/// One ranked document: id, stored record, raw tf-idf magnitude and cosine score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit<'a> {
    pub doc_id: DocId,
    pub record: &'a Record,
    pub tfidf_score: f64,
    pub cosine: f64,
}

impl InvertedIndex {
    /// Rank documents against `query` by cosine similarity, tf-idf score breaking ties.
    ///
    /// The query vector holds plain idf per distinct term while document vectors
    /// hold tf * idf. Documents with zero cosine are dropped. Searching before the
    /// first rebuild finds nothing because no vectors exist yet.
    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let tokens = analyze(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        if self.stale {
            tracing::debug!("searching with vectors older than the latest ingestion");
        }

        let mut q_vec: BTreeMap<&str, f64> = BTreeMap::new();
        for term in &tokens {
            if let Some(idf) = self.idf(term) {
                q_vec.insert(term.as_str(), idf);
            }
        }

        let q_norm = q_vec.values().map(|w| w * w).sum::<f64>().sqrt();
        if q_norm == 0.0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_>> = Vec::new();
        for (&doc_id, d_vec) in &self.vectors {
            let Some(record) = self.docs.get(&doc_id) else { continue };
            let (cosine, tfidf_score) = score(&q_vec, q_norm, d_vec);
            if cosine > 0.0 {
                hits.push(SearchHit { doc_id, record, tfidf_score, cosine });
            }
        }

        hits.sort_by(|a, b| {
            b.cosine
                .total_cmp(&a.cosine)
                .then_with(|| b.tfidf_score.total_cmp(&a.tfidf_score))
        });
        tracing::debug!(query, total_hits = hits.len(), "search complete");
        hits
    }
}

fn score(q_vec: &BTreeMap<&str, f64>, q_norm: f64, d_vec: &DocVector) -> (f64, f64) {
    let mut dot = 0.0;
    let mut tfidf = 0.0;
    for (term, q_w) in q_vec {
        let d_w = d_vec.get(*term).copied().unwrap_or(0.0);
        dot += q_w * d_w;
        tfidf += d_w;
    }
    let d_norm = d_vec.values().map(|w| w * w).sum::<f64>().sqrt();
    let cosine = if d_norm > 0.0 { dot / (q_norm * d_norm) } else { 0.0 };
    (cosine, tfidf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_doc_index() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "Graph Theory Algorithms", "authors": ["Alice Smith"], "year": 2020}));
        idx.ingest(1, json!({"title": "Graph Neural Networks", "authors": ["Bob Jones"], "year": 2021}));
        idx.rebuild();
        idx
    }

    #[test]
    fn blank_queries_return_nothing() {
        let idx = two_doc_index();
        assert!(idx.search("").is_empty());
        assert!(idx.search("   ").is_empty());
        assert!(idx.search("the of an").is_empty());
    }

    #[test]
    fn out_of_vocabulary_query_returns_nothing() {
        let idx = two_doc_index();
        assert!(idx.search("topology manifolds").is_empty());
    }

    #[test]
    fn search_before_rebuild_returns_nothing() {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "Graph Theory"}));
        idx.ingest(1, json!({"title": "Number Theory"}));
        assert!(idx.search("graph").is_empty());
    }

    #[test]
    fn graph_networks_ranks_doc_one_first() {
        let idx = two_doc_index();
        let hits = idx.search("graph networks");
        let ln15 = (1.5f64).ln();

        // "graph" is in both documents, so its idf is ln(3/3) = 0 and doc 0
        // has no positive overlap with the query.
        assert_eq!(idx.idf("graph"), Some(0.0));
        assert_eq!(idx.idf("networks"), Some(ln15));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, 1);
        assert!((hits[0].tfidf_score - ln15).abs() < 1e-12);
        assert!((hits[0].cosine - 1.0 / 5f64.sqrt()).abs() < 1e-12);
        assert_eq!(hits[0].record["title"], "Graph Neural Networks");
    }

    #[test]
    fn more_shared_terms_rank_higher() {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "Graph Theory Algorithms", "authors": ["Alice Smith"], "year": 2020}));
        idx.ingest(1, json!({"title": "Graph Neural Networks", "authors": ["Bob Jones"], "year": 2021}));
        idx.ingest(2, json!({"title": "Stochastic Calculus", "authors": ["Carol White"], "year": 2019}));
        idx.rebuild();

        let hits = idx.search("graph networks");
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![1, 0]);
        assert!(hits[0].cosine > hits[1].cosine);
    }

    #[test]
    fn equal_cosine_breaks_tie_on_tfidf() {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "quantum"}));
        idx.ingest(1, json!({"title": "quantum quantum"}));
        idx.ingest(2, json!({"title": "classical mechanics"}));
        idx.rebuild();

        let hits = idx.search("quantum");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].cosine, hits[1].cosine);
        assert_eq!(hits[0].doc_id, 1);
        assert!(hits[0].tfidf_score > hits[1].tfidf_score);
    }

    #[test]
    fn repeated_query_terms_do_not_change_scores() {
        let idx = two_doc_index();
        let once = idx.search("networks");
        let twice = idx.search("networks networks");
        assert_eq!(once, twice);
    }
}
