use crate::tokenizer::analyze;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub type DocId = u32;

/// Caller-owned publication record. Only `title`, `authors` and `year` are read;
/// every other field is stored and handed back untouched.
pub type Record = Value;

/// Sparse term -> tf-idf weight map for one document.
pub type DocVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32, // raw term count in the indexed text
}

/// In-memory TF-IDF index over publication records.
///
/// Lifecycle: ingest any number of records, call [`InvertedIndex::rebuild`] once,
/// then search as often as needed. Ingesting after a rebuild leaves `vectors`
/// stale until the next rebuild; [`InvertedIndex::needs_rebuild`] reports that.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    pub(crate) postings: BTreeMap<String, Vec<Posting>>, // postings in ingestion order
    pub(crate) docs: BTreeMap<DocId, Record>,
    pub(crate) vectors: BTreeMap<DocId, DocVector>,
    pub(crate) num_docs: u32,
    pub(crate) stale: bool,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Index one record under `id`.
    ///
    /// Reusing an id overwrites the stored record but appends a second set of
    /// postings and still bumps the document count. Use
    /// [`InvertedIndex::ingest_unique`] when ids must not repeat.
    pub fn ingest(&mut self, id: DocId, record: Record) {
        let tokens = analyze(&indexed_text(&record));
        let mut tf_counts: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *tf_counts.entry(token).or_insert(0) += 1;
        }
        let distinct_terms = tf_counts.len();
        for (term, tf) in tf_counts {
            self.postings.entry(term).or_default().push(Posting { doc_id: id, tf });
        }

        self.docs.insert(id, record);
        self.num_docs += 1;
        self.stale = true;
        tracing::debug!(doc_id = id, distinct_terms, "ingested document");
    }

    /// Like [`InvertedIndex::ingest`] but rejects an id that is already stored,
    /// leaving the index untouched.
    pub fn ingest_unique(&mut self, id: DocId, record: Record) -> Result<()> {
        if self.docs.contains_key(&id) {
            bail!("document id {id} already ingested");
        }
        self.ingest(id, record);
        Ok(())
    }

    /// Recompute every document vector from the current postings.
    pub fn rebuild(&mut self) {
        let mut vectors: BTreeMap<DocId, DocVector> =
            self.docs.keys().map(|&id| (id, DocVector::new())).collect();

        for (term, plist) in &self.postings {
            let idf = self.idf_for_df(plist.len());
            // Later postings for a reused id overwrite earlier ones.
            for p in plist {
                if let Some(vec) = vectors.get_mut(&p.doc_id) {
                    vec.insert(term.clone(), p.tf as f64 * idf);
                }
            }
        }

        self.vectors = vectors;
        self.stale = false;
        tracing::debug!(num_docs = self.num_docs, num_terms = self.postings.len(), "rebuilt tf-idf vectors");
    }

    /// ln((N + 1) / (df + 1)) for a vocabulary term, `None` when the term is unknown.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.postings.get(term).map(|plist| self.idf_for_df(plist.len()))
    }

    fn idf_for_df(&self, df: usize) -> f64 {
        ((self.num_docs as f64 + 1.0) / (df as f64 + 1.0)).ln()
    }

    pub fn doc(&self, id: DocId) -> Option<&Record> { self.docs.get(&id) }

    pub fn docs(&self) -> &BTreeMap<DocId, Record> { &self.docs }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn vector(&self, id: DocId) -> Option<&DocVector> { self.vectors.get(&id) }

    /// Number of ingestion calls made, including reused ids.
    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn vocabulary_size(&self) -> usize { self.postings.len() }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    pub fn posting_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.postings.values().map(Vec::len)
    }

    /// True when records were ingested after the last rebuild.
    pub fn needs_rebuild(&self) -> bool { self.stale }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }
}

/// `title authors... year` as fed to the tokenizer. Missing or mistyped fields
/// fall back to empty values.
pub fn indexed_text(record: &Record) -> String {
    let title = record.get("title").and_then(Value::as_str).unwrap_or("");
    let authors: Vec<&str> = record
        .get("authors")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let year = match record.get("year") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    format!("{} {} {}", title, authors.join(" "), year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indexed_text_defaults_missing_fields() {
        assert_eq!(indexed_text(&json!({})), "  ");
        assert_eq!(
            indexed_text(&json!({"title": "Deep Nets", "authors": ["A B", 7, "C"], "year": 2020})),
            "Deep Nets A B C 2020"
        );
        assert_eq!(indexed_text(&json!({"year": "2019", "title": null})), "  2019");
    }

    #[test]
    fn ingest_counts_term_frequencies() {
        let mut idx = InvertedIndex::new();
        idx.ingest(3, json!({"title": "Sparse sparse matrices", "authors": [], "year": 2001}));
        assert_eq!(idx.postings("sparse"), Some(&[Posting { doc_id: 3, tf: 2 }][..]));
        assert_eq!(idx.postings("2001"), Some(&[Posting { doc_id: 3, tf: 1 }][..]));
        assert_eq!(idx.num_docs(), 1);
        assert!(idx.needs_rebuild());
    }

    #[test]
    fn reused_id_appends_postings_and_counts_again() {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "Lattice models"}));
        idx.ingest(0, json!({"title": "Lattice theory"}));
        assert_eq!(idx.num_docs(), 2);
        assert_eq!(idx.docs().len(), 1);
        assert_eq!(idx.postings("lattice").map(<[Posting]>::len), Some(2));
        assert_eq!(idx.doc(0), Some(&json!({"title": "Lattice theory"})));
        // "models" keeps its stale posting for id 0
        assert_eq!(idx.postings("models").map(<[Posting]>::len), Some(1));
    }

    #[test]
    fn ingest_unique_rejects_reuse() {
        let mut idx = InvertedIndex::new();
        idx.ingest_unique(0, json!({"title": "Lattice models"})).unwrap();
        let err = idx.ingest_unique(0, json!({"title": "Other"})).unwrap_err();
        assert!(err.to_string().contains("already ingested"));
        assert_eq!(idx.num_docs(), 1);
        assert_eq!(idx.doc(0), Some(&json!({"title": "Lattice models"})));
    }

    #[test]
    fn rebuild_weights_are_tf_times_idf() {
        let mut idx = InvertedIndex::new();
        idx.ingest(0, json!({"title": "Fluid fluid dynamics"}));
        idx.ingest(1, json!({"title": "Fluid mechanics"}));
        idx.rebuild();
        assert!(!idx.needs_rebuild());

        let v0 = idx.vector(0).unwrap();
        let idf_dyn = (3.0f64 / 2.0).ln();
        assert_eq!(v0.get("fluid"), Some(&0.0)); // df == N
        assert_eq!(v0.get("dynamics"), Some(&idf_dyn));
        assert!(v0.get("mechanics").is_none());
        assert_eq!(idx.idf("mechanics"), Some(idf_dyn));
        assert_eq!(idx.idf("unknown"), None);
    }
}
