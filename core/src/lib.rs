pub mod index;
pub mod persist;
pub mod search;
pub mod stats;
pub mod tokenizer;

pub use index::{indexed_text, DocId, DocVector, InvertedIndex, Posting, Record};
pub use search::SearchHit;
