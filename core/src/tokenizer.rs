use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Tokens with fewer characters than this are never indexed.
pub const MIN_TOKEN_LEN: usize = 3;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","an","and","are","as","at","be","by","for","from","has","he",
            "in","is","it","its","of","on","or","that","the","to","was","will",
            "with","this","but","they","have","had","what","when","where",
            "who","why","how",
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Lowercase and strip every character that is not a word character or whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_WORD.replace_all(&lowered, "").into_owned()
}

/// Split on runs of whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Drop stopwords and tokens shorter than [`MIN_TOKEN_LEN`].
pub fn filter(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !is_stopword(t))
        .collect()
}

/// Full pipeline: normalize, tokenize, filter. Order is fixed.
pub fn analyze(text: &str) -> Vec<String> {
    filter(tokenize(&normalize(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("Graph-Theory, (2020)!"), "graphtheory 2020");
        assert_eq!(normalize("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn filter_drops_short_and_stopwords() {
        let toks = filter(tokenize("the of ai graph with networks"));
        assert_eq!(toks, vec!["graph".to_string(), "networks".to_string()]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(analyze("").is_empty());
        assert!(analyze("   \t\n").is_empty());
    }
}
