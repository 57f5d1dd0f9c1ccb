//! Noun reduction for attribution output
//!
//! Attribution scores arrive per word-piece. Only noun-like words are useful as
//! an ambiguity hint, so pieces are merged back into words and function words,
//! question words, common verbs and adjectives are dropped.

use crate::key::{CLASSIFICATION_MARKER, TURN_SEPARATOR};
use std::collections::HashSet;

pub trait NounFilter: Send + Sync {
    /// Keep only noun tokens, preserving order, with their scores.
    fn reduce(&self, tokens: &[String], scores: &[f64]) -> (Vec<String>, Vec<f64>);
}

const NON_NOUNS: &[&str] = &[
    // determiners, pronouns, conjunctions, prepositions
    "a", "an", "the", "this", "that", "these", "those", "each", "every", "all", "any", "some",
    "no", "both", "either", "neither", "i", "me", "my", "we", "our", "you", "your", "he", "she",
    "it", "its", "they", "them", "their", "his", "her", "and", "or", "but", "nor", "so", "of",
    "in", "on", "at", "by", "for", "with", "from", "to", "into", "over", "under", "than", "as",
    "about", "between", "after", "before", "during", "per", "whose", "there", "here",
    // question words
    "what", "which", "who", "whom", "when", "where", "why", "how",
    // auxiliaries and common verbs
    "is", "are", "was", "were", "be", "been", "being", "do", "does", "did", "have", "has", "had",
    "can", "could", "will", "would", "shall", "should", "may", "might", "must", "show", "list",
    "find", "give", "tell", "return", "display", "get", "count", "sort", "order", "ordered",
    "sorted", "grouped", "held", "born", "named", "called", "located", "made", "play", "played",
    // adjectives and quantifiers
    "many", "much", "more", "most", "less", "least", "few", "fewer", "other", "another",
    "different", "distinct", "same", "total", "average", "maximum", "minimum", "max", "min",
    "highest", "lowest", "largest", "smallest", "biggest", "oldest", "youngest", "older",
    "younger", "greater", "larger", "smaller", "longest", "shortest", "top", "only", "also",
    "not", "please",
];

pub struct LexiconNounFilter {
    non_nouns: HashSet<&'static str>,
}

impl LexiconNounFilter {
    pub fn new() -> Self {
        Self {
            non_nouns: NON_NOUNS.iter().copied().collect(),
        }
    }

    fn is_noun(&self, word: &str) -> bool {
        if word.is_empty() || !word.chars().any(char::is_alphabetic) {
            return false;
        }
        if word.parse::<f64>().is_ok() {
            return false;
        }
        let lowered = word.to_lowercase();
        if self.non_nouns.contains(lowered.as_str()) {
            return false;
        }
        // adverbs
        !(lowered.len() > 4 && lowered.ends_with("ly"))
    }
}

/// Separator artifacts, whole or as left behind by the word-piece tokenizer.
fn is_marker(word: &str) -> bool {
    matches!(word, "<" | ">" | "s" | "[SEP]") || word == TURN_SEPARATOR || word == CLASSIFICATION_MARKER
}

impl Default for LexiconNounFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl NounFilter for LexiconNounFilter {
    fn reduce(&self, tokens: &[String], scores: &[f64]) -> (Vec<String>, Vec<f64>) {
        // Merge "##" continuation pieces into the preceding word, keeping the max score.
        let mut words: Vec<(String, f64)> = Vec::with_capacity(tokens.len());
        for (token, &score) in tokens.iter().zip(scores) {
            match token.strip_prefix("##") {
                Some(piece) if !words.is_empty() => {
                    if let Some(last) = words.last_mut() {
                        last.0.push_str(piece);
                        last.1 = last.1.max(score);
                    }
                }
                _ => words.push((token.clone(), score)),
            }
        }

        words
            .into_iter()
            .filter(|(word, _)| !is_marker(word))
            .map(|(word, score)| {
                let trimmed = word.trim_matches(|c: char| c.is_ascii_punctuation()).to_string();
                (trimmed, score)
            })
            .filter(|(word, _)| self.is_noun(word))
            .unzip()
    }
}
