//! Literal value filling
//!
//! The parser emits `terminal` in place of literal values it cannot copy from
//! the question. This pass substitutes literals mined from the utterance, and
//! from earlier turns when the utterance runs out, in order of appearance.
//! Placeholders with no candidate are left untouched.

use crate::key::TURN_SEPARATOR;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r#"(?i)'terminal'|"terminal"|\bterminal\b"#).unwrap();
    static ref QUOTED: Regex = Regex::new(r#"'([^']+)'|"([^"]+)""#).unwrap();
    static ref NUMBER: Regex = Regex::new(r"^-?\d+(\.\d+)?$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(String),
    Text(String),
}

impl Literal {
    fn render(&self) -> String {
        match self {
            Literal::Number(n) => n.clone(),
            Literal::Text(t) => format!("'{}'", t.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueFiller;

impl ValueFiller {
    pub fn new() -> Self {
        Self
    }

    /// Replace `terminal` placeholders in `sql` with literals from the conversation.
    pub fn fill(&self, sql: &str, question: &str, db_id: &str, history: &str) -> String {
        if !PLACEHOLDER.is_match(sql) {
            return sql.to_string();
        }

        let mut literals = extract_literals(question);
        // Most recent earlier turn first
        for turn in history.rsplit(TURN_SEPARATOR) {
            for literal in extract_literals(turn) {
                if !literals.contains(&literal) {
                    literals.push(literal);
                }
            }
        }

        let mut remaining = literals.into_iter();
        let filled = PLACEHOLDER.replace_all(sql, |caps: &Captures| match remaining.next() {
            Some(literal) => literal.render(),
            None => caps[0].to_string(),
        });

        tracing::debug!("Filled values for {}: {}", db_id, filled);
        filled.into_owned()
    }
}

fn extract_literals(text: &str) -> Vec<Literal> {
    let mut literals = Vec::new();
    let mut push = |literal: Literal| {
        if !literals.contains(&literal) {
            literals.push(literal);
        }
    };

    for caps in QUOTED.captures_iter(text) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            push(Literal::Text(m.as_str().to_string()));
        }
    }
    let unquoted = QUOTED.replace_all(text, " ");

    let words: Vec<&str> = unquoted
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '.'))
        .map(|w| w.trim_end_matches('.'))
        .filter(|w| !w.is_empty() && *w != "s")
        .collect();

    for word in &words {
        if NUMBER.is_match(word) {
            push(Literal::Number(word.to_string()));
        }
    }

    // Capitalised words past the first word are taken as proper-noun values
    for word in words.iter().skip(1) {
        if word.chars().next().map_or(false, char::is_uppercase) && !NUMBER.is_match(word) {
            push(Literal::Text(word.to_string()));
        }
    }

    literals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_without_placeholder_is_untouched() {
        let filler = ValueFiller::new();
        let sql = "SELECT count(*) FROM concert";
        assert_eq!(filler.fill(sql, "How many concerts are there", "concert_singer", ""), sql);
    }

    #[test]
    fn test_fills_number_and_proper_noun() {
        let filler = ValueFiller::new();
        let sql = "SELECT name FROM singer WHERE age > 'terminal' AND country = 'terminal'";
        let filled = filler.fill(sql, "Singers older than 30 from France", "concert_singer", "");
        assert_eq!(filled, "SELECT name FROM singer WHERE age > 30 AND country = 'France'");
    }

    #[test]
    fn test_quoted_values_come_first() {
        let filler = ValueFiller::new();
        let sql = "SELECT * FROM singer WHERE name = terminal";
        let filled = filler.fill(sql, "show the singer named 'Joe Sharp'", "concert_singer", "");
        assert_eq!(filled, "SELECT * FROM singer WHERE name = 'Joe Sharp'");
    }

    #[test]
    fn test_falls_back_to_history() {
        let filler = ValueFiller::new();
        let sql = "SELECT name FROM stadium WHERE capacity > 'terminal'";
        let filled = filler.fill(sql, "what are their names", "concert_singer", " <s> stadiums with capacity over 5000");
        assert_eq!(filled, "SELECT name FROM stadium WHERE capacity > 5000");
    }

    #[test]
    fn test_unfilled_placeholder_remains() {
        let filler = ValueFiller::new();
        let sql = "SELECT name FROM singer WHERE country = 'terminal'";
        let filled = filler.fill(sql, "which singers are from there", "concert_singer", "");
        assert_eq!(filled, sql);
    }
}
