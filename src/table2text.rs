//! Table-to-Text Summarizer
//!
//! One-sentence natural-language summaries of query result tables, produced by
//! a few-shot prompt on the text generation backend and memoized by the table
//! contents in the table2text namespace.

use crate::cache::{CacheNamespace, Memoizer};
use crate::config::TableToTextConfig;
use crate::error::Result;
use crate::key::CacheKey;
use crate::services::TextGenerator;
use lazy_static::lazy_static;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_DATA_MESSAGE: &str = "There is no data in the table.";

const INSTRUCTION: &str = "Summarize the given table into one sentence. Do not include extra information.";
const TABLE_PREFIX: &str = "Table: ";
const SUMMARY_PREFIX: &str = "Summary: ";

lazy_static! {
    static ref FEW_SHOT: Vec<(Value, &'static str)> = vec![
        (
            json!([
                {"singer_id": "1", "name": "Joe Sharp", "country": "Netherlands", "song_name": "You", "song_release_year": "1992", "age": "52", "is_male": "F"},
                {"singer_id": "2", "name": "Timbaland", "country": "United States", "song_name": "Dangerous", "song_release_year": "2008", "age": "32", "is_male": "T"},
                {"singer_id": "3", "name": "Justin Brown", "country": "France", "song_name": "Hey Oh", "song_release_year": "2013", "age": "20", "is_male": "T"},
                {"singer_id": "4", "name": "Rose White", "country": "France", "song_name": "Sun", "song_release_year": "2003", "age": "41", "is_male": "F"},
                {"singer_id": "5", "name": "John Nizinik", "country": "France", "song_name": "Gentleman", "song_release_year": "2014", "age": "43", "is_male": "T"}
            ]),
            "The table summarizes data on five singers from the Netherlands, United States, and France, detailing their names, song titles, release years, ages, and genders, with songs ranging from 1992 to 2014 and ages from 20 to 52.",
        ),
        (
            json!([
                {"stuid": "1001", "lname": "Smith", "fname": "Linda", "age": "18", "sex": "F", "major": "600", "advisor": "1121", "city_code": "BAL"},
                {"stuid": "1002", "lname": "Kim", "fname": "Tracy", "age": "19", "sex": "F", "major": "600", "advisor": "7712", "city_code": "HKG"},
                {"stuid": "1003", "lname": "Jones", "fname": "Shiela", "age": "21", "sex": "F", "major": "600", "advisor": "7792", "city_code": "WAS"}
            ]),
            "The table presents details of three female students aged 18 to 21, named Linda Smith, Tracy Kim, and Shiela Jones, all majoring in the same field (600), with different advisors and hailing from cities BAL, HKG, and WAS respectively.",
        ),
        (
            json!([
                {"stadium_id": "5", "location": "Stirling Albion", "name": "Forthbank Stadium", "capacity": "3808", "highest": "1125", "lowest": "404", "average": "642"}
            ]),
            "The table provides information on Forthbank Stadium, the home of Stirling Albion, with a capacity of 3,808 and attendance statistics showing a highest of 1,125, lowest of 404, and an average of 642.",
        ),
    ];
}

pub struct TableSummarizer {
    memo: Arc<Memoizer>,
    generator: Arc<dyn TextGenerator>,
    config: TableToTextConfig,
}

impl TableSummarizer {
    pub fn new(memo: Arc<Memoizer>, generator: Arc<dyn TextGenerator>, config: TableToTextConfig) -> Self {
        Self {
            memo,
            generator,
            config,
        }
    }

    /// Summarize a list of row objects.
    ///
    /// Empty input, non-list input and lists containing non-object rows all
    /// yield [`NO_DATA_MESSAGE`], which is cached like any other summary.
    /// Generation failures propagate and are not cached.
    pub async fn summarize(&self, rows: &Value) -> Result<String> {
        let key = CacheKey::for_table(rows);
        if let Some(summary) = self.memo.lookup::<String>(CacheNamespace::Table2Text, &key).await? {
            return Ok(summary);
        }

        let summary = match as_rows(rows) {
            Some(table) => {
                let prompt = build_prompt(&table);
                let generated = self
                    .generator
                    .generate(&prompt, self.config.max_new_tokens, self.config.temperature)
                    .await?;
                let summary = parse_summary(&generated);
                info!("Summarized {} rows", table.len());
                summary
            }
            None => {
                warn!("No rows to summarize");
                NO_DATA_MESSAGE.to_string()
            }
        };

        self.memo.store(CacheNamespace::Table2Text, &key, &summary).await?;
        Ok(summary)
    }
}

fn as_rows(rows: &Value) -> Option<Vec<&Map<String, Value>>> {
    let list = rows.as_array()?;
    if list.is_empty() {
        return None;
    }
    list.iter().map(Value::as_object).collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column header from the first row, then one numbered line per row.
pub fn render_table(rows: &[&Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let columns: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut lines = vec![format!("Column Names: {}.", columns.join(", "))];
    for (idx, row) in rows.iter().enumerate() {
        let values: Vec<String> = row.values().map(cell_text).collect();
        lines.push(format!("Row {}: ({})", idx + 1, values.join(", ")));
    }
    lines.join("\n") + "\n"
}

pub fn build_prompt(rows: &[&Map<String, Value>]) -> String {
    let mut parts = Vec::with_capacity(FEW_SHOT.len() * 2 + 1);
    for (table, summary) in FEW_SHOT.iter() {
        let example_rows = as_rows(table).unwrap_or_default();
        parts.push(format!("{}{}", TABLE_PREFIX, render_table(&example_rows)));
        parts.push(format!("{}{}\n", SUMMARY_PREFIX, summary));
    }
    parts.push(format!("{}{}", TABLE_PREFIX, render_table(rows)));

    format!("{}\n\n{}\n{}", INSTRUCTION, parts.join("\n"), SUMMARY_PREFIX)
}

/// First line after the summary prefix when the model echoes it, otherwise
/// the whole generation.
pub fn parse_summary(generated: &str) -> String {
    if generated.contains(SUMMARY_PREFIX) {
        let first_line = generated.split('\n').next().unwrap_or_default();
        first_line
            .rsplit(SUMMARY_PREFIX)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    } else {
        generated.trim().to_string()
    }
}
