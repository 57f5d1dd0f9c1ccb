//! Schema catalog and request preprocessing
//!
//! Loads Spider-style `tables.json` descriptions of every database and turns a
//! question plus db id into the [`ParserContext`] shared by the parser, the
//! attribution engine and the intent classifier. The encoder has a fixed word
//! budget covering the question and the whole schema; inputs over budget are
//! rejected, never truncated.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One database as described in `tables.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub db_id: String,
    pub table_names: Vec<String>,
    /// `(table index, column name)`; index -1 is the `*` column
    pub column_names: Vec<(i64, String)>,
}

#[derive(Debug, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<String, DatabaseSchema>,
}

impl SchemaCatalog {
    pub fn from_schemas(schemas: Vec<DatabaseSchema>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|schema| (schema.db_id.clone(), schema))
                .collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "Failed to read schema tables {}: {}",
                path.display(),
                e
            ))
        })?;
        let schemas: Vec<DatabaseSchema> = serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "Failed to parse schema tables {}: {}",
                path.display(),
                e
            ))
        })?;

        info!("Loaded {} database schemas from {}", schemas.len(), path.display());
        Ok(Self::from_schemas(schemas))
    }

    pub fn get(&self, db_id: &str) -> Result<&DatabaseSchema> {
        self.schemas
            .get(db_id)
            .ok_or_else(|| OrchestratorError::UnknownDatabase(db_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Preprocessed request handed to the inference services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserContext {
    pub raw_question: String,
    pub db_id: String,
    pub question: Vec<String>,
    pub columns: Vec<String>,
    pub tables: Vec<String>,
}

pub struct Preprocessor {
    catalog: SchemaCatalog,
    token_budget: usize,
}

impl Preprocessor {
    pub fn new(catalog: SchemaCatalog, token_budget: usize) -> Self {
        Self {
            catalog,
            token_budget,
        }
    }

    pub fn run(&self, text: &str, db_id: &str) -> Result<ParserContext> {
        let schema = self.catalog.get(db_id)?;

        let question: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let columns: Vec<String> = schema.column_names.iter().map(|(_, name)| name.clone()).collect();
        let tables = schema.table_names.clone();

        // question + [CLS]/[SEP], each column as type token + words + separator,
        // each table as words + separator
        let words = question.len()
            + 2
            + columns.iter().map(|c| word_count(c) + 2).sum::<usize>()
            + tables.iter().map(|t| word_count(t) + 1).sum::<usize>();

        if words >= self.token_budget {
            return Err(OrchestratorError::InputTooLong {
                words,
                limit: self.token_budget,
            });
        }

        Ok(ParserContext {
            raw_question: text.to_string(),
            db_id: schema.db_id.clone(),
            question,
            columns,
            tables,
        })
    }
}

fn word_count(name: &str) -> usize {
    name.split_whitespace().count().max(1)
}
