/// Hierarchy description lookup, keyed by code prefix.
///
/// The engine only consumes this contract to label hierarchy branches; how a taxonomy is
/// authored is out of its hands. `StaticTaxonomy` loads the seed format produced by the
/// data scraper (an array of `{ "code", "description", ... }` records).
use std::collections::HashMap;

use serde::Deserialize;

use crate::code;
use crate::error::{ReasoningError, ReasoningResult};

pub trait TaxonomyLookup: Send + Sync {
    /// Description of the node at `prefix` (any dotted or bare digit form).
    fn describe(&self, prefix: &str) -> Option<String>;
}

/// A lookup that knows nothing; branches fall back to candidate descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTaxonomy;

impl TaxonomyLookup for NoTaxonomy {
    fn describe(&self, _prefix: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct SeedRecord {
    code: String,
    description: String,
}

/// An in-memory table keyed by bare digits.
#[derive(Debug, Clone, Default)]
pub struct StaticTaxonomy {
    entries: HashMap<String, String>,
}

impl StaticTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: &str, description: impl Into<String>) {
        let key = code::digits(code);
        if !key.is_empty() {
            self.entries.insert(key, description.into());
        }
    }

    /// Parse a seed array. Records with invalid codes or blank descriptions are skipped.
    pub fn from_seed_json(json: &str) -> ReasoningResult<Self> {
        let records: Vec<SeedRecord> =
            serde_json::from_str(json).map_err(|e| ReasoningError::Taxonomy(e.to_string()))?;
        let mut taxonomy = Self::new();
        for record in records {
            let description = record.description.trim();
            let valid = code::is_valid_code(&record.code) || code::digits(&record.code).len() == 2;
            if valid && !description.is_empty() {
                taxonomy.insert(&record.code, description);
            }
        }
        Ok(taxonomy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TaxonomyLookup for StaticTaxonomy {
    fn describe(&self, prefix: &str) -> Option<String> {
        self.entries.get(&code::digits(prefix)).cloned()
    }
}
