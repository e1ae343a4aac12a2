/// Rule store: loads the rule document at most once and serves the compiled table.
///
/// The store is an explicit, injectable object rather than process-wide state. Loading
/// happens lazily on the first `ensure_loaded()` call; the compiled table is immutable
/// afterwards and safe to read from many conversations concurrently.
///
/// A missing or unparseable document never fails the caller: the store logs the fault
/// and serves an empty, degraded table under which every elimination check passes.
use std::path::PathBuf;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::document::{EliminationRuleKind, RuleDocument};
use super::matcher::TermSet;

const DEFAULT_RULES: &str = include_str!("default_rules.json");

/// Where the rule document comes from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// The document compiled into the library.
    Embedded,
    /// A JSON file on disk.
    File(PathBuf),
    /// An in-memory JSON string.
    Json(String),
    /// No rules at all.
    Empty,
}

/// A rule with its term lists compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub kind: EliminationRuleKind,
    pub category: String,
    pub value: String,
    pub description: String,
    pub must_be_in_chapter: Option<String>,
    pub exclude_chapters: Vec<String>,
    pub include: TermSet,
    pub exclude: TermSet,
    /// The value name plus its triggers.
    pub activation: TermSet,
}

impl CompiledRule {
    /// Identifier reported in `applied_rules`, e.g. `variety:arabica`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.value)
    }
}

#[derive(Debug, Default)]
pub struct RuleTable {
    version: String,
    fingerprint: Option<String>,
    degraded: bool,
    rules: Vec<CompiledRule>,
    categories: Vec<String>,
    /// Singular and plural name of each category, parallel to `categories`.
    category_names: Vec<TermSet>,
    vocabulary: Vec<String>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    /// Compile a document. Rules are ordered by check order, then category, then value.
    pub fn compile(document: &RuleDocument, fingerprint: Option<String>) -> Self {
        let mut rules = Vec::with_capacity(document.rule_count());
        let mut categories: Vec<String> = Vec::new();
        let mut vocabulary: Vec<String> = Vec::new();

        for kind in EliminationRuleKind::CHECK_ORDER {
            for (category, values) in document.rules(kind) {
                if !categories.contains(category) {
                    categories.push(category.clone());
                }
                for (value, rule) in values {
                    let mut activation_terms = vec![value.clone()];
                    activation_terms.extend(rule.triggers.iter().cloned());
                    let activation = TermSet::compile(&activation_terms);
                    for term in activation.terms() {
                        if !vocabulary.iter().any(|v| v == term) {
                            vocabulary.push(term.to_string());
                        }
                    }

                    rules.push(CompiledRule {
                        kind,
                        category: category.clone(),
                        value: value.to_lowercase(),
                        description: rule.description.clone(),
                        must_be_in_chapter: rule.must_be_in_chapter.clone(),
                        exclude_chapters: rule.exclude_chapters.clone(),
                        include: TermSet::compile(&rule.include),
                        exclude: TermSet::compile(&rule.exclude),
                        activation,
                    });
                }
            }
        }

        let category_names = categories
            .iter()
            .map(|c| TermSet::compile(&[c.clone(), format!("{c}s")]))
            .collect();

        Self {
            version: document.metadata.version.clone(),
            fingerprint,
            degraded: false,
            rules,
            categories,
            category_names,
            vocabulary,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 of the raw document, when one was loaded.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// `true` when a configured document could not be loaded.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rules_of(&self, kind: EliminationRuleKind) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }

    /// Every value name and trigger, for modifier extraction.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Product categories in document order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Categories whose name appears in `text` as a whole word, in document order.
    pub fn categories_named_in(&self, text: &str) -> Vec<String> {
        self.categories
            .iter()
            .zip(&self.category_names)
            .filter(|(_, names)| names.is_match(text))
            .map(|(category, _)| category.clone())
            .collect()
    }
}

pub struct RuleStore {
    source: RuleSource,
    table: OnceLock<RuleTable>,
}

impl RuleStore {
    pub fn new(source: RuleSource) -> Self {
        Self {
            source,
            table: OnceLock::new(),
        }
    }

    pub fn embedded() -> Self {
        Self::new(RuleSource::Embedded)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(RuleSource::File(path.into()))
    }

    pub fn from_json(json: impl Into<String>) -> Self {
        Self::new(RuleSource::Json(json.into()))
    }

    pub fn empty() -> Self {
        Self::new(RuleSource::Empty)
    }

    /// Load the table on first use and return it.
    pub fn ensure_loaded(&self) -> &RuleTable {
        self.table.get_or_init(|| self.load())
    }

    fn load(&self) -> RuleTable {
        let raw = match &self.source {
            RuleSource::Embedded => DEFAULT_RULES.to_string(),
            RuleSource::Json(json) => json.clone(),
            RuleSource::File(path) => match std::fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "rule document unreadable, elimination disabled");
                    return RuleTable::degraded();
                }
            },
            RuleSource::Empty => {
                info!("no rule document configured, elimination disabled");
                return RuleTable::empty();
            }
        };

        let document = match RuleDocument::parse(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "rule document invalid, elimination disabled");
                return RuleTable::degraded();
            }
        };

        let table = RuleTable::compile(&document, Some(fingerprint(&raw)));
        info!(
            version = %table.version(),
            fingerprint = table.fingerprint().unwrap_or_default(),
            rule_count = table.rule_count(),
            "rule table loaded"
        );
        table
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::embedded()
    }
}

fn fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_rules_load() {
        let store = RuleStore::embedded();
        let table = store.ensure_loaded();
        assert!(!table.is_degraded());
        assert!(!table.version().is_empty());
        assert!(table.rule_count() > 0);
        assert_eq!(table.fingerprint().map(str::len), Some(64));
    }

    #[test]
    fn test_ensure_loaded_returns_same_table() {
        let store = RuleStore::embedded();
        let first = store.ensure_loaded() as *const RuleTable;
        let second = store.ensure_loaded() as *const RuleTable;
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_document_degrades_to_empty_table() {
        let store = RuleStore::from_json("{ definitely not json");
        let table = store.ensure_loaded();
        assert!(table.is_degraded());
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_file_degrades_to_empty_table() {
        let store = RuleStore::from_path("/nonexistent/hs-rules.json");
        assert!(store.ensure_loaded().is_degraded());
    }

    #[test]
    fn test_rules_follow_check_order() {
        let table = RuleStore::embedded();
        let table = table.ensure_loaded();
        let positions: Vec<usize> = table
            .rules()
            .iter()
            .map(|r| {
                EliminationRuleKind::CHECK_ORDER
                    .iter()
                    .position(|k| *k == r.kind)
                    .unwrap()
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_categories_and_vocabulary() {
        let store = RuleStore::from_json(
            r#"{
                "metadata": { "version": "t" },
                "varietyRules": { "coffee": { "arabica": { "exclude": ["robusta"] } } },
                "formRules": { "rice": { "broken": { "exclude": ["whole"] } } }
            }"#,
        );
        let table = store.ensure_loaded();
        assert_eq!(table.categories(), &["coffee".to_string(), "rice".to_string()]);
        assert_eq!(table.vocabulary(), &["arabica".to_string(), "broken".to_string()]);
        assert_eq!(table.categories_named_in("Broken RICE, 5 kg"), vec!["rice"]);
        assert_eq!(table.categories_named_in("arabica coffees"), vec!["coffee"]);
        assert!(table.categories_named_in("ricecakes").is_empty());
    }
}
