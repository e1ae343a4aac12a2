/// Persisted rule document.
///
/// JSON layout (all rule maps optional):
///
/// ```json
/// {
///   "metadata": { "version": "1.2.0" },
///   "varietyRules": {
///     "coffee": {
///       "arabica": { "include": ["arabica"], "exclude": ["robusta"], "description": "..." }
///     }
///   },
///   "processingStateRules": {
///     "coffee": {
///       "instant": { "include": ["extracts"], "exclude": ["roasted"], "mustBeInChapter": "21" }
///     }
///   }
/// }
/// ```
///
/// Each map is keyed by product category, then by rule value (the modifier that fires it).
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ReasoningError, ReasoningResult};

/// `category → value → rule`. Ordered maps keep rule evaluation deterministic.
pub type CategoryRules = BTreeMap<String, BTreeMap<String, EliminationRule>>;

/// The seven rule kinds, in the order the elimination engine checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EliminationRuleKind {
    Variety,
    ProcessingState,
    Grade,
    Form,
    Decaffeination,
    Flavoring,
    Material,
}

impl EliminationRuleKind {
    pub const CHECK_ORDER: [EliminationRuleKind; 7] = [
        Self::Variety,
        Self::ProcessingState,
        Self::Grade,
        Self::Form,
        Self::Decaffeination,
        Self::Flavoring,
        Self::Material,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Variety => "variety",
            Self::ProcessingState => "processingState",
            Self::Grade => "grade",
            Self::Form => "form",
            Self::Decaffeination => "decaffeination",
            Self::Flavoring => "flavoring",
            Self::Material => "material",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// One named exclusion policy.
///
/// When the user implies the rule's value, candidates whose description matches an
/// `exclude` term are dropped unless they also match an `include` term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EliminationRule {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Chapter whose members are always kept by this rule, regardless of description text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_be_in_chapter: Option<String>,
    /// Chapters dropped outright when the rule fires.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_chapters: Vec<String>,
    /// Extra words that fire the rule besides its value name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    #[serde(default)]
    pub metadata: RuleMetadata,
    #[serde(default)]
    pub variety_rules: CategoryRules,
    #[serde(default)]
    pub processing_state_rules: CategoryRules,
    #[serde(default)]
    pub grade_rules: CategoryRules,
    #[serde(default)]
    pub form_rules: CategoryRules,
    #[serde(default)]
    pub decaffeination_rules: CategoryRules,
    #[serde(default)]
    pub flavoring_rules: CategoryRules,
    #[serde(default)]
    pub material_rules: CategoryRules,
}

impl RuleDocument {
    /// Parse and validate a rule document. A document without `metadata.version` is rejected.
    pub fn parse(json: &str) -> ReasoningResult<Self> {
        let document: RuleDocument =
            serde_json::from_str(json).map_err(|e| ReasoningError::RuleDocument(e.to_string()))?;
        if document.metadata.version.trim().is_empty() {
            return Err(ReasoningError::RuleDocument(
                "metadata.version is required".to_string(),
            ));
        }
        Ok(document)
    }

    pub fn rules(&self, kind: EliminationRuleKind) -> &CategoryRules {
        match kind {
            EliminationRuleKind::Variety => &self.variety_rules,
            EliminationRuleKind::ProcessingState => &self.processing_state_rules,
            EliminationRuleKind::Grade => &self.grade_rules,
            EliminationRuleKind::Form => &self.form_rules,
            EliminationRuleKind::Decaffeination => &self.decaffeination_rules,
            EliminationRuleKind::Flavoring => &self.flavoring_rules,
            EliminationRuleKind::Material => &self.material_rules,
        }
    }

    pub fn rule_count(&self) -> usize {
        EliminationRuleKind::CHECK_ORDER
            .iter()
            .map(|kind| self.rules(*kind).values().map(|v| v.len()).sum::<usize>())
            .sum()
    }
}
