/// Clarifying questions and the per-round question orchestrator.
///
/// Hierarchy questions are primary. Coverage fallback questions are added only for
/// mandatory dimensions that no hierarchy question already addresses, and the merged
/// batch is capped at the per-round maximum.
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::coverage::{generate_fallback_questions, resolve_dimension, QuestionCoverage};
use crate::hierarchy::HierarchyAnalysis;

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Hierarchy,
    Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub display_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matching_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_code: Option<String>,
}

impl QuestionOption {
    /// A plain option whose value is its display text.
    pub fn text(text: &str) -> Self {
        Self {
            value: text.to_string(),
            display_text: text.to_string(),
            matching_codes: Vec::new(),
            branch_code: None,
        }
    }
}

/// A question put to the user in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub id: String,
    pub source: QuestionSource,
    /// Hierarchy level (1..4) for hierarchy questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    pub text: String,
    pub options: Vec<QuestionOption>,
    /// Whether an `other:<free text>` answer is accepted.
    pub allow_other: bool,
}

impl ClarifyingQuestion {
    /// The option chosen by `answer`, matched on value or display text.
    pub fn option_for(&self, answer: &str) -> Option<&QuestionOption> {
        let answer = answer.trim();
        self.options.iter().find(|o| {
            o.value.eq_ignore_ascii_case(answer) || o.display_text.eq_ignore_ascii_case(answer)
        })
    }

    /// The branch code pinned by answering with `answer`.
    pub fn branch_for(&self, answer: &str) -> Option<&str> {
        self.option_for(answer)
            .and_then(|o| o.branch_code.as_deref())
    }

    /// Whether this question asks about `dimension`.
    pub fn addresses(&self, dimension: &str) -> bool {
        self.dimension.as_deref() == Some(dimension)
            || resolve_dimension(&self.id, &self.text) == Some(dimension)
    }
}

/// Parse the escape-hatch answer form `other:<free text>`.
pub fn other_text(answer: &str) -> Option<&str> {
    let trimmed = answer.trim_start();
    let head = trimmed.get(..6)?;
    head.eq_ignore_ascii_case("other:")
        .then(|| trimmed[6..].trim())
}

/// Hierarchy questions first, then fallback questions for dimensions the hierarchy
/// questions leave open, capped at `max_total`.
pub fn merge_questions(
    hierarchy: Vec<ClarifyingQuestion>,
    fallback: Vec<ClarifyingQuestion>,
    max_total: usize,
) -> Vec<ClarifyingQuestion> {
    let mut merged = hierarchy;
    for question in fallback {
        let addressed = question
            .dimension
            .as_deref()
            .is_some_and(|d| merged.iter().any(|q| q.addresses(d)));
        if !addressed {
            merged.push(question);
        }
    }
    merged.truncate(max_total);
    merged
}

pub struct QuestionOrchestrator {
    config: EngineConfig,
}

impl QuestionOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The question batch for one round.
    ///
    /// Hierarchy questions are only asked while the hierarchy is not ready: subheading
    /// then tariff-line questions, or, when none remain, heading then chapter questions.
    pub fn plan(
        &self,
        analysis: &HierarchyAnalysis,
        coverage: &QuestionCoverage,
        hierarchy_ready: bool,
    ) -> Vec<ClarifyingQuestion> {
        let hierarchy: Vec<ClarifyingQuestion> = if hierarchy_ready {
            Vec::new()
        } else {
            let mut upfront = analysis.upfront_questions(self.config.max_hierarchy_questions);
            if upfront.is_empty() {
                upfront = analysis
                    .unresolved_at(2)
                    .chain(analysis.unresolved_at(1))
                    .take(self.config.max_hierarchy_questions)
                    .collect();
            }
            upfront.into_iter().map(|q| q.to_clarifying()).collect()
        };

        let fallback = generate_fallback_questions(coverage, self.config.max_fallback_questions);
        merge_questions(hierarchy, fallback, self.config.max_questions_per_round)
    }
}
