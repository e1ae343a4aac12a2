/// Coverage tracker: which critical dimensions a conversation has established.
///
/// Coverage is created once per conversation from the product description and the
/// chapters present in the candidate set, then updated round by round from the user's
/// answers. The aggregate counters are always recomputed from the dimension records.
///
/// Answers resolve to dimensions in three fixed passes:
/// 1. the question id contains the dimension name (`fallback_material`)
/// 2. the question text contains the display name or the spoken name
/// 3. the joined answer text matches a coverage pattern of a still-uncovered dimension
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::code;
use crate::dimensions::{CriticalDimension, DimensionRegistry};
use crate::error::{ReasoningError, ReasoningResult};
use crate::questions::{other_text, ClarifyingQuestion, QuestionOption, QuestionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionStatus {
    /// Triggered by the description but outside the candidates' chapters.
    NotApplicable,
    CoveredImplicit,
    CoveredExplicit,
    Uncovered,
    /// Answered with an `other:` escape hatch.
    Skipped,
}

impl DimensionStatus {
    pub fn is_covered(self) -> bool {
        matches!(self, Self::CoveredImplicit | Self::CoveredExplicit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCoverage {
    pub dimension: String,
    pub status: DimensionStatus,
    /// Question id (or `description`) that established the dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub is_mandatory: bool,
}

impl DimensionCoverage {
    fn counts_as_mandatory(&self) -> bool {
        self.is_mandatory && self.status != DimensionStatus::NotApplicable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCoverage {
    conversation_id: String,
    product_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detected_chapter: Option<String>,
    dimensions: Vec<DimensionCoverage>,
    total_mandatory: usize,
    covered_mandatory: usize,
    is_complete: bool,
}

impl QuestionCoverage {
    fn new(
        conversation_id: &str,
        product_description: &str,
        detected_chapter: Option<String>,
        dimensions: Vec<DimensionCoverage>,
    ) -> Self {
        let mut coverage = Self {
            conversation_id: conversation_id.to_string(),
            product_description: product_description.to_string(),
            detected_chapter,
            dimensions,
            total_mandatory: 0,
            covered_mandatory: 0,
            is_complete: false,
        };
        coverage.recompute();
        coverage
    }

    /// Rebuild the aggregate counters from the dimension records.
    pub fn recompute(&mut self) {
        let mandatory = self.dimensions.iter().filter(|d| d.counts_as_mandatory());
        self.total_mandatory = mandatory.clone().count();
        self.covered_mandatory = mandatory.filter(|d| d.status.is_covered()).count();
        self.is_complete = self.covered_mandatory == self.total_mandatory;
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn product_description(&self) -> &str {
        &self.product_description
    }

    pub fn detected_chapter(&self) -> Option<&str> {
        self.detected_chapter.as_deref()
    }

    pub fn dimensions(&self) -> &[DimensionCoverage] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionCoverage> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }

    pub fn total_mandatory(&self) -> usize {
        self.total_mandatory
    }

    pub fn covered_mandatory(&self) -> usize {
        self.covered_mandatory
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Mandatory dimensions not yet covered (uncovered or skipped), in record order.
    pub fn missing_mandatory(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .filter(|d| d.counts_as_mandatory() && !d.status.is_covered())
            .map(|d| d.dimension.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageValidation {
    pub is_valid: bool,
    pub missing_mandatory: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Select the dimensions relevant to `product_description` and mark the ones the
/// description already answers.
pub fn initialize_coverage<S: AsRef<str>>(
    conversation_id: &str,
    product_description: &str,
    candidate_codes: &[S],
) -> ReasoningResult<QuestionCoverage> {
    if conversation_id.trim().is_empty() {
        return Err(ReasoningError::MissingConversationId);
    }

    let chapters = detected_chapters(candidate_codes);
    let chapter_numbers: Vec<u8> = chapters
        .iter()
        .filter_map(|(c, _)| code::chapter_number(c))
        .collect();
    let detected_chapter = chapters
        .iter()
        .fold(None::<&(String, usize)>, |best, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
        .map(|(c, _)| c.clone());

    let dimensions = DimensionRegistry::global()
        .iter()
        .filter(|d| d.is_triggered_by(product_description))
        .map(|d| {
            let status = if !d.applies_to(&chapter_numbers) {
                DimensionStatus::NotApplicable
            } else if d.is_covered_by(product_description) {
                DimensionStatus::CoveredImplicit
            } else {
                DimensionStatus::Uncovered
            };
            DimensionCoverage {
                dimension: d.name.to_string(),
                status,
                covered_by: (status == DimensionStatus::CoveredImplicit)
                    .then(|| "description".to_string()),
                value: None,
                is_mandatory: d.mandatory,
            }
        })
        .collect();

    Ok(QuestionCoverage::new(
        conversation_id,
        product_description,
        detected_chapter,
        dimensions,
    ))
}

/// Chapters present in `codes` with their counts, in first-seen order.
fn detected_chapters<S: AsRef<str>>(codes: &[S]) -> Vec<(String, usize)> {
    let mut chapters: Vec<(String, usize)> = Vec::new();
    for code in codes {
        let chapter = code::chapter(code.as_ref().trim());
        if chapter.len() != 2 {
            continue;
        }
        match chapters.iter_mut().find(|(c, _)| c == chapter) {
            Some((_, n)) => *n += 1,
            None => chapters.push((chapter.to_string(), 1)),
        }
    }
    chapters
}

/// The registry dimension a question is about, by id (pass 1) then by text (pass 2).
pub fn resolve_dimension(question_id: &str, question_text: &str) -> Option<&'static str> {
    let registry = DimensionRegistry::global();
    let id = question_id.to_lowercase();
    if let Some(d) = registry.iter().find(|d| id.contains(d.name)) {
        return Some(d.name);
    }

    let text = question_text.to_lowercase();
    if text.is_empty() {
        return None;
    }
    registry
        .iter()
        .find(|d| text.contains(&d.display_name.to_lowercase()) || text.contains(&d.spoken_name()))
        .map(|d| d.name)
}

/// Apply one batch of answers. Returns the updated coverage; `coverage` is unchanged.
///
/// A covered dimension is never downgraded, so completeness never goes back to false.
pub fn update_coverage_from_answers(
    coverage: &QuestionCoverage,
    answers: &BTreeMap<String, String>,
    asked_questions: &[ClarifyingQuestion],
) -> QuestionCoverage {
    let mut next = coverage.clone();

    for (question_id, answer) in answers {
        let question_text = asked_questions
            .iter()
            .find(|q| &q.id == question_id)
            .map(|q| q.text.as_str())
            .unwrap_or_default();

        let Some(name) = resolve_dimension(question_id, question_text) else {
            debug!(question_id, "answer maps to no dimension");
            continue;
        };
        let Some(record) = next.dimensions.iter_mut().find(|d| d.dimension == name) else {
            debug!(question_id, dimension = name, "answered dimension is not tracked");
            continue;
        };

        match other_text(answer) {
            Some(_) => {
                if record.status == DimensionStatus::Uncovered {
                    record.status = DimensionStatus::Skipped;
                    record.covered_by = Some(question_id.clone());
                }
            }
            None => {
                if matches!(
                    record.status,
                    DimensionStatus::Uncovered | DimensionStatus::Skipped
                ) {
                    record.status = DimensionStatus::CoveredExplicit;
                    record.covered_by = Some(question_id.clone());
                    record.value = Some(answer.trim().to_string());
                }
            }
        }
    }

    // Pass 3 scans every answer joined together, so a phrase split across answers still
    // counts. A match is credited to the answer it starts in.
    let mut joined = String::new();
    let mut owners: Vec<(usize, &String)> = Vec::with_capacity(answers.len());
    for (question_id, answer) in answers {
        let text = answer_text(answer).trim();
        if text.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push(' ');
        }
        owners.push((joined.len(), question_id));
        joined.push_str(text);
    }

    let registry = DimensionRegistry::global();
    for record in next
        .dimensions
        .iter_mut()
        .filter(|d| d.status == DimensionStatus::Uncovered)
    {
        let Some((start, end)) = registry
            .get(&record.dimension)
            .and_then(|d| d.coverage_match(&joined))
        else {
            continue;
        };
        let Some((_, question_id)) = owners.iter().rev().find(|(offset, _)| *offset <= start) else {
            continue;
        };
        record.status = DimensionStatus::CoveredExplicit;
        record.covered_by = Some((*question_id).clone());
        record.value = Some(joined[start..end].to_string());
    }

    next.recompute();
    next
}

/// The free text of an answer, without any `other:` prefix.
fn answer_text(answer: &str) -> &str {
    other_text(answer).unwrap_or(answer)
}

/// Check that every mandatory dimension is covered.
///
/// With `force_classify` the result is always valid, but still lists what is missing.
pub fn validate_coverage(coverage: &QuestionCoverage, force_classify: bool) -> CoverageValidation {
    let missing_mandatory = coverage.missing_mandatory();
    let warning = (!missing_mandatory.is_empty()).then(|| {
        let verb = if force_classify {
            "classification forced with"
        } else {
            "still missing"
        };
        format!(
            "{verb} {} mandatory dimension(s): {}",
            missing_mandatory.len(),
            missing_mandatory.join(", ")
        )
    });
    CoverageValidation {
        is_valid: force_classify || missing_mandatory.is_empty(),
        missing_mandatory,
        warning,
    }
}

/// Questions for up to `max_questions` uncovered mandatory dimensions, lowest priority
/// number first. Skipped dimensions are not asked again.
pub fn generate_fallback_questions(
    coverage: &QuestionCoverage,
    max_questions: usize,
) -> Vec<ClarifyingQuestion> {
    let registry = DimensionRegistry::global();
    let mut open: Vec<&CriticalDimension> = coverage
        .dimensions
        .iter()
        .filter(|d| d.is_mandatory && d.status == DimensionStatus::Uncovered)
        .filter_map(|d| registry.get(&d.dimension))
        .collect();
    open.sort_by_key(|d| d.priority);

    let description = coverage.product_description.as_str();
    open.into_iter()
        .take(max_questions)
        .map(|d| ClarifyingQuestion {
            id: format!("fallback_{}", d.name),
            source: QuestionSource::Coverage,
            level: None,
            dimension: Some(d.name.to_string()),
            text: d.question_text(description),
            options: d
                .options_for(description)
                .iter()
                .map(|o| QuestionOption::text(o))
                .collect(),
            allow_other: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn status(coverage: &QuestionCoverage, name: &str) -> DimensionStatus {
        coverage.dimension(name).unwrap().status
    }

    #[test]
    fn test_rice_needs_three_mandatory_dimensions() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30", "1006.10"]).unwrap();
        for name in ["species_variety", "form_state", "processing_level"] {
            assert_eq!(status(&coverage, name), DimensionStatus::Uncovered);
            assert!(coverage.dimension(name).unwrap().is_mandatory);
        }
        assert_eq!(coverage.total_mandatory(), 3);
        assert_eq!(coverage.covered_mandatory(), 0);
        assert!(!coverage.is_complete());
        assert_eq!(coverage.detected_chapter(), Some("10"));
    }

    #[test]
    fn test_description_covers_implicitly() {
        let coverage =
            initialize_coverage("c1", "parboiled basmati rice", &["1006.30"]).unwrap();
        assert_eq!(status(&coverage, "species_variety"), DimensionStatus::CoveredImplicit);
        assert_eq!(status(&coverage, "processing_level"), DimensionStatus::CoveredImplicit);
        assert_eq!(status(&coverage, "form_state"), DimensionStatus::Uncovered);
        assert_eq!(coverage.covered_mandatory(), 2);
    }

    #[test]
    fn test_out_of_range_dimensions_are_not_applicable() {
        let coverage = initialize_coverage("c1", "rice", &["8708.30"]).unwrap();
        assert_eq!(status(&coverage, "species_variety"), DimensionStatus::NotApplicable);
        assert_eq!(coverage.total_mandatory(), 0);
        assert!(coverage.is_complete());
    }

    #[test]
    fn test_empty_conversation_id_is_rejected() {
        let err = initialize_coverage::<&str>("  ", "rice", &[]).unwrap_err();
        assert!(matches!(err, ReasoningError::MissingConversationId));
    }

    #[test]
    fn test_resolve_dimension_passes() {
        assert_eq!(resolve_dimension("fallback_form_state", ""), Some("form_state"));
        assert_eq!(
            resolve_dimension("q7", "What material is the bag made of?"),
            Some("material")
        );
        assert_eq!(resolve_dimension("q7", "Anything else?"), None);
    }

    #[test]
    fn test_answers_cover_explicitly_or_skip() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[
                ("fallback_species_variety", "Basmati"),
                ("fallback_form_state", "other: sort of crumbly"),
            ]),
            &[],
        );
        assert_eq!(status(&updated, "species_variety"), DimensionStatus::CoveredExplicit);
        assert_eq!(
            updated.dimension("species_variety").unwrap().value.as_deref(),
            Some("Basmati")
        );
        assert_eq!(status(&updated, "form_state"), DimensionStatus::Skipped);
        assert_eq!(updated.covered_mandatory(), 1);
        assert_eq!(updated.missing_mandatory(), vec!["form_state", "processing_level"]);
        // The input is untouched.
        assert_eq!(coverage.covered_mandatory(), 0);
    }

    #[test]
    fn test_answer_text_covers_unasked_dimension() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[("fallback_species_variety", "Basmati, parboiled")]),
            &[],
        );
        assert_eq!(status(&updated, "processing_level"), DimensionStatus::CoveredExplicit);
        assert_eq!(
            updated.dimension("processing_level").unwrap().covered_by.as_deref(),
            Some("fallback_species_variety")
        );
    }

    #[test]
    fn test_question_id_outranks_question_text() {
        assert_eq!(
            resolve_dimension("fallback_form_state", "Which species variety is it?"),
            Some("form_state")
        );

        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let asked = vec![ClarifyingQuestion {
            id: "fallback_form_state".to_string(),
            source: QuestionSource::Coverage,
            level: None,
            dimension: None,
            text: "Which species variety is it?".to_string(),
            options: Vec::new(),
            allow_other: true,
        }];
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[("fallback_form_state", "Broken")]),
            &asked,
        );
        assert_eq!(status(&updated, "form_state"), DimensionStatus::CoveredExplicit);
        assert_eq!(status(&updated, "species_variety"), DimensionStatus::Uncovered);
    }

    #[test]
    fn test_incidental_match_keeps_direct_answer() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        // "broken" in the first answer matches form_state, which the second answer sets.
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[
                ("fallback_species_variety", "Basmati, broken"),
                ("hierarchy_3_form_state", "Whole"),
            ]),
            &[],
        );
        let form = updated.dimension("form_state").unwrap();
        assert_eq!(form.status, DimensionStatus::CoveredExplicit);
        assert_eq!(form.covered_by.as_deref(), Some("hierarchy_3_form_state"));
        assert_eq!(form.value.as_deref(), Some("Whole"));
    }

    #[test]
    fn test_incidental_match_does_not_lift_skipped() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let skipped = update_coverage_from_answers(
            &coverage,
            &answers(&[("fallback_form_state", "other: not sure")]),
            &[],
        );
        assert_eq!(status(&skipped, "form_state"), DimensionStatus::Skipped);

        let updated = update_coverage_from_answers(
            &skipped,
            &answers(&[("fallback_species_variety", "Basmati, broken")]),
            &[],
        );
        assert_eq!(status(&updated, "species_variety"), DimensionStatus::CoveredExplicit);
        assert_eq!(status(&updated, "form_state"), DimensionStatus::Skipped);
    }

    #[test]
    fn test_phrase_split_across_answers_covers() {
        let coverage = initialize_coverage("c1", "rice", &["1006.10"]).unwrap();
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[("q1", "in the"), ("q2", "husk")]),
            &[],
        );
        let form = updated.dimension("form_state").unwrap();
        assert_eq!(form.status, DimensionStatus::CoveredExplicit);
        assert_eq!(form.covered_by.as_deref(), Some("q1"));
        assert_eq!(form.value.as_deref(), Some("in the husk"));
    }

    #[test]
    fn test_covered_dimension_is_never_downgraded() {
        let coverage = initialize_coverage("c1", "basmati rice", &["1006.30"]).unwrap();
        let updated = update_coverage_from_answers(
            &coverage,
            &answers(&[("fallback_species_variety", "other: not sure")]),
            &[],
        );
        assert_eq!(status(&updated, "species_variety"), DimensionStatus::CoveredImplicit);
    }

    #[test]
    fn test_unmappable_answer_is_silent() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let updated =
            update_coverage_from_answers(&coverage, &answers(&[("q99", "yes")]), &[]);
        assert_eq!(updated, coverage);
    }

    #[test]
    fn test_validate_coverage_forced_reports_missing() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let strict = validate_coverage(&coverage, false);
        assert!(!strict.is_valid);
        assert_eq!(strict.missing_mandatory.len(), 3);

        let forced = validate_coverage(&coverage, true);
        assert!(forced.is_valid);
        assert_eq!(forced.missing_mandatory.len(), 3);
        assert!(forced.warning.unwrap().starts_with("classification forced"));
    }

    #[test]
    fn test_fallback_questions_follow_priority() {
        let coverage = initialize_coverage("c1", "rice", &["1006.30"]).unwrap();
        let questions = generate_fallback_questions(&coverage, 2);
        let ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["fallback_species_variety", "fallback_form_state"]);
        assert_eq!(questions[0].options[0].value, "Basmati");
        assert!(questions.iter().all(|q| q.allow_other));
    }

    #[test]
    fn test_shirt_material_options() {
        let coverage = initialize_coverage("c1", "men's shirt", &["6205.20"]).unwrap();
        let questions = generate_fallback_questions(&coverage, 5);
        let material = questions
            .iter()
            .find(|q| q.id == "fallback_material")
            .unwrap();
        let options: Vec<&str> = material.options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(options, vec!["Cotton", "Polyester", "Silk", "Wool", "Synthetic blend"]);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut coverage = initialize_coverage("c1", "basmati rice", &["1006.30"]).unwrap();
        let before = coverage.clone();
        coverage.recompute();
        coverage.recompute();
        assert_eq!(coverage, before);
    }
}
