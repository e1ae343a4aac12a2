/// Hierarchy analyzer: finds the decision points in a candidate set.
///
/// Candidates are grouped by their prefix at each level (2, 4, 6, 8 digits). A level
/// with more than one group is a decision point and gets one required question whose
/// options are the groups. Chapter and heading levels look at every candidate; subheading
/// and tariff-line levels only look under the dominant heading, the heading with the
/// highest aggregated score inside the highest-scoring chapter.
///
/// A question is resolved, and need not be asked, when the user's own words already
/// single out one of its options.
use serde::{Deserialize, Serialize};

use crate::code::{self, LEVEL_DIGITS};
use crate::dimensions::DimensionRegistry;
use crate::keywords::{contains_phrase, normalize_text};
use crate::model::Candidate;
use crate::questions::{ClarifyingQuestion, QuestionOption, QuestionSource};
use crate::taxonomy::TaxonomyLookup;

/// Pathways allowed to default when only tariff-line questions remain.
pub const DEFAULT_TARIFF_PATHWAYS: usize = 3;

/// Words that never single out a branch.
const GENERIC_WORDS: &[&str] = &[
    "other", "others", "whether", "including", "excluding", "thereof", "articles",
    "products", "preparations", "containing", "similar", "parts", "mixtures",
    "kinds", "types", "otherwise", "specified", "elsewhere",
];

/// Words of at least this many characters can resolve a question on their own.
const MIN_RESOLVING_WORD_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyBranch {
    /// Dotted prefix shared by the branch's candidates.
    pub code: String,
    pub description: String,
    pub candidate_codes: Vec<String>,
    pub total_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredQuestion {
    pub id: String,
    pub level: u8,
    pub dimension: String,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub is_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<String>,
}

impl RequiredQuestion {
    pub fn to_clarifying(&self) -> ClarifyingQuestion {
        ClarifyingQuestion {
            id: self.id.clone(),
            source: QuestionSource::Hierarchy,
            level: Some(self.level),
            dimension: Some(self.dimension.clone()),
            text: self.question_text.clone(),
            options: self.options.clone(),
            allow_other: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    pub level: u8,
    pub digit_count: usize,
    pub is_decision_point: bool,
    pub branches: Vec<HierarchyBranch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_question: Option<RequiredQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_heading: Option<String>,
    pub levels: Vec<HierarchyLevel>,
    /// Distinct candidate codes, i.e. full pathways through the hierarchy.
    pub pathway_count: usize,
}

impl HierarchyAnalysis {
    /// Unresolved required questions, shallowest level first.
    pub fn unresolved(&self) -> impl Iterator<Item = &RequiredQuestion> {
        self.levels
            .iter()
            .filter_map(|l| l.required_question.as_ref())
            .filter(|q| !q.is_resolved)
    }

    pub fn unresolved_at(&self, level: u8) -> impl Iterator<Item = &RequiredQuestion> {
        self.unresolved().filter(move |q| q.level == level)
    }

    pub fn is_ready(&self) -> bool {
        is_ready_from_hierarchy(self, DEFAULT_TARIFF_PATHWAYS)
    }

    /// Subheading questions first, then tariff-line questions, at most `max_questions`.
    pub fn upfront_questions(&self, max_questions: usize) -> Vec<&RequiredQuestion> {
        self.unresolved_at(3)
            .chain(self.unresolved_at(4))
            .take(max_questions)
            .collect()
    }
}

/// Ready when nothing unresolved remains, or when only tariff-line questions remain and
/// at most `max_default_pathways` pathways survive.
pub fn is_ready_from_hierarchy(analysis: &HierarchyAnalysis, max_default_pathways: usize) -> bool {
    let mut unresolved = analysis.unresolved().peekable();
    if unresolved.peek().is_none() {
        return true;
    }
    unresolved.all(|q| q.level == 4) && analysis.pathway_count <= max_default_pathways
}

pub fn analyze_hierarchy(
    candidates: &[Candidate],
    product_description: &str,
    taxonomy: &dyn TaxonomyLookup,
) -> HierarchyAnalysis {
    let dominant_chapter = dominant(candidates.iter(), 2);
    let dominant_heading = dominant_chapter.as_ref().and_then(|chapter| {
        dominant(
            candidates.iter().filter(|c| code::is_under(&c.code, chapter)),
            4,
        )
    });

    let context = product_description.to_lowercase();
    let levels = (1u8..=4)
        .map(|level| {
            let digit_count = LEVEL_DIGITS[usize::from(level) - 1];
            let pool: Vec<&Candidate> = if level <= 2 {
                candidates.iter().collect()
            } else {
                match &dominant_heading {
                    Some(heading) => candidates
                        .iter()
                        .filter(|c| code::is_under(&c.code, heading))
                        .collect(),
                    None => Vec::new(),
                }
            };
            let branches = group_branches(&pool, digit_count, taxonomy);
            let is_decision_point = branches.len() > 1;
            let required_question = is_decision_point
                .then(|| synthesize_question(level, &branches, product_description, &context));
            HierarchyLevel {
                level,
                digit_count,
                is_decision_point,
                branches,
                required_question,
            }
        })
        .collect();

    let mut codes: Vec<&str> = candidates.iter().map(|c| c.code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();

    HierarchyAnalysis {
        dominant_chapter,
        dominant_heading,
        levels,
        pathway_count: codes.len(),
    }
}

/// Analyze and return the upfront questions.
pub fn get_upfront_questions(
    candidates: &[Candidate],
    product_description: &str,
    taxonomy: &dyn TaxonomyLookup,
    max_questions: usize,
) -> Vec<RequiredQuestion> {
    analyze_hierarchy(candidates, product_description, taxonomy)
        .upfront_questions(max_questions)
        .into_iter()
        .cloned()
        .collect()
}

/// Prefix with the highest aggregated weight; the first seen wins ties.
fn dominant<'a>(candidates: impl Iterator<Item = &'a Candidate>, digit_count: usize) -> Option<String> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    for candidate in candidates {
        let Some(prefix) = code::prefix_at(&candidate.code, digit_count) else {
            continue;
        };
        match totals.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, total)) => *total += candidate.weight(),
            None => totals.push((prefix, candidate.weight())),
        }
    }

    let mut best: Option<(String, f64)> = None;
    for (prefix, total) in totals {
        if best.as_ref().map_or(true, |(_, b)| total > *b) {
            best = Some((prefix, total));
        }
    }
    best.map(|(prefix, _)| prefix)
}

fn group_branches(
    pool: &[&Candidate],
    digit_count: usize,
    taxonomy: &dyn TaxonomyLookup,
) -> Vec<HierarchyBranch> {
    let mut branches: Vec<HierarchyBranch> = Vec::new();
    for candidate in pool {
        let Some(prefix) = code::prefix_at(&candidate.code, digit_count) else {
            continue;
        };
        match branches.iter_mut().find(|b| b.code == prefix) {
            Some(branch) => {
                if !branch.candidate_codes.contains(&candidate.code) {
                    branch.candidate_codes.push(candidate.code.clone());
                }
                branch.total_score += candidate.weight();
            }
            None => branches.push(HierarchyBranch {
                description: taxonomy
                    .describe(&prefix)
                    .unwrap_or_else(|| candidate.description.clone()),
                code: prefix,
                candidate_codes: vec![candidate.code.clone()],
                total_score: candidate.weight(),
            }),
        }
    }
    branches
}

fn synthesize_question(
    level: u8,
    branches: &[HierarchyBranch],
    product_description: &str,
    context: &str,
) -> RequiredQuestion {
    let options: Vec<QuestionOption> = branches
        .iter()
        .map(|b| QuestionOption {
            value: b.code.clone(),
            display_text: b.description.clone(),
            matching_codes: b.candidate_codes.clone(),
            branch_code: Some(b.code.clone()),
        })
        .collect();

    let product = match product_description.trim() {
        "" => "product",
        p => p,
    };
    let registry_dimension = (level >= 3)
        .then(|| {
            DimensionRegistry::global().iter().find(|d| {
                options
                    .iter()
                    .filter(|o| d.is_covered_by(&o.display_text))
                    .count()
                    >= 2
            })
        })
        .flatten();

    let (dimension, question_text) = match registry_dimension {
        Some(d) => (d.name.to_string(), d.question_text(product)),
        None => {
            let (name, text) = match level {
                1 => ("chapter", format!("Which product group does the {product} belong to?")),
                2 => ("heading", format!("Which of these best describes the {product}?")),
                3 => ("subheading", format!("Which of these matches the {product} most closely?")),
                _ => ("tariff_line", format!("Which specific type is the {product}?")),
            };
            (name.to_string(), text)
        }
    };

    let resolved_value = resolve_against(&options, context);
    RequiredQuestion {
        id: format!("hierarchy_{level}_{dimension}"),
        level,
        dimension,
        question_text,
        is_resolved: resolved_value.is_some(),
        resolved_value,
        options,
    }
}

/// The option the context already singles out, if any.
///
/// An option is picked when its key phrase (the text before the first comma, semicolon
/// or parenthesis) or one of its long words appears in the context, counting only terms
/// that do not occur in every option.
fn resolve_against(options: &[QuestionOption], context: &str) -> Option<String> {
    let texts: Vec<String> = options.iter().map(|o| normalize_text(&o.display_text)).collect();
    let shared_by_all = |term: &str| texts.iter().all(|t| contains_phrase(t, term));

    for (option, text) in options.iter().zip(&texts) {
        let key_phrase = normalize_text(
            option
                .display_text
                .split([',', ';', '('])
                .next()
                .unwrap_or_default(),
        );
        let key_matches = key_phrase.len() >= 3
            && !GENERIC_WORDS.contains(&key_phrase.as_str())
            && !shared_by_all(&key_phrase)
            && contains_phrase(context, &key_phrase);

        let word_matches = || {
            text.split(' ').any(|w| {
                w.len() >= MIN_RESOLVING_WORD_LEN
                    && !GENERIC_WORDS.contains(&w)
                    && !shared_by_all(w)
                    && contains_phrase(context, w)
            })
        };

        if key_matches || word_matches() {
            return Some(option.value.clone());
        }
    }
    None
}
