/// Elimination engine: removes candidates that contradict what the user has asserted.
///
/// Only rules of the active product categories are considered (see `active_categories`).
/// Such a rule fires when its value name or one of its triggers appears in the original
/// query or among the accumulated modifiers. Fired rules are checked per candidate in the fixed
/// kind order (variety, processing state, grade, form, decaffeination, flavoring,
/// material); the first failing check vetoes the candidate.
///
/// Elimination never empties a non-empty candidate set. When it would, the engine falls
/// back to the chapter mandated by a fired rule, or failing that to the unfiltered set,
/// and tags the result (`fallback:chapter:<P>` / `fallback:all`).
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Candidate, ModifierSet};
use crate::rules::matcher::{uncontained, Span};
use crate::rules::{CompiledRule, EliminationRuleKind, RuleStore, RuleTable};

/// One candidate removed by one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    pub code: String,
    pub rule: String,
}

/// The safety net that was used when elimination would have removed every candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fallback {
    Chapter { chapter: String },
    All,
}

impl Fallback {
    pub fn tag(&self) -> String {
        match self {
            Fallback::Chapter { chapter } => format!("fallback:chapter:{chapter}"),
            Fallback::All => "fallback:all".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub filtered_codes: Vec<String>,
    /// Surviving candidates, in input order.
    pub candidates: Vec<Candidate>,
    pub eliminated_count: usize,
    /// Rules that removed at least one candidate, in order of first use, followed by the
    /// fallback tag if one was needed.
    pub applied_rules: Vec<String>,
    pub eliminations: Vec<Elimination>,
    pub fallback: Option<Fallback>,
    /// Product categories whose rules were considered.
    pub categories: Vec<String>,
}

impl FilterResult {
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct EliminationEngine {
    store: Arc<RuleStore>,
}

impl EliminationEngine {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    pub fn rules(&self) -> &RuleTable {
        self.store.ensure_loaded()
    }

    /// Filter `candidates` against `modifiers` and the original query.
    ///
    /// Deterministic: the same inputs always produce the same result.
    pub fn filter(
        &self,
        candidates: &[Candidate],
        modifiers: &ModifierSet,
        original_query: &str,
    ) -> FilterResult {
        let table = self.store.ensure_loaded();
        let categories = active_categories(table, original_query, candidates);
        let fired = fired_rules(table, modifiers, original_query, &categories);

        let mut survivors: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut eliminations: Vec<Elimination> = Vec::new();
        let mut applied_rules: Vec<String> = Vec::new();

        for candidate in candidates {
            match first_veto(&fired, candidate) {
                None => survivors.push(candidate.clone()),
                Some(rule) => {
                    let rule_id = rule.id();
                    debug!(code = %candidate.code, rule = %rule_id, "candidate eliminated");
                    if !applied_rules.contains(&rule_id) {
                        applied_rules.push(rule_id.clone());
                    }
                    eliminations.push(Elimination {
                        code: candidate.code.clone(),
                        rule: rule_id,
                    });
                }
            }
        }

        let mut fallback = None;
        if survivors.is_empty() && !candidates.is_empty() {
            let (kept, used) = fall_back(&fired, candidates);
            warn!(
                fallback = %used.tag(),
                candidates = candidates.len(),
                kept = kept.len(),
                "elimination would remove every candidate, falling back"
            );
            eliminations.retain(|e| !kept.iter().any(|c| c.code == e.code));
            applied_rules.push(used.tag());
            survivors = kept;
            fallback = Some(used);
        }

        FilterResult {
            filtered_codes: survivors.iter().map(|c| c.code.clone()).collect(),
            eliminated_count: candidates.len() - survivors.len(),
            candidates: survivors,
            applied_rules,
            eliminations,
            fallback,
            categories,
        }
    }
}

/// Product categories whose rules may fire for this query and candidate set.
///
/// Categories named in the query win; failing that, those named by candidate
/// descriptions; failing that, every category. Modifiers play no part, so within one
/// conversation the active set is fixed and never shrinks as facts accumulate.
pub fn active_categories(table: &RuleTable, query: &str, candidates: &[Candidate]) -> Vec<String> {
    let named = table.categories_named_in(query);
    if !named.is_empty() {
        return named;
    }
    let descriptions = candidates
        .iter()
        .map(|c| c.description.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    let named = table.categories_named_in(&descriptions);
    if !named.is_empty() {
        return named;
    }
    table.categories().to_vec()
}

/// Rules of the `categories` fired by the query and modifiers.
///
/// Within one kind, an activation match lying strictly inside a longer match of a
/// sibling rule does not count ("not decaffeinated" does not fire "decaffeinated").
/// Each modifier is its own segment of the scanned text, so adding modifiers can only
/// add fired rules.
pub fn fired_rules<'t>(
    table: &'t RuleTable,
    modifiers: &ModifierSet,
    original_query: &str,
    categories: &[String],
) -> Vec<&'t CompiledRule> {
    let text = std::iter::once(original_query)
        .chain(modifiers.iter().map(|m| m.as_str()))
        .collect::<Vec<_>>()
        .join(" | ");

    let mut fired = Vec::new();
    for kind in EliminationRuleKind::CHECK_ORDER {
        let matched: Vec<(&CompiledRule, Vec<Span>)> = table
            .rules_of(kind)
            .filter(|r| categories.contains(&r.category))
            .map(|r| (r, r.activation.spans(&text)))
            .filter(|(_, spans)| !spans.is_empty())
            .collect();

        for (i, (rule, own)) in matched.iter().enumerate() {
            let siblings: Vec<Span> = matched
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, (_, spans))| spans.iter().copied())
                .collect();
            if !uncontained(own, &siblings).is_empty() {
                fired.push(*rule);
            }
        }
    }
    fired
}

/// Whether `rule` lets `candidate` through.
///
/// Chapter authority comes first: membership in the rule's mandated chapter keeps the
/// candidate whatever its text says. Otherwise excluded chapters are dropped, and the
/// description is dropped iff an exclude term matches outside every include match while
/// no include term matches outside every exclude match.
pub fn should_include(rule: &CompiledRule, candidate: &Candidate) -> bool {
    let chapter = candidate.chapter();
    if rule.must_be_in_chapter.as_deref() == Some(chapter) {
        return true;
    }
    if rule.exclude_chapters.iter().any(|c| c == chapter) {
        return false;
    }

    let text = candidate.description.as_str();
    let exclude_spans = rule.exclude.spans(text);
    if exclude_spans.is_empty() {
        return true;
    }
    let include_spans = rule.include.spans(text);
    if uncontained(&exclude_spans, &include_spans).is_empty() {
        return true;
    }
    !uncontained(&include_spans, &exclude_spans).is_empty()
}

fn first_veto<'t>(fired: &[&'t CompiledRule], candidate: &Candidate) -> Option<&'t CompiledRule> {
    for kind in EliminationRuleKind::CHECK_ORDER {
        for rule in fired.iter().filter(|r| r.kind == kind) {
            if !should_include(rule, candidate) {
                return Some(*rule);
            }
        }
    }
    None
}

fn fall_back(fired: &[&CompiledRule], candidates: &[Candidate]) -> (Vec<Candidate>, Fallback) {
    if let Some(chapter) = fired.iter().find_map(|r| r.must_be_in_chapter.as_deref()) {
        let in_chapter: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.chapter() == chapter)
            .cloned()
            .collect();
        if !in_chapter.is_empty() {
            return (
                in_chapter,
                Fallback::Chapter {
                    chapter: chapter.to_string(),
                },
            );
        }
    }
    (candidates.to_vec(), Fallback::All)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(json: &str) -> EliminationEngine {
        EliminationEngine::new(Arc::new(RuleStore::from_json(json)))
    }

    fn modifiers(tokens: &[&str]) -> ModifierSet {
        tokens.iter().copied().collect()
    }

    const COFFEE_RULES: &str = r#"{
        "metadata": { "version": "test" },
        "varietyRules": {
            "coffee": {
                "arabica": { "include": ["arabica"], "exclude": ["robusta"] },
                "robusta": { "include": ["robusta"], "exclude": ["arabica"] }
            }
        },
        "processingStateRules": {
            "coffee": {
                "instant": {
                    "include": ["instant", "extracts"],
                    "exclude": ["roasted"],
                    "mustBeInChapter": "21"
                }
            }
        },
        "decaffeinationRules": {
            "coffee": {
                "decaffeinated": { "include": ["decaffeinated"], "exclude": ["not decaffeinated"] },
                "not decaffeinated": { "include": ["not decaffeinated"], "exclude": ["decaffeinated"] }
            }
        }
    }"#;

    #[test]
    fn test_no_modifiers_keeps_everything() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.31", "Robusta cherry"),
            Candidate::new("0901.11.11", "Arabica plantation"),
        ];
        let result = engine.filter(&candidates, &ModifierSet::new(), "");
        assert_eq!(result.filtered_codes.len(), 2);
        assert_eq!(result.eliminated_count, 0);
        assert!(result.applied_rules.is_empty());
    }

    #[test]
    fn test_variety_rule_removes_contradicting_candidate() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.31", "Robusta cherry"),
            Candidate::new("0901.11.11", "Arabica plantation"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["arabica"]), "");
        assert_eq!(result.filtered_codes, vec!["0901.11.11"]);
        assert_eq!(result.applied_rules, vec!["variety:arabica"]);
        assert_eq!(
            result.eliminations,
            vec![Elimination {
                code: "0901.11.31".to_string(),
                rule: "variety:arabica".to_string()
            }]
        );
    }

    #[test]
    fn test_candidate_matching_both_include_and_exclude_survives() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.90", "Blends of arabica and robusta"),
            Candidate::new("0901.11.31", "Robusta cherry"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["arabica"]), "");
        assert_eq!(result.filtered_codes, vec!["0901.11.90"]);
    }

    #[test]
    fn test_chapter_authority_overrides_text_exclusion() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("2101.11", "Extracts of coffee; roasted chicory"),
            Candidate::new("0901.21", "Coffee, roasted"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["instant"]), "instant coffee");
        assert_eq!(result.filtered_codes, vec!["2101.11"]);
        assert_eq!(result.applied_rules, vec!["processingState:instant"]);
    }

    #[test]
    fn test_sibling_phrase_does_not_fire_shorter_rule() {
        let engine = engine(COFFEE_RULES);
        let table = engine.rules();
        let fired = fired_rules(table, &modifiers(&["not decaffeinated"]), "", table.categories());
        let ids: Vec<String> = fired.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["decaffeination:not decaffeinated"]);
    }

    #[test]
    fn test_span_aware_decaffeination() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.12", "Coffee, not roasted, decaffeinated"),
            Candidate::new("0901.11", "Coffee, not roasted, not decaffeinated"),
        ];
        let decaf = engine.filter(&candidates, &modifiers(&["decaffeinated"]), "");
        assert_eq!(decaf.filtered_codes, vec!["0901.12"]);

        let regular = engine.filter(&candidates, &modifiers(&["not decaffeinated"]), "");
        assert_eq!(regular.filtered_codes, vec!["0901.11"]);
    }

    #[test]
    fn test_fallback_to_all_when_no_chapter_is_mandated() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.31", "Robusta, roasted"),
            Candidate::new("0901.11.11", "Arabica, roasted"),
        ];
        // Each variety vetoes the other, and chapter 21 has no candidates to fall back to.
        let result = engine.filter(&candidates, &modifiers(&["arabica", "robusta", "instant"]), "");
        assert_eq!(result.fallback, Some(Fallback::All));
        assert_eq!(result.filtered_codes.len(), 2);
        assert_eq!(result.eliminated_count, 0);
        assert!(result.eliminations.is_empty());
        assert_eq!(result.applied_rules.last().map(String::as_str), Some("fallback:all"));
    }

    #[test]
    fn test_mandated_chapter_survives_without_fallback() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.21", "Coffee, roasted"),
            Candidate::new("2101.12", "Preparations with a basis of extracts"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["instant"]), "");
        assert_eq!(result.filtered_codes, vec!["2101.12"]);
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_chapter_fallback_when_everything_is_vetoed() {
        let engine = engine(
            r#"{
                "metadata": { "version": "test" },
                "varietyRules": { "coffee": { "arabica": { "include": ["arabica"], "exclude": ["robusta"] } } },
                "processingStateRules": {
                    "coffee": { "instant": { "exclude": ["roasted"], "mustBeInChapter": "21" } }
                }
            }"#,
        );
        let candidates = vec![
            Candidate::new("2101.11", "Robusta extracts"),
            Candidate::new("0901.21", "Coffee, roasted"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["arabica", "instant"]), "");
        assert_eq!(
            result.fallback,
            Some(Fallback::Chapter {
                chapter: "21".to_string()
            })
        );
        assert_eq!(result.filtered_codes, vec!["2101.11"]);
        assert_eq!(result.eliminated_count, 1);
        assert!(result
            .applied_rules
            .contains(&"fallback:chapter:21".to_string()));
    }

    const TEA_AND_COFFEE_RULES: &str = r#"{
        "metadata": { "version": "test" },
        "varietyRules": {
            "tea": { "green": { "include": ["green"], "exclude": ["black"] } },
            "coffee": { "arabica": { "include": ["arabica"], "exclude": ["robusta"] } }
        },
        "processingStateRules": {
            "coffee": { "green": { "include": ["green"], "exclude": ["roasted", "extracts"] } }
        }
    }"#;

    #[test]
    fn test_query_category_scopes_rules() {
        let engine = engine(TEA_AND_COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0902.30", "Black tea"),
            Candidate::new("0902.10", "Green tea"),
            Candidate::new("0901.11", "Robusta coffee"),
            Candidate::new("0901.12", "Arabica coffee"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["green", "arabica"]), "coffee");
        assert_eq!(result.categories, vec!["coffee"]);
        assert_eq!(result.filtered_codes, vec!["0902.30", "0902.10", "0901.12"]);
        assert_eq!(result.applied_rules, vec!["variety:arabica"]);
    }

    #[test]
    fn test_candidate_descriptions_name_categories_when_query_does_not() {
        let engine = engine(TEA_AND_COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0902.30", "Black tea"),
            Candidate::new("0902.10", "Green tea"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["green"]), "something to drink");
        assert_eq!(result.categories, vec!["tea"]);
        assert_eq!(result.filtered_codes, vec!["0902.10"]);
        assert_eq!(result.applied_rules, vec!["variety:green"]);
    }

    #[test]
    fn test_unnamed_categories_are_all_active() {
        let engine = engine(TEA_AND_COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.31", "Robusta cherry"),
            Candidate::new("0901.11.11", "Arabica plantation"),
        ];
        let result = engine.filter(&candidates, &modifiers(&["arabica"]), "beans");
        assert_eq!(result.categories, vec!["coffee", "tea"]);
        assert_eq!(result.filtered_codes, vec!["0901.11.11"]);
    }

    #[test]
    fn test_coffee_rule_spares_tea_extract() {
        let engine = EliminationEngine::new(Arc::new(RuleStore::embedded()));
        let candidates = vec![
            Candidate::new(
                "0902.10",
                "Green tea (not fermented) in immediate packings of a content not exceeding 3 kg",
            ),
            Candidate::new("2101.20", "Extracts, essences and concentrates, of tea or mate"),
        ];
        let result = engine.filter(
            &candidates,
            &modifiers(&["extract", "green tea"]),
            "green tea extract",
        );
        assert_eq!(result.categories, vec!["tea"]);
        assert_eq!(result.filtered_codes, vec!["0902.10", "2101.20"]);
        assert!(result.applied_rules.is_empty());
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_active_categories_ignore_modifiers() {
        let engine = engine(TEA_AND_COFFEE_RULES);
        let candidates = vec![Candidate::new("0902.10", "Green tea")];
        let plain = engine.filter(&candidates, &ModifierSet::new(), "green tea");
        let noisy = engine.filter(&candidates, &modifiers(&["coffee", "arabica"]), "green tea");
        assert_eq!(plain.categories, noisy.categories);
    }

    #[test]
    fn test_more_modifiers_never_fire_fewer_rules() {
        let engine = engine(COFFEE_RULES);
        let table = engine.rules();
        let fewer = fired_rules(table, &modifiers(&["decaffeinated"]), "", table.categories());
        let more = fired_rules(table, &modifiers(&["decaffeinated", "not decaffeinated"]), "", table.categories());
        assert!(fewer.iter().all(|r| more.iter().any(|m| m.id() == r.id())));
        assert_eq!(more.len(), 2);
    }

    #[test]
    fn test_degraded_store_is_a_no_op() {
        let engine = engine("not json at all");
        let candidates = vec![Candidate::new("0901.11.31", "Robusta")];
        let result = engine.filter(&candidates, &modifiers(&["arabica"]), "");
        assert_eq!(result.filtered_codes, vec!["0901.11.31"]);
        assert!(engine.rules().is_degraded());
    }

    #[test]
    fn test_filter_is_deterministic() {
        let engine = engine(COFFEE_RULES);
        let candidates = vec![
            Candidate::new("0901.11.31", "Robusta cherry"),
            Candidate::new("0901.11.11", "Arabica plantation"),
            Candidate::new("2101.11", "Extracts, roasted chicory"),
        ];
        let m = modifiers(&["arabica", "instant"]);
        assert_eq!(engine.filter(&candidates, &m, "q"), engine.filter(&candidates, &m, "q"));
    }
}
