/// Conversation state machine.
///
/// ```text
/// collecting -> (asking <-> answering)* -> ready -> classified
///          any non-terminal phase -> abandoned
/// ```
///
/// The engine holds no per-conversation state. Every transition takes the full
/// `ConversationState`, leaves it untouched, and returns the next state together with the
/// round's outcome. A round re-applies elimination with every modifier gathered so far,
/// analyzes the hierarchy of the survivors, validates coverage, and either asks the next
/// batch of questions or declares the conversation ready. The round cap and an explicit
/// skip both force readiness while still reporting missing mandatory dimensions.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::code;
use crate::config::EngineConfig;
use crate::coverage::{
    initialize_coverage, update_coverage_from_answers, validate_coverage, QuestionCoverage,
};
use crate::elimination::EliminationEngine;
use crate::error::{ReasoningError, ReasoningResult};
use crate::hierarchy::{analyze_hierarchy, is_ready_from_hierarchy};
use crate::keywords::extract_modifiers;
use crate::model::{Candidate, ModifierSet};
use crate::questions::{other_text, ClarifyingQuestion, QuestionOrchestrator};
use crate::rules::{RuleStore, RuleTable};
use crate::taxonomy::TaxonomyLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collecting,
    Asking,
    Answering,
    Ready,
    Classified,
    Abandoned,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Classified | Self::Abandoned)
    }
}

/// Everything a conversation has accumulated. Handed back to the caller after every
/// transition and re-supplied on the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    pub description: String,
    pub phase: Phase,
    /// Question batches issued so far.
    pub round: u32,
    /// The retrieval candidates, never modified.
    pub candidates: Vec<Candidate>,
    pub modifiers: ModifierSet,
    pub answers: BTreeMap<String, String>,
    pub coverage: QuestionCoverage,
    pub pending_questions: Vec<ClarifyingQuestion>,
    pub asked_questions: Vec<ClarifyingQuestion>,
    /// Branch codes chosen by answering hierarchy questions.
    pub pinned_branches: Vec<String>,
    /// Candidates that survived the latest round.
    pub remaining: Vec<Candidate>,
    pub applied_rules: Vec<String>,
    pub missing_mandatory: Vec<String>,
    /// Whether readiness was forced by the round cap, a skip or an empty batch.
    pub forced: bool,
}

impl ConversationState {
    /// Description plus every answer, the text hierarchy resolution runs against.
    pub fn context_text(&self) -> String {
        std::iter::once(self.description.as_str())
            .chain(self.answers.values().map(|a| other_text(a).unwrap_or(a)))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Whether any elimination fallback has been used.
    pub fn is_degraded(&self) -> bool {
        self.applied_rules.iter().any(|r| r.starts_with("fallback:"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundContext {
    pub round: u32,
    pub max_rounds: u32,
    pub remaining_candidates: usize,
    pub applied_rules: Vec<String>,
    pub covered_mandatory: usize,
    pub total_mandatory: usize,
}

/// What the caller should do after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "snake_case")]
pub enum RoundOutcome {
    Questions {
        questions: Vec<ClarifyingQuestion>,
        context: RoundContext,
    },
    /// The caller may now run the justification step on `candidates`.
    Classification {
        candidates: Vec<Candidate>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        missing_mandatory: Vec<String>,
        applied_rules: Vec<String>,
        forced: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub state: ConversationState,
    pub outcome: RoundOutcome,
}

pub struct ClassificationEngine {
    elimination: EliminationEngine,
    taxonomy: Arc<dyn TaxonomyLookup>,
    orchestrator: QuestionOrchestrator,
    config: EngineConfig,
}

impl ClassificationEngine {
    pub fn new(
        store: Arc<RuleStore>,
        taxonomy: Arc<dyn TaxonomyLookup>,
        config: EngineConfig,
    ) -> Self {
        Self {
            elimination: EliminationEngine::new(store),
            taxonomy,
            orchestrator: QuestionOrchestrator::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTable {
        self.elimination.rules()
    }

    /// Open a conversation and run its first round.
    ///
    /// `extra_modifiers` carries facts from a structured query parse, if the caller has one.
    pub fn start(
        &self,
        conversation_id: &str,
        description: &str,
        candidates: Vec<Candidate>,
        extra_modifiers: &[String],
    ) -> ReasoningResult<Turn> {
        let codes: Vec<&str> = candidates.iter().map(|c| c.code.as_str()).collect();
        let coverage = initialize_coverage(conversation_id, description, &codes)?;

        let vocabulary = self.rules().vocabulary();
        let mut modifiers: ModifierSet = extract_modifiers(description, vocabulary)
            .into_iter()
            .collect();
        for extra in extra_modifiers {
            modifiers.insert(extra);
        }

        let state = ConversationState {
            id: conversation_id.to_string(),
            description: description.to_string(),
            phase: Phase::Collecting,
            round: 0,
            remaining: candidates.clone(),
            candidates,
            modifiers,
            answers: BTreeMap::new(),
            coverage,
            pending_questions: Vec::new(),
            asked_questions: Vec::new(),
            pinned_branches: Vec::new(),
            applied_rules: Vec::new(),
            missing_mandatory: Vec::new(),
            forced: false,
        };
        info!(
            conversation_id = %state.id,
            candidates = state.candidates.len(),
            modifiers = state.modifiers.len(),
            mandatory = state.coverage.total_mandatory(),
            "conversation started"
        );
        Ok(self.run_round(state, false))
    }

    /// Apply a batch of answers (`question id -> answer`) and run the next round.
    pub fn answer(
        &self,
        state: &ConversationState,
        answers: &BTreeMap<String, String>,
    ) -> ReasoningResult<Turn> {
        require_phase(state, Phase::Asking, "answer")?;

        let mut next = state.clone();
        next.phase = Phase::Answering;
        let vocabulary = self.rules().vocabulary();

        for (question_id, answer) in answers {
            let question = next.pending_questions.iter().find(|q| &q.id == question_id);
            match question.and_then(|q| q.branch_for(answer)) {
                Some(branch) => {
                    debug!(conversation_id = %next.id, question_id, branch, "branch pinned");
                    if !next.pinned_branches.iter().any(|b| b == branch) {
                        next.pinned_branches.push(branch.to_string());
                    }
                }
                None => {
                    let text = other_text(answer).unwrap_or(answer);
                    next.modifiers.extend(extract_modifiers(text, vocabulary));
                }
            }
            next.answers.insert(question_id.clone(), answer.clone());
        }

        let asked = std::mem::take(&mut next.pending_questions);
        next.coverage = update_coverage_from_answers(&next.coverage, answers, &asked);
        next.asked_questions.extend(asked);

        let force = next.round >= self.config.max_rounds;
        if force {
            info!(
                conversation_id = %next.id,
                round = next.round,
                max_rounds = self.config.max_rounds,
                "round budget exhausted, forcing classification"
            );
        }
        Ok(self.run_round(next, force))
    }

    /// Skip the remaining questions and go straight to `ready` with forced validation.
    pub fn skip(&self, state: &ConversationState) -> ReasoningResult<Turn> {
        require_phase(state, Phase::Asking, "skip")?;
        let mut next = state.clone();
        let skipped = std::mem::take(&mut next.pending_questions);
        next.asked_questions.extend(skipped);
        info!(conversation_id = %next.id, round = next.round, "questions skipped by user");
        Ok(self.run_round(next, true))
    }

    pub fn abandon(&self, state: &ConversationState) -> ReasoningResult<ConversationState> {
        if state.phase.is_terminal() {
            return Err(ReasoningError::InvalidTransition {
                phase: state.phase,
                action: "abandon",
            });
        }
        let mut next = state.clone();
        next.phase = Phase::Abandoned;
        next.pending_questions.clear();
        info!(conversation_id = %next.id, round = next.round, "conversation abandoned");
        Ok(next)
    }

    /// Record that the caller emitted the final classification.
    pub fn mark_classified(&self, state: &ConversationState) -> ReasoningResult<ConversationState> {
        require_phase(state, Phase::Ready, "classify")?;
        let mut next = state.clone();
        next.phase = Phase::Classified;
        info!(conversation_id = %next.id, "conversation classified");
        Ok(next)
    }

    fn run_round(&self, mut state: ConversationState, force: bool) -> Turn {
        let filtered = self
            .elimination
            .filter(&state.candidates, &state.modifiers, &state.description);
        state.applied_rules = filtered.applied_rules;
        state.remaining = apply_pins(&state.id, filtered.candidates, &state.pinned_branches);

        let analysis = analyze_hierarchy(&state.remaining, &state.context_text(), self.taxonomy.as_ref());
        let hierarchy_ready = is_ready_from_hierarchy(&analysis, self.config.tariff_default_pathways);
        let validation = validate_coverage(&state.coverage, force);

        let questions = if force || (hierarchy_ready && validation.is_valid) {
            Vec::new()
        } else {
            self.orchestrator
                .plan(&analysis, &state.coverage, hierarchy_ready)
        };

        if questions.is_empty() {
            let forced = force || !(hierarchy_ready && validation.is_valid);
            if forced && !force {
                warn!(conversation_id = %state.id, "no question left to ask, forcing classification");
            }
            let validation = validate_coverage(&state.coverage, true);
            if let Some(warning) = &validation.warning {
                warn!(conversation_id = %state.id, warning = %warning, "classifying with missing dimensions");
            }
            state.phase = Phase::Ready;
            state.forced = forced;
            state.missing_mandatory = validation.missing_mandatory;
            state.pending_questions.clear();
            info!(
                conversation_id = %state.id,
                round = state.round,
                phase = ?state.phase,
                remaining_candidates = state.remaining.len(),
                forced,
                "conversation ready"
            );
            let outcome = RoundOutcome::Classification {
                candidates: state.remaining.clone(),
                missing_mandatory: state.missing_mandatory.clone(),
                applied_rules: state.applied_rules.clone(),
                forced,
            };
            return Turn { state, outcome };
        }

        state.round += 1;
        state.phase = Phase::Asking;
        state.missing_mandatory = validation.missing_mandatory;
        state.pending_questions = questions.clone();
        info!(
            conversation_id = %state.id,
            round = state.round,
            phase = ?state.phase,
            remaining_candidates = state.remaining.len(),
            questions = questions.len(),
            "asking questions"
        );
        let outcome = RoundOutcome::Questions {
            questions,
            context: RoundContext {
                round: state.round,
                max_rounds: self.config.max_rounds,
                remaining_candidates: state.remaining.len(),
                applied_rules: state.applied_rules.clone(),
                covered_mandatory: state.coverage.covered_mandatory(),
                total_mandatory: state.coverage.total_mandatory(),
            },
        };
        Turn { state, outcome }
    }
}

fn require_phase(
    state: &ConversationState,
    expected: Phase,
    action: &'static str,
) -> ReasoningResult<()> {
    if state.id.trim().is_empty() {
        return Err(ReasoningError::MissingConversationId);
    }
    if state.phase != expected {
        return Err(ReasoningError::InvalidTransition {
            phase: state.phase,
            action,
        });
    }
    Ok(())
}

/// Narrow `candidates` to the pinned branches. A pin that would empty the set is ignored.
fn apply_pins(conversation_id: &str, candidates: Vec<Candidate>, pins: &[String]) -> Vec<Candidate> {
    let mut narrowed = candidates;
    for pin in pins {
        let under: Vec<Candidate> = narrowed
            .iter()
            .filter(|c| code::is_under(&c.code, pin))
            .cloned()
            .collect();
        if under.is_empty() {
            warn!(conversation_id, branch = %pin, "pinned branch has no surviving candidates, ignoring");
        } else {
            narrowed = under;
        }
    }
    narrowed
}
