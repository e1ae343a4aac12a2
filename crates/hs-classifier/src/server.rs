use std::collections::BTreeMap;
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use hs_reasoning::conversation::{ClassificationEngine, ConversationState, RoundOutcome, Turn};
use hs_reasoning::model::Candidate;
use hs_reasoning::questions::ClarifyingQuestion;

use crate::store::{ConversationId, ConversationStore};

#[derive(Clone)]
pub struct HsClassifierServer {
    engine: Arc<ClassificationEngine>,
    convos: ConversationStore,
    tool_router: ToolRouter<HsClassifierServer>,
}

impl HsClassifierServer {
    pub fn new(engine: Arc<ClassificationEngine>, convos: ConversationStore) -> Self {
        Self {
            engine,
            convos,
            tool_router: Self::tool_router(),
        }
    }

    async fn load(&self, conversation_id: &str) -> Result<ConversationState, String> {
        self.convos
            .get(conversation_id.trim())
            .await
            .map_err(|e| e.to_string())
    }

    async fn respond(&self, turn: Turn) -> Json<ClassificationResponse> {
        let response = ClassificationResponse::from_turn(&turn, self.engine.config().max_rounds);
        self.convos.put(turn.state).await;
        Json(response)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct CandidateDto {
    /// Dotted HS code such as "0901.11" or "0901.11.31".
    code: String,
    /// Official description of the code.
    description: String,
    /// Retrieval score, higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl From<CandidateDto> for Candidate {
    fn from(dto: CandidateDto) -> Self {
        Candidate {
            code: dto.code.trim().to_string(),
            description: dto.description,
            score: dto.score,
        }
    }
}

impl From<&Candidate> for CandidateDto {
    fn from(candidate: &Candidate) -> Self {
        Self {
            code: candidate.code.clone(),
            description: candidate.description.clone(),
            score: candidate.score,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StartClassificationParams {
    /// Free-text product description as given by the user.
    description: String,
    /// Candidate codes proposed by retrieval.
    candidates: Vec<CandidateDto>,
    /// Extra facts from a structured query parse, e.g. ["arabica", "roasted"].
    #[serde(default)]
    modifiers: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AnswerQuestionsParams {
    conversation_id: ConversationId,
    /// Map of question id to answer. An answer is an option value, its display text, or
    /// "other: <text>".
    answers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ConversationParams {
    conversation_id: ConversationId,
}

#[derive(Debug, Serialize, JsonSchema)]
struct OptionDto {
    value: String,
    display_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    matching_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_code: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct QuestionDto {
    id: String,
    /// "hierarchy" or "coverage".
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<String>,
    text: String,
    options: Vec<OptionDto>,
    allow_other: bool,
}

impl From<&ClarifyingQuestion> for QuestionDto {
    fn from(question: &ClarifyingQuestion) -> Self {
        Self {
            id: question.id.clone(),
            source: wire_name(&question.source),
            level: question.level,
            dimension: question.dimension.clone(),
            text: question.text.clone(),
            options: question
                .options
                .iter()
                .map(|o| OptionDto {
                    value: o.value.clone(),
                    display_text: o.display_text.clone(),
                    matching_codes: o.matching_codes.clone(),
                    branch_code: o.branch_code.clone(),
                })
                .collect(),
            allow_other: question.allow_other,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
struct ClassificationResponse {
    conversation_id: ConversationId,
    /// "questions" while clarification is needed, then "classification".
    response_type: String,
    phase: String,
    round: u32,
    max_rounds: u32,
    questions: Vec<QuestionDto>,
    /// Surviving candidates. Final once response_type is "classification".
    candidates: Vec<CandidateDto>,
    applied_rules: Vec<String>,
    missing_mandatory: Vec<String>,
    covered_mandatory: usize,
    total_mandatory: usize,
    forced: bool,
    /// Present when the result must be shown with reduced confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    caveat: Option<String>,
}

impl ClassificationResponse {
    fn from_turn(turn: &Turn, max_rounds: u32) -> Self {
        let state = &turn.state;
        let (response_type, questions) = match &turn.outcome {
            RoundOutcome::Questions { questions, .. } => {
                ("questions", questions.iter().map(QuestionDto::from).collect())
            }
            RoundOutcome::Classification { .. } => ("classification", Vec::new()),
        };
        Self {
            conversation_id: state.id.clone(),
            response_type: response_type.to_string(),
            phase: wire_name(&state.phase),
            round: state.round,
            max_rounds,
            questions,
            candidates: state.remaining.iter().map(CandidateDto::from).collect(),
            applied_rules: state.applied_rules.clone(),
            missing_mandatory: state.missing_mandatory.clone(),
            covered_mandatory: state.coverage.covered_mandatory(),
            total_mandatory: state.coverage.total_mandatory(),
            forced: state.forced,
            caveat: caveat(state),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
struct PhaseResponse {
    conversation_id: ConversationId,
    phase: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct RulesInfoResponse {
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    rule_count: usize,
    /// True when the rule document could not be loaded and elimination is disabled.
    degraded: bool,
    categories: Vec<String>,
    open_conversations: usize,
}

/// The serialized name of a unit enum variant, e.g. `Phase::Ready` as "ready".
fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}

fn caveat(state: &ConversationState) -> Option<String> {
    let mut notes = Vec::new();
    if !state.missing_mandatory.is_empty() {
        notes.push(format!(
            "not confirmed by the user: {}",
            state.missing_mandatory.join(", ")
        ));
    }
    if let Some(fallback) = state.applied_rules.iter().find(|r| r.starts_with("fallback:")) {
        notes.push(format!("elimination fell back ({fallback})"));
    }
    (!notes.is_empty()).then(|| notes.join("; "))
}

#[tool_router]
impl HsClassifierServer {
    #[tool(description = "Start a classification conversation from a product description and retrieval candidates. Returns clarifying questions or, when nothing needs asking, the classification.")]
    async fn start_classification(
        &self,
        Parameters(params): Parameters<StartClassificationParams>,
    ) -> Result<Json<ClassificationResponse>, String> {
        let description = params.description.trim().to_string();
        if description.is_empty() {
            return Err("description must not be empty".to_string());
        }
        if params.candidates.is_empty() {
            return Err("candidates must not be empty".to_string());
        }

        let id = ConversationStore::new_id();
        let candidates = params.candidates.into_iter().map(Candidate::from).collect();
        let turn = self
            .engine
            .start(&id, &description, candidates, &params.modifiers)
            .map_err(|e| format!("start failed: {e}"))?;
        Ok(self.respond(turn).await)
    }

    #[tool(description = "Answer the pending questions of a conversation (question id -> answer) and run the next round.")]
    async fn answer_questions(
        &self,
        Parameters(params): Parameters<AnswerQuestionsParams>,
    ) -> Result<Json<ClassificationResponse>, String> {
        let state = self.load(&params.conversation_id).await?;
        let turn = self
            .engine
            .answer(&state, &params.answers)
            .map_err(|e| format!("answer failed: {e}"))?;
        Ok(self.respond(turn).await)
    }

    #[tool(description = "Skip the pending questions and classify now. Unanswered mandatory dimensions are reported as missing.")]
    async fn skip_questions(
        &self,
        Parameters(params): Parameters<ConversationParams>,
    ) -> Result<Json<ClassificationResponse>, String> {
        let state = self.load(&params.conversation_id).await?;
        let turn = self
            .engine
            .skip(&state)
            .map_err(|e| format!("skip failed: {e}"))?;
        Ok(self.respond(turn).await)
    }

    #[tool(description = "Record that the final classification was emitted and close the conversation.")]
    async fn confirm_classification(
        &self,
        Parameters(params): Parameters<ConversationParams>,
    ) -> Result<Json<PhaseResponse>, String> {
        let state = self.load(&params.conversation_id).await?;
        let next = self
            .engine
            .mark_classified(&state)
            .map_err(|e| format!("confirm failed: {e}"))?;
        let response = PhaseResponse {
            conversation_id: next.id.clone(),
            phase: wire_name(&next.phase),
        };
        self.convos.put(next).await;
        Ok(Json(response))
    }

    #[tool(description = "Abandon a conversation and discard its state.")]
    async fn abandon_classification(
        &self,
        Parameters(params): Parameters<ConversationParams>,
    ) -> Result<Json<PhaseResponse>, String> {
        let state = self.load(&params.conversation_id).await?;
        let next = self
            .engine
            .abandon(&state)
            .map_err(|e| format!("abandon failed: {e}"))?;
        let response = PhaseResponse {
            conversation_id: next.id.clone(),
            phase: wire_name(&next.phase),
        };
        self.convos.put(next).await;
        Ok(Json(response))
    }

    #[tool(description = "Describe the loaded elimination rule table (version, fingerprint, rule count, degradation).")]
    async fn rules_info(&self) -> Result<Json<RulesInfoResponse>, String> {
        let rules = self.engine.rules();
        let response = RulesInfoResponse {
            version: rules.version().to_string(),
            fingerprint: rules.fingerprint().map(str::to_string),
            rule_count: rules.rule_count(),
            degraded: rules.is_degraded(),
            categories: rules.categories().to_vec(),
            open_conversations: self.convos.len().await,
        };
        info!(
            version = %response.version,
            rule_count = response.rule_count,
            degraded = response.degraded,
            "rules info requested"
        );
        Ok(Json(response))
    }
}

#[tool_handler]
impl ServerHandler for HsClassifierServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "hs-classifier".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "HS code disambiguation server. Call start_classification with the product \
description and retrieval candidates, then answer_questions until response_type is \
classification (or skip_questions to stop early). Show any caveat alongside the result. Close \
the conversation with confirm_classification or abandon_classification. rules_info reports the \
loaded elimination rules."
                    .to_string(),
            ),
        }
    }
}
