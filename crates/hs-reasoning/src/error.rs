/// Error types for the reasoning engine.
///
/// Only caller contract violations and explicit parse requests surface here. Data-shape
/// irregularities (a broken rule document, a modifier set that would eliminate everything,
/// an answer that maps to no dimension, an exhausted round budget) are routed through
/// fallbacks and logged instead. Host crates wrap `ReasoningError` via `#[from]`.
use crate::conversation::Phase;

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("conversation id must not be empty")]
    MissingConversationId,

    #[error("cannot {action} a conversation in phase {phase:?}")]
    InvalidTransition { phase: Phase, action: &'static str },

    #[error("config error: {0}")]
    Config(String),

    #[error("rule document error: {0}")]
    RuleDocument(String),

    #[error("taxonomy seed error: {0}")]
    Taxonomy(String),
}

pub type ReasoningResult<T> = Result<T, ReasoningError>;
