use hs_reasoning::error::ReasoningError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown conversation_id: {0}")]
    UnknownConversation(String),
}
