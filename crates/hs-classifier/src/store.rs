/// In-process conversation store.
///
/// The engine itself is stateless; this keeps each open conversation's state between
/// tool calls. Conversations that reach a terminal phase are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hs_reasoning::conversation::ConversationState;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::AppError;

static CONVO_COUNTER: AtomicU64 = AtomicU64::new(0);

pub type ConversationId = String;

#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<RwLock<HashMap<ConversationId, ConversationState>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_id() -> ConversationId {
        new_conversation_id()
    }

    pub async fn get(&self, conversation_id: &str) -> Result<ConversationState, AppError> {
        self.inner
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownConversation(conversation_id.to_string()))
    }

    /// Store `state`, or drop it once the conversation is over.
    pub async fn put(&self, state: ConversationState) {
        let mut guard = self.inner.write().await;
        if state.phase.is_terminal() {
            guard.remove(&state.id);
        } else {
            guard.insert(state.id.clone(), state);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

fn new_conversation_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let counter = CONVO_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(pid.to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    hex_lower(&digest[..16])
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
