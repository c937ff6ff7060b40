//! Multi-turn chat session over a pluggable transport.

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{SEND_APOLOGY, SYSTEM_INSTRUCTION};
use crate::error::TutorError;
use crate::state::Message;

/// Everything a transport needs for one round trip.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_instruction: String,
    /// Prior turns followed by the new user turn
    pub turns: Vec<Message>,
}

/// One request/response exchange with a hosted model.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn generate(&self, request: &ChatRequest) -> Result<String, TutorError>;
}

/// Handle to an ongoing conversation with the model.
///
/// Clones share the same history. Turns are recorded only after a
/// successful round trip, so a failed send leaves the history untouched.
#[derive(Clone)]
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    model: String,
    system_instruction: String,
    history: Arc<Mutex<Vec<Message>>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, model: &str) -> Self {
        Self {
            transport,
            model: model.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.system_instruction = instruction.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    pub async fn try_send(&self, text: &str) -> Result<String, TutorError> {
        let mut turns = self.history.lock().await.clone();
        turns.push(Message::user(text));

        let request = ChatRequest {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            turns,
        };

        tracing::debug!(model = %self.model, turns = request.turns.len(), "sending chat message");
        let reply = self.transport.generate(&request).await?;

        let mut history = self.history.lock().await;
        history.push(Message::user(text));
        history.push(Message::model(reply.clone()));
        Ok(reply)
    }

    /// Like [`try_send`](Self::try_send) but never fails: errors are logged
    /// and replaced by a fixed apology.
    pub async fn send(&self, text: &str) -> String {
        match self.try_send(text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "error sending message to model");
                SEND_APOLOGY.to_string()
            }
        }
    }
}
