pub mod gemini;
pub mod session;

pub use gemini::GeminiClient;
pub use session::{ChatRequest, ChatSession, ChatTransport};

use std::sync::Arc;
use crate::config::Config;

/// Persona handed to the model as its system instruction.
pub const SYSTEM_INSTRUCTION: &str = "You are 'Gia Sư 4.0', an expert AI tutor. Your mission is to help users understand complex topics with simple, clear, and encouraging explanations.
- Break down difficult concepts into small, easy-to-digest pieces.
- Use analogies and real-world examples.
- Maintain a friendly, patient, and positive tone.
- If asked, create simple quizzes to test the user's understanding.
- Always respond in the language of the user's query.
- Format your responses using markdown for better readability (e.g., use lists, bold text).";

/// Returned by [`ChatSession::send`] in place of an error.
pub const SEND_APOLOGY: &str = "Xin lỗi, đã có lỗi xảy ra. Vui lòng thử lại sau.";

/// Open a Gemini chat session from the given config.
///
/// Returns `None` when the client cannot be built, most commonly because no
/// API key is configured.
pub fn create_session(config: &Config) -> Option<ChatSession> {
    let Some(api_key) = config.resolve_api_key() else {
        tracing::error!(error = %crate::TutorError::MissingApiKey, "failed to initialize chat client");
        return None;
    };

    match GeminiClient::new(&api_key, config.base_url()) {
        Ok(client) => {
            tracing::info!(model = config.model(), "chat session created");
            Some(ChatSession::new(Arc::new(client), config.model()))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize chat client");
            None
        }
    }
}
