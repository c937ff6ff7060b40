pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod speech;
pub mod state;

// Re-export main types for convenience
pub use ai::{create_session, ChatSession, ChatTransport, GeminiClient};
pub use config::Config;
pub use controller::{PendingReply, SpeechEvent, TutorController};
pub use error::TutorError;
pub use speech::{SpeechEngine, SpeechOutput, SpeechSynth};
pub use state::{Conversation, Message, Role};
