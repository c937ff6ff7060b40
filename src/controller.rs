//! Conversation controller
//!
//! Owns the message list, the loading/error flags and the speaking index.
//! A turn goes: user message + model placeholder appended, reply awaited,
//! placeholder overwritten with the reply or an apology, loading cleared.

use tokio::sync::mpsc;

use crate::ai::ChatSession;
use crate::error::TutorError;
use crate::speech::SpeechOutput;
use crate::state::{Conversation, Message, PLACEHOLDER};

/// Placeholder replacement and error banner after a failed send.
pub const SEND_FAILURE: &str = "Đã có lỗi xảy ra. Vui lòng thử lại.";

/// Standing banner when no chat session could be created.
pub const INIT_FAILURE: &str =
    "Không thể khởi tạo dịch vụ AI. Vui lòng kiểm tra API key và thử lại.";

/// Error banner after a read-aloud failure.
pub const SPEECH_FAILURE: &str = "Không thể đọc tin nhắn này.";

pub const SUGGESTED_TOPICS: [&str; 4] = [
    "Giải thích về Lượng tử bất định",
    "Lịch sử Việt Nam thời nhà Trần",
    "Angular signals là gì?",
    "Viết một bài thơ về Hà Nội",
];

/// Outcome of an utterance, posted back by the speech callbacks.
#[derive(Debug)]
pub enum SpeechEvent {
    Finished { index: usize, utterance: u64 },
    Failed { index: usize, utterance: u64, error: TutorError },
}

/// A send that has been accepted but not yet awaited.
pub struct PendingReply {
    session: ChatSession,
    prompt: String,
}

impl PendingReply {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub async fn send(self) -> Result<String, TutorError> {
        self.session.try_send(&self.prompt).await
    }
}

pub struct TutorController<S: SpeechOutput> {
    conversation: Conversation,
    session: Option<ChatSession>,
    loading: bool,
    error: Option<String>,
    init_error: Option<String>,
    speaking: Option<usize>,
    utterance: u64,
    speech: S,
    speech_events: mpsc::UnboundedSender<SpeechEvent>,
}

impl<S: SpeechOutput> TutorController<S> {
    pub fn new(
        session: Option<ChatSession>,
        speech: S,
        speech_events: mpsc::UnboundedSender<SpeechEvent>,
    ) -> Self {
        let (conversation, init_error) = match session {
            Some(_) => (Conversation::with_greeting(), None),
            None => (Conversation::new(), Some(INIT_FAILURE.to_string())),
        };

        Self {
            conversation,
            session,
            loading: false,
            error: None,
            init_error,
            speaking: None,
            utterance: 0,
            speech,
            speech_events,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Transient error from the last send or utterance.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Standing error when the session could not be created.
    pub fn init_error(&self) -> Option<&str> {
        self.init_error.as_deref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn speaking(&self) -> Option<usize> {
        self.speaking
    }

    pub fn can_submit(&self) -> bool {
        self.session.is_some() && !self.loading
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Accept a message and append the user turn plus a placeholder.
    ///
    /// Returns `None` (and changes nothing) for blank text, while a reply is
    /// pending, or when there is no session.
    pub fn begin_submit(&mut self, text: &str) -> Option<PendingReply> {
        let prompt = text.trim();
        if prompt.is_empty() || self.loading {
            return None;
        }
        let session = self.session.clone()?;

        self.stop_speech();
        self.loading = true;
        self.error = None;
        self.conversation.push(Message::user(prompt));
        self.conversation.push(Message::model(PLACEHOLDER));

        tracing::info!(chars = prompt.chars().count(), "message submitted");
        Some(PendingReply {
            session,
            prompt: prompt.to_string(),
        })
    }

    /// Apply the reply to the trailing placeholder and clear loading.
    pub fn finish_submit(&mut self, outcome: Result<String, TutorError>) {
        match outcome {
            Ok(reply) => {
                self.conversation.resolve_trailing(reply);
            }
            Err(e) => {
                tracing::error!(error = %e, "send failed");
                self.error = Some(SEND_FAILURE.to_string());
                self.conversation.resolve_trailing(SEND_FAILURE);
            }
        }
        self.loading = false;
    }

    /// Run a whole turn inline. Returns false when the submit was ignored.
    pub async fn submit(&mut self, text: &str) -> bool {
        let Some(pending) = self.begin_submit(text) else {
            return false;
        };
        let outcome = pending.send().await;
        self.finish_submit(outcome);
        true
    }

    /// Read-aloud toggle for one message.
    ///
    /// Toggling the message that is speaking stops it; toggling any other
    /// message stops the current one and starts the new one.
    pub fn toggle_speech(&mut self, index: usize) {
        if self.speaking == Some(index) {
            self.stop_speech();
            return;
        }

        let Some(text) = self.conversation.get(index).map(|m| m.content.clone()) else {
            return;
        };

        self.stop_speech();
        self.utterance += 1;
        self.speaking = Some(index);

        let utterance = self.utterance;
        let done_tx = self.speech_events.clone();
        let error_tx = self.speech_events.clone();
        self.speech.speak(
            &text,
            Box::new(move || {
                let _ = done_tx.send(SpeechEvent::Finished { index, utterance });
            }),
            Box::new(move |error| {
                let _ = error_tx.send(SpeechEvent::Failed { index, utterance, error });
            }),
        );
    }

    pub fn stop_speech(&mut self) {
        if self.speaking.take().is_some() {
            self.speech.cancel();
        }
    }

    /// Events for anything but the current utterance are stale and dropped.
    pub fn handle_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Finished { index, utterance } => {
                if self.is_current(index, utterance) {
                    self.speaking = None;
                }
            }
            SpeechEvent::Failed { index, utterance, error } => {
                tracing::warn!(index, error = %error, "read-aloud failed");
                if self.is_current(index, utterance) {
                    self.speaking = None;
                    self.error = Some(SPEECH_FAILURE.to_string());
                }
            }
        }
    }

    fn is_current(&self, index: usize, utterance: u64) -> bool {
        self.speaking == Some(index) && self.utterance == utterance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatRequest, ChatTransport};
    use crate::speech::{DoneCallback, ErrorCallback};
    use crate::state::{Role, GREETING};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeSpeech {
        log: Arc<Mutex<Vec<String>>>,
        pending: Vec<(DoneCallback, ErrorCallback)>,
    }

    impl SpeechOutput for FakeSpeech {
        fn speak(&mut self, text: &str, on_done: DoneCallback, on_error: ErrorCallback) {
            self.log.lock().unwrap().push(format!("speak:{}", text));
            self.pending.push((on_done, on_error));
        }

        fn cancel(&mut self) {
            self.log.lock().unwrap().push("cancel".to_string());
        }
    }

    struct EchoTransport;

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn generate(&self, request: &ChatRequest) -> Result<String, TutorError> {
            let last = request.turns.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl ChatTransport for FailingTransport {
        async fn generate(&self, _request: &ChatRequest) -> Result<String, TutorError> {
            Err(TutorError::Server("unavailable".to_string()))
        }
    }

    fn controller(
        transport: Option<Arc<dyn ChatTransport>>,
    ) -> (TutorController<FakeSpeech>, mpsc::UnboundedReceiver<SpeechEvent>, Arc<Mutex<Vec<String>>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let speech = FakeSpeech::default();
        let log = Arc::clone(&speech.log);
        let session = transport.map(|t| ChatSession::new(t, "test-model"));
        (TutorController::new(session, speech, tx), rx, log)
    }

    #[test]
    fn test_new_with_session_greets() {
        let (c, _rx, _log) = controller(Some(Arc::new(EchoTransport)));
        assert_eq!(c.messages(), &[Message::model(GREETING)]);
        assert!(c.init_error().is_none());
        assert!(c.can_submit());
    }

    #[tokio::test]
    async fn test_without_session_shows_banner_and_ignores_submit() {
        let (mut c, _rx, _log) = controller(None);
        assert_eq!(c.init_error(), Some(INIT_FAILURE));
        assert!(c.messages().is_empty());

        assert!(!c.submit("hello").await);
        assert!(c.messages().is_empty());
        assert!(!c.is_loading());
    }

    #[tokio::test]
    async fn test_blank_submit_is_noop() {
        let (mut c, _rx, _log) = controller(Some(Arc::new(EchoTransport)));
        assert!(!c.submit("").await);
        assert!(!c.submit("   \n\t").await);
        assert_eq!(c.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_successful_turn() {
        let (mut c, _rx, _log) = controller(Some(Arc::new(EchoTransport)));
        assert!(c.submit("  tides  ").await);

        let messages = c.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], Message::user("tides"));
        assert_eq!(messages[2].role, Role::Model);
        assert_eq!(messages[2].content, "echo: tides");
        assert!(!c.is_loading());
        assert!(c.error().is_none());
    }

    #[tokio::test]
    async fn test_failed_turn() {
        let (mut c, _rx, _log) = controller(Some(Arc::new(FailingTransport)));
        assert!(c.submit("hello").await);

        assert_eq!(c.messages().last(), Some(&Message::model(SEND_FAILURE)));
        assert_eq!(c.error(), Some(SEND_FAILURE));
        assert!(!c.is_loading());
    }

    #[test]
    fn test_loading_spans_the_pending_reply() {
        let (mut c, _rx, _log) = controller(Some(Arc::new(EchoTransport)));
        assert!(!c.is_loading());

        let pending = c.begin_submit("first").unwrap();
        assert!(c.is_loading());
        assert_eq!(pending.prompt(), "first");
        assert_eq!(c.messages().last(), Some(&Message::model(PLACEHOLDER)));

        // Re-entrant submit is ignored.
        assert!(c.begin_submit("second").is_none());
        assert_eq!(c.messages().len(), 3);

        c.finish_submit(Err(TutorError::EmptyResponse));
        assert!(!c.is_loading());
        assert!(c.begin_submit("third").is_some());
    }

    #[test]
    fn test_new_submit_clears_previous_error() {
        let (mut c, _rx, _log) = controller(Some(Arc::new(EchoTransport)));
        c.begin_submit("a").unwrap();
        c.finish_submit(Err(TutorError::EmptyResponse));
        assert!(c.error().is_some());

        c.begin_submit("b").unwrap();
        assert!(c.error().is_none());
    }

    #[test]
    fn test_toggle_switches_and_stops() {
        let (mut c, _rx, log) = controller(Some(Arc::new(EchoTransport)));
        c.begin_submit("a").unwrap();
        c.finish_submit(Ok("answer".to_string()));

        c.toggle_speech(1);
        assert_eq!(c.speaking(), Some(1));

        c.toggle_speech(2);
        assert_eq!(c.speaking(), Some(2));

        c.toggle_speech(2);
        assert_eq!(c.speaking(), None);

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["speak:a", "cancel", "speak:answer", "cancel"]
        );
    }

    #[test]
    fn test_toggle_out_of_range_is_ignored() {
        let (mut c, _rx, log) = controller(Some(Arc::new(EchoTransport)));
        c.toggle_speech(7);
        assert_eq!(c.speaking(), None);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_submit_cancels_playback() {
        let (mut c, _rx, log) = controller(Some(Arc::new(EchoTransport)));
        c.toggle_speech(0);
        c.begin_submit("question").unwrap();

        assert_eq!(c.speaking(), None);
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("cancel"));
    }

    #[tokio::test]
    async fn test_speech_events_update_state() {
        let (mut c, mut rx, _log) = controller(Some(Arc::new(EchoTransport)));

        c.toggle_speech(0);
        let (done, _) = c.speech.pending.pop().unwrap();
        done();
        c.handle_speech_event(rx.recv().await.unwrap());
        assert_eq!(c.speaking(), None);
        assert!(c.error().is_none());

        c.toggle_speech(0);
        let (_, fail) = c.speech.pending.pop().unwrap();
        fail(TutorError::Speech("no audio".to_string()));
        c.handle_speech_event(rx.recv().await.unwrap());
        assert_eq!(c.speaking(), None);
        assert_eq!(c.error(), Some(SPEECH_FAILURE));
    }

    #[tokio::test]
    async fn test_stale_speech_event_is_ignored() {
        let (mut c, mut rx, _log) = controller(Some(Arc::new(EchoTransport)));
        c.begin_submit("a").unwrap();
        c.finish_submit(Ok("b".to_string()));

        c.toggle_speech(1);
        let (stale_done, _) = c.speech.pending.remove(0);
        c.toggle_speech(2);

        stale_done();
        c.handle_speech_event(rx.recv().await.unwrap());
        assert_eq!(c.speaking(), Some(2));
    }
}
