use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use giasu::controller::SUGGESTED_TOPICS;
use giasu::{create_session, Config, SpeechEngine, SpeechEvent, SpeechSynth, TutorController, TutorError};

/// Rows the input box may grow to before it scrolls.
pub const MAX_INPUT_ROWS: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input box
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Conversation
    pub controller: TutorController<SpeechSynth>,
    pub pending: Option<JoinHandle<Result<String, TutorError>>>,
    pub model: String,

    // Chat view
    pub selected_message: Option<usize>,
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the chat area, set during render
    pub chat_width: u16,  // inner width, for wrap estimates
    pub follow_bottom: bool,
    pub reveal_selected: bool,
    pub chat_area: Option<Rect>,

    // Suggested topic picker
    pub show_topic_picker: bool,
    pub topic_state: ListState,

    // Animation state
    pub animation_frame: u8,
}

impl App {
    pub fn new(config: &Config, speech_events: mpsc::UnboundedSender<SpeechEvent>) -> Self {
        let session = create_session(config);

        let engine = SpeechEngine::from_config(config.speech_engine.as_deref());
        let speech = SpeechSynth::new(engine, config.speech_locale(), config.speech_rate);
        speech.load_voices();

        let mut topic_state = ListState::default();
        topic_state.select(Some(0));

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            input_cursor: 0,

            controller: TutorController::new(session, speech, speech_events),
            pending: None,
            model: config.model().to_string(),

            selected_message: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_bottom: true,
            reveal_selected: false,
            chat_area: None,

            show_topic_picker: false,
            topic_state,

            animation_frame: 0,
        }
    }

    /// Send whatever is in the input box.
    pub fn submit_input(&mut self) {
        let Some(pending) = self.controller.begin_submit(&self.input) else {
            return;
        };

        self.input.clear();
        self.input_cursor = 0;
        self.selected_message = None;
        self.follow_bottom = true;
        self.pending = Some(tokio::spawn(pending.send()));
    }

    /// Pre-fill the input with a suggested topic and send it.
    pub fn submit_topic(&mut self, index: usize) {
        if !self.controller.can_submit() {
            return;
        }
        if let Some(topic) = SUGGESTED_TOPICS.get(index) {
            self.input = topic.to_string();
            self.input_cursor = self.input.chars().count();
            self.submit_input();
        }
    }

    /// Apply the reply once the background send has finished.
    pub async fn poll_pending(&mut self) {
        let finished = self.pending.as_ref().map(|h| h.is_finished()).unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(handle) = self.pending.take() {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(TutorError::Task(e.to_string())));
            self.controller.finish_submit(outcome);
            self.follow_bottom = true;
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.controller.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Message selection for read-aloud
    pub fn select_next_message(&mut self) {
        let len = self.controller.messages().len();
        if len == 0 {
            return;
        }
        let next = match self.selected_message {
            Some(i) => (i + 1).min(len - 1),
            None => len - 1,
        };
        self.select_message(next);
    }

    pub fn select_prev_message(&mut self) {
        let len = self.controller.messages().len();
        if len == 0 {
            return;
        }
        let prev = match self.selected_message {
            Some(i) => i.saturating_sub(1),
            None => len - 1,
        };
        self.select_message(prev);
    }

    pub fn select_first_message(&mut self) {
        if !self.controller.messages().is_empty() {
            self.select_message(0);
        }
    }

    pub fn select_last_message(&mut self) {
        let len = self.controller.messages().len();
        if len > 0 {
            self.select_message(len - 1);
        }
    }

    fn select_message(&mut self, index: usize) {
        self.selected_message = Some(index);
        self.reveal_selected = true;
        self.follow_bottom = false;
    }

    /// Toggle read-aloud on the selected message, or the latest one.
    pub fn toggle_read_aloud(&mut self) {
        let target = self
            .selected_message
            .or_else(|| self.controller.messages().len().checked_sub(1));
        if let Some(index) = target {
            self.controller.toggle_speech(index);
        }
    }

    // Chat scrolling
    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_bottom = true;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    // Topic picker methods
    pub fn topic_picker_nav_down(&mut self) {
        let len = SUGGESTED_TOPICS.len();
        let i = self.topic_state.selected().unwrap_or(0);
        self.topic_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn topic_picker_nav_up(&mut self) {
        let i = self.topic_state.selected().unwrap_or(0);
        self.topic_state.select(Some(i.saturating_sub(1)));
    }

    pub fn choose_topic(&mut self) {
        self.show_topic_picker = false;
        if let Some(i) = self.topic_state.selected() {
            self.submit_topic(i);
        }
    }

    /// Height of the input box for the given inner width, borders included.
    pub fn input_height(&self, inner_width: u16) -> u16 {
        (self.input_rows(inner_width) as u16).clamp(1, MAX_INPUT_ROWS) + 2
    }

    /// Wrapped row count, including a trailing row the cursor may sit on.
    pub fn input_rows(&self, inner_width: u16) -> usize {
        let width = inner_width as usize;
        let rows = wrap_input(&self.input, width).len();
        let (cursor_row, _) = cursor_position(&self.input, self.input_cursor, width);
        rows.max(cursor_row + 1)
    }
}

/// Hard-wrap the input into rows of at most `width` chars, honouring newlines.
pub fn wrap_input(input: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();

    for line in input.split('\n') {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            rows.push(String::new());
            continue;
        }
        for chunk in chars.chunks(width) {
            rows.push(chunk.iter().collect());
        }
    }

    rows
}

/// Row and column of the cursor inside the hard-wrapped input.
pub fn cursor_position(input: &str, cursor: usize, width: usize) -> (usize, usize) {
    let width = width.max(1);
    let (mut row, mut col) = (0usize, 0usize);

    for c in input.chars().take(cursor) {
        if c == '\n' {
            row += 1;
            col = 0;
        } else {
            col += 1;
            if col == width {
                row += 1;
                col = 0;
            }
        }
    }

    (row, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_input_empty_is_one_row() {
        assert_eq!(wrap_input("", 10), vec![String::new()]);
    }

    #[test]
    fn test_wrap_input_splits_long_lines() {
        assert_eq!(wrap_input("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(wrap_input("ab\ncd", 10), vec!["ab", "cd"]);
    }

    #[test]
    fn test_wrap_input_counts_chars_not_bytes() {
        assert_eq!(wrap_input("Hà Nội", 3), vec!["Hà ", "Nội"]);
    }

    #[test]
    fn test_cursor_position() {
        assert_eq!(cursor_position("abcdefg", 0, 3), (0, 0));
        assert_eq!(cursor_position("abcdefg", 2, 3), (0, 2));
        assert_eq!(cursor_position("abcdefg", 4, 3), (1, 1));
        assert_eq!(cursor_position("ab\ncd", 4, 10), (1, 1));
    }
}
