//! Read-aloud through a local speech engine.
//!
//! The engine runs as a child process. Only one utterance plays at a time:
//! starting a new one kills the previous child, and a killed utterance
//! reports neither completion nor error.

use std::process::Stdio;
use std::sync::{Arc, RwLock};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::TutorError;
use crate::markdown::clean_for_speech;

pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(TutorError) + Send + 'static>;

/// Something that can read text aloud.
pub trait SpeechOutput: Send {
    /// Start speaking `text`, cancelling anything already playing.
    fn speak(&mut self, text: &str, on_done: DoneCallback, on_error: ErrorCallback);

    /// Stop the current utterance, if any.
    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Value handed to the engine's voice flag
    pub id: String,
    pub name: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEngine {
    EspeakNg,
    Say,
    /// A command line, program first, that takes the text as its last argument
    Command(String),
    Disabled,
}

impl SpeechEngine {
    /// `None` and `"auto"` pick the platform default.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("auto") => Self::platform_default(),
            Some("espeak-ng") | Some("espeak") => SpeechEngine::EspeakNg,
            Some("say") => SpeechEngine::Say,
            Some("disabled") | Some("none") | Some("off") => SpeechEngine::Disabled,
            Some(_) => SpeechEngine::Command(value.unwrap_or_default().trim().to_string()),
        }
    }

    fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            SpeechEngine::Say
        } else {
            SpeechEngine::EspeakNg
        }
    }

    pub fn program(&self) -> Option<&str> {
        match self {
            SpeechEngine::EspeakNg => Some("espeak-ng"),
            SpeechEngine::Say => Some("say"),
            SpeechEngine::Command(line) => line.split_whitespace().next(),
            SpeechEngine::Disabled => None,
        }
    }

    fn command(&self, text: &str, voice: &str, rate: Option<u32>) -> Option<Command> {
        let program = self.program()?;
        let mut command = Command::new(program);

        match self {
            SpeechEngine::EspeakNg => {
                command.args(["-v", voice]);
                if let Some(rate) = rate {
                    command.args(["-s", &rate.to_string()]);
                }
            }
            SpeechEngine::Say => {
                command.args(["-v", voice]);
                if let Some(rate) = rate {
                    command.args(["-r", &rate.to_string()]);
                }
            }
            SpeechEngine::Command(line) => {
                command.args(line.split_whitespace().skip(1));
            }
            SpeechEngine::Disabled => {}
        }

        command.arg(text);
        Some(command)
    }

    /// Ask the engine which voices it has installed.
    pub async fn list_voices(&self) -> Result<Vec<Voice>, TutorError> {
        let (program, args): (&str, &[&str]) = match self {
            SpeechEngine::EspeakNg => ("espeak-ng", &["--voices"]),
            SpeechEngine::Say => ("say", &["-v", "?"]),
            SpeechEngine::Command(_) | SpeechEngine::Disabled => return Ok(Vec::new()),
        };

        let output = Command::new(program)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| TutorError::SpeechUnavailable(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            return Err(TutorError::Speech(format!(
                "{} exited with {}",
                program, output.status
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(match self {
            SpeechEngine::EspeakNg => parse_espeak_voices(&listing),
            _ => parse_say_voices(&listing),
        })
    }
}

/// Parse `espeak-ng --voices`:
/// `Pty Language Age/Gender VoiceName File Other Languages`
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(Voice {
                id: cols[1].to_string(),
                name: cols[3].to_string(),
                lang: cols[1].to_string(),
            })
        })
        .collect()
}

/// Parse `say -v '?'`: `Name   lang_REGION   # sample sentence`
fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim();
            let (name, lang) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Voice {
                id: name.to_string(),
                name: name.to_string(),
                lang: lang.to_string(),
            })
        })
        .collect()
}

fn normalize_lang(lang: &str) -> String {
    lang.trim().replace('_', "-").to_lowercase()
}

/// Pick the voice id for `locale`.
///
/// Exact locale match first, then a voice for the same base language,
/// else the locale tag itself.
pub fn select_voice(voices: &[Voice], locale: &str) -> String {
    let wanted = normalize_lang(locale);
    let base = wanted.split('-').next().unwrap_or_default().to_string();

    voices
        .iter()
        .find(|v| normalize_lang(&v.lang) == wanted)
        .or_else(|| {
            voices.iter().find(|v| {
                normalize_lang(&v.lang).split('-').next() == Some(base.as_str())
            })
        })
        .map(|v| v.id.clone())
        .unwrap_or_else(|| locale.to_string())
}

struct Utterance {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Speech adapter backed by a [`SpeechEngine`].
pub struct SpeechSynth {
    engine: SpeechEngine,
    locale: String,
    rate: Option<u32>,
    voices: Arc<RwLock<Vec<Voice>>>,
    current: Option<Utterance>,
}

impl SpeechSynth {
    pub fn new(engine: SpeechEngine, locale: &str, rate: Option<u32>) -> Self {
        Self {
            engine,
            locale: locale.to_string(),
            rate,
            voices: Arc::new(RwLock::new(Vec::new())),
            current: None,
        }
    }

    pub fn engine(&self) -> &SpeechEngine {
        &self.engine
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Enumerate voices in the background. Until the list arrives, speech
    /// falls back to the locale tag.
    pub fn load_voices(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let voices = Arc::clone(&self.voices);
        tokio::spawn(async move {
            match engine.list_voices().await {
                Ok(found) => {
                    tracing::debug!(count = found.len(), "speech voices loaded");
                    if let Ok(mut slot) = voices.write() {
                        *slot = found;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "could not list speech voices"),
            }
        })
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.voices.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn current_voice(&self) -> String {
        select_voice(&self.voices(), &self.locale)
    }

    pub fn is_speaking(&self) -> bool {
        self.current
            .as_ref()
            .map(|u| !u.task.is_finished())
            .unwrap_or(false)
    }

    /// Speak `text` and wait until playback ends.
    pub async fn speak_to_end(&mut self, text: &str) -> Result<(), TutorError> {
        let (tx, rx) = oneshot::channel();
        let err_tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        let done_tx = Arc::clone(&err_tx);

        self.speak(
            text,
            Box::new(move || {
                if let Some(tx) = done_tx.lock().ok().and_then(|mut t| t.take()) {
                    let _ = tx.send(Ok(()));
                }
            }),
            Box::new(move |e| {
                if let Some(tx) = err_tx.lock().ok().and_then(|mut t| t.take()) {
                    let _ = tx.send(Err(e));
                }
            }),
        );

        rx.await
            .map_err(|_| TutorError::Speech("utterance was cancelled".to_string()))?
    }
}

impl SpeechOutput for SpeechSynth {
    fn speak(&mut self, text: &str, on_done: DoneCallback, on_error: ErrorCallback) {
        self.cancel();

        let cleaned = clean_for_speech(text);
        let voice = self.current_voice();
        let Some(mut command) = self.engine.command(&cleaned, &voice, self.rate) else {
            on_error(TutorError::SpeechUnavailable("speech output is disabled".to_string()));
            return;
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let program = self.engine.program().unwrap_or_default().to_string();
        tracing::debug!(engine = %program, voice = %voice, chars = cleaned.chars().count(), "starting utterance");

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    on_error(TutorError::SpeechUnavailable(format!("{}: {}", program, e)));
                    return;
                }
            };

            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel_rx => None,
            };

            match finished {
                Some(Ok(status)) if status.success() => on_done(),
                Some(Ok(status)) => {
                    on_error(TutorError::Speech(format!("{} exited with {}", program, status)))
                }
                Some(Err(e)) => on_error(TutorError::Speech(e.to_string())),
                None => {
                    let _ = child.kill().await;
                }
            }
        });

        self.current = Some(Utterance {
            cancel: cancel_tx,
            task,
        });
    }

    fn cancel(&mut self) {
        if let Some(utterance) = self.current.take() {
            let _ = utterance.cancel.send(());
        }
    }
}

impl Drop for SpeechSynth {
    fn drop(&mut self) {
        self.cancel();
    }
}
