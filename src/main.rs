use clap::{Parser, Subcommand};
use colored::*;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use giasu::controller::INIT_FAILURE;
use giasu::speech::select_voice;
use giasu::{create_session, Config, SpeechEngine, SpeechSynth};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "giasu")]
#[command(version, about = "Gia Sư 4.0 - an AI tutor in your terminal")]
struct Cli {
    /// Gemini model to use (overrides the config file)
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
        /// Read the answer aloud
        #[arg(short, long)]
        speak: bool,
    },
    /// List speech voices and show which one would be used
    Voices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            // The TUI owns the terminal, so logs go to a file
            let _guard = init_file_logging()?;
            let config = load_config(cli.model);
            run_tui(&config).await?
        }
        Commands::Ask { question, speak } => {
            init_stderr_logging();
            let config = load_config(cli.model);
            ask(&config, &question, speak).await?
        }
        Commands::Voices => {
            init_stderr_logging();
            let config = load_config(cli.model);
            list_voices(&config).await?
        }
    }

    Ok(())
}

/// Default level for the TUI's log file.
const FILE_LOG_LEVEL: &str = "info";
/// Default level on stderr, kept quiet so `ask` output stays readable.
const STDERR_LOG_LEVEL: &str = "warn";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn init_file_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = Config::log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, "giasu.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(FILE_LOG_LEVEL))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(STDERR_LOG_LEVEL))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(model: Option<String>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::new()
    });
    if model.is_some() {
        config.model = model;
    }
    config
}

async fn run_tui(config: &Config) -> Result<()> {
    tracing::info!("Starting Gia Sư v{}", env!("CARGO_PKG_VERSION"));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(config, events.speech_sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        anyhow::Ok(())
    }
    .await;

    app.controller.stop_speech();
    tui::restore()?;
    result
}

async fn ask(config: &Config, question: &str, speak: bool) -> Result<()> {
    let Some(session) = create_session(config) else {
        println!("{}", INIT_FAILURE.red());
        return Ok(());
    };

    println!("🤖 Asking {}...\n", session.model().bold().magenta());
    let reply = session.send(question).await;
    println!("{}", "Gia sư:".bold().yellow());
    println!("{}", reply);

    if speak {
        let engine = SpeechEngine::from_config(config.speech_engine.as_deref());
        let mut synth = SpeechSynth::new(engine, config.speech_locale(), config.speech_rate);
        let _ = synth.load_voices().await;
        if let Err(e) = synth.speak_to_end(&reply).await {
            println!("{}: {}", "Could not read the answer aloud".red(), e);
        }
    }

    Ok(())
}

async fn list_voices(config: &Config) -> Result<()> {
    let engine = SpeechEngine::from_config(config.speech_engine.as_deref());
    let locale = config.speech_locale();

    let Some(program) = engine.program() else {
        println!("{}", "Speech output is disabled in the config".yellow());
        return Ok(());
    };

    println!("\n{}", format!("🔊 Voices from {}", program).bold().blue());
    println!("{}", "=".repeat(40).dimmed());

    match engine.list_voices().await {
        Ok(voices) => {
            let chosen = select_voice(&voices, locale);
            if voices.is_empty() {
                println!("{}", "No voices reported by the engine".yellow());
            }
            for voice in &voices {
                let line = format!("  • {} ({})", voice.name, voice.lang);
                if voice.id == chosen {
                    println!("{}", line.green().bold());
                } else {
                    println!("{}", line);
                }
            }
            println!("\nLocale {} → voice {}", locale.cyan(), chosen.bold());
        }
        Err(e) => {
            println!("{}: {}", "Error listing voices".red(), e);
            println!("Install a speech engine, e.g. {}", "espeak-ng".bold());
        }
    }

    Ok(())
}
