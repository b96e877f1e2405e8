mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nexus_core::ai::gemini;
use nexus_core::{AppMode, ChatState, Config, ScriptedBackend, SessionFactory};

use app::App;
use tui::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "nexus", version)]
#[command(about = "Terminal chat with four assistant modes, streaming replies from Gemini")]
struct Args {
    /// Mode to start in: general, planner, coder or writer
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<AppMode>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Reply from a local scripted backend instead of Gemini
    #[arg(long)]
    mock: bool,

    /// Give up on a reply after this many seconds without a fragment (0 waits forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write logs here instead of the default data directory
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn parse_mode(value: &str) -> std::result::Result<AppMode, String> {
    AppMode::from_str(value).ok_or_else(|| {
        format!("unknown mode '{value}', expected general, planner, coder or writer")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_file.as_deref())?;

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "could not read config file, using defaults");
            Config::new()
        }
    };
    // CLI flags override the config file
    if let Some(model) = args.model.clone() {
        config.model = Some(model);
    }
    if let Some(secs) = args.timeout {
        config.reply_timeout_secs = Some(secs);
    }

    let mode = args.mode.unwrap_or_else(|| config.default_mode());
    let model = if args.mock {
        "scripted".to_string()
    } else {
        config.model().to_string()
    };
    tracing::info!(mode = mode.display_name(), %model, mock = args.mock, "starting nexus");

    let factory = build_factory(config.clone(), args.mock);
    let chat = ChatState::new(factory, mode).with_fragment_timeout(config.reply_timeout());

    let mut terminal = tui::init().context("could not set up the terminal")?;
    tui::install_panic_hook();

    let result = run(&mut terminal, chat, model).await;

    tui::restore()?;
    result
}

fn build_factory(config: Config, mock: bool) -> SessionFactory {
    if mock {
        return SessionFactory::with_backend(Arc::new(ScriptedBackend::demo()));
    }
    SessionFactory::new(move || gemini::connect(&config))
}

async fn run(terminal: &mut tui::Tui, chat: ChatState, model: String) -> Result<()> {
    let mut events = EventHandler::new();
    let mut app = App::new(chat, events.reply_sender(), model);
    app.start();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }
    }

    tracing::info!("exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flag_is_case_insensitive() {
        let argv = ["nexus", "--mode", "Coder", "--mock", "--timeout", "30"];
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.mode, Some(AppMode::Coder));
        assert!(args.mock);
        assert_eq!(args.timeout, Some(30));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["nexus", "--mode", "poet"]).is_err());
    }

    #[test]
    fn default_model_comes_from_gemini_settings() {
        assert_eq!(Config::new().model(), gemini::DEFAULT_MODEL);
    }
}
