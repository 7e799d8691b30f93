use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod attachment;
mod config;
mod conversation;
mod gemini;
mod handler;
mod search;
mod session;
mod speech;
mod tui;
mod ui;
mod user;

use app::App;
use config::Settings;
use gemini::GeminiClient;
use tui::EventHandler;

/// Logs go to a file so they never fight the alternate screen for the
/// terminal. Level comes from CAMPUSCHAT_LOG (default: warn).
fn init_logging() -> Result<()> {
    let dir = config::log_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("campuschat.log"))?;

    let filter = EnvFilter::try_from_env("CAMPUSCHAT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let settings = Settings::load();
    let user = user::sign_in();
    let gemini = GeminiClient::from_env();
    if gemini.is_none() {
        info!("GEMINI_API_KEY not set; assistant replies will report the missing credential");
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(user, settings, gemini, events.sender());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event)?;
        } else {
            break;
        }
    }

    app.shutdown();
    tui::restore()?;
    Ok(())
}
