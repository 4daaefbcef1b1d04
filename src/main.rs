mod app;
mod applescript;
mod cli;
mod commands;
mod config;
mod defaults;
mod delivery;
mod images;
mod logging;
mod modals;
mod probe;
mod store;
mod ui;
mod validators;

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Parser;
use crossterm::event::{Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{DefaultTerminal, Terminal};
use tracing::{debug, error, info, warn};

use crate::app::{App, SessionInfo};
use crate::cli::{Cli, Commands};
use crate::commands::Context;
use crate::config::{Config, ConfigLoadStatus};
use crate::delivery::{DeliveryShim, OsascriptRunner};
use crate::images::HttpImageFetcher;
use crate::store::TemplateStore;
use crate::validators::validate_executable_path;

fn build_context(cli: &Cli, config: Config) -> Result<Context> {
    let defaults = defaults::load_defaults(config.defaults_path().as_deref());
    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path());
    let store = TemplateStore::open(store_path, defaults, config.store.on_corrupt);
    debug!(
        path = %store.path().display(),
        count = store.len(),
        source = ?store.source(),
        "store_opened"
    );
    if store.source().used_defaults() {
        info!(source = ?store.source(), "store_using_defaults");
    }

    if let Some(e) = validate_executable_path(&config.messages.osascript) {
        warn!(path = %config.messages.osascript, error = %e, "osascript_path_invalid");
    }

    let runner = OsascriptRunner::new(config.osascript_path(), config.script_timeout());
    let fetcher = HttpImageFetcher::new(config.download_timeout())
        .context("Failed to build HTTP client")?;
    let mut shim = DeliveryShim::new(Box::new(runner), Box::new(fetcher))
        .with_service(config.messages.service)
        .with_fallback_text(config.images.fallback_text.clone());
    if let Some(dir) = &config.images.temp_dir {
        shim = shim.with_temp_dir(Config::expand_tilde(dir));
    }

    Ok(Context {
        config,
        store,
        shim,
    })
}

fn run_tui(
    ctx: Context,
    session: SessionInfo,
    to: Option<String>,
    quick: bool,
) -> Result<()> {
    let Context {
        config,
        store,
        shim,
    } = ctx;
    let mut app = App::new(
        store,
        shim,
        config.images.urls.clone(),
        config.preselect(quick),
        session,
    );

    if let Some(to) = to {
        app.fill_recipient(&to);
    } else if quick {
        app.detect_recipient();
    }

    enable_raw_mode()?;
    with_terminal(setup_terminal, |terminal| run_app(terminal, &mut app), restore_terminal)
}

/// Run `body` on the terminal from `setup`, then always run `restore`.
///
/// The first error wins; a restore failure is only reported when everything
/// before it succeeded.
fn with_terminal<T>(
    setup: impl FnOnce() -> Result<T>,
    body: impl FnOnce(T) -> Result<()>,
    restore: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let result = setup().and_then(body);
    let restored = restore();
    result.and(restored)
}

fn setup_terminal() -> Result<DefaultTerminal> {
    execute!(io::stdout(), EnterAlternateScreen)?;
    Ok(Terminal::new(ratatui::backend::CrosstermBackend::new(io::stdout()))?)
}

/// Leave raw mode and the alternate screen, whichever of them got entered.
fn restore_terminal() -> Result<()> {
    let raw = disable_raw_mode();
    let screen = execute!(io::stdout(), LeaveAlternateScreen);
    raw?;
    screen?;
    Ok(())
}

fn run_app(mut terminal: DefaultTerminal, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|f| ui::draw_ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(250))?
            && let Event::Key(key) = crossterm::event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key.code, key.modifiers);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    // Initialize logging before anything else
    let logging_ctx = match logging::init() {
        Ok(ctx) => Ok(ctx),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            Err(e.message)
        }
    };

    let loaded_config = config::load_config(cli.config.as_deref());
    debug!(
        config_path = %loaded_config.config_path.display(),
        status = ?loaded_config.status,
        "config_loaded"
    );
    if let ConfigLoadStatus::Error(e) = &loaded_config.status {
        warn!(error = %e, "config_defaults_used");
    }

    let session = match &logging_ctx {
        Ok(ctx) => {
            ctx.set_level(&loaded_config.config.logging.level);
            logging::cleanup_old_logs(&ctx.log_directory);
            SessionInfo {
                session_id: Some(ctx.session_id.clone()),
                log_directory: Some(ctx.log_directory.clone()),
                logging_error: None,
            }
        }
        Err(message) => SessionInfo {
            logging_error: Some(message.clone()),
            ..SessionInfo::default()
        },
    };

    let mut ctx = build_context(&cli, loaded_config.config)?;

    let result = match cli.command {
        None => run_tui(ctx, session.clone(), None, false),
        Some(Commands::Tui { to, quick }) => run_tui(ctx, session.clone(), to, quick),
        Some(command) => commands::dispatch(&mut ctx, command, &mut io::stdout()),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "command_failed");
    }

    if let Some(sid) = &session.session_id {
        info!(
            session_id = %sid,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }

    result
}
