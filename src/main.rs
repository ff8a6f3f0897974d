use std::io;
use std::time::Duration;

use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod app;
mod config;
mod db;
mod error;
mod generator;
mod models;
mod services;
mod tui;
mod validation;

use app::App;
use config::Config;
use error::{AppError, Result};
use models::GenerationRequest;
use tui::{draw, handle_key_event};

const API_KEY_ENV: &str = "PROTOTIPAL_API_KEY";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Interactive,
    Generate {
        image_url: String,
        email: String,
        video: bool,
        retries: Option<u32>,
    },
    History,
    Stats,
    SetKey(String),
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(flag) = args.get(1) else {
        return Ok(Command::Interactive);
    };

    match flag.as_str() {
        "--history" => Ok(Command::History),
        "--stats" => Ok(Command::Stats),
        "--set-key" => match args.get(2) {
            Some(key) => Ok(Command::SetKey(key.clone())),
            None => Err(AppError::Config("--set-key needs a value".to_string())),
        },
        "--generate" => {
            let image_url = args
                .get(2)
                .cloned()
                .ok_or_else(|| AppError::Config("--generate needs an image URL".to_string()))?;

            let mut email = String::new();
            let mut video = false;
            let mut retries = None;

            let mut rest = args[3..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--video" => video = true,
                    "--email" => {
                        email = rest
                            .next()
                            .cloned()
                            .ok_or_else(|| AppError::Config("--email needs a value".to_string()))?;
                    }
                    "--retries" => {
                        let n = rest
                            .next()
                            .and_then(|n| n.parse::<u32>().ok())
                            .filter(|n| *n > 0)
                            .ok_or_else(|| {
                                AppError::Config("--retries needs a positive number".to_string())
                            })?;
                        retries = Some(n);
                    }
                    other => return Err(AppError::Config(format!("Unknown option: {other}"))),
                }
            }

            Ok(Command::Generate {
                image_url,
                email,
                video,
                retries,
            })
        }
        other => Err(AppError::Config(format!("Unknown option: {other}"))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    let mut app = App::new(&config).await?;

    match command {
        Command::Interactive => {}
        Command::History => {
            println!("{}", serde_json::to_string_pretty(&app.history)?);
            return Ok(());
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&app.stats)?);
            return Ok(());
        }
        Command::SetKey(key) => {
            app.save_api_key(&key).await?;
            println!("API key saved");
            return Ok(());
        }
        Command::Generate {
            image_url,
            email,
            video,
            retries,
        } => {
            let api_key = match std::env::var(API_KEY_ENV) {
                Ok(key) if !key.is_empty() => key,
                _ => app.form.api_key.clone(),
            };
            let request = GenerationRequest {
                image_url,
                api_key,
                email,
                generate_video: video,
            };

            let mut on_progress = |percent: u8, step: Option<&str>| match step {
                Some(step) => eprintln!("[{percent:>3}%] {step}"),
                None => eprint!("\r[{percent:>3}%]"),
            };

            let result = app.run_headless(request, retries, &mut on_progress).await?;
            eprintln!();
            println!("{}", serde_json::to_string_pretty(&result)?);

            if !result.is_success() {
                std::process::exit(1);
            }
            return Ok(());
        }
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Advance spinner animation and expire notices
        app.tick();

        // Pick up progress and finished generations
        app.poll_generation().await?;

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) =
                        handle_key_event(key, app.focus, app.confirm_clear, app.show_help)
                    {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
