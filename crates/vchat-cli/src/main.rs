//! vchat - terminal client for the vchat backend

mod commands;
mod config;
mod credentials;
mod render;

use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use vchat_api::{HttpBackend, StreamState};
use vchat_core::{
    BufferedNotifier, ConversationController, ConversationEvent, FileSessionStorage, Notice,
    NoticeLevel, PersistenceBridge, SendOutcome,
};

/// vchat - chat with the vchat backend from a terminal
#[derive(Parser, Debug)]
#[command(name = "vchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: config file, $VCHAT_API_URL, http://localhost:5000)
    #[arg(long)]
    api_url: Option<String>,

    /// Use the stored credentials instead of a guest session
    #[arg(long)]
    registered: bool,

    /// Send a single message, print the answer and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Start with an empty guest transcript
    #[arg(long)]
    new: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Forget the stored credentials
    #[arg(long)]
    logout: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("vchat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_notice(notice: Notice) {
    let label = match notice.level {
        NoticeLevel::Default => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
        NoticeLevel::Warning => "warning",
    };
    eprintln!("[{}] {}", label, notice.message);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.logout {
        let path = credentials::credentials_file();
        if credentials::remove(&path)? {
            println!("Removed credentials at {}", path.display());
        } else {
            println!("No stored credentials.");
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // CLI takes precedence over the config file
    let api_url = args
        .api_url
        .clone()
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| cfg.api_url());
    let registered = args.registered || cfg.is_registered();

    let backend = if registered {
        let store = credentials::CredentialsStore::open();
        if !store.has_access_token() {
            eprintln!("Error: No credentials found at {}", store.path().display());
            eprintln!();
            eprintln!("Sign in with the web client, then save the token pair there as:");
            eprintln!(r#"  {{"access_token": "...", "refresh_token": "..."}}"#);
            eprintln!("Or run without --registered for a guest session.");
            std::process::exit(1);
        }
        HttpBackend::registered(api_url.clone(), Arc::new(store))
    } else {
        HttpBackend::guest(api_url.clone())
    };
    let backend = Arc::new(
        backend
            .with_retry_config(cfg.retry_config())
            .with_request_timeout(cfg.request_timeout()),
    );

    let notifier = Arc::new(BufferedNotifier::default());
    let mut controller = ConversationController::new(backend.clone(), notifier.clone());
    if !registered {
        let storage = FileSessionStorage::new(cfg.session_dir());
        tracing::debug!("Guest transcript kept in {}", storage.dir().display());
        let bridge = PersistenceBridge::new(Arc::new(storage));
        if args.new {
            bridge.clear();
        }
        controller = controller.with_persistence(bridge);
    }
    notifier.attach(print_notice);

    // Non-interactive mode
    if let Some(command) = args.command {
        return stream_turn(&controller, &command).await;
    }

    run_interactive(&controller, &backend, &api_url).await
}

async fn run_interactive(
    controller: &ConversationController,
    backend: &HttpBackend,
    api_url: &str,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if io::IsTerminal::is_terminal(&io::stderr()) {
        let mode = if controller.mode() == vchat_api::SessionMode::Registered {
            "registered"
        } else {
            "guest"
        };
        let restored = controller.messages().len();
        if restored > 0 {
            eprintln!("vchat ({}, {}) restored {} messages", mode, api_url, restored);
        } else {
            eprintln!("vchat ({}, {})", mode, api_url);
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        // EOF
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, &controller.messages()) {
            match result {
                commands::CommandResult::NewChat => {
                    controller.new_chat();
                    println!("Started a new conversation.");
                }
                commands::CommandResult::Message(msg) => {
                    println!("{}", msg);
                }
                commands::CommandResult::Conversation(command) => {
                    println!("{}", command.run(backend, controller).await);
                }
                commands::CommandResult::Exit => {
                    break;
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        stream_turn(controller, input).await?;
    }

    Ok(())
}

/// Send one message and print the answer as it streams in. Ctrl-C stops the
/// answer without leaving the program.
async fn stream_turn(controller: &ConversationController, text: &str) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    let mut printer = render::AnswerPrinter::new(controller.store());
    let mut stdout = io::stdout();

    let send = controller.send(text);
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            Ok(event) = events.recv() => print_event(&mut printer, &event, &mut stdout)?,
            _ = tokio::signal::ctrl_c() => controller.abort(),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&mut printer, &event, &mut stdout)?;
    }
    if let Some(tail) = printer.finish() {
        write!(stdout, "{}", tail)?;
        stdout.flush()?;
    }

    match outcome {
        Ok(SendOutcome::Cancelled)
        | Ok(SendOutcome::Streamed {
            state: StreamState::Cancelled,
            ..
        }) => eprintln!("(stopped)"),
        Ok(_) => {}
        Err(e) => eprintln!("Error: {}", e),
    }
    Ok(())
}

fn print_event(
    printer: &mut render::AnswerPrinter,
    event: &ConversationEvent,
    out: &mut impl Write,
) -> io::Result<()> {
    if let Some(text) = printer.render(event) {
        write!(out, "{}", text)?;
        out.flush()?;
    }
    Ok(())
}
