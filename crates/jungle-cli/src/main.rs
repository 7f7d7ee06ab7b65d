//! jungle - terminal client for the Bitcoin Jungle chat assistant

mod commands;
mod config;
mod ui;

use clap::Parser;
use jungle_ai::providers::ChatAssistProvider;
use jungle_chat::{Chat, ChatConfig, ConversationStore, FileStore, SendOutcome};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// jungle - chat with the Bitcoin Jungle Educator
#[derive(Parser, Debug)]
#[command(name = "jungle")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Chat completion endpoint
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Directory holding the stored conversation
    #[arg(long)]
    data_dir: Option<String>,

    /// Print the stored conversation and exit
    #[arg(long)]
    history: bool,

    /// Clear the stored conversation and exit
    #[arg(long)]
    clear: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("jungle=debug,jungle_ai=debug,jungle_chat=debug")
            .with_writer(std::io::stderr)
            .init();
    }

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

    let cfg = config::Config::load();

    // CLI args take precedence over the config file
    let data_dir = args
        .data_dir
        .as_deref()
        .map(config::expand_home)
        .unwrap_or_else(|| cfg.data_dir());
    let store = ConversationStore::with_key(Arc::new(FileStore::new(data_dir)), cfg.storage_key());

    if args.clear {
        store.try_clear()?;
        println!("Cleared conversation.");
        return Ok(());
    }

    if args.history {
        ui::print_history(&store.try_load()?);
        return Ok(());
    }

    let endpoint = args.endpoint.unwrap_or_else(|| cfg.endpoint());
    tracing::debug!("Using endpoint {} and store key {}", endpoint, store.key());
    let mut provider = ChatAssistProvider::with_timeout(endpoint, cfg.request_timeout())?;
    if let Some(key) = cfg.api_key() {
        provider = provider.api_key(key);
    }

    let chat_config = ChatConfig {
        max_history: cfg.max_history,
        ..ChatConfig::default()
    };
    let chat = Chat::new(chat_config, Arc::new(provider), store);

    if let Some(ref command) = args.command {
        run_exchange(&chat, command).await?;
    } else {
        run_interactive(&chat).await?;
    }

    Ok(())
}

/// Send one message, printing the reply as it streams. Ctrl-C stops the
/// reply and keeps what arrived.
async fn run_exchange(chat: &Chat, text: &str) -> anyhow::Result<()> {
    let mut events = chat.subscribe();
    let mut printer = ui::StreamPrinter::new();

    let send = chat.send(text);
    tokio::pin!(send);

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            Ok(event) = events.recv() => printer.handle(&event),
            _ = tokio::signal::ctrl_c() => chat.handle().abort(),
        }
    };

    // Events emitted right before `send` returned
    while let Ok(event) = events.try_recv() {
        printer.handle(&event);
    }
    printer.finish();

    match result {
        Ok(SendOutcome::Aborted { .. }) => println!("[Stopped]"),
        Ok(SendOutcome::Completed { message: None }) => println!("[No reply]"),
        Ok(_) => {}
        Err(e) if e.is_retryable() => {
            return Err(anyhow::anyhow!("{} (try again in a moment)", e));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn run_interactive(chat: &Chat) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("jungle - type /help for commands");
        eprintln!();
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            // EOF
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = commands::parse_command(input) {
            match command {
                commands::Command::Help => println!("{}", commands::help_message()),
                commands::Command::Clear => {
                    chat.clear();
                    println!("Cleared conversation.");
                }
                commands::Command::History => ui::print_history(&chat.messages()),
                commands::Command::Quit => break,
                commands::Command::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        // Failures are shown and the loop keeps going
        if let Err(e) = run_exchange(chat, &line).await {
            eprintln!("Error: {}", e);
        }
        println!();
    }

    Ok(())
}
