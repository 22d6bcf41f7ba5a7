use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use shared_types::{LogEntry, LogEntryKind, Message, Role, Step};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use operator_console::payload::{command_display, format_duration, step_prompt, time_ago};
use operator_console::{
    final_text, flatten, interleave, ChatTranscript, ConsoleConfig, ConsoleApi, HttpApi, LogFeed,
    LogTailer, Part, TranscriptItem,
};

#[derive(Parser)]
#[command(name = "operator-console")]
#[command(about = "Terminal view of the agent platform's chat and session logs")]
#[command(version)]
struct Cli {
    /// Base URL of the platform API (overrides CONSOLE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat transcript commands
    #[command(subcommand)]
    Chat(ChatCommands),

    /// Session log commands
    #[command(subcommand)]
    Logs(LogCommands),
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Print the transcript
    Show {
        /// Older pages to load after the newest one
        #[arg(long, default_value_t = 0)]
        more: usize,
    },

    /// Send a message and wait for the reply
    Send {
        text: String,

        /// Print only the text after the last tool call
        #[arg(long)]
        final_only: bool,
    },

    /// Start a new context
    Reset,

    /// Delete the whole chat history
    Clear,
}

#[derive(Subcommand)]
enum LogCommands {
    /// List session logs, newest first
    List {
        /// Only logs of this connection
        #[arg(long)]
        connection: Option<String>,
    },

    /// Follow one session log until it finishes
    Tail { id: String },

    /// Delete all session logs
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "operator_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ConsoleConfig::from_env().context("loading console configuration")?;
    if let Some(api_url) = cli.api_url {
        config = config.with_api_url(api_url);
        config.validate()?;
    }
    let api = Arc::new(HttpApi::new(&config.api_url)?);

    match cli.command {
        Commands::Chat(command) => run_chat(api, config, command).await,
        Commands::Logs(command) => run_logs(api, config, command).await,
    }
}

async fn run_chat<A: ConsoleApi>(
    api: Arc<A>,
    config: ConsoleConfig,
    command: ChatCommands,
) -> anyhow::Result<()> {
    let poll_interval = config.chat_poll_interval;
    let chat = ChatTranscript::new(api, config);

    match command {
        ChatCommands::Show { more } => {
            chat.load().await?;
            for _ in 0..more {
                if !chat.load_more().await {
                    break;
                }
            }
            let snapshot = chat.snapshot();
            for item in snapshot.layout() {
                match item {
                    TranscriptItem::Message(message) => print_message(message),
                    TranscriptItem::ResetBoundary => println!("──── context reset ────\n"),
                }
            }
            if snapshot.has_more {
                println!("(older messages available, use --more)");
            }
        }
        ChatCommands::Send { text, final_only } => {
            chat.load().await?;
            let sent = chat.send(&text).await?;
            while chat.is_polling() {
                tokio::time::sleep(poll_interval).await;
            }
            let reply = chat
                .messages()
                .into_iter()
                .find(|m| m.id == sent.assistant_message.id)
                .unwrap_or(sent.assistant_message);
            if final_only {
                println!("{}", final_text(&reply.content, &reply.steps));
            } else {
                println!("{}", flatten(&reply.content, &reply.steps));
            }
        }
        ChatCommands::Reset => {
            let session_id = chat.reset_context().await?;
            println!("new session {session_id}");
        }
        ChatCommands::Clear => {
            chat.clear_history().await?;
            println!("chat history cleared");
        }
    }
    Ok(())
}

async fn run_logs<A: ConsoleApi>(
    api: Arc<A>,
    config: ConsoleConfig,
    command: LogCommands,
) -> anyhow::Result<()> {
    match command {
        LogCommands::List { connection } => {
            let feed = LogFeed::new(api, config, connection);
            feed.load().await?;
            feed.close();
            let now = Utc::now();
            for log in feed.newest_first() {
                println!(
                    "{}  {:<10} {:<16} {:>8}  {}",
                    log.id,
                    format!("{:?}", log.status).to_lowercase(),
                    log.agent_name,
                    time_ago(log.started_at, now),
                    log.prompt.lines().next().unwrap_or_default()
                );
            }
        }
        LogCommands::Tail { id } => {
            let poll_interval = config.log_poll_interval;
            let tailer = LogTailer::new(api, config);
            tailer.open(&id, false).await?;

            let mut printed = 0;
            loop {
                let entries = tailer.entries(Utc::now());
                for entry in entries.iter().skip(printed) {
                    print_entry(entry);
                }
                printed = entries.len();
                if !tailer.is_polling() {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }
            if let Some(log) = tailer.log() {
                if let Some(finished_at) = log.finished_at {
                    println!("finished in {}", format_duration(log.started_at, finished_at));
                }
            }
        }
        LogCommands::Clear => {
            let feed = LogFeed::new(api, config, None);
            feed.clear().await?;
            feed.close();
            println!("session logs cleared");
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
    };
    println!("[{who}] {}", message.created_at.format("%Y-%m-%d %H:%M:%S"));
    for part in interleave(&message.content, &message.steps) {
        match part {
            Part::Text(text) => println!("{text}"),
            Part::Step(step) => print_step(step),
        }
    }
    if message.is_pending() {
        println!("…");
    }
    println!();
}

fn print_step(step: &Step) {
    let title = if step.label.is_empty() {
        &step.tool
    } else {
        &step.label
    };
    let took = match (step.started_at, step.finished_at) {
        (Some(start), Some(end)) => format!(" ({})", format_duration(start, end)),
        _ => String::new(),
    };
    println!("  🔧 {title} [{:?}]{took}", step.status);
    let prompt = step_prompt(step);
    if !prompt.is_empty() {
        println!("     {prompt}");
    }
}

fn print_entry(entry: &LogEntry) {
    let time = entry.timestamp.format("%H:%M:%S");
    match entry.kind {
        LogEntryKind::Command => println!("{time} $ {}", command_display(&entry.content)),
        LogEntryKind::Error => println!("{time} ! {}", entry.content),
        _ => println!("{time}   {}", entry.content),
    }
}
