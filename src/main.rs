use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tattva::config::{self, TattvaConfig};
use tattva::memory::log::ConversationLog;
use tattva::secrets::Service;
use tattva::session::{ChatSession, TurnOutcome};
use tattva::types::{Exchange, Feedback, Notice};

#[derive(Parser)]
#[command(name = "tattva")]
#[command(about = "Chat with a hosted completion model, with conversation memory")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.tattva/config.toml)
    #[arg(long, global = true, env = "TATTVA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat,

    /// Send one question and print the reply
    Ask {
        /// The question
        input: String,
    },

    /// Show the conversation log
    History {
        /// Group the last N exchanges by topic
        #[arg(short, long, default_value = "5")]
        recent: usize,

        /// Print every exchange instead
        #[arg(long)]
        all: bool,
    },

    /// Serve the chat session over local HTTP
    Serve {
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (loopback only)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Store an API key in the credential store
    Onboard {
        /// Which service the key is for
        #[arg(value_enum, default_value_t = Service::Completion)]
        service: Service,
    },

    /// Show configuration and log status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    match cli.command {
        Commands::Onboard { service } => onboard(service),
        Commands::Chat => {
            let config = config::load_from(&config_path)?;
            let session = start_session(&config)?;
            chat_loop(session).await
        }
        Commands::Ask { input } => {
            let config = config::load_from(&config_path)?;
            let mut session = start_session(&config)?;
            let outcome = session.submit(&input).await;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::History { recent, all } => {
            let config = config::load_from(&config_path)?;
            let log = ConversationLog::open(&config.memory.log_path)?;
            print_history(&log, recent, all);
            Ok(())
        }
        Commands::Serve { port, bind } => {
            let mut config = config::load_from(&config_path)?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            let session = start_session(&config)?;
            tattva::gateway::run(&config, session).await
        }
        Commands::Status => {
            let config = config::load_from(&config_path)?;
            print_status(&config, &config_path);
            Ok(())
        }
    }
}

fn start_session(config: &TattvaConfig) -> anyhow::Result<ChatSession> {
    let session = ChatSession::from_config(config)?;
    for notice in session.startup_notices() {
        eprintln!("{notice}");
    }
    Ok(session)
}

fn onboard(service: Service) -> anyhow::Result<()> {
    let key = rpassword::prompt_password(format!("API key for {service}: "))?;
    let path = tattva::secrets::store_api_key(service, &key)?;
    println!("Saved {service} key to {}", path.display());
    Ok(())
}

const CHAT_HELP: &str = "Commands: /up, /down, /why <text>, /history, /quit";

async fn chat_loop(mut session: ChatSession) -> anyhow::Result<()> {
    println!("Ask Tattva AI anything. {CHAT_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => println!("{CHAT_HELP}"),
            "/up" => println!("{}", session.feedback(Feedback::ThumbsUp)),
            "/down" => println!("{}", session.feedback(Feedback::ThumbsDown)),
            "/history" => print_history(session.log(), 5, false),
            _ => {
                if let Some(text) = line.strip_prefix("/why ") {
                    println!("{}", session.text_feedback(text));
                } else {
                    let outcome = session.submit(line).await;
                    print_outcome(&outcome);
                    if matches!(outcome, TurnOutcome::Reply { .. }) {
                        println!("Was this response helpful? /up or /down, /why <text>");
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    if let TurnOutcome::Reply { text, topic, .. } = outcome {
        println!("Tattva AI ({topic}): {text}");
    }
    for notice in outcome.notices() {
        eprintln!("{notice}");
    }
}

fn print_exchange(exchange: &Exchange) {
    println!(
        "[{}] You: {}",
        exchange
            .timestamp()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
        exchange.input()
    );
    println!("Tattva AI: {}", exchange.output());
    println!(
        "Feedback: {}",
        exchange
            .feedback()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "None".into())
    );
    if let Some(text) = exchange.text_feedback() {
        println!("Text Feedback: {text}");
    }
    println!("---");
}

fn print_history(log: &ConversationLog, recent: usize, all: bool) {
    if log.is_empty() {
        println!("No chats yet. Start asking!");
        return;
    }
    if all {
        for exchange in log.entries() {
            println!("Topic: {}", exchange.topic());
            print_exchange(exchange);
        }
        return;
    }
    for (topic, exchanges) in log.recent_by_topic(recent) {
        println!("== {topic}");
        for exchange in exchanges {
            print_exchange(exchange);
        }
    }
}

fn print_status(config: &TattvaConfig, config_path: &std::path::Path) {
    println!("tattva v{}", env!("CARGO_PKG_VERSION"));
    println!("config: {}", config_path.display());
    println!("endpoint: {}", config.completion.endpoint);
    println!(
        "completion key: {}",
        if config.completion.api_key.is_some() {
            "set"
        } else {
            "missing (run `tattva onboard`)"
        }
    );
    println!("log: {}", config.memory.log_path.display());
    match ConversationLog::open(&config.memory.log_path) {
        Ok(log) => println!("records: {}", log.len()),
        Err(e) => println!("{}", Notice::error(format!("log unavailable: {e}"))),
    }
    println!(
        "semantic memory: {}",
        if config.memory.semantic_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
}
