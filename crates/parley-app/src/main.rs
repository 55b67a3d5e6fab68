//! Parley application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Load the response catalog (bundled or from disk)
//! 3. Open the persistence medium (SQLite or in-memory)
//! 4. Mount a chat session and run a line-based REPL on stdin
//!
//! Bot replies are printed through the reveal stream, one character per tick.

mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use parley_chat::format::{day_label, time_label, to_local};
use parley_chat::{
    ChatEvent, ChatSession, IgnoreReason, ResponseCatalog, RevealFrame, SendOutcome,
    SessionOptions,
};
use parley_core::config::ParleyConfig;
use parley_core::random::ThreadRandom;
use parley_core::types::{Message, MessageId, Sender, StorageBackend};
use parley_storage::{ConversationStore, MemoryStore, SqliteStore};

use crate::cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn load_catalog(config: &ParleyConfig) -> parley_core::Result<ResponseCatalog> {
    match config.widget.catalog_path {
        Some(ref path) => ResponseCatalog::from_path(&resolve_data_dir(path)),
        None => ResponseCatalog::bundled(),
    }
}

fn open_store(config: &ParleyConfig) -> parley_core::Result<ConversationStore> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory conversation storage");
            Ok(ConversationStore::new(Arc::new(MemoryStore::new())))
        }
        StorageBackend::Sqlite => {
            let db_path =
                resolve_data_dir(&config.general.data_dir).join(&config.storage.database_file);
            let medium = SqliteStore::open(&db_path)?;
            Ok(ConversationStore::new(Arc::new(medium)))
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn speaker(message: &Message) -> &'static str {
    match message.sender {
        Sender::User => "you",
        Sender::Bot => "bot",
    }
}

fn print_message(message: &Message) {
    let at = to_local(&message.created_at);
    println!("[{}] {}: {}", time_label(&at), speaker(message), message.text);
}

fn print_history(session: &ChatSession) {
    let messages = session.messages();
    let now = to_local(&chrono::Utc::now());
    let mut last_day = None;
    for message in &messages {
        let day = day_label(&to_local(&message.created_at), &now);
        if last_day.as_ref() != Some(&day) {
            println!("--- {} ---", day);
            last_day = Some(day);
        }
        print_message(message);
    }
}

/// Settle bot messages a previous run left mid-reveal. History prints
/// their full text, so there is nothing left to animate.
fn settle_interrupted_reveals(session: &ChatSession) -> usize {
    let settled = session
        .messages()
        .iter()
        .filter(|m| m.is_bot() && !m.is_final())
        .filter(|m| session.mark_message_settled(&m.id))
        .count();
    if settled > 0 {
        tracing::debug!(settled, "Settled interrupted reveals");
    }
    settled
}

/// Chips the user can pick by number: follow-ups, or starters on an empty log.
fn current_chips(session: &ChatSession) -> Vec<String> {
    let suggestions = session.visible_suggestions();
    if suggestions.is_empty() {
        session.starter_prompts()
    } else {
        suggestions
    }
}

fn print_chips(chips: &[String]) {
    for (i, chip) in chips.iter().enumerate() {
        println!("  [{}] {}", i + 1, chip);
    }
}

/// Print a bot message through its reveal stream.
async fn reveal(session: &ChatSession, id: &MessageId) {
    let Some(message) = session.messages().into_iter().find(|m| &m.id == id) else {
        return;
    };
    let Some(mut stream) = session.play_reveal(id) else {
        return;
    };

    let at = to_local(&message.created_at);
    print!("[{}] bot: ", time_label(&at));
    let mut shown = 0;
    let mut stdout = std::io::stdout();
    while let Some(frame) = stream.next_frame().await {
        let text = match frame {
            RevealFrame::Partial(ref text) | RevealFrame::Complete(ref text) => text,
        };
        if text.len() > shown {
            print!("{}", &text[shown..]);
            shown = text.len();
            let _ = stdout.flush();
        }
        if matches!(frame, RevealFrame::Complete(_)) {
            break;
        }
    }
    println!();
}

// =============================================================================
// REPL
// =============================================================================

enum Command {
    Quit,
    Clear,
    History,
    Pick(usize),
    Say(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    match line {
        "/quit" | "/exit" => Command::Quit,
        "/clear" => Command::Clear,
        "/history" => Command::History,
        _ => match line.parse::<usize>() {
            Ok(n) if n > 0 => Command::Pick(n - 1),
            _ => Command::Say(line.to_string()),
        },
    }
}

fn send(session: &ChatSession, text: &str) {
    match session.send_message(text) {
        SendOutcome::Accepted(_) => {}
        SendOutcome::Ignored(IgnoreReason::Busy) => println!("(still typing, one moment)"),
        SendOutcome::Ignored(IgnoreReason::Blank) => {}
        SendOutcome::Ignored(IgnoreReason::Closed) => println!("(session closed)"),
    }
}

async fn run(session: ChatSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    settle_interrupted_reveals(&session);
    print_history(&session);
    print_chips(&current_chips(&session));
    println!("(type a message, a chip number, /history, /clear or /quit)");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Clear => session.clear_messages(),
                    Command::History => print_history(&session),
                    Command::Pick(index) => match current_chips(&session).get(index) {
                        Some(chip) => {
                            println!("you: {}", chip);
                            send(&session, chip);
                        }
                        None => send(&session, &line),
                    },
                    Command::Say(text) => send(&session, &text),
                }
            }
            event = events.recv() => {
                match event {
                    Ok(ChatEvent::TypingChanged { is_typing: true }) => println!("bot is typing..."),
                    Ok(ChatEvent::MessageAppended { message }) if message.is_bot() => {
                        reveal(&session, &message.id).await;
                        print_chips(&current_chips(&session));
                    }
                    Ok(ChatEvent::Cleared { greeting }) => {
                        println!("--- conversation cleared ---");
                        print_message(&greeting);
                        print_chips(&current_chips(&session));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Chat events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    session.close();
    Ok(())
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Subscriber with a swappable level filter, so logging can start before
/// the config file that names the final level has been read.
fn build_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl tracing::Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer));
    (subscriber, handle)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing first, so config load failures are reported. Logs go to
    // stderr so they do not interleave with the chat. RUST_LOG wins over
    // every other level source.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let env_pinned = env_filter.is_some();
    let startup_level = args.resolve_log_level("info");
    let (subscriber, filter) = build_subscriber(
        env_filter.unwrap_or_else(|| EnvFilter::new(&startup_level)),
        std::io::stderr,
    );
    subscriber.init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file);
    args.apply(&mut config);

    if !env_pinned && config.general.log_level != startup_level {
        if let Err(e) = filter.reload(EnvFilter::new(&config.general.log_level)) {
            tracing::warn!(error = %e, "Failed to apply configured log level");
        }
    }

    tracing::info!(
        path = %config_file.display(),
        key = %config.widget.storage_key,
        "Configuration resolved"
    );
    config.validate()?;

    let catalog = match load_catalog(&config) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load response catalog");
            return Err(e.into());
        }
    };
    let store = open_store(&config)?;

    let session = ChatSession::open(
        SessionOptions::from_config(&config),
        catalog,
        store,
        Box::new(ThreadRandom::new()),
    )?;

    run(session).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use parley_core::random::SequenceRandom;
    use parley_core::types::ConversationLog;

    /// In-memory log sink for a test subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bad_config_is_reported_before_level_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\nreply_delay_min_ms = ").unwrap();

        let out = Captured::default();
        let sink = out.clone();
        let (subscriber, filter) = build_subscriber(EnvFilter::new("info"), move || sink.clone());

        tracing::subscriber::with_default(subscriber, || {
            let config = ParleyConfig::load_or_default(&path);
            assert_eq!(config.general.log_level, "info");

            filter.reload(EnvFilter::new("error")).unwrap();
            tracing::warn!("quiet after reload");
        });

        let text = out.text();
        assert!(text.contains("Using defaults"), "missing warning in: {}", text);
        assert!(!text.contains("quiet after reload"));
    }

    #[tokio::test]
    async fn test_interrupted_reveal_is_settled_on_startup() {
        let medium = Arc::new(MemoryStore::new());
        let store = ConversationStore::new(medium);
        let mut log = ConversationLog::new();
        log.push(Message::greeting("Hello!", vec![]));
        log.push(Message::user("pricing"));
        log.push(Message::bot_reply(
            "Plans start small.",
            vec!["Book a call".to_string()],
        ));
        store.save("restart", &log);

        let options = SessionOptions {
            storage_key: "restart".to_string(),
            ..SessionOptions::default()
        };
        let session = ChatSession::open(
            options,
            Arc::new(ResponseCatalog::bundled().unwrap()),
            store.clone(),
            Box::new(SequenceRandom::constant(0.0)),
        )
        .unwrap();
        assert!(session.visible_suggestions().is_empty());

        assert_eq!(settle_interrupted_reveals(&session), 1);
        assert!(session.messages().iter().all(|m| m.is_final()));
        assert_eq!(session.visible_suggestions(), vec!["Book a call".to_string()]);
        assert!(store.load("restart").unwrap().iter().all(|m| m.is_final()));

        // Nothing left on a second pass
        assert_eq!(settle_interrupted_reveals(&session), 0);
    }

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command("/quit"), Command::Quit));
        assert!(matches!(parse_command(" /clear "), Command::Clear));
        assert!(matches!(parse_command("/history"), Command::History));
        assert!(matches!(parse_command("2"), Command::Pick(1)));
        assert!(matches!(parse_command("0"), Command::Say(ref s) if s == "0"));
        assert!(matches!(parse_command("hello"), Command::Say(ref s) if s == "hello"));
    }

    #[test]
    fn test_resolve_data_dir_plain_path() {
        assert_eq!(resolve_data_dir("/var/lib/parley"), PathBuf::from("/var/lib/parley"));
    }
}
