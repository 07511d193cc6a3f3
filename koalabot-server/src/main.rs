// File: koalabot-server/src/main.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use koalabot_common::models::ChatEvent;
use koalabot_common::traits::DurableStore;
use koalabot_core::cache::Stenographer;
use koalabot_core::eventbus::{BotEvent, EventBus};
use koalabot_core::repositories::PostgresDurableStore;
use koalabot_core::services::word_tracker::{compile_tracked_words, load_tracked_words};
use koalabot_core::services::{AnalyticsState, ChatListener, ProfanityLeaderboard, StreakListener};
use koalabot_core::tasks::{sync_leaderboard_startup_data, sync_streak_startup_data};
use koalabot_core::utils::time::now_millis;
use koalabot_core::{AnalyticsConfig, Database};

#[derive(Parser, Debug, Clone)]
#[command(name = "koalabot")]
#[command(author, version, about = "KoalaBot - chat analytics: message cache, word leaderboard and streaks")]
struct Args {
    /// Postgres connection URL; overrides DATABASE_URL.
    #[arg(long)]
    db_url: Option<String>,

    /// Root of the chat history tree; overrides LOG_BASE_DIR.
    #[arg(long)]
    log_base_dir: Option<PathBuf>,

    /// Per-scope cache capacity; overrides LOG_MAX_ENTRIES.
    #[arg(long)]
    max_entries: Option<usize>,

    /// Author id of the bot itself; its own messages are never counted.
    #[arg(long, env = "BOT_AUTHOR_ID")]
    self_author_id: Option<String>,

    /// Read `author<@id>: content` lines from stdin as chat in this guild.
    #[arg(long)]
    console_guild: Option<String>,

    #[arg(long, default_value = "console")]
    console_channel: String,

    /// Seconds between heartbeat ticks on the event bus.
    #[arg(long, default_value_t = 10)]
    tick_secs: u64,
}

impl Args {
    /// Settings come from the environment; flags given on the command line win.
    fn apply_to(&self, config: &mut AnalyticsConfig) {
        if let Some(dir) = &self.log_base_dir {
            config.log_base_dir = dir.clone();
        }
        if let Some(max) = self.max_entries {
            config.max_entries = max;
        }
        if let Some(url) = &self.db_url {
            config.database_url = Some(url.clone());
        }
    }
}

fn init_tracing() {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {e}");
    }
    let filter = EnvFilter::from_default_env()
        .add_directive("koalabot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let mut config = AnalyticsConfig::from_env();
    args.apply_to(&mut config);
    info!("KoalaBot starting. database={}, console={}",
          config.database_url.is_some(), args.console_guild.is_some());

    run_server(args, config).await
}

/// Everything built before chat traffic starts.
struct Startup {
    state: AnalyticsState,
    db: Option<Database>,
}

/// Loads words, history and streak files, then connects and reconciles the
/// durable store when one is configured and reachable.
async fn bootstrap(config: &AnalyticsConfig) -> Startup {
    // 1) Tracked words. A missing file only disables the leaderboard.
    let words_path = config.tracked_words_path();
    let tracked = match load_tracked_words(&words_path) {
        Ok(words) => words,
        Err(e) => {
            warn!("No tracked words loaded from {:?}: {}", words_path, e);
            Vec::new()
        }
    };

    // 2) Cache and history.
    let mut stenographer = Stenographer::new(config.max_entries);
    stenographer.load_history(&config.log_base_dir, &config.log_file_name);
    info!("History loaded: {} cached messages", stenographer.total_cached_count());

    let mut leaderboard = ProfanityLeaderboard::new(compile_tracked_words(&tracked))
        .with_ignore_list(config.leaderboard_ignore.clone());
    leaderboard.recalculate_all(&stenographer);

    // 3) Streak listeners, restored from their snapshot files.
    let mut streaks = Vec::with_capacity(config.streak_words.len());
    for word in &config.streak_words {
        let mut listener = StreakListener::new(
            word,
            config.tier_for(word),
            config.streak_channels.clone(),
            config.streak_save_dir.clone(),
        );
        if let Err(e) = listener.load_saved() {
            error!("Could not restore streaks for '{}': {}", word, e);
        }
        streaks.push(listener);
    }

    // 4) Durable store, if configured and reachable.
    let db = Database::connect_optional(config.database_url.as_deref()).await;

    if let Some(db) = &db {
        let store: Arc<dyn DurableStore> = Arc::new(PostgresDurableStore::new(db.pool().clone()));

        let report = sync_leaderboard_startup_data(store.as_ref(), &mut leaderboard, &stenographer).await;
        info!("Leaderboard reconciled: pushed={:?} pulled={:?} failed={:?}",
              report.pushed, report.pulled, report.failed);
        for listener in &mut streaks {
            let report = sync_streak_startup_data(store.as_ref(), listener).await;
            info!("Streaks for '{}' reconciled: migrated={:?} merged={:?} failed={:?}",
                  listener.word(), report.migrated, report.merged, report.failed);
        }

        leaderboard.set_store(Some(store.clone()));
        for listener in &mut streaks {
            listener.set_store(Some(store.clone()));
        }
    }

    Startup {
        state: AnalyticsState::new(stenographer, leaderboard, streaks),
        db,
    }
}

async fn run_server(args: Args, config: AnalyticsConfig) -> anyhow::Result<()> {
    let Startup { state, db } = bootstrap(&config).await;

    // 5) Event bus and chat listener.
    let event_bus = Arc::new(EventBus::new());
    let state = Arc::new(Mutex::new(state));

    let mut listener = ChatListener::new(state.clone(), event_bus.clone());
    if let Some(id) = &args.self_author_id {
        listener = listener.with_self_author_id(id.clone());
    }
    let listener_handle = listener.spawn().await;

    let mut replies = event_bus.subscribe(None).await;
    let reply_handle = tokio::spawn(async move {
        while let Some(event) = replies.recv().await {
            if let BotEvent::ChatReply { guild_id, channel_id, text } = event {
                println!("[{guild_id}/{channel_id}] {text}");
            }
        }
    });

    let console_handle = args.console_guild.clone().map(|guild_id| {
        spawn_console_reader(event_bus.clone(), guild_id, args.console_channel.clone())
    });

    // 6) Handle Ctrl-C to signal shutdown
    let eb_clone = event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    // 7) Main event loop
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    let mut ticker = time::interval(Duration::from_secs(args.tick_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                event_bus.publish(BotEvent::Tick).await;
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting server loop.");
                    break;
                }
            }
        }
    }

    // 8) Drain the listener (it flushes pending snapshot writes) and close up.
    if let Some(handle) = console_handle {
        handle.abort();
    }
    if let Err(e) = listener_handle.await {
        error!("Chat listener task failed: {:?}", e);
    }
    reply_handle.abort();
    if let Some(db) = db {
        db.close().await;
    }

    info!("Main finished. Goodbye!");
    Ok(())
}

/// Feeds stdin lines into the bus as chat messages from a single channel.
fn spawn_console_reader(
    event_bus: Arc<EventBus>,
    guild_id: String,
    channel_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    match ChatEvent::parse_standard_format(&guild_id, &channel_id, &line, now_millis()) {
                        Some(event) => event_bus.publish_chat(event).await,
                        None => warn!("Ignoring console line (expected `author<@id>: text`): {}", line),
                    }
                }
                Ok(None) => {
                    info!("Console input closed.");
                    break;
                }
                Err(e) => {
                    error!("Console read error: {:?}", e);
                    break;
                }
            }
        }
    })
}
