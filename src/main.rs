//! roozbot — a Telegram bot that sends a daily check-in message on the
//! Jalali calendar, tracks who has seen it, and skips recipients on leave.

mod commands;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt;
use roozbot_core::config::BotConfig;
use roozbot_core::store::{JsonFileStore, KvStore, StoreExt, keys};
use roozbot_core::types::{AdminList, ScheduleRecord};
use roozbot_daily::{AckLedger, DailyScheduler, DispatchEngine, LeaveRegistry, Roster, ScheduleTime};
use roozbot_telegram::TelegramClient;
use tracing_subscriber::EnvFilter;

use commands::{App, TelegramOutbound};

#[derive(Parser, Debug)]
#[command(name = "roozbot", version, about = "Daily check-in Telegram bot")]
struct Args {
    /// Path to config.toml (default: ~/.roozbot/config.toml).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = BotConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => BotConfig::load()?,
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if config.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "no bot token configured; set TELEGRAM_BOT_TOKEN or telegram.bot_token in config.toml"
        );
    }

    let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(&config.data_dir));
    seed_initial_admin(store.as_ref());

    let roster = Roster::new(Arc::clone(&store));
    let leaves = LeaveRegistry::new(Arc::clone(&store));
    let ledger = Arc::new(AckLedger::new(Arc::clone(&store)));

    // Two clients: the polling loop consumes one, sends go through the other.
    let sender = Arc::new(TelegramClient::new(config.telegram.clone()));
    let poller = TelegramClient::new(config.telegram.clone());

    let me = sender.get_me().await.context("telegram getMe failed")?;
    tracing::info!(
        "telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&store),
        roster.clone(),
        leaves.clone(),
        Arc::new(TelegramOutbound::new(Arc::clone(&sender))),
    ));
    let scheduler = Arc::new(DailyScheduler::new());

    // Arm the trigger from the stored schedule; an unconfigured bot stays
    // idle until /settime.
    match store.get::<ScheduleRecord>(keys::SCHEDULE).ok().flatten() {
        Some(record) => match ScheduleTime::parse(&record.time) {
            Ok(time) => commands::arm(&scheduler, time, &engine).await,
            Err(e) => tracing::warn!("stored schedule '{}' ignored: {e}", record.time),
        },
        None => tracing::info!("no dispatch time configured; daily sending is off until /settime"),
    }

    let app = App::new(store, roster, leaves, ledger, engine, scheduler, sender);

    let mut events = poller.start_polling();
    tracing::info!("roozbot is running");
    while let Some(event) = events.next().await {
        app.handle(event).await;
    }
    Ok(())
}

/// Seed the admin list from `ROOZBOT_INITIAL_ADMIN`, only when no admin has
/// ever been registered.
fn seed_initial_admin(store: &dyn KvStore) {
    let Some(admin) = BotConfig::initial_admin() else {
        return;
    };
    let admins: AdminList = store.get_or_default(keys::ADMIN_LIST);
    if !admins.admin_ids.is_empty() {
        return;
    }
    match store.put(
        keys::ADMIN_LIST,
        &AdminList {
            admin_ids: vec![admin],
        },
    ) {
        Ok(()) => tracing::info!("initial admin set to {admin}"),
        Err(e) => tracing::warn!("failed to seed initial admin: {e}"),
    }
}
