//! VerseMate sync
//!
//! Replays offline annotation writes and pulls every annotation collection of
//! the configured user into the local store.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use versemate_sync::annotations::{
    BookmarkPayload, HighlightPayload, HttpRemote, LocalStore, NotePayload, Payload,
    RemoteSource, SqliteLocalStore,
};
use versemate_sync::config::{Config, RemoteConfig};
use versemate_sync::connectivity::NetworkStatus;
use versemate_sync::db;
use versemate_sync::gate::SyncState;
use versemate_sync::sync::{
    Collection, InitialSync, PendingReplayer, SqlitePendingQueue, SyncTarget,
};

fn collection<P: Payload>(
    remote: &RemoteConfig,
    local: &Arc<SqliteLocalStore>,
) -> anyhow::Result<Arc<dyn SyncTarget>> {
    let remote: Arc<dyn RemoteSource<P>> = Arc::new(HttpRemote::<P>::new(remote)?);
    let local: Arc<dyn LocalStore<P>> = local.clone();
    Ok(Arc::new(Collection::new(remote, local)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "versemate_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });
    let user_id = config
        .user_id
        .clone()
        .context("VERSEMATE_USER_ID is required")?;

    tracing::info!("Starting VerseMate sync v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("API: {}", config.remote.base_url);
    tracing::info!("Database: {}", config.database.url);

    let pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to open database")?;

    let local = Arc::new(SqliteLocalStore::new(pool.clone()));
    let queue = Arc::new(SqlitePendingQueue::new(pool));
    let network = Arc::new(NetworkStatus::default());
    let state = Arc::new(SyncState::new());

    let targets = vec![
        collection::<BookmarkPayload>(&config.remote, &local)?,
        collection::<HighlightPayload>(&config.remote, &local)?,
        collection::<NotePayload>(&config.remote, &local)?,
    ];

    let mut replayer = PendingReplayer::new(queue.clone(), network);
    let mut initial = InitialSync::new(state);
    for target in targets {
        replayer = replayer.with_target(target.clone());
        initial = initial.with_target(target);
    }

    let replay = replayer.replay(&user_id).await?;
    if let Some(error) = &replay.error {
        tracing::warn!(
            remaining = replay.remaining,
            "Offline writes not fully replayed ({}), skipping bulk sync",
            error
        );
        return Ok(());
    }

    let report = initial.run(&user_id).await?;
    let cleaned = queue
        .cleanup_applied(chrono::Utc::now() - chrono::Duration::days(7))
        .await?;

    tracing::info!(
        replayed = replay.applied,
        dropped = replay.failed,
        stored = report.total(),
        cleaned,
        "Sync complete"
    );
    Ok(())
}
