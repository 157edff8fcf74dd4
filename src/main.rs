use std::sync::Arc;

use chrono::Local;
use inbox_sync::api::client::HttpApi;
use inbox_sync::api::models::Filters;
use inbox_sync::app::AppState;
use inbox_sync::live::LiveBridge;
use inbox_sync::storage::{self, Cache};
use inbox_sync::{Inbox, InboxError, InboxState, selectors};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run().await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), InboxError> {
    let config = AppState::load()?;
    let api = HttpApi::new(&config.base_url, config.token.clone())
        .map_err(|e| InboxError::Config(format!("base_url: {e}")))?;
    let mut inbox = Inbox::new(Arc::new(api), &config);

    let mut cache = match storage::default_db_path() {
        Some(path) => Some(Cache::open(&path)?),
        None => None,
    };
    if let Some(cache) = &cache {
        match inbox.hydrate_from_cache(cache) {
            Ok(0) => {}
            Ok(n) => log::info!("loaded {n} cached conversations"),
            Err(e) => log::warn!("cache unavailable: {e}"),
        }
    }

    inbox.attach_live(LiveBridge::spawn(config.live_config(), inbox.store().clone()));

    match inbox.fetch_conversations(Filters::default()).await {
        Ok(list) => {
            if let Some(cache) = cache.as_mut() {
                if let Err(e) = cache.store_conversations(&list, inbox_sync::utils::now_millis()) {
                    log::warn!("failed to cache conversations: {e}");
                }
            }
        }
        Err(e) => log::warn!("initial fetch failed: {e}"),
    }

    let locale = config.chrono_locale();
    let mut updates = inbox.store().subscribe();
    summarize(&inbox.snapshot(), locale);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                summarize(&state, locale);
            }
        }
    }

    log::info!("shutting down");
    inbox.shutdown().await;
    Ok(())
}

fn summarize(state: &InboxState, locale: chrono::Locale) {
    let unread: usize = state.conversations.iter().map(selectors::unread_count).sum();
    let online = state.teammates.iter().filter(|t| t.is_online).count();
    log::info!(
        "v{}: {} conversations, {} unread messages, {}/{} teammates online",
        state.version,
        state.conversations.len(),
        unread,
        online,
        state.teammates.len()
    );
    if let Some(latest) = state.conversations.first() {
        let preview = selectors::last_message_preview(latest, "You").unwrap_or_default();
        let date = selectors::last_message_date(latest, &Local, locale).unwrap_or_default();
        log::debug!("latest {} {}: {}", selectors::client_name(latest), date, preview);
    }
    if let Some(failure) = &state.last_failure {
        log::warn!("last failure: {failure}");
    }
}
