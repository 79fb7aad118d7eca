//! note-sync: headless sync client.
//!
//! Loads the signed-in user's notes, subscribes to live updates and logs the
//! projected view whenever it changes. Configuration comes from `NOTE_SYNC_*`
//! environment variables; `NOTE_SYNC_TOKEN` and `NOTE_SYNC_USER` carry the
//! session.

use log::{error, info};

use note_sync::{EngineConfig, EngineEvent, FilterMode, Session, SyncEngine, SyncError, ViewQuery};

#[tokio::main]
async fn main() {
    env_logger::init();

    let (Ok(token), Ok(user)) = (std::env::var("NOTE_SYNC_TOKEN"), std::env::var("NOTE_SYNC_USER"))
    else {
        error!("NOTE_SYNC_TOKEN and NOTE_SYNC_USER must be set");
        std::process::exit(2);
    };

    if let Err(e) = run(EngineConfig::from_env(), Session::new(token, user)).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: EngineConfig, session: Session) -> Result<(), SyncError> {
    let filter = match std::env::var("NOTE_SYNC_FILTER").as_deref() {
        Ok("mine") => FilterMode::Mine,
        Ok("shared") => FilterMode::Shared,
        _ => FilterMode::All,
    };
    let query = ViewQuery::for_viewer(session.user()).with_filter(filter);

    let mut engine = SyncEngine::connect(config, session)?;
    let Some(mut events) = engine.take_event_rx() else {
        return Err(SyncError::Closed);
    };

    engine.load().await?;
    engine.subscribe().await?;
    log_view(&engine, &query).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(EngineEvent::NotesChanged) | Some(EngineEvent::Loaded { .. }) => {
                    log_view(&engine, &query).await?;
                }
                Some(EngineEvent::PresenceChanged(users)) => info!("Online: {}", users.join(", ")),
                Some(EngineEvent::MutationRolledBack { message, .. }) => info!("{message}"),
                Some(EngineEvent::SubscriptionClosed { reason }) => {
                    info!("Live updates stopped ({}); refreshing", reason.as_deref().unwrap_or("closed"));
                    engine.refresh().await?;
                }
                Some(EngineEvent::SessionExpired) => {
                    error!("{}", SyncError::SessionExpired.user_message());
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    engine.close();
    Ok(())
}

async fn log_view(engine: &SyncEngine, query: &ViewQuery) -> Result<(), SyncError> {
    let notes = engine.view(query.clone()).await?;
    info!("{} notes", notes.len());
    for note in &notes {
        info!(
            "  [{}] {} ({})",
            note.id,
            note.title,
            note.category_label().unwrap_or(note_sync::view::UNCATEGORIZED)
        );
    }
    Ok(())
}
