//! Push channel tests over the WebSocket transport: a real WebSocket server
//! feeding a real engine.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use note_sync::{
    EngineConfig, EngineEvent, Note, NoteDraft, NoteId, NoteService, Notification, PushTransport,
    Session, SyncEngine, SyncError,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

const GOOD_TOKEN: &str = "good-token";

/// Frames to push to every connected client; `None` closes the connection.
type Frames = broadcast::Sender<Option<String>>;

/// Start a push server on a free port, return the port and its frame feed.
async fn start_push_server() -> (u16, Frames) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (frames, _) = broadcast::channel::<Option<String>>(64);

    let feed = frames.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let mut rx = feed.subscribe();
            tokio::spawn(async move {
                let check_token = |request: &Request, response: Response| {
                    let query = request.uri().query().unwrap_or_default();
                    if query == format!("token={GOOD_TOKEN}") {
                        Ok(response)
                    } else {
                        let mut denied = ErrorResponse::new(Some("bad token".into()));
                        *denied.status_mut() = StatusCode::UNAUTHORIZED;
                        Err(denied)
                    }
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, check_token).await else {
                    return;
                };
                let (mut sender, _receiver) = ws.split();
                while let Ok(frame) = rx.recv().await {
                    match frame {
                        Some(text) => {
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            });
        }
    });

    (port, frames)
}

/// Service that answers every call successfully with fixed data.
struct StaticService(Vec<Note>);

#[async_trait]
impl NoteService for StaticService {
    async fn list_notes(&self) -> note_sync::Result<Vec<Note>> {
        Ok(self.0.clone())
    }
    async fn create_note(&self, note: &Note) -> note_sync::Result<NoteId> {
        Ok(note.id)
    }
    async fn update_note(&self, _note: &Note) -> note_sync::Result<()> {
        Ok(())
    }
    async fn delete_note(&self, _id: NoteId) -> note_sync::Result<()> {
        Ok(())
    }
    async fn online_users(&self) -> note_sync::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn note(id: u64, title: &str) -> Note {
    Note::from_draft(NoteId(id), "u2", NoteDraft::new(title, ""))
}

async fn engine(port: u16, token: &str) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
    let config = EngineConfig {
        stream_url: format!("ws://127.0.0.1:{port}/notes/stream"),
        push_transport: PushTransport::WebSocket,
        ..EngineConfig::default()
    };
    let mut engine = SyncEngine::start(
        config,
        Session::new(token, "u1"),
        Arc::new(StaticService(vec![note(1, "one"), note(2, "two")])),
    );
    let events = engine.take_event_rx().unwrap();
    engine.load().await.unwrap();
    (engine, events)
}

/// Wait for the first event matching `pred`.
async fn wait_for(
    events: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event should arrive within timeout")
}

fn push(frames: &Frames, notification: Notification) {
    frames.send(Some(notification.encode().unwrap())).unwrap();
}

#[tokio::test]
async fn test_pushes_reconcile_into_store() {
    let (port, frames) = start_push_server().await;
    let (engine, mut events) = engine(port, GOOD_TOKEN).await;

    engine.subscribe().await.unwrap();
    wait_for(&mut events, |e| *e == EngineEvent::SubscriptionOpened).await;
    assert!(engine.is_subscribed());

    push(&frames, Notification::NoteCreated(note(3, "three")));
    // Duplicate delivery.
    push(&frames, Notification::NoteCreated(note(3, "three")));
    // Payload double-encoded as a JSON string.
    let embedded = serde_json::to_string(&note(1, "one, edited")).unwrap();
    frames
        .send(Some(
            serde_json::json!({"event": "note-updated", "data": embedded}).to_string(),
        ))
        .unwrap();
    // Malformed frames are dropped.
    frames.send(Some("not json".into())).unwrap();
    frames
        .send(Some(r#"{"event":"note-updated","data":{"id":"x"}}"#.into()))
        .unwrap();
    // Bare-id delete.
    frames
        .send(Some(r#"{"event":"note-deleted","data":2}"#.into()))
        .unwrap();
    push(&frames, Notification::PresenceSnapshot(vec!["u2".into()]));

    wait_for(&mut events, |e| {
        *e == EngineEvent::PresenceChanged(vec!["u2".into()])
    })
    .await;

    let snapshot = engine.snapshot().await.unwrap();
    let titles: Vec<&str> = snapshot.notes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["one, edited", "three"]);
    assert_eq!(snapshot.presence, vec!["u2".to_string()]);
}

#[tokio::test]
async fn test_rejected_token_is_session_failure() {
    let (port, _frames) = start_push_server().await;
    let (engine, mut events) = engine(port, "stale-token").await;

    let err = engine.subscribe().await.unwrap_err();
    assert!(matches!(err, SyncError::SessionExpired));
    assert!(engine.session().is_revoked());
    wait_for(&mut events, |e| *e == EngineEvent::SessionExpired).await;
}

#[tokio::test]
async fn test_server_close_ends_subscription() {
    let (port, frames) = start_push_server().await;
    let (engine, mut events) = engine(port, GOOD_TOKEN).await;

    engine.subscribe().await.unwrap();
    frames.send(None).unwrap();

    wait_for(&mut events, |e| {
        matches!(e, EngineEvent::SubscriptionClosed { .. })
    })
    .await;
    timeout(Duration::from_secs(2), async {
        while engine.is_subscribed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reader task should finish");

    // No automatic resubscribe; the host opens a new one.
    engine.subscribe().await.unwrap();
    push(&frames, Notification::NoteDeleted(NoteId(1)));
    wait_for(&mut events, |e| *e == EngineEvent::NotesChanged).await;
    assert!(engine.snapshot().await.unwrap().get(NoteId(1)).is_none());
}

#[tokio::test]
async fn test_unreachable_stream_is_stream_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (engine, _events) = engine(port, GOOD_TOKEN).await;
    assert!(matches!(engine.subscribe().await, Err(SyncError::Stream(_))));
    assert!(!engine.session().is_revoked());
}

#[tokio::test]
async fn test_close_stops_subscription() {
    let (port, _frames) = start_push_server().await;
    let (engine, _events) = engine(port, GOOD_TOKEN).await;

    engine.subscribe().await.unwrap();
    engine.close();
    assert!(!engine.is_subscribed());
    assert!(matches!(engine.subscribe().await, Err(SyncError::Closed)));
}
