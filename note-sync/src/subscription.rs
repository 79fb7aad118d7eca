//! Push subscription: server-sent events, or a WebSocket carrying
//! `{"event", "data"}` text frames.
//!
//! The reader task decodes each event and forwards it to the store task.
//! Malformed events are logged and dropped. Any transport error ends the
//! subscription; resuming is left to the host (`subscribe()` + `refresh()`).

use eventsource_stream::Eventsource;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::PushTransport;
use crate::error::{Result, SyncError};
use crate::event::EngineEvent;
use crate::protocol::{Notification, ProtocolError};
use crate::worker::Command;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) enum PushStream {
    /// Response whose body is a `text/event-stream`.
    EventStream(reqwest::Response),
    WebSocket(WsStream),
}

/// Why a reader stopped.
enum Stop {
    Ended(Option<String>),
    /// The store task is gone: the engine was closed.
    EngineClosed,
}

struct Forwarder {
    commands: mpsc::Sender<Command>,
    forwarded: u64,
}

impl Forwarder {
    /// Hand a decoded event to the store task. `false` once the store task
    /// has stopped.
    async fn forward(&mut self, decoded: std::result::Result<Notification, ProtocolError>) -> bool {
        match decoded {
            Ok(notification) => {
                if self.commands.send(Command::Notify(notification)).await.is_err() {
                    return false;
                }
                self.forwarded += 1;
            }
            Err(e) => log::warn!("Dropping malformed push event: {e}"),
        }
        true
    }
}

/// Open the push channel. A handshake answered with 401 is a session failure.
pub(crate) async fn open(transport: PushTransport, url: &str) -> Result<PushStream> {
    match transport {
        PushTransport::EventStream => open_event_stream(url).await.map(PushStream::EventStream),
        PushTransport::WebSocket => open_websocket(url).await.map(PushStream::WebSocket),
    }
}

async fn open_event_stream(url: &str) -> Result<reqwest::Response> {
    // No request timeout: the response body stays open for the whole session.
    let client = reqwest::Client::builder().build()?;
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| SyncError::Stream(e.to_string()))?;

    match response.status() {
        StatusCode::UNAUTHORIZED => Err(SyncError::SessionExpired),
        status if status.is_success() => Ok(response),
        status => Err(SyncError::Stream(format!(
            "event stream rejected with status {status}"
        ))),
    }
}

async fn open_websocket(url: &str) -> Result<WsStream> {
    match tokio_tungstenite::connect_async(url).await {
        Ok((stream, _response)) => Ok(stream),
        Err(WsError::Http(response)) if response.status().as_u16() == 401 => {
            Err(SyncError::SessionExpired)
        }
        Err(e) => Err(SyncError::Stream(e.to_string())),
    }
}

/// Pump events into the store task until the channel ends.
pub(crate) async fn run(
    stream: PushStream,
    commands: mpsc::Sender<Command>,
    events: mpsc::Sender<EngineEvent>,
) {
    let mut forwarder = Forwarder {
        commands,
        forwarded: 0,
    };
    let stop = match stream {
        PushStream::EventStream(response) => read_event_stream(response, &mut forwarder).await,
        PushStream::WebSocket(socket) => read_websocket(socket, &mut forwarder).await,
    };

    log::info!(
        "Push subscription ended after {} notifications",
        forwarder.forwarded
    );
    if let Stop::Ended(reason) = stop {
        if let Err(e) = events.try_send(EngineEvent::SubscriptionClosed { reason }) {
            log::debug!("Dropping engine event: {e}");
        }
    }
}

async fn read_event_stream(response: reqwest::Response, forwarder: &mut Forwarder) -> Stop {
    let mut stream = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                if !forwarder
                    .forward(Notification::from_event(&event.event, &event.data))
                    .await
                {
                    return Stop::EngineClosed;
                }
            }
            Err(e) => {
                log::error!("Push channel error: {e}");
                return Stop::Ended(Some(e.to_string()));
            }
        }
    }

    log::info!("Event stream closed by server");
    Stop::Ended(None)
}

async fn read_websocket(socket: WsStream, forwarder: &mut Forwarder) -> Stop {
    let (mut writer, mut reader) = socket.split();

    loop {
        let Some(message) = reader.next().await else {
            return Stop::Ended(None);
        };

        let text = match message {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    log::warn!("Dropping non-UTF-8 push frame ({} bytes)", bytes.len());
                    continue;
                }
            },
            Ok(Message::Ping(data)) => {
                if let Err(e) = writer.send(Message::Pong(data)).await {
                    return Stop::Ended(Some(e.to_string()));
                }
                continue;
            }
            Ok(Message::Close(frame)) => {
                log::info!("Push channel closed by server: {frame:?}");
                return Stop::Ended(None);
            }
            Ok(_) => continue,
            Err(e) => {
                log::error!("Push channel error: {e}");
                return Stop::Ended(Some(e.to_string()));
            }
        };

        if !forwarder.forward(Notification::parse(&text)).await {
            return Stop::EngineClosed;
        }
    }
}
