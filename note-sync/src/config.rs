//! Engine configuration.

use std::time::Duration;

/// How the push subscription is carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PushTransport {
    /// Server-sent events over a long-lived `GET` (`text/event-stream`).
    #[default]
    EventStream,
    /// WebSocket text frames holding `{"event", "data"}` envelopes.
    WebSocket,
}

impl PushTransport {
    /// Transport implied by a stream URL's scheme.
    pub fn for_url(url: &str) -> Self {
        if url.starts_with("ws://") || url.starts_with("wss://") {
            PushTransport::WebSocket
        } else {
            PushTransport::EventStream
        }
    }
}

/// Connection and queue settings for a [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base URL of the REST API (`GET /notes`, `POST /notes`, ...)
    pub api_base_url: String,
    /// URL of the push subscription
    pub stream_url: String,
    pub push_transport: PushTransport,
    /// Capacity of the store task's command queue
    pub command_capacity: usize,
    /// Capacity of the engine event channel
    pub event_capacity: usize,
    /// Transport-level request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    /// Fetch `GET /users/online` as part of the initial load
    pub fetch_presence_on_load: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            stream_url: "http://127.0.0.1:8080/notes/stream".to_string(),
            push_transport: PushTransport::EventStream,
            command_capacity: 256,
            event_capacity: 256,
            request_timeout: None,
            fetch_presence_on_load: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NOTE_SYNC_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("NOTE_SYNC_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("NOTE_SYNC_STREAM_URL") {
            config.push_transport = PushTransport::for_url(&url);
            config.stream_url = url;
        }
        if let Some(raw) = lookup("NOTE_SYNC_PUSH_TRANSPORT") {
            match raw.to_ascii_lowercase().as_str() {
                "sse" | "event-stream" => config.push_transport = PushTransport::EventStream,
                "ws" | "websocket" => config.push_transport = PushTransport::WebSocket,
                _ => log::warn!("Ignoring NOTE_SYNC_PUSH_TRANSPORT={raw:?}"),
            }
        }
        if let Some(raw) = lookup("NOTE_SYNC_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(0) => config.request_timeout = None,
                Ok(secs) => config.request_timeout = Some(Duration::from_secs(secs)),
                Err(_) => log::warn!("Ignoring NOTE_SYNC_REQUEST_TIMEOUT_SECS={raw:?}"),
            }
        }
        if let Some(raw) = lookup("NOTE_SYNC_QUEUE_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => {
                    config.command_capacity = capacity;
                    config.event_capacity = capacity;
                }
                _ => log::warn!("Ignoring NOTE_SYNC_QUEUE_CAPACITY={raw:?}"),
            }
        }

        config
    }

    /// Absolute URL for an API path such as `/notes/42`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    /// Subscription URL carrying the session token.
    pub fn subscription_url(&self, token: &str) -> String {
        let separator = if self.stream_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}token={token}", self.stream_url)
    }
}
