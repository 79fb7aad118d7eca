//! Remote note service: the REST endpoints the engine talks to.
//!
//! ```text
//! GET    /notes          → [Note]
//! POST   /notes          → {id, ...}     (server may reassign the id)
//! PUT    /notes/{id}     → success/failure
//! DELETE /notes/{id}     → success/failure
//! GET    /users/online   → [String]
//! ```
//!
//! Every request carries the session's bearer token. A 401 from any of them
//! is reported as [`SyncError::SessionExpired`] and never retried.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::note::{Note, NoteId};
use crate::session::Session;

/// Longest server error body carried into a [`SyncError::Remote`].
const MAX_ERROR_BODY: usize = 512;

/// The note endpoints consumed by the engine.
#[async_trait]
pub trait NoteService: Send + Sync {
    async fn list_notes(&self) -> Result<Vec<Note>>;

    /// Create `note`; returns the id the server keyed it on.
    async fn create_note(&self, note: &Note) -> Result<NoteId>;

    async fn update_note(&self, note: &Note) -> Result<()>;

    async fn delete_note(&self, id: NoteId) -> Result<()>;

    async fn online_users(&self) -> Result<Vec<String>>;
}

#[derive(Deserialize)]
struct CreatedNote {
    id: NoteId,
}

/// [`NoteService`] over HTTP/JSON.
pub struct HttpNoteService {
    client: reqwest::Client,
    config: EngineConfig,
    session: Session,
}

impl HttpNoteService {
    pub fn new(config: &EngineConfig, session: Session) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
            session,
        })
    }

    fn note_url(&self, id: NoteId) -> String {
        self.config.api_url(&format!("/notes/{id}"))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        if self.session.is_revoked() {
            return Err(SyncError::SessionExpired);
        }

        let response = request
            .header(AUTHORIZATION, self.session.bearer())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

/// Map a non-success status onto the error taxonomy.
pub(crate) fn status_error(status: StatusCode, body: String) -> SyncError {
    if status == StatusCode::UNAUTHORIZED {
        return SyncError::SessionExpired;
    }

    let mut message = body.trim().to_string();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("request failed").to_string();
    }
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    SyncError::Remote {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl NoteService for HttpNoteService {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        let response = self
            .execute(self.client.get(self.config.api_url("/notes")))
            .await?;
        Self::decode(response).await
    }

    async fn create_note(&self, note: &Note) -> Result<NoteId> {
        let response = self
            .execute(self.client.post(self.config.api_url("/notes")).json(note))
            .await?;
        let created: CreatedNote = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn update_note(&self, note: &Note) -> Result<()> {
        self.execute(self.client.put(self.note_url(note.id)).json(note))
            .await?;
        Ok(())
    }

    async fn delete_note(&self, id: NoteId) -> Result<()> {
        self.execute(self.client.delete(self.note_url(id))).await?;
        Ok(())
    }

    async fn online_users(&self) -> Result<Vec<String>> {
        let response = self
            .execute(self.client.get(self.config.api_url("/users/online")))
            .await?;
        Self::decode(response).await
    }
}
