//! The sync engine: public face of the store task.
//!
//! Every operation is a round trip to the store task for the local part and
//! an awaited [`NoteService`] call for the remote part. The two never
//! overlap: the store task keeps applying push notifications while a remote
//! call is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::classify::{CategorizeSummary, CategoryAssignment};
use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::event::{EngineEvent, StoreSnapshot};
use crate::ids::{ClockIdGenerator, IdGenerator};
use crate::note::{Note, NoteDraft, NoteId};
use crate::pipeline::{MutationRequest, Resolution, Ticket};
use crate::protocol::Notification;
use crate::remote::{HttpNoteService, NoteService};
use crate::session::Session;
use crate::subscription;
use crate::view::{CategoryFilter, ViewQuery};
use crate::worker::{Command, Outcome, StoreWorker};

/// Client-side synchronization engine for one authenticated session.
///
/// Must be created inside a Tokio runtime.
pub struct SyncEngine {
    config: EngineConfig,
    session: Session,
    service: Arc<dyn NoteService>,
    commands: mpsc::Sender<Command>,
    events: mpsc::Sender<EngineEvent>,
    event_rx: Option<mpsc::Receiver<EngineEvent>>,
    closed: Arc<AtomicBool>,
    worker: JoinHandle<()>,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Engine over the HTTP note service described by `config`.
    pub fn connect(config: EngineConfig, session: Session) -> Result<Self> {
        let service = HttpNoteService::new(&config, session.clone())?;
        Ok(Self::start(config, session, Arc::new(service)))
    }

    pub fn start(config: EngineConfig, session: Session, service: Arc<dyn NoteService>) -> Self {
        Self::with_id_generator(config, session, service, Box::new(ClockIdGenerator::new()))
    }

    /// Start the engine with an explicit provisional-id source.
    pub fn with_id_generator(
        config: EngineConfig,
        session: Session,
        service: Arc<dyn NoteService>,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (events, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));

        let worker = StoreWorker::new(ids, events.clone());
        let worker = tokio::spawn(worker.run(command_rx, closed.clone()));

        log::info!("Sync engine started for {}", session.user());
        Self {
            config,
            session,
            service,
            commands,
            events,
            event_rx: Some(event_rx),
            closed,
            worker,
            subscription: Mutex::new(None),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.event_rx.take()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the engine. Pushes are no longer applied and in-flight
    /// mutations no longer touch the store, whenever they complete.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_subscription();
        self.worker.abort();
        log::info!("Sync engine closed for {}", self.session.user());
    }

    // ─── Loading ─────────────────────────────────────────────────────

    /// Replace the collection with the server's full listing, plus the
    /// presence list when configured. Also serves as manual refresh.
    pub async fn load(&self) -> Result<usize> {
        self.ensure_open()?;

        let notes = self.remote(self.service.list_notes().await)?;
        let presence = if self.config.fetch_presence_on_load {
            match self.service.online_users().await {
                Ok(users) => Some(users),
                Err(e) if e.is_session_failure() => return Err(self.session_failed(e)),
                Err(e) => {
                    log::warn!("Presence fetch failed, keeping previous list: {e}");
                    None
                }
            }
        } else {
            None
        };

        self.request(|reply| Command::Load {
            notes,
            presence,
            reply,
        })
        .await
    }

    /// Re-fetch the full snapshot, e.g. after the push channel dropped.
    pub async fn refresh(&self) -> Result<usize> {
        self.load().await
    }

    // ─── Mutations ───────────────────────────────────────────────────

    /// Show the note immediately under a provisional id, then create it
    /// remotely. Returns the note as keyed after confirmation.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<Note> {
        let ticket = self
            .begin(MutationRequest::Create {
                creator: self.session.user().to_string(),
                draft,
            })
            .await?;

        match self.service.create_note(&ticket.note).await {
            Ok(permanent) => {
                let id = match self.finish(&ticket, Outcome::Confirmed(Some(permanent))).await? {
                    Some(Resolution::Committed { id, .. }) => id,
                    _ => permanent,
                };
                Ok(ticket.note.rekeyed(id))
            }
            Err(e) => Err(self.fail(&ticket, e).await),
        }
    }

    /// Overwrite the note locally, then remotely. The creator is kept.
    pub async fn update_note(&self, id: NoteId, draft: NoteDraft) -> Result<Note> {
        let ticket = self.begin(MutationRequest::Update { id, draft }).await?;
        self.send_update(ticket).await
    }

    async fn send_update(&self, ticket: Ticket) -> Result<Note> {
        match self.service.update_note(&ticket.note).await {
            Ok(()) => {
                self.finish(&ticket, Outcome::Confirmed(None)).await?;
                Ok(ticket.note)
            }
            Err(e) => Err(self.fail(&ticket, e).await),
        }
    }

    pub async fn delete_note(&self, id: NoteId) -> Result<()> {
        let ticket = self.begin(MutationRequest::Delete { id }).await?;

        match self.service.delete_note(ticket.note.id).await {
            Ok(()) => {
                self.finish(&ticket, Outcome::Confirmed(None)).await?;
                Ok(())
            }
            Err(e) => Err(self.fail(&ticket, e).await),
        }
    }

    /// Change only the note's category. The other fields are taken from the
    /// store when the update begins, so pushes that landed earlier are kept.
    pub async fn set_category(&self, id: NoteId, category: impl Into<String>) -> Result<Note> {
        let ticket = self
            .begin(MutationRequest::SetCategory {
                id,
                category: category.into(),
            })
            .await?;
        self.send_update(ticket).await
    }

    /// Merge classifier output: each assignment that changes a known note's
    /// category becomes a category update, all issued concurrently.
    pub async fn apply_categories(
        &self,
        assignments: Vec<CategoryAssignment>,
    ) -> Result<CategorizeSummary> {
        self.ensure_open()?;
        let snapshot = self.snapshot().await?;

        let mut summary = CategorizeSummary::default();
        let mut updates = Vec::new();
        for assignment in assignments {
            let category = assignment.category.trim();
            match snapshot.get(assignment.id) {
                Some(note) if !category.is_empty() && note.category_label() != Some(category) => {
                    updates.push(self.set_category(assignment.id, category.to_string()));
                }
                _ => summary.skipped += 1,
            }
        }

        let mut session_lost = None;
        for result in join_all(updates).await {
            match result {
                Ok(_) => summary.applied += 1,
                Err(e) if !e.is_recoverable() => session_lost = Some(e),
                Err(SyncError::NoteNotFound(_)) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }
        if let Some(e) = session_lost {
            return Err(e);
        }

        log::info!(
            "Categories applied: {} updated, {} skipped, {} failed",
            summary.applied,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    // ─── Push channel ────────────────────────────────────────────────

    /// Open the push subscription. A no-op while one is already running.
    pub async fn subscribe(&self) -> Result<()> {
        self.ensure_open()?;
        if self.is_subscribed() {
            return Ok(());
        }

        let url = self.config.subscription_url(self.session.token());
        let stream = match subscription::open(self.config.push_transport, &url).await {
            Ok(stream) => stream,
            Err(e) if e.is_session_failure() => return Err(self.session_failed(e)),
            Err(e) => return Err(e),
        };
        // The engine may have been closed while the handshake was in flight.
        self.ensure_open()?;

        let task = tokio::spawn(subscription::run(
            stream,
            self.commands.clone(),
            self.events.clone(),
        ));
        if let Ok(mut slot) = self.subscription.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }

        log::info!("Push subscription opened for {}", self.session.user());
        self.emit(EngineEvent::SubscriptionOpened);
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        match self.subscription.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|task| !task.is_finished()),
            Err(_) => false,
        }
    }

    /// Feed one notification from a host-managed channel.
    pub async fn notify(&self, notification: Notification) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.commands
            .send(Command::Notify(notification))
            .await
            .map_err(|_| SyncError::Closed)
    }

    // ─── Reads ───────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn view(&self, query: ViewQuery) -> Result<Vec<Note>> {
        self.request(|reply| Command::View { query, reply }).await
    }

    /// Category dropdown entries for the current collection.
    pub async fn category_options(&self) -> Result<Vec<CategoryFilter>> {
        self.request(|reply| Command::CategoryOptions { reply }).await
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.categories)
    }

    pub async fn presence(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.presence)
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        if self.session.is_revoked() {
            return Err(SyncError::SessionExpired);
        }
        Ok(())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SyncError::Closed)?;
        answer.await.map_err(|_| SyncError::Closed)
    }

    async fn begin(&self, request: MutationRequest) -> Result<Ticket> {
        self.ensure_open()?;
        self.request(|reply| Command::Begin { request, reply }).await?
    }

    async fn finish(&self, ticket: &Ticket, outcome: Outcome) -> Result<Option<Resolution>> {
        self.request(|reply| Command::Resolve {
            mutation: ticket.mutation,
            outcome,
            reply,
        })
        .await
    }

    /// Roll back a failed mutation and report it.
    async fn fail(&self, ticket: &Ticket, error: SyncError) -> SyncError {
        if let Err(closed) = self.finish(ticket, Outcome::Failed).await {
            log::debug!("Skipping rollback of {} on note {}: {closed}", ticket.kind, ticket.note.id);
            return error;
        }

        if error.is_session_failure() {
            return self.session_failed(error);
        }

        log::warn!(
            "Remote {} of note {} failed, rolled back: {error}",
            ticket.kind,
            ticket.note.id
        );
        self.emit(EngineEvent::MutationRolledBack {
            kind: ticket.kind,
            id: ticket.note.id,
            message: error.user_message(),
        });
        error
    }

    fn remote<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_session_failure() {
                self.session_failed(e)
            } else {
                e
            }
        })
    }

    /// Revoke the session and stop the push channel; the host tears the
    /// engine down in response to [`EngineEvent::SessionExpired`].
    fn session_failed(&self, error: SyncError) -> SyncError {
        if !self.session.is_revoked() {
            log::warn!("Session for {} rejected by server", self.session.user());
            self.session.revoke();
            self.stop_subscription();
            self.emit(EngineEvent::SessionExpired);
        }
        error
    }

    fn stop_subscription(&self) {
        if let Ok(mut slot) = self.subscription.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::debug!("Dropping engine event: {e}");
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.close();
    }
}
