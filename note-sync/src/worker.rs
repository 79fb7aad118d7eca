//! The store task: sole owner of the note store, presence set and mutation
//! ledger.
//!
//! ```text
//!  SyncEngine ops ──┐
//!                   ├──► mpsc<Command> ──► StoreWorker::handle() ──► EngineEvent
//!  push reader    ──┘        (bounded)         (one at a time)
//! ```
//!
//! Commands are applied strictly one after another, so no two writes to the
//! store interleave and the store needs no locking. Remote calls never run
//! here; the engine awaits them and reports back with `Resolve`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::event::{EngineEvent, StoreSnapshot};
use crate::ids::IdGenerator;
use crate::note::{Note, NoteId};
use crate::pipeline::{MutationId, MutationLedger, MutationRequest, Resolution, Ticket};
use crate::protocol::Notification;
use crate::reconciler::{Applied, PresenceSet, Reconciler};
use crate::store::NoteStore;
use crate::view::{self, CategoryFilter, ViewQuery};

/// How a remote mutation call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Accepted; creates carry the server-assigned id.
    Confirmed(Option<NoteId>),
    Failed,
}

pub(crate) enum Command {
    Load {
        notes: Vec<Note>,
        presence: Option<Vec<String>>,
        reply: oneshot::Sender<usize>,
    },
    Begin {
        request: MutationRequest,
        reply: oneshot::Sender<Result<Ticket>>,
    },
    Resolve {
        mutation: MutationId,
        outcome: Outcome,
        reply: oneshot::Sender<Option<Resolution>>,
    },
    Notify(Notification),
    Snapshot {
        reply: oneshot::Sender<StoreSnapshot>,
    },
    View {
        query: ViewQuery,
        reply: oneshot::Sender<Vec<Note>>,
    },
    CategoryOptions {
        reply: oneshot::Sender<Vec<CategoryFilter>>,
    },
}

pub(crate) struct StoreWorker {
    store: NoteStore,
    presence: PresenceSet,
    ledger: MutationLedger,
    reconciler: Reconciler,
    ids: Box<dyn IdGenerator>,
    events: mpsc::Sender<EngineEvent>,
}

impl StoreWorker {
    pub(crate) fn new(ids: Box<dyn IdGenerator>, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            store: NoteStore::new(),
            presence: PresenceSet::new(),
            ledger: MutationLedger::new(),
            reconciler: Reconciler::new(),
            ids,
            events,
        }
    }

    /// Drain commands until every sender is gone or the engine is closed.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>, closed: Arc<AtomicBool>) {
        while let Some(command) = commands.recv().await {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            self.handle(command);
        }

        let abandoned = self.ledger.abandon_all();
        let stats = self.reconciler.stats();
        log::info!(
            "Store task stopped: {} notes, {} notifications applied, {} no-ops, {} mutations abandoned",
            self.store.len(),
            stats.applied,
            stats.unchanged,
            abandoned
        );
    }

    pub(crate) fn handle(&mut self, command: Command) {
        match command {
            Command::Load {
                notes,
                presence,
                reply,
            } => {
                let count = self.load(notes, presence);
                let _ = reply.send(count);
            }
            Command::Begin { request, reply } => {
                let result = self.ledger.begin(&mut self.store, self.ids.as_mut(), request);
                if let Ok(ticket) = &result {
                    log::debug!("Optimistic {} of note {}", ticket.kind, ticket.note.id);
                    self.emit(EngineEvent::NotesChanged);
                }
                let _ = reply.send(result);
            }
            Command::Resolve {
                mutation,
                outcome,
                reply,
            } => {
                let resolution = self.resolve(mutation, outcome);
                let _ = reply.send(resolution);
            }
            Command::Notify(notification) => self.notify(notification),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::View { query, reply } => {
                let _ = reply.send(view::project(self.store.iter(), &query));
            }
            Command::CategoryOptions { reply } => {
                let _ = reply.send(view::category_options(self.store.iter()));
            }
        }
    }

    fn load(&mut self, notes: Vec<Note>, presence: Option<Vec<String>>) -> usize {
        self.store.replace_all(notes);
        self.ledger.after_reload(&mut self.store);

        if let Some(users) = presence {
            if self.presence.replace(users) {
                self.emit(EngineEvent::PresenceChanged(self.presence.users().to_vec()));
            }
        }

        let count = self.store.len();
        log::info!("Loaded {count} notes");
        self.emit(EngineEvent::Loaded { notes: count });
        self.emit(EngineEvent::NotesChanged);
        count
    }

    fn resolve(&mut self, mutation: MutationId, outcome: Outcome) -> Option<Resolution> {
        let resolution = match outcome {
            Outcome::Confirmed(id) => self.ledger.commit(&mut self.store, mutation, id),
            Outcome::Failed => self.ledger.rollback(&mut self.store, mutation),
        };

        match &resolution {
            Some(Resolution::Committed {
                id,
                rekeyed_from: Some(provisional),
            }) => {
                log::debug!("Note {provisional} confirmed as {id}");
                self.emit(EngineEvent::NoteRekeyed {
                    provisional: *provisional,
                    permanent: *id,
                });
                self.emit(EngineEvent::NotesChanged);
            }
            Some(Resolution::RolledBack { restored: true }) => {
                self.emit(EngineEvent::NotesChanged);
            }
            Some(_) => {}
            None => log::debug!("Mutation {mutation} resolved after it was abandoned"),
        }
        resolution
    }

    fn notify(&mut self, notification: Notification) {
        match notification.note_id() {
            Some(id) => log::trace!("Reconciling {} for note {id}", notification.event_name()),
            None => log::trace!("Reconciling {}", notification.event_name()),
        }
        self.ledger.observe(&notification);

        let applied = self
            .reconciler
            .apply(&mut self.store, &mut self.presence, notification);
        if applied.touches_notes() {
            self.emit(EngineEvent::NotesChanged);
        } else if applied == Applied::PresenceReplaced {
            self.emit(EngineEvent::PresenceChanged(self.presence.users().to_vec()));
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            notes: self.store.list(),
            categories: self.store.categories(),
            presence: self.presence.users().to_vec(),
            pending: self.ledger.pending_count(),
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::debug!("Dropping engine event: {e}");
        }
    }
}
