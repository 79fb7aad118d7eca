//! # note-sync: Client-side synchronization engine for shared notes
//!
//! Keeps a local note collection consistent with the server while applying
//! the user's own edits optimistically and merging collaborators' changes
//! from a push channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  create/update/delete  ┌──────────────┐
//! │ SyncEngine   │ ─────────────────────► │ NoteService  │
//! │ (public API) │ ◄───────────────────── │ (REST)       │
//! └──────┬───────┘    confirm / reject    └──────────────┘
//!        │ Command (bounded mpsc)
//!        ▼
//! ┌──────────────┐   Notify   ┌──────────────┐  SSE or WS  ┌──────────┐
//! │ StoreWorker  │ ◄───────── │ subscription │ ◄────────── │  server  │
//! │ NoteStore    │            │ reader task  │ push events └──────────┘
//! │ MutationLedger            └──────────────┘
//! │ PresenceSet  │
//! └──────┬───────┘
//!        │ EngineEvent / StoreSnapshot / view::project
//!        ▼
//!  display layer
//! ```
//!
//! ## Modules
//!
//! - [`store`]: insertion-ordered note collection and category index
//! - [`pipeline`]: optimistic mutations, commit re-keying, rollback
//! - [`reconciler`]: idempotent merge of pushed notifications
//! - [`view`]: ownership / sharing / category projections
//! - [`engine`]: the [`SyncEngine`] facade over the store task
//! - [`remote`]: the [`NoteService`] seam and its HTTP implementation
//! - [`protocol`]: push event decoding
//! - [`classify`]: merging classifier output back into notes

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ids;
pub mod note;
pub mod pipeline;
pub mod protocol;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod store;
pub mod view;

mod subscription;
mod worker;

// Re-exports for convenience
pub use classify::{CategorizeSummary, CategoryAssignment, ClassificationInput};
pub use config::{EngineConfig, PushTransport};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use event::{EngineEvent, StoreSnapshot};
pub use ids::{ClockIdGenerator, IdGenerator, SequenceIdGenerator};
pub use note::{Note, NoteDraft, NoteId};
pub use pipeline::{MutationKind, MutationLedger, Resolution};
pub use protocol::{Notification, ProtocolError, PushFrame};
pub use reconciler::{Applied, PresenceSet, Reconciler};
pub use remote::{HttpNoteService, NoteService};
pub use session::Session;
pub use store::NoteStore;
pub use view::{CategoryFilter, FilterMode, SortOrder, ViewQuery};
