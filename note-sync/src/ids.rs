//! Provisional id generation for optimistic creates.
//!
//! The server has not assigned an id when a note is first shown, so the
//! engine asks an [`IdGenerator`] for a provisional one. The store task also
//! re-draws on collision, so a generator only has to be unlikely to collide.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::note::NoteId;

/// Source of provisional note ids.
pub trait IdGenerator: Send {
    fn next(&mut self) -> NoteId;
}

/// Clock-based generator: `millis_since_epoch * 1000 + random(0..1000)`.
///
/// Ids are strictly increasing within one generator and stay below 2^53, so
/// they survive a round trip through JavaScript-based servers unchanged.
#[derive(Debug, Default)]
pub struct ClockIdGenerator {
    last: u64,
}

impl ClockIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for ClockIdGenerator {
    fn next(&mut self) -> NoteId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let jitter = (Uuid::new_v4().as_u128() % 1000) as u64;
        let candidate = millis.saturating_mul(1000).saturating_add(jitter);
        self.last = candidate.max(self.last + 1);
        NoteId(self.last)
    }
}

/// Deterministic counter, for tests and replay tooling.
#[derive(Debug, Clone)]
pub struct SequenceIdGenerator {
    next: u64,
}

impl SequenceIdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next(&mut self) -> NoteId {
        let id = NoteId(self.next);
        self.next += 1;
        id
    }
}
