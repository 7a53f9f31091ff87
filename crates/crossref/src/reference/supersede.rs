//
// reference/supersede.rs
//
// Supersession of in-flight per-document updates and cooperative stop
//

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::types::DocumentId;

/// Ticket for one scheduled update of one document
#[derive(Debug, Clone)]
pub struct UpdateTicket {
    pub generation: u64,
    pub token: CancellationToken,
}

impl UpdateTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Tracks the newest pending update per document.
///
/// Scheduling an update cancels any older one for the same document. An
/// update may only be applied while its generation is still current.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    pending: DashMap<DocumentId, UpdateTicket>,
    next_generation: AtomicU64,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an update for `doc`, cancelling any pending one
    pub fn schedule(&self, doc: DocumentId) -> UpdateTicket {
        let ticket = UpdateTicket {
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst) + 1,
            token: CancellationToken::new(),
        };
        if let Some(old) = self.pending.insert(doc.clone(), ticket.clone()) {
            log::trace!(
                "Superseding update {} of {} with {}",
                old.generation,
                doc,
                ticket.generation
            );
            old.token.cancel();
        }
        ticket
    }

    /// Whether `ticket` is still the newest update for `doc`
    pub fn is_current(&self, doc: &DocumentId, ticket: &UpdateTicket) -> bool {
        !ticket.is_cancelled()
            && self
                .pending
                .get(doc)
                .is_some_and(|current| current.generation == ticket.generation)
    }

    /// Mark the update as finished. Only removes the entry if it is still
    /// the current one, so a newer schedule is left alone.
    pub fn complete(&self, doc: &DocumentId, ticket: &UpdateTicket) {
        self.pending
            .remove_if(doc, |_, current| current.generation == ticket.generation);
    }

    /// Cancel the pending update of `doc`, if any
    pub fn cancel(&self, doc: &DocumentId) {
        if let Some((_, ticket)) = self.pending.remove(doc) {
            ticket.token.cancel();
        }
    }

    /// Cancel all pending updates
    pub fn cancel_all(&self) {
        self.pending.retain(|_, ticket| {
            ticket.token.cancel();
            false
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Cooperative stop flag shared between the engine and its callers
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether a stop was pending
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
