//
// reference/provider.rs
//
// Virtual reference providers and their registration lifecycle
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use indexmap::IndexMap;

use super::source::{DocumentMetadata, DocumentSource};
use super::types::{split_subpath, DocumentId, Origin, ReferenceRecord};

/// Contributes computed references that do not appear in a document's text.
///
/// Providers only get shared borrows of the document source and metadata;
/// they return new records and never modify documents.
#[async_trait]
pub trait VirtualProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn provide(
        &self,
        doc: &DocumentId,
        metadata: &DocumentMetadata,
        source: &dyn DocumentSource,
    ) -> anyhow::Result<Vec<ReferenceRecord>>;
}

pub type ProviderId = u64;

/// Registration lifecycle.
///
/// Providers registered while `Pending` are queued in call order and moved to
/// the live registry by `ProviderRegistry::activate`.
enum RegistryState {
    Pending(Vec<(ProviderId, Arc<dyn VirtualProvider>)>),
    Ready(IndexMap<ProviderId, Arc<dyn VirtualProvider>>),
}

/// Shared registry of virtual providers
pub struct ProviderRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("ready", &self.is_ready())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            state: Mutex::new(RegistryState::Pending(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ProviderRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every update is a single push or insert, so a poisoned lock is recovered
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a provider. Returns a handle that can unregister it.
    pub fn register(self: &Arc<Self>, provider: Arc<dyn VirtualProvider>) -> ProviderHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = provider.name().to_string();
        match &mut *self.state() {
            RegistryState::Pending(queue) => {
                log::trace!("Queued virtual provider '{}' (id {}) until index is ready", name, id);
                queue.push((id, provider));
            }
            RegistryState::Ready(live) => {
                log::trace!("Registered virtual provider '{}' (id {})", name, id);
                live.insert(id, provider);
            }
        }
        ProviderHandle {
            id,
            name,
            registry: Arc::downgrade(self),
        }
    }

    /// Flush queued registrations into the live registry, preserving order.
    /// Returns the number of providers flushed; a no-op once ready.
    pub fn activate(&self) -> usize {
        let mut state = self.state();
        match &mut *state {
            RegistryState::Pending(queue) => {
                let flushed = queue.len();
                let live: IndexMap<_, _> = queue.drain(..).collect();
                *state = RegistryState::Ready(live);
                if flushed > 0 {
                    log::info!("Activated {} queued virtual providers", flushed);
                }
                flushed
            }
            RegistryState::Ready(_) => 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state(), RegistryState::Ready(_))
    }

    /// Registered providers in either state
    pub fn len(&self) -> usize {
        match &*self.state() {
            RegistryState::Pending(queue) => queue.len(),
            RegistryState::Ready(live) => live.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Providers that currently contribute; empty until activated
    pub fn active(&self) -> Vec<Arc<dyn VirtualProvider>> {
        match &*self.state() {
            RegistryState::Pending(_) => Vec::new(),
            RegistryState::Ready(live) => live.values().cloned().collect(),
        }
    }

    fn unregister(&self, id: ProviderId) -> bool {
        match &mut *self.state() {
            RegistryState::Pending(queue) => {
                let before = queue.len();
                queue.retain(|(queued, _)| *queued != id);
                queue.len() < before
            }
            RegistryState::Ready(live) => live.shift_remove(&id).is_some(),
        }
    }
}

/// Handle returned by `ProviderRegistry::register`.
///
/// Unregistering stops future contributions; records already in the index
/// stay until their documents are rebuilt.
#[derive(Debug)]
pub struct ProviderHandle {
    id: ProviderId,
    name: String,
    registry: Weak<ProviderRegistry>,
}

impl ProviderHandle {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Returns false if the provider was already gone
    pub fn unregister(self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .map(|registry| registry.unregister(self.id))
            .unwrap_or(false);
        if removed {
            log::trace!("Unregistered virtual provider '{}' (id {})", self.name, self.id);
        }
        removed
    }
}

/// Turns front matter values (e.g. `related: [Beta]`) into virtual references
#[derive(Debug, Clone)]
pub struct FrontmatterProvider {
    keys: Vec<String>,
}

impl FrontmatterProvider {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl VirtualProvider for FrontmatterProvider {
    fn name(&self) -> &str {
        "frontmatter"
    }

    async fn provide(
        &self,
        doc: &DocumentId,
        metadata: &DocumentMetadata,
        source: &dyn DocumentSource,
    ) -> anyhow::Result<Vec<ReferenceRecord>> {
        let mut records = Vec::new();
        for key in &self.keys {
            for value in metadata.values(key) {
                let (link, subpath) = split_subpath(value);
                if link.trim().is_empty() {
                    continue;
                }
                let mut record = ReferenceRecord::new(doc.clone(), link.trim(), Origin::Virtual)
                    .with_display(format!("{}: {}", key, value));
                record.target = source.resolve_link(link, doc);
                record.subpath = subpath.map(str::to_string);
                records.push(record);
            }
        }
        Ok(records)
    }
}
