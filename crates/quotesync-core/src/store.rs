//! Object storage and change notification.
//!
//! The [`ObjectStore`] trait is the reconciler's only view of persisted
//! objects. Status writes are conditional on the `resource_version` the
//! caller read; a stale write fails with [`StoreError::Conflict`] and changes
//! nothing. Watchers hear about spec creation, replacement and deletion; status
//! writes do not notify, since the writer already knows what it wrote.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::{Event, ObjectKey, ObjectMeta, StockQuote, StockQuoteSpec, StockQuoteStatus, ValidationError};

const WATCH_CHANNEL_CAPACITY: usize = 256;
const MAX_EVENTS_PER_OBJECT: usize = 32;

/// Change notification delivered to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Applied(ObjectKey),
    Deleted(ObjectKey),
}

impl WatchEvent {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Applied(key) | Self::Deleted(key) => key,
        }
    }
}

/// Store failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    NotFound,
    Conflict,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("object {key} not found")]
    NotFound { key: ObjectKey },

    #[error("object {key} was modified (read version {expected}, stored version {actual})")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub const fn kind(&self) -> StoreErrorKind {
        match self {
            Self::NotFound { .. } => StoreErrorKind::NotFound,
            Self::Conflict { .. } => StoreErrorKind::Conflict,
            Self::Unavailable(_) => StoreErrorKind::Unavailable,
        }
    }
}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistent home of [`StockQuote`] objects.
pub trait ObjectStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, StockQuote>;

    fn list(&self) -> StoreFuture<'_, Vec<StockQuote>>;

    /// Replace the status if the stored object is still at `expected_version`.
    fn update_status<'a>(
        &'a self,
        key: &'a ObjectKey,
        expected_version: u64,
        status: StockQuoteStatus,
    ) -> StoreFuture<'a, StockQuote>;

    fn record_event<'a>(&'a self, key: &'a ObjectKey, event: Event) -> StoreFuture<'a, ()>;

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}

#[derive(Debug, Default)]
struct StoreInner {
    objects: BTreeMap<ObjectKey, StockQuote>,
    events: HashMap<ObjectKey, VecDeque<Event>>,
    last_version: u64,
}

impl StoreInner {
    fn next_version(&mut self) -> u64 {
        self.last_version = self.last_version.saturating_add(1);
        self.last_version
    }
}

/// Process-local object store with broadcast watch.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    inner: Arc<RwLock<StoreInner>>,
    watch_tx: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            watch_tx,
        }
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the object or replace its spec. Status is preserved on replace;
    /// re-applying an identical spec is a no-op and notifies nobody.
    pub async fn apply(
        &self,
        key: ObjectKey,
        spec: StockQuoteSpec,
    ) -> Result<StockQuote, ValidationError> {
        key.validate()?;
        spec.secret_ref.validate()?;

        let applied = {
            let mut inner = self.inner.write().await;
            if let Some(existing) = inner.objects.get(&key) {
                if existing.spec == spec {
                    return Ok(existing.clone());
                }
            }

            let version = inner.next_version();
            match inner.objects.get_mut(&key) {
                Some(existing) => {
                    existing.metadata.generation += 1;
                    existing.metadata.resource_version = version;
                    existing.spec = spec;
                    existing.clone()
                }
                None => {
                    let object = StockQuote {
                        metadata: ObjectMeta {
                            name: key.name.clone(),
                            namespace: key.namespace.clone(),
                            uid: Uuid::new_v4(),
                            resource_version: version,
                            generation: 1,
                        },
                        spec,
                        status: StockQuoteStatus::default(),
                    };
                    inner.objects.insert(key.clone(), object.clone());
                    object
                }
            }
        };

        tracing::debug!(object = %key, version = applied.metadata.resource_version, "object applied");
        let _ = self.watch_tx.send(WatchEvent::Applied(key));
        Ok(applied)
    }

    pub async fn delete(&self, key: &ObjectKey) -> Option<StockQuote> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner.events.remove(key);
            inner.objects.remove(key)
        };

        if removed.is_some() {
            tracing::debug!(object = %key, "object deleted");
            let _ = self.watch_tx.send(WatchEvent::Deleted(key.clone()));
        }
        removed
    }

    /// Most recent events for `key`, oldest first.
    pub async fn events(&self, key: &ObjectKey) -> Vec<Event> {
        self.inner
            .read()
            .await
            .events
            .get(key)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get<'a>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, StockQuote> {
        Box::pin(async move {
            self.inner
                .read()
                .await
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<StockQuote>> {
        Box::pin(async move { Ok(self.inner.read().await.objects.values().cloned().collect()) })
    }

    fn update_status<'a>(
        &'a self,
        key: &'a ObjectKey,
        expected_version: u64,
        status: StockQuoteStatus,
    ) -> StoreFuture<'a, StockQuote> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let actual = inner
                .objects
                .get(key)
                .map(|object| object.metadata.resource_version)
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

            if actual != expected_version {
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    expected: expected_version,
                    actual,
                });
            }

            let version = inner.next_version();
            let object = inner
                .objects
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
            object.status = status;
            object.metadata.resource_version = version;
            Ok(object.clone())
        })
    }

    fn record_event<'a>(&'a self, key: &'a ObjectKey, event: Event) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if !inner.objects.contains_key(key) {
                return Err(StoreError::NotFound { key: key.clone() });
            }

            let events = inner.events.entry(key.clone()).or_default();
            if events.len() == MAX_EVENTS_PER_OBJECT {
                events.pop_front();
            }
            events.push_back(event);
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.watch_tx.subscribe()
    }
}
