//! A read-only, possibly-changing list of stores (one per tenant or
//! database). Static providers wrap a fixed list; dynamic providers
//! periodically re-discover and diff against a cache.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::WharfError;

/// A store that can identify itself for logging, metrics tagging, and
/// keyed lookup, modeled as a method on the store itself rather than a
/// provider-side lookup table.
pub trait IdentifiedStore {
    fn identifier(&self) -> String;
}

#[async_trait]
pub trait StoreProvider<S>: Send + Sync {
    async fn all_stores(&self) -> Result<Vec<Arc<S>>, WharfError>;
    async fn store_by_key(&self, key: &str) -> Result<Option<Arc<S>>, WharfError>;
}

/// Picks one store out of the sequence the provider returns. The default is
/// round-robin; callers may plug in their own.
pub trait SelectionStrategy<S>: Send + Sync {
    fn select<'a>(&self, stores: &'a [Arc<S>]) -> Option<&'a Arc<S>>;
}

#[derive(Default)]
pub struct RoundRobin {
    index: AtomicUsize,
}

impl<S> SelectionStrategy<S> for RoundRobin {
    fn select<'a>(&self, stores: &'a [Arc<S>]) -> Option<&'a Arc<S>> {
        if stores.is_empty() {
            return None;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed) % stores.len();
        stores.get(i)
    }
}

/// A fixed list of stores known up front, e.g. one per statically configured
/// tenant database.
pub struct StaticStoreProvider<S: IdentifiedStore> {
    stores: Vec<Arc<S>>,
}

impl<S: IdentifiedStore> StaticStoreProvider<S> {
    pub fn new(stores: Vec<Arc<S>>) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl<S: IdentifiedStore + Send + Sync> StoreProvider<S> for StaticStoreProvider<S> {
    async fn all_stores(&self) -> Result<Vec<Arc<S>>, WharfError> {
        Ok(self.stores.clone())
    }

    async fn store_by_key(&self, key: &str) -> Result<Option<Arc<S>>, WharfError> {
        Ok(self
            .stores
            .iter()
            .find(|s| s.identifier() == key)
            .cloned())
    }
}

type DiscoverFn<S> = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<Arc<S>>, WharfError>> + Send>>
        + Send
        + Sync,
>;
type OnNewStore<S> = Arc<
    dyn Fn(Arc<S>) -> Pin<Box<dyn Future<Output = Result<(), WharfError>> + Send>> + Send + Sync,
>;

/// Caches a set of discovered stores and periodically re-runs discovery
/// (interval ~5 minutes by default). On new stores, optionally runs schema
/// deployment before admitting the store to rotation. On removed stores,
/// drops them from subsequent rotations; claims already in flight against a
/// removed store proceed to completion, since the provider simply stops
/// handing that store out.
pub struct DynamicStoreProvider<S: IdentifiedStore> {
    cache: DashMap<String, Arc<S>>,
    discover: DiscoverFn<S>,
    on_new_store: Option<OnNewStore<S>>,
}

impl<S: IdentifiedStore + Send + Sync + 'static> DynamicStoreProvider<S> {
    pub fn new(discover: DiscoverFn<S>) -> Self {
        Self {
            cache: DashMap::new(),
            discover,
            on_new_store: None,
        }
    }

    pub fn with_schema_bootstrap(mut self, on_new_store: OnNewStore<S>) -> Self {
        self.on_new_store = Some(on_new_store);
        self
    }

    pub async fn rediscover(&self) -> Result<(), WharfError> {
        let discovered = (self.discover)().await?;
        let discovered_keys: std::collections::HashSet<String> =
            discovered.iter().map(|s| s.identifier()).collect();

        for store in discovered {
            let key = store.identifier();
            if !self.cache.contains_key(&key) {
                if let Some(on_new) = &self.on_new_store {
                    on_new(store.clone()).await?;
                }
                self.cache.insert(key, store);
            }
        }

        self.cache.retain(|key, _| discovered_keys.contains(key));
        Ok(())
    }

    /// Spawns the periodic rediscovery loop; returns the task handle so the
    /// caller can await it on shutdown.
    pub fn spawn_rediscovery(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel.cancelled() => return,
                }
                if let Err(err) = this.rediscover().await {
                    warn!(error = %err, "store discovery failed; keeping previous rotation");
                }
            }
        })
    }
}

#[async_trait]
impl<S: IdentifiedStore + Send + Sync + 'static> StoreProvider<S> for DynamicStoreProvider<S> {
    async fn all_stores(&self) -> Result<Vec<Arc<S>>, WharfError> {
        Ok(self.cache.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn store_by_key(&self, key: &str) -> Result<Option<Arc<S>>, WharfError> {
        Ok(self.cache.get(key).map(|entry| entry.value().clone()))
    }
}
