// ── Cluster registry ──
//
// Owns the mapping cluster name → live client and keeps it consistent
// with the configuration file. All mutation is linearized under one
// write lock; reads are concurrent snapshots that never touch I/O.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use kafly_config::{ClusterDefinition, FileConfig, read_config, write_config};

use crate::client::{ClientFactory, ClusterClient};
use crate::error::CoreError;

/// Default upper bound on a single factory connection attempt, so one
/// unreachable cluster cannot stall a whole reconciliation pass.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── ClusterRegistry ──────────────────────────────────────────────────

/// Concurrency-safe store of cluster definitions and their live clients.
///
/// Cheaply cloneable via `Arc` — the watcher, the HTTP layer, and stream
/// sessions all hold clones of the same registry.
#[derive(Clone)]
pub struct ClusterRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    factory: Arc<dyn ClientFactory>,
    config_path: PathBuf,
    connect_timeout: Duration,
}

#[derive(Default)]
struct RegistryState {
    /// Last-loaded definition list, in file order.
    definitions: Vec<ClusterDefinition>,
    /// Live clients. Invariant: every key here has a matching definition;
    /// a definition may transiently lack a client after a failed create.
    clients: HashMap<String, Arc<dyn ClusterClient>>,
}

impl ClusterRegistry {
    /// Create an empty registry. Call [`load_from_file`](Self::load_from_file)
    /// to populate it from the configuration file.
    pub fn new(config_path: impl Into<PathBuf>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                factory,
                config_path: config_path.into(),
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            }),
        }
    }

    /// Override the per-connection factory timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        // Only callable before the registry is shared.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.connect_timeout = timeout;
        }
        self
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.inner.config_path
    }

    // ── Loading & reconciliation ─────────────────────────────────────

    /// Read the configuration file and reconcile live clients against it.
    pub async fn load_from_file(&self) -> Result<(), CoreError> {
        let cfg = read_config(&self.inner.config_path)?;
        self.reconcile(cfg.clusters).await;
        Ok(())
    }

    /// Make the live client set match `definitions`.
    ///
    /// Creates clients for new names, recreates clients whose definition
    /// changed (connection-level comparison), and closes clients whose
    /// names left the list. A factory failure degrades that one cluster
    /// and never aborts the pass — the next reconciliation retries.
    /// Running twice with the same list performs no client churn the
    /// second time.
    pub async fn reconcile(&self, definitions: Vec<ClusterDefinition>) {
        let mut state = self.inner.state.write().await;

        let previous: HashMap<String, ClusterDefinition> = state
            .definitions
            .iter()
            .map(|d| (d.name.clone(), d.clone()))
            .collect();
        let keep: HashSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();

        for definition in &definitions {
            match state.clients.get(&definition.name) {
                None => match self.create_client(definition).await {
                    Ok(client) => {
                        state.clients.insert(definition.name.clone(), client);
                        info!(cluster = %definition.name, "client created");
                    }
                    Err(e) => {
                        warn!(cluster = %definition.name, error = %e, "failed to create client");
                    }
                },
                Some(current) => {
                    let unchanged = previous
                        .get(&definition.name)
                        .is_some_and(|old| old.connection_eq(definition));
                    if unchanged {
                        continue;
                    }
                    current.shutdown().await;
                    state.clients.remove(&definition.name);
                    match self.create_client(definition).await {
                        Ok(client) => {
                            state.clients.insert(definition.name.clone(), client);
                            info!(cluster = %definition.name, "client recreated");
                        }
                        Err(e) => {
                            warn!(cluster = %definition.name, error = %e, "failed to recreate client");
                        }
                    }
                }
            }
        }

        // Close clients whose names left the definition list.
        let stale: Vec<String> = state
            .clients
            .keys()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            if let Some(client) = state.clients.remove(&name) {
                client.shutdown().await;
                info!(cluster = %name, "client removed");
            }
        }

        state.definitions = definitions;
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Add or update one cluster and persist the full list.
    ///
    /// The new client is connected first; only on success is the previous
    /// client (if any) closed and replaced. If the write-back fails the
    /// swap is kept — runtime correctness wins over persisted-state
    /// consistency — and [`CoreError::Persist`] reports the gap.
    pub async fn save(&self, definition: ClusterDefinition) -> Result<(), CoreError> {
        if definition.name.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "cluster name must not be empty".into(),
            });
        }
        if definition.brokers.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "at least one broker address is required".into(),
            });
        }

        let mut state = self.inner.state.write().await;

        let client = self.create_client(&definition).await?;

        if let Some(old) = state.clients.remove(&definition.name) {
            old.shutdown().await;
        }
        state.clients.insert(definition.name.clone(), client);

        match state
            .definitions
            .iter_mut()
            .find(|d| d.name == definition.name)
        {
            Some(slot) => *slot = definition.clone(),
            None => state.definitions.push(definition.clone()),
        }

        info!(cluster = %definition.name, auth = %definition.auth_type(), "cluster saved");
        self.persist(&state)
    }

    /// Remove a cluster by name and persist the shrunk list.
    pub async fn delete(&self, name: &str) -> Result<(), CoreError> {
        let mut state = self.inner.state.write().await;

        let Some(client) = state.clients.remove(name) else {
            return Err(CoreError::NotFound { name: name.into() });
        };
        client.shutdown().await;
        state.definitions.retain(|d| d.name != name);

        info!(cluster = %name, "cluster deleted");
        self.persist(&state)
    }

    /// Close every client and drop all state. Used on shutdown.
    pub async fn close(&self) {
        let mut state = self.inner.state.write().await;
        for (name, client) in state.clients.drain() {
            debug!(cluster = %name, "closing client");
            client.shutdown().await;
        }
        state.definitions.clear();
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Definition for one cluster, cloned out of the current snapshot.
    pub async fn find_by_name(&self, name: &str) -> Option<ClusterDefinition> {
        let state = self.inner.state.read().await;
        state.definitions.iter().find(|d| d.name == name).cloned()
    }

    /// All definitions in file order, cloned out of the current snapshot.
    pub async fn find_all(&self) -> Vec<ClusterDefinition> {
        let state = self.inner.state.read().await;
        state.definitions.clone()
    }

    /// Live client handle for a cluster. Never blocks on I/O; `None` means
    /// the cluster is unknown or currently degraded (no client).
    pub async fn get_client(&self, name: &str) -> Option<Arc<dyn ClusterClient>> {
        let state = self.inner.state.read().await;
        state.clients.get(name).cloned()
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Factory call bounded by the connect timeout.
    async fn create_client(
        &self,
        definition: &ClusterDefinition,
    ) -> Result<Arc<dyn ClusterClient>, CoreError> {
        let attempt = self.inner.factory.create(definition);
        match tokio::time::timeout(self.inner.connect_timeout, attempt).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(CoreError::Factory {
                cluster: definition.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(CoreError::Factory {
                cluster: definition.name.clone(),
                reason: format!(
                    "connection attempt timed out after {}s",
                    self.inner.connect_timeout.as_secs()
                ),
            }),
        }
    }

    /// Write the current definition list back to the configuration file.
    fn persist(&self, state: &RegistryState) -> Result<(), CoreError> {
        let cfg = FileConfig {
            clusters: state.definitions.clone(),
        };
        write_config(&self.inner.config_path, &cfg).map_err(CoreError::Persist)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
