// ── Cluster client capability set ──
//
// The registry and stream session only ever see these traits. The
// production implementation wraps an actual protocol client library;
// tests plug in scripted doubles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kafly_config::ClusterDefinition;

use crate::error::CoreError;
use crate::model::{
    BrokerDetail, ClusterInfo, ClusterStats, ConsumerGroupSummary, NewTopic, Record, TopicDetail,
};

/// One authenticated connection to a cluster, admin handle included.
///
/// The registry owns which client is registered under a name; it does not
/// serialize calls *on* a client. Implementations must therefore tolerate
/// concurrent read-side calls (`&self` everywhere).
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Cheap reachability probe (broker metadata round-trip).
    async fn is_healthy(&self) -> bool;

    /// Topics with their partition counts. Internal topics (double-underscore
    /// prefixed) are filtered out unless `show_internal` is set.
    async fn list_topics(&self, show_internal: bool) -> Result<HashMap<String, usize>, CoreError>;

    async fn cluster_info(&self) -> Result<ClusterInfo, CoreError>;

    async fn cluster_stats(&self) -> Result<ClusterStats, CoreError>;

    async fn broker_details(&self) -> Result<Vec<BrokerDetail>, CoreError>;

    async fn consumer_groups(&self) -> Result<Vec<ConsumerGroupSummary>, CoreError>;

    async fn topic_detail(&self, topic: &str) -> Result<TopicDetail, CoreError>;

    async fn create_topic(&self, request: NewTopic) -> Result<(), CoreError>;

    async fn delete_topic(&self, topic: &str) -> Result<(), CoreError>;

    /// Apply config overrides to an existing topic.
    async fn alter_topic_configs(
        &self,
        topic: &str,
        configs: HashMap<String, String>,
    ) -> Result<(), CoreError>;

    /// Raise the partition count to `total`. Never shrinks.
    async fn grow_partitions(&self, topic: &str, total: i32) -> Result<(), CoreError>;

    /// Continuously read live records from `topic` into `out` until `cancel`
    /// fires, the send side is rejected, or an unrecoverable read error
    /// occurs. Sends must block (not drop) when the queue is full so the
    /// platform's own flow control throttles the read loop. Cancellation
    /// must reach the underlying poll call so this returns promptly.
    async fn stream_records(
        &self,
        topic: &str,
        out: mpsc::Sender<Record>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError>;

    /// Write a single record to `topic`.
    async fn produce(&self, topic: &str, record: Record) -> Result<(), CoreError>;

    /// Release the underlying connection. Called exactly once by the
    /// registry when the client is superseded or removed.
    async fn shutdown(&self);
}

/// Turns a [`ClusterDefinition`] into a live, connected client.
///
/// Injected into the registry so tests can substitute doubles. Calls are
/// independent — no shared state between invocations — and must be safe to
/// issue concurrently for different definitions.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(
        &self,
        definition: &ClusterDefinition,
    ) -> Result<Arc<dyn ClusterClient>, CoreError>;
}
