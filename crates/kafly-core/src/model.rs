// ── Domain model ──
//
// Read-side types the dashboard renders. Client implementations map their
// library's metadata responses into these; the core never sees wire types.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cluster identity and liveness as shown in the overview listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    pub brokers: Vec<String>,
    pub is_online: bool,
    pub auth_type: String,
}

/// Aggregate cluster statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_topics: usize,
    pub total_partitions: usize,
    pub total_consumer_groups: usize,
    pub under_replicated_partitions: usize,
    pub offline_partitions: usize,
}

/// Per-broker detail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerDetail {
    pub id: i32,
    pub host: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
    pub is_controller: bool,
    pub leader_partitions: usize,
}

/// Consumer group summary row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerGroupSummary {
    pub group_id: String,
    pub state: String,
    pub members: usize,
}

/// Full topic detail: per-partition layout plus effective configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDetail {
    pub name: String,
    pub partitions: Vec<PartitionDetail>,
    /// Effective topic configs (`retention.ms`, `cleanup.policy`, ...).
    pub configs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDetail {
    pub id: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub in_sync_replicas: Vec<i32>,
    pub high_watermark: i64,
}

/// Request to create a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication: i16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, String>,
}

/// One record as it flows through a stream session or a produce call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Convenience constructor for records about to be produced, where
    /// partition and offset are assigned by the platform.
    pub fn new(key: Option<Bytes>, value: Bytes) -> Self {
        Self {
            key,
            value,
            partition: -1,
            offset: -1,
            timestamp: Utc::now(),
        }
    }
}
