//! Cluster lifecycle and live streaming layer of the kafly workspace.
//!
//! This crate owns the runtime state behind the dashboard: which clusters
//! exist, which of them have live client connections, and how records flow
//! from a topic to a connected viewer.
//!
//! - **[`ClusterRegistry`]** — Concurrency-safe store mapping cluster names
//!   to live [`ClusterClient`] handles, kept consistent with the YAML
//!   configuration file. [`save()`](ClusterRegistry::save) /
//!   [`delete()`](ClusterRegistry::delete) mutate and persist;
//!   [`reconcile()`](ClusterRegistry::reconcile) converges the client set
//!   onto a definition list without churning unchanged connections.
//!
//! - **[`ConfigWatcher`]** — Background task observing the configuration
//!   file through OS filesystem notifications, debouncing editor write
//!   bursts into single registry reloads.
//!
//! - **[`StreamSession`]** — One viewer's live tail of one topic: a bounded
//!   queue between the cluster read loop and the viewer, torn down as a
//!   unit when either side goes away.
//!
//! - **[`ClusterClient`] / [`ClientFactory`]** — The capability seam. The
//!   registry and sessions only see these traits; the binary plugs in a
//!   real protocol client, tests plug in scripted doubles.

pub mod client;
pub mod error;
pub mod model;
pub mod registry;
pub mod session;
pub mod watcher;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{ClientFactory, ClusterClient};
pub use error::CoreError;
pub use registry::ClusterRegistry;
pub use session::{RecordSink, StreamSession, ViewerMonitor};
pub use watcher::ConfigWatcher;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    BrokerDetail, ClusterInfo, ClusterStats, ConsumerGroupSummary, NewTopic, PartitionDetail,
    Record, TopicDetail,
};
