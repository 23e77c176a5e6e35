#![allow(clippy::unwrap_used)]
// End-to-end tests for the registry / watcher / stream session stack,
// using scripted in-memory clients behind the `ClientFactory` seam.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kafly_config::{ClusterDefinition, FileConfig, read_config, write_config};
use kafly_core::{
    BrokerDetail, ClientFactory, ClusterClient, ClusterInfo, ClusterRegistry, ClusterStats,
    ConfigWatcher, ConsumerGroupSummary, CoreError, NewTopic, Record, RecordSink, StreamSession,
    TopicDetail, ViewerMonitor,
};

// ── Doubles ─────────────────────────────────────────────────────────

/// In-memory cluster: a fixed topic map, plus a live feed that any
/// number of stream sessions tail concurrently.
struct MemoryCluster {
    name: String,
    topics: std::sync::Mutex<HashMap<String, usize>>,
    feed: tokio::sync::broadcast::Sender<Record>,
    shutdowns: AtomicUsize,
}

impl MemoryCluster {
    fn new(name: &str) -> Self {
        let (feed, _) = tokio::sync::broadcast::channel(1024);
        Self {
            name: name.into(),
            topics: std::sync::Mutex::new(HashMap::new()),
            feed,
            shutdowns: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn is_healthy(&self) -> bool {
        true
    }

    async fn list_topics(&self, show_internal: bool) -> Result<HashMap<String, usize>, CoreError> {
        let topics = self.topics.lock().unwrap();
        Ok(topics
            .iter()
            .filter(|(name, _)| show_internal || !name.starts_with("__"))
            .map(|(name, parts)| (name.clone(), *parts))
            .collect())
    }

    async fn cluster_info(&self) -> Result<ClusterInfo, CoreError> {
        Ok(ClusterInfo {
            id: self.name.clone(),
            name: self.name.clone(),
            brokers: vec!["mem:9092".into()],
            is_online: true,
            auth_type: "PLAINTEXT".into(),
        })
    }

    async fn cluster_stats(&self) -> Result<ClusterStats, CoreError> {
        let topics = self.topics.lock().unwrap();
        Ok(ClusterStats {
            total_topics: topics.len(),
            total_partitions: topics.values().sum(),
            ..ClusterStats::default()
        })
    }

    async fn broker_details(&self) -> Result<Vec<BrokerDetail>, CoreError> {
        Ok(vec![BrokerDetail {
            id: 1,
            host: "mem".into(),
            port: 9092,
            rack: None,
            is_controller: true,
            leader_partitions: 0,
        }])
    }

    async fn consumer_groups(&self) -> Result<Vec<ConsumerGroupSummary>, CoreError> {
        Ok(Vec::new())
    }

    async fn topic_detail(&self, topic: &str) -> Result<TopicDetail, CoreError> {
        let topics = self.topics.lock().unwrap();
        match topics.get(topic) {
            Some(_) => Ok(TopicDetail {
                name: topic.into(),
                partitions: Vec::new(),
                configs: std::collections::BTreeMap::new(),
            }),
            None => Err(CoreError::OperationFailed {
                message: format!("unknown topic: {topic}"),
            }),
        }
    }

    async fn create_topic(&self, request: NewTopic) -> Result<(), CoreError> {
        let mut topics = self.topics.lock().unwrap();
        if topics.contains_key(&request.name) {
            return Err(CoreError::OperationFailed {
                message: format!("topic already exists: {}", request.name),
            });
        }
        topics.insert(request.name, request.partitions.max(0) as usize);
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<(), CoreError> {
        self.topics.lock().unwrap().remove(topic);
        Ok(())
    }

    async fn alter_topic_configs(
        &self,
        _topic: &str,
        _configs: HashMap<String, String>,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    async fn grow_partitions(&self, topic: &str, total: i32) -> Result<(), CoreError> {
        let mut topics = self.topics.lock().unwrap();
        let Some(current) = topics.get_mut(topic) else {
            return Err(CoreError::OperationFailed {
                message: format!("unknown topic: {topic}"),
            });
        };
        if (total as usize) < *current {
            return Err(CoreError::OperationFailed {
                message: "partition count can only grow".into(),
            });
        }
        *current = total as usize;
        Ok(())
    }

    async fn stream_records(
        &self,
        _topic: &str,
        out: mpsc::Sender<Record>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        let mut feed = self.feed.subscribe();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                next = feed.recv() => match next {
                    Ok(record) => {
                        if out.send(record).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(_) => return Ok(()),
                },
            }
        }
    }

    async fn produce(&self, _topic: &str, record: Record) -> Result<(), CoreError> {
        let _ = self.feed.send(record);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryFactory {
    clusters: std::sync::Mutex<HashMap<String, Arc<MemoryCluster>>>,
}

impl MemoryFactory {
    fn cluster(&self, name: &str) -> Option<Arc<MemoryCluster>> {
        self.clusters.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ClientFactory for MemoryFactory {
    async fn create(
        &self,
        definition: &ClusterDefinition,
    ) -> Result<Arc<dyn ClusterClient>, CoreError> {
        let cluster = Arc::new(MemoryCluster::new(&definition.name));
        self.clusters
            .lock()
            .unwrap()
            .insert(definition.name.clone(), Arc::clone(&cluster));
        Ok(cluster)
    }
}

struct ChannelSink(mpsc::UnboundedSender<Record>);

#[async_trait]
impl RecordSink for ChannelSink {
    async fn forward(&mut self, record: Record) -> Result<(), CoreError> {
        self.0.send(record).map_err(|_| CoreError::ViewerClosed)
    }
}

struct NeverCloses;

#[async_trait]
impl ViewerMonitor for NeverCloses {
    async fn closed(&mut self) {
        std::future::pending().await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn definition(name: &str) -> ClusterDefinition {
    ClusterDefinition {
        name: name.into(),
        brokers: vec!["mem:9092".into()],
        ..ClusterDefinition::default()
    }
}

async fn eventually<F>(mut condition: F)
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..60 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within 3s");
}

// ── Scenarios ───────────────────────────────────────────────────────

/// Full lifecycle: load from file, edit the file behind the watcher's
/// back, mutate through the API, and confirm file and registry agree.
#[tokio::test]
async fn registry_follows_file_and_api_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clusters.yaml");
    write_config(
        &path,
        &FileConfig {
            clusters: vec![definition("dev")],
        },
    )
    .unwrap();

    let factory = Arc::new(MemoryFactory::default());
    let registry = ClusterRegistry::new(&path, Arc::clone(&factory) as _);
    registry.load_from_file().await.unwrap();
    assert!(registry.get_client("dev").await.is_some());

    let watcher = ConfigWatcher::spawn(registry.clone()).unwrap();

    // External edit: add a cluster by rewriting the file.
    write_config(
        &path,
        &FileConfig {
            clusters: vec![definition("dev"), definition("staging")],
        },
    )
    .unwrap();
    eventually(async || registry.get_client("staging").await.is_some()).await;

    // The unchanged cluster kept its original client across the reload.
    assert_eq!(
        factory.cluster("dev").unwrap().shutdowns.load(Ordering::SeqCst),
        0
    );

    // API edit: delete one cluster; the file shrinks to match.
    registry.delete("staging").await.unwrap();
    let on_disk = read_config(&path).unwrap();
    assert_eq!(on_disk.clusters.len(), 1);
    assert_eq!(on_disk.clusters[0].name, "dev");

    watcher.shutdown().await;
    registry.close().await;
    assert_eq!(
        factory.cluster("dev").unwrap().shutdowns.load(Ordering::SeqCst),
        1
    );
}

/// Records produced into a cluster reach a viewer tailing the topic
/// through a stream session, in order.
#[tokio::test]
async fn produced_records_reach_a_streaming_viewer() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(MemoryFactory::default());
    let registry = ClusterRegistry::new(dir.path().join("c.yaml"), Arc::clone(&factory) as _);

    registry.save(definition("dev")).await.unwrap();
    let client = registry.get_client("dev").await.unwrap();
    client
        .create_topic(NewTopic {
            name: "orders".into(),
            partitions: 3,
            replication: 1,
            configs: std::collections::BTreeMap::new(),
        })
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let session = StreamSession::new("dev", "orders", &shutdown);
    let token = session.cancel_token();
    let (tx, mut seen) = mpsc::unbounded_channel();
    let run = tokio::spawn(session.run(Arc::clone(&client), ChannelSink(tx), NeverCloses));

    // Give the session's subscription a moment to attach.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for i in 0..5 {
        client
            .produce("orders", Record::new(None, Bytes::from(format!("m{i}"))))
            .await
            .unwrap();
    }

    let mut values = Vec::new();
    while values.len() < 5 {
        let record = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("record not delivered")
            .expect("stream closed early");
        values.push(record.value);
    }
    assert_eq!(values[0], Bytes::from("m0"));
    assert_eq!(values[4], Bytes::from("m4"));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("session did not stop")
        .unwrap();
}

/// Readers never block behind a slow reconciliation and saves from many
/// tasks serialize without losing updates.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_and_reads_stay_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(MemoryFactory::default());
    let registry = ClusterRegistry::new(dir.path().join("c.yaml"), factory as _);

    let mut writers = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        writers.push(tokio::spawn(async move {
            registry.save(definition(&format!("c{i}"))).await.unwrap();
        }));
    }
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _ = registry.find_all().await;
                    let _ = registry.get_client("c0").await;
                }
            })
        })
        .collect();

    for task in writers.into_iter().chain(readers) {
        task.await.unwrap();
    }

    // Delete half of them from parallel tasks while reads continue.
    let mut deleters = Vec::new();
    for i in 0..4 {
        let registry = registry.clone();
        deleters.push(tokio::spawn(async move {
            registry.delete(&format!("c{i}")).await.unwrap();
        }));
    }
    for _ in 0..50 {
        let _ = registry.find_all().await;
    }
    for task in deleters {
        task.await.unwrap();
    }

    let defs = registry.find_all().await;
    assert_eq!(defs.len(), 4);
    for i in 0..4 {
        assert!(registry.get_client(&format!("c{i}")).await.is_none());
    }
    for i in 4..8 {
        assert!(registry.get_client(&format!("c{i}")).await.is_some());
    }
    let on_disk = read_config(registry.config_path()).unwrap();
    assert_eq!(on_disk.clusters.len(), 4);
}

/// Internal topics stay hidden unless explicitly requested.
#[tokio::test]
async fn internal_topics_are_filtered_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(MemoryFactory::default());
    let registry = ClusterRegistry::new(dir.path().join("c.yaml"), factory as _);

    registry.save(definition("dev")).await.unwrap();
    let client = registry.get_client("dev").await.unwrap();
    for name in ["orders", "__consumer_offsets"] {
        client
            .create_topic(NewTopic {
                name: name.into(),
                partitions: 1,
                replication: 1,
                configs: std::collections::BTreeMap::new(),
            })
            .await
            .unwrap();
    }

    let visible = client.list_topics(false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible.contains_key("orders"));

    let all = client.list_topics(true).await.unwrap();
    assert_eq!(all.len(), 2);
}
