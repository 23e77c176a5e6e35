// ── Live stream session ──
//
// Couples one topic's record stream to one remote viewer. Three tasks
// cooperate under a shared cancellation token: the producer reads records
// from the cluster into a bounded queue, the relay drains the queue into
// the viewer's sink, and the monitor watches for the viewer going away.
// Whichever side dies first cancels the others; `run` returns only after
// all of them have stopped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClusterClient;
use crate::error::CoreError;
use crate::model::Record;

/// Queue depth between the cluster read loop and the viewer. When the
/// viewer is slower than the topic, the full queue blocks the producer's
/// sends and the cluster's own flow control throttles the read.
const QUEUE_CAPACITY: usize = 256;

/// Delivery side of a viewer connection. The session calls this from a
/// single task, in order; an error means the viewer is gone.
#[async_trait]
pub trait RecordSink: Send {
    async fn forward(&mut self, record: Record) -> Result<(), CoreError>;
}

/// Disconnect detection for a viewer connection. `closed` resolves once
/// the remote side hangs up; for connection types without a read channel
/// it may simply pend forever.
#[async_trait]
pub trait ViewerMonitor: Send {
    async fn closed(&mut self);
}

/// One viewer's live tail of one topic.
pub struct StreamSession {
    cluster: String,
    topic: String,
    cancel: CancellationToken,
}

impl StreamSession {
    /// `parent` is typically the process-wide shutdown token; the session
    /// derives its own scope from it so a global shutdown tears down every
    /// open stream.
    pub fn new(cluster: impl Into<String>, topic: impl Into<String>, parent: &CancellationToken) -> Self {
        Self {
            cluster: cluster.into(),
            topic: topic.into(),
            cancel: parent.child_token(),
        }
    }

    /// Token scoped to this session. Cancelling it ends the session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the session to completion. Returns once the viewer
    /// disconnects, the stream ends, or the session is cancelled — with
    /// every worker task joined.
    pub async fn run<S, M>(self, client: Arc<dyn ClusterClient>, mut sink: S, mut monitor: M)
    where
        S: RecordSink,
        M: ViewerMonitor + 'static,
    {
        info!(cluster = %self.cluster, topic = %self.topic, "stream session started");

        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);

        // Producer: owns the only sender, so the queue closes exactly once,
        // when stream_records returns and tx drops. Queue closure (not
        // cancellation) signals a clean stream end, letting the relay drain
        // records that are already queued.
        let producer = {
            let cancel = self.cancel.clone();
            let topic = self.topic.clone();
            let cluster = self.cluster.clone();
            tokio::spawn(async move {
                if let Err(e) = client.stream_records(&topic, tx, cancel).await {
                    warn!(cluster = %cluster, topic = %topic, error = %e, "record stream ended with error");
                }
            })
        };

        // Monitor: a viewer hang-up cancels the whole session.
        let monitor_task = {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = monitor.closed() => cancel.cancel(),
                }
            })
        };

        // Relay: drain the queue into the sink until something stops.
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(record) => {
                        if let Err(e) = sink.forward(record).await {
                            debug!(cluster = %self.cluster, topic = %self.topic, error = %e, "viewer send failed");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.cancel.cancel();
        let _ = producer.await;
        let _ = monitor_task.await;

        info!(cluster = %self.cluster, topic = %self.topic, "stream session closed");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
