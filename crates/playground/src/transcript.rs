//! Append-only output log shared by the controller and attached clients.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tokio::sync::broadcast,
};

const BROADCAST_CAPACITY: usize = 1024;

/// Category of a transcript chunk, used by the UI for styling only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Lifecycle messages from the playground itself.
    System,
    /// Process stdout, in arrival order.
    Output,
    /// Marker separating one run from the next.
    Separator,
    /// Process stderr or a surfaced failure.
    Error,
}

/// One immutable transcript entry. Sequence numbers are assigned at append
/// time and strictly increase within a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chunk {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub kind: ChunkKind,
    pub text: String,
}

/// Append-only ordered chunk log with broadcast fan-out.
///
/// The log is never truncated or rotated; it grows for the lifetime of the
/// session. Clones share the same underlying log.
#[derive(Clone)]
pub struct Transcript {
    chunks: Arc<RwLock<Vec<Chunk>>>,
    next_seq: Arc<AtomicU64>,
    tx: broadcast::Sender<Chunk>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    /// Append a chunk and fan it out to subscribers.
    ///
    /// The broadcast send happens under the same lock as the push, so
    /// subscribers observe chunks in append order.
    pub fn append(&self, kind: ChunkKind, text: impl Into<String>) -> Chunk {
        let chunk = Chunk {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            ts: Utc::now(),
            kind,
            text: text.into(),
        };
        if let Ok(mut chunks) = self.chunks.write() {
            chunks.push(chunk.clone());
            let _ = self.tx.send(chunk.clone());
        }
        chunk
    }

    /// All chunks appended so far, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Chunk> {
        self.chunks.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Atomically snapshot the log and subscribe to future appends.
    ///
    /// The read lock blocks appends for the duration, so the snapshot and
    /// the subscription line up with no gap and no duplicate.
    #[must_use]
    pub fn snapshot_and_subscribe(&self) -> (Vec<Chunk>, broadcast::Receiver<Chunk>) {
        match self.chunks.read() {
            Ok(chunks) => (chunks.clone(), self.tx.subscribe()),
            Err(_) => (Vec::new(), self.tx.subscribe()),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Chunk> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_strictly_increase() {
        let transcript = Transcript::new();
        for i in 0..5 {
            transcript.append(ChunkKind::Output, format!("chunk {i}"));
        }

        let chunks = transcript.snapshot();
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.seq, i as u64);
        }
    }

    #[test]
    fn appends_never_mutate_prior_chunks() {
        let transcript = Transcript::new();
        transcript.append(ChunkKind::System, "first");
        let before = transcript.snapshot();

        transcript.append(ChunkKind::Output, "second");
        let after = transcript.snapshot();

        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(&after[..before.len()], &before[..]);
    }

    #[tokio::test]
    async fn subscribers_receive_chunks_in_append_order() {
        let transcript = Transcript::new();
        let mut rx = transcript.subscribe();

        transcript.append(ChunkKind::Output, "a");
        transcript.append(ChunkKind::Error, "b");

        assert_eq!(rx.recv().await.unwrap().text, "a");
        assert_eq!(rx.recv().await.unwrap().text, "b");
    }

    #[tokio::test]
    async fn snapshot_and_subscribe_has_no_gap_and_no_duplicate() {
        let transcript = Transcript::new();
        transcript.append(ChunkKind::Output, "before 0");
        transcript.append(ChunkKind::Output, "before 1");

        let (snapshot, mut rx) = transcript.snapshot_and_subscribe();
        transcript.append(ChunkKind::Output, "after 2");
        transcript.append(ChunkKind::Output, "after 3");

        let mut seqs: Vec<u64> = snapshot.iter().map(|c| c.seq).collect();
        seqs.push(rx.recv().await.unwrap().seq);
        seqs.push(rx.recv().await.unwrap().seq);
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn clones_share_the_log() {
        let transcript = Transcript::new();
        let clone = transcript.clone();
        transcript.append(ChunkKind::System, "shared");
        assert_eq!(clone.len(), 1);
        assert_eq!(clone.snapshot()[0].text, "shared");
    }
}
