//! Mempool event listener.
//!
//! Every mempool addition gets its own task: fetch the transaction, look
//! for an image inscription, and persist it. Tasks are not tracked or
//! bounded; the listener loop only ever waits on the feed.

use std::sync::Arc;

use bitcoin::Txid;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::CoreError;
use crate::feed::{next_event, EventSource, FeedEvent, MempoolEvent};
use crate::inscription::extract_inscription;
use crate::model::ArtifactMetadata;
use crate::rpc::BitcoinRpc;
use crate::store::{extension_for, ContentStore, WriteOutcome};
use crate::supervisor::Supervisor;
use crate::types::{InscriptionContent, Transaction};
use crate::upload::Uploader;

const PROGRESS_INTERVAL: u64 = 100;

pub struct MempoolListener {
    supervisor: Supervisor,
    store: Arc<ContentStore>,
    uploader: Arc<dyn Uploader>,
}

impl MempoolListener {
    pub fn new(supervisor: Supervisor, store: Arc<ContentStore>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            supervisor,
            store,
            uploader,
        }
    }

    /// Consume `feed` until it finishes.
    pub async fn run<S>(&self, mut feed: S)
    where
        S: EventSource<MempoolEvent>,
    {
        let mut seen: u64 = 0;
        while let Some(event) =
            next_event(&mut feed, MempoolEvent::TOPIC, self.supervisor.backoff()).await
        {
            seen += 1;
            if seen % PROGRESS_INTERVAL == 0 {
                info!(events = seen, "mempool events received");
            }
            self.handle_event(event);
        }
        info!(events = seen, "mempool feed closed");
    }

    /// Spawn a worker for an addition. Removals are ignored.
    pub fn handle_event(&self, event: MempoolEvent) -> Option<JoinHandle<()>> {
        if !event.added {
            trace!(txid = %event.txid, "mempool removal");
            return None;
        }
        let supervisor = self.supervisor.clone();
        let store = Arc::clone(&self.store);
        let uploader = Arc::clone(&self.uploader);
        Some(tokio::spawn(async move {
            process_addition(&supervisor, &store, uploader.as_ref(), event.txid).await;
        }))
    }
}

async fn process_addition(
    supervisor: &Supervisor,
    store: &ContentStore,
    uploader: &dyn Uploader,
    txid: Txid,
) {
    let found = supervisor
        .run("inspect transaction", |rpc| async move {
            find_inscription(rpc.as_ref(), &txid).await
        })
        .await;
    let Some((tx, inscription)) = found else {
        return;
    };

    if !inscription.is_image() {
        debug!(
            txid = %txid,
            content_type = %inscription.content_type,
            "skipping non-image inscription"
        );
        return;
    }

    let extension = extension_for(&inscription.content_type);
    let (tx, inscription) = (&tx, &inscription);
    let outcome = supervisor
        .run("persist inscription", |rpc| async move {
            persist(rpc.as_ref(), store, tx, inscription, extension).await
        })
        .await;

    let txid = txid.to_string();
    if outcome.wrote_both() {
        info!(
            txid = %txid,
            content_type = %inscription.content_type,
            content_length = inscription.content_length,
            "inscription persisted"
        );
        uploader.upload(&txid, &store.paths(&txid, extension));
    } else {
        debug!(
            txid = %txid,
            payload_written = outcome.payload_written,
            metadata_written = outcome.metadata_written,
            "artifact already present"
        );
    }
}

/// The transaction and its inscription, or `None` if either is missing.
async fn find_inscription(
    rpc: &dyn BitcoinRpc,
    txid: &Txid,
) -> Result<Option<(Transaction, InscriptionContent)>, CoreError> {
    let tx = match Transaction::fetch(rpc, txid).await {
        Ok(tx) => tx,
        Err(CoreError::TxNotFound(_)) => {
            debug!(txid = %txid, "transaction left the mempool before it was fetched");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let inscription = extract_inscription(rpc, &tx).await?;
    Ok(inscription.map(|inscription| (tx, inscription)))
}

async fn persist(
    rpc: &dyn BitcoinRpc,
    store: &ContentStore,
    tx: &Transaction,
    inscription: &InscriptionContent,
    extension: &str,
) -> Result<WriteOutcome, CoreError> {
    let fees = tx.fee_summary(rpc).await?;
    let metadata = ArtifactMetadata::new(tx, fees, inscription, OffsetDateTime::now_utc());
    let metadata = serde_json::to_vec_pretty(&metadata)?;
    store
        .write(&tx.txid.to_string(), extension, &inscription.payload, &metadata)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::rpc::mock::{MockFactory, MockRpc};
    use crate::store::ArtifactPaths;
    use crate::test_util::*;

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<(String, ArtifactPaths)>>,
    }

    impl RecordingUploader {
        fn uploads(&self) -> Vec<(String, ArtifactPaths)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    impl Uploader for RecordingUploader {
        fn upload(&self, txid: &str, artifact: &ArtifactPaths) {
            self.uploads
                .lock()
                .unwrap()
                .push((txid.to_owned(), artifact.clone()));
        }
    }

    const SCRIPT_HEX: &str = "20a5ba80e3ac0063036f7264";

    /// A funding transaction plus an inscribing spend of it.
    fn inscription_rpc(content_type: &str, payload: &[u8], failures: usize) -> (MockRpc, Txid) {
        let funding = txid_from_byte(0x10);
        let reveal = txid_from_byte(0xab);
        let input = witness_input(
            funding,
            0,
            vec!["00".repeat(64), SCRIPT_HEX.to_owned(), "c0".to_owned()],
        );
        let rpc = MockRpc::builder()
            .with_tx(make_decoded_tx(funding, vec![], vec![make_output(20_000)]))
            .with_tx(make_decoded_tx(reveal, vec![input], vec![make_output(546)]))
            .with_script(SCRIPT_HEX, &envelope_asm(content_type, payload))
            .with_transient_failures(failures)
            .build();
        (rpc, reveal)
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<ContentStore>,
        uploader: Arc<RecordingUploader>,
        factory: Arc<MockFactory>,
        listener: MempoolListener,
    }

    async fn harness(rpc: MockRpc) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContentStore::open(dir.path()).await.unwrap());
        let uploader = Arc::new(RecordingUploader::default());
        let factory = Arc::new(MockFactory::new(rpc));
        let supervisor = Supervisor::new(factory.clone(), Duration::from_millis(10));
        let listener = MempoolListener::new(supervisor, store.clone(), uploader.clone());
        Harness {
            _dir: dir,
            store,
            uploader,
            factory,
            listener,
        }
    }

    #[tokio::test]
    async fn image_inscription_is_persisted_and_uploaded() {
        let (rpc, txid) = inscription_rpc("image/png", b"\x89PNG-bytes", 0);
        let h = harness(rpc).await;

        h.listener
            .handle_event(MempoolEvent { txid, added: true })
            .expect("additions spawn a worker")
            .await
            .unwrap();

        let paths = h.store.paths(&txid.to_string(), "png");
        assert_eq!(tokio::fs::read(&paths.payload).await.unwrap(), b"\x89PNG-bytes");
        let metadata = tokio::fs::read_to_string(&paths.metadata).await.unwrap();
        assert!(metadata.contains("\"content_type\": \"image/png\""));
        assert!(metadata.contains("\"fee\": 19454"));

        let uploads = h.uploader.uploads();
        assert_eq!(uploads, vec![(txid.to_string(), paths)]);
    }

    #[tokio::test]
    async fn non_image_inscription_is_not_persisted() {
        let (rpc, txid) = inscription_rpc("text/plain;charset=utf-8", b"gm", 0);
        let h = harness(rpc).await;

        h.listener
            .handle_event(MempoolEvent { txid, added: true })
            .unwrap()
            .await
            .unwrap();

        assert!(h.store.persisted_ids().await.unwrap().is_empty());
        assert!(h.uploader.uploads().is_empty());
    }

    #[tokio::test]
    async fn evicted_transaction_is_skipped() {
        let h = harness(MockRpc::builder().build()).await;

        h.listener
            .handle_event(MempoolEvent {
                txid: txid_from_byte(0xee),
                added: true,
            })
            .unwrap()
            .await
            .unwrap();

        assert!(h.store.persisted_ids().await.unwrap().is_empty());
        assert_eq!(h.factory.connects(), 1);
    }

    #[tokio::test]
    async fn transient_rpc_failure_is_retried_on_a_fresh_connection() {
        let (rpc, txid) = inscription_rpc("image/webp", b"RIFF", 1);
        let h = harness(rpc).await;

        h.listener
            .handle_event(MempoolEvent { txid, added: true })
            .unwrap()
            .await
            .unwrap();

        let ids = h.store.persisted_ids().await.unwrap();
        assert!(ids.contains(&txid.to_string()));
        // One reconnect for the failed inspection, one connection to persist.
        assert_eq!(h.factory.connects(), 3);
    }

    #[tokio::test]
    async fn unavailable_funding_tx_persists_without_fee() {
        let reveal = txid_from_byte(0xab);
        let input = witness_input(
            txid_from_byte(0x10),
            0,
            vec!["00".repeat(64), SCRIPT_HEX.to_owned(), "c0".to_owned()],
        );
        let rpc = MockRpc::builder()
            .with_tx(make_decoded_tx(reveal, vec![input], vec![make_output(546)]))
            .with_script(SCRIPT_HEX, &envelope_asm("image/png", b"png"))
            .build();
        let h = harness(rpc).await;

        let handle = h
            .listener
            .handle_event(MempoolEvent {
                txid: reveal,
                added: true,
            })
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker must finish")
            .unwrap();

        let paths = h.store.paths(&reveal.to_string(), "png");
        let metadata: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&paths.metadata).await.unwrap()).unwrap();
        assert!(metadata["total_input"].is_null());
        assert!(metadata["fee"].is_null());
        assert!(metadata["fee_rate"].is_null());
        assert_eq!(metadata["total_output"], 546);
        assert_eq!(h.factory.connects(), 2);
        assert_eq!(h.uploader.uploads().len(), 1);
    }

    #[tokio::test]
    async fn second_worker_for_same_txid_does_not_upload_again() {
        let (rpc, txid) = inscription_rpc("image/gif", b"GIF89a", 0);
        let h = harness(rpc).await;

        for _ in 0..2 {
            h.listener
                .handle_event(MempoolEvent { txid, added: true })
                .unwrap()
                .await
                .unwrap();
        }

        assert_eq!(h.uploader.uploads().len(), 1);
    }

    #[tokio::test]
    async fn removals_spawn_nothing() {
        let h = harness(MockRpc::builder().build()).await;
        let handle = h.listener.handle_event(MempoolEvent {
            txid: txid_from_byte(1),
            added: false,
        });
        assert!(handle.is_none());
        assert_eq!(h.factory.connects(), 0);
    }

    #[tokio::test]
    async fn run_returns_when_feed_closes() {
        let h = harness(MockRpc::builder().build()).await;
        let (tx, rx) = mpsc::channel(4);
        tx.send(MempoolEvent {
            txid: txid_from_byte(2),
            added: false,
        })
        .await
        .unwrap();
        drop(tx);

        h.listener.run(rx).await;
    }
}
