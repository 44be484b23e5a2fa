//! Keeping the content store limited to unconfirmed inscriptions.
//!
//! [`BlockReconciler`] deletes artifacts as their transactions are mined.
//! [`prune_evicted`] is the one-shot sweep for artifacts whose transactions
//! left the mempool some other way (replaced, expired, or mined while the
//! block feed was not being watched).

use std::collections::HashSet;
use std::sync::Arc;

use bitcoin::BlockHash;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::feed::{next_event, BlockEvent, EventSource, FeedEvent};
use crate::rpc::BitcoinRpc;
use crate::store::ContentStore;
use crate::supervisor::Supervisor;

pub struct BlockReconciler {
    supervisor: Supervisor,
    store: Arc<ContentStore>,
}

impl BlockReconciler {
    pub fn new(supervisor: Supervisor, store: Arc<ContentStore>) -> Self {
        Self { supervisor, store }
    }

    /// Consume `feed` until it finishes. Blocks are handled one at a time.
    pub async fn run<S>(&self, mut feed: S)
    where
        S: EventSource<BlockEvent>,
    {
        while let Some(event) =
            next_event(&mut feed, BlockEvent::TOPIC, self.supervisor.backoff()).await
        {
            self.handle_event(event).await;
        }
        info!("block feed closed");
    }

    pub async fn handle_event(&self, event: BlockEvent) -> Vec<String> {
        let store = self.store.as_ref();
        let block_hash = event.block_hash;
        let reconciled = self
            .supervisor
            .run("reconcile block", |rpc| async move {
                reconcile_block(rpc.as_ref(), store, &block_hash).await
            })
            .await;
        if reconciled.is_empty() {
            debug!(block_hash = %block_hash, "no persisted inscriptions in block");
        } else {
            info!(
                block_hash = %block_hash,
                count = reconciled.len(),
                txids = ?reconciled,
                "removed mined inscriptions"
            );
        }
        reconciled
    }
}

/// Delete the artifacts of every persisted transaction mined in
/// `block_hash`. Returns the txids whose files were deleted.
pub async fn reconcile_block(
    rpc: &dyn BitcoinRpc,
    store: &ContentStore,
    block_hash: &BlockHash,
) -> Result<Vec<String>, CoreError> {
    let block = rpc.get_block(block_hash).await?;
    let persisted = store.persisted_ids().await?;
    debug!(
        block_hash = %block_hash,
        height = %block.height,
        txs = block.txids.len(),
        persisted = persisted.len(),
        "reconciling block"
    );

    let mut reconciled = Vec::new();
    for txid in block.txids.iter().map(ToString::to_string) {
        if persisted.contains(&txid) {
            store.delete(&txid).await?;
            reconciled.push(txid);
        }
    }
    Ok(reconciled)
}

/// Delete the artifacts of every persisted transaction that is no longer in
/// the node's mempool. Returns the pruned txids, sorted.
pub async fn prune_evicted(
    rpc: &dyn BitcoinRpc,
    store: &ContentStore,
) -> Result<Vec<String>, CoreError> {
    let mempool: HashSet<String> = rpc
        .get_raw_mempool()
        .await?
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut evicted: Vec<String> = store
        .persisted_ids()
        .await?
        .into_iter()
        .filter(|txid| !mempool.contains(txid))
        .collect();
    evicted.sort();

    for txid in &evicted {
        store.delete(txid).await?;
    }
    if !evicted.is_empty() {
        info!(count = evicted.len(), "pruned artifacts no longer in the mempool");
    }
    Ok(evicted)
}
