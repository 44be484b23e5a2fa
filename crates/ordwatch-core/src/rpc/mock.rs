use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};

use crate::error::CoreError;
use crate::types::BlockHeight;

use super::types::{BlockInfo, ChainInfo, DecodedTx};
use super::{BitcoinRpc, RpcFactory};

/// A mock Bitcoin RPC backend for testing. Returns canned data populated
/// via the builder pattern. Clones share state, so a [`MockFactory`] can
/// hand out many "connections" to the same node.
#[derive(Clone)]
pub struct MockRpc {
    state: Arc<MockState>,
}

struct MockState {
    transactions: HashMap<Txid, DecodedTx>,
    tx_blocks: HashMap<Txid, BlockHash>,
    blocks: HashMap<BlockHash, BlockInfo>,
    scripts: HashMap<String, String>,
    mempool: HashSet<Txid>,
    chain_info: ChainInfo,
    transient_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl MockRpc {
    pub fn builder() -> MockRpcBuilder {
        MockRpcBuilder {
            transactions: HashMap::new(),
            tx_blocks: HashMap::new(),
            blocks: HashMap::new(),
            scripts: HashMap::new(),
            mempool: HashSet::new(),
            chain_info: ChainInfo {
                chain: "regtest".into(),
                blocks: 100,
                best_block_hash: BlockHash::all_zeros(),
                pruned: false,
            },
            transient_failures: 0,
        }
    }

    /// Total RPC calls served, failed ones included.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), CoreError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.state.transient_failures.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        match remaining {
            Ok(_) => Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            Err(_) => Ok(()),
        }
    }
}

pub struct MockRpcBuilder {
    transactions: HashMap<Txid, DecodedTx>,
    tx_blocks: HashMap<Txid, BlockHash>,
    blocks: HashMap<BlockHash, BlockInfo>,
    scripts: HashMap<String, String>,
    mempool: HashSet<Txid>,
    chain_info: ChainInfo,
    transient_failures: usize,
}

impl MockRpcBuilder {
    /// Register a mempool transaction.
    pub fn with_tx(mut self, tx: DecodedTx) -> Self {
        self.mempool.insert(tx.txid);
        self.transactions.insert(tx.txid, tx);
        self
    }

    /// Register a block, marking each listed transaction that is also known
    /// to the mock as confirmed in it.
    pub fn with_block(mut self, block: BlockInfo) -> Self {
        for txid in &block.txids {
            self.tx_blocks.insert(*txid, block.hash);
            self.mempool.remove(txid);
        }
        self.blocks.insert(block.hash, block);
        self
    }

    /// Register the `asm` that `decodescript` returns for `script_hex`.
    pub fn with_script(mut self, script_hex: &str, asm: &str) -> Self {
        self.scripts.insert(script_hex.to_owned(), asm.to_owned());
        self
    }

    /// Replace the mempool contents.
    pub fn with_mempool(mut self, txids: impl IntoIterator<Item = Txid>) -> Self {
        self.mempool = txids.into_iter().collect();
        self
    }

    /// Fail the next `n` calls with a connection reset.
    pub fn with_transient_failures(mut self, n: usize) -> Self {
        self.transient_failures = n;
        self
    }

    pub fn build(self) -> MockRpc {
        MockRpc {
            state: Arc::new(MockState {
                transactions: self.transactions,
                tx_blocks: self.tx_blocks,
                blocks: self.blocks,
                scripts: self.scripts,
                mempool: self.mempool,
                chain_info: self.chain_info,
                transient_failures: AtomicUsize::new(self.transient_failures),
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

#[async_trait]
impl BitcoinRpc for MockRpc {
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<String, CoreError> {
        self.maybe_fail()?;
        // The "raw hex" is just the txid; `decode_raw_transaction` reverses it.
        if self.state.transactions.contains_key(txid) {
            Ok(txid.to_string())
        } else {
            Err(CoreError::TxNotFound(*txid))
        }
    }

    async fn decode_raw_transaction(&self, raw_hex: &str) -> Result<DecodedTx, CoreError> {
        self.maybe_fail()?;
        let txid: Txid = raw_hex
            .parse()
            .map_err(|e| CoreError::InvalidTxData(format!("mock raw tx: {e}")))?;
        self.state
            .transactions
            .get(&txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(txid))
    }

    async fn get_transaction_block_hash(
        &self,
        txid: &Txid,
    ) -> Result<Option<BlockHash>, CoreError> {
        self.maybe_fail()?;
        if !self.state.transactions.contains_key(txid) {
            return Err(CoreError::TxNotFound(*txid));
        }
        Ok(self.state.tx_blocks.get(txid).copied())
    }

    async fn decode_script(&self, script_hex: &str) -> Result<String, CoreError> {
        self.maybe_fail()?;
        self.state
            .scripts
            .get(script_hex)
            .cloned()
            .ok_or_else(|| CoreError::InvalidTxData("mock: unknown script".into()))
    }

    async fn get_block(&self, block_hash: &BlockHash) -> Result<BlockInfo, CoreError> {
        self.maybe_fail()?;
        self.state
            .blocks
            .get(block_hash)
            .cloned()
            .ok_or_else(|| CoreError::InvalidTxData(format!("mock: unknown block {block_hash}")))
    }

    async fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, CoreError> {
        self.maybe_fail()?;
        self.state
            .blocks
            .values()
            .find(|block| block.height == height)
            .map(|block| block.hash)
            .ok_or_else(|| CoreError::InvalidTxData(format!("mock: no block at {height}")))
    }

    async fn get_raw_mempool(&self) -> Result<HashSet<Txid>, CoreError> {
        self.maybe_fail()?;
        Ok(self.state.mempool.clone())
    }

    async fn get_blockchain_info(&self) -> Result<ChainInfo, CoreError> {
        self.maybe_fail()?;
        Ok(self.state.chain_info.clone())
    }
}

/// An [`RpcFactory`] over a shared [`MockRpc`] that counts connections.
pub struct MockFactory {
    rpc: MockRpc,
    connects: AtomicUsize,
}

impl MockFactory {
    pub fn new(rpc: MockRpc) -> Self {
        Self {
            rpc,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn rpc(&self) -> &MockRpc {
        &self.rpc
    }
}

impl RpcFactory for MockFactory {
    fn connect(&self) -> Result<Arc<dyn BitcoinRpc>, CoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.rpc.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn confirmed_tx_reports_its_block_and_leaves_mempool() {
        let txid = txid_from_byte(1);
        let block = make_block(7, 800_000, vec![txid]);
        let rpc = MockRpc::builder()
            .with_tx(make_decoded_tx(txid, vec![], vec![make_output(1000)]))
            .with_block(block.clone())
            .build();

        let hash = rpc.get_transaction_block_hash(&txid).await.unwrap();
        assert_eq!(hash, Some(block.hash));
        assert!(rpc.get_raw_mempool().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_consumed_in_order() {
        let rpc = MockRpc::builder().with_transient_failures(2).build();
        assert!(rpc.get_blockchain_info().await.is_err());
        assert!(rpc.get_blockchain_info().await.is_err());
        assert!(rpc.get_blockchain_info().await.is_ok());
        assert_eq!(rpc.calls(), 3);
    }
}
