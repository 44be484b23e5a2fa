pub mod enrich;
pub mod error;
pub mod feed;
pub mod inscription;
pub mod listener;
pub mod model;
pub mod reconciler;
pub mod rpc;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::CoreError;
pub use feed::{BlockEvent, MempoolEvent, ZmqFeed};
pub use listener::MempoolListener;
pub use reconciler::{prune_evicted, BlockReconciler};
pub use store::ContentStore;
pub use supervisor::Supervisor;
pub use types::InscriptionContent;
