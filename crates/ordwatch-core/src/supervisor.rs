//! Retry/reconnect wrapper for RPC-dependent units of work.
//!
//! A unit of work receives a fresh [`BitcoinRpc`] handle. If it fails, the
//! handle is dropped, the supervisor sleeps for the backoff, connects again,
//! and reruns the whole unit. There is no attempt limit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::CoreError;
use crate::rpc::{BitcoinRpc, RpcFactory};

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Supervisor {
    factory: Arc<dyn RpcFactory>,
    backoff: Duration,
}

impl Supervisor {
    pub fn new(factory: Arc<dyn RpcFactory>, backoff: Duration) -> Self {
        Self { factory, backoff }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it succeeds, reconnecting before every attempt.
    ///
    /// `op` must be safe to repeat from the start: a retry reruns every
    /// RPC call the failed attempt already made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> T
    where
        F: FnMut(Arc<dyn BitcoinRpc>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        loop {
            let result = match self.factory.connect() {
                Ok(rpc) => op(rpc).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(value) => return value,
                Err(err) if err.is_connection_reset() => {
                    warn!(label, error = %err, "connection dropped, reconnecting");
                }
                Err(err) => {
                    error!(label, error = ?err, "unit of work failed, retrying");
                }
            }
            tokio::time::sleep(self.backoff).await;
        }
    }
}
