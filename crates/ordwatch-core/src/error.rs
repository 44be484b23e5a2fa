use std::error::Error as _;

use bitcoin::Txid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("notification feed failure: {0}")]
    Feed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl CoreError {
    /// Whether this error is the node dropping the connection under us
    /// (reset or broken pipe), as opposed to anything more interesting.
    pub fn is_connection_reset(&self) -> bool {
        match self {
            Self::Io(err) => is_reset_kind(err.kind()),
            Self::Rpc(RpcError::Transport(err)) => {
                let mut source = err.source();
                while let Some(cause) = source {
                    if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                        if is_reset_kind(io.kind()) {
                            return true;
                        }
                    }
                    if mentions_reset(&cause.to_string()) {
                        return true;
                    }
                    source = cause.source();
                }
                mentions_reset(&err.to_string())
            }
            other => mentions_reset(&other.to_string()),
        }
    }
}

fn is_reset_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionAborted
    )
}

fn mentions_reset(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    // hyper reports a keep-alive connection dropped by the node as
    // "connection closed before message completed".
    msg.contains("broken pipe")
        || msg.contains("connection reset")
        || msg.contains("connection closed before message completed")
}
