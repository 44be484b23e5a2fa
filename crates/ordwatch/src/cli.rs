use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ordwatch: watches the mempool for image inscriptions and keeps a
/// directory of unconfirmed ones in sync with the chain.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(flatten)]
    pub rpc: RpcArgs,

    /// Directory that holds the pending inscription artifacts.
    #[arg(long, default_value = "pictures", env = "ORDWATCH_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Delay between retries after a failed RPC unit of work or feed receive.
    #[arg(long, default_value = "1000", env = "ORDWATCH_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,

    #[command(flatten)]
    pub feeds: FeedArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args)]
pub struct RpcArgs {
    /// Bitcoin Core RPC URL.
    #[arg(long, default_value = "http://127.0.0.1:8332", env = "ORDWATCH_RPC_URL")]
    pub rpc_url: String,

    /// RPC username.
    #[arg(long, env = "ORDWATCH_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "ORDWATCH_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Path to the node's `.cookie` file, used when no user/pass is given.
    #[arg(long, env = "ORDWATCH_RPC_COOKIE_FILE")]
    pub rpc_cookie_file: Option<PathBuf>,

    /// Client-side cap on RPC requests per second, per connection.
    #[arg(long, env = "ORDWATCH_RPC_REQUESTS_PER_SECOND")]
    pub rpc_requests_per_second: Option<u32>,
}

/// Settings for the long-running subcommands. They are global so that a
/// bare `ordwatch` (an implicit `run`) honours them too.
#[derive(Args)]
pub struct FeedArgs {
    /// ZMQ endpoint publishing the `sequence` topic.
    #[arg(
        long,
        global = true,
        default_value = "tcp://127.0.0.1:28332",
        env = "ORDWATCH_ZMQ_SEQUENCE"
    )]
    pub zmq_sequence: String,

    /// ZMQ endpoint publishing the `hashblock` topic.
    #[arg(
        long,
        global = true,
        default_value = "tcp://127.0.0.1:28332",
        env = "ORDWATCH_ZMQ_HASHBLOCK"
    )]
    pub zmq_hashblock: String,

    /// Reconnect a ZMQ feed after this many seconds without a message.
    #[arg(
        long,
        global = true,
        default_value = "300",
        env = "ORDWATCH_ZMQ_IDLE_TIMEOUT_SECS"
    )]
    pub zmq_idle_timeout_secs: u64,

    /// Command run for each new artifact as `<command> <args...> <payload> <metadata>`.
    #[arg(long, global = true, env = "ORDWATCH_UPLOAD_COMMAND")]
    pub upload_command: Option<String>,

    /// Extra arguments passed to the upload command before the file paths (repeatable).
    #[arg(long = "upload-arg", global = true, allow_hyphen_values = true)]
    pub upload_args: Vec<String>,

    /// Prune artifacts whose transactions left the mempool before listening.
    #[arg(long, global = true, env = "ORDWATCH_PRUNE_ON_START")]
    pub prune_on_start: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the mempool listener and the block reconciler together (default).
    Run,
    /// Run only the mempool listener.
    Mempool,
    /// Run only the block reconciler.
    Blocks,
    /// Delete artifacts whose transactions are no longer in the mempool, then exit.
    Prune,
    /// Fetch one transaction and print its inscription summary.
    Decode {
        /// Transaction id to inspect.
        txid: bitcoin::Txid,
    },
}
