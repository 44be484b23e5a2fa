mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, WrapErr};

use ordwatch_core::feed::ZmqFeed;
use ordwatch_core::inscription::extract_inscription;
use ordwatch_core::rpc::{BitcoinRpc, HttpRpcConfig, HttpRpcFactory, RpcFactory};
use ordwatch_core::store::extension_for;
use ordwatch_core::types::Transaction;
use ordwatch_core::upload::{CommandUploader, NoopUploader, Uploader};
use ordwatch_core::{
    prune_evicted, BlockEvent, BlockReconciler, ContentStore, MempoolEvent, MempoolListener,
    Supervisor,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let config = HttpRpcConfig {
        url: args.rpc.rpc_url.clone(),
        user: args.rpc.rpc_user.clone(),
        pass: args.rpc.rpc_pass.clone(),
        cookie_file: args.rpc.rpc_cookie_file.clone(),
        requests_per_second: args.rpc.rpc_requests_per_second,
    };
    let factory: Arc<dyn RpcFactory> =
        Arc::new(HttpRpcFactory::new(config).context("configure Bitcoin Core RPC client")?);

    // Check the node is reachable before subscribing to anything.
    let rpc = factory.connect().context("open Bitcoin Core RPC client")?;
    let chain_info = rpc.get_blockchain_info().await.map_err(|err| {
        let message = format_rpc_connect_error(&args.rpc.rpc_url, &err.to_string());
        eyre!(message).wrap_err("while attempting to connect to Bitcoin Core RPC")
    })?;

    tracing::info!(
        chain = %chain_info.chain,
        blocks = chain_info.blocks,
        "connected to Bitcoin Core"
    );
    if chain_info.pruned {
        tracing::warn!("node is pruned; resolving input values may fail for old funding transactions");
    }

    let store = Arc::new(
        ContentStore::open(&args.output_dir)
            .await
            .with_context(|| format!("open output directory {}", args.output_dir.display()))?,
    );
    let supervisor = Supervisor::new(factory, Duration::from_millis(args.retry_backoff_ms));

    let feeds = &args.feeds;
    match args.command.unwrap_or(cli::Command::Run) {
        cli::Command::Run => {
            prepare(rpc.as_ref(), &store, feeds).await?;
            let mempool = mempool_feed(feeds).await?;
            let blocks = block_feed(feeds).await?;
            let listener = MempoolListener::new(supervisor.clone(), store.clone(), uploader(feeds));
            let reconciler = BlockReconciler::new(supervisor, store);
            until_ctrl_c(async {
                tokio::join!(listener.run(mempool), reconciler.run(blocks));
            })
            .await
        }
        cli::Command::Mempool => {
            prepare(rpc.as_ref(), &store, feeds).await?;
            let mempool = mempool_feed(feeds).await?;
            let listener = MempoolListener::new(supervisor, store, uploader(feeds));
            until_ctrl_c(listener.run(mempool)).await
        }
        cli::Command::Blocks => {
            prepare(rpc.as_ref(), &store, feeds).await?;
            let blocks = block_feed(feeds).await?;
            let reconciler = BlockReconciler::new(supervisor, store);
            until_ctrl_c(reconciler.run(blocks)).await
        }
        cli::Command::Prune => {
            let pruned = prune_evicted(rpc.as_ref(), &store)
                .await
                .context("prune evicted artifacts")?;
            println!("pruned {} artifact(s)", pruned.len());
            for txid in pruned {
                println!("  {txid}");
            }
            Ok(())
        }
        cli::Command::Decode { txid } => decode(rpc.as_ref(), &txid).await,
    }
}

/// Startup work shared by the long-running subcommands.
async fn prepare(
    rpc: &dyn BitcoinRpc,
    store: &ContentStore,
    feeds: &cli::FeedArgs,
) -> eyre::Result<()> {
    if feeds.prune_on_start {
        let pruned = prune_evicted(rpc, store)
            .await
            .context("prune evicted artifacts")?;
        tracing::info!(count = pruned.len(), "startup prune finished");
    }
    Ok(())
}

async fn mempool_feed(feeds: &cli::FeedArgs) -> eyre::Result<ZmqFeed<MempoolEvent>> {
    let feed = ZmqFeed::connect(&feeds.zmq_sequence)
        .await
        .with_context(|| format!("subscribe to ZMQ sequence feed at {}", feeds.zmq_sequence))?;
    Ok(feed.with_idle_timeout(Duration::from_secs(feeds.zmq_idle_timeout_secs)))
}

async fn block_feed(feeds: &cli::FeedArgs) -> eyre::Result<ZmqFeed<BlockEvent>> {
    let feed = ZmqFeed::connect(&feeds.zmq_hashblock)
        .await
        .with_context(|| format!("subscribe to ZMQ hashblock feed at {}", feeds.zmq_hashblock))?;
    Ok(feed.with_idle_timeout(Duration::from_secs(feeds.zmq_idle_timeout_secs)))
}

fn uploader(feeds: &cli::FeedArgs) -> Arc<dyn Uploader> {
    match &feeds.upload_command {
        Some(program) => Arc::new(CommandUploader::new(program, feeds.upload_args.clone())),
        None => Arc::new(NoopUploader),
    }
}

/// Drive `work` until it finishes or the process is interrupted.
async fn until_ctrl_c(work: impl std::future::Future<Output = ()>) -> eyre::Result<()> {
    tokio::select! {
        () = work => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    }
}

async fn decode(rpc: &dyn BitcoinRpc, txid: &bitcoin::Txid) -> eyre::Result<()> {
    let tx = Transaction::fetch(rpc, txid)
        .await
        .with_context(|| format!("fetch transaction {txid}"))?;
    let inscription = extract_inscription(rpc, &tx)
        .await
        .context("decode witness script")?;

    println!("txid:      {}", tx.txid);
    match &tx.block {
        Some(block) => println!(
            "block:     {} at height {} ({})",
            block.block_hash,
            block.block_height,
            block.datetime().unwrap_or_default()
        ),
        None => println!("block:     unconfirmed"),
    }
    println!("size:      {} bytes, {} vbytes", tx.size, tx.vsize);

    let Some(inscription) = inscription else {
        println!("inscription: none");
        return Ok(());
    };
    println!("inscription:");
    println!("  content type:   {}", inscription.content_type);
    println!("  content length: {}", inscription.content_length);
    println!("  content hash:   {}", inscription.content_hash);
    if inscription.is_image() {
        println!(
            "  would persist:  {}.{}",
            tx.txid,
            extension_for(&inscription.content_type)
        );
    } else {
        println!("  would persist:  no (not an image)");
    }
    Ok(())
}

fn format_rpc_connect_error(rpc_url: &str, source_error: &str) -> String {
    let mut lines = vec![
        format!("could not connect to RPC endpoint `{rpc_url}`"),
        format!("RPC error: {source_error}"),
    ];

    if source_error.contains("Could not resolve host") || source_error.contains("dns error") {
        lines.push(
            "hint: hostname resolution failed; verify the endpoint hostname and your DNS/network"
                .into(),
        );
    } else if source_error.contains("Connection refused") || source_error.contains("tcp connect") {
        lines.push(
            "hint: nothing is listening there; check that bitcoind is running with -server=1 and the rpcport"
                .into(),
        );
    } else if source_error.contains("401") || source_error.contains("403") {
        lines.push(
            "hint: authentication failed; verify --rpc-user/--rpc-pass or --rpc-cookie-file".into(),
        );
    } else if source_error.contains("error sending request for url") {
        lines.push("hint: request could not be sent; verify URL format, network access, and endpoint reachability".into());
    }

    lines.join("\n")
}
