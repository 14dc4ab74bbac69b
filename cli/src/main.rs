//! pascfeed CLI: follow a PascalCoin node and stream its events over WebSocket.
//!
//! Usage:
//! ```bash
//! # Run the feed against a local node
//! pascfeed run --node http://127.0.0.1:4003 --listen 0.0.0.0:1337
//!
//! # Run from a JSON config file
//! pascfeed run --config pascfeed.json
//!
//! # Check that the node answers
//! pascfeed info --node http://127.0.0.1:4003
//! ```

mod config;
mod tracing_setup;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use pascfeed_core::{Channel, ListenerBuilder, NodeClient};
use pascfeed_rpc::{HttpClientConfig, HttpNodeClient};
use pascfeed_server::FeedServer;

use crate::config::AppConfig;
use crate::tracing_setup::init_tracing;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "info" => cmd_info(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("pascfeed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("pascfeed {}", env!("CARGO_PKG_VERSION"));
    println!("Stream PascalCoin blocks, operations and account events to WebSocket clients\n");
    println!("USAGE:");
    println!("    pascfeed <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    run      Follow the node and serve subscribers");
    println!("    info     Query the node head and print the effective configuration");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("FLAGS:");
    println!("    --config <PATH>      JSON configuration file");
    println!("    --node <URL>         Node JSON-RPC endpoint  [default: http://127.0.0.1:4003]");
    println!("    --listen <ADDR>      WebSocket listen address  [default: 127.0.0.1:1337]");
    println!("    --log-level <LEVEL>  trace | debug | info | warn | error");
    println!("    --json-logs          Emit JSON structured logs");
}

fn node_client(config: &AppConfig) -> anyhow::Result<Arc<HttpNodeClient>> {
    let client = HttpNodeClient::new(config.node_url.as_str(), HttpClientConfig::default())
        .context("building node client")?;
    Ok(Arc::new(client))
}

async fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    let config = AppConfig::from_args(args)?;
    init_tracing(&config.log);
    tracing::info!(node = %config.node_url, listen = %config.server.listen_addr, "starting pascfeed");

    let client = node_client(&config)?;
    let channel = Arc::new(Channel::new(config.channel.clone()));
    let server = FeedServer::bind(config.server.clone(), Arc::clone(&channel))
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    let listener = ListenerBuilder::from_config(config.listener.clone(), config.cache.clone())
        .build(client, channel);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(async move {
        let _ = stop_rx.changed().await;
    }));

    let result = listener
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await;

    let _ = stop_tx.send(true);
    match server_task.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "server stopped with error"),
        Err(e) => tracing::warn!(error = %e, "server task panicked"),
        Ok(Ok(())) => {}
    }

    result.context("listener terminated")
}

async fn cmd_info(args: &[String]) -> anyhow::Result<()> {
    let config = AppConfig::from_args(args)?;
    let client = node_client(&config)?;

    println!("pascfeed v{}", env!("CARGO_PKG_VERSION"));
    println!("  Node:              {}", config.node_url);
    match client.block_count().await.context("querying block count")? {
        Some(count) if count > 0 => println!("  Head block:        {}", count - 1),
        _ => println!("  Head block:        (none)"),
    }
    println!("  Listen address:    {}", config.server.listen_addr);
    println!("  Poll interval:     {}ms", config.listener.poll_interval_ms);
    println!("  Bootstrap blocks:  {}", config.listener.bootstrap_blocks);
    println!("  Max snapshot:      {} blocks", config.channel.max_snapshot_blocks);
    Ok(())
}
