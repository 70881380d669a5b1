// nodecom daemon: threaded engine plus a small stdin shim standing in for
// the host application. Commands: `send <node> <text>`, `peers`, `quit`.

mod config;

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use nodecom_core::{Engine, NodeId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("nodecom-node {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    info!(
        transport = ?cfg.transport,
        node = cfg.node_id,
        endpoint = %cfg.bind_endpoint(),
        peers = cfg.peers.len(),
        "starting engine"
    );
    let engine = Engine::new(&cfg).context("engine construction failed")?;
    let mut handle = engine.start();
    let driver = handle.driver();

    // Receive pump: surface every delivered frame until shutdown.
    let stop = Arc::new(AtomicBool::new(false));
    let pump_stop = stop.clone();
    let rx = handle.driver();
    let pump = std::thread::spawn(move || {
        while !pump_stop.load(Ordering::SeqCst) {
            if let Some((payload, sender)) = rx.receive() {
                info!(
                    %sender,
                    bytes = payload.len(),
                    text = %String::from_utf8_lossy(&payload),
                    "frame received"
                );
            }
        }
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if line == "peers" {
            for (id, state) in handle.peer_states() {
                info!(peer = %id, state = ?state, "peer");
            }
        } else if let Some(rest) = line.strip_prefix("send ") {
            match parse_send(rest) {
                Some((node, text)) => {
                    if let Err(error) = driver.send(text.as_bytes(), node) {
                        warn!(%error, "send rejected");
                    }
                }
                None => warn!("usage: send <node> <text>"),
            }
        } else {
            warn!(%line, "unknown command (send <node> <text> | peers | quit)");
        }
    }

    stop.store(true, Ordering::SeqCst);
    let _ = pump.join();
    handle.shutdown();
    Ok(())
}

fn parse_send(rest: &str) -> Option<(NodeId, &str)> {
    let (node, text) = rest.split_once(' ')?;
    let node: u8 = node.parse().ok()?;
    Some((NodeId(node), text))
}
