//! Load engine config from file and environment.
//!
//! File: ~/.config/nodecom/config.toml or /etc/nodecom/config.toml.
//! Env overrides: NODECOM_TRANSPORT, NODECOM_HOST, NODECOM_PORT,
//! NODECOM_NODE_ID.

use std::path::PathBuf;

use nodecom_core::{Config, TransportKind};

/// Load config: default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("NODECOM_TRANSPORT") {
        if let Some(kind) = parse_transport(&s) {
            c.transport = kind;
        }
    }
    if let Ok(s) = std::env::var("NODECOM_HOST") {
        if !s.is_empty() {
            c.host_address = s;
        }
    }
    if let Ok(s) = std::env::var("NODECOM_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Ok(s) = std::env::var("NODECOM_NODE_ID") {
        if let Ok(id) = s.parse::<u8>() {
            c.node_id = id;
        }
    }
    c
}

fn parse_transport(s: &str) -> Option<TransportKind> {
    match s.to_ascii_lowercase().as_str() {
        "rpc" => Some(TransportKind::Rpc),
        "datagram" | "udp" => Some(TransportKind::Datagram),
        "stream" | "tcp" => Some(TransportKind::Stream),
        _ => None,
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nodecom/config.toml"));
    }
    out.push(PathBuf::from("/etc/nodecom/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
