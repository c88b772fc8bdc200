use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::scope::RenderOptions;
use crate::server::ServerOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub snapshot_ttl: Duration,
    pub reload_snapshot_ttl: Duration,
    pub handler_grace: Duration,
    pub sweep_interval: Duration,
    /// Snapshots live in memory when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// Component rendered at `/`.
    pub root_component: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("WEFT_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("WEFT_LISTEN_ADDR must be a socket address")?;

        let log_level = var("WEFT_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let snapshot_ttl = Duration::from_secs(parse_or(&var, "WEFT_SNAPSHOT_TTL_SECS", 3600)?);
        let reload_snapshot_ttl =
            Duration::from_secs(parse_or(&var, "WEFT_RELOAD_SNAPSHOT_TTL_SECS", 300)?);
        let handler_grace = Duration::from_millis(parse_or(&var, "WEFT_HANDLER_GRACE_MS", 10_000)?);
        let sweep_interval = Duration::from_secs(parse_or(&var, "WEFT_SNAPSHOT_SWEEP_SECS", 60)?);
        if sweep_interval.is_zero() {
            anyhow::bail!("WEFT_SNAPSHOT_SWEEP_SECS must be positive");
        }

        let snapshot_dir = var("WEFT_SNAPSHOT_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        let root_component = var("WEFT_ROOT_COMPONENT").unwrap_or_else(|| "Counter".to_string());

        Ok(Self {
            listen_addr,
            log_level,
            snapshot_ttl,
            reload_snapshot_ttl,
            handler_grace,
            sweep_interval,
            snapshot_dir,
            root_component,
        })
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            snapshot_ttl: self.snapshot_ttl,
            reload_snapshot_ttl: self.reload_snapshot_ttl,
            render: RenderOptions {
                handler_grace: self.handler_grace,
            },
        }
    }
}

fn parse_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.snapshot_ttl, Duration::from_secs(3600));
        assert_eq!(config.reload_snapshot_ttl, Duration::from_secs(300));
        assert_eq!(config.handler_grace, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.snapshot_dir, None);
        assert_eq!(config.root_component, "Counter");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("WEFT_HANDLER_GRACE_MS", "250"),
            ("WEFT_SNAPSHOT_DIR", "/tmp/weft"),
            ("WEFT_ROOT_COMPONENT", "NameForm"),
        ])
        .unwrap();
        assert_eq!(config.server_options().render.handler_grace, Duration::from_millis(250));
        assert_eq!(config.snapshot_dir, Some(PathBuf::from("/tmp/weft")));
        assert_eq!(config.root_component, "NameForm");
    }

    #[test]
    fn test_invalid_number_rejected() {
        assert!(config(&[("WEFT_SNAPSHOT_TTL_SECS", "soon")]).is_err());
        assert!(config(&[("WEFT_LISTEN_ADDR", "nowhere")]).is_err());
        assert!(config(&[("WEFT_SNAPSHOT_SWEEP_SECS", "0")]).is_err());
    }
}
