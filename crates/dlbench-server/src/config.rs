use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use dlbench_core::{DEFAULT_ASYNC_CHUNK_SIZE, DEFAULT_CHUNK_SIZE};

/// Server settings, read from `DLBENCH_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Flat read-only directory files are served from.
    pub root: PathBuf,
    /// Bounded worker pool size.
    pub workers: usize,
    /// Carrier threads behind the lightweight pool.
    pub carriers: usize,
    /// Event-loop (tokio worker) threads.
    pub event_loops: usize,
    pub chunk_size: usize,
    pub async_chunk_size: usize,
    /// How long a blocking stream waits on a client that stopped reading.
    pub stall_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cores = cores();
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            root: "./files".into(),
            workers: cores * 2,
            carriers: cores,
            event_loops: cores,
            chunk_size: DEFAULT_CHUNK_SIZE,
            async_chunk_size: DEFAULT_ASYNC_CHUNK_SIZE,
            stall_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            host: lookup("DLBENCH_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "DLBENCH_PORT", defaults.port)?,
            root: lookup("DLBENCH_ROOT").map(PathBuf::from).unwrap_or(defaults.root),
            workers: positive(&lookup, "DLBENCH_WORKERS", defaults.workers)?,
            carriers: positive(&lookup, "DLBENCH_CARRIERS", defaults.carriers)?,
            event_loops: positive(&lookup, "DLBENCH_EVENT_LOOPS", defaults.event_loops)?,
            chunk_size: positive(&lookup, "DLBENCH_CHUNK_SIZE", defaults.chunk_size)?,
            async_chunk_size: positive(&lookup, "DLBENCH_ASYNC_CHUNK_SIZE", defaults.async_chunk_size)?,
            stall_timeout: Duration::from_secs(positive(
                &lookup,
                "DLBENCH_STALL_TIMEOUT_SECS",
                defaults.stall_timeout.as_secs(),
            )?),
        };
        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + From<u8>,
    T::Err: Display,
{
    let value = parse_or(lookup, key, default)?;
    if value == T::from(0) {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}
