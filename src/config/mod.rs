use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::protocol::{DEFAULT_DAEMON_PORT, DEFAULT_MANAGER_PORT, DEFAULT_MAX_FILE_SIZE};

/// Configuration for the request daemon and its upload workers
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the request daemon binds
    pub listen_addr: SocketAddr,
    /// Where status notifications are sent
    pub manager_addr: SocketAddr,
    /// Largest file accepted for upload, in bytes
    pub max_file_size: u64,
    /// JSON credential file, re-read before every upload
    pub credentials_path: PathBuf,
    /// Remote directory uploads land in
    pub remote_prefix: String,
    /// Root directory of the local mirror backend
    pub mirror_dir: PathBuf,
    /// Upper bound on concurrently running uploads; `None` means unbounded
    pub max_concurrent_uploads: Option<usize>,
    /// How long shutdown waits for in-flight uploads before abandoning them
    pub drain_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env_parse("UPLOADQ_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            manager_addr: env_parse("UPLOADQ_MANAGER_ADDR").unwrap_or(defaults.manager_addr),
            max_file_size: env_parse("UPLOADQ_MAX_FILE_SIZE").unwrap_or(defaults.max_file_size),
            credentials_path: env::var("UPLOADQ_CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            remote_prefix: env::var("UPLOADQ_REMOTE_PREFIX").unwrap_or(defaults.remote_prefix),
            mirror_dir: env::var("UPLOADQ_MIRROR_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.mirror_dir),
            max_concurrent_uploads: env_parse::<usize>("UPLOADQ_MAX_CONCURRENT")
                .map(|n| (n > 0).then_some(n))
                .unwrap_or(defaults.max_concurrent_uploads),
            drain_timeout: env_parse("UPLOADQ_DRAIN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.drain_timeout),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_DAEMON_PORT)),
            manager_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_MANAGER_PORT)),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            credentials_path: PathBuf::from(".uploadq_credentials.json"),
            remote_prefix: "/pws/".to_string(),
            mirror_dir: PathBuf::from("mirror"),
            max_concurrent_uploads: None,
            drain_timeout: Duration::ZERO,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
