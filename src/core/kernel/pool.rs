use crate::core::config::{ConfigError, ConnectionOptions};
use crate::core::errors::{TwitterError, TwitterResult};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Settings that require a distinct underlying HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    proxy: Option<String>,
    compression: bool,
    connect_timeout: Duration,
    keep_alive: bool,
    user_agent: String,
}

impl PoolKey {
    pub fn from_options(options: &ConnectionOptions, streaming: bool) -> Self {
        Self {
            proxy: options.active_proxy().map(str::to_string),
            compression: options.use_compression && !streaming,
            connect_timeout: options.connect_timeout,
            keep_alive: options.keep_alive,
            user_agent: options.user_agent.clone(),
        }
    }
}

/// Shared cache of HTTP clients, one per distinct connection setting
#[derive(Debug, Clone, Default)]
pub struct ClientPool {
    clients: Arc<Mutex<HashMap<PoolKey, Client>>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or build the client for `key`. The returned handle is a clone,
    /// so later pool changes never reach a call already in flight.
    pub fn client(&self, key: &PoolKey) -> TwitterResult<Client> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| pool_error("HTTP client pool lock poisoned".to_string()))?;

        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let client = build_client(key)?;
        debug!(proxy = ?key.proxy, compression = key.compression, "Built HTTP client");
        clients.insert(key.clone(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_client(key: &PoolKey) -> TwitterResult<Client> {
    let mut builder = Client::builder()
        .connect_timeout(key.connect_timeout)
        .user_agent(&key.user_agent)
        .gzip(key.compression);

    if !key.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    builder = match &key.proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy.as_str()).map_err(|e| {
            TwitterError::InvalidParameter(format!("Invalid proxy '{}': {}", proxy, e))
        })?),
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| pool_error(format!("Failed to build HTTP client: {}", e)))
}

fn pool_error(message: String) -> TwitterError {
    TwitterError::Config(ConfigError::InvalidConfiguration(message))
}
