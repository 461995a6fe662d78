//! Native client objects and the handle-addressed store that owns them.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;
use url::Url;

use crate::constants;
use crate::error::{BridgeError, Result};
use crate::registry::{Handle, HandleRegistry};

/// Mutable per-client state. Guarded by an async mutex so that operations on
/// one handle run one at a time while different handles proceed in parallel.
///
/// No login flow exists, so `logged_in` and `avatar_url` stay at their
/// defaults for the lifetime of the client.
#[derive(Debug, Default)]
pub struct Session {
    logged_in: bool,
    avatar_url: Option<String>,
    echo_count: u64,
}

#[derive(Debug)]
pub struct Client {
    homeserver: Url,
    session: Mutex<Session>,
}

impl Client {
    /// Validates `url` as an http(s) homeserver and builds a logged-out client.
    pub fn new(url: &str) -> Result<Self> {
        let homeserver = Url::parse(url.trim())
            .map_err(|e| BridgeError::invalid_argument(format!("homeserver url {:?}: {}", url, e)))?;
        if !constants::ALLOWED_URL_SCHEMES.contains(&homeserver.scheme()) {
            return Err(BridgeError::invalid_argument(format!(
                "homeserver url {:?}: unsupported scheme {:?}",
                url,
                homeserver.scheme()
            )));
        }
        if homeserver.host_str().is_none() {
            return Err(BridgeError::invalid_argument(format!(
                "homeserver url {:?}: missing host",
                url
            )));
        }
        Ok(Client {
            homeserver,
            session: Mutex::new(Session::default()),
        })
    }

    /// Immutable after construction, so readable without touching the session lock.
    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    pub async fn logged_in(&self) -> bool {
        self.session.lock().await.logged_in
    }

    pub async fn avatar_url(&self) -> Option<String> {
        self.session.lock().await.avatar_url.clone()
    }

    /// Echoes `msg` and bumps the client's echo counter.
    ///
    /// The counter is read, the task yields, then the counter is written back;
    /// only per-handle serialization keeps concurrent echoes from losing updates.
    pub async fn echo(&self, msg: String) -> String {
        let mut session = self.session.lock().await;
        let seen = session.echo_count;
        tokio::task::yield_now().await;
        session.echo_count = seen + 1;
        msg
    }

    pub async fn echo_count(&self) -> u64 {
        self.session.lock().await.echo_count
    }
}

/// Owner of every live [`Client`], addressed by [`Handle`].
pub struct ClientStore {
    clients: HandleRegistry<Client>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::with_capacity(constants::MAX_LIVE_CLIENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ClientStore {
            clients: HandleRegistry::new("client", capacity),
        }
    }

    pub fn create(&self, url: &str) -> Result<Handle> {
        let client = Client::new(url)?;
        let handle = self.clients.insert(client)?;
        info!(
            "[ClientStore] Created client {:#018x} for {}",
            handle.to_raw(),
            url.trim()
        );
        Ok(handle)
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<Client>> {
        self.clients.get(handle)
    }

    /// Invalidates `handle`. Calls already running against it finish normally.
    pub fn free(&self, handle: Handle) -> Result<()> {
        self.clients.remove(handle)?;
        info!("[ClientStore] Freed client {:#018x}", handle.to_raw());
        Ok(())
    }

    pub fn homeserver(&self, handle: Handle) -> Result<String> {
        Ok(self.get(handle)?.homeserver().to_string())
    }

    pub async fn logged_in(&self, handle: Handle) -> Result<bool> {
        Ok(self.get(handle)?.logged_in().await)
    }

    pub async fn avatar_url(&self, handle: Handle) -> Result<Option<String>> {
        Ok(self.get(handle)?.avatar_url().await)
    }

    pub async fn client_echo(&self, handle: Handle, msg: String) -> Result<String> {
        let client = self.get(handle)?;
        debug!("[ClientStore] echo on {:#018x}", handle.to_raw());
        Ok(client.echo(msg).await)
    }

    pub async fn echo_count(&self, handle: Handle) -> Result<u64> {
        Ok(self.get(handle)?.echo_count().await)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle-free echo, the first call a freshly loaded library is usually probed with.
pub async fn echo(msg: String) -> String {
    msg
}
