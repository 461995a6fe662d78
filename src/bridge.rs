//! The assembled bridge: client store + dispatcher, and the process-wide
//! instance the C ABI talks to.
//!
//! A [`Bridge`] can be created directly by Rust hosts (and tests) with any
//! [`PortSink`]; its methods return [`BridgeError`] values rather than using
//! the last-error slot. The `extern "C"` layer installs one global instance at
//! `init()` that posts through the Dart VM.

use std::sync::Arc;

use log::info;
use once_cell::sync::OnceCell;

use crate::client::{self, ClientStore};
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::port::{DartPort, DartPostSink, PortSink};
use crate::registry::Handle;

pub struct Bridge {
    config: BridgeConfig,
    clients: Arc<ClientStore>,
    dispatcher: Dispatcher,
}

impl Bridge {
    pub fn new(config: BridgeConfig, sink: Arc<dyn PortSink>) -> Result<Self> {
        let dispatcher = Dispatcher::new(&config, sink)?;
        Ok(Bridge {
            config,
            clients: Arc::new(ClientStore::new()),
            dispatcher,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn clients(&self) -> &Arc<ClientStore> {
        &self.clients
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Creates a client for `url` and posts its raw handle.
    pub fn new_client(&self, port: DartPort, url: String) {
        let clients = self.clients.clone();
        self.dispatcher
            .spawn(port, "new_client", async move { clients.create(&url) });
    }

    pub fn echo(&self, port: DartPort, msg: String) {
        self.dispatcher
            .spawn(port, "echo", async move { Ok(client::echo(msg).await) });
    }

    pub fn avatar_url(&self, port: DartPort, handle: Handle) {
        let clients = self.clients.clone();
        self.dispatcher.spawn(port, "avatar_url", async move {
            clients.avatar_url(handle).await
        });
    }

    pub fn logged_in(&self, port: DartPort, handle: Handle) {
        let clients = self.clients.clone();
        self.dispatcher.spawn(port, "logged_in", async move {
            clients.logged_in(handle).await
        });
    }

    pub fn homeserver(&self, port: DartPort, handle: Handle) {
        let clients = self.clients.clone();
        self.dispatcher
            .spawn(port, "homeserver", async move { clients.homeserver(handle) });
    }

    pub fn client_echo(&self, port: DartPort, handle: Handle, msg: String) {
        let clients = self.clients.clone();
        self.dispatcher.spawn(port, "client_echo", async move {
            clients.client_echo(handle, msg).await
        });
    }

    /// Invalidates `handle` before returning, then posts `null` (or the failure).
    ///
    /// Calls already running against the client finish normally; any call
    /// issued after this returns sees `InvalidHandle`.
    pub fn free_client(&self, port: DartPort, handle: Handle) {
        let outcome = self.clients.free(handle);
        self.dispatcher.post_now(port, outcome);
    }

    pub fn echo_sync(&self, msg: Vec<u8>) -> Result<Vec<u8>> {
        self.dispatcher.run_sync("echo_sync", || Ok(msg))
    }

    pub fn homeserver_sync(&self, handle: Handle) -> Result<Vec<u8>> {
        self.dispatcher.run_sync("homeserver_sync", || {
            Ok(self.clients.homeserver(handle)?.into_bytes())
        })
    }
}

static GLOBAL: OnceCell<Bridge> = OnceCell::new();

/// Creates the process-wide bridge on first call; later calls return it unchanged.
pub fn install() -> Result<&'static Bridge> {
    GLOBAL.get_or_try_init(|| {
        let config = BridgeConfig::load()?;
        crate::init_logging(&config.log_filter);
        let bridge = Bridge::new(config, Arc::new(DartPostSink))?;
        info!("[Bridge] Initialized");
        Ok::<_, BridgeError>(bridge)
    })
}

/// The process-wide bridge, or `NotInitialized` before [`install`].
pub fn global() -> Result<&'static Bridge> {
    GLOBAL.get().ok_or(BridgeError::NotInitialized)
}

pub fn is_initialized() -> bool {
    GLOBAL.get().is_some()
}
