/// Native side of a Dart/Flutter client bridge.
///
/// - Exposes a C ABI (`src/wire`) that Dart calls through FFI
/// - Keeps native clients behind opaque, generation-checked handles
/// - Runs asynchronous calls on a tokio worker pool and posts each result to
///   the caller's port exactly once
/// - Reports synchronous failures through a process-wide last-error slot

pub mod bridge;
pub mod client;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod error_channel;
pub mod port;
pub mod registry;
pub mod wire;

use std::sync::Once;

use env_logger::{Builder, Env};
use log::debug;

pub use bridge::Bridge;
pub use client::{Client, ClientStore};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use port::{ChannelSink, DartPort, DartValue, PortSink};
pub use registry::Handle;

// init() may run again after a Dart hot restart in the same process, and the
// host may already own the global logger, so only try once and tolerate losing.
static LOGGER_INIT: Once = Once::new();

/// Installs `env_logger` with `filter` unless `RUST_LOG` overrides it.
pub fn init_logging(filter: &str) {
    LOGGER_INIT.call_once(|| {
        let result = Builder::from_env(Env::default().default_filter_or(filter))
            .filter_module("mio", log::LevelFilter::Warn)
            .try_init();
        if result.is_err() {
            debug!("[Logging] A logger was already installed; keeping it");
        }
    });
}
