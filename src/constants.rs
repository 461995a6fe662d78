/// Environment variable naming a JSON file with a [`crate::config::BridgeConfig`].
pub const CONFIG_ENV_VAR: &str = "CLIENT_BRIDGE_CONFIG";

/// Default number of tokio worker threads backing asynchronous wire calls.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Name given to every worker thread of the bridge runtime.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "clientbridge-worker";

/// Log filter used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Upper bound on simultaneously live client handles.
pub const MAX_LIVE_CLIENTS: usize = 1 << 16;

/// Leading element of a posted message reporting success.
pub const POST_ACTION_SUCCESS: i32 = 0;

/// Leading element of a posted message reporting failure.
pub const POST_ACTION_ERROR: i32 = 1;

/// URL schemes a client homeserver may use.
pub const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https"];
