//! Executes wire calls in their two shapes.
//!
//! - Asynchronous calls run on the dispatcher's tokio runtime and finish by
//!   posting to a port through a [`Completion`].
//! - Synchronous calls run inline on the caller's thread, with panics caught,
//!   and must not wait on I/O.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::port::{Completion, DartPort, IntoDart, PortSink};

pub struct Dispatcher {
    runtime: Runtime,
    sink: Arc<dyn PortSink>,
}

impl Dispatcher {
    pub fn new(config: &BridgeConfig, sink: Arc<dyn PortSink>) -> Result<Self> {
        let config = config
            .clone()
            .validated()
            .map_err(|e| BridgeError::invalid_argument(format!("bridge config: {:#}", e)))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| BridgeError::native(format!("building worker runtime: {}", e)))?;
        info!(
            "[Dispatcher] Runtime started with {} '{}' workers",
            config.worker_threads, config.thread_name
        );
        Ok(Dispatcher { runtime, sink })
    }

    pub fn sink(&self) -> &Arc<dyn PortSink> {
        &self.sink
    }

    /// Runs `op` off the caller's thread and posts its outcome to `port`.
    ///
    /// Returns immediately. A panic inside `op` is reported to the port as a
    /// `NativeFailure`; so is a runtime shutdown that drops the work unfinished.
    pub fn spawn<F, T>(&self, port: DartPort, name: &'static str, op: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: IntoDart + Send + 'static,
    {
        let completion = Completion::new(port, self.sink.clone());
        self.runtime.spawn(async move {
            match tokio::spawn(op).await {
                Ok(outcome) => {
                    completion.complete(outcome);
                }
                Err(join_err) if join_err.is_panic() => {
                    error!("[Dispatcher] {} on port {} panicked: {}", name, port, join_err);
                    completion.fail(&BridgeError::native(format!("{} panicked", name)));
                }
                Err(join_err) => {
                    warn!("[Dispatcher] {} on port {} cancelled: {}", name, port, join_err);
                    completion.fail(&BridgeError::native(format!(
                        "{} dropped before completing",
                        name
                    )));
                }
            }
        });
    }

    /// Posts an already known outcome to `port` without touching the runtime.
    pub fn post_now<T: IntoDart>(&self, port: DartPort, outcome: Result<T>) -> bool {
        Completion::new(port, self.sink.clone()).complete(outcome)
    }

    /// Runs a synchronous call, converting a panic into `NativeFailure`.
    pub fn run_sync<T>(&self, name: &'static str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        run_sync(name, op)
    }

    /// Blocks the current thread on `fut` using the worker runtime.
    ///
    /// Only for Rust hosts and tests; wire functions never call this.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

pub(crate) fn run_sync<T>(name: &'static str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|_| {
        error!("[Dispatcher] {} panicked", name);
        Err(BridgeError::native(format!("{} panicked", name)))
    })
}
