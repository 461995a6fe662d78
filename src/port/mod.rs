//! Single-shot result delivery to caller-supplied ports.
//!
//! An asynchronous wire call carries a numeric port. Whatever the outcome,
//! exactly one message is posted there through a [`Completion`]: it is
//! consumed by posting, and posts a failure from `Drop` if the operation is
//! torn down before producing a result.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::BridgeError;

pub mod channel;
pub mod cobject;
pub mod value;

pub use channel::ChannelSink;
pub use cobject::{DartCObject, DartPostCObjectFnType, DartPostSink};
pub use value::{DartValue, IntoDart};

/// Identifier of a Dart `ReceivePort`'s native side.
pub type DartPort = i64;

/// Destination for posted results.
pub trait PortSink: Send + Sync {
    /// Delivers `message` to `port`; returns whether the receiver accepted it.
    fn post(&self, port: DartPort, message: DartValue) -> bool;
}

/// The obligation to post exactly one result to a port.
pub struct Completion {
    port: DartPort,
    sink: Arc<dyn PortSink>,
    done: bool,
}

impl Completion {
    pub fn new(port: DartPort, sink: Arc<dyn PortSink>) -> Self {
        Completion {
            port,
            sink,
            done: false,
        }
    }

    pub fn port(&self) -> DartPort {
        self.port
    }

    pub fn succeed(mut self, value: DartValue) -> bool {
        self.done = true;
        debug!("[Port] Posting success to port {}", self.port);
        self.sink.post(self.port, DartValue::success(value))
    }

    pub fn fail(mut self, err: &BridgeError) -> bool {
        self.done = true;
        debug!("[Port] Posting {} failure to port {}", err.code(), self.port);
        self.sink.post(self.port, DartValue::failure(err))
    }

    pub fn complete<T: IntoDart>(self, outcome: Result<T, BridgeError>) -> bool {
        match outcome {
            Ok(v) => self.succeed(v.into_dart()),
            Err(e) => self.fail(&e),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!(
            "[Port] Operation for port {} dropped before completing",
            self.port
        );
        let err = BridgeError::native("operation dropped before completing");
        self.sink.post(self.port, DartValue::failure(&err));
    }
}
