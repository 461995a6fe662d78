//! Error taxonomy shared by the Rust API and the C ABI layer.

use crate::registry::Handle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A wire function was called before `init()` completed.
    NotInitialized,
    /// The handle is zero, stale, or was never issued.
    InvalidHandle(Handle),
    /// A buffer, string or URL supplied by the caller is malformed.
    InvalidArgument(String),
    /// The underlying native operation failed.
    NativeFailure(String),
}

impl BridgeError {
    /// Stable identifier posted alongside failure messages.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NotInitialized => "NotInitialized",
            BridgeError::InvalidHandle(_) => "InvalidHandle",
            BridgeError::InvalidArgument(_) => "InvalidArgument",
            BridgeError::NativeFailure(_) => "NativeFailure",
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    pub fn native(msg: impl Into<String>) -> Self {
        BridgeError::NativeFailure(msg.into())
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::NotInitialized => {
                write!(f, "Bridge is not initialized; call init() first.")
            }
            BridgeError::InvalidHandle(h) => {
                write!(f, "Invalid or stale handle {:#018x}.", h.to_raw())
            }
            BridgeError::InvalidArgument(s) => write!(f, "Invalid argument: {}", s),
            BridgeError::NativeFailure(s) => write!(f, "Native operation failed: {}", s),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<anyhow::Error> for BridgeError {
    fn from(e: anyhow::Error) -> Self {
        BridgeError::NativeFailure(format!("{:#}", e))
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
