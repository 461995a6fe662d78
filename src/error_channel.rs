//! Process-wide last-error slot for the C ABI.
//!
//! Only the `extern "C"` layer writes here; everything above it returns
//! [`BridgeError`] values directly. The slot holds the single most recent
//! message: a failure overwrites it, `init` clears it, reading leaves it in
//! place and a later success does not touch it.

use lazy_static::lazy_static;
use log::warn;
use parking_lot::Mutex;

use crate::error::BridgeError;

lazy_static! {
    static ref LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);
}

/// Replaces the pending message with `err`.
pub fn update_last_error(err: &BridgeError) {
    warn!("[ErrorChannel] {}", err);
    *LAST_ERROR.lock() = Some(err.to_string());
}

pub fn clear_last_error() {
    *LAST_ERROR.lock() = None;
}

/// Returns a copy of the pending message, if any.
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.lock().clone()
}

/// Byte length of the pending message, 0 if none.
pub fn last_error_length() -> i32 {
    LAST_ERROR
        .lock()
        .as_ref()
        .map_or(0, |msg| i32::try_from(msg.len()).unwrap_or(i32::MAX))
}

/// Copies the pending message into `buf`.
///
/// Returns the message length. When `buf` is too small nothing is written and
/// the returned length exceeds `buf.len()`, which the caller treats as a
/// request to retry with a larger buffer.
pub fn error_message_into(buf: &mut [u8]) -> i32 {
    let guard = LAST_ERROR.lock();
    let Some(msg) = guard.as_ref() else {
        return 0;
    };
    let bytes = msg.as_bytes();
    if bytes.len() <= buf.len() {
        buf[..bytes.len()].copy_from_slice(bytes);
    }
    i32::try_from(bytes.len()).unwrap_or(i32::MAX)
}

/// Serializes tests that touch the process-wide slot.
#[cfg(test)]
pub(crate) static TEST_GUARD: Mutex<()> = parking_lot::const_mutex(());
