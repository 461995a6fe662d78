//! C ABI wire types and the conversions between them and native values.
//!
//! Ownership across the boundary is fixed per type:
//!
//! - `wire_uint_8_list` is allocated by `new_uint_8_list`, filled by the
//!   caller and **consumed** by the wire function it is passed to.
//! - `wire_Client` is allocated by `new_box_autoadd_client`, holds a raw
//!   handle, and is likewise consumed by the wire function it is passed to.
//! - `WireSyncReturnStruct` is owned by this library until the caller hands it
//!   back, once, to `free_WireSyncReturnStruct`.

#![allow(non_camel_case_types)]

use std::collections::HashSet;

use log::warn;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::registry::Handle;

pub mod exports;

#[repr(C)]
#[derive(Debug)]
pub struct wire_uint_8_list {
    pub ptr: *mut u8,
    pub len: i32,
}

/// Caller-side box around a raw client handle.
///
/// `field0` carries the packed index and generation posted by `wire_new_client`.
#[repr(C)]
#[derive(Debug, Default)]
pub struct wire_Client {
    pub field0: u64,
}

#[repr(C)]
#[derive(Debug)]
pub struct WireSyncReturnStruct {
    pub ptr: *mut u8,
    pub len: i32,
    pub success: bool,
}

/// Allocates a zeroed list of `len` bytes for the caller to fill.
pub(crate) fn new_list(len: i32) -> Result<*mut wire_uint_8_list> {
    let len = usize::try_from(len)
        .map_err(|_| BridgeError::invalid_argument(format!("negative list length {}", len)))?;
    let mut data = vec![0u8; len].into_boxed_slice();
    let ptr = data.as_mut_ptr();
    std::mem::forget(data);
    Ok(Box::into_raw(Box::new(wire_uint_8_list {
        ptr,
        len: len as i32,
    })))
}

/// Takes ownership of a list produced by [`new_list`] and returns its bytes.
///
/// # Safety
/// `list` must be null or come from `new_list` and not have been consumed yet.
pub(crate) unsafe fn take_list(list: *mut wire_uint_8_list) -> Result<Vec<u8>> {
    if list.is_null() {
        return Err(BridgeError::invalid_argument("null byte buffer"));
    }
    let list = unsafe { Box::from_raw(list) };
    if list.len < 0 || (list.ptr.is_null() && list.len != 0) {
        return Err(BridgeError::invalid_argument(format!(
            "malformed byte buffer (len {})",
            list.len
        )));
    }
    let len = list.len as usize;
    if len == 0 {
        return Ok(Vec::new());
    }
    let data = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(list.ptr, len)) };
    Ok(data.into_vec())
}

/// Consumes a list and decodes it as UTF-8.
///
/// # Safety
/// Same contract as [`take_list`].
pub(crate) unsafe fn take_string(list: *mut wire_uint_8_list) -> Result<String> {
    let bytes = unsafe { take_list(list)? };
    String::from_utf8(bytes)
        .map_err(|e| BridgeError::invalid_argument(format!("buffer is not UTF-8: {}", e)))
}

/// Consumes a `wire_Client` box and returns the handle it carries.
///
/// # Safety
/// `client` must be null or come from `new_box_autoadd_client` and not have
/// been consumed yet.
pub(crate) unsafe fn take_client(client: *mut wire_Client) -> Result<Handle> {
    if client.is_null() {
        return Err(BridgeError::InvalidHandle(Handle::NULL));
    }
    let boxed = unsafe { Box::from_raw(client) };
    Ok(Handle::from_raw(boxed.field0))
}

/// Length field for a sync result of `len` bytes.
fn sync_result_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        BridgeError::invalid_argument(format!(
            "result of {} bytes exceeds the {} byte wire limit",
            len,
            i32::MAX
        ))
    })
}

/// Addresses of sync result buffers handed out and not yet freed.
static OUTSTANDING_SYNC_RETURNS: Lazy<Mutex<HashSet<usize>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

impl WireSyncReturnStruct {
    pub(crate) fn from_outcome(outcome: Result<Vec<u8>>) -> Self {
        match outcome.and_then(|bytes| sync_result_len(bytes.len()).map(|_| bytes)) {
            Ok(bytes) => Self::from_bytes(bytes, true),
            Err(e) => {
                crate::error_channel::update_last_error(&e);
                let mut message = e.to_string().into_bytes();
                message.truncate(i32::MAX as usize);
                Self::from_bytes(message, false)
            }
        }
    }

    /// `bytes` must fit the `i32` length field; `release` rebuilds the
    /// allocation from it.
    fn from_bytes(bytes: Vec<u8>, success: bool) -> Self {
        if bytes.is_empty() {
            return WireSyncReturnStruct {
                ptr: std::ptr::null_mut(),
                len: 0,
                success,
            };
        }
        let mut data = bytes.into_boxed_slice();
        let len = data.len();
        let ptr = data.as_mut_ptr();
        std::mem::forget(data);
        OUTSTANDING_SYNC_RETURNS.lock().insert(ptr as usize);
        WireSyncReturnStruct {
            ptr,
            len: len as i32,
            success,
        }
    }

    /// Bytes of a result still owned by the library (test and host helper).
    ///
    /// # Safety
    /// `self` must not have been released yet.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len as usize) }
    }

    /// Releases the buffer. Returns `false` for null, unknown or already
    /// released buffers, which are left untouched.
    pub(crate) fn release(self) -> bool {
        if self.ptr.is_null() {
            return false;
        }
        if !OUTSTANDING_SYNC_RETURNS.lock().remove(&(self.ptr as usize)) {
            warn!(
                "[Wire] Ignoring release of unknown or already freed sync result {:p}",
                self.ptr
            );
            return false;
        }
        let len = self.len as usize;
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr, len)) });
        true
    }
}

/// Number of sync results handed out and not yet released.
pub fn outstanding_sync_returns() -> usize {
    OUTSTANDING_SYNC_RETURNS.lock().len()
}
