//! `extern "C"` entry points called by the Dart side through FFI.
//!
//! Every function catches panics before they reach the boundary. Synchronous
//! failures return the function's sentinel (0, null, or an unsuccessful
//! `WireSyncReturnStruct`) and set the last-error slot. Asynchronous functions
//! post exactly one message to their port. Before `init()` they set the slot
//! instead, and post too if a post function is already registered.

use std::ffi::c_char;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::{error, info};

use super::{WireSyncReturnStruct, take_client, take_list, take_string, wire_Client, wire_uint_8_list};
use crate::bridge::{self, Bridge};
use crate::dispatcher;
use crate::error::{BridgeError, Result};
use crate::error_channel;
use crate::port::cobject::{has_post_cobject, store_post_cobject};
use crate::port::{Completion, DartPort, DartPostCObjectFnType, DartPostSink, IntoDart};
use crate::registry::Handle;

/// Runs `f`, turning a panic into `fallback` plus a `NativeFailure` in the slot.
fn ffi_guard<R>(name: &'static str, fallback: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(_) => {
            error!("[Wire] {} panicked", name);
            error_channel::update_last_error(&BridgeError::native(format!("{} panicked", name)));
            fallback
        }
    }
}

/// Posts straight through the Dart sink, for calls that have no bridge to use.
fn post_inline<T: IntoDart>(port: DartPort, outcome: Result<T>) -> bool {
    Completion::new(port, Arc::new(DartPostSink)).complete(outcome)
}

/// Shared body of every asynchronous wire function.
///
/// `args` runs first and unconditionally, so buffers handed over by the
/// caller are always consumed, even when the call is rejected.
fn dispatch_async<A>(
    port: DartPort,
    name: &'static str,
    args: impl FnOnce() -> Result<A>,
    call: impl FnOnce(&'static Bridge, A),
) {
    ffi_guard(name, (), || {
        let args = args();
        match bridge::global() {
            Err(e) => {
                error_channel::update_last_error(&e);
                if has_post_cobject() {
                    post_inline(port, Err::<(), _>(e));
                }
            }
            Ok(b) => match args {
                Ok(a) => call(b, a),
                Err(e) => {
                    b.dispatcher().post_now(port, Err::<(), _>(e));
                }
            },
        }
    })
}

fn sync_call(
    name: &'static str,
    f: impl FnOnce(&'static Bridge) -> Result<Vec<u8>>,
) -> WireSyncReturnStruct {
    WireSyncReturnStruct::from_outcome(dispatcher::run_sync(name, || {
        bridge::global().and_then(f)
    }))
}

/// Initializes logging, configuration and the worker runtime.
///
/// Clears the last-error slot. Returns 1 on success (also when already
/// initialized) and 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn init() -> i32 {
    ffi_guard("init", 0, || {
        error_channel::clear_last_error();
        match bridge::install() {
            Ok(_) => 1,
            Err(e) => {
                error_channel::update_last_error(&e);
                0
            }
        }
    })
}

/// Asynchronous form of [`init`]; posts `true` or a failure to `port`.
#[unsafe(no_mangle)]
pub extern "C" fn wire_init(port_: i64) {
    ffi_guard("wire_init", (), || {
        error_channel::clear_last_error();
        let outcome = bridge::install().map(|_| true);
        if let Err(e) = &outcome {
            error_channel::update_last_error(e);
        }
        post_inline(port_, outcome);
    })
}

/// Allocates a zeroed client box; null before `init()`.
#[unsafe(no_mangle)]
pub extern "C" fn new_box_autoadd_client() -> *mut wire_Client {
    ffi_guard("new_box_autoadd_client", std::ptr::null_mut(), || {
        match bridge::global() {
            Ok(_) => Box::into_raw(Box::new(wire_Client::default())),
            Err(e) => {
                error_channel::update_last_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Allocates a zeroed byte list of `len` bytes; null before `init()` or for a
/// negative length.
#[unsafe(no_mangle)]
pub extern "C" fn new_uint_8_list(len: i32) -> *mut wire_uint_8_list {
    ffi_guard("new_uint_8_list", std::ptr::null_mut(), || {
        match bridge::global().and_then(|_| super::new_list(len)) {
            Ok(list) => list,
            Err(e) => {
                error_channel::update_last_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Creates a client for the UTF-8 homeserver URL in `url` and posts its raw
/// handle (an int64). Consumes `url`.
///
/// # Safety
/// `url` must be null or an unconsumed list from [`new_uint_8_list`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_new_client(port_: i64, url: *mut wire_uint_8_list) {
    dispatch_async(
        port_,
        "wire_new_client",
        || unsafe { take_string(url) },
        |b, url| b.new_client(port_, url),
    )
}

/// Posts `msg` back as a string. Consumes `msg`.
///
/// # Safety
/// `msg` must be null or an unconsumed list from [`new_uint_8_list`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_echo(port_: i64, msg: *mut wire_uint_8_list) {
    dispatch_async(
        port_,
        "wire_echo",
        || unsafe { take_string(msg) },
        |b, msg| b.echo(port_, msg),
    )
}

/// # Safety
/// `h` must be null or an unconsumed box from [`new_box_autoadd_client`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_avatar_url(port_: i64, h: *mut wire_Client) {
    dispatch_async(
        port_,
        "wire_avatar_url",
        || unsafe { take_client(h) },
        |b, h| b.avatar_url(port_, h),
    )
}

/// # Safety
/// `h` must be null or an unconsumed box from [`new_box_autoadd_client`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_logged_in(port_: i64, h: *mut wire_Client) {
    dispatch_async(
        port_,
        "wire_logged_in",
        || unsafe { take_client(h) },
        |b, h| b.logged_in(port_, h),
    )
}

/// # Safety
/// `h` must be null or an unconsumed box from [`new_box_autoadd_client`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_homeserver(port_: i64, h: *mut wire_Client) {
    dispatch_async(
        port_,
        "wire_homeserver",
        || unsafe { take_client(h) },
        |b, h| b.homeserver(port_, h),
    )
}

/// Echoes `msg` through the client behind `h`, serialized with every other
/// call on that handle. Consumes both arguments.
///
/// # Safety
/// `h` and `msg` must be null or unconsumed allocations from this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_client_echo(
    port_: i64,
    h: *mut wire_Client,
    msg: *mut wire_uint_8_list,
) {
    dispatch_async(
        port_,
        "wire_client_echo",
        || {
            // Consume both before looking at either result.
            let handle = unsafe { take_client(h) };
            let msg = unsafe { take_string(msg) };
            Ok::<(Handle, String), BridgeError>((handle?, msg?))
        },
        |b, (h, msg)| b.client_echo(port_, h, msg),
    )
}

/// Releases the client behind `h`; posts `null` once the handle is invalid.
///
/// # Safety
/// `h` must be null or an unconsumed box from [`new_box_autoadd_client`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_free_client(port_: i64, h: *mut wire_Client) {
    dispatch_async(
        port_,
        "wire_free_client",
        || unsafe { take_client(h) },
        |b, h| b.free_client(port_, h),
    )
}

/// Synchronous echo: returns the bytes of `msg` unchanged. Consumes `msg`.
///
/// # Safety
/// `msg` must be null or an unconsumed list from [`new_uint_8_list`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_echo_sync(msg: *mut wire_uint_8_list) -> WireSyncReturnStruct {
    let bytes = unsafe { take_list(msg) };
    sync_call("wire_echo_sync", |b| b.echo_sync(bytes?))
}

/// Synchronous homeserver lookup; never waits on the client's session lock.
///
/// # Safety
/// `h` must be null or an unconsumed box from [`new_box_autoadd_client`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wire_homeserver_sync(h: *mut wire_Client) -> WireSyncReturnStruct {
    let handle = unsafe { take_client(h) };
    sync_call("wire_homeserver_sync", |b| b.homeserver_sync(handle?))
}

/// Byte length of the pending error message, 0 if none.
#[unsafe(no_mangle)]
pub extern "C" fn last_error_length() -> i32 {
    ffi_guard("last_error_length", 0, error_channel::last_error_length)
}

/// Copies the pending error message into `buf` (no terminator).
///
/// Returns the message length; a value larger than `length` means nothing was
/// written and the caller must retry with a bigger buffer.
///
/// # Safety
/// `buf` must be null or valid for writes of `length` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn error_message_utf8(buf: *mut c_char, length: i32) -> i32 {
    ffi_guard("error_message_utf8", -1, || {
        if buf.is_null() || length <= 0 {
            return error_channel::error_message_into(&mut []);
        }
        let slice = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, length as usize) };
        error_channel::error_message_into(slice)
    })
}

/// Releases a result from a synchronous wire function. A second release of
/// the same result is logged and ignored.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn free_WireSyncReturnStruct(val: WireSyncReturnStruct) {
    ffi_guard("free_WireSyncReturnStruct", (), || {
        val.release();
    })
}

/// Registers the Dart VM's `Dart_PostCObject`. Allowed before `init()`.
#[unsafe(no_mangle)]
pub extern "C" fn store_dart_post_cobject(ptr: Option<DartPostCObjectFnType>) {
    ffi_guard("store_dart_post_cobject", (), || {
        info!(
            "[Wire] Dart post function {}",
            if ptr.is_some() { "registered" } else { "cleared" }
        );
        store_post_cobject(ptr);
    })
}
