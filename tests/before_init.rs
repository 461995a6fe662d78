//! Calls made before `init()`. Lives in its own binary so nothing else in the
//! process has initialized the bridge.

use std::collections::HashMap;
use std::ffi::c_char;

use client_ffi_bridge::DartValue;
use client_ffi_bridge::bridge;
use client_ffi_bridge::port::DartCObject;
use client_ffi_bridge::port::cobject::decode;
use client_ffi_bridge::wire::exports::*;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static POSTED: Lazy<Mutex<HashMap<i64, Vec<DartValue>>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

unsafe extern "C" fn record_post(port: i64, message: *mut DartCObject) -> bool {
    let Some(value) = (unsafe { decode(message) }) else {
        return false;
    };
    POSTED.lock().entry(port).or_default().push(value);
    true
}

fn last_error() -> String {
    let len = last_error_length();
    let mut buf = vec![0u8; len as usize];
    let written = unsafe { error_message_utf8(buf.as_mut_ptr() as *mut c_char, len) };
    assert_eq!(written, len);
    String::from_utf8(buf).unwrap()
}

fn assert_not_initialized() {
    assert!(last_error().contains("not initialized"));
}

#[test]
fn allocators_return_null() {
    let _g = SERIAL.lock();
    assert!(new_uint_8_list(8).is_null());
    assert_not_initialized();
    assert!(new_box_autoadd_client().is_null());
    assert_not_initialized();
    assert!(!bridge::is_initialized());
}

#[test]
fn sync_calls_fail_with_not_initialized() {
    let _g = SERIAL.lock();
    let ret = unsafe { wire_echo_sync(std::ptr::null_mut()) };
    assert!(!ret.success);
    let message = String::from_utf8(unsafe { ret.as_bytes() }.to_vec()).unwrap();
    free_WireSyncReturnStruct(ret);
    assert_eq!(message, "Bridge is not initialized; call init() first.");
    assert_eq!(last_error(), message);
}

#[test]
fn async_calls_post_failure_and_set_the_slot() {
    let _g = SERIAL.lock();
    store_dart_post_cobject(Some(record_post));

    unsafe { wire_echo(41, std::ptr::null_mut()) };
    unsafe { wire_logged_in(42, std::ptr::null_mut()) };
    unsafe { wire_free_client(43, std::ptr::null_mut()) };

    let mut posted = POSTED.lock();
    for port in [41, 42, 43] {
        let values = posted.remove(&port).expect("no failure posted");
        assert_eq!(values.len(), 1);
        let (code, _) = values[0].clone().into_outcome().unwrap().unwrap_err();
        assert_eq!(code, "NotInitialized");
    }
    drop(posted);
    assert_not_initialized();
    assert!(!bridge::is_initialized());
}
