//! Drives the exported C ABI the way the Dart side does, with a recording
//! stand-in for `Dart_PostCObject`.

use std::collections::HashMap;
use std::ffi::c_char;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use client_ffi_bridge::DartValue;
use client_ffi_bridge::port::DartCObject;
use client_ffi_bridge::port::cobject::decode;
use client_ffi_bridge::wire::exports::*;
use client_ffi_bridge::wire::{
    WireSyncReturnStruct, outstanding_sync_returns, wire_Client, wire_uint_8_list,
};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};

static POSTED: Lazy<Mutex<HashMap<i64, Vec<DartValue>>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static POSTED_CV: Condvar = Condvar::new();
static NEXT_PORT: AtomicI64 = AtomicI64::new(1000);
// The last-error slot is process-wide.
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

unsafe extern "C" fn record_post(port: i64, message: *mut DartCObject) -> bool {
    let Some(value) = (unsafe { decode(message) }) else {
        return false;
    };
    POSTED.lock().entry(port).or_default().push(value);
    POSTED_CV.notify_all();
    true
}

fn setup() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock();
    store_dart_post_cobject(Some(record_post));
    assert_eq!(init(), 1);
    guard
}

fn port() -> i64 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn wait_port(port: i64) -> Result<DartValue, (String, String)> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut posted = POSTED.lock();
    loop {
        if let Some(values) = posted.remove(&port) {
            assert_eq!(values.len(), 1, "port {} received {:?}", port, values);
            let value = values.into_iter().next().unwrap();
            return value.into_outcome().expect("not an envelope");
        }
        if POSTED_CV.wait_until(&mut posted, deadline).timed_out() {
            panic!("nothing posted to port {}", port);
        }
    }
}

fn list(bytes: &[u8]) -> *mut wire_uint_8_list {
    let list = new_uint_8_list(bytes.len() as i32);
    assert!(!list.is_null());
    unsafe {
        let l = &mut *list;
        if !bytes.is_empty() {
            std::slice::from_raw_parts_mut(l.ptr, l.len as usize).copy_from_slice(bytes);
        }
    }
    list
}

fn client_box(raw: u64) -> *mut wire_Client {
    let boxed = new_box_autoadd_client();
    assert!(!boxed.is_null());
    unsafe { (*boxed).field0 = raw };
    boxed
}

fn last_error() -> Option<String> {
    let len = last_error_length();
    if len == 0 {
        return None;
    }
    let mut buf = vec![0u8; len as usize];
    let written = unsafe { error_message_utf8(buf.as_mut_ptr() as *mut c_char, len) };
    assert_eq!(written, len);
    Some(String::from_utf8(buf).unwrap())
}

fn new_client(url: &str) -> u64 {
    let p = port();
    unsafe { wire_new_client(p, list(url.as_bytes())) };
    match wait_port(p) {
        Ok(DartValue::Int64(raw)) => raw as u64,
        other => panic!("unexpected new_client result {:?}", other),
    }
}

fn take_sync(ret: WireSyncReturnStruct) -> (bool, Vec<u8>) {
    let out = (ret.success, unsafe { ret.as_bytes() }.to_vec());
    free_WireSyncReturnStruct(ret);
    out
}

#[test]
fn init_is_idempotent_and_clears_the_error_slot() {
    let _g = setup();
    let ret = unsafe { wire_echo_sync(std::ptr::null_mut()) };
    assert!(!ret.success);
    free_WireSyncReturnStruct(ret);
    assert!(last_error_length() > 0);

    assert_eq!(init(), 1);
    assert_eq!(last_error_length(), 0);

    let p = port();
    wire_init(p);
    assert_eq!(wait_port(p), Ok(DartValue::Bool(true)));
}

#[test]
fn echo_posts_back_the_message() {
    let _g = setup();
    let p = port();
    unsafe { wire_echo(p, list("grüße".as_bytes())) };
    assert_eq!(wait_port(p), Ok(DartValue::String("grüße".into())));

    let p = port();
    unsafe { wire_echo(p, list(b"")) };
    assert_eq!(wait_port(p), Ok(DartValue::String(String::new())));
}

#[test]
fn client_lifecycle_over_the_wire() {
    let _g = setup();
    let raw = new_client("https://matrix.example.org");
    assert_ne!(raw, 0);

    let p = port();
    unsafe { wire_homeserver(p, client_box(raw)) };
    assert_eq!(
        wait_port(p),
        Ok(DartValue::String("https://matrix.example.org/".into()))
    );

    let p = port();
    unsafe { wire_logged_in(p, client_box(raw)) };
    assert_eq!(wait_port(p), Ok(DartValue::Bool(false)));

    let p = port();
    unsafe { wire_avatar_url(p, client_box(raw)) };
    assert_eq!(wait_port(p), Ok(DartValue::Null));

    let p = port();
    unsafe { wire_client_echo(p, client_box(raw), list(b"ping")) };
    assert_eq!(wait_port(p), Ok(DartValue::String("ping".into())));

    let (ok, bytes) = take_sync(unsafe { wire_homeserver_sync(client_box(raw)) });
    assert!(ok);
    assert_eq!(bytes, b"https://matrix.example.org/");

    let p = port();
    unsafe { wire_free_client(p, client_box(raw)) };
    assert_eq!(wait_port(p), Ok(DartValue::Null));

    let p = port();
    unsafe { wire_logged_in(p, client_box(raw)) };
    let (code, _) = wait_port(p).unwrap_err();
    assert_eq!(code, "InvalidHandle");

    let (ok, bytes) = take_sync(unsafe { wire_homeserver_sync(client_box(raw)) });
    assert!(!ok);
    let message = String::from_utf8(bytes).unwrap();
    assert!(message.starts_with("Invalid or stale handle"));
    assert_eq!(last_error().as_deref(), Some(message.as_str()));
}

#[test]
fn invalid_url_is_reported_on_the_port_only() {
    let _g = setup();
    let p = port();
    unsafe { wire_new_client(p, list(b"gopher://example.org")) };
    let (code, message) = wait_port(p).unwrap_err();
    assert_eq!(code, "InvalidArgument");
    assert!(message.contains("gopher"));
    assert_eq!(last_error_length(), 0);
}

#[test]
fn null_arguments_fail_on_the_port() {
    let _g = setup();
    let p = port();
    unsafe { wire_echo(p, std::ptr::null_mut()) };
    assert_eq!(wait_port(p).unwrap_err().0, "InvalidArgument");

    let p = port();
    unsafe { wire_client_echo(p, std::ptr::null_mut(), list(b"dropped")) };
    assert_eq!(wait_port(p).unwrap_err().0, "InvalidHandle");

    let p = port();
    unsafe { wire_new_client(p, list(&[0xc3, 0x28])) };
    assert_eq!(wait_port(p).unwrap_err().0, "InvalidArgument");
}

#[test]
fn error_message_requires_a_large_enough_buffer() {
    let _g = setup();
    let ret = unsafe { wire_echo_sync(std::ptr::null_mut()) };
    free_WireSyncReturnStruct(ret);

    let len = last_error_length();
    assert!(len > 1);

    let mut short = vec![b'#'; (len - 1) as usize];
    let reported = unsafe { error_message_utf8(short.as_mut_ptr() as *mut c_char, len - 1) };
    assert_eq!(reported, len);
    assert!(short.iter().all(|&b| b == b'#'));

    assert_eq!(unsafe { error_message_utf8(std::ptr::null_mut(), 0) }, len);

    let mut exact = vec![0u8; len as usize];
    assert_eq!(
        unsafe { error_message_utf8(exact.as_mut_ptr() as *mut c_char, len) },
        len
    );
    assert_eq!(
        String::from_utf8(exact).unwrap(),
        "Invalid argument: null byte buffer"
    );

    // Neither reading nor a later success clears the slot.
    let (ok, bytes) = take_sync(unsafe { wire_echo_sync(list(b"fine")) });
    assert!(ok);
    assert_eq!(bytes, b"fine");
    assert_eq!(last_error_length(), len);
}

#[test]
fn sync_results_survive_a_double_free() {
    let _g = setup();
    let before = outstanding_sync_returns();
    let ret = unsafe { wire_echo_sync(list(b"twice")) };
    assert!(ret.success);
    assert_eq!(outstanding_sync_returns(), before + 1);
    let copy = WireSyncReturnStruct {
        ptr: ret.ptr,
        len: ret.len,
        success: ret.success,
    };
    assert_eq!(unsafe { ret.as_bytes() }, b"twice");
    free_WireSyncReturnStruct(ret);
    free_WireSyncReturnStruct(copy);
    assert_eq!(outstanding_sync_returns(), before);

    let (ok, bytes) = take_sync(unsafe { wire_echo_sync(list(b"")) });
    assert!(ok);
    assert!(bytes.is_empty());
}

#[test]
fn negative_list_length_is_rejected() {
    let _g = setup();
    assert!(new_uint_8_list(-4).is_null());
    assert!(last_error().unwrap().contains("negative list length"));
}

#[test]
fn many_clients_echo_concurrently_over_the_wire() {
    let _g = setup();
    let handles: Vec<u64> = (0..4)
        .map(|i| new_client(&format!("https://h{}.example", i)))
        .collect();
    let mut pending = Vec::new();
    for round in 0..16 {
        for &raw in &handles {
            let p = port();
            let msg = format!("{}-{}", raw, round);
            unsafe { wire_client_echo(p, client_box(raw), list(msg.as_bytes())) };
            pending.push((p, msg));
        }
    }
    for (p, msg) in pending {
        assert_eq!(wait_port(p), Ok(DartValue::String(msg)));
    }
    for raw in handles {
        let p = port();
        unsafe { wire_free_client(p, client_box(raw)) };
        assert_eq!(wait_port(p), Ok(DartValue::Null));
    }
}

#[test]
fn freed_handle_is_invalid_as_soon_as_free_returns() {
    let _g = setup();
    for _ in 0..200 {
        let raw = new_client("https://example.org");

        let free_port = port();
        unsafe { wire_free_client(free_port, client_box(raw)) };

        let (ok, _) = take_sync(unsafe { wire_homeserver_sync(client_box(raw)) });
        assert!(!ok);
        let p = port();
        unsafe { wire_homeserver(p, client_box(raw)) };
        let logged = port();
        unsafe { wire_logged_in(logged, client_box(raw)) };

        assert_eq!(wait_port(p).unwrap_err().0, "InvalidHandle");
        assert_eq!(wait_port(logged).unwrap_err().0, "InvalidHandle");
        assert_eq!(wait_port(free_port), Ok(DartValue::Null));
    }
}
