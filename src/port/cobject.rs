//! `#[repr(C)]` mirror of the Dart VM's `Dart_CObject` and the sink that posts
//! through the `Dart_PostCObject` function pointer registered by the host.
//!
//! The VM copies a posted object before `Dart_PostCObject` returns, so every
//! allocation backing an encoded message only has to outlive the call.

use std::ffi::{CStr, CString, c_char, c_void};

use log::{error, warn};
use parking_lot::RwLock;

use super::value::DartValue;
use super::{DartPort, PortSink};

/// Signature of `Dart_PostCObject` as handed over by `store_dart_post_cobject`.
pub type DartPostCObjectFnType =
    unsafe extern "C" fn(port_id: DartPort, message: *mut DartCObject) -> bool;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DartCObjectType {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Double = 4,
    String = 5,
    Array = 6,
    TypedData = 7,
    ExternalTypedData = 8,
    SendPort = 9,
    Capability = 10,
    NativePointer = 11,
    Unsupported = 12,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DartTypedDataType {
    ByteData = 0,
    Int8 = 1,
    Uint8 = 2,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DartNativeArray {
    pub length: isize,
    pub values: *mut *mut DartCObject,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DartNativeTypedData {
    pub ty: DartTypedDataType,
    pub length: isize,
    pub values: *const u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DartNativeExternalTypedData {
    pub ty: DartTypedDataType,
    pub length: isize,
    pub data: *mut u8,
    pub peer: *mut c_void,
    pub callback: Option<unsafe extern "C" fn(isolate_callback_data: *mut c_void, peer: *mut c_void)>,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union DartCObjectValue {
    pub as_bool: bool,
    pub as_int32: i32,
    pub as_int64: i64,
    pub as_double: f64,
    pub as_string: *const c_char,
    pub as_array: DartNativeArray,
    pub as_typed_data: DartNativeTypedData,
    pub as_external_typed_data: DartNativeExternalTypedData,
}

#[repr(C)]
pub struct DartCObject {
    pub ty: DartCObjectType,
    pub value: DartCObjectValue,
}

impl DartCObject {
    fn new(ty: DartCObjectType, value: DartCObjectValue) -> Self {
        DartCObject { ty, value }
    }
}

/// A [`DartValue`] laid out as a tree of `Dart_CObject`s plus the storage it points into.
pub struct EncodedCObject {
    root: Box<DartCObject>,
    _strings: Vec<CString>,
    _nodes: Vec<Box<DartCObject>>,
    _arrays: Vec<Vec<*mut DartCObject>>,
    _bytes: Vec<Vec<u8>>,
}

impl EncodedCObject {
    pub fn encode(value: &DartValue) -> Self {
        let mut encoded = EncodedCObject {
            root: Box::new(DartCObject::new(
                DartCObjectType::Null,
                DartCObjectValue { as_int64: 0 },
            )),
            _strings: Vec::new(),
            _nodes: Vec::new(),
            _arrays: Vec::new(),
            _bytes: Vec::new(),
        };
        let root = encoded.build(value);
        *encoded.root = root;
        encoded
    }

    pub fn as_mut_ptr(&mut self) -> *mut DartCObject {
        &mut *self.root
    }

    fn build(&mut self, value: &DartValue) -> DartCObject {
        match value {
            DartValue::Null => {
                DartCObject::new(DartCObjectType::Null, DartCObjectValue { as_int64: 0 })
            }
            DartValue::Bool(b) => {
                DartCObject::new(DartCObjectType::Bool, DartCObjectValue { as_bool: *b })
            }
            DartValue::Int32(v) => {
                DartCObject::new(DartCObjectType::Int32, DartCObjectValue { as_int32: *v })
            }
            DartValue::Int64(v) => {
                DartCObject::new(DartCObjectType::Int64, DartCObjectValue { as_int64: *v })
            }
            DartValue::String(s) => {
                // Dart strings may hold NUL; a C string cannot.
                let c = CString::new(s.replace('\0', "")).unwrap_or_default();
                let ptr = c.as_ptr();
                self._strings.push(c);
                DartCObject::new(DartCObjectType::String, DartCObjectValue { as_string: ptr })
            }
            DartValue::Bytes(data) => {
                let data = data.clone();
                let typed = DartNativeTypedData {
                    ty: DartTypedDataType::Uint8,
                    length: data.len() as isize,
                    values: data.as_ptr(),
                };
                self._bytes.push(data);
                DartCObject::new(
                    DartCObjectType::TypedData,
                    DartCObjectValue {
                        as_typed_data: typed,
                    },
                )
            }
            DartValue::List(items) => {
                let mut ptrs = Vec::with_capacity(items.len());
                for item in items {
                    let mut node = Box::new(self.build(item));
                    ptrs.push(&mut *node as *mut DartCObject);
                    self._nodes.push(node);
                }
                let array = DartNativeArray {
                    length: ptrs.len() as isize,
                    values: ptrs.as_mut_ptr(),
                };
                self._arrays.push(ptrs);
                DartCObject::new(DartCObjectType::Array, DartCObjectValue { as_array: array })
            }
        }
    }
}

/// Reads a `Dart_CObject` tree back into an owned value.
///
/// Returns `None` for object types this crate never posts.
///
/// # Safety
/// `obj` must point to a valid, fully initialised `Dart_CObject` tree that
/// stays alive for the duration of the call.
pub unsafe fn decode(obj: *const DartCObject) -> Option<DartValue> {
    if obj.is_null() {
        return None;
    }
    unsafe {
        let obj = &*obj;
        Some(match obj.ty {
            DartCObjectType::Null => DartValue::Null,
            DartCObjectType::Bool => DartValue::Bool(obj.value.as_bool),
            DartCObjectType::Int32 => DartValue::Int32(obj.value.as_int32),
            DartCObjectType::Int64 => DartValue::Int64(obj.value.as_int64),
            DartCObjectType::String => {
                let ptr = obj.value.as_string;
                if ptr.is_null() {
                    return None;
                }
                DartValue::String(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
            DartCObjectType::TypedData => {
                let typed = obj.value.as_typed_data;
                if typed.length == 0 {
                    DartValue::Bytes(Vec::new())
                } else {
                    DartValue::Bytes(
                        std::slice::from_raw_parts(typed.values, typed.length as usize).to_vec(),
                    )
                }
            }
            DartCObjectType::Array => {
                let array = obj.value.as_array;
                let mut items = Vec::with_capacity(array.length as usize);
                for i in 0..array.length as usize {
                    items.push(decode(*array.values.add(i))?);
                }
                DartValue::List(items)
            }
            _ => return None,
        })
    }
}

static POST_COBJECT: RwLock<Option<DartPostCObjectFnType>> = parking_lot::const_rwlock(None);

/// Installs (or clears, with `None`) the host's posting function.
pub fn store_post_cobject(ptr: Option<DartPostCObjectFnType>) {
    *POST_COBJECT.write() = ptr;
}

pub fn has_post_cobject() -> bool {
    POST_COBJECT.read().is_some()
}

/// Posts through whatever function `store_dart_post_cobject` last installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DartPostSink;

impl PortSink for DartPostSink {
    fn post(&self, port: DartPort, message: DartValue) -> bool {
        let Some(post) = *POST_COBJECT.read() else {
            error!(
                "[Port] No Dart post function registered; message for port {} dropped",
                port
            );
            return false;
        };
        let mut encoded = EncodedCObject::encode(&message);
        let delivered = unsafe { post(port, encoded.as_mut_ptr()) };
        if !delivered {
            warn!("[Port] Dart_PostCObject rejected message for port {}", port);
        }
        delivered
    }
}
