//! Owned values posted to a port, independent of the Dart C structures.

use crate::constants::{POST_ACTION_ERROR, POST_ACTION_SUCCESS};
use crate::error::BridgeError;
use crate::registry::Handle;

#[derive(Debug, Clone, PartialEq)]
pub enum DartValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    /// Posted as a `Uint8List`.
    Bytes(Vec<u8>),
    List(Vec<DartValue>),
}

impl DartValue {
    /// `[0, value]`
    pub fn success(value: DartValue) -> Self {
        DartValue::List(vec![DartValue::Int32(POST_ACTION_SUCCESS), value])
    }

    /// `[1, code, message]`
    pub fn failure(err: &BridgeError) -> Self {
        DartValue::List(vec![
            DartValue::Int32(POST_ACTION_ERROR),
            DartValue::String(err.code().to_string()),
            DartValue::String(err.to_string()),
        ])
    }

    /// Splits a posted envelope back into its outcome.
    ///
    /// Returns `Ok(value)` for success envelopes and `Err((code, message))` for
    /// failures; `None` when the value is not an envelope at all.
    pub fn into_outcome(self) -> Option<Result<DartValue, (String, String)>> {
        let DartValue::List(mut items) = self else {
            return None;
        };
        let tag = match items.first() {
            Some(DartValue::Int32(tag)) => *tag,
            _ => return None,
        };
        match (tag, items.len()) {
            (POST_ACTION_SUCCESS, 2) => Some(Ok(items.pop()?)),
            (POST_ACTION_ERROR, 3) => {
                let message = items.pop()?;
                let code = items.pop()?;
                match (code, message) {
                    (DartValue::String(code), DartValue::String(message)) => {
                        Some(Err((code, message)))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Conversion of a native result into a postable value.
pub trait IntoDart {
    fn into_dart(self) -> DartValue;
}

impl IntoDart for DartValue {
    fn into_dart(self) -> DartValue {
        self
    }
}

impl IntoDart for () {
    fn into_dart(self) -> DartValue {
        DartValue::Null
    }
}

impl IntoDart for bool {
    fn into_dart(self) -> DartValue {
        DartValue::Bool(self)
    }
}

impl IntoDart for i32 {
    fn into_dart(self) -> DartValue {
        DartValue::Int32(self)
    }
}

impl IntoDart for i64 {
    fn into_dart(self) -> DartValue {
        DartValue::Int64(self)
    }
}

impl IntoDart for u64 {
    fn into_dart(self) -> DartValue {
        DartValue::Int64(self as i64)
    }
}

impl IntoDart for String {
    fn into_dart(self) -> DartValue {
        DartValue::String(self)
    }
}

impl IntoDart for &str {
    fn into_dart(self) -> DartValue {
        DartValue::String(self.to_string())
    }
}

impl IntoDart for Vec<u8> {
    fn into_dart(self) -> DartValue {
        DartValue::Bytes(self)
    }
}

impl IntoDart for Handle {
    fn into_dart(self) -> DartValue {
        DartValue::Int64(self.to_raw() as i64)
    }
}

impl<T: IntoDart> IntoDart for Option<T> {
    fn into_dart(self) -> DartValue {
        match self {
            Some(v) => v.into_dart(),
            None => DartValue::Null,
        }
    }
}
