use std::fmt;

use super::{TypedArrayKind, convert};
use crate::buffer::RawBuffer;
use crate::error::{EngineError, EngineResult};
use crate::types::JsValue;

/// Unaligned, multi-width access to a byte range of a [`RawBuffer`].
///
/// Every access names its lane type and byte order; the view itself has no
/// fixed endianness.
#[derive(Clone)]
pub struct DataView {
    buffer: RawBuffer,
    byte_offset: usize,
    byte_length: usize,
}

impl DataView {
    pub fn new(buffer: &RawBuffer, byte_offset: usize, byte_length: Option<usize>) -> EngineResult<Self> {
        let buf_len = buffer.byte_length();
        if byte_offset > buf_len {
            return Err(EngineError::range(format!(
                "Start offset {byte_offset} is outside the bounds of the buffer"
            )));
        }
        let byte_length = match byte_length {
            Some(len) if len > buf_len - byte_offset => {
                return Err(EngineError::range(format!("Invalid DataView length {len}")));
            }
            Some(len) => len,
            None => buf_len - byte_offset,
        };
        Ok(Self {
            buffer: buffer.clone(),
            byte_offset,
            byte_length,
        })
    }

    pub fn buffer(&self) -> &RawBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    fn lane(&self, byte_offset: usize, kind: TypedArrayKind) -> EngineResult<std::ops::Range<usize>> {
        let size = kind.bytes_per_element();
        if byte_offset.checked_add(size).is_none_or(|end| end > self.byte_length) {
            return Err(EngineError::range("Offset is outside the bounds of the DataView"));
        }
        let start = self.byte_offset + byte_offset;
        Ok(start..start + size)
    }

    /// Read a `kind` lane at `byte_offset` (relative to the view).
    pub fn get(&self, byte_offset: usize, kind: TypedArrayKind, little_endian: bool) -> EngineResult<JsValue> {
        let lane = self.lane(byte_offset, kind)?;
        let bytes = self.buffer.bytes();
        let bits = convert::read_bits(&bytes[lane], little_endian);
        Ok(convert::decode(kind, bits))
    }

    /// Write `value` as a `kind` lane. The value is converted before the
    /// bounds check, so conversion errors win over range errors.
    pub fn set(
        &self,
        byte_offset: usize,
        kind: TypedArrayKind,
        value: &JsValue,
        little_endian: bool,
    ) -> EngineResult<()> {
        let bits = convert::encode(kind, value)?;
        let lane = self.lane(byte_offset, kind)?;
        let mut bytes = self.buffer.bytes_mut();
        convert::write_bits(bits, &mut bytes[lane], little_endian);
        Ok(())
    }
}

macro_rules! dv_accessors {
    ($($get:ident, $set:ident => $kind:ident;)*) => {
        impl DataView {
            $(
                pub fn $get(&self, byte_offset: usize, little_endian: bool) -> EngineResult<JsValue> {
                    self.get(byte_offset, TypedArrayKind::$kind, little_endian)
                }

                pub fn $set(&self, byte_offset: usize, value: &JsValue, little_endian: bool) -> EngineResult<()> {
                    self.set(byte_offset, TypedArrayKind::$kind, value, little_endian)
                }
            )*
        }
    };
}

dv_accessors! {
    get_int8, set_int8 => Int8;
    get_uint8, set_uint8 => Uint8;
    get_int16, set_int16 => Int16;
    get_uint16, set_uint16 => Uint16;
    get_int32, set_int32 => Int32;
    get_uint32, set_uint32 => Uint32;
    get_float16, set_float16 => Float16;
    get_float32, set_float32 => Float32;
    get_float64, set_float64 => Float64;
    get_bigint64, set_bigint64 => BigInt64;
    get_biguint64, set_biguint64 => BigUint64;
}

impl fmt::Debug for DataView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataView")
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}
