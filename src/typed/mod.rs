//! Fixed-width numeric views over a shared [`RawBuffer`].
//!
//! A [`TypedView`] is a buffer handle plus a byte offset and an element
//! count. Any number of views may alias the same bytes; a write through
//! one is visible through every other immediately. Elements are stored in
//! the platform's native byte order. [`DataView`] gives unaligned access
//! with an explicit byte order per call.

mod convert;
mod dataview;

pub use dataview::DataView;

use std::fmt;

use tracing::trace;

use crate::buffer::RawBuffer;
use crate::error::{EngineError, EngineResult};
use crate::host::IndexedProperties;
use crate::types::{JsValue, adjust_index};

const NATIVE_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float16,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    pub const ALL: [TypedArrayKind; 12] = [
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Uint8Clamped,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float16,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
        TypedArrayKind::BigInt64,
        TypedArrayKind::BigUint64,
    ];

    pub fn bytes_per_element(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 | TypedArrayKind::Float16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    /// Constructor name, e.g. `Uint8ClampedArray`.
    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float16 => "Float16Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }

    /// Lane name without the `Array` suffix, as used by `DataView`
    /// accessors (`getInt16`, `setFloat32`, ...).
    pub fn lane_name(self) -> &'static str {
        let name = self.name();
        &name[..name.len() - "Array".len()]
    }

    pub fn is_bigint(self) -> bool {
        matches!(self, TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64)
    }

    /// Parse a constructor or lane name (`Int8Array` or `Int8`, any case).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.name().eq_ignore_ascii_case(name) || kind.lane_name().eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for TypedArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of a [`TypedView::bulk_copy`].
#[derive(Debug, Clone, Copy)]
pub enum CopySource<'a> {
    View(&'a TypedView),
    Values(&'a [JsValue]),
}

#[derive(Clone)]
pub struct TypedView {
    buffer: RawBuffer,
    kind: TypedArrayKind,
    byte_offset: usize,
    length: usize,
}

impl TypedView {
    /// View `length` elements of `buffer` starting at `byte_offset`. With
    /// no length, the view covers the rest of the buffer, which must then
    /// be a whole number of elements.
    pub fn new(
        buffer: &RawBuffer,
        kind: TypedArrayKind,
        byte_offset: usize,
        length: Option<usize>,
    ) -> EngineResult<Self> {
        let bpe = kind.bytes_per_element();
        let buf_len = buffer.byte_length();
        if byte_offset % bpe != 0 {
            return Err(EngineError::range(format!(
                "start offset of {kind} should be a multiple of {bpe}"
            )));
        }
        let length = match length {
            Some(length) => {
                let end = length
                    .checked_mul(bpe)
                    .and_then(|bytes| bytes.checked_add(byte_offset));
                if end.is_none_or(|end| end > buf_len) {
                    return Err(EngineError::range(format!("Invalid typed array length: {length}")));
                }
                length
            }
            None => {
                if byte_offset > buf_len {
                    return Err(EngineError::range(format!(
                        "Start offset {byte_offset} is outside the bounds of the buffer"
                    )));
                }
                if (buf_len - byte_offset) % bpe != 0 {
                    return Err(EngineError::range(format!(
                        "byte length of {kind} should be a multiple of {bpe}"
                    )));
                }
                (buf_len - byte_offset) / bpe
            }
        };
        Ok(Self {
            buffer: buffer.clone(),
            kind,
            byte_offset,
            length,
        })
    }

    /// A view over a fresh zeroed buffer of exactly `length` elements.
    pub fn with_length(kind: TypedArrayKind, length: usize) -> EngineResult<Self> {
        let bytes = length
            .checked_mul(kind.bytes_per_element())
            .filter(|bytes| isize::try_from(*bytes).is_ok())
            .ok_or_else(|| EngineError::range(format!("Invalid typed array length: {length}")))?;
        Ok(Self {
            buffer: RawBuffer::new(bytes),
            kind,
            byte_offset: 0,
            length,
        })
    }

    pub fn from_values(kind: TypedArrayKind, values: &[JsValue]) -> EngineResult<Self> {
        let view = Self::with_length(kind, values.len())?;
        view.bulk_copy(0, CopySource::Values(values), 0, values.len())?;
        Ok(view)
    }

    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    pub fn buffer(&self) -> &RawBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.length * self.kind.bytes_per_element()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn lane(&self, index: usize) -> std::ops::Range<usize> {
        let bpe = self.kind.bytes_per_element();
        let start = self.byte_offset + index * bpe;
        start..start + bpe
    }

    /// Element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<JsValue> {
        if index >= self.length {
            return None;
        }
        let bytes = self.buffer.bytes();
        let bits = convert::read_bits(&bytes[self.lane(index)], NATIVE_LITTLE_ENDIAN);
        Some(convert::decode(self.kind, bits))
    }

    /// Store `value` at `index`. The value is converted first, so a BigInt
    /// into a Number lane (or the reverse) fails even past the end; a
    /// successful conversion past the end is dropped without error.
    pub fn set(&self, index: usize, value: &JsValue) -> EngineResult<()> {
        let bits = convert::encode(self.kind, value)?;
        if index >= self.length {
            trace!(index, length = self.length, "typed write out of range ignored");
            return Ok(());
        }
        let mut bytes = self.buffer.bytes_mut();
        let lane = self.lane(index);
        convert::write_bits(bits, &mut bytes[lane], NATIVE_LITTLE_ENDIAN);
        Ok(())
    }

    /// Element at a relative index (negative counts from the end).
    pub fn at(&self, index: f64) -> Option<JsValue> {
        let rel = crate::types::number_ops::to_integer_or_infinity(index);
        let k = if rel < 0.0 { self.length as f64 + rel } else { rel };
        if k < 0.0 || k >= self.length as f64 {
            return None;
        }
        self.get(k as usize)
    }

    pub fn to_vec(&self) -> Vec<JsValue> {
        (0..self.length).filter_map(|i| self.get(i)).collect()
    }

    /// Zero-copy view of elements `begin..end` (relative, clamped) of the
    /// same buffer.
    pub fn subview(&self, begin: f64, end: Option<f64>) -> TypedView {
        let first = adjust_index(begin, self.length);
        let last = end.map_or(self.length, |e| adjust_index(e, self.length));
        let length = last.saturating_sub(first);
        TypedView {
            buffer: self.buffer.clone(),
            kind: self.kind,
            byte_offset: self.byte_offset + first * self.kind.bytes_per_element(),
            length,
        }
    }

    /// Copy of elements `begin..end` into a new buffer.
    pub fn slice(&self, begin: f64, end: Option<f64>) -> TypedView {
        let part = self.subview(begin, end);
        let range = part.byte_offset..part.byte_offset + part.byte_length();
        let bytes = self.buffer.bytes()[range].to_vec();
        TypedView {
            buffer: RawBuffer::from_bytes(bytes),
            kind: self.kind,
            byte_offset: 0,
            length: part.length,
        }
    }

    /// Write `count` elements of `source` starting at `source_offset` into
    /// this view starting at `dest_offset`.
    ///
    /// Same-kind view sources are copied bytewise; other sources convert
    /// element by element. A source aliasing this view's buffer is
    /// snapshotted first so overlapping ranges copy correctly.
    pub fn bulk_copy(
        &self,
        dest_offset: usize,
        source: CopySource<'_>,
        source_offset: usize,
        count: usize,
    ) -> EngineResult<()> {
        if dest_offset.checked_add(count).is_none_or(|end| end > self.length) {
            return Err(EngineError::range("offset is out of bounds"));
        }
        match source {
            CopySource::View(src) => {
                if src.kind.is_bigint() != self.kind.is_bigint() {
                    return Err(EngineError::type_error(
                        "Cannot mix BigInt and other types, use explicit conversions",
                    ));
                }
                if source_offset.checked_add(count).is_none_or(|end| end > src.length) {
                    return Err(EngineError::range("source offset is out of bounds"));
                }
                if count == 0 {
                    return Ok(());
                }
                if src.kind == self.kind {
                    let bpe = self.kind.bytes_per_element();
                    let from = src.byte_offset + source_offset * bpe;
                    let to = self.byte_offset + dest_offset * bpe;
                    let len = count * bpe;
                    if src.buffer.ptr_eq(&self.buffer) {
                        self.buffer.bytes_mut().copy_within(from..from + len, to);
                    } else {
                        let src_bytes = src.buffer.bytes();
                        self.buffer.bytes_mut()[to..to + len].copy_from_slice(&src_bytes[from..from + len]);
                    }
                } else {
                    let values: Vec<JsValue> = (source_offset..source_offset + count)
                        .filter_map(|i| src.get(i))
                        .collect();
                    self.write_values(dest_offset, &values)?;
                }
            }
            CopySource::Values(values) => {
                let part = source_offset
                    .checked_add(count)
                    .and_then(|end| values.get(source_offset..end))
                    .ok_or_else(|| EngineError::range("source offset is out of bounds"))?;
                self.write_values(dest_offset, part)?;
            }
        }
        trace!(kind = %self.kind, dest_offset, count, "bulk copy");
        Ok(())
    }

    fn write_values(&self, dest_offset: usize, values: &[JsValue]) -> EngineResult<()> {
        for (i, value) in values.iter().enumerate() {
            self.set(dest_offset + i, value)?;
        }
        Ok(())
    }

    /// `fill(value, start, end)` with relative-index clamping. The value is
    /// converted once up front.
    pub fn fill(&self, value: &JsValue, start: f64, end: Option<f64>) -> EngineResult<()> {
        let bits = convert::encode(self.kind, value)?;
        let first = adjust_index(start, self.length);
        let last = end.map_or(self.length, |e| adjust_index(e, self.length));
        let mut bytes = self.buffer.bytes_mut();
        for i in first..last.max(first) {
            let lane = self.lane(i);
            convert::write_bits(bits, &mut bytes[lane], NATIVE_LITTLE_ENDIAN);
        }
        Ok(())
    }

    /// `copyWithin(target, start, end)`: move elements inside the view as
    /// if through an intermediate copy.
    pub fn copy_within(&self, target: f64, start: f64, end: Option<f64>) {
        let to = adjust_index(target, self.length);
        let from = adjust_index(start, self.length);
        let last = end.map_or(self.length, |e| adjust_index(e, self.length));
        let count = last.saturating_sub(from).min(self.length - to);
        if count == 0 {
            return;
        }
        let bpe = self.kind.bytes_per_element();
        let src = self.byte_offset + from * bpe;
        self.buffer
            .bytes_mut()
            .copy_within(src..src + count * bpe, self.byte_offset + to * bpe);
    }
}

impl fmt::Debug for TypedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("kind", &self.kind)
            .field("byte_offset", &self.byte_offset)
            .field("length", &self.length)
            .finish()
    }
}

impl IndexedProperties for TypedView {
    fn get_index(&self, index: u32) -> Option<JsValue> {
        self.get(index as usize)
    }

    fn set_index(&mut self, index: u32, value: JsValue) -> EngineResult<bool> {
        self.set(index as usize, &value)?;
        Ok((index as usize) < self.length)
    }

    fn has_index(&self, index: u32) -> bool {
        (index as usize) < self.length
    }

    fn delete_index(&mut self, index: u32) -> bool {
        !self.has_index(index)
    }

    fn index_length(&self) -> u32 {
        u32::try_from(self.length).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JsBigInt;

    fn nums(values: &[f64]) -> Vec<JsValue> {
        values.iter().map(|n| JsValue::Number(*n)).collect()
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in TypedArrayKind::ALL {
            assert_eq!(TypedArrayKind::from_name(kind.name()), Some(kind));
            assert_eq!(TypedArrayKind::from_name(kind.lane_name()), Some(kind));
        }
        assert_eq!(TypedArrayKind::from_name("uint8clamped"), Some(TypedArrayKind::Uint8Clamped));
        assert_eq!(TypedArrayKind::from_name("Int64"), None);
    }

    #[test]
    fn construction_validates_alignment_and_extent() {
        let buf = RawBuffer::new(16);
        assert!(matches!(
            TypedView::new(&buf, TypedArrayKind::Int32, 2, None),
            Err(EngineError::Range(_))
        ));
        assert!(matches!(
            TypedView::new(&buf, TypedArrayKind::Int32, 8, Some(3)),
            Err(EngineError::Range(_))
        ));
        let v = TypedView::new(&buf, TypedArrayKind::Int32, 8, None).unwrap();
        assert_eq!(v.length(), 2);
        assert_eq!(v.byte_length(), 8);
        assert!(matches!(
            TypedView::new(&buf, TypedArrayKind::Int32, 20, None),
            Err(EngineError::Range(_))
        ));
    }

    #[test]
    fn remainder_must_be_whole_elements() {
        let buf = RawBuffer::new(10);
        assert!(matches!(
            TypedView::new(&buf, TypedArrayKind::Float64, 0, None),
            Err(EngineError::Range(_))
        ));
        assert_eq!(TypedView::new(&buf, TypedArrayKind::Int16, 4, None).unwrap().length(), 3);
    }

    #[test]
    fn read_absent_write_ignored_past_end() {
        let v = TypedView::with_length(TypedArrayKind::Uint8, 2).unwrap();
        assert_eq!(v.get(2), None);
        v.set(2, &JsValue::from(9)).unwrap();
        assert_eq!(v.buffer().to_vec(), vec![0, 0]);
    }

    #[test]
    fn views_alias() {
        let buf = RawBuffer::new(8);
        let bytes = TypedView::new(&buf, TypedArrayKind::Uint8, 0, None).unwrap();
        let words = TypedView::new(&buf, TypedArrayKind::Uint32, 4, Some(1)).unwrap();
        words.set(0, &JsValue::Number(0x01020304 as f64)).unwrap();
        let expect: [u8; 4] = 0x01020304u32.to_ne_bytes();
        for (i, b) in expect.iter().enumerate() {
            assert_eq!(bytes.get(4 + i), Some(JsValue::from(*b as i32)));
        }
    }

    #[test]
    fn subview_clamps_and_shares() {
        let v = TypedView::from_values(TypedArrayKind::Int16, &nums(&[0., 1., 2., 3., 4., 5., 6., 7., 8., 9.]))
            .unwrap();
        let a = v.subview(-2.0, Some(1000.0));
        let b = v.subview(8.0, Some(10.0));
        assert_eq!(a.byte_offset(), b.byte_offset());
        assert_eq!(a.length(), 2);
        assert_eq!(a.to_vec(), b.to_vec());
        a.set(0, &JsValue::from(-1)).unwrap();
        assert_eq!(v.get(8), Some(JsValue::from(-1)));
        assert_eq!(v.subview(5.0, Some(2.0)).length(), 0);
    }

    #[test]
    fn slice_copies() {
        let v = TypedView::from_values(TypedArrayKind::Float32, &nums(&[1.5, 2.5, 3.5])).unwrap();
        let s = v.slice(1.0, None);
        assert_eq!(s.to_vec(), nums(&[2.5, 3.5]));
        s.set(0, &JsValue::from(0)).unwrap();
        assert_eq!(v.get(1), Some(JsValue::Number(2.5)));
    }

    #[test]
    fn bulk_copy_converts_between_kinds() {
        let floats = TypedView::from_values(TypedArrayKind::Float64, &nums(&[-5.0, 300.0, 127.5, 1.7])).unwrap();
        let clamped = TypedView::with_length(TypedArrayKind::Uint8Clamped, 4).unwrap();
        clamped.bulk_copy(0, CopySource::View(&floats), 0, 4).unwrap();
        assert_eq!(clamped.to_vec(), nums(&[0., 255., 128., 2.]));
        let wrapped = TypedView::with_length(TypedArrayKind::Uint8, 4).unwrap();
        wrapped.bulk_copy(0, CopySource::View(&floats), 0, 4).unwrap();
        assert_eq!(wrapped.to_vec(), nums(&[251., 44., 127., 1.]));
    }

    #[test]
    fn bulk_copy_overlapping_same_buffer() {
        let v = TypedView::from_values(TypedArrayKind::Uint8, &nums(&[1., 2., 3., 4., 5.])).unwrap();
        let head = v.subview(0.0, Some(3.0));
        v.bulk_copy(2, CopySource::View(&head), 0, 3).unwrap();
        assert_eq!(v.to_vec(), nums(&[1., 2., 1., 2., 3.]));

        // Different kinds over one buffer: source values are read before
        // any destination byte is written.
        let buf = RawBuffer::new(8);
        let halves = TypedView::new(&buf, TypedArrayKind::Uint16, 0, None).unwrap();
        halves.bulk_copy(0, CopySource::Values(&nums(&[1., 2., 3., 4.])), 0, 4).unwrap();
        let bytes = TypedView::new(&buf, TypedArrayKind::Uint8, 0, None).unwrap();
        bytes.bulk_copy(0, CopySource::View(&halves), 0, 4).unwrap();
        assert_eq!(bytes.subview(0.0, Some(4.0)).to_vec(), nums(&[1., 2., 3., 4.]));
    }

    #[test]
    fn bulk_copy_rejects_mixing_and_overflow() {
        let big = TypedView::from_values(TypedArrayKind::BigInt64, &[JsValue::BigInt(JsBigInt::from(3i64))]).unwrap();
        let ints = TypedView::with_length(TypedArrayKind::Int32, 1).unwrap();
        assert!(matches!(
            ints.bulk_copy(0, CopySource::View(&big), 0, 1),
            Err(EngineError::Type(_))
        ));
        assert!(matches!(
            ints.bulk_copy(1, CopySource::Values(&nums(&[1.0])), 0, 1),
            Err(EngineError::Range(_))
        ));
    }

    #[test]
    fn fill_and_copy_within() {
        let v = TypedView::with_length(TypedArrayKind::Int8, 5).unwrap();
        v.fill(&JsValue::from(7), 1.0, Some(-1.0)).unwrap();
        assert_eq!(v.to_vec(), nums(&[0., 7., 7., 7., 0.]));
        v.set(0, &JsValue::from(1)).unwrap();
        v.copy_within(3.0, 0.0, None);
        assert_eq!(v.to_vec(), nums(&[1., 7., 7., 1., 7.]));
    }

    #[test]
    fn at_counts_from_end() {
        let v = TypedView::from_values(TypedArrayKind::Uint16, &nums(&[10., 20., 30.])).unwrap();
        assert_eq!(v.at(-1.0), Some(JsValue::from(30)));
        assert_eq!(v.at(3.0), None);
        assert_eq!(v.at(-4.0), None);
    }

    #[test]
    fn bigint_lane_rejects_number_write() {
        let v = TypedView::with_length(TypedArrayKind::BigUint64, 1).unwrap();
        assert!(matches!(v.set(0, &JsValue::from(1)), Err(EngineError::Type(_))));
        v.set(0, &JsValue::BigInt(JsBigInt::from(5i64))).unwrap();
        assert_eq!(v.get(0), Some(JsValue::BigInt(JsBigInt::from(5u64))));
    }

    #[test]
    fn indexed_protocol() {
        let mut v = TypedView::with_length(TypedArrayKind::Int32, 2).unwrap();
        assert!(v.set_index(1, JsValue::from(4)).unwrap());
        assert!(!v.set_index(2, JsValue::from(4)).unwrap());
        assert!(!v.delete_index(0));
        assert!(v.delete_index(5));
        assert_eq!(v.index_length(), 2);
    }
}
