use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::types::adjust_index;

/// A fixed-length, zero-initialized byte region.
///
/// Cloning a `RawBuffer` clones the handle, not the bytes: every clone and
/// every view built from one sees the same memory, and the memory lives as
/// long as any handle does. Use [`RawBuffer::slice_clone`] for an
/// independent copy.
#[derive(Clone, Default)]
pub struct RawBuffer {
    data: Rc<RefCell<Vec<u8>>>,
}

impl RawBuffer {
    pub fn new(byte_length: usize) -> Self {
        Self::from_bytes(vec![0u8; byte_length])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Rc::new(RefCell::new(bytes)),
        }
    }

    pub fn byte_length(&self) -> usize {
        self.data.borrow().len()
    }

    /// Copy of bytes `begin..end` (relative indices, clamped) into a new,
    /// unaliased buffer.
    pub fn slice_clone(&self, begin: f64, end: Option<f64>) -> RawBuffer {
        let data = self.data.borrow();
        let len = data.len();
        let first = adjust_index(begin, len);
        let last = end.map_or(len, |e| adjust_index(e, len));
        let bytes = if first < last {
            data[first..last].to_vec()
        } else {
            Vec::new()
        };
        RawBuffer::from_bytes(bytes)
    }

    /// Whether both handles refer to the same bytes.
    pub fn ptr_eq(&self, other: &RawBuffer) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Number of live handles (the buffer itself plus every view).
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.data)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub(crate) fn bytes(&self) -> Ref<'_, Vec<u8>> {
        self.data.borrow()
    }

    pub(crate) fn bytes_mut(&self) -> RefMut<'_, Vec<u8>> {
        self.data.borrow_mut()
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("byte_length", &self.byte_length())
            .field("handles", &self.handle_count())
            .finish()
    }
}
