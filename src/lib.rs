//! Element storage for dynamic arrays and typed views over shared byte
//! buffers.
//!
//! Ordinary arrays live in an [`ElementStore`], which picks the narrowest
//! packed representation its contents allow and widens on demand.
//! [`array`] layers the language-level bulk operations on top, and
//! [`callsite`] caches per-call-site speculation over them. Binary data
//! lives in a [`RawBuffer`] aliased by any number of [`TypedView`]s and
//! [`DataView`]s.

pub mod array;
pub mod buffer;
pub mod callsite;
pub mod config;
pub mod elements;
pub mod error;
pub mod host;
pub mod shell;
pub mod typed;
pub mod types;

pub use buffer::RawBuffer;
pub use callsite::{ArrayOp, CallSite};
pub use config::EngineConfig;
pub use elements::{ElementKind, ElementStore};
pub use error::{EngineError, EngineResult};
pub use host::{ArrayHost, IndexedProperties, PlainHost};
pub use typed::{DataView, TypedArrayKind, TypedView};
pub use types::JsValue;

/// An array of `length` holes.
pub fn new_array(length: u32, config: EngineConfig) -> ElementStore {
    ElementStore::with_length(length, config)
}

/// A packed array holding `values`.
pub fn new_array_from(values: Vec<JsValue>, config: EngineConfig) -> EngineResult<ElementStore> {
    ElementStore::from_values(values, config)
}

pub fn new_array_buffer(byte_length: usize) -> RawBuffer {
    RawBuffer::new(byte_length)
}

/// A view over `buffer`; see [`TypedView::new`] for validation.
pub fn new_typed_view(
    buffer: &RawBuffer,
    kind: TypedArrayKind,
    byte_offset: usize,
    length: Option<usize>,
) -> EngineResult<TypedView> {
    TypedView::new(buffer, kind, byte_offset, length)
}

/// A view of `length` elements over its own freshly allocated buffer.
pub fn new_typed_view_with_length(kind: TypedArrayKind, length: usize) -> EngineResult<TypedView> {
    TypedView::with_length(kind, length)
}

pub fn subview(view: &TypedView, begin: f64, end: Option<f64>) -> TypedView {
    view.subview(begin, end)
}
