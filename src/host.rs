//! Seams between the element engine and the object model that embeds it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::EngineResult;
use crate::types::JsValue;

/// What the element engine needs to know about the rest of an array object:
/// its prototype chain and the configurability of its own indices.
pub trait ArrayHost {
    /// Whether an inherited indexed property exists at `index`.
    fn is_shadowed(&self, index: u32) -> bool;

    /// Value found by prototype lookup when the own slot at `index` is a hole.
    fn inherited(&self, index: u32) -> Option<JsValue>;

    /// Whether the own property at `index` may be removed.
    fn is_deletable(&self, _index: u32) -> bool {
        true
    }

    /// True when no prototype carries indexed properties at all, which lets
    /// continuity checks skip the per-index scan.
    fn has_indexed_prototype(&self) -> bool {
        true
    }
}

/// An array whose prototype chain has no indexed properties and whose own
/// indices are all configurable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHost;

impl ArrayHost for PlainHost {
    fn is_shadowed(&self, _index: u32) -> bool {
        false
    }

    fn inherited(&self, _index: u32) -> Option<JsValue> {
        None
    }

    fn has_indexed_prototype(&self) -> bool {
        false
    }
}

/// A host with explicit inherited indices and sealed (undeletable) own
/// indices. Used by the shell and tests to stand in for a real prototype.
#[derive(Debug, Default, Clone)]
pub struct PrototypeHost {
    inherited: FxHashMap<u32, JsValue>,
    sealed: FxHashSet<u32>,
}

impl PrototypeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inherited(mut self, index: u32, value: JsValue) -> Self {
        self.inherited.insert(index, value);
        self
    }

    pub fn with_sealed(mut self, index: u32) -> Self {
        self.sealed.insert(index);
        self
    }
}

impl ArrayHost for PrototypeHost {
    fn is_shadowed(&self, index: u32) -> bool {
        self.inherited.contains_key(&index)
    }

    fn inherited(&self, index: u32) -> Option<JsValue> {
        self.inherited.get(&index).cloned()
    }

    fn is_deletable(&self, index: u32) -> bool {
        !self.sealed.contains(&index)
    }

    fn has_indexed_prototype(&self) -> bool {
        !self.inherited.is_empty()
    }
}

/// The indexed-property protocol the object model drives for both ordinary
/// arrays and typed views.
pub trait IndexedProperties {
    /// Own element at `index`, or `None` for a hole or out-of-range index.
    fn get_index(&self, index: u32) -> Option<JsValue>;

    /// Store `value` at `index`. Returns whether the write took effect.
    fn set_index(&mut self, index: u32, value: JsValue) -> EngineResult<bool>;

    fn has_index(&self, index: u32) -> bool;

    /// Remove the own element at `index`. Returns `false` only when the
    /// receiver itself pins the element, as a typed view does for its
    /// in-range lanes. Sealed array elements are the host's business:
    /// check [`ArrayHost::is_deletable`] before calling this.
    fn delete_index(&mut self, index: u32) -> bool;

    fn index_length(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_host_has_no_prototype_indices() {
        let host = PlainHost;
        assert!(!host.is_shadowed(0));
        assert!(host.inherited(3).is_none());
        assert!(host.is_deletable(7));
        assert!(!host.has_indexed_prototype());
    }

    #[test]
    fn prototype_host_reports_inherited_and_sealed() {
        let host = PrototypeHost::new()
            .with_inherited(2, JsValue::from(9))
            .with_sealed(4);
        assert!(host.is_shadowed(2));
        assert_eq!(host.inherited(2), Some(JsValue::from(9)));
        assert!(!host.is_deletable(4));
        assert!(host.is_deletable(2));
        assert!(host.has_indexed_prototype());
    }
}
