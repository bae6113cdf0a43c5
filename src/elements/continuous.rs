//! Bulk fast paths over continuous stores.
//!
//! Every entry point first checks that the store is continuous (dense, no
//! holes, nothing inherited showing through) and answers [`NotApplicable`]
//! otherwise, so the caller can fall back to the index-by-index algorithm.

use rustc_hash::FxHashSet;
use tracing::trace;

use super::{ElementKind, ElementStore, Elements, MAX_LENGTH, Repr, reserve_geometric};
use crate::array::ConcatArg;
use crate::error::NotApplicable;
use crate::host::ArrayHost;
use crate::types::JsValue;

impl ElementStore {
    /// Packed storage of a continuous store.
    fn continuous_parts(
        &mut self,
        host: &dyn ArrayHost,
    ) -> Result<(&mut Elements, &mut FxHashSet<u32>), NotApplicable> {
        if !self.is_continuous(host) {
            return Err(NotApplicable);
        }
        match &mut self.repr {
            Repr::Dense { elements, holes } => Ok((elements, holes)),
            Repr::Dictionary { .. } => Err(NotApplicable),
        }
    }

    /// Append `values`, widening once per wider value. Returns the new length.
    pub fn fast_push(&mut self, values: &[JsValue], host: &dyn ArrayHost) -> Result<u32, NotApplicable> {
        let new_len = self.length as usize + values.len();
        if new_len > MAX_LENGTH as usize {
            return Err(NotApplicable);
        }
        let config = self.config;
        let (elements, _) = self.continuous_parts(host)?;
        reserve_geometric(elements, &config, new_len);
        for value in values {
            elements.fit(value);
            let end = elements.len();
            elements.put(end, value.clone());
        }
        self.length = new_len as u32;
        trace!(length = self.length, "fast push");
        Ok(self.length)
    }

    /// Remove and return the last element. Not applicable on an empty store.
    pub fn fast_pop(&mut self, host: &dyn ArrayHost) -> Result<JsValue, NotApplicable> {
        if self.length == 0 {
            return Err(NotApplicable);
        }
        let (elements, _) = self.continuous_parts(host)?;
        let value = elements.pop().ok_or(NotApplicable)?;
        self.length -= 1;
        trace!(length = self.length, "fast pop");
        Ok(value)
    }

    /// A new store holding `self` followed by `other`.
    pub fn fast_concat(&self, other: &ElementStore, host: &dyn ArrayHost) -> Result<ElementStore, NotApplicable> {
        self.fast_concat_all(&[ConcatArg::Array(other)], host)
    }

    /// `self` followed by every argument, built into one new store sized up
    /// front. Array arguments must be continuous too. The result kind is
    /// the join of the non-empty operands, which is what an element-wise
    /// copy ends up with.
    pub fn fast_concat_all(&self, args: &[ConcatArg<'_>], host: &dyn ArrayHost) -> Result<ElementStore, NotApplicable> {
        if !self.is_continuous(host) {
            return Err(NotApplicable);
        }
        let mut total = self.length as usize;
        let mut kind = self.operand_kind();
        for arg in args {
            match arg {
                ConcatArg::Array(other) => {
                    if !other.is_continuous(host) {
                        return Err(NotApplicable);
                    }
                    total += other.length as usize;
                    kind = kind.join(other.operand_kind());
                }
                ConcatArg::Value(value) => {
                    total += 1;
                    kind = kind.join(ElementKind::of(value));
                }
            }
        }
        if total > MAX_LENGTH as usize {
            return Err(NotApplicable);
        }
        let mut elements = Elements::with_kind(kind, total);
        elements.append(self.dense_parts().ok_or(NotApplicable)?);
        for arg in args {
            match arg {
                ConcatArg::Array(other) => elements.append(other.dense_parts().ok_or(NotApplicable)?),
                ConcatArg::Value(value) => {
                    let end = elements.len();
                    elements.put(end, (*value).clone());
                }
            }
        }
        trace!(length = total, kind = kind.name(), "fast concat");
        Ok(ElementStore::from_parts(elements, total as u32, self.config))
    }

    /// Kind this store contributes to a concatenation. An emptied store
    /// keeps its kind but contributes no elements.
    fn operand_kind(&self) -> ElementKind {
        if self.length == 0 { ElementKind::Empty } else { self.kind() }
    }

    /// Copy of `start..end`. Both bounds are already clamped by the caller.
    pub fn fast_slice(&self, start: u32, end: u32, host: &dyn ArrayHost) -> Result<ElementStore, NotApplicable> {
        if start > end || end > self.length || !self.is_continuous(host) {
            return Err(NotApplicable);
        }
        let elements = self.dense_parts().ok_or(NotApplicable)?;
        let part = if start == end {
            Elements::Empty
        } else {
            elements.slice(start as usize..end as usize)
        };
        Ok(ElementStore::from_parts(part, end - start, self.config))
    }

    /// Remove `delete_count` elements at `start` and open `insert_count`
    /// holes in their place for the caller to fill. Returns the removed
    /// elements as their own store.
    pub fn fast_splice(
        &mut self,
        start: u32,
        delete_count: u32,
        insert_count: u32,
        host: &dyn ArrayHost,
    ) -> Result<ElementStore, NotApplicable> {
        let length = self.length as usize;
        let (start_u, delete_u, insert_u) = (start as usize, delete_count as usize, insert_count as usize);
        if start_u > length || delete_u > length - start_u {
            return Err(NotApplicable);
        }
        let new_len = length - delete_u + insert_u;
        if new_len > MAX_LENGTH as usize {
            return Err(NotApplicable);
        }
        let config = self.config;
        let (elements, holes) = self.continuous_parts(host)?;
        let removed = elements.drain(start_u..start_u + delete_u);
        if start_u < elements.len() {
            elements.insert_gap(start_u, insert_u);
            holes.extend(start..start + insert_count);
        }
        self.length = new_len as u32;
        trace!(start, delete_count, insert_count, "fast splice");
        Ok(ElementStore::from_parts(removed, delete_count, config))
    }

    /// Remove the first `n` elements (`shift`). Returns them as a store.
    pub fn shift_left(&mut self, n: u32, host: &dyn ArrayHost) -> Result<ElementStore, NotApplicable> {
        if n > self.length {
            return Err(NotApplicable);
        }
        self.fast_splice(0, n, 0, host)
    }

    /// Open `n` holes at the front (`unshift`); the caller fills them.
    pub fn shift_right(&mut self, n: u32, host: &dyn ArrayHost) -> Result<(), NotApplicable> {
        self.fast_splice(0, 0, n, host).map(|_| ())
    }

    pub fn fast_reverse(&mut self, host: &dyn ArrayHost) -> Result<(), NotApplicable> {
        let (elements, _) = self.continuous_parts(host)?;
        elements.reverse();
        Ok(())
    }

    /// In-bounds read of a packed slot.
    pub fn fast_get(&self, index: u32) -> Result<JsValue, NotApplicable> {
        match &self.repr {
            Repr::Dense { elements, holes } if !holes.contains(&index) => {
                elements.value(index as usize).ok_or(NotApplicable)
            }
            _ => Err(NotApplicable),
        }
    }

    /// Overwrite a packed slot or append right at the end, widening as needed.
    pub fn fast_set(&mut self, index: u32, value: JsValue) -> Result<(), NotApplicable> {
        let length = self.length;
        let config = self.config;
        let Repr::Dense { elements, holes } = &mut self.repr else {
            return Err(NotApplicable);
        };
        let i = index as usize;
        let appending = i == elements.len() && index == length && index < MAX_LENGTH;
        if !(appending || (i < elements.len() && !holes.contains(&index))) {
            return Err(NotApplicable);
        }
        elements.fit(&value);
        if appending {
            reserve_geometric(elements, &config, i + 1);
            self.length = index + 1;
        }
        elements.put(i, value);
        Ok(())
    }

    /// Kind check used by call-site guards: packed and exactly `kind`.
    pub fn is_packed_kind(&self, kind: ElementKind) -> bool {
        !self.is_sparse() && !self.is_dictionary() && self.kind() == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::host::{PlainHost, PrototypeHost};

    fn ints(values: &[i32]) -> ElementStore {
        ElementStore::from_values(
            values.iter().map(|n| JsValue::from(*n)).collect(),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn push_then_pop() {
        let mut store = ints(&[1, 2]);
        assert_eq!(store.fast_push(&[JsValue::from(3)], &PlainHost), Ok(3));
        assert_eq!(store.kind(), ElementKind::Int32);
        assert_eq!(store.fast_push(&[JsValue::Number(0.5)], &PlainHost), Ok(4));
        assert_eq!(store.kind(), ElementKind::Float64);
        assert_eq!(store.fast_pop(&PlainHost), Ok(JsValue::Number(0.5)));
        assert_eq!(store.fast_pop(&PlainHost), Ok(JsValue::from(3)));
        assert_eq!(store.length(), 2);
    }

    #[test]
    fn push_onto_empty_store() {
        let mut store = ElementStore::default();
        assert_eq!(store.fast_push(&[JsValue::string("a"), JsValue::from(1)], &PlainHost), Ok(2));
        assert_eq!(store.kind(), ElementKind::Object);
        assert_eq!(store.get(1), Some(JsValue::from(1)));
    }

    #[test]
    fn pop_on_empty_is_not_applicable() {
        let mut store = ElementStore::default();
        assert_eq!(store.fast_pop(&PlainHost), Err(NotApplicable));
    }

    #[test]
    fn holey_store_is_not_applicable() {
        let mut store = ints(&[1, 2, 3]);
        store.delete(1);
        assert_eq!(store.fast_push(&[JsValue::from(1)], &PlainHost), Err(NotApplicable));
        assert_eq!(store.fast_pop(&PlainHost), Err(NotApplicable));
        assert_eq!(store.length(), 3);
    }

    #[test]
    fn shadowed_store_is_not_applicable() {
        let mut store = ints(&[1, 2]);
        let host = PrototypeHost::new().with_inherited(0, JsValue::Null);
        assert_eq!(store.fast_pop(&host), Err(NotApplicable));
    }

    #[test]
    fn concat_widens_both_sides() {
        let left = ints(&[1, 2]);
        let right = ElementStore::from_values(
            vec![JsValue::Number(0.5), JsValue::Number(-0.0)],
            EngineConfig::default(),
        )
        .unwrap();
        let joined = left.fast_concat(&right, &PlainHost).unwrap();
        assert_eq!(joined.kind(), ElementKind::Float64);
        assert_eq!(joined.length(), 4);
        assert_eq!(joined.get(0), Some(JsValue::from(1)));
        assert_eq!(joined.get(3), Some(JsValue::Number(-0.0)));
        assert_eq!(left.kind(), ElementKind::Int32);
    }

    #[test]
    fn concat_with_empty() {
        let left = ElementStore::default();
        let right = ints(&[4]);
        let joined = left.fast_concat(&right, &PlainHost).unwrap();
        assert_eq!(joined.to_vec(), vec![Some(JsValue::from(4))]);
        let joined = right.fast_concat(&left, &PlainHost).unwrap();
        assert_eq!(joined.kind(), ElementKind::Int32);
    }

    #[test]
    fn emptied_operand_does_not_widen_concat() {
        let mut left = ElementStore::from_values(vec![JsValue::Number(0.5)], EngineConfig::default()).unwrap();
        left.fast_pop(&PlainHost).unwrap();
        assert_eq!(left.kind(), ElementKind::Float64);
        let joined = left.fast_concat(&ints(&[1, 2]), &PlainHost).unwrap();
        assert_eq!(joined.kind(), ElementKind::Int32);
        assert_eq!(joined.to_vec(), vec![Some(JsValue::from(1)), Some(JsValue::from(2))]);
    }

    #[test]
    fn concat_all_appends_every_argument_once() {
        let left = ints(&[1]);
        let doubles = ElementStore::from_values(vec![JsValue::Number(2.5)], EngineConfig::default()).unwrap();
        let right = ints(&[3, 4]);
        let s = JsValue::string("s");
        let args = [ConcatArg::Array(&doubles), ConcatArg::Value(&s), ConcatArg::Array(&right)];
        let joined = left.fast_concat_all(&args, &PlainHost).unwrap();
        assert_eq!(joined.kind(), ElementKind::Object);
        assert_eq!(
            joined.to_vec(),
            vec![
                Some(JsValue::from(1)),
                Some(JsValue::Number(2.5)),
                Some(s.clone()),
                Some(JsValue::from(3)),
                Some(JsValue::from(4)),
            ]
        );
        assert_eq!(joined.capacity(), 5);

        let mut holey = ints(&[1, 2, 3]);
        holey.delete(1);
        assert_eq!(left.fast_concat_all(&[ConcatArg::Array(&holey)], &PlainHost).err(), Some(NotApplicable));
    }

    #[test]
    fn splice_removes_and_reserves() {
        let mut store = ints(&[1, 2, 3, 4, 5]);
        let removed = store.fast_splice(1, 2, 3, &PlainHost).unwrap();
        assert_eq!(removed.to_vec(), vec![Some(JsValue::from(2)), Some(JsValue::from(3))]);
        assert_eq!(store.length(), 6);
        assert!(store.is_sparse());
        for (k, v) in [7, 8, 9].into_iter().enumerate() {
            store.set(1 + k as u32, JsValue::from(v)).unwrap();
        }
        assert!(!store.is_sparse());
        let values: Vec<_> = store.present().map(|(_, v)| v).collect();
        assert_eq!(values, [1, 7, 8, 9, 4, 5].map(JsValue::from));
    }

    #[test]
    fn splice_at_end_uses_implicit_holes() {
        let mut store = ints(&[1]);
        store.fast_splice(1, 0, 2, &PlainHost).unwrap();
        assert_eq!(store.length(), 3);
        store.set(1, JsValue::from(2)).unwrap();
        store.set(2, JsValue::from(3)).unwrap();
        assert!(store.is_continuous(&PlainHost));
    }

    #[test]
    fn splice_out_of_range() {
        let mut store = ints(&[1, 2]);
        assert!(store.fast_splice(3, 0, 0, &PlainHost).is_err());
        assert!(store.fast_splice(1, 2, 0, &PlainHost).is_err());
    }

    #[test]
    fn shift_and_unshift() {
        let mut store = ints(&[1, 2, 3]);
        let first = store.shift_left(1, &PlainHost).unwrap();
        assert_eq!(first.get(0), Some(JsValue::from(1)));
        assert_eq!(store.length(), 2);
        store.shift_right(2, &PlainHost).unwrap();
        store.set(0, JsValue::from(-1)).unwrap();
        store.set(1, JsValue::from(0)).unwrap();
        let values: Vec<_> = store.present().map(|(_, v)| v).collect();
        assert_eq!(values, [-1, 0, 2, 3].map(JsValue::from));
    }

    #[test]
    fn slice_copies() {
        let store = ints(&[1, 2, 3, 4]);
        let part = store.fast_slice(1, 3, &PlainHost).unwrap();
        assert_eq!(part.to_vec(), vec![Some(JsValue::from(2)), Some(JsValue::from(3))]);
        assert_eq!(store.fast_slice(2, 2, &PlainHost).unwrap().length(), 0);
        assert!(store.fast_slice(3, 5, &PlainHost).is_err());
    }

    #[test]
    fn get_and_set_in_bounds() {
        let mut store = ints(&[1, 2]);
        assert_eq!(store.fast_get(1), Ok(JsValue::from(2)));
        assert_eq!(store.fast_get(2), Err(NotApplicable));
        store.fast_set(2, JsValue::from(3)).unwrap();
        assert_eq!(store.length(), 3);
        store.fast_set(0, JsValue::Number(1.5)).unwrap();
        assert_eq!(store.kind(), ElementKind::Float64);
        assert_eq!(store.fast_set(5, JsValue::from(1)), Err(NotApplicable));
        assert!(store.is_packed_kind(ElementKind::Float64));
    }
}
