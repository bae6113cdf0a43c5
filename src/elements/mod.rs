//! Representation-polymorphic backing storage for array elements.
//!
//! A store starts out [`ElementKind::Empty`] and only ever widens:
//!
//! ```text
//! Empty  →  Int32  →  Float64  →  Object
//! ```
//!
//! Widening copies every element into the wider vector; stores never hold
//! mixed element types. Holes are orthogonal to the kind. A dense store
//! records them in a side set (plus the implicit tail between the physical
//! end and `length`); a store written far past its end switches to an
//! ordered dictionary, still tracking the kind it would have if packed.

mod continuous;

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, TruncateError};
use crate::host::{ArrayHost, IndexedProperties};
use crate::types::{JsValue, number_ops, to_number};

/// Largest valid array length, 2^32 - 1.
pub const MAX_LENGTH: u32 = u32::MAX;

/// Element representation of a store, ordered from least to most general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Empty,
    Int32,
    Float64,
    Object,
}

impl ElementKind {
    /// The least general kind able to hold `value` exactly.
    pub fn of(value: &JsValue) -> Self {
        match value {
            JsValue::Number(n) if number_ops::as_exact_int32(*n).is_some() => ElementKind::Int32,
            JsValue::Number(_) => ElementKind::Float64,
            _ => ElementKind::Object,
        }
    }

    pub fn join(self, other: ElementKind) -> ElementKind {
        self.max(other)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Empty => "Empty",
            ElementKind::Int32 => "Int32",
            ElementKind::Float64 => "Float64",
            ElementKind::Object => "Object",
        }
    }

    pub fn holds(self, value: &JsValue) -> bool {
        ElementKind::of(value) <= self
    }
}

/// Packed element vector of a single kind.
#[derive(Debug, Clone, Default)]
pub(crate) enum Elements {
    #[default]
    Empty,
    Int32(Vec<i32>),
    Float64(Vec<f64>),
    Object(Vec<JsValue>),
}

impl Elements {
    fn with_kind(kind: ElementKind, capacity: usize) -> Self {
        match kind {
            ElementKind::Empty => Elements::Empty,
            ElementKind::Int32 => Elements::Int32(Vec::with_capacity(capacity)),
            ElementKind::Float64 => Elements::Float64(Vec::with_capacity(capacity)),
            ElementKind::Object => Elements::Object(Vec::with_capacity(capacity)),
        }
    }

    pub(crate) fn kind(&self) -> ElementKind {
        match self {
            Elements::Empty => ElementKind::Empty,
            Elements::Int32(_) => ElementKind::Int32,
            Elements::Float64(_) => ElementKind::Float64,
            Elements::Object(_) => ElementKind::Object,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Elements::Empty => 0,
            Elements::Int32(v) => v.len(),
            Elements::Float64(v) => v.len(),
            Elements::Object(v) => v.len(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Elements::Empty => 0,
            Elements::Int32(v) => v.capacity(),
            Elements::Float64(v) => v.capacity(),
            Elements::Object(v) => v.capacity(),
        }
    }

    fn reserve_exact(&mut self, additional: usize) {
        match self {
            Elements::Empty => {}
            Elements::Int32(v) => v.reserve_exact(additional),
            Elements::Float64(v) => v.reserve_exact(additional),
            Elements::Object(v) => v.reserve_exact(additional),
        }
    }

    fn value(&self, i: usize) -> Option<JsValue> {
        match self {
            Elements::Empty => None,
            Elements::Int32(v) => v.get(i).map(|n| JsValue::Number(f64::from(*n))),
            Elements::Float64(v) => v.get(i).map(|n| JsValue::Number(*n)),
            Elements::Object(v) => v.get(i).cloned(),
        }
    }

    /// Convert every element to `kind` in a fresh vector. Narrowing is a no-op.
    pub(crate) fn widen_to(&mut self, kind: ElementKind) {
        let from = self.kind();
        if kind <= from {
            return;
        }
        debug!(from = from.name(), to = kind.name(), len = self.len(), "widening element storage");
        let widened = match (std::mem::take(self), kind) {
            (Elements::Empty, kind) => Elements::with_kind(kind, 0),
            (Elements::Int32(v), ElementKind::Float64) => {
                Elements::Float64(v.into_iter().map(f64::from).collect())
            }
            (Elements::Int32(v), _) => Elements::Object(
                v.into_iter()
                    .map(|n| JsValue::Number(f64::from(n)))
                    .collect(),
            ),
            (Elements::Float64(v), _) => {
                Elements::Object(v.into_iter().map(JsValue::Number).collect())
            }
            (other, _) => other,
        };
        *self = widened;
    }

    /// Widen if `value` does not fit the current kind.
    pub(crate) fn fit(&mut self, value: &JsValue) {
        let needed = ElementKind::of(value);
        if needed > self.kind() {
            self.widen_to(needed);
        }
    }

    /// Write `value` at `i`, where `i <= len`. The caller has already
    /// widened with [`Elements::fit`].
    pub(crate) fn put(&mut self, i: usize, value: JsValue) {
        fn set_or_push<T>(v: &mut Vec<T>, i: usize, x: T) {
            if i < v.len() {
                v[i] = x;
            } else {
                v.push(x);
            }
        }
        match self {
            Elements::Empty => unreachable!("put on empty storage without fit"),
            Elements::Int32(v) => set_or_push(v, i, value.as_number().map_or(0, |n| n as i32)),
            Elements::Float64(v) => set_or_push(v, i, value.as_number().unwrap_or(f64::NAN)),
            Elements::Object(v) => set_or_push(v, i, value),
        }
    }

    /// Append filler slots up to `len`. The caller records them as holes.
    fn pad_to(&mut self, len: usize) {
        match self {
            Elements::Empty => {}
            Elements::Int32(v) => v.resize(len, 0),
            Elements::Float64(v) => v.resize(len, f64::NAN),
            Elements::Object(v) => v.resize(len, JsValue::Undefined),
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            Elements::Empty => {}
            Elements::Int32(v) => v.truncate(len),
            Elements::Float64(v) => v.truncate(len),
            Elements::Object(v) => v.truncate(len),
        }
    }

    /// Remove and return the last element.
    pub(crate) fn pop(&mut self) -> Option<JsValue> {
        match self {
            Elements::Empty => None,
            Elements::Int32(v) => v.pop().map(|n| JsValue::Number(f64::from(n))),
            Elements::Float64(v) => v.pop().map(JsValue::Number),
            Elements::Object(v) => v.pop(),
        }
    }

    /// Remove `range` and return the removed elements as a vector of the
    /// same kind.
    pub(crate) fn drain(&mut self, range: std::ops::Range<usize>) -> Elements {
        match self {
            Elements::Empty => Elements::Empty,
            Elements::Int32(v) => Elements::Int32(v.drain(range).collect()),
            Elements::Float64(v) => Elements::Float64(v.drain(range).collect()),
            Elements::Object(v) => Elements::Object(v.drain(range).collect()),
        }
    }

    /// Insert `count` filler slots at `at`.
    pub(crate) fn insert_gap(&mut self, at: usize, count: usize) {
        match self {
            Elements::Empty => {}
            Elements::Int32(v) => {
                v.splice(at..at, std::iter::repeat_n(0, count));
            }
            Elements::Float64(v) => {
                v.splice(at..at, std::iter::repeat_n(f64::NAN, count));
            }
            Elements::Object(v) => {
                v.splice(at..at, std::iter::repeat_n(JsValue::Undefined, count));
            }
        }
    }

    /// Copy of `range` in the same kind.
    pub(crate) fn slice(&self, range: std::ops::Range<usize>) -> Elements {
        match self {
            Elements::Empty => Elements::Empty,
            Elements::Int32(v) => Elements::Int32(v[range].to_vec()),
            Elements::Float64(v) => Elements::Float64(v[range].to_vec()),
            Elements::Object(v) => Elements::Object(v[range].to_vec()),
        }
    }

    /// Append all of `other`, converting each element to this kind, which
    /// must be at least as wide.
    pub(crate) fn append(&mut self, other: &Elements) {
        match (self, other) {
            (_, b) if b.len() == 0 => {}
            (Elements::Int32(a), Elements::Int32(b)) => a.extend_from_slice(b),
            (Elements::Float64(a), Elements::Float64(b)) => a.extend_from_slice(b),
            (Elements::Float64(a), Elements::Int32(b)) => a.extend(b.iter().map(|n| f64::from(*n))),
            (Elements::Object(a), Elements::Object(b)) => a.extend_from_slice(b),
            (Elements::Object(a), b) => a.extend((0..b.len()).filter_map(|i| b.value(i))),
            (a, b) => debug_assert!(false, "append {:?} onto {:?}", b.kind(), a.kind()),
        }
    }

    pub(crate) fn reverse(&mut self) {
        match self {
            Elements::Empty => {}
            Elements::Int32(v) => v.reverse(),
            Elements::Float64(v) => v.reverse(),
            Elements::Object(v) => v.reverse(),
        }
    }
}

#[derive(Debug, Clone)]
enum Repr {
    /// Physical slots `0..elements.len()`; `holes` lists the absent ones.
    /// Every index from the physical end up to `length` is a hole too.
    Dense {
        elements: Elements,
        holes: FxHashSet<u32>,
    },
    /// Very sparse arrays. `kind` is the kind the store would need if packed.
    Dictionary {
        map: BTreeMap<u32, JsValue>,
        kind: ElementKind,
    },
}

/// The indexed elements of one array value together with its `length`.
#[derive(Debug, Clone)]
pub struct ElementStore {
    length: u32,
    repr: Repr,
    config: EngineConfig,
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ElementStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            length: 0,
            repr: Repr::Dense {
                elements: Elements::Empty,
                holes: FxHashSet::default(),
            },
            config,
        }
    }

    /// `new Array(length)`: every index is a hole.
    pub fn with_length(length: u32, config: EngineConfig) -> Self {
        let mut store = Self::new(config);
        store.length = length;
        store
    }

    /// `Array.of(...values)`: a packed store of the widest kind needed.
    pub fn from_values(values: Vec<JsValue>, config: EngineConfig) -> EngineResult<Self> {
        let length = u32::try_from(values.len())
            .map_err(|_| EngineError::range("Invalid array length"))?;
        let kind = values
            .iter()
            .fold(ElementKind::Empty, |k, v| k.join(ElementKind::of(v)));
        let mut elements = Elements::with_kind(kind, values.len());
        for (i, value) in values.into_iter().enumerate() {
            elements.put(i, value);
        }
        Ok(Self::from_parts(elements, length, config))
    }

    pub(crate) fn from_parts(elements: Elements, length: u32, config: EngineConfig) -> Self {
        Self {
            length,
            repr: Repr::Dense {
                elements,
                holes: FxHashSet::default(),
            },
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn kind(&self) -> ElementKind {
        match &self.repr {
            Repr::Dense { elements, .. } => elements.kind(),
            Repr::Dictionary { kind, .. } => *kind,
        }
    }

    /// Whether the store is in dictionary mode.
    pub fn is_dictionary(&self) -> bool {
        matches!(self.repr, Repr::Dictionary { .. })
    }

    /// True when some index in `0..length` is a hole.
    pub fn is_sparse(&self) -> bool {
        match &self.repr {
            Repr::Dense { elements, holes } => {
                !holes.is_empty() || elements.len() < self.length as usize
            }
            Repr::Dictionary { map, .. } => map.len() < self.length as usize,
        }
    }

    /// Eligible for bulk fast paths: no holes, and no inherited index in
    /// `0..length` that could be observed through one.
    pub fn is_continuous(&self, host: &dyn ArrayHost) -> bool {
        if self.is_sparse() || self.is_dictionary() {
            return false;
        }
        !host.has_indexed_prototype() || !(0..self.length).any(|i| host.is_shadowed(i))
    }

    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Dense { elements, .. } => elements.capacity(),
            Repr::Dictionary { map, .. } => map.len(),
        }
    }

    pub fn get(&self, index: u32) -> Option<JsValue> {
        if index >= self.length {
            return None;
        }
        match &self.repr {
            Repr::Dense { elements, holes } => {
                if holes.contains(&index) {
                    None
                } else {
                    elements.value(index as usize)
                }
            }
            Repr::Dictionary { map, .. } => map.get(&index).cloned(),
        }
    }

    pub fn has(&self, index: u32) -> bool {
        match &self.repr {
            Repr::Dense { elements, holes } => {
                (index as usize) < elements.len() && !holes.contains(&index)
            }
            Repr::Dictionary { map, .. } => map.contains_key(&index),
        }
    }

    /// Store `value` at `index`, widening the whole store first when the
    /// value does not fit its kind. Writing at or past `length` extends it.
    pub fn set(&mut self, index: u32, value: JsValue) -> EngineResult<()> {
        if index == MAX_LENGTH {
            return Err(EngineError::range("Invalid array index"));
        }
        let gap = self.config.sparse_gap as usize;
        let phys = match &self.repr {
            Repr::Dense { elements, .. } => elements.len(),
            Repr::Dictionary { .. } => 0,
        };
        if !self.is_dictionary() && (index as usize) > phys + gap {
            self.make_dictionary();
        }
        match &mut self.repr {
            Repr::Dense { elements, holes } => {
                let i = index as usize;
                elements.fit(&value);
                if i > phys {
                    reserve_geometric(elements, &self.config, i + 1);
                    elements.pad_to(i);
                    holes.extend(phys as u32..index);
                } else if i == phys {
                    reserve_geometric(elements, &self.config, i + 1);
                } else {
                    holes.remove(&index);
                }
                elements.put(i, value);
            }
            Repr::Dictionary { map, kind } => {
                *kind = kind.join(ElementKind::of(&value));
                map.insert(index, value);
            }
        }
        if index >= self.length {
            self.length = index + 1;
        }
        self.maybe_densify();
        Ok(())
    }

    /// Turn `index` into a hole. `length` is unchanged. Returns whether an
    /// element was removed.
    pub fn delete(&mut self, index: u32) -> bool {
        match &mut self.repr {
            Repr::Dense { elements, holes } => {
                let i = index as usize;
                if i >= elements.len() || holes.contains(&index) {
                    return false;
                }
                if i + 1 == elements.len() {
                    elements.pop();
                    trim_trailing_holes(elements, holes);
                } else {
                    holes.insert(index);
                }
                true
            }
            Repr::Dictionary { map, .. } => map.remove(&index).is_some(),
        }
    }

    /// Pre-grow capacity so indices up to `min_index` can be written without
    /// reallocating. No observable effect.
    pub fn ensure(&mut self, min_index: u32) {
        if let Repr::Dense { elements, .. } = &mut self.repr {
            let needed = min_index as usize + 1;
            if needed <= elements.len() + self.config.sparse_gap as usize {
                reserve_geometric(elements, &self.config, needed);
            }
        }
    }

    /// Drop every index `>= new_length`, from the top down. Stops at the
    /// first index `host` refuses to delete and leaves `length` just above
    /// it. Has no effect when `new_length >= length`.
    pub fn truncate(&mut self, new_length: u32, host: &dyn ArrayHost) -> Result<(), TruncateError> {
        if new_length >= self.length {
            return Ok(());
        }
        let blocked = self
            .present_indices_from(new_length)
            .into_iter()
            .rev()
            .find(|&i| !host.is_deletable(i));
        let keep = blocked.map_or(new_length, |i| i + 1);
        match &mut self.repr {
            Repr::Dense { elements, holes } => {
                if (keep as usize) < elements.len() {
                    elements.truncate(keep as usize);
                }
                holes.retain(|&i| i < keep);
                trim_trailing_holes(elements, holes);
            }
            Repr::Dictionary { map, .. } => {
                map.split_off(&keep);
            }
        }
        self.length = keep;
        self.maybe_densify();
        match blocked {
            Some(_) => Err(TruncateError {
                requested: new_length,
                retained: keep,
            }),
            None => Ok(()),
        }
    }

    /// Assign the `length` property: grow with trailing holes or truncate.
    pub fn set_length(&mut self, new_length: u32, host: &dyn ArrayHost) -> Result<(), TruncateError> {
        if new_length >= self.length {
            self.length = new_length;
            return Ok(());
        }
        self.truncate(new_length, host)
    }

    /// `array.length = value` with the language's validation: the value must
    /// be an integral number in `0..=2^32-1`.
    pub fn set_length_value(&mut self, value: &JsValue, host: &dyn ArrayHost) -> EngineResult<()> {
        let number = to_number(value);
        let new_length = number_ops::to_uint32(number);
        if f64::from(new_length) != number {
            return Err(EngineError::range("Invalid array length"));
        }
        self.set_length(new_length, host)?;
        Ok(())
    }

    /// The least general kind able to hold the elements of both stores.
    pub fn widest(&self, other: &ElementStore) -> ElementKind {
        self.kind().join(other.kind())
    }

    /// Convert all elements to `kind` (no-op if already at least as wide).
    pub fn widen_to(&mut self, kind: ElementKind) {
        match &mut self.repr {
            Repr::Dense { elements, .. } => elements.widen_to(kind),
            Repr::Dictionary { kind: k, .. } => *k = k.join(kind),
        }
    }

    /// Present elements in ascending index order.
    pub fn present(&self) -> Box<dyn Iterator<Item = (u32, JsValue)> + '_> {
        match &self.repr {
            Repr::Dense { elements, holes } => Box::new(
                (0..elements.len() as u32)
                    .filter(move |i| !holes.contains(i))
                    .filter_map(move |i| elements.value(i as usize).map(|v| (i, v))),
            ),
            Repr::Dictionary { map, .. } => Box::new(map.iter().map(|(i, v)| (*i, v.clone()))),
        }
    }

    /// Every slot in `0..length`, holes as `None`.
    pub fn to_vec(&self) -> Vec<Option<JsValue>> {
        (0..self.length).map(|i| self.get(i)).collect()
    }

    fn present_indices_from(&self, from: u32) -> Vec<u32> {
        match &self.repr {
            Repr::Dense { elements, holes } => (from..elements.len() as u32)
                .filter(|i| !holes.contains(i))
                .collect(),
            Repr::Dictionary { map, .. } => map.range(from..).map(|(i, _)| *i).collect(),
        }
    }

    fn make_dictionary(&mut self) {
        let map: BTreeMap<u32, JsValue> = match &self.repr {
            Repr::Dense { .. } => self.present().collect(),
            Repr::Dictionary { .. } => return,
        };
        let kind = self.kind();
        debug!(
            length = self.length,
            present = map.len(),
            kind = kind.name(),
            "element store switched to dictionary mode"
        );
        self.repr = Repr::Dictionary { map, kind };
    }

    /// Leave dictionary mode once every index below `length` is present.
    fn maybe_densify(&mut self) {
        let Repr::Dictionary { map, kind } = &mut self.repr else {
            return;
        };
        if map.len() != self.length as usize {
            return;
        }
        let mut elements = Elements::with_kind(*kind, map.len());
        for (i, value) in std::mem::take(map).into_values().enumerate() {
            elements.put(i, value);
        }
        self.repr = Repr::Dense {
            elements,
            holes: FxHashSet::default(),
        };
    }

    pub(crate) fn dense_parts(&self) -> Option<&Elements> {
        match &self.repr {
            Repr::Dense { elements, .. } => Some(elements),
            Repr::Dictionary { .. } => None,
        }
    }
}

fn reserve_geometric(elements: &mut Elements, config: &EngineConfig, needed: usize) {
    let cap = elements.capacity();
    if cap < needed {
        let target = config.grown_capacity(cap, needed);
        elements.reserve_exact(target - elements.len());
    }
}

/// Holes at the physical end are implicit; drop their filler slots.
fn trim_trailing_holes(elements: &mut Elements, holes: &mut FxHashSet<u32>) {
    while let Some(last) = elements.len().checked_sub(1) {
        if !holes.remove(&(last as u32)) {
            break;
        }
        elements.truncate(last);
    }
}

impl IndexedProperties for ElementStore {
    fn get_index(&self, index: u32) -> Option<JsValue> {
        self.get(index)
    }

    fn set_index(&mut self, index: u32, value: JsValue) -> EngineResult<bool> {
        self.set(index, value)?;
        Ok(true)
    }

    fn has_index(&self, index: u32) -> bool {
        self.has(index)
    }

    // Ordinary elements never pin themselves; an absent one deletes trivially.
    fn delete_index(&mut self, index: u32) -> bool {
        self.delete(index);
        true
    }

    fn index_length(&self) -> u32 {
        self.length
    }
}
