//! Per-call-site speculation for array operations.
//!
//! A [`CallSite`] remembers the receiver shape its last speculative call
//! succeeded on (a [`Guard`]). While the guard keeps holding, the
//! representation-specialized fast path runs. When it stops holding, the
//! speculative implementation answers [`Relink`]; the site re-derives a
//! guard from the receiver's current shape and completes the call on the
//! generic path. After `max_relinks` replacements the site is megamorphic
//! and never speculates again.
//!
//! Indexed get and set sites accept typed views as well as element stores.
//! A view guard pins the view's [`TypedArrayKind`]; a site linked to one
//! shape relinks when it meets the other.

use std::fmt;

use tracing::debug;

use crate::array::{self, ConcatArg};
use crate::config::EngineConfig;
use crate::elements::{ElementKind, ElementStore};
use crate::error::{EngineResult, Relink};
use crate::host::ArrayHost;
use crate::typed::{TypedArrayKind, TypedView};
use crate::types::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayOp {
    Push,
    Pop,
    Concat,
    GetIndex,
    SetIndex,
}

impl ArrayOp {
    pub fn name(self) -> &'static str {
        match self {
            ArrayOp::Push => "push",
            ArrayOp::Pop => "pop",
            ArrayOp::Concat => "concat",
            ArrayOp::GetIndex => "get",
            ArrayOp::SetIndex => "set",
        }
    }
}

impl fmt::Display for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Representation a guard pins its receiver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A continuous element store of this kind.
    Elements(ElementKind),
    /// A typed view of this kind.
    View(TypedArrayKind),
}

impl Shape {
    pub fn name(self) -> &'static str {
        match self {
            Shape::Elements(kind) => kind.name(),
            Shape::View(kind) => kind.name(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiver shape a speculative implementation relies on.
///
/// Every guard requires a receiver of exactly `shape`. The other fields
/// are per-operation extras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub shape: Shape,
    /// `pop`: the receiver has at least one element.
    pub non_empty: bool,
    /// `concat`: every array argument is continuous with a kind no wider
    /// than this.
    pub arg_bound: Option<ElementKind>,
    /// `get`/`set`: the index addresses an existing slot (or, for `set` on
    /// an element store, the slot right after the end).
    pub in_bounds: bool,
}

impl Guard {
    /// Guard matching `receiver` as it is now, or `None` when the receiver
    /// is not a candidate for speculation at all.
    pub fn derive(op: ArrayOp, receiver: &ElementStore, host: &dyn ArrayHost) -> Option<Guard> {
        if !receiver.is_continuous(host) {
            return None;
        }
        Some(Guard {
            shape: Shape::Elements(receiver.kind()),
            non_empty: op == ArrayOp::Pop,
            arg_bound: (op == ArrayOp::Concat).then_some(ElementKind::Object),
            in_bounds: matches!(op, ArrayOp::GetIndex | ArrayOp::SetIndex),
        })
    }

    /// Concat guard narrowed to the widest kind among `args`.
    fn derive_concat(receiver: &ElementStore, args: &[ConcatArg<'_>], host: &dyn ArrayHost) -> Option<Guard> {
        let mut guard = Guard::derive(ArrayOp::Concat, receiver, host)?;
        let mut bound = ElementKind::Empty;
        for arg in args {
            if let ConcatArg::Array(other) = arg {
                if !other.is_continuous(host) {
                    return None;
                }
                bound = bound.join(other.kind());
            }
        }
        guard.arg_bound = Some(bound);
        Some(guard)
    }

    /// Guard for indexed access to `view`. Any view qualifies.
    pub fn derive_view(view: &TypedView) -> Guard {
        Guard {
            shape: Shape::View(view.kind()),
            non_empty: false,
            arg_bound: None,
            in_bounds: true,
        }
    }

    fn admits(&self, receiver: &ElementStore, host: &dyn ArrayHost) -> bool {
        self.shape == Shape::Elements(receiver.kind())
            && receiver.is_continuous(host)
            && (!self.non_empty || receiver.length() > 0)
    }

    fn admits_args(&self, args: &[ConcatArg<'_>], host: &dyn ArrayHost) -> bool {
        let Some(bound) = self.arg_bound else {
            return true;
        };
        args.iter().all(|arg| match arg {
            ConcatArg::Array(other) => other.kind() <= bound && other.is_continuous(host),
            ConcatArg::Value(_) => true,
        })
    }
}

fn speculative_push(
    guard: &Guard,
    store: &mut ElementStore,
    values: &[JsValue],
    host: &dyn ArrayHost,
) -> Result<u32, Relink> {
    if !guard.admits(store, host) {
        return Err(Relink);
    }
    Ok(store.fast_push(values, host)?)
}

fn speculative_pop(guard: &Guard, store: &mut ElementStore, host: &dyn ArrayHost) -> Result<JsValue, Relink> {
    if !guard.admits(store, host) {
        return Err(Relink);
    }
    Ok(store.fast_pop(host)?)
}

fn speculative_concat(
    guard: &Guard,
    store: &ElementStore,
    args: &[ConcatArg<'_>],
    host: &dyn ArrayHost,
) -> Result<ElementStore, Relink> {
    if !guard.admits(store, host) || !guard.admits_args(args, host) {
        return Err(Relink);
    }
    Ok(store.fast_concat_all(args, host)?)
}

fn speculative_get(guard: &Guard, store: &ElementStore, index: u32, host: &dyn ArrayHost) -> Result<JsValue, Relink> {
    if !guard.admits(store, host) || (guard.in_bounds && index >= store.length()) {
        return Err(Relink);
    }
    Ok(store.fast_get(index)?)
}

fn speculative_set(
    guard: &Guard,
    store: &mut ElementStore,
    index: u32,
    value: &JsValue,
    host: &dyn ArrayHost,
) -> Result<(), Relink> {
    if !guard.admits(store, host) || (guard.in_bounds && index > store.length()) {
        return Err(Relink);
    }
    Ok(store.fast_set(index, value.clone())?)
}

fn speculative_view_get(guard: &Guard, view: &TypedView, index: usize) -> Result<JsValue, Relink> {
    if guard.shape != Shape::View(view.kind()) {
        return Err(Relink);
    }
    view.get(index).ok_or(Relink)
}

/// Conversion errors are not shape failures: they pass through as the
/// inner result and are raised exactly as the generic write raises them.
fn speculative_view_set(
    guard: &Guard,
    view: &TypedView,
    index: usize,
    value: &JsValue,
) -> Result<EngineResult<()>, Relink> {
    if guard.shape != Shape::View(view.kind()) || (guard.in_bounds && index >= view.length()) {
        return Err(Relink);
    }
    Ok(view.set(index, value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSiteState {
    Uninitialized,
    Monomorphic(Guard),
    Megamorphic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSiteStats {
    /// Calls answered by the speculative path.
    pub hits: u64,
    /// Calls answered by the generic path.
    pub misses: u64,
    pub relinks: u32,
}

/// Inline cache for one array operation at one call site.
#[derive(Debug, Clone)]
pub struct CallSite {
    op: ArrayOp,
    state: CallSiteState,
    max_relinks: u32,
    stats: CallSiteStats,
}

impl CallSite {
    pub fn new(op: ArrayOp, config: &EngineConfig) -> Self {
        Self {
            op,
            state: CallSiteState::Uninitialized,
            max_relinks: config.max_relinks,
            stats: CallSiteStats::default(),
        }
    }

    pub fn op(&self) -> ArrayOp {
        self.op
    }

    pub fn state(&self) -> CallSiteState {
        self.state
    }

    pub fn stats(&self) -> CallSiteStats {
        self.stats
    }

    /// Guard to speculate on, linking an uninitialized site first.
    fn linked_guard(&mut self, derive: impl FnOnce() -> Option<Guard>) -> Option<Guard> {
        match self.state {
            CallSiteState::Monomorphic(guard) => Some(guard),
            CallSiteState::Megamorphic => None,
            CallSiteState::Uninitialized => {
                let guard = derive()?;
                debug!(op = %self.op, shape = %guard.shape, "call site linked");
                self.state = CallSiteState::Monomorphic(guard);
                Some(guard)
            }
        }
    }

    fn hit<T>(&mut self, value: T) -> T {
        self.stats.hits += 1;
        value
    }

    /// Replace a stale guard with one derived from the current shape.
    fn relink(&mut self, derived: Option<Guard>) {
        self.stats.relinks += 1;
        if self.stats.relinks >= self.max_relinks {
            debug!(op = %self.op, relinks = self.stats.relinks, "call site megamorphic");
            self.state = CallSiteState::Megamorphic;
            return;
        }
        debug!(
            op = %self.op,
            relinks = self.stats.relinks,
            shape = derived.map(|g| g.shape.name()),
            "call site relinked"
        );
        self.state = derived.map_or(CallSiteState::Uninitialized, CallSiteState::Monomorphic);
    }

    fn miss(&mut self) {
        self.stats.misses += 1;
    }

    pub fn push(&mut self, store: &mut ElementStore, values: &[JsValue], host: &dyn ArrayHost) -> EngineResult<u32> {
        debug_assert_eq!(self.op, ArrayOp::Push);
        if let Some(guard) = self.linked_guard(|| Guard::derive(ArrayOp::Push, store, host)) {
            match speculative_push(&guard, store, values, host) {
                Ok(len) => return Ok(self.hit(len)),
                Err(Relink) => self.relink(Guard::derive(ArrayOp::Push, store, host)),
            }
        }
        self.miss();
        array::generic_push(store, values, host)
    }

    pub fn pop(&mut self, store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<JsValue> {
        debug_assert_eq!(self.op, ArrayOp::Pop);
        if let Some(guard) = self.linked_guard(|| Guard::derive(ArrayOp::Pop, store, host)) {
            match speculative_pop(&guard, store, host) {
                Ok(value) => return Ok(self.hit(value)),
                Err(Relink) => self.relink(Guard::derive(ArrayOp::Pop, store, host)),
            }
        }
        self.miss();
        array::generic_pop(store, host)
    }

    pub fn concat(
        &mut self,
        store: &ElementStore,
        args: &[ConcatArg<'_>],
        host: &dyn ArrayHost,
    ) -> EngineResult<ElementStore> {
        debug_assert_eq!(self.op, ArrayOp::Concat);
        if let Some(guard) = self.linked_guard(|| Guard::derive_concat(store, args, host)) {
            match speculative_concat(&guard, store, args, host) {
                Ok(result) => return Ok(self.hit(result)),
                Err(Relink) => self.relink(Guard::derive_concat(store, args, host)),
            }
        }
        self.miss();
        array::generic_concat(store, args, host)
    }

    /// Indexed read. `None` is an absent element (a hole with nothing
    /// inherited, or an index past the end).
    pub fn get_index(&mut self, store: &ElementStore, index: u32, host: &dyn ArrayHost) -> Option<JsValue> {
        debug_assert_eq!(self.op, ArrayOp::GetIndex);
        if let Some(guard) = self.linked_guard(|| Guard::derive(ArrayOp::GetIndex, store, host)) {
            match speculative_get(&guard, store, index, host) {
                Ok(value) => return Some(self.hit(value)),
                Err(Relink) => self.relink(Guard::derive(ArrayOp::GetIndex, store, host)),
            }
        }
        self.miss();
        store.get(index).or_else(|| host.inherited(index))
    }

    pub fn set_index(
        &mut self,
        store: &mut ElementStore,
        index: u32,
        value: JsValue,
        host: &dyn ArrayHost,
    ) -> EngineResult<()> {
        debug_assert_eq!(self.op, ArrayOp::SetIndex);
        if let Some(guard) = self.linked_guard(|| Guard::derive(ArrayOp::SetIndex, store, host)) {
            match speculative_set(&guard, store, index, &value, host) {
                Ok(()) => return Ok(self.hit(())),
                Err(Relink) => self.relink(Guard::derive(ArrayOp::SetIndex, store, host)),
            }
        }
        self.miss();
        store.set(index, value)
    }

    /// Indexed read of a typed view. `None` past the end.
    pub fn get_view_index(&mut self, view: &TypedView, index: usize) -> Option<JsValue> {
        debug_assert_eq!(self.op, ArrayOp::GetIndex);
        if let Some(guard) = self.linked_guard(|| Some(Guard::derive_view(view))) {
            match speculative_view_get(&guard, view, index) {
                Ok(value) => return Some(self.hit(value)),
                Err(Relink) => self.relink(Some(Guard::derive_view(view))),
            }
        }
        self.miss();
        view.get(index)
    }

    /// Indexed write to a typed view. Writes past the end are dropped after
    /// the value has been converted.
    pub fn set_view_index(&mut self, view: &TypedView, index: usize, value: &JsValue) -> EngineResult<()> {
        debug_assert_eq!(self.op, ArrayOp::SetIndex);
        if let Some(guard) = self.linked_guard(|| Some(Guard::derive_view(view))) {
            match speculative_view_set(&guard, view, index, value) {
                Ok(result) => return self.hit(result),
                Err(Relink) => self.relink(Some(Guard::derive_view(view))),
            }
        }
        self.miss();
        view.set(index, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlainHost;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn ints(values: &[i32]) -> ElementStore {
        ElementStore::from_values(values.iter().map(|n| JsValue::from(*n)).collect(), config()).unwrap()
    }

    #[test]
    fn first_call_links_and_hits() {
        let mut site = CallSite::new(ArrayOp::Push, &config());
        let mut store = ints(&[1, 2]);
        assert_eq!(site.push(&mut store, &[JsValue::from(3)], &PlainHost).unwrap(), 3);
        assert!(matches!(site.state(), CallSiteState::Monomorphic(g) if g.shape == Shape::Elements(ElementKind::Int32)));
        assert_eq!(site.stats(), CallSiteStats { hits: 1, misses: 0, relinks: 0 });
    }

    #[test]
    fn kind_change_relinks_once() {
        let mut site = CallSite::new(ArrayOp::Push, &config());
        let mut store = ints(&[1]);
        site.push(&mut store, &[JsValue::Number(0.5)], &PlainHost).unwrap();
        assert_eq!(store.kind(), ElementKind::Float64);
        site.push(&mut store, &[JsValue::Number(1.5)], &PlainHost).unwrap();
        let stats = site.stats();
        assert_eq!(stats.relinks, 1);
        assert_eq!(stats.misses, 1);
        assert!(matches!(site.state(), CallSiteState::Monomorphic(g) if g.shape == Shape::Elements(ElementKind::Float64)));
        site.push(&mut store, &[JsValue::Number(2.5)], &PlainHost).unwrap();
        assert_eq!(site.stats().hits, 2);
        assert_eq!(store.length(), 4);
    }

    #[test]
    fn pop_guard_requires_elements() {
        let mut site = CallSite::new(ArrayOp::Pop, &config());
        let mut store = ints(&[7]);
        assert_eq!(site.pop(&mut store, &PlainHost).unwrap(), JsValue::from(7));
        assert_eq!(site.pop(&mut store, &PlainHost).unwrap(), JsValue::Undefined);
        assert_eq!(site.stats().relinks, 1);
        assert_eq!(store.length(), 0);
    }

    #[test]
    fn holey_receiver_runs_generic() {
        let mut site = CallSite::new(ArrayOp::GetIndex, &config());
        let mut store = ints(&[1, 2, 3]);
        store.delete(1);
        assert_eq!(site.get_index(&store, 1, &PlainHost), None);
        assert_eq!(site.get_index(&store, 2, &PlainHost), Some(JsValue::from(3)));
        assert_eq!(site.state(), CallSiteState::Uninitialized);
        assert_eq!(site.stats().misses, 2);
    }

    #[test]
    fn out_of_bounds_get_relinks() {
        let mut site = CallSite::new(ArrayOp::GetIndex, &config());
        let store = ints(&[1, 2]);
        assert_eq!(site.get_index(&store, 0, &PlainHost), Some(JsValue::from(1)));
        assert_eq!(site.get_index(&store, 5, &PlainHost), None);
        assert_eq!(site.stats(), CallSiteStats { hits: 1, misses: 1, relinks: 1 });
    }

    #[test]
    fn goes_megamorphic_after_max_relinks() {
        let config = EngineConfig {
            max_relinks: 3,
            ..EngineConfig::default()
        };
        let mut site = CallSite::new(ArrayOp::SetIndex, &config);
        let mut store = ElementStore::new(config);
        let values = [
            JsValue::from(1),
            JsValue::Number(0.5),
            JsValue::string("s"),
            JsValue::from(2),
        ];
        for (i, v) in values.iter().enumerate() {
            site.set_index(&mut store, i as u32, v.clone(), &PlainHost).unwrap();
        }
        // Each widening invalidates the guard on the following call.
        site.set_index(&mut store, 0, JsValue::from(9), &PlainHost).unwrap();
        site.set_index(&mut store, 10_000, JsValue::from(9), &PlainHost).unwrap();
        site.set_index(&mut store, 1, JsValue::from(9), &PlainHost).unwrap();
        assert_eq!(site.state(), CallSiteState::Megamorphic);
        assert_eq!(store.get(10_000), Some(JsValue::from(9)));
        assert_eq!(store.get(1), Some(JsValue::from(9)));
    }

    #[test]
    fn concat_guard_bounds_argument_kind() {
        let mut site = CallSite::new(ArrayOp::Concat, &config());
        let a = ints(&[1]);
        let b = ints(&[2]);
        let out = site.concat(&a, &[ConcatArg::Array(&b)], &PlainHost).unwrap();
        assert_eq!(out.length(), 2);
        assert_eq!(site.stats().hits, 1);
        let f = ElementStore::from_values(vec![JsValue::Number(0.5)], config()).unwrap();
        let out = site.concat(&a, &[ConcatArg::Array(&f)], &PlainHost).unwrap();
        assert_eq!(out.get(1), Some(JsValue::Number(0.5)));
        assert_eq!(site.stats().relinks, 1);
    }

    #[test]
    fn view_sites_guard_on_kind_and_bounds() {
        let config = config();
        let bytes = TypedView::with_length(TypedArrayKind::Uint8, 4).unwrap();
        let words = TypedView::new(bytes.buffer(), TypedArrayKind::Uint16, 0, None).unwrap();
        let mut set = CallSite::new(ArrayOp::SetIndex, &config);
        let mut get = CallSite::new(ArrayOp::GetIndex, &config);

        set.set_view_index(&bytes, 0, &JsValue::from(300)).unwrap();
        assert!(matches!(set.state(), CallSiteState::Monomorphic(g) if g.shape == Shape::View(TypedArrayKind::Uint8)));
        assert_eq!(get.get_view_index(&bytes, 0), Some(JsValue::from(44)));
        assert_eq!(get.stats(), CallSiteStats { hits: 1, misses: 0, relinks: 0 });

        assert_eq!(get.get_view_index(&bytes, 4), None);
        assert_eq!(get.stats().relinks, 1);
        assert!(get.get_view_index(&words, 1).is_some());
        assert_eq!(get.stats().relinks, 2);
        assert!(matches!(get.state(), CallSiteState::Monomorphic(g) if g.shape == Shape::View(TypedArrayKind::Uint16)));

        set.set_view_index(&bytes, 9, &JsValue::from(1)).unwrap();
        assert_eq!(set.stats().relinks, 1);
        assert_eq!(bytes.to_vec(), [44, 0, 0, 0].map(JsValue::from));
    }

    #[test]
    fn view_site_reports_conversion_errors_on_both_paths() {
        let config = config();
        let big = TypedView::with_length(TypedArrayKind::BigInt64, 1).unwrap();
        let mut site = CallSite::new(ArrayOp::SetIndex, &config);
        assert!(matches!(site.set_view_index(&big, 0, &JsValue::from(1)), Err(crate::EngineError::Type(_))));
        assert_eq!(site.stats().hits, 1);
        assert!(matches!(site.set_view_index(&big, 5, &JsValue::from(1)), Err(crate::EngineError::Type(_))));
        assert_eq!(site.stats().misses, 1);
    }

    #[test]
    fn site_relinks_between_stores_and_views() {
        let config = config();
        let mut site = CallSite::new(ArrayOp::GetIndex, &config);
        let store = ints(&[5]);
        let view = TypedView::from_values(TypedArrayKind::Int8, &[JsValue::from(-1)]).unwrap();
        assert_eq!(site.get_index(&store, 0, &PlainHost), Some(JsValue::from(5)));
        assert_eq!(site.get_view_index(&view, 0), Some(JsValue::from(-1)));
        assert_eq!(site.get_index(&store, 0, &PlainHost), Some(JsValue::from(5)));
        assert_eq!(site.stats(), CallSiteStats { hits: 1, misses: 2, relinks: 2 });
    }

    #[test]
    fn speculative_and_generic_results_match() {
        let mut site = CallSite::new(ArrayOp::Push, &config());
        let mut fast = ints(&[1, 2]);
        let mut slow = ints(&[1, 2]);
        let values = [JsValue::Number(2.5), JsValue::Boolean(true)];
        let a = site.push(&mut fast, &values, &PlainHost).unwrap();
        let b = array::generic_push(&mut slow, &values, &PlainHost).unwrap();
        assert_eq!(a, b);
        assert_eq!(fast.to_vec(), slow.to_vec());
        assert_eq!(fast.kind(), slow.kind());
    }
}
