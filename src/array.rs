//! Array bulk operations over an [`ElementStore`].
//!
//! Each operation tries the continuous fast path and otherwise runs the
//! generic algorithm, which walks indices one at a time, treats holes as
//! absent and lets inherited indices show through via the [`ArrayHost`].
//! The `generic_*` functions are public so callers can force the slow
//! path; both paths produce the same observable result.

use std::cmp::Ordering;

use crate::elements::{ElementStore, MAX_LENGTH};
use crate::error::{EngineError, EngineResult};
use crate::host::{ArrayHost, PlainHost};
use crate::types::{JsValue, adjust_index, compare_as_strings, number_ops};

/// One argument of `concat`: arrays are spread, anything else is appended.
#[derive(Debug, Clone, Copy)]
pub enum ConcatArg<'a> {
    Array(&'a ElementStore),
    Value(&'a JsValue),
}

fn has_property(store: &ElementStore, host: &dyn ArrayHost, index: u32) -> bool {
    store.has(index) || host.is_shadowed(index)
}

fn lookup(store: &ElementStore, host: &dyn ArrayHost, index: u32) -> Option<JsValue> {
    store.get(index).or_else(|| host.inherited(index))
}

// DeletePropertyOrThrow
fn delete_or_throw(store: &mut ElementStore, host: &dyn ArrayHost, index: u32) -> EngineResult<()> {
    if store.has(index) && !host.is_deletable(index) {
        return Err(EngineError::type_error(format!(
            "Cannot delete property '{index}' of [object Array]"
        )));
    }
    store.delete(index);
    Ok(())
}

/// Copy `from` to `to`, or delete `to` when `from` is absent.
fn move_or_delete(store: &mut ElementStore, host: &dyn ArrayHost, from: u32, to: u32) -> EngineResult<()> {
    match lookup(store, host, from) {
        Some(value) if has_property(store, host, from) => store.set(to, value),
        _ => delete_or_throw(store, host, to),
    }
}

fn set_length(store: &mut ElementStore, host: &dyn ArrayHost, length: u32) -> EngineResult<()> {
    store.set_length(length, host)?;
    Ok(())
}

fn check_length(len: u64) -> EngineResult<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_LENGTH)
        .ok_or_else(|| EngineError::range("Invalid array length"))
}

/// Element at `index`, consulting the prototype for holes.
pub fn get_index(store: &ElementStore, host: &dyn ArrayHost, index: u32) -> Option<JsValue> {
    match store.fast_get(index) {
        Ok(value) => Some(value),
        Err(_) => lookup(store, host, index),
    }
}

pub fn set_index(store: &mut ElementStore, index: u32, value: JsValue) -> EngineResult<()> {
    match store.fast_set(index, value.clone()) {
        Ok(()) => Ok(()),
        Err(_) => store.set(index, value),
    }
}

pub fn push(store: &mut ElementStore, values: &[JsValue], host: &dyn ArrayHost) -> EngineResult<u32> {
    match store.fast_push(values, host) {
        Ok(len) => Ok(len),
        Err(_) => generic_push(store, values, host),
    }
}

pub fn generic_push(store: &mut ElementStore, values: &[JsValue], host: &dyn ArrayHost) -> EngineResult<u32> {
    let len = store.length();
    let new_len = check_length(u64::from(len) + values.len() as u64)?;
    for (k, value) in values.iter().enumerate() {
        store.set(len + k as u32, value.clone())?;
    }
    set_length(store, host, new_len)?;
    Ok(new_len)
}

pub fn pop(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<JsValue> {
    match store.fast_pop(host) {
        Ok(value) => Ok(value),
        Err(_) => generic_pop(store, host),
    }
}

pub fn generic_pop(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<JsValue> {
    let len = store.length();
    if len == 0 {
        return Ok(JsValue::Undefined);
    }
    let index = len - 1;
    let value = lookup(store, host, index).unwrap_or(JsValue::Undefined);
    delete_or_throw(store, host, index)?;
    set_length(store, host, index)?;
    Ok(value)
}

pub fn shift(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<JsValue> {
    if store.length() > 0
        && let Ok(removed) = store.shift_left(1, host)
    {
        return Ok(removed.get(0).unwrap_or(JsValue::Undefined));
    }
    generic_shift(store, host)
}

pub fn generic_shift(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<JsValue> {
    let len = store.length();
    if len == 0 {
        return Ok(JsValue::Undefined);
    }
    let first = lookup(store, host, 0).unwrap_or(JsValue::Undefined);
    for k in 1..len {
        move_or_delete(store, host, k, k - 1)?;
    }
    delete_or_throw(store, host, len - 1)?;
    set_length(store, host, len - 1)?;
    Ok(first)
}

pub fn unshift(store: &mut ElementStore, items: &[JsValue], host: &dyn ArrayHost) -> EngineResult<u32> {
    let Ok(count) = u32::try_from(items.len()) else {
        return generic_unshift(store, items, host);
    };
    if store.shift_right(count, host).is_err() {
        return generic_unshift(store, items, host);
    }
    for (j, item) in items.iter().enumerate() {
        store.set(j as u32, item.clone())?;
    }
    Ok(store.length())
}

pub fn generic_unshift(store: &mut ElementStore, items: &[JsValue], host: &dyn ArrayHost) -> EngineResult<u32> {
    let len = store.length();
    let new_len = check_length(u64::from(len) + items.len() as u64)?;
    let count = new_len - len;
    if count > 0 {
        for k in (1..=len).rev() {
            move_or_delete(store, host, k - 1, k + count - 1)?;
        }
        for (j, item) in items.iter().enumerate() {
            store.set(j as u32, item.clone())?;
        }
    }
    set_length(store, host, new_len)?;
    Ok(new_len)
}

/// `slice(start, end)` with relative-index clamping.
pub fn slice(
    store: &ElementStore,
    start: f64,
    end: Option<f64>,
    host: &dyn ArrayHost,
) -> EngineResult<ElementStore> {
    let len = store.length() as usize;
    let k = adjust_index(start, len) as u32;
    let fin = end.map_or(len, |e| adjust_index(e, len)) as u32;
    match store.fast_slice(k, fin.max(k), host) {
        Ok(part) => Ok(part),
        Err(_) => generic_slice(store, k, fin, host),
    }
}

/// Slow `slice` over already-clamped bounds.
pub fn generic_slice(store: &ElementStore, start: u32, end: u32, host: &dyn ArrayHost) -> EngineResult<ElementStore> {
    let mut result = ElementStore::new(*store.config());
    let mut n = 0u32;
    for k in start..end {
        if has_property(store, host, k)
            && let Some(value) = lookup(store, host, k)
        {
            result.set(n, value)?;
        }
        n += 1;
    }
    set_length(&mut result, &PlainHost, n)?;
    Ok(result)
}

/// Clamped `(actualStart, actualDeleteCount)` for `splice`.
pub fn splice_bounds(len: u32, start: Option<f64>, delete_count: Option<f64>) -> (u32, u32) {
    let len_us = len as usize;
    let actual_start = start.map_or(0, |s| adjust_index(s, len_us)) as u32;
    let available = len - actual_start;
    let actual_delete = match (start, delete_count) {
        (None, _) => 0,
        (Some(_), None) => available,
        (Some(_), Some(dc)) => {
            let dc = number_ops::to_integer_or_infinity(dc);
            dc.clamp(0.0, f64::from(available)) as u32
        }
    };
    (actual_start, actual_delete)
}

/// `splice(start, deleteCount, ...items)`. Returns the removed elements.
pub fn splice(
    store: &mut ElementStore,
    start: Option<f64>,
    delete_count: Option<f64>,
    items: &[JsValue],
    host: &dyn ArrayHost,
) -> EngineResult<ElementStore> {
    let (actual_start, actual_delete) = splice_bounds(store.length(), start, delete_count);
    if let Ok(insert) = u32::try_from(items.len())
        && let Ok(removed) = store.fast_splice(actual_start, actual_delete, insert, host)
    {
        for (j, item) in items.iter().enumerate() {
            store.set(actual_start + j as u32, item.clone())?;
        }
        return Ok(removed);
    }
    generic_splice(store, actual_start, actual_delete, items, host)
}

/// Slow `splice`. `start` is clamped to the length and `delete_count` to
/// the elements after `start`, so any pair of bounds is accepted.
pub fn generic_splice(
    store: &mut ElementStore,
    start: u32,
    delete_count: u32,
    items: &[JsValue],
    host: &dyn ArrayHost,
) -> EngineResult<ElementStore> {
    let len = store.length();
    let start = start.min(len);
    let delete_count = delete_count.min(len - start);
    let new_len = check_length(u64::from(len) - u64::from(delete_count) + items.len() as u64)?;
    let item_count = items.len() as u32;

    let mut removed = ElementStore::new(*store.config());
    for k in 0..delete_count {
        let from = start + k;
        if has_property(store, host, from)
            && let Some(value) = lookup(store, host, from)
        {
            removed.set(k, value)?;
        }
    }
    set_length(&mut removed, &PlainHost, delete_count)?;

    if item_count < delete_count {
        for k in start..(len - delete_count) {
            move_or_delete(store, host, k + delete_count, k + item_count)?;
        }
        for k in (new_len..len).rev() {
            delete_or_throw(store, host, k)?;
        }
    } else if item_count > delete_count {
        for k in (start..(len - delete_count)).rev() {
            move_or_delete(store, host, k + delete_count, k + item_count)?;
        }
    }
    for (j, item) in items.iter().enumerate() {
        store.set(start + j as u32, item.clone())?;
    }
    set_length(store, host, new_len)?;
    Ok(removed)
}

/// `receiver.concat(...args)` as a new store.
pub fn concat(receiver: &ElementStore, args: &[ConcatArg<'_>], host: &dyn ArrayHost) -> EngineResult<ElementStore> {
    match receiver.fast_concat_all(args, host) {
        Ok(result) => Ok(result),
        Err(_) => generic_concat(receiver, args, host),
    }
}

/// Element-wise `concat`. The result takes on the kind of every non-empty
/// array operand, so it matches the continuous path kind for kind.
pub fn generic_concat(receiver: &ElementStore, args: &[ConcatArg<'_>], host: &dyn ArrayHost) -> EngineResult<ElementStore> {
    let mut result = ElementStore::new(*receiver.config());
    let mut n = 0u64;
    for item in std::iter::once(ConcatArg::Array(receiver)).chain(args.iter().copied()) {
        match item {
            ConcatArg::Array(source) => {
                let len = source.length();
                check_length(n + u64::from(len))?;
                if len > 0 {
                    result.widen_to(source.kind());
                }
                for k in 0..len {
                    if has_property(source, host, k)
                        && let Some(value) = lookup(source, host, k)
                    {
                        result.set(n as u32 + k, value)?;
                    }
                }
                n += u64::from(len);
            }
            ConcatArg::Value(value) => {
                check_length(n + 1)?;
                result.set(n as u32, value.clone())?;
                n += 1;
            }
        }
    }
    set_length(&mut result, &PlainHost, n as u32)?;
    Ok(result)
}

pub fn reverse(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<()> {
    match store.fast_reverse(host) {
        Ok(()) => Ok(()),
        Err(_) => generic_reverse(store, host),
    }
}

pub fn generic_reverse(store: &mut ElementStore, host: &dyn ArrayHost) -> EngineResult<()> {
    let len = store.length();
    let middle = len / 2;
    for lower in 0..middle {
        let upper = len - lower - 1;
        let lower_value = has_property(store, host, lower)
            .then(|| lookup(store, host, lower))
            .flatten();
        let upper_value = has_property(store, host, upper)
            .then(|| lookup(store, host, upper))
            .flatten();
        match upper_value {
            Some(v) => store.set(lower, v)?,
            None => delete_or_throw(store, host, lower)?,
        }
        match lower_value {
            Some(v) => store.set(upper, v)?,
            None => delete_or_throw(store, host, upper)?,
        }
    }
    Ok(())
}

/// `fill(value, start, end)` with relative-index clamping.
pub fn fill(store: &mut ElementStore, value: &JsValue, start: f64, end: Option<f64>) -> EngineResult<()> {
    let len = store.length() as usize;
    let k = adjust_index(start, len) as u32;
    let fin = end.map_or(len, |e| adjust_index(e, len)) as u32;
    if k < fin {
        store.ensure(fin - 1);
    }
    for i in k..fin {
        store.set(i, value.clone())?;
    }
    Ok(())
}

/// Sort present elements with `compare` (or the default string order) and
/// write them back: sorted values first, then `undefined`s, then holes.
/// The sort is stable.
pub fn sort_apply(
    store: &mut ElementStore,
    host: &dyn ArrayHost,
    compare: Option<&mut dyn FnMut(&JsValue, &JsValue) -> Ordering>,
) -> EngineResult<()> {
    let len = store.length();
    let collected: Vec<JsValue> = if store.is_continuous(host) {
        store.present().map(|(_, v)| v).collect()
    } else {
        (0..len)
            .filter(|&k| has_property(store, host, k))
            .filter_map(|k| lookup(store, host, k))
            .collect()
    };
    let (mut values, undefined): (Vec<JsValue>, Vec<JsValue>) =
        collected.into_iter().partition(|v| !v.is_undefined());
    match compare {
        Some(cmp) => values.sort_by(|a, b| cmp(a, b)),
        None => values.sort_by(compare_as_strings),
    }
    let present = (values.len() + undefined.len()) as u32;
    for (i, value) in values.into_iter().chain(undefined).enumerate() {
        store.set(i as u32, value)?;
    }
    for k in (present..len).rev() {
        delete_or_throw(store, host, k)?;
    }
    Ok(())
}
