//! Randomized properties of element stores, bulk operations and call sites.

use std::collections::BTreeMap;

use jsse_arrays::array::{self, ConcatArg};
use jsse_arrays::host::PrototypeHost;
use jsse_arrays::{ArrayOp, CallSite, ElementKind, ElementStore, EngineConfig, JsValue, PlainHost};
use rand::prelude::*;

fn random_value(rng: &mut StdRng) -> JsValue {
    match rng.gen_range(0..10) {
        0..=3 => JsValue::from(rng.gen_range(-1000i32..1000)),
        4..=6 => JsValue::Number(rng.gen_range(-1000.0..1000.0)),
        7 => JsValue::Number(-0.0),
        8 => JsValue::string(&format!("s{}", rng.gen_range(0..100))),
        _ => JsValue::Boolean(rng.gen_bool(0.5)),
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        sparse_gap: 64,
        ..EngineConfig::default()
    }
}

#[test]
fn kind_only_widens_and_values_round_trip() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut store = ElementStore::new(config());
        let mut expected = BTreeMap::new();
        let mut last_kind = store.kind();
        for _ in 0..300 {
            let index = if rng.gen_bool(0.05) {
                rng.gen_range(0..5000)
            } else {
                rng.gen_range(0..120)
            };
            let value = random_value(&mut rng);
            store.set(index, value.clone()).unwrap();
            expected.insert(index, value);
            assert!(store.kind() >= last_kind, "seed {seed}: {:?} narrowed to {:?}", last_kind, store.kind());
            last_kind = store.kind();
        }
        for (&index, value) in &expected {
            assert_eq!(store.get(index).as_ref(), Some(value), "seed {seed}, index {index}");
        }
        let present: Vec<u32> = store.present().map(|(i, _)| i).collect();
        assert_eq!(present, expected.keys().copied().collect::<Vec<_>>());
        assert_eq!(store.length(), expected.keys().last().map_or(0, |i| i + 1));
    }
}

#[test]
fn pop_undoes_push() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut store = ElementStore::new(EngineConfig::default());
    let mut shadow: Vec<JsValue> = Vec::new();
    for _ in 0..10_000 {
        if shadow.is_empty() || rng.gen_bool(0.55) {
            let value = random_value(&mut rng);
            let before = store.length();
            let len = array::push(&mut store, std::slice::from_ref(&value), &PlainHost).unwrap();
            assert_eq!(len, before + 1);
            assert!(store.is_continuous(&PlainHost));
            if rng.gen_bool(0.5) {
                assert_eq!(array::pop(&mut store, &PlainHost).unwrap(), value);
                assert_eq!(store.length(), before);
            } else {
                shadow.push(value);
            }
        } else {
            let expected = shadow.pop();
            assert_eq!(array::pop(&mut store, &PlainHost).ok(), expected);
        }
        assert_eq!(store.length() as usize, shadow.len());
    }
    let contents: Vec<JsValue> = store.present().map(|(_, v)| v).collect();
    assert_eq!(contents, shadow);
}

/// One store per representation the engine can be in.
fn representations(rng: &mut StdRng) -> Vec<ElementStore> {
    let cfg = config();
    let ints: Vec<JsValue> = (0..rng.gen_range(1i32..20)).map(JsValue::from).collect();
    let doubles: Vec<JsValue> = (0..rng.gen_range(1i32..20)).map(|i| JsValue::Number(f64::from(i) + 0.5)).collect();
    let objects: Vec<JsValue> = (0..rng.gen_range(1..20)).map(|_| random_value(rng)).collect();

    let mut holey = ElementStore::from_values(ints.clone(), cfg).unwrap();
    holey.delete(0);
    holey.set(holey.length() + 3, JsValue::Number(2.5)).unwrap();

    let mut trailing = ElementStore::from_values(doubles.clone(), cfg).unwrap();
    trailing.set_length(trailing.length() + 4, &PlainHost).unwrap();

    let mut dictionary = ElementStore::new(cfg);
    dictionary.set(1, JsValue::string("a")).unwrap();
    dictionary.set(500, JsValue::from(5)).unwrap();

    vec![
        ElementStore::new(cfg),
        ElementStore::from_values(ints, cfg).unwrap(),
        ElementStore::from_values(doubles, cfg).unwrap(),
        ElementStore::from_values(objects, cfg).unwrap(),
        holey,
        trailing,
        dictionary,
    ]
}

#[test]
fn concat_reads_through_both_operands() {
    let mut rng = StdRng::seed_from_u64(3);
    let stores = representations(&mut rng);
    assert!(stores.last().unwrap().is_dictionary());
    for a in &stores {
        for b in &stores {
            let joined = array::concat(a, &[ConcatArg::Array(b)], &PlainHost).unwrap();
            assert_eq!(joined.length(), a.length() + b.length());
            assert!(joined.kind() >= a.kind().join(b.kind()) || joined.is_empty());
            for i in 0..joined.length() {
                let expected = if i < a.length() { a.get(i) } else { b.get(i - a.length()) };
                assert_eq!(joined.get(i), expected, "index {i} of {:?} ++ {:?}", a.kind(), b.kind());
            }
        }
    }
}

#[test]
fn concat_spreads_arrays_and_appends_values() {
    let a = ElementStore::from_values(vec![JsValue::from(1)], EngineConfig::default()).unwrap();
    let b = ElementStore::from_values(vec![JsValue::from(2), JsValue::from(3)], EngineConfig::default()).unwrap();
    let v = JsValue::string("x");
    let joined = array::concat(&a, &[ConcatArg::Array(&b), ConcatArg::Value(&v)], &PlainHost).unwrap();
    assert_eq!(
        joined.to_vec(),
        vec![Some(JsValue::from(1)), Some(JsValue::from(2)), Some(JsValue::from(3)), Some(v)]
    );
    assert_eq!(joined.kind(), ElementKind::Object);
}

/// The cached path and the forced generic path must agree on the result
/// and on the resulting store.
#[test]
fn call_sites_match_generic_paths() {
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let cfg = EngineConfig {
            max_relinks: 3,
            ..config()
        };
        let host = PrototypeHost::new().with_inherited(2, JsValue::string("proto"));
        let mut push_site = CallSite::new(ArrayOp::Push, &cfg);
        let mut pop_site = CallSite::new(ArrayOp::Pop, &cfg);
        let mut get_site = CallSite::new(ArrayOp::GetIndex, &cfg);
        let mut set_site = CallSite::new(ArrayOp::SetIndex, &cfg);
        let mut concat_site = CallSite::new(ArrayOp::Concat, &cfg);
        let mut cached = ElementStore::new(cfg);
        let mut generic = ElementStore::new(cfg);

        for step in 0..400 {
            match rng.gen_range(0..6) {
                0 | 1 => {
                    let values: Vec<JsValue> = (0..rng.gen_range(0..3)).map(|_| random_value(&mut rng)).collect();
                    let a = push_site.push(&mut cached, &values, &host);
                    let b = array::generic_push(&mut generic, &values, &host);
                    assert_eq!(a, b, "seed {seed} step {step}: push");
                }
                2 => {
                    let a = pop_site.pop(&mut cached, &host);
                    let b = array::generic_pop(&mut generic, &host);
                    assert_eq!(a, b, "seed {seed} step {step}: pop");
                }
                3 => {
                    let index = rng.gen_range(0..cached.length() + 2);
                    let a = get_site.get_index(&cached, index, &host);
                    let b = generic.get(index).or_else(|| jsse_arrays::ArrayHost::inherited(&host, index));
                    assert_eq!(a, b, "seed {seed} step {step}: get {index}");
                }
                4 => {
                    let index = rng.gen_range(0..cached.length() + 3);
                    let value = random_value(&mut rng);
                    let a = set_site.set_index(&mut cached, index, value.clone(), &host);
                    let b = generic.set(index, value);
                    assert_eq!(a, b, "seed {seed} step {step}: set {index}");
                }
                _ => {
                    let other: Vec<JsValue> = (0..rng.gen_range(0..4)).map(|_| random_value(&mut rng)).collect();
                    let other = ElementStore::from_values(other, cfg).unwrap();
                    let extra = random_value(&mut rng);
                    let args = [ConcatArg::Array(&other), ConcatArg::Value(&extra)];
                    let a = concat_site.concat(&cached, &args, &host).unwrap();
                    let b = array::generic_concat(&generic, &args, &host).unwrap();
                    assert_eq!(a.to_vec(), b.to_vec(), "seed {seed} step {step}: concat");
                }
            }
            assert_eq!(cached.length(), generic.length());
            assert_eq!(cached.to_vec(), generic.to_vec(), "seed {seed} step {step}");
        }
    }
}

#[test]
fn generic_ops_honor_prototype_and_holes() {
    let cfg = EngineConfig::default();
    let host = PrototypeHost::new().with_inherited(1, JsValue::string("p"));
    let mut store = ElementStore::with_length(4, cfg);
    store.set(0, JsValue::from(0)).unwrap();
    store.set(3, JsValue::from(3)).unwrap();

    let copy = array::slice(&store, 0.0, None, &host).unwrap();
    assert_eq!(
        copy.to_vec(),
        vec![Some(JsValue::from(0)), Some(JsValue::string("p")), None, Some(JsValue::from(3))]
    );

    assert_eq!(array::shift(&mut store, &host).unwrap(), JsValue::from(0));
    assert_eq!(
        store.to_vec(),
        vec![Some(JsValue::string("p")), None, Some(JsValue::from(3))]
    );

    array::reverse(&mut store, &host).unwrap();
    assert_eq!(
        store.to_vec(),
        vec![Some(JsValue::from(3)), None, Some(JsValue::string("p"))]
    );
}

#[test]
fn sealed_index_stops_truncation() {
    let cfg = EngineConfig::default();
    let host = PrototypeHost::new().with_sealed(2);
    let values: Vec<JsValue> = (0..6i32).map(JsValue::from).collect();
    let mut store = ElementStore::from_values(values, cfg).unwrap();
    let err = store.set_length(1, &host).unwrap_err();
    assert_eq!(err.retained, 3);
    assert_eq!(store.length(), 3);
    assert!(store.has(2));
    assert!(!store.has(3));
}
