use std::cmp::Ordering;
use std::fmt;

use crate::error::{EngineError, EngineResult};

#[derive(Clone, Debug)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    BigInt(JsBigInt),
    Object(JsObject),
}

// UTF-16 code unit string
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JsString {
    pub code_units: Vec<u16>,
}

impl JsString {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self {
            code_units: s.encode_utf16().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code_units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.code_units.len()
    }

    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.code_units)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsBigInt {
    pub value: num_bigint::BigInt,
}

impl From<i64> for JsBigInt {
    fn from(v: i64) -> Self {
        Self {
            value: num_bigint::BigInt::from(v),
        }
    }
}

impl From<u64> for JsBigInt {
    fn from(v: u64) -> Self {
        Self {
            value: num_bigint::BigInt::from(v),
        }
    }
}

/// Handle to an object owned by the embedding object model. The element
/// engine never looks inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsObject {
    pub id: u64,
}

impl JsValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, JsValue::Number(_))
    }

    pub fn is_bigint(&self) -> bool {
        matches!(self, JsValue::BigInt(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn string(s: &str) -> Self {
        JsValue::String(JsString::from_str(s))
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(f64::from(n))
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::string(s)
    }
}

/// Equality is SameValue: `NaN` equals `NaN` and `+0` differs from `-0`.
/// Stores must hand back exactly what was written, so this is the
/// comparison the element engine cares about.
impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

pub fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

pub fn same_value_zero(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value_zero(*a, *b),
        _ => strict_equality(left, right),
    }
}

pub fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::equal(*a, *b),
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::BigInt(a), JsValue::BigInt(b)) => a == b,
        (JsValue::Object(a), JsValue::Object(b)) => a.id == b.id,
        _ => false,
    }
}

// §7.1.4 ToNumber, primitives only. ToPrimitive on objects belongs to the
// object model, so objects coerce to NaN here.
pub fn to_number(val: &JsValue) -> f64 {
    match val {
        JsValue::Undefined => f64::NAN,
        JsValue::Null => 0.0,
        JsValue::Boolean(b) => *b as u8 as f64,
        JsValue::Number(n) => *n,
        JsValue::String(s) => string_to_number(s),
        _ => f64::NAN,
    }
}

// §7.1.4.1.1 StringToNumber
fn string_to_number(s: &JsString) -> f64 {
    let rust_str = s.to_rust_string();
    let trimmed = rust_str.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts "inf" and "nan"; the language does not.
    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

// §7.1.13 ToBigInt
pub fn to_bigint(val: &JsValue) -> EngineResult<JsBigInt> {
    match val {
        JsValue::BigInt(b) => Ok(b.clone()),
        JsValue::Boolean(b) => Ok(JsBigInt::from(*b as i64)),
        JsValue::String(s) => {
            let text = s.to_rust_string();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(JsBigInt::from(0i64));
            }
            trimmed
                .parse::<num_bigint::BigInt>()
                .map(|value| JsBigInt { value })
                .map_err(|_| EngineError::Syntax(format!("Cannot convert {trimmed} to a BigInt")))
        }
        JsValue::Number(n) => Err(EngineError::Type(format!(
            "Cannot convert {} to a BigInt",
            number_ops::to_string(*n)
        ))),
        JsValue::Undefined | JsValue::Null | JsValue::Object(_) => Err(EngineError::Type(
            format!("Cannot convert {val} to a BigInt"),
        )),
    }
}

/// Default comparator of `Array.prototype.sort`: compare the string forms
/// by UTF-16 code units.
pub fn compare_as_strings(a: &JsValue, b: &JsValue) -> Ordering {
    let a = JsString::from_str(&a.to_string());
    let b = JsString::from_str(&b.to_string());
    a.code_units.cmp(&b.code_units)
}

/// Resolve a relative index against `length`: negative values count from
/// the end, and the result is clamped to `[0, length]`.
pub fn adjust_index(index: f64, length: usize) -> usize {
    let rel = number_ops::to_integer_or_infinity(index);
    let len = length as f64;
    let abs = if rel < 0.0 { (len + rel).max(0.0) } else { rel.min(len) };
    abs as usize
}

// §6.1.6.1 Number type operations
pub mod number_ops {
    pub fn equal(x: f64, y: f64) -> bool {
        if x.is_nan() || y.is_nan() {
            return false;
        }
        x == y
    }

    pub fn same_value(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if x == 0.0 && y == 0.0 {
            return x.is_sign_positive() == y.is_sign_positive();
        }
        x == y
    }

    pub fn same_value_zero(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        x == y
    }

    pub fn to_string(x: f64) -> String {
        if x.is_nan() {
            return "NaN".to_string();
        }
        if x == 0.0 {
            return "0".to_string();
        }
        if x.is_infinite() {
            return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        let mut buf = ryu_js::Buffer::new();
        buf.format(x).to_string()
    }

    pub fn to_integer_or_infinity(n: f64) -> f64 {
        if n.is_nan() || n == 0.0 {
            0.0
        } else if n.is_infinite() {
            n
        } else {
            n.trunc()
        }
    }

    /// Truncate toward zero and reduce modulo 2^32 into `[0, 2^32)`.
    fn modulo_2_32(x: f64) -> u32 {
        if x.is_nan() || x.is_infinite() || x == 0.0 {
            return 0;
        }
        let n = x.trunc() % 4294967296.0;
        let n = if n < 0.0 { n + 4294967296.0 } else { n };
        n as u32
    }

    // §7.1.6 ToInt32
    pub fn to_int32(x: f64) -> i32 {
        modulo_2_32(x) as i32
    }

    // §7.1.7 ToUint32
    pub fn to_uint32(x: f64) -> u32 {
        modulo_2_32(x)
    }

    pub fn to_int16(x: f64) -> i16 {
        modulo_2_32(x) as i16
    }

    pub fn to_uint16(x: f64) -> u16 {
        modulo_2_32(x) as u16
    }

    pub fn to_int8(x: f64) -> i8 {
        modulo_2_32(x) as i8
    }

    pub fn to_uint8(x: f64) -> u8 {
        modulo_2_32(x) as u8
    }

    // §7.1.12 ToUint8Clamp: clamp, then round half to even.
    pub fn to_uint8_clamp(x: f64) -> u8 {
        if x.is_nan() || x <= 0.0 {
            return 0;
        }
        if x >= 255.0 {
            return 255;
        }
        let f = x.floor();
        let diff = x - f;
        let rounded = if diff < 0.5 {
            f
        } else if diff > 0.5 {
            f + 1.0
        } else if f % 2.0 == 0.0 {
            f
        } else {
            f + 1.0
        };
        rounded as u8
    }

    /// `Some(i)` when `x` is exactly an i32 and not negative zero.
    pub fn as_exact_int32(x: f64) -> Option<i32> {
        if x.fract() != 0.0 || !x.is_finite() {
            return None;
        }
        if x == 0.0 && x.is_sign_negative() {
            return None;
        }
        if x < i32::MIN as f64 || x > i32::MAX as f64 {
            return None;
        }
        Some(x as i32)
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{b}"),
            JsValue::Number(n) => write!(f, "{}", number_ops::to_string(*n)),
            JsValue::String(s) => write!(f, "{s}"),
            JsValue::BigInt(b) => write!(f, "{}", b.value),
            JsValue::Object(_) => write!(f, "[object Object]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_special_values() {
        assert_eq!(number_ops::to_string(f64::NAN), "NaN");
        assert_eq!(number_ops::to_string(-0.0), "0");
        assert_eq!(number_ops::to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_ops::to_string(2.5), "2.5");
    }

    #[test]
    fn to_int32_wraps() {
        assert_eq!(number_ops::to_int32(f64::NAN), 0);
        assert_eq!(number_ops::to_int32(42.9), 42);
        assert_eq!(number_ops::to_int32(-42.9), -42);
        assert_eq!(number_ops::to_int32(2147483648.0), -2147483648);
        assert_eq!(number_ops::to_int32(4294967297.0), 1);
        assert_eq!(number_ops::to_uint32(-1.0), 4294967295);
        assert_eq!(number_ops::to_int32(1e20), 1661992960);
    }

    #[test]
    fn narrowing_wraps() {
        assert_eq!(number_ops::to_int8(128.0), -128);
        assert_eq!(number_ops::to_uint8(-1.0), 255);
        assert_eq!(number_ops::to_uint8(256.7), 0);
        assert_eq!(number_ops::to_int16(32768.0), -32768);
        assert_eq!(number_ops::to_uint16(65537.0), 1);
    }

    #[test]
    fn uint8_clamp_rounds_half_to_even() {
        assert_eq!(number_ops::to_uint8_clamp(-5.0), 0);
        assert_eq!(number_ops::to_uint8_clamp(300.0), 255);
        assert_eq!(number_ops::to_uint8_clamp(127.5), 128);
        assert_eq!(number_ops::to_uint8_clamp(126.5), 126);
        assert_eq!(number_ops::to_uint8_clamp(0.5), 0);
        assert_eq!(number_ops::to_uint8_clamp(1.5), 2);
        assert_eq!(number_ops::to_uint8_clamp(f64::NAN), 0);
        assert_eq!(number_ops::to_uint8_clamp(f64::INFINITY), 255);
    }

    #[test]
    fn exact_int32() {
        assert_eq!(number_ops::as_exact_int32(7.0), Some(7));
        assert_eq!(number_ops::as_exact_int32(-0.0), None);
        assert_eq!(number_ops::as_exact_int32(0.5), None);
        assert_eq!(number_ops::as_exact_int32(2147483648.0), None);
        assert_eq!(number_ops::as_exact_int32(-2147483648.0), Some(i32::MIN));
    }

    #[test]
    fn string_to_number_forms() {
        assert_eq!(to_number(&JsValue::string("  12 ")), 12.0);
        assert_eq!(to_number(&JsValue::string("0x1F")), 31.0);
        assert_eq!(to_number(&JsValue::string("")), 0.0);
        assert_eq!(to_number(&JsValue::string("-Infinity")), f64::NEG_INFINITY);
        assert!(to_number(&JsValue::string("inf")).is_nan());
        assert!(to_number(&JsValue::string("abc")).is_nan());
        assert_eq!(to_number(&JsValue::Boolean(true)), 1.0);
        assert_eq!(to_number(&JsValue::Null), 0.0);
    }

    #[test]
    fn same_value_semantics() {
        assert_eq!(JsValue::Number(f64::NAN), JsValue::Number(f64::NAN));
        assert_ne!(JsValue::Number(0.0), JsValue::Number(-0.0));
        assert!(same_value_zero(&JsValue::Number(0.0), &JsValue::Number(-0.0)));
        assert_ne!(JsValue::Undefined, JsValue::Null);
    }

    #[test]
    fn bigint_conversion() {
        assert_eq!(to_bigint(&JsValue::string("42")).unwrap(), JsBigInt::from(42i64));
        assert_eq!(to_bigint(&JsValue::Boolean(true)).unwrap(), JsBigInt::from(1i64));
        assert!(matches!(
            to_bigint(&JsValue::Number(1.0)),
            Err(EngineError::Type(_))
        ));
    }

    #[test]
    fn display_values() {
        assert_eq!(format!("{}", JsValue::Undefined), "undefined");
        assert_eq!(format!("{}", JsValue::Number(42.0)), "42");
        assert_eq!(format!("{}", JsValue::BigInt(JsBigInt::from(-3i64))), "-3");
        assert_eq!(format!("{}", JsValue::string("hi")), "hi");
    }

    #[test]
    fn relative_index_clamps() {
        assert_eq!(adjust_index(-2.0, 10), 8);
        assert_eq!(adjust_index(1000.0, 10), 10);
        assert_eq!(adjust_index(-1000.0, 10), 0);
        assert_eq!(adjust_index(f64::NAN, 10), 0);
        assert_eq!(adjust_index(2.7, 10), 2);
        assert_eq!(adjust_index(f64::NEG_INFINITY, 10), 0);
    }
}
