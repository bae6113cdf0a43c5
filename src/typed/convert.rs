//! Value <-> lane bit conversions shared by typed views and `DataView`.
//!
//! A lane is carried as the low `bytes_per_element` bytes of a `u64`;
//! [`write_bits`] and [`read_bits`] move it to and from memory in the
//! requested byte order.

use num_bigint::BigInt;

use super::TypedArrayKind;
use crate::error::{EngineError, EngineResult};
use crate::types::{JsBigInt, JsValue, number_ops, to_bigint, to_number};

fn number_operand(value: &JsValue) -> EngineResult<f64> {
    if value.is_bigint() {
        return Err(EngineError::type_error("Cannot convert a BigInt value to a number"));
    }
    Ok(to_number(value))
}

/// Two's-complement low 64 bits of `value` (BigInt64/BigUint64 wrapping).
fn bigint_low_bits(value: &BigInt) -> u64 {
    let bytes = value.to_signed_bytes_le();
    let fill = if value.sign() == num_bigint::Sign::Minus { 0xFF } else { 0 };
    let mut raw = [fill; 8];
    let n = bytes.len().min(8);
    raw[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(raw)
}

/// Convert `value` to the lane bits of `kind`.
///
/// Integer lanes wrap modulo their width, `Uint8Clamped` clamps with
/// round-half-to-even, float lanes round to nearest. BigInt lanes accept
/// only BigInt-convertible values and Number lanes reject BigInts.
pub(crate) fn encode(kind: TypedArrayKind, value: &JsValue) -> EngineResult<u64> {
    if kind.is_bigint() {
        let big = to_bigint(value)?;
        return Ok(bigint_low_bits(&big.value));
    }
    let n = number_operand(value)?;
    let bits = match kind {
        TypedArrayKind::Int8 => number_ops::to_int8(n) as u8 as u64,
        TypedArrayKind::Uint8 => number_ops::to_uint8(n) as u64,
        TypedArrayKind::Uint8Clamped => number_ops::to_uint8_clamp(n) as u64,
        TypedArrayKind::Int16 => number_ops::to_int16(n) as u16 as u64,
        TypedArrayKind::Uint16 => number_ops::to_uint16(n) as u64,
        TypedArrayKind::Int32 => number_ops::to_int32(n) as u32 as u64,
        TypedArrayKind::Uint32 => number_ops::to_uint32(n) as u64,
        TypedArrayKind::Float16 => f64_to_f16_bits(n) as u64,
        TypedArrayKind::Float32 => (n as f32).to_bits() as u64,
        TypedArrayKind::Float64 => n.to_bits(),
        TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => unreachable!("handled above"),
    };
    Ok(bits)
}

pub(crate) fn decode(kind: TypedArrayKind, bits: u64) -> JsValue {
    match kind {
        TypedArrayKind::Int8 => JsValue::Number(bits as u8 as i8 as f64),
        TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => JsValue::Number(bits as u8 as f64),
        TypedArrayKind::Int16 => JsValue::Number(bits as u16 as i16 as f64),
        TypedArrayKind::Uint16 => JsValue::Number(bits as u16 as f64),
        TypedArrayKind::Int32 => JsValue::Number(bits as u32 as i32 as f64),
        TypedArrayKind::Uint32 => JsValue::Number(bits as u32 as f64),
        TypedArrayKind::Float16 => JsValue::Number(f16_to_f64(bits as u16)),
        TypedArrayKind::Float32 => JsValue::Number(f32::from_bits(bits as u32) as f64),
        TypedArrayKind::Float64 => JsValue::Number(f64::from_bits(bits)),
        TypedArrayKind::BigInt64 => JsValue::BigInt(JsBigInt::from(bits as i64)),
        TypedArrayKind::BigUint64 => JsValue::BigInt(JsBigInt::from(bits)),
    }
}

/// Store the low `out.len()` bytes of `bits`.
pub(crate) fn write_bits(bits: u64, out: &mut [u8], little_endian: bool) {
    let width = out.len();
    if little_endian {
        out.copy_from_slice(&bits.to_le_bytes()[..width]);
    } else {
        out.copy_from_slice(&bits.to_be_bytes()[8 - width..]);
    }
}

pub(crate) fn read_bits(bytes: &[u8], little_endian: bool) -> u64 {
    let width = bytes.len();
    let mut raw = [0u8; 8];
    if little_endian {
        raw[..width].copy_from_slice(bytes);
        u64::from_le_bytes(raw)
    } else {
        raw[8 - width..].copy_from_slice(bytes);
        u64::from_be_bytes(raw)
    }
}

/// IEEE 754 binary16 bits to f64.
pub(crate) fn f16_to_f64(bits: u16) -> f64 {
    let sign = ((bits >> 15) & 1) as u64;
    let exp = ((bits >> 10) & 0x1F) as u64;
    let frac = (bits & 0x3FF) as u64;

    match exp {
        0 if frac == 0 => f64::from_bits(sign << 63),
        0 => {
            // Subnormal: normalize the fraction.
            let mut shifts = 0_i32;
            let mut f = frac;
            while f & 0x400 == 0 {
                f <<= 1;
                shifts += 1;
            }
            let exp64 = (1023 - 14 - shifts) as u64;
            f64::from_bits((sign << 63) | (exp64 << 52) | ((f & 0x3FF) << 42))
        }
        31 if frac == 0 => f64::from_bits((sign << 63) | 0x7FF0_0000_0000_0000),
        31 => f64::from_bits((sign << 63) | 0x7FF8_0000_0000_0000 | (frac << 42)),
        _ => {
            let exp64 = (exp as i32 - 15 + 1023) as u64;
            f64::from_bits((sign << 63) | (exp64 << 52) | (frac << 42))
        }
    }
}

/// f64 to IEEE 754 binary16 bits, rounding to nearest, ties to even.
pub(crate) fn f64_to_f16_bits(val: f64) -> u16 {
    if val.is_nan() {
        return 0x7E00;
    }
    if val.is_infinite() {
        return if val > 0.0 { 0x7C00 } else { 0xFC00 };
    }
    if val == 0.0 {
        return if val.is_sign_negative() { 0x8000 } else { 0 };
    }

    let bits = val.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exp = ((bits >> 52) & 0x7FF) as i32;
    let frac = bits & 0x000F_FFFF_FFFF_FFFF;
    let unbiased = exp - 1023;

    if unbiased > 15 {
        return sign | 0x7C00;
    }

    if unbiased >= -14 {
        let exp16 = ((unbiased + 15) as u16) << 10;
        let mantissa = (frac >> 42) as u16;
        let rest = frac & 0x3FF_FFFF_FFFF;
        let halfway = 0x200_0000_0000_u64;
        let rounded = if rest > halfway || (rest == halfway && mantissa & 1 != 0) {
            mantissa + 1
        } else {
            mantissa
        };
        // A carry out of the mantissa bumps the exponent (possibly to infinity).
        let result = sign | exp16 | (rounded & 0x3FF);
        return if rounded > 0x3FF { result + (1 << 10) } else { result };
    }

    // Subnormal result.
    let full = (1_u64 << 52) | frac;
    let shift = (28 - unbiased) as u64;
    if shift > 53 {
        return sign;
    }
    if shift == 53 {
        // Only the implicit bit is the round bit; ties go to zero.
        return if frac > 0 { sign | 1 } else { sign };
    }
    let mantissa = ((full >> shift) & 0x3FF) as u16;
    let round_bit = (full >> (shift - 1)) & 1;
    let sticky = full & ((1_u64 << (shift - 1)) - 1);
    let rounded = if round_bit == 1 && (sticky > 0 || mantissa & 1 != 0) {
        mantissa + 1
    } else {
        mantissa
    };
    if rounded >= 0x400 {
        return sign | (1 << 10);
    }
    sign | rounded
}
