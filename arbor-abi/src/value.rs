use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Sign, B256, I256, U256};

use crate::{AbiError, LeafType};

pub fn uint_value(v: u64) -> DynSolValue { DynSolValue::Uint(U256::from(v), 256) }

pub fn int_value(v: i64) -> DynSolValue {
    DynSolValue::Int(I256::try_from(v).unwrap_or_default(), 256)
}

pub fn address_value(a: Address) -> DynSolValue { DynSolValue::Address(a) }

fn strip_hex(s: &str) -> &str { s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s) }

fn fits_int(i: &I256, bits: u16) -> bool {
    if bits == 256 {
        return true;
    }
    // -2^(bits-1) <= i < 2^(bits-1)
    let limit = U256::from(1u8) << (bits as usize - 1);
    let mag = i.unsigned_abs();
    if i.is_negative() {
        mag <= limit
    } else {
        mag < limit
    }
}

/// `v` re-tagged with the width of `ty`, or `None` when it is the wrong kind
/// of value or out of range for the type.
pub(crate) fn coerce(ty: &LeafType, v: &DynSolValue) -> Option<DynSolValue> {
    match (ty, v) {
        (LeafType::Uint(bits), DynSolValue::Uint(u, _)) => {
            (u.bit_len() <= *bits as usize).then(|| DynSolValue::Uint(*u, *bits as usize))
        }
        (LeafType::Int(bits), DynSolValue::Int(i, _)) => {
            fits_int(i, *bits).then(|| DynSolValue::Int(*i, *bits as usize))
        }
        (LeafType::FixedBytes(n), DynSolValue::FixedBytes(w, size)) => {
            let n = *n as usize;
            (*size == n || w[n..].iter().all(|b| *b == 0)).then(|| DynSolValue::FixedBytes(*w, n))
        }
        _ => ty.sol_type().matches(v).then(|| v.clone()),
    }
}

/// Parse a textual value for `ty`.
///
/// Integers accept decimal or `0x` hex; `int` types also accept a leading
/// minus. Byte types take hex. Strings are taken verbatim.
pub fn parse_value(ty: &LeafType, s: &str) -> Result<DynSolValue, AbiError> {
    let invalid =
        |reason: &'static str| AbiError::InvalidValue { ty: *ty, value: s.to_string(), reason };
    let t = s.trim();
    let v = match ty {
        LeafType::Address => {
            let a = t.parse::<Address>().map_err(|_| AbiError::InvalidAddress(s.to_string()))?;
            DynSolValue::Address(a)
        }
        LeafType::Bool => match t {
            "true" | "1" => DynSolValue::Bool(true),
            "false" | "0" => DynSolValue::Bool(false),
            _ => return Err(invalid("expected true or false")),
        },
        LeafType::Uint(_) => {
            if t.is_empty() {
                return Err(invalid("not an unsigned integer"));
            }
            let u = t.parse::<U256>().map_err(|_| invalid("not an unsigned integer"))?;
            DynSolValue::Uint(u, 256)
        }
        LeafType::Int(_) => {
            let (sign, mag) = match t.strip_prefix('-') {
                Some(rest) => (Sign::Negative, rest),
                None => (Sign::Positive, t),
            };
            if mag.is_empty() || mag.starts_with(['-', '+']) {
                return Err(invalid("not an integer"));
            }
            let mag = mag.parse::<U256>().map_err(|_| invalid("not an integer"))?;
            let i = I256::checked_from_sign_and_abs(sign, mag)
                .ok_or_else(|| invalid("out of range"))?;
            DynSolValue::Int(i, 256)
        }
        LeafType::FixedBytes(n) => {
            let raw = hex::decode(strip_hex(t)).map_err(|_| invalid("not hex"))?;
            if raw.len() != *n as usize {
                return Err(invalid("wrong length"));
            }
            DynSolValue::FixedBytes(B256::right_padding_from(&raw), raw.len())
        }
        LeafType::Bytes => {
            DynSolValue::Bytes(hex::decode(strip_hex(t)).map_err(|_| invalid("not hex"))?)
        }
        LeafType::String => DynSolValue::String(s.to_string()),
    };
    coerce(ty, &v).ok_or_else(|| invalid("out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(ty: &str, s: &str) -> Result<DynSolValue, AbiError> {
        parse_value(&ty.parse().unwrap(), s)
    }

    fn uint(v: u64, bits: usize) -> DynSolValue { DynSolValue::Uint(U256::from(v), bits) }

    fn int(v: i64, bits: usize) -> DynSolValue {
        DynSolValue::Int(I256::try_from(v).unwrap(), bits)
    }

    #[test]
    fn decimal_and_hex_agree() {
        assert_eq!(parse("uint256", "1000").unwrap(), uint(1000, 256));
        assert_eq!(parse("uint256", "0x3e8").unwrap(), uint(1000, 256));
        assert_eq!(parse("uint64", "18446744073709551615").unwrap(), uint(u64::MAX, 64));
    }

    #[test]
    fn unsigned_range_checks() {
        assert!(parse("uint8", "255").is_ok());
        assert!(matches!(parse("uint8", "256"), Err(AbiError::InvalidValue { .. })));
        assert!(parse("uint256", "-1").is_err());
        assert!(parse("uint256", "12a").is_err());
        assert!(parse("uint256", "").is_err());
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(parse("uint256", max).unwrap(), DynSolValue::Uint(U256::MAX, 256));
        let over = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(parse("uint256", over).is_err());
    }

    #[test]
    fn signed_range_checks() {
        assert_eq!(parse("int8", "-1").unwrap(), int(-1, 8));
        assert_eq!(parse("int8", "127").unwrap(), int(127, 8));
        assert_eq!(parse("int8", "-128").unwrap(), int(-128, 8));
        assert!(parse("int8", "128").is_err());
        assert!(parse("int8", "-129").is_err());
        assert!(parse("int8", "--1").is_err());
        assert_eq!(parse("int64", "-9223372036854775808").unwrap(), int(i64::MIN, 64));
        assert!(parse("int64", "-9223372036854775809").is_err());
        assert_eq!(parse("int256", "-0x80").unwrap(), int(-128, 256));
    }

    #[test]
    fn other_types() {
        assert_eq!(parse("bool", "true").unwrap(), DynSolValue::Bool(true));
        assert!(parse("bool", "yes").is_err());
        assert_eq!(
            parse("bytes2", "0xbeef").unwrap(),
            DynSolValue::FixedBytes(B256::right_padding_from(&[0xbe, 0xef]), 2)
        );
        assert!(parse("bytes2", "0xbe").is_err());
        assert_eq!(parse("bytes", "0x").unwrap(), DynSolValue::Bytes(vec![]));
        assert_eq!(parse("string", "hi there").unwrap(), DynSolValue::String("hi there".into()));
        assert!(matches!(parse("address", "0x12"), Err(AbiError::InvalidAddress(_))));
    }

    #[test]
    fn coerce_checks_kind_and_width() {
        assert!(coerce(&LeafType::Uint(16), &uint_value(300)).is_some());
        assert!(coerce(&LeafType::Uint(8), &uint_value(300)).is_none());
        assert!(coerce(&LeafType::Int(8), &uint_value(1)).is_none());
        assert!(coerce(&LeafType::Int(16), &int_value(-300)).is_some());
        assert!(coerce(&LeafType::Int(8), &int_value(-300)).is_none());
        assert!(coerce(&LeafType::Bool, &DynSolValue::String("x".into())).is_none());
    }
}
