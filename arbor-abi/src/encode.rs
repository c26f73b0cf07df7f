use alloy_dyn_abi::DynSolValue;

use crate::value::coerce;
use crate::{AbiError, LeafEncoding, LeafType};

/// Check arity and per-field fit, tagging each value with its field width.
fn typed_tuple(types: &[LeafType], values: &[DynSolValue]) -> Result<DynSolValue, AbiError> {
    if types.len() != values.len() {
        return Err(AbiError::Arity { expected: types.len(), got: values.len() });
    }
    types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(index, (ty, v))| {
            coerce(ty, v).ok_or(AbiError::TypeMismatch { index, expected: *ty })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(DynSolValue::Tuple)
}

/// `abi.encodePacked`: each value at its natural width, no padding, no
/// length prefixes.
pub fn encode_packed(types: &[LeafType], values: &[DynSolValue]) -> Result<Vec<u8>, AbiError> {
    Ok(typed_tuple(types, values)?.abi_encode_packed())
}

/// `abi.encode` of the values as a parameter list: one 32-byte head slot per
/// value, dynamic values referenced by offset into the tail.
pub fn encode(types: &[LeafType], values: &[DynSolValue]) -> Result<Vec<u8>, AbiError> {
    Ok(typed_tuple(types, values)?.abi_encode_params())
}

pub fn encode_leaf(
    types: &[LeafType],
    values: &[DynSolValue],
    encoding: LeafEncoding,
) -> Result<Vec<u8>, AbiError> {
    match encoding {
        LeafEncoding::Packed => encode_packed(types, values),
        LeafEncoding::Padded => encode(types, values),
    }
}
