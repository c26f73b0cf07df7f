// File: arbor-abi/src/lib.rs
//! Leaf encodings for typed tuples.
//!
//! A tree stores raw leaf bytes; this crate is how callers produce those
//! bytes from typed values (Solidity-style `abi.encode` / `abi.encodePacked`)
//! and how the service recovers the address field of a stored leaf.
use alloy_dyn_abi::DynSolType;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

mod encode;
mod value;

pub use alloy_dyn_abi::DynSolValue;
pub use alloy_primitives::{Address, B256, I256, U256};
pub use encode::{encode, encode_leaf, encode_packed};
pub use value::{address_value, int_value, parse_value, uint_value};

pub const ADDRESS_LEN: usize = 20;
pub const WORD: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("unknown leaf type {0:?}")]
    UnknownType(String),
    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("value {index} does not match type {expected}")]
    TypeMismatch { index: usize, expected: LeafType },
    #[error("invalid {ty} value {value:?}: {reason}")]
    InvalidValue { ty: LeafType, value: String, reason: &'static str },
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
}

/// How a typed tuple is turned into leaf bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafEncoding {
    /// `abi.encodePacked`: values concatenated without padding.
    #[default]
    Packed,
    /// `abi.encode`: 32-byte head slots, dynamic values in a tail.
    Padded,
}

impl LeafEncoding {
    /// Stored trees carry a nullable flag; absent means packed.
    pub fn from_packed_flag(packed: Option<bool>) -> Self {
        match packed {
            Some(false) => LeafEncoding::Padded,
            _ => LeafEncoding::Packed,
        }
    }
}

/// One field of a leaf type descriptor: the elementary Solidity types a leaf
/// may be built from. Arrays, tuples and function types are not leaf fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeafType {
    Address,
    Bool,
    /// Unsigned integer of the given bit width.
    Uint(u16),
    /// Signed integer of the given bit width.
    Int(u16),
    /// `bytes1` .. `bytes32`.
    FixedBytes(u8),
    Bytes,
    String,
}

impl LeafType {
    pub fn is_dynamic(&self) -> bool { matches!(self, LeafType::Bytes | LeafType::String) }

    /// Width in packed encoding; `None` for dynamic types.
    pub fn packed_size(&self) -> Option<usize> {
        match self {
            LeafType::Address => Some(ADDRESS_LEN),
            LeafType::Bool => Some(1),
            LeafType::Uint(bits) | LeafType::Int(bits) => Some(*bits as usize / 8),
            LeafType::FixedBytes(n) => Some(*n as usize),
            LeafType::Bytes | LeafType::String => None,
        }
    }

    pub fn sol_type(&self) -> DynSolType {
        match *self {
            LeafType::Address => DynSolType::Address,
            LeafType::Bool => DynSolType::Bool,
            LeafType::Uint(bits) => DynSolType::Uint(bits as usize),
            LeafType::Int(bits) => DynSolType::Int(bits as usize),
            LeafType::FixedBytes(n) => DynSolType::FixedBytes(n as usize),
            LeafType::Bytes => DynSolType::Bytes,
            LeafType::String => DynSolType::String,
        }
    }
}

fn int_bits(bits: usize) -> Option<u16> {
    ((8..=256).contains(&bits) && bits % 8 == 0).then_some(bits as u16)
}

impl TryFrom<&DynSolType> for LeafType {
    type Error = AbiError;
    fn try_from(ty: &DynSolType) -> Result<Self, Self::Error> {
        let unsupported = || AbiError::UnknownType(ty.sol_type_name().into_owned());
        Ok(match ty {
            DynSolType::Address => LeafType::Address,
            DynSolType::Bool => LeafType::Bool,
            DynSolType::Uint(bits) => LeafType::Uint(int_bits(*bits).ok_or_else(unsupported)?),
            DynSolType::Int(bits) => LeafType::Int(int_bits(*bits).ok_or_else(unsupported)?),
            DynSolType::FixedBytes(n) if (1..=32).contains(n) => LeafType::FixedBytes(*n as u8),
            DynSolType::Bytes => LeafType::Bytes,
            DynSolType::String => LeafType::String,
            _ => return Err(unsupported()),
        })
    }
}

impl FromStr for LeafType {
    type Err = AbiError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = DynSolType::parse(s.trim()).map_err(|_| AbiError::UnknownType(s.to_string()))?;
        LeafType::try_from(&ty).map_err(|_| AbiError::UnknownType(s.to_string()))
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sol_type().sol_type_name())
    }
}

impl Serialize for LeafType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.collect_str(self) }
}

impl<'de> Deserialize<'de> for LeafType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a descriptor such as `["address", "uint256"]`.
pub fn parse_descriptor<S: AsRef<str>>(types: &[S]) -> Result<Vec<LeafType>, AbiError> {
    types.iter().map(|t| t.as_ref().parse()).collect()
}

/// A single address field: the descriptor assumed when none is given.
pub fn default_descriptor() -> Vec<LeafType> { vec![LeafType::Address] }

/// Right-aligned conversion: longer input keeps its last 20 bytes, shorter
/// input is left-padded with zeros.
pub fn address_from_tail(b: &[u8]) -> Address {
    if b.len() >= ADDRESS_LEN {
        Address::from_slice(&b[b.len() - ADDRESS_LEN..])
    } else {
        Address::left_padding_from(b)
    }
}

/// Locate the first `address` field of an encoded leaf.
///
/// With the default descriptor the leaf is the address itself. Otherwise the
/// field offset follows the encoding: 32 bytes per preceding field when
/// padded, the packed widths of the preceding fields when packed. A dynamic
/// field ahead of the address in a packed leaf makes the offset unknowable,
/// as does a leaf too short to hold the field.
pub fn address_of(leaf: &[u8], types: &[LeafType], encoding: LeafEncoding) -> Option<Address> {
    if matches!(types, [] | [LeafType::Address]) {
        return Some(address_from_tail(leaf));
    }
    let pos = types.iter().position(|t| *t == LeafType::Address)?;
    match encoding {
        LeafEncoding::Padded => {
            let start = pos * WORD;
            let word = leaf.get(start..start + WORD)?;
            Some(Address::from_word(B256::from_slice(word)))
        }
        LeafEncoding::Packed => {
            let start = types[..pos].iter().map(LeafType::packed_size).sum::<Option<usize>>()?;
            let field = leaf.get(start..start + ADDRESS_LEN)?;
            Some(Address::from_slice(field))
        }
    }
}
