// File: arbor-service/src/lib.rs
//! Tree persistence and proof lookup on top of the Merkle engine.
use arbor_abi::{AbiError, Address, LeafEncoding, LeafType};
use arbor_hash::Digest;
use arbor_merkle::{MerkleError, Proof};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

mod retry;
mod service;
mod store;

pub use retry::RetryPolicy;
pub use service::Service;
pub use store::{FileStore, MemoryStore, StoreError, TreeStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no tree with root {0}")]
    NotFound(Digest),
    #[error("no stored tree contains this proof")]
    ProofNotFound,
    #[error("proof must not be empty")]
    EmptyProof,
    #[error("address {address} matches {count} distinct leaves")]
    AmbiguousAddress { address: Address, count: usize },
    #[error("generated proof for leaf {0} does not verify")]
    ProofCheck(usize),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// The caller asked for something invalid or absent, as opposed to the
    /// service failing. Client errors are never worth retrying.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Store(_) | ServiceError::ProofCheck(_))
    }
}

/// Raw bytes that travel as `0x` hex in human-readable formats.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    pub fn as_slice(&self) -> &[u8] { &self.0 }
    pub fn to_hex(&self) -> String { format!("0x{}", hex::encode(&self.0)) }
}

impl From<Vec<u8>> for HexBytes {
    fn from(v: Vec<u8>) -> Self { HexBytes(v) }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            s.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            let t = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(&s);
            hex::decode(t).map(HexBytes).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(d).map(HexBytes)
        }
    }
}

/// Input to [`Service::create_tree`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTree {
    #[serde(rename = "unhashedLeaves")]
    pub leaves: Vec<HexBytes>,
    /// Field layout of each leaf; a single `address` when absent.
    #[serde(rename = "leafTypeDescriptor", default)]
    pub leaf_types: Option<Vec<LeafType>>,
    /// `Some(false)` selects padded encoding; anything else is packed.
    #[serde(rename = "packedEncoding", default)]
    pub packed: Option<bool>,
}

impl CreateTree {
    pub fn new(leaves: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self { leaves: leaves.into_iter().map(HexBytes).collect(), ..Self::default() }
    }
}

/// What the store keeps per root: the tree's inputs, from which the tree
/// itself is rebuilt on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub leaves: Vec<HexBytes>,
    pub leaf_types: Vec<LeafType>,
    pub packed: Option<bool>,
}

impl TreeRecord {
    pub fn encoding(&self) -> LeafEncoding { LeafEncoding::from_packed_flag(self.packed) }

    /// Declared descriptor, or the single-address default.
    pub fn descriptor(&self) -> Vec<LeafType> {
        if self.leaf_types.is_empty() {
            arbor_abi::default_descriptor()
        } else {
            self.leaf_types.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    #[serde(rename = "unhashedLeaves")]
    pub leaves: Vec<HexBytes>,
    pub leaf_count: usize,
    #[serde(rename = "leafTypeDescriptor")]
    pub leaf_types: Option<Vec<LeafType>>,
    #[serde(rename = "packedEncoding")]
    pub packed: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofQuery {
    ByLeaf(Vec<u8>),
    ByAddress(Address),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafProof {
    #[serde(rename = "unhashedLeaf")]
    pub leaf: HexBytes,
    pub proof: Proof,
}
