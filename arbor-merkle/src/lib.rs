// File: arbor-merkle/src/lib.rs
//! Binary Merkle tree with sorted-pair hashing.
//!
//! Layout rules, which any external verifier must share:
//!
//! * leaves are hashed individually, in input order, without deduplication;
//! * each parent is `H(min(l, r) || max(l, r))`;
//! * on a layer of odd length the last node is promoted unchanged (it is
//!   neither duplicated nor padded), so its proof has no entry for that layer.
use arbor_hash::{combine, Digest, Hasher, Keccak256};
use rayon::prelude::*;
use std::marker::PhantomData;
use thiserror::Error;

mod proof;
pub use proof::{
    recover_root, recover_root_from_leaf, recover_root_with, verify, verify_leaf, verify_with,
    Proof,
};

// Layers narrower than this are combined on the calling thread.
const PAR_MIN_WIDTH: usize = 1 << 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree from zero leaves")]
    EmptyInput,
    #[error("leaf not found in tree")]
    LeafNotFound,
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("proof element {index} is {len} bytes, expected 32")]
    MalformedProof { index: usize, len: usize },
    #[error("proof element {index} is not valid hex")]
    InvalidHex { index: usize },
}

/// All layers of the tree, base layer first, root layer last.
#[derive(Clone, Debug)]
pub struct MerkleTree<H: Hasher = Keccak256> {
    layers: Vec<Vec<Digest>>,
    _hasher: PhantomData<fn() -> H>,
}

impl<H: Hasher> MerkleTree<H> {
    /// Hash every raw leaf and build the tree over the resulting digests.
    pub fn build<L: AsRef<[u8]> + Sync>(leaves: &[L]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyInput);
        }
        let base: Vec<Digest> = if leaves.len() >= PAR_MIN_WIDTH {
            leaves.par_iter().map(|l| H::hash(l.as_ref())).collect()
        } else {
            leaves.iter().map(|l| H::hash(l.as_ref())).collect()
        };
        Self::from_leaf_digests(base)
    }

    /// Build over already-hashed leaves.
    pub fn from_leaf_digests(base: Vec<Digest>) -> Result<Self, MerkleError> {
        if base.is_empty() {
            return Err(MerkleError::EmptyInput);
        }
        let mut layers = vec![base];
        loop {
            let top = &layers[layers.len() - 1];
            if top.len() == 1 {
                break;
            }
            // Each layer is finished before the next one starts.
            let next = next_layer::<H>(top);
            layers.push(next);
        }
        tracing::trace!(leaves = layers[0].len(), depth = layers.len(), "built merkle tree");
        Ok(Self { layers, _hasher: PhantomData })
    }

    pub fn root(&self) -> Digest { self.layers[self.layers.len() - 1][0] }

    pub fn leaf_count(&self) -> usize { self.layers[0].len() }

    /// Number of layers, counting the base and the root.
    pub fn depth(&self) -> usize { self.layers.len() }

    pub fn layers(&self) -> &[Vec<Digest>] { &self.layers }

    pub fn leaf_digests(&self) -> &[Digest] { &self.layers[0] }

    pub fn leaf_digest(&self, index: usize) -> Option<&Digest> { self.layers[0].get(index) }

    /// First base-layer position holding the digest of `leaf`.
    pub fn position(&self, leaf: &[u8]) -> Option<usize> {
        let target = H::hash(leaf);
        self.layers[0].iter().position(|d| *d == target)
    }

    /// Every base-layer position holding the digest of `leaf`.
    pub fn positions(&self, leaf: &[u8]) -> Vec<usize> {
        let target = H::hash(leaf);
        self.layers[0]
            .iter()
            .enumerate()
            .filter_map(|(i, d)| (*d == target).then_some(i))
            .collect()
    }

    /// Sibling path for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<Proof, MerkleError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }
        let mut idx = index;
        let mut path = Vec::with_capacity(self.layers.len() - 1);
        for layer in &self.layers[..self.layers.len() - 1] {
            // A promoted odd node has no sibling on this layer.
            if let Some(sib) = layer.get(idx ^ 1) {
                path.push(*sib);
            }
            idx >>= 1;
        }
        Ok(Proof::new(path))
    }

    /// Proof for the first occurrence of `leaf` in the base layer.
    pub fn proof_for_leaf(&self, leaf: &[u8]) -> Result<Proof, MerkleError> {
        let idx = self.position(leaf).ok_or(MerkleError::LeafNotFound)?;
        self.proof(idx)
    }

    /// Proofs for every leaf, in leaf order.
    pub fn proofs(&self) -> Vec<Proof> {
        let n = self.leaf_count();
        let open = |i: usize| self.proof(i).unwrap_or_default();
        if n >= PAR_MIN_WIDTH {
            (0..n).into_par_iter().map(open).collect()
        } else {
            (0..n).map(open).collect()
        }
    }

    pub fn verify(&self, leaf_digest: &Digest, proof: &Proof) -> bool {
        verify_with::<H>(leaf_digest, proof, &self.root())
    }

    pub fn verify_leaf(&self, leaf: &[u8], proof: &Proof) -> bool {
        self.verify(&H::hash(leaf), proof)
    }
}

fn merge<H: Hasher>(pair: &[Digest]) -> Digest {
    match pair {
        [l, r] => combine::<H>(l, r),
        _ => pair[0],
    }
}

fn next_layer<H: Hasher>(layer: &[Digest]) -> Vec<Digest> {
    if layer.len() >= PAR_MIN_WIDTH {
        layer.par_chunks(2).map(merge::<H>).collect()
    } else {
        layer.chunks(2).map(merge::<H>).collect()
    }
}
