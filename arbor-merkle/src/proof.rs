use arbor_hash::{combine, Digest, Hasher, Keccak256, DIGEST_LEN};
use serde::{Deserialize, Serialize};

use crate::MerkleError;

/// Sibling digests from a leaf up to the root.
///
/// No left/right flags are carried: every step re-sorts the pair, so the
/// verifier only needs the leaf digest and this ordered list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(Vec<Digest>);

impl Proof {
    pub fn new(siblings: Vec<Digest>) -> Self { Proof(siblings) }

    pub fn siblings(&self) -> &[Digest] { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, Digest> { self.0.iter() }

    pub fn into_inner(self) -> Vec<Digest> { self.0 }

    /// Build a proof from raw byte elements, rejecting any element that is not
    /// exactly one digest long.
    pub fn from_slices<B: AsRef<[u8]>>(elems: &[B]) -> Result<Self, MerkleError> {
        elems
            .iter()
            .enumerate()
            .map(|(index, e)| {
                let e = e.as_ref();
                if e.len() != DIGEST_LEN {
                    return Err(MerkleError::MalformedProof { index, len: e.len() });
                }
                let mut out = [0u8; DIGEST_LEN];
                out.copy_from_slice(e);
                Ok(Digest(out))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Proof)
    }

    /// Parse `0x`-prefixed (or bare) hex elements.
    pub fn from_hex<S: AsRef<str>>(elems: &[S]) -> Result<Self, MerkleError> {
        let raw = elems
            .iter()
            .enumerate()
            .map(|(index, s)| {
                let s = s.as_ref().trim();
                let s = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(s).map_err(|_| MerkleError::InvalidHex { index })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_slices(&raw)
    }

    pub fn to_hex(&self) -> Vec<String> { self.0.iter().map(Digest::to_hex).collect() }
}

impl From<Vec<Digest>> for Proof {
    fn from(v: Vec<Digest>) -> Self { Proof(v) }
}

impl FromIterator<Digest> for Proof {
    fn from_iter<I: IntoIterator<Item = Digest>>(iter: I) -> Self {
        Proof(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Proof {
    type Item = &'a Digest;
    type IntoIter = std::slice::Iter<'a, Digest>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

/// Fold the leaf digest with each sibling in order. The result is the root
/// the proof commits to.
pub fn recover_root_with<H: Hasher>(leaf: &Digest, proof: &Proof) -> Digest {
    proof.iter().fold(*leaf, |acc, sib| combine::<H>(&acc, sib))
}

pub fn verify_with<H: Hasher>(leaf: &Digest, proof: &Proof, root: &Digest) -> bool {
    recover_root_with::<H>(leaf, proof) == *root
}

/// [`recover_root_with`] using keccak-256.
pub fn recover_root(leaf: &Digest, proof: &Proof) -> Digest {
    recover_root_with::<Keccak256>(leaf, proof)
}

/// [`verify_with`] using keccak-256.
pub fn verify(leaf: &Digest, proof: &Proof, root: &Digest) -> bool {
    verify_with::<Keccak256>(leaf, proof, root)
}

/// Hash the raw leaf, then recover the root.
pub fn recover_root_from_leaf(leaf: &[u8], proof: &Proof) -> Digest {
    recover_root(&Keccak256::hash(leaf), proof)
}

/// Hash the raw leaf, then verify against `root`.
pub fn verify_leaf(leaf: &[u8], proof: &Proof, root: &Digest) -> bool {
    verify(&Keccak256::hash(leaf), proof, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_hash::{hash_pair, keccak256};

    #[test]
    fn empty_proof_recovers_leaf() {
        let leaf = keccak256(b"only");
        assert_eq!(recover_root(&leaf, &Proof::default()), leaf);
        assert!(verify(&leaf, &Proof::default(), &leaf));
    }

    #[test]
    fn fold_resorts_each_step() {
        let l = keccak256(b"l");
        let s1 = keccak256(b"s1");
        let s2 = keccak256(b"s2");
        let expected = hash_pair(&hash_pair(&s1, &l), &s2);
        let proof = Proof::new(vec![s1, s2]);
        assert_eq!(recover_root(&l, &proof), expected);
        assert_eq!(recover_root_from_leaf(b"l", &proof), expected);
        assert!(verify_leaf(b"l", &proof, &expected));
        assert!(!verify_leaf(b"m", &proof, &expected));
    }

    #[test]
    fn from_slices_rejects_short_element() {
        let good = [1u8; DIGEST_LEN].to_vec();
        let bad = vec![0u8; 31];
        assert_eq!(
            Proof::from_slices(&[good.clone(), bad]),
            Err(MerkleError::MalformedProof { index: 1, len: 31 })
        );
        let p = Proof::from_slices(&[good]).unwrap();
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn hex_round_trip_and_errors() {
        let p = Proof::new(vec![keccak256(b"1"), keccak256(b"2")]);
        let h = p.to_hex();
        assert_eq!(Proof::from_hex(&h[..]).unwrap(), p);
        assert_eq!(Proof::from_hex(&["0xnothex"]), Err(MerkleError::InvalidHex { index: 0 }));
        assert_eq!(
            Proof::from_hex(&["0xabcd"]),
            Err(MerkleError::MalformedProof { index: 0, len: 2 })
        );
    }

    #[test]
    fn serializes_as_hex_list() {
        let p = Proof::new(vec![keccak256(b"1")]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, format!("[\"{}\"]", keccak256(b"1").to_hex()));
    }
}
