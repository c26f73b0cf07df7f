// File: arbor-hash/src/lib.rs
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as _, Keccak256 as Keccak, Sha3_256};
use thiserror::Error;

pub const DIGEST_LEN: usize = 32; // 256-bit output

#[derive(Debug, Error, PartialEq)]
pub enum DigestError {
    #[error("digest must be 32 bytes, got {0}")]
    Length(usize),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Fixed-size hash output. Ordering is plain byte order, which is the order
/// the pair combiner sorts by.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    #[inline]
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self { Digest(bytes) }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] { &self.0 }

    #[inline]
    pub fn to_vec(&self) -> Vec<u8> { self.0.to_vec() }

    /// Lowercase hex with a `0x` prefix.
    pub fn to_hex(&self) -> String { format!("0x{}", hex::encode(self.0)) }

    /// Parse hex with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = DigestError;
    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; DIGEST_LEN] = b.try_into().map_err(|_| DigestError::Length(b.len()))?;
        Ok(Digest(arr))
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(b: [u8; DIGEST_LEN]) -> Self { Digest(b) }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::from_hex(s) }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            s.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            Digest::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let b: Vec<u8> = Deserialize::deserialize(d)?;
            Digest::try_from(b.as_slice()).map_err(serde::de::Error::custom)
        }
    }
}

/// One-way function from arbitrary bytes to a [`Digest`].
///
/// The choice of hasher is a compatibility constraint: any external verifier
/// re-deriving roots must use the same function.
pub trait Hasher: Send + Sync + 'static {
    fn hash(data: &[u8]) -> Digest;

    fn hash_concat(a: &[u8], b: &[u8]) -> Digest {
        let mut buf = Vec::with_capacity(a.len() + b.len());
        buf.extend_from_slice(a);
        buf.extend_from_slice(b);
        Self::hash(&buf)
    }
}

/// Ethereum keccak-256 (original Keccak padding, not NIST SHA3-256).
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256;

impl Hasher for Keccak256 {
    #[inline]
    fn hash(data: &[u8]) -> Digest {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Keccak::digest(data));
        Digest(out)
    }

    #[inline]
    fn hash_concat(a: &[u8], b: &[u8]) -> Digest {
        let mut hasher = Keccak::new();
        hasher.update(a);
        hasher.update(b);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&hasher.finalize());
        Digest(out)
    }
}

/// NIST SHA3-256, for deployments whose verifier is not an EVM contract.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha3;

impl Hasher for Sha3 {
    #[inline]
    fn hash(data: &[u8]) -> Digest {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Sha3_256::digest(data));
        Digest(out)
    }
}

#[inline]
pub fn keccak256(data: &[u8]) -> Digest { Keccak256::hash(data) }

/// Canonical pair combination: sort the two digests by byte value, then hash
/// the concatenation. `combine(a, b) == combine(b, a)`.
#[inline]
pub fn combine<H: Hasher>(a: &Digest, b: &Digest) -> Digest {
    if a <= b {
        H::hash_concat(&a.0, &b.0)
    } else {
        H::hash_concat(&b.0, &a.0)
    }
}

/// [`combine`] with keccak-256.
#[inline]
pub fn hash_pair(a: &Digest, b: &Digest) -> Digest { combine::<Keccak256>(a, b) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_vectors() {
        assert_eq!(
            keccak256(b"").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            keccak256(b"a").to_hex(),
            "0x3ac225168df54212a25c1c01fd35bebfea408fdac2e31ddd6f80a4bbf9a5f1cb"
        );
    }

    #[test]
    fn keccak_is_not_sha3() {
        assert_ne!(Keccak256::hash(b"abc"), Sha3::hash(b"abc"));
        assert_eq!(
            Sha3::hash(b"").to_hex(),
            "0xa7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn hash_concat_equals_hash_of_concatenation() {
        let joined = Keccak256::hash(b"helloworld");
        assert_eq!(Keccak256::hash_concat(b"hello", b"world"), joined);
        assert_eq!(Sha3::hash_concat(b"hello", b"world"), Sha3::hash(b"helloworld"));
    }

    #[test]
    fn combine_is_commutative_and_sorted() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        assert_eq!(hash_pair(&a, &b), Keccak256::hash_concat(&lo.0, &hi.0));
        assert_ne!(hash_pair(&a, &b), Keccak256::hash_concat(&hi.0, &lo.0));
    }

    #[test]
    fn hex_parse_and_display() {
        let d = keccak256(b"x");
        let s = d.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.parse::<Digest>().unwrap(), d);
        assert_eq!(Digest::from_hex(&s[2..]).unwrap(), d);
        assert_eq!(Digest::from_hex("0x1234"), Err(DigestError::Length(2)));
        assert!(matches!(Digest::from_hex("0xzz"), Err(DigestError::Hex(_))));
    }

    #[test]
    fn digest_errors_compare_and_convert() {
        fn decode(s: &str) -> Result<Vec<u8>, DigestError> { Ok(hex::decode(s)?) }
        assert_eq!(decode("abc"), Err(DigestError::Hex(hex::FromHexError::OddLength)));
        assert_ne!(DigestError::Length(1), DigestError::Length(2));
        assert_eq!(DigestError::Length(3).to_string(), "digest must be 32 bytes, got 3");
    }

    #[test]
    fn serde_human_readable_is_hex() {
        let d = keccak256(b"y");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        let bin = bincode::serialize(&d).unwrap();
        let back: Digest = bincode::deserialize(&bin).unwrap();
        assert_eq!(back, d);
    }
}
