//! Base on-ledger types: addresses, hashes, signatures and 256-bit integers.

use core::fmt::Debug;

use rand::{distributions::Standard, prelude::Distribution};
use serde::{de, Deserialize, Serialize};
use uint::construct_uint;

#[cfg(feature = "secp256k1")]
use secp256k1::{PublicKey, ThirtyTwoByteHash};
#[cfg(feature = "secp256k1")]
use sha3::{Digest, Keccak256};

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

// Binary fields travel as 0x-prefixed hex strings when (de)serialized, so
// exported states stay readable and round-trip through JSON.
macro_rules! impl_serde_hex {
    ($T:ident, $N:literal) => {
        impl Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                let mut s = String::with_capacity(2 + 2 * $N);
                s.push_str("0x");
                s.push_str(&uint::hex::encode(self.0));
                serializer.serialize_str(&s)
            }
        }

        impl<'de> Deserialize<'de> for $T {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let raw = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = uint::hex::decode(raw).map_err(de::Error::custom)?;
                let arr: [u8; $N] = bytes
                    .try_into()
                    .map_err(|_| de::Error::custom(concat!("expected ", $N, " bytes")))?;
                Ok($T(arr))
            }
        }
    };
}

/// 20-byte on-ledger account identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);
impl_hex_debug!(Address);
impl_serde_hex!(Address, 20);

/// A channel is identified by the on-ledger address of its arbiter contract.
pub type ChannelId = Address;

#[cfg(feature = "secp256k1")]
impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        // Throw away the first byte, which is not part of the public key. It
        // is added by serialize_uncompressed due to the encoding used.
        let hash: [u8; 32] = Keccak256::digest(&pk.serialize_uncompressed()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

impl Distribution<Address> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Address {
        Address(rng.gen())
    }
}

/// 32-byte Keccak-256 digest.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Hash(pub [u8; 32]);
impl_hex_debug!(Hash);
impl_serde_hex!(Hash, 32);

#[cfg(feature = "secp256k1")]
impl ThirtyTwoByteHash for Hash {
    fn into_32(self) -> [u8; 32] {
        self.0
    }
}

/// 65-byte recoverable ECDSA signature, stored as `r (32) || s (32) || v (1)`.
///
/// `v` is 27 or 28 for a real signature. The all-zero value is the "unsigned
/// placeholder" sentinel carried by the initial channel state; it never
/// verifies.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Signature(pub [u8; 65]);
impl_hex_debug!(Signature);
impl_serde_hex!(Signature, 65);

impl Signature {
    /// The unsigned-placeholder sentinel.
    pub const ZERO: Signature = Signature([0; 65]);

    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig: Signature = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }

    pub fn r(&self) -> [u8; 32] {
        self.0[..32].try_into().expect("slice length is 32")
    }

    pub fn s(&self) -> [u8; 32] {
        self.0[32..64].try_into().expect("slice length is 32")
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 65]
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::ZERO
    }
}

// We could use primitive_types::U256 or ethereum_types::U256 here, too. Both
// internally use construct_uint and don't add much functionality, so it is
// easier to just create our own type.
construct_uint! {
    pub struct U256(4);
}

// Money amounts serialize as decimal strings: unambiguous, and large values
// stay exact where a JSON number would not.
impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(de::Error::custom)
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_accessors_split_r_s_v() {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&[0xaa; 32]);
        rs[32..].copy_from_slice(&[0xbb; 32]);
        let sig = Signature::new(&rs, 28);

        assert_eq!(sig.r(), [0xaa; 32]);
        assert_eq!(sig.s(), [0xbb; 32]);
        assert_eq!(sig.v(), 28);
        assert!(!sig.is_zero());
        assert!(Signature::ZERO.is_zero());
    }

    #[test]
    fn address_hex_debug() {
        let mut addr = Address::default();
        addr.0[0] = 0xde;
        addr.0[19] = 0xad;
        let s = format!("{:?}", addr);
        assert!(s.starts_with("0xde"));
        assert!(s.ends_with("ad"));
        assert_eq!(s.len(), 2 + 40);
    }

    #[test]
    fn u256_serde_decimal_round_trip() {
        let v = U256::exp10(18) * U256::from(7u64);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"7000000000000000000\"");
        assert_eq!(serde_json::from_str::<U256>(&json).unwrap(), v);
    }

    #[test]
    fn address_serde_hex_round_trip() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let addr: Address = rng.gen();
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.starts_with("\"0x"));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
    }
}
