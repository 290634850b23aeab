//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use super::hash_to_eth_signed_msg_hash;
use crate::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as K256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha3::{Digest, Keccak256};

pub use k256::ecdsa::Error;

#[derive(Debug)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        // Convert the key into an EncodedPoint (on the curve), which has the
        // data we need in bytes [1..]. This panics if the bytes
        // representation of EncodedPoint is not 65 bytes, which is unlikely
        // to change in the dependency.
        let pk_bytes: [u8; 65] = key.to_encoded_point(false).as_bytes().try_into().unwrap();

        // Throw away the first byte, which is not part of the public key. It
        // is added by the uncompressed encoding.
        let hash: [u8; 32] = Keccak256::digest(&pk_bytes[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

impl Signer {
    /// Creates a Signer from 32 secret-key bytes.
    pub fn new(secret_key: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(secret_key)?;
        let addr = key.verifying_key().into();

        Ok(Self { key, addr })
    }

    /// Creates a Signer with a fresh random key. Test/demo use.
    pub fn random<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(rng);
        let addr = key.verifying_key().into();

        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using an Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self
            .key
            .sign_prehash(&hash.0)
            .expect("prehash has the right length for the curve");

        // Luckily for us, this Signature type already has the format we need:
        // 65 bytes containing r, s and v in this order. But we still have to
        // add 27 to v for the signature to be valid in the EVM.
        let mut sig_bytes: [u8; 65] = sig.as_bytes().try_into().expect(
            "Unreachable: Signature size doesn't match, something big must have changed in the dependency",
        );
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Signature(sig_bytes)
    }

    /// Recover the signer address from a signature.
    ///
    /// `hash` is the hash of the data given to [Self::sign_eth()], it should
    /// not include the `Ethereum Signed Message` prefix.
    pub fn recover_signer(&self, hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover_signer(hash, eth_sig)
    }
}

/// Context-free recovery, for verifiers that hold no key of their own.
pub fn recover_signer(hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(hash);

    // Undo adding the 27, to go back to the format expected below. A v below
    // 27 cannot come from sign_eth and must not wrap around.
    let mut sig_bytes: [u8; 65] = eth_sig.0;
    sig_bytes[64] = sig_bytes[64].checked_sub(27).ok_or_else(Error::new)?;

    let sig = recoverable::Signature::from_bytes(&sig_bytes)?;

    let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
    Ok(verifying_key.into())
}
