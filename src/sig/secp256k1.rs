//! Signer using the secp256k1 C-Library.

use super::hash_to_eth_signed_msg_hash;
use crate::types::{Address, Hash, Signature};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};

pub use secp256k1::Error;

#[derive(Debug)]
pub struct Signer {
    secp: Secp256k1<All>,
    sk: SecretKey,
    addr: Address,
}

impl Signer {
    /// Creates a Signer from 32 secret-key bytes.
    pub fn new(secret_key: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(secret_key)?;
        let pk = PublicKey::from_secret_key(&secp, &sk);

        Ok(Self {
            secp,
            sk,
            addr: pk.into(),
        })
    }

    /// Creates a Signer with a fresh random key. Test/demo use.
    pub fn random<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(rng);

        Self {
            secp,
            sk,
            addr: pk.into(),
        }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using an Ethereum 65-byte recoverable signature.
    ///
    /// Note that this differs from transaction signatures, as it does not
    /// include the length. 64-byte recoverable signatures would be possible,
    /// but are not implemented here for simplicity.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        // We have to use sign_ecdsa_recoverable because the smart contract
        // must be able to recover the address. This gives us the additional
        // information needed for v.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from(hash), &self.sk);

        let (v, rs) = sig.serialize_compact();

        // [EIP-2](https://eips.ethereum.org/EIPS/eip-2) makes all signatures
        // with a non-canonical solution (s starts with the bit 1) invalid.
        // The library already produces canonical signatures, this
        // debug_assert is just to fail early if that changes at some point.
        debug_assert!(rs[32] & 0x80 == 0);

        // According to [EIP-2098](https://eips.ethereum.org/EIPS/eip-2098),
        // the yParity (v) is offset by 27 so the value does not collide with
        // other binary prefixes used in Bitcoin. No EIP-155 chain id: the
        // on-chain verifier recovers with a plain ecrecover.
        let v: u8 = 27 + v.to_i32() as u8;

        Signature::new(&rs, v)
    }

    /// Recover the signer address from a signature.
    ///
    /// `hash` is the hash of the data given to [Self::sign_eth()], it should
    /// not include the `Ethereum Signed Message` prefix.
    pub fn recover_signer(&self, hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover_with(&self.secp, hash, eth_sig)
    }
}

/// Context-free recovery, for verifiers that hold no key of their own.
pub fn recover_signer(hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
    recover_with(&Secp256k1::new(), hash, eth_sig)
}

fn recover_with<C: secp256k1::Context + secp256k1::Verification>(
    secp: &Secp256k1<C>,
    hash: Hash,
    eth_sig: Signature,
) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(hash);

    let rs = &eth_sig.0[..64];
    // Undo adding the 27, to go back to the format expected below. A v below
    // 27 cannot come from sign_eth and must not wrap around.
    let v = eth_sig.0[64]
        .checked_sub(27)
        .ok_or(Error::InvalidRecoveryId)?;

    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(rs, recid)?;

    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;

    Ok(pk.into())
}
