//! Channel state messages and their canonical hashing, signing and
//! verification.
//!
//! A [ChannelStateMessage] is the unit both peers exchange off-chain and the
//! evidence the arbiter contract accepts on-chain, so the hash computed here
//! must match the contract's `keccak256(abi.encodePacked(...))` bit for bit.

use crate::sig::{self, Signer};
use crate::types::{Address, ChannelId, Hash, Signature, U256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// One state of a payment channel: the balance split at a given serial
/// number, optionally signed. Immutable value; signing returns a new message.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelStateMessage {
    /// Address of the channel's arbiter contract.
    pub channel: ChannelId,
    /// Balance of the channel's creator (party 1).
    pub balance1: U256,
    /// Balance of the other party (party 2).
    pub balance2: U256,
    /// Monotonic state sequence number; 0 is the initial state.
    pub serial: u64,
    /// Recoverable signature over [state_hash], or [Signature::ZERO] for the
    /// unsigned placeholder.
    pub sig: Signature,
}

impl ChannelStateMessage {
    /// A state carrying the unsigned-placeholder signature.
    pub fn unsigned(channel: ChannelId, balance1: U256, balance2: U256, serial: u64) -> Self {
        Self {
            channel,
            balance1,
            balance2,
            serial,
            sig: Signature::ZERO,
        }
    }

    /// The implicit state every channel starts in: the whole deposit on the
    /// creator's side, serial 0, no signature. The arbiter accepts it as the
    /// unsigned close escape hatch for a closer with no countersigned
    /// history.
    pub fn initial(channel: ChannelId, total_deposit: U256) -> Self {
        Self::unsigned(channel, total_deposit, U256::zero(), 0)
    }
}

/// Canonical hash of a state: `keccak256(address || uint256 || uint256 ||
/// uint256)` over (channel, balance1, balance2, serial).
///
/// Packed encoding => hash the fields back to back, the address as its 20 raw
/// bytes, the integers as 32-byte big-endian words.
pub fn state_hash(msg: &ChannelStateMessage) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(msg.channel.0);

    let mut word = [0u8; 32];
    msg.balance1.to_big_endian(&mut word);
    hasher.update(word);
    msg.balance2.to_big_endian(&mut word);
    hasher.update(word);
    U256::from(msg.serial).to_big_endian(&mut word);
    hasher.update(word);

    Hash(hasher.finalize().into())
}

/// Returns a copy of `msg` signed by `signer`. The signature covers the
/// canonical hash wrapped in the Ethereum signed-message prefix.
pub fn sign(signer: &Signer, msg: &ChannelStateMessage) -> ChannelStateMessage {
    ChannelStateMessage {
        sig: signer.sign_eth(state_hash(msg)),
        ..*msg
    }
}

/// Recovers the address that signed `msg`.
pub fn recover(msg: &ChannelStateMessage) -> Result<Address, sig::Error> {
    sig::recover_signer(state_hash(msg), msg.sig)
}

/// True iff `msg` carries a real signature by `expected` over exactly this
/// (channel, balance1, balance2, serial) tuple.
pub fn verify(msg: &ChannelStateMessage, expected: Address) -> bool {
    !msg.sig.is_zero() && recover(msg).map_or(false, |addr| addr == expected)
}
