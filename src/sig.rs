//! Creation and verification of (Ethereum) signatures.
//!
//! The modules (and their respective dependency) can be enabled/disabled with
//! the equally named feature flags. [Error] and [Signer] are re-exported from
//! the selected module. If both feature flags are present, [secp256k1] is
//! used because [k256] is marked as the default in cargo.toml.

use crate::types::Hash;
use sha3::{Digest, Keccak256};

#[cfg(test)]
mod tests;

// Import the requested implementation(s), as well as the dummy fallback to
// make sure it always compiles, too, even if no feature flag is set.
#[doc(hidden)]
mod dummy;
#[cfg(feature = "k256")]
pub mod k256;
#[cfg(feature = "secp256k1")]
pub mod secp256k1;

// Complain if no signing implementation is set, while hiding all the errors
// resulting from that by using the dummy implementation.
#[cfg(not(any(feature = "secp256k1", feature = "k256")))]
compile_error!(
    "Signature dependency needed, use one of the following feature flags: 'secp256k1', 'k256'"
);
#[cfg(not(any(feature = "secp256k1", feature = "k256")))]
pub use self::dummy::{recover_signer, Error, Signer};

// Only use k256 (part of default) if the secp256k1 feature flag is not set.
// The application may enable both feature flags, this logic chooses secp256k1
// in this case (thus ignoring k256 which is enabled by default).
#[cfg(all(not(feature = "secp256k1"), feature = "k256"))]
pub use self::k256::{recover_signer, Error, Signer};
#[cfg(feature = "secp256k1")]
#[doc(hidden)]
pub use self::secp256k1::{recover_signer, Error, Signer};

/// Helper function for the Signers.
///
/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash. This is the
/// format expected by the Solidity contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use a structured serializer.
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}
