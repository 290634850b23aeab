//! Dummy Signer that always panics. Fallback if no signer feature flag is
//! selected, so the crate still type-checks while the compile_error in the
//! parent module points at the missing feature.

use crate::types::{Address, Hash, Signature};
use core::fmt::Display;

#[derive(Debug)]
pub struct Error {}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("no signature backend enabled")
    }
}

impl std::error::Error for Error {}

#[derive(Debug)]
pub struct Signer {}

impl Signer {
    pub fn new(_secret_key: &[u8; 32]) -> Result<Self, Error> {
        unimplemented!()
    }

    pub fn random<R: rand::Rng + rand::CryptoRng>(_rng: &mut R) -> Self {
        unimplemented!()
    }

    pub fn address(&self) -> Address {
        unimplemented!()
    }

    pub fn sign_eth(&self, _msg: Hash) -> Signature {
        unimplemented!()
    }

    pub fn recover_signer(&self, _hash: Hash, _eth_sig: Signature) -> Result<Address, Error> {
        unimplemented!()
    }
}

pub fn recover_signer(_hash: Hash, _eth_sig: Signature) -> Result<Address, Error> {
    unimplemented!()
}
