//! Seam to the on-ledger world.
//!
//! The protocol engine only ever talks to the ledger through the
//! [LedgerGateway] trait: deploying the arbiter contract, submitting signed
//! transactions to it and reading its views. A production implementation
//! wraps a JSON-RPC client and consumes the [ContractCode] blob; the
//! in-crate [MemoryLedger] implements the same trait plus the arbiter's
//! semantics for tests and examples.

mod arbiter;
mod memory;

pub use arbiter::Arbiter;
pub use memory::MemoryLedger;

use crate::sig::Signer;
use crate::types::{Address, ChannelId, Signature, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger executed (or simulated) the call and the contract rejected
    /// it. Distinct from transport problems: a revert is an answer.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// The ledger could not be reached or gave a malformed response.
    #[error("ledger rpc failure: {0}")]
    Rpc(String),
    /// A view returned a value of an unexpected shape.
    #[error("unexpected value returned by {0}")]
    BadReturnValue(&'static str),
}

/// Outcome of a mined transaction.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    pub block: u64,
}

/// Compiled arbiter contract, as handed to the node at construction time.
///
/// The gateway interprets it; the [MemoryLedger] carries its own arbiter
/// semantics and ignores the blob.
#[derive(Debug, Clone, Default)]
pub struct ContractCode {
    pub bytecode: Vec<u8>,
    pub abi: String,
}

/// Constructor arguments of the arbiter contract. The deployer becomes
/// party 1; the deposit is the value carried by the deployment.
#[derive(Debug, Copy, Clone)]
pub struct ArbiterCtor {
    pub other_party: Address,
    pub appeal_period: u64,
}

/// State-changing arbiter entry points.
#[derive(Debug, Copy, Clone)]
pub enum ArbiterCall {
    OneSidedClose {
        balance1: U256,
        balance2: U256,
        serial: u64,
        sig: Signature,
    },
    AppealClosure {
        balance1: U256,
        balance2: U256,
        serial: u64,
        sig: Signature,
    },
    WithdrawFunds {
        to: Address,
    },
}

/// Read-only arbiter views.
#[derive(Debug, Copy, Clone)]
pub enum ArbiterQuery {
    Party1,
    Party2,
    TotalDeposit,
    AppealPeriodLen,
    ChannelClosed,
    CurrentSerialNum,
    GetBalance,
}

/// Dynamically typed view result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

impl QueryValue {
    pub fn into_address(self, view: &'static str) -> Result<Address, LedgerError> {
        match self {
            QueryValue::Address(a) => Ok(a),
            _ => Err(LedgerError::BadReturnValue(view)),
        }
    }

    pub fn into_uint(self, view: &'static str) -> Result<U256, LedgerError> {
        match self {
            QueryValue::Uint(v) => Ok(v),
            _ => Err(LedgerError::BadReturnValue(view)),
        }
    }

    pub fn into_bool(self, view: &'static str) -> Result<bool, LedgerError> {
        match self {
            QueryValue::Bool(b) => Ok(b),
            _ => Err(LedgerError::BadReturnValue(view)),
        }
    }
}

/// Connection to the ledger. Stateless apart from the connection itself; all
/// side effects live on the ledger.
///
/// `transact` pre-simulates the call the way JSON-RPC gas estimation does: a
/// call that would revert is reported as [LedgerError::Reverted] and never
/// submitted, so no transaction appears on the ledger for it.
pub trait LedgerGateway {
    /// Deploys the arbiter, carrying `value` as the channel deposit. Returns
    /// the contract address; fails if the deployment did not succeed.
    fn deploy(
        &self,
        code: &ContractCode,
        signer: &Signer,
        ctor: ArbiterCtor,
        value: U256,
    ) -> Result<ChannelId, LedgerError>;

    /// Read-only view call, executed against the current block.
    fn call(
        &self,
        contract: ChannelId,
        from: Address,
        query: ArbiterQuery,
    ) -> Result<QueryValue, LedgerError>;

    /// Submits a signed transaction and blocks until it is mined.
    fn transact(
        &self,
        contract: ChannelId,
        signer: &Signer,
        call: ArbiterCall,
        value: U256,
    ) -> Result<Receipt, LedgerError>;

    /// Free balance of an account.
    fn balance(&self, addr: Address) -> U256;

    /// Current block height.
    fn block_number(&self) -> u64;

    /// Test-only: advance the chain by `blocks` empty blocks.
    fn mine(&self, blocks: u64);
}

impl<L: LedgerGateway> LedgerGateway for std::rc::Rc<L> {
    fn deploy(
        &self,
        code: &ContractCode,
        signer: &Signer,
        ctor: ArbiterCtor,
        value: U256,
    ) -> Result<ChannelId, LedgerError> {
        (**self).deploy(code, signer, ctor, value)
    }

    fn call(
        &self,
        contract: ChannelId,
        from: Address,
        query: ArbiterQuery,
    ) -> Result<QueryValue, LedgerError> {
        (**self).call(contract, from, query)
    }

    fn transact(
        &self,
        contract: ChannelId,
        signer: &Signer,
        call: ArbiterCall,
        value: U256,
    ) -> Result<Receipt, LedgerError> {
        (**self).transact(contract, signer, call, value)
    }

    fn balance(&self, addr: Address) -> U256 {
        (**self).balance(addr)
    }

    fn block_number(&self) -> u64 {
        (**self).block_number()
    }

    fn mine(&self, blocks: u64) {
        (**self).mine(blocks)
    }
}
