use crate::ledger::LedgerError;
use crate::types::{ChannelId, U256};
use thiserror::Error;

/// Errors surfaced to callers of the public node API.
///
/// Inbound network handlers never produce these: a malicious peer must not be
/// able to disrupt the node, so bad inbound messages are dropped silently.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown channel {0:?}")]
    UnknownChannel(ChannelId),
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: U256, required: U256 },
    #[error("channel {0:?} is already closed")]
    AlreadyClosed(ChannelId),
    #[error("cannot withdraw from channel {0:?} yet")]
    CannotWithdrawYet(ChannelId),
    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = core::result::Result<T, Error>;
