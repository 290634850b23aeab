//! Typed interface to a deployed arbiter contract.
//!
//! The engine's safety rests on the semantic contract behind these entry
//! points, whatever the on-chain implementation:
//!
//! - `one_sided_close`: while not closed, accepts a state only if it is
//!   countersigned by the caller's counterparty and its balances sum to the
//!   deposit; `serial == 0` with the zero signature is the unsigned
//!   initial-state escape hatch. Records the state and starts the appeal
//!   timer.
//! - `appeal_closure`: only within the appeal window; accepts only a
//!   strictly newer countersigned state and overwrites the recorded one.
//! - `withdraw_funds`: only after the window; pays out the caller's recorded
//!   balance exactly once.
//! - `get_balance` reverts before the window has elapsed and for
//!   non-participants.

use super::{ArbiterCall, ArbiterQuery, LedgerError, LedgerGateway, Receipt};
use crate::sig::Signer;
use crate::state::ChannelStateMessage;
use crate::types::{Address, ChannelId, U256};

/// Binds a contract address and a caller address to a gateway, one method per
/// entry point of the arbiter ABI.
#[derive(Debug)]
pub struct Arbiter<'a, L: LedgerGateway> {
    ledger: &'a L,
    contract: ChannelId,
    from: Address,
}

impl<'a, L: LedgerGateway> Arbiter<'a, L> {
    pub fn new(ledger: &'a L, contract: ChannelId, from: Address) -> Self {
        Self {
            ledger,
            contract,
            from,
        }
    }

    fn view(&self, query: ArbiterQuery) -> Result<super::QueryValue, LedgerError> {
        self.ledger.call(self.contract, self.from, query)
    }

    pub fn party1(&self) -> Result<Address, LedgerError> {
        self.view(ArbiterQuery::Party1)?.into_address("party1")
    }

    pub fn party2(&self) -> Result<Address, LedgerError> {
        self.view(ArbiterQuery::Party2)?.into_address("party2")
    }

    pub fn total_deposit(&self) -> Result<U256, LedgerError> {
        self.view(ArbiterQuery::TotalDeposit)?.into_uint("totalDeposit")
    }

    pub fn appeal_period_len(&self) -> Result<u64, LedgerError> {
        Ok(self
            .view(ArbiterQuery::AppealPeriodLen)?
            .into_uint("appealPeriodLen")?
            .low_u64())
    }

    pub fn channel_closed(&self) -> Result<bool, LedgerError> {
        self.view(ArbiterQuery::ChannelClosed)?.into_bool("channelClosed")
    }

    pub fn current_serial(&self) -> Result<u64, LedgerError> {
        Ok(self
            .view(ArbiterQuery::CurrentSerialNum)?
            .into_uint("currentSerialNum")?
            .low_u64())
    }

    /// The caller's withdrawable balance. Reverts while the appeal window is
    /// still running and for non-participants.
    pub fn get_balance(&self) -> Result<U256, LedgerError> {
        self.view(ArbiterQuery::GetBalance)?.into_uint("getBalance")
    }

    pub fn one_sided_close(
        &self,
        signer: &Signer,
        state: &ChannelStateMessage,
    ) -> Result<Receipt, LedgerError> {
        self.ledger.transact(
            self.contract,
            signer,
            ArbiterCall::OneSidedClose {
                balance1: state.balance1,
                balance2: state.balance2,
                serial: state.serial,
                sig: state.sig,
            },
            U256::zero(),
        )
    }

    pub fn appeal_closure(
        &self,
        signer: &Signer,
        state: &ChannelStateMessage,
    ) -> Result<Receipt, LedgerError> {
        self.ledger.transact(
            self.contract,
            signer,
            ArbiterCall::AppealClosure {
                balance1: state.balance1,
                balance2: state.balance2,
                serial: state.serial,
                sig: state.sig,
            },
            U256::zero(),
        )
    }

    pub fn withdraw_funds(&self, signer: &Signer, to: Address) -> Result<Receipt, LedgerError> {
        self.ledger.transact(
            self.contract,
            signer,
            ArbiterCall::WithdrawFunds { to },
            U256::zero(),
        )
    }
}
