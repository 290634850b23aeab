//! In-memory ledger: the reference [LedgerGateway] used by tests, examples
//! and local simulations.
//!
//! One block is mined per transaction (automine); `mine` advances the chain
//! with empty blocks. Gas is not modeled. The arbiter semantics the engine
//! relies on are enforced here exactly as a deployed contract would: a call
//! that violates them reverts during pre-simulation and never becomes a
//! transaction.

use super::{
    ArbiterCall, ArbiterCtor, ArbiterQuery, ContractCode, LedgerError, LedgerGateway, QueryValue,
    Receipt,
};
use crate::sig::Signer;
use crate::state::{self, ChannelStateMessage};
use crate::types::{Address, ChannelId, Signature, U256};
use sha3::{Digest, Keccak256};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RefCell<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    block: u64,
    accounts: HashMap<Address, U256>,
    arbiters: HashMap<ChannelId, ArbiterState>,
    deploy_nonce: u64,
    tx_count: u64,
}

/// Storage of one deployed arbiter contract.
#[derive(Debug)]
struct ArbiterState {
    party1: Address,
    party2: Address,
    appeal_period_len: u64,
    total_deposit: U256,
    balance1: U256,
    balance2: U256,
    current_serial: u64,
    closed: bool,
    close_block: u64,
}

impl ArbiterState {
    fn is_participant(&self, addr: Address) -> bool {
        addr == self.party1 || addr == self.party2
    }

    fn counterparty_of(&self, addr: Address) -> Address {
        if addr == self.party1 {
            self.party2
        } else {
            self.party1
        }
    }

    fn window_over(&self, block: u64) -> bool {
        self.closed && block > self.close_block + self.appeal_period_len
    }
}

fn revert(reason: &str) -> LedgerError {
    LedgerError::Reverted(reason.to_owned())
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to a test account.
    pub fn fund(&self, addr: Address, amount: U256) {
        let mut inner = self.inner.borrow_mut();
        let entry = inner.accounts.entry(addr).or_insert_with(U256::zero);
        *entry = *entry + amount;
    }

    /// Starts (or restarts) counting mined transactions.
    pub fn start_tx_count(&self) {
        self.inner.borrow_mut().tx_count = 0;
    }

    /// Number of transactions mined since the last [Self::start_tx_count].
    pub fn tx_count(&self) -> u64 {
        self.inner.borrow().tx_count
    }
}

impl Inner {
    /// Checks-then-apply execution of one arbiter call; every `?` happens
    /// before the first mutation, so a revert leaves the ledger untouched.
    /// `mined_block` is the height the containing transaction lands in.
    fn execute(
        &mut self,
        contract: ChannelId,
        caller: Address,
        call: &ArbiterCall,
        mined_block: u64,
    ) -> Result<(), LedgerError> {
        let arb = self
            .arbiters
            .get_mut(&contract)
            .ok_or_else(|| LedgerError::Rpc(format!("no contract at {:?}", contract)))?;
        if !arb.is_participant(caller) {
            return Err(revert("caller is not a channel party"));
        }

        match *call {
            ArbiterCall::OneSidedClose {
                balance1,
                balance2,
                serial,
                sig,
            } => {
                if arb.closed {
                    return Err(revert("channel already closed"));
                }
                check_state(arb, contract, caller, balance1, balance2, serial, sig)?;

                arb.balance1 = balance1;
                arb.balance2 = balance2;
                arb.current_serial = serial;
                arb.closed = true;
                arb.close_block = mined_block;
            }
            ArbiterCall::AppealClosure {
                balance1,
                balance2,
                serial,
                sig,
            } => {
                if !arb.closed {
                    return Err(revert("channel is not closed"));
                }
                if mined_block > arb.close_block + arb.appeal_period_len {
                    return Err(revert("appeal period is over"));
                }
                if serial <= arb.current_serial {
                    return Err(revert("appeal must carry a newer state"));
                }
                check_state(arb, contract, caller, balance1, balance2, serial, sig)?;

                // The appeal window keeps running; a successful appeal does
                // not restart it.
                arb.balance1 = balance1;
                arb.balance2 = balance2;
                arb.current_serial = serial;
            }
            ArbiterCall::WithdrawFunds { to } => {
                if !arb.window_over(mined_block) {
                    return Err(revert("appeal period is not over"));
                }
                let amount = if caller == arb.party1 {
                    arb.balance1
                } else {
                    arb.balance2
                };
                if amount.is_zero() {
                    return Err(revert("nothing to withdraw"));
                }

                // Zero the recorded balance before paying out: double-pay
                // protection.
                if caller == arb.party1 {
                    arb.balance1 = U256::zero();
                } else {
                    arb.balance2 = U256::zero();
                }
                let contract_funds = self
                    .accounts
                    .entry(contract)
                    .or_insert_with(U256::zero);
                *contract_funds = *contract_funds - amount;
                let dst = self.accounts.entry(to).or_insert_with(U256::zero);
                *dst = *dst + amount;
            }
        }
        Ok(())
    }
}

/// Shared state validation of `oneSidedClose` and `appealClosure`: balances
/// must split the deposit exactly, and the state must be countersigned by
/// the caller's counterparty — except for the unsigned initial state, which
/// is only acceptable as the untouched deposit split.
fn check_state(
    arb: &ArbiterState,
    contract: ChannelId,
    caller: Address,
    balance1: U256,
    balance2: U256,
    serial: u64,
    sig: Signature,
) -> Result<(), LedgerError> {
    if balance1.checked_add(balance2) != Some(arb.total_deposit) {
        return Err(revert("balances do not sum to the deposit"));
    }
    if serial == 0 && sig.is_zero() {
        if balance1 != arb.total_deposit || !balance2.is_zero() {
            return Err(revert("unsigned close must carry the initial state"));
        }
        return Ok(());
    }

    let msg = ChannelStateMessage {
        channel: contract,
        balance1,
        balance2,
        serial,
        sig,
    };
    let expected = arb.counterparty_of(caller);
    match state::recover(&msg) {
        Ok(signer) if signer == expected => Ok(()),
        _ => Err(revert("state is not signed by the counterparty")),
    }
}

impl LedgerGateway for MemoryLedger {
    fn deploy(
        &self,
        _code: &ContractCode,
        signer: &Signer,
        ctor: ArbiterCtor,
        value: U256,
    ) -> Result<ChannelId, LedgerError> {
        let mut inner = self.inner.borrow_mut();
        let from = signer.address();

        let funds = inner.accounts.get(&from).copied().unwrap_or_default();
        if funds < value {
            return Err(LedgerError::Rpc(format!(
                "deployer {:?} cannot cover the deposit",
                from
            )));
        }

        // Deterministic contract address from deployer and nonce.
        let mut hasher = Keccak256::new();
        hasher.update(from.0);
        hasher.update(inner.deploy_nonce.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        let mut contract = Address::default();
        contract.0.copy_from_slice(&digest[12..]);
        inner.deploy_nonce += 1;

        *inner.accounts.get_mut(&from).expect("checked above") = funds - value;
        let held = inner.accounts.entry(contract).or_insert_with(U256::zero);
        *held = *held + value;

        inner.arbiters.insert(
            contract,
            ArbiterState {
                party1: from,
                party2: ctor.other_party,
                appeal_period_len: ctor.appeal_period,
                total_deposit: value,
                balance1: value,
                balance2: U256::zero(),
                current_serial: 0,
                closed: false,
                close_block: 0,
            },
        );

        inner.block += 1;
        inner.tx_count += 1;
        debug!(?contract, deposit = %value, "arbiter deployed");
        Ok(contract)
    }

    fn call(
        &self,
        contract: ChannelId,
        from: Address,
        query: ArbiterQuery,
    ) -> Result<QueryValue, LedgerError> {
        let inner = self.inner.borrow();
        let arb = inner
            .arbiters
            .get(&contract)
            .ok_or_else(|| LedgerError::Rpc(format!("no contract at {:?}", contract)))?;

        Ok(match query {
            ArbiterQuery::Party1 => QueryValue::Address(arb.party1),
            ArbiterQuery::Party2 => QueryValue::Address(arb.party2),
            ArbiterQuery::TotalDeposit => QueryValue::Uint(arb.total_deposit),
            ArbiterQuery::AppealPeriodLen => QueryValue::Uint(U256::from(arb.appeal_period_len)),
            ArbiterQuery::ChannelClosed => QueryValue::Bool(arb.closed),
            ArbiterQuery::CurrentSerialNum => QueryValue::Uint(U256::from(arb.current_serial)),
            ArbiterQuery::GetBalance => {
                if !arb.window_over(inner.block) {
                    return Err(revert("appeal period is not over"));
                }
                if from == arb.party1 {
                    QueryValue::Uint(arb.balance1)
                } else if from == arb.party2 {
                    QueryValue::Uint(arb.balance2)
                } else {
                    return Err(revert("caller is not a channel party"));
                }
            }
        })
    }

    fn transact(
        &self,
        contract: ChannelId,
        signer: &Signer,
        call: ArbiterCall,
        value: U256,
    ) -> Result<Receipt, LedgerError> {
        if !value.is_zero() {
            return Err(revert("function is not payable"));
        }

        let mut inner = self.inner.borrow_mut();
        let mined_block = inner.block + 1;
        inner.execute(contract, signer.address(), &call, mined_block)?;
        inner.block = mined_block;
        inner.tx_count += 1;
        debug!(?contract, block = mined_block, ?call, "transaction mined");

        Ok(Receipt {
            success: true,
            block: mined_block,
        })
    }

    fn balance(&self, addr: Address) -> U256 {
        self.inner
            .borrow()
            .accounts
            .get(&addr)
            .copied()
            .unwrap_or_default()
    }

    fn block_number(&self) -> u64 {
        self.inner.borrow().block
    }

    fn mine(&self, blocks: u64) {
        self.inner.borrow_mut().block += blocks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sign;

    const SK_ALICE: [u8; 32] = [0x11; 32];
    const SK_BOB: [u8; 32] = [0x22; 32];
    const SK_CHARLIE: [u8; 32] = [0x33; 32];

    const PERIOD: u64 = 5;

    fn eth(n: u64) -> U256 {
        U256::exp10(18) * U256::from(n)
    }

    fn setup() -> (MemoryLedger, Signer, Signer, ChannelId) {
        let ledger = MemoryLedger::new();
        let alice = Signer::new(&SK_ALICE).unwrap();
        let bob = Signer::new(&SK_BOB).unwrap();
        ledger.fund(alice.address(), eth(100));
        ledger.fund(bob.address(), eth(100));

        let chan = ledger
            .deploy(
                &ContractCode::default(),
                &alice,
                ArbiterCtor {
                    other_party: bob.address(),
                    appeal_period: PERIOD,
                },
                eth(10),
            )
            .unwrap();
        (ledger, alice, bob, chan)
    }

    fn countersigned(
        signer: &Signer,
        chan: ChannelId,
        b1: u64,
        b2: u64,
        serial: u64,
    ) -> ChannelStateMessage {
        sign(
            signer,
            &ChannelStateMessage::unsigned(chan, eth(b1), eth(b2), serial),
        )
    }

    fn close_with(
        ledger: &MemoryLedger,
        caller: &Signer,
        chan: ChannelId,
        state: &ChannelStateMessage,
    ) -> Result<Receipt, LedgerError> {
        ledger.transact(
            chan,
            caller,
            ArbiterCall::OneSidedClose {
                balance1: state.balance1,
                balance2: state.balance2,
                serial: state.serial,
                sig: state.sig,
            },
            U256::zero(),
        )
    }

    #[test]
    fn deploy_moves_deposit_and_mines() {
        let (ledger, alice, _bob, chan) = setup();
        assert_eq!(ledger.balance(chan), eth(10));
        assert_eq!(ledger.balance(alice.address()), eth(90));
        assert_eq!(ledger.block_number(), 1);
        assert_eq!(ledger.tx_count(), 1);
    }

    #[test]
    fn close_accepts_countersigned_state() {
        let (ledger, alice, bob, chan) = setup();
        // Alice closes with a state signed by Bob.
        let state = countersigned(&bob, chan, 9, 1, 1);
        assert!(close_with(&ledger, &alice, chan, &state).unwrap().success);

        let closed = ledger
            .call(chan, alice.address(), ArbiterQuery::ChannelClosed)
            .unwrap();
        assert_eq!(closed, QueryValue::Bool(true));
    }

    #[test]
    fn close_rejects_zero_signature_on_nonzero_serial() {
        let (ledger, alice, _bob, chan) = setup();
        let state = ChannelStateMessage::unsigned(chan, eth(9), eth(1), 1);
        let err = close_with(&ledger, &alice, chan, &state).unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[test]
    fn close_rejects_third_party_signature() {
        let (ledger, alice, _bob, chan) = setup();
        let charlie = Signer::new(&SK_CHARLIE).unwrap();
        let state = countersigned(&charlie, chan, 5, 5, 10);
        assert!(close_with(&ledger, &alice, chan, &state).is_err());
    }

    #[test]
    fn close_rejects_self_signed_state() {
        // A fabricated state the counterparty never signed, however high the
        // serial, fails the recovery check.
        let (ledger, alice, _bob, chan) = setup();
        let state = countersigned(&alice, chan, 9, 1, 999);
        assert!(close_with(&ledger, &alice, chan, &state).is_err());
    }

    #[test]
    fn close_rejects_bad_balance_sum() {
        let (ledger, alice, bob, chan) = setup();
        let state = countersigned(&bob, chan, 5, 6, 1);
        assert!(close_with(&ledger, &alice, chan, &state).is_err());
    }

    #[test]
    fn close_rejects_non_participant_caller() {
        let (ledger, _alice, bob, chan) = setup();
        let charlie = Signer::new(&SK_CHARLIE).unwrap();
        ledger.fund(charlie.address(), eth(1));
        let state = countersigned(&bob, chan, 9, 1, 1);
        assert!(close_with(&ledger, &charlie, chan, &state).is_err());
    }

    #[test]
    fn unsigned_close_must_carry_initial_split() {
        let (ledger, alice, _bob, chan) = setup();
        let skewed = ChannelStateMessage::unsigned(chan, eth(5), eth(5), 0);
        assert!(close_with(&ledger, &alice, chan, &skewed).is_err());

        let initial = ChannelStateMessage::initial(chan, eth(10));
        assert!(close_with(&ledger, &alice, chan, &initial).unwrap().success);
    }

    #[test]
    fn double_close_reverts_without_mining() {
        let (ledger, alice, bob, chan) = setup();
        let state = countersigned(&bob, chan, 9, 1, 1);
        close_with(&ledger, &alice, chan, &state).unwrap();

        ledger.start_tx_count();
        assert!(close_with(&ledger, &alice, chan, &state).is_err());
        assert_eq!(ledger.tx_count(), 0);
    }

    #[test]
    fn appeal_rejects_non_increasing_serial() {
        let (ledger, alice, bob, chan) = setup();
        close_with(&ledger, &alice, chan, &countersigned(&bob, chan, 8, 2, 2)).unwrap();

        let stale = countersigned(&alice, chan, 9, 1, 2);
        let err = ledger
            .transact(
                chan,
                &bob,
                ArbiterCall::AppealClosure {
                    balance1: stale.balance1,
                    balance2: stale.balance2,
                    serial: stale.serial,
                    sig: stale.sig,
                },
                U256::zero(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[test]
    fn appeal_rejects_after_window() {
        let (ledger, alice, bob, chan) = setup();
        close_with(&ledger, &alice, chan, &countersigned(&bob, chan, 9, 1, 1)).unwrap();
        ledger.mine(PERIOD + 1);

        let newer = countersigned(&alice, chan, 8, 2, 2);
        assert!(ledger
            .transact(
                chan,
                &bob,
                ArbiterCall::AppealClosure {
                    balance1: newer.balance1,
                    balance2: newer.balance2,
                    serial: newer.serial,
                    sig: newer.sig,
                },
                U256::zero(),
            )
            .is_err());
    }

    #[test]
    fn appeal_overwrites_recorded_state() {
        let (ledger, alice, bob, chan) = setup();
        close_with(&ledger, &alice, chan, &countersigned(&bob, chan, 9, 1, 1)).unwrap();
        ledger.mine(1);

        let newer = countersigned(&alice, chan, 7, 3, 3);
        assert!(ledger
            .transact(
                chan,
                &bob,
                ArbiterCall::AppealClosure {
                    balance1: newer.balance1,
                    balance2: newer.balance2,
                    serial: newer.serial,
                    sig: newer.sig,
                },
                U256::zero(),
            )
            .unwrap()
            .success);

        let serial = ledger
            .call(chan, bob.address(), ArbiterQuery::CurrentSerialNum)
            .unwrap();
        assert_eq!(serial, QueryValue::Uint(U256::from(3u64)));
    }

    #[test]
    fn get_balance_reverts_before_window_elapses() {
        let (ledger, alice, _bob, chan) = setup();
        close_with(&ledger, &alice, chan, &ChannelStateMessage::initial(chan, eth(10))).unwrap();

        let err = ledger
            .call(chan, alice.address(), ArbiterQuery::GetBalance)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[test]
    fn withdraw_pays_once() {
        let (ledger, alice, bob, chan) = setup();
        close_with(&ledger, &alice, chan, &countersigned(&bob, chan, 9, 1, 1)).unwrap();
        ledger.mine(PERIOD + 1);

        ledger
            .transact(
                chan,
                &alice,
                ArbiterCall::WithdrawFunds {
                    to: alice.address(),
                },
                U256::zero(),
            )
            .unwrap();
        assert_eq!(ledger.balance(alice.address()), eth(99));
        assert_eq!(ledger.balance(chan), eth(1));

        // The recorded balance is zeroed; a second withdraw reverts.
        assert!(ledger
            .transact(
                chan,
                &alice,
                ArbiterCall::WithdrawFunds {
                    to: alice.address(),
                },
                U256::zero(),
            )
            .is_err());
    }
}
