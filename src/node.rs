//! The off-chain protocol engine: one [Node] per participant.
//!
//! A node keeps a registry of channels, exchanges signed balance updates with
//! peers over the message bus, and falls back to the on-chain arbiter to
//! close, appeal and withdraw. The acceptance rules in the inbound handlers
//! are what keep the channel safe against an adversarial peer: a monotonic
//! serial number, a never-decreasing own balance, the deposit-sum check, and
//! a valid counterparty signature. Relaxing any of them lets the peer steal
//! funds.
//!
//! Everything here is single-threaded cooperative: handlers run to
//! completion, and the registry borrow is released before any outbound
//! dispatch because the synchronous bus re-enters the sender (`send` →
//! `receive_funds` → `ack_transfer` is one call chain). A port to a real
//! network must keep operations on a single channel linearizable (one mutex
//! per record, or an actor).

use crate::error::{Error, Result};
use crate::ledger::{Arbiter, ArbiterCtor, ContractCode, LedgerError, LedgerGateway};
use crate::registry::{ChannelRecord, ChannelRegistry};
use crate::sig::Signer;
use crate::state::{self, ChannelStateMessage};
use crate::types::{Address, ChannelId, U256};
use crate::wire::{Message, MessageBus, MessageHandler, NetAddr};
use std::cell::RefCell;
use tracing::{debug, info};

/// Appeal window length in blocks: the constructor argument passed to the
/// arbiter on deployment, and the floor below which a responder refuses to
/// adopt a channel it is notified of.
pub const APPEAL_PERIOD: u64 = 5;

/// A payment-channel node. Holds the signing key, talks to peers through `B`
/// and to the ledger through `L`.
pub struct Node<B: MessageBus, L: LedgerGateway> {
    signer: Signer,
    net: NetAddr,
    bus: B,
    ledger: L,
    code: ContractCode,
    channels: RefCell<ChannelRegistry>,
}

impl<B: MessageBus, L: LedgerGateway> Node<B, L> {
    pub fn new(signer: Signer, bus: B, net: NetAddr, ledger: L, code: ContractCode) -> Self {
        Self {
            signer,
            net,
            bus,
            ledger,
            code,
            channels: RefCell::new(ChannelRegistry::new()),
        }
    }

    /// The node's on-ledger identity, derived from its key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Where this node is reachable on the message bus.
    pub fn net_addr(&self) -> &NetAddr {
        &self.net
    }

    /// All channels this node still tracks: open ones, and closed ones that
    /// may still hold its money. The returned list is an independent copy.
    pub fn get_list_of_channels(&self) -> Vec<ChannelId> {
        self.channels.borrow().ids()
    }

    /// Opens a channel to `peer_addr`, funding it with `amount` from this
    /// node's account, and notifies the peer at `peer_net`. Returns the
    /// arbiter contract address, which identifies the channel from here on.
    pub fn establish_channel(
        &self,
        peer_addr: Address,
        peer_net: NetAddr,
        amount: U256,
    ) -> Result<ChannelId> {
        if amount.is_zero() {
            return Err(Error::BadArgument("amount must be positive"));
        }
        let available = self.ledger.balance(self.address());
        if available < amount {
            return Err(Error::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let channel = self.ledger.deploy(
            &self.code,
            &self.signer,
            ArbiterCtor {
                other_party: peer_addr,
                appeal_period: APPEAL_PERIOD,
            },
            amount,
        )?;

        self.channels.borrow_mut().insert(ChannelRecord {
            id: channel,
            peer_addr,
            peer_net: peer_net.clone(),
            total_deposit: amount,
            is_party_one: true,
            local_balance1: amount,
            local_balance2: U256::zero(),
            local_serial: 0,
            last_countersigned: None,
            closed: false,
        });
        info!(?channel, ?peer_addr, deposit = %amount, "channel established");

        // A dropped notification is survivable: the channel exists on-chain
        // and the peer can still adopt it from a later notification.
        if !self.bus.send_message(
            &peer_net,
            Message::NotifyChannel {
                channel,
                sender_net: self.net.clone(),
            },
        ) {
            debug!(?channel, "channel notification dropped");
        }

        Ok(channel)
    }

    /// Transfers `amount` to the peer inside the channel. Pure off-chain: no
    /// ledger traffic, ever.
    ///
    /// The local balances move before the peer acknowledges, which stops the
    /// node from re-spending the same funds while the ack is in flight. If
    /// the ack never arrives the node is left holding an older countersigned
    /// state whose split favors it strictly more than the unacked one, so
    /// closing with it is safe.
    pub fn send(&self, channel: ChannelId, amount: U256) -> Result<()> {
        let (msg, peer_net) = {
            let mut channels = self.channels.borrow_mut();
            let rec = channels
                .get_mut(channel)
                .ok_or(Error::UnknownChannel(channel))?;
            if rec.closed {
                return Err(Error::AlreadyClosed(channel));
            }
            if amount.is_zero() {
                return Err(Error::BadArgument("amount must be positive"));
            }
            let own = rec.own_balance();
            if own < amount {
                return Err(Error::InsufficientFunds {
                    available: own,
                    required: amount,
                });
            }

            let (balance1, balance2) = if rec.is_party_one {
                (rec.local_balance1 - amount, rec.local_balance2 + amount)
            } else {
                (rec.local_balance1 + amount, rec.local_balance2 - amount)
            };
            let serial = rec.local_serial + 1;
            let msg = state::sign(
                &self.signer,
                &ChannelStateMessage::unsigned(channel, balance1, balance2, serial),
            );

            rec.local_balance1 = balance1;
            rec.local_balance2 = balance2;
            rec.local_serial = serial;
            // last_countersigned advances only when the peer's ack arrives.
            (msg, rec.peer_net.clone())
        };

        debug!(?channel, serial = msg.serial, amount = %amount, "transfer signed and dispatched");
        self.bus.send_message(&peer_net, Message::SendState(msg));
        Ok(())
    }

    /// The latest state countersigned by the peer, or the initial-state
    /// placeholder if no transfer has completed yet.
    pub fn get_current_channel_state(&self, channel: ChannelId) -> Result<ChannelStateMessage> {
        let channels = self.channels.borrow();
        let rec = channels.get(channel).ok_or(Error::UnknownChannel(channel))?;
        Ok(rec
            .last_countersigned
            .unwrap_or_else(|| ChannelStateMessage::initial(channel, rec.total_deposit)))
    }

    /// Unilaterally closes the channel on-chain, starting the appeal window.
    ///
    /// Uses `state_override` verbatim when supplied (a cheater's tool and a
    /// test hook), otherwise the current countersigned state. The peer is
    /// *not* notified; discovering the closure is the peer's job via
    /// [Self::appeal_closed_chan]. Returns the receipt's success flag.
    pub fn close_channel(
        &self,
        channel: ChannelId,
        state_override: Option<ChannelStateMessage>,
    ) -> Result<bool> {
        let closing_state = {
            let channels = self.channels.borrow();
            let rec = channels.get(channel).ok_or(Error::UnknownChannel(channel))?;
            if rec.closed {
                return Err(Error::AlreadyClosed(channel));
            }
            match state_override {
                Some(s) => s,
                None => rec
                    .last_countersigned
                    .unwrap_or_else(|| ChannelStateMessage::initial(channel, rec.total_deposit)),
            }
        };

        let receipt = Arbiter::new(&self.ledger, channel, self.address())
            .one_sided_close(&self.signer, &closing_state)?;

        // Mined at all means the closure flow has begun, whatever the status
        // bit says.
        if let Some(rec) = self.channels.borrow_mut().get_mut(channel) {
            rec.closed = true;
        }
        info!(?channel, serial = closing_state.serial, success = receipt.success, "unilateral close submitted");
        Ok(receipt.success)
    }

    /// Checks whether the channel was closed on-chain with a stale state
    /// and, if this node holds a newer countersigned state, submits it as an
    /// appeal. Returns `Ok(true)` only if an appeal transaction was mined.
    ///
    /// Meant to be called from a loop that watches the ledger.
    pub fn appeal_closed_chan(&self, channel: ChannelId) -> Result<bool> {
        let held = {
            let channels = self.channels.borrow();
            match channels.get(channel) {
                Some(rec) => rec.last_countersigned,
                None => return Ok(false),
            }
        };

        let arbiter = Arbiter::new(&self.ledger, channel, self.address());
        match arbiter.channel_closed() {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(err) => {
                debug!(?channel, %err, "arbiter not readable, no appeal");
                return Ok(false);
            }
        }

        // The arbiter says closed; reconcile the local view.
        if let Some(rec) = self.channels.borrow_mut().get_mut(channel) {
            if !rec.closed {
                info!(?channel, "learned of on-chain closure");
                rec.closed = true;
            }
        }

        let held = match held {
            Some(s) => s,
            None => return Ok(false),
        };
        let on_chain = arbiter.current_serial()?;
        if held.serial <= on_chain {
            return Ok(false);
        }

        let receipt = arbiter.appeal_closure(&self.signer, &held)?;
        info!(?channel, serial = held.serial, success = receipt.success, "appealed stale closure");
        Ok(receipt.success)
    }

    /// Claims this node's share after the appeal window. A zero share emits
    /// no transaction. On success the channel is forgotten; the withdrawn
    /// amount is returned.
    pub fn withdraw_funds(&self, channel: ChannelId) -> Result<U256> {
        if !self.channels.borrow().contains(channel) {
            return Err(Error::UnknownChannel(channel));
        }

        let arbiter = Arbiter::new(&self.ledger, channel, self.address());
        let amount = match arbiter.get_balance() {
            Ok(v) => v,
            Err(LedgerError::Reverted(_)) => return Err(Error::CannotWithdrawYet(channel)),
            Err(err) => return Err(err.into()),
        };

        if !amount.is_zero() {
            arbiter.withdraw_funds(&self.signer, self.address())?;
        }

        self.channels.borrow_mut().remove(channel);
        info!(?channel, amount = %amount, "funds withdrawn, channel forgotten");
        Ok(amount)
    }
}

impl<B: MessageBus, L: LedgerGateway> MessageHandler for Node<B, L> {
    /// A peer claims to have opened a channel naming this node. Everything
    /// except the peer's network address is verified against the arbiter;
    /// the payload is not trusted for identities.
    fn notify_of_channel(&self, channel: ChannelId, sender_net: NetAddr) {
        if self.channels.borrow().contains(channel) {
            debug!(?channel, "notify for known channel ignored");
            return;
        }

        let arbiter = Arbiter::new(&self.ledger, channel, self.address());
        type Views = (Address, Address, bool, u64, U256);
        let views = (|| -> core::result::Result<Views, LedgerError> {
            Ok((
                arbiter.party1()?,
                arbiter.party2()?,
                arbiter.channel_closed()?,
                arbiter.appeal_period_len()?,
                arbiter.total_deposit()?,
            ))
        })();
        let (party1, party2, closed, period, total) = match views {
            Ok(v) => v,
            Err(err) => {
                debug!(?channel, %err, "arbiter not readable, notify dropped");
                return;
            }
        };

        let own = self.address();
        if own != party1 && own != party2 {
            debug!(?channel, "not a party of this channel, notify dropped");
            return;
        }
        if closed {
            debug!(?channel, "channel already closed, notify dropped");
            return;
        }
        if period < APPEAL_PERIOD {
            debug!(?channel, period, "appeal period below safety floor, notify dropped");
            return;
        }

        let is_party_one = own == party1;
        let peer_addr = if is_party_one { party2 } else { party1 };
        self.channels.borrow_mut().insert(ChannelRecord {
            id: channel,
            peer_addr,
            peer_net: sender_net,
            total_deposit: total,
            is_party_one,
            local_balance1: total,
            local_balance2: U256::zero(),
            local_serial: 0,
            last_countersigned: None,
            closed: false,
        });
        info!(?channel, ?peer_addr, "channel adopted from notification");
    }

    /// An incoming transfer: a state claimed to be signed by the peer. If it
    /// withstands every check the node adopts it and echoes it back signed
    /// by itself; otherwise it is dropped without a reply.
    fn receive_funds(&self, msg: ChannelStateMessage) {
        let (ack, peer_net) = {
            let mut channels = self.channels.borrow_mut();
            let rec = match channels.get_mut(msg.channel) {
                Some(r) => r,
                None => {
                    debug!(channel = ?msg.channel, "state for unknown channel dropped");
                    return;
                }
            };
            if !state::verify(&msg, rec.peer_addr) {
                debug!(channel = ?msg.channel, "state with bad signature dropped");
                return;
            }
            if msg.serial <= rec.local_serial {
                debug!(channel = ?msg.channel, serial = msg.serial, "stale serial dropped");
                return;
            }
            if msg.balance1.checked_add(msg.balance2) != Some(rec.total_deposit) {
                debug!(channel = ?msg.channel, "balances do not sum to deposit, dropped");
                return;
            }
            if rec.own_balance_in(&msg) < rec.own_balance() {
                debug!(channel = ?msg.channel, "own balance would shrink, dropped");
                return;
            }

            rec.local_balance1 = msg.balance1;
            rec.local_balance2 = msg.balance2;
            rec.local_serial = msg.serial;
            rec.last_countersigned = Some(msg);

            let ack = state::sign(
                &self.signer,
                &ChannelStateMessage::unsigned(msg.channel, msg.balance1, msg.balance2, msg.serial),
            );
            (ack, rec.peer_net.clone())
        };

        debug!(channel = ?msg.channel, serial = msg.serial, "transfer accepted, acking");
        self.bus.send_message(&peer_net, Message::AckState(ack));
    }

    /// The counter-signed echo of an earlier `send`. The sole path by which
    /// this node's countersigned state advances after sending. Accepts any
    /// properly signed state with a serial at least as new that does not
    /// shrink this node's balance.
    fn ack_transfer(&self, msg: ChannelStateMessage) {
        let mut channels = self.channels.borrow_mut();
        let rec = match channels.get_mut(msg.channel) {
            Some(r) => r,
            None => {
                debug!(channel = ?msg.channel, "ack for unknown channel dropped");
                return;
            }
        };
        if !state::verify(&msg, rec.peer_addr) {
            debug!(channel = ?msg.channel, "ack with bad signature dropped");
            return;
        }
        if msg.serial < rec.local_serial {
            debug!(channel = ?msg.channel, serial = msg.serial, "stale ack dropped");
            return;
        }
        if msg.balance1.checked_add(msg.balance2) != Some(rec.total_deposit) {
            debug!(channel = ?msg.channel, "ack balances do not sum to deposit, dropped");
            return;
        }
        if rec.own_balance_in(&msg) < rec.own_balance() {
            debug!(channel = ?msg.channel, "ack would shrink own balance, dropped");
            return;
        }

        rec.last_countersigned = Some(msg);
        debug!(channel = ?msg.channel, serial = msg.serial, "countersigned state stored");
    }
}
