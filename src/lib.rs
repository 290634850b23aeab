//! Off-chain client for two-party bidirectional payment channels backed by an
//! on-chain arbiter contract.
//!
//! Two participants lock a deposit in a per-channel arbiter contract, then
//! move money between each other by exchanging signed balance updates off the
//! ledger, at no settlement cost. Either side can close unilaterally with the
//! newest state it holds; the counterparty then has a bounded appeal window
//! to override a stale closure with a newer countersigned state, after which
//! both withdraw their shares.
//!
//! The crate is the node-side protocol engine: state hashing and signing
//! ([state]), the adversarial acceptance rules and channel lifecycle
//! ([Node]), the registry of channel records ([registry]), and the seams to
//! the outside world — a typed message bus to peers ([wire]) and a ledger
//! gateway to the chain ([ledger]). The on-chain arbiter itself is external;
//! [ledger::MemoryLedger] implements its semantics in-process for tests and
//! simulations.
//!
//! # Example
//!
//! ```
//! use paychan::ledger::{ContractCode, LedgerGateway, MemoryLedger};
//! use paychan::sig::Signer;
//! use paychan::wire::{LocalBus, MessageHandler, NetAddr};
//! use paychan::{Node, U256, APPEAL_PERIOD};
//! use std::rc::Rc;
//!
//! let bus = Rc::new(LocalBus::new());
//! let ledger = Rc::new(MemoryLedger::new());
//!
//! let alice = Rc::new(Node::new(
//!     Signer::new(&[0x11; 32]).unwrap(),
//!     Rc::clone(&bus),
//!     NetAddr::from("alice"),
//!     Rc::clone(&ledger),
//!     ContractCode::default(),
//! ));
//! let bob = Rc::new(Node::new(
//!     Signer::new(&[0x22; 32]).unwrap(),
//!     Rc::clone(&bus),
//!     NetAddr::from("bob"),
//!     Rc::clone(&ledger),
//!     ContractCode::default(),
//! ));
//! bus.register(NetAddr::from("alice"), Rc::clone(&alice) as Rc<dyn MessageHandler>);
//! bus.register(NetAddr::from("bob"), Rc::clone(&bob) as Rc<dyn MessageHandler>);
//! ledger.fund(alice.address(), U256::exp10(18));
//!
//! // Fund a channel, pay off-chain, settle on-chain.
//! let chan = alice
//!     .establish_channel(bob.address(), NetAddr::from("bob"), U256::exp10(18))
//!     .unwrap();
//! alice.send(chan, U256::exp10(17)).unwrap();
//! assert_eq!(bob.get_current_channel_state(chan).unwrap().serial, 1);
//!
//! alice.close_channel(chan, None).unwrap();
//! ledger.mine(APPEAL_PERIOD + 1);
//! assert_eq!(bob.withdraw_funds(chan).unwrap(), U256::exp10(17));
//! ```

pub mod ledger;
pub mod registry;
pub mod sig;
pub mod state;
pub mod types;
pub mod wire;

mod error;
mod node;

pub use error::{Error, Result};
pub use node::{Node, APPEAL_PERIOD};
pub use state::ChannelStateMessage;
pub use types::{Address, ChannelId, Hash, Signature, U256};
