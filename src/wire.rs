//! Typed message bus between channel nodes.
//!
//! The bus carries no authentication: a state message proves itself through
//! the signature it carries, so the transport may lie about sender identity
//! without compromising safety. Delivery in the reference [LocalBus] is
//! synchronous — `send_message` returns only after the destination handler
//! ran — which makes a transfer a strict request/response chain.

use crate::state::ChannelStateMessage;
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Opaque network address of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddr(pub String);

impl From<&str> for NetAddr {
    fn from(s: &str) -> Self {
        NetAddr(s.to_owned())
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages delivered between nodes. Payload order is fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// "I deployed a channel contract naming you" — reachable back at
    /// `sender_net`. The receiver verifies everything else on-chain.
    NotifyChannel {
        channel: ChannelId,
        sender_net: NetAddr,
    },
    /// A balance update signed by the sending party.
    SendState(ChannelStateMessage),
    /// The same tuple, re-signed by the receiving party.
    AckState(ChannelStateMessage),
}

/// Outbound half of the transport.
pub trait MessageBus {
    /// Delivers `msg` to the node at `dst`. Returns `false` if the message
    /// was dropped (unknown destination, or the bus is paused).
    fn send_message(&self, dst: &NetAddr, msg: Message) -> bool;
}

impl<B: MessageBus> MessageBus for Rc<B> {
    fn send_message(&self, dst: &NetAddr, msg: Message) -> bool {
        (**self).send_message(dst, msg)
    }
}

/// Inbound half of the transport: the three handlers a node exposes. Any of
/// them may be fed garbage by a malicious peer and must not panic or error,
/// only drop.
pub trait MessageHandler {
    fn notify_of_channel(&self, channel: ChannelId, sender_net: NetAddr);
    fn receive_funds(&self, msg: ChannelStateMessage);
    fn ack_transfer(&self, msg: ChannelStateMessage);
}

/// Synchronous in-process broker: the reference transport.
///
/// `pause` makes every send silently return `false`, which is how tests
/// exercise tolerance to a lossy network.
#[derive(Default)]
pub struct LocalBus {
    handlers: RefCell<HashMap<NetAddr, Rc<dyn MessageHandler>>>,
    paused: Cell<bool>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes future messages for `addr` to `handler`.
    pub fn register(&self, addr: NetAddr, handler: Rc<dyn MessageHandler>) {
        self.handlers.borrow_mut().insert(addr, handler);
    }

    /// Drops all messages until [Self::resume].
    pub fn pause(&self) {
        self.paused.set(true);
    }

    pub fn resume(&self) {
        self.paused.set(false);
    }
}

impl MessageBus for LocalBus {
    fn send_message(&self, dst: &NetAddr, msg: Message) -> bool {
        if self.paused.get() {
            debug!(%dst, "bus paused, message dropped");
            return false;
        }

        // Release the table borrow before dispatching: the handler may send
        // messages back through this bus (receive_funds acks synchronously).
        let handler = {
            let handlers = self.handlers.borrow();
            match handlers.get(dst) {
                Some(h) => Rc::clone(h),
                None => {
                    debug!(%dst, "no handler registered, message dropped");
                    return false;
                }
            }
        };

        match msg {
            Message::NotifyChannel {
                channel,
                sender_net,
            } => handler.notify_of_channel(channel, sender_net),
            Message::SendState(m) => handler.receive_funds(m),
            Message::AckState(m) => handler.ack_transfer(m),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    #[derive(Default)]
    struct Recorder {
        notified: Cell<usize>,
        received: Cell<usize>,
        acked: Cell<usize>,
    }

    impl MessageHandler for Recorder {
        fn notify_of_channel(&self, _channel: ChannelId, _sender_net: NetAddr) {
            self.notified.set(self.notified.get() + 1);
        }
        fn receive_funds(&self, _msg: ChannelStateMessage) {
            self.received.set(self.received.get() + 1);
        }
        fn ack_transfer(&self, _msg: ChannelStateMessage) {
            self.acked.set(self.acked.get() + 1);
        }
    }

    fn notify() -> Message {
        Message::NotifyChannel {
            channel: Address::default(),
            sender_net: NetAddr::from("sender"),
        }
    }

    #[test]
    fn delivers_to_registered_handler() {
        let bus = LocalBus::new();
        let handler = Rc::new(Recorder::default());
        bus.register(NetAddr::from("dst"), Rc::clone(&handler) as Rc<dyn MessageHandler>);

        assert!(bus.send_message(&NetAddr::from("dst"), notify()));
        assert_eq!(handler.notified.get(), 1);
    }

    #[test]
    fn unknown_destination_is_dropped() {
        let bus = LocalBus::new();
        assert!(!bus.send_message(&NetAddr::from("nobody"), notify()));
    }

    #[test]
    fn paused_bus_drops_and_resumes() {
        let bus = LocalBus::new();
        let handler = Rc::new(Recorder::default());
        bus.register(NetAddr::from("dst"), Rc::clone(&handler) as Rc<dyn MessageHandler>);

        bus.pause();
        assert!(!bus.send_message(&NetAddr::from("dst"), notify()));
        assert_eq!(handler.notified.get(), 0);

        bus.resume();
        assert!(bus.send_message(&NetAddr::from("dst"), notify()));
        assert_eq!(handler.notified.get(), 1);
    }
}
