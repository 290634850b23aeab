//! Per-node channel bookkeeping.

use crate::state::ChannelStateMessage;
use crate::types::{Address, ChannelId, U256};
use crate::wire::NetAddr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything a node tracks about one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Address of the arbiter contract.
    pub id: ChannelId,
    /// The counterparty's on-ledger identity, taken from the arbiter.
    pub peer_addr: Address,
    /// Where the counterparty is reachable.
    pub peer_net: NetAddr,
    pub total_deposit: U256,
    /// Whether this node owns `balance1` (it created the channel).
    pub is_party_one: bool,
    /// Optimistic local view, updated on `send` before the peer acks. If an
    /// ack is lost this view runs ahead of [Self::last_countersigned]; it
    /// only rate-limits further sends, safety decisions use the
    /// countersigned state.
    pub local_balance1: U256,
    pub local_balance2: U256,
    pub local_serial: u64,
    /// Most recent state signed by the peer that this node accepted: the
    /// only state safe to close with, and the weapon in an appeal.
    pub last_countersigned: Option<ChannelStateMessage>,
    /// Local belief that the channel entered the on-chain closure flow.
    pub closed: bool,
}

impl ChannelRecord {
    /// This node's balance in the local optimistic view.
    pub fn own_balance(&self) -> U256 {
        if self.is_party_one {
            self.local_balance1
        } else {
            self.local_balance2
        }
    }

    /// This node's balance as claimed by `msg`.
    pub fn own_balance_in(&self, msg: &ChannelStateMessage) -> U256 {
        if self.is_party_one {
            msg.balance1
        } else {
            msg.balance2
        }
    }
}

/// Mapping `ChannelId -> ChannelRecord`.
///
/// The registry owns all records. Nothing hands out a live view into the
/// map: enumeration copies the key set, so a caller cannot mutate channel
/// state except through the engine.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, ChannelRecord>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelRecord> {
        self.channels.get(&id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelRecord> {
        self.channels.get_mut(&id)
    }

    pub fn insert(&mut self, record: ChannelRecord) {
        self.channels.insert(record.id, record);
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<ChannelRecord> {
        self.channels.remove(&id)
    }

    /// A fresh copy of the key set.
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn record(rng: &mut StdRng) -> ChannelRecord {
        let deposit = U256::from(10u64);
        ChannelRecord {
            id: rng.gen(),
            peer_addr: rng.gen(),
            peer_net: NetAddr::from("peer"),
            total_deposit: deposit,
            is_party_one: true,
            local_balance1: deposit,
            local_balance2: U256::zero(),
            local_serial: 0,
            last_countersigned: None,
            closed: false,
        }
    }

    #[test]
    fn ids_returns_an_independent_copy() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = ChannelRegistry::new();
        registry.insert(record(&mut rng));

        let mut ids = registry.ids();
        assert_eq!(ids.len(), 1);
        ids.clear();
        assert_eq!(registry.ids().len(), 1);
    }

    #[test]
    fn own_balance_follows_role() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut rec = record(&mut rng);
        rec.local_balance1 = U256::from(7u64);
        rec.local_balance2 = U256::from(3u64);

        assert_eq!(rec.own_balance(), U256::from(7u64));
        rec.is_party_one = false;
        assert_eq!(rec.own_balance(), U256::from(3u64));

        let msg = ChannelStateMessage::unsigned(rec.id, U256::from(6u64), U256::from(4u64), 1);
        assert_eq!(rec.own_balance_in(&msg), U256::from(4u64));
    }

    #[test]
    fn remove_forgets_the_channel() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut registry = ChannelRegistry::new();
        let rec = record(&mut rng);
        let id = rec.id;
        registry.insert(rec);

        assert!(registry.contains(id));
        assert!(registry.remove(id).is_some());
        assert!(!registry.contains(id));
        assert!(registry.remove(id).is_none());
    }
}
