use crate::types::{BlockNumber, NodeId, PowerState, PowerTarget, Timestamp};


/// Periodic on-chain report of a node's accumulated online time.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct UptimeEvent {
    pub node_id: NodeId,
    pub block_height: BlockNumber,
    pub block_timestamp: Timestamp,
    pub uptime_secs: u64,
    /// The timestamp the node itself attached to the report.
    /// Normally equals `block_timestamp`.
    pub timestamp_hint: Timestamp
}


#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PowerStateEvent {
    pub node_id: NodeId,
    pub block_height: BlockNumber,
    pub block_timestamp: Timestamp,
    pub previous_state: PowerState,
    pub new_state: PowerState,
    /// Height at which the node powered down, as reported by the chain
    /// alongside a `Down` state.
    pub down_at: Option<BlockNumber>
}


#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PowerTargetEvent {
    pub node_id: NodeId,
    pub block_height: BlockNumber,
    pub block_timestamp: Timestamp,
    pub previous_target: PowerTarget,
    pub new_target: PowerTarget
}


/// A power-state transition as it appears on chain, before the
/// `previous_state` is resolved against the node table.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PowerStateChange {
    pub node_id: NodeId,
    pub new_state: PowerState,
    pub down_at: Option<BlockNumber>
}


#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PowerTargetChange {
    pub node_id: NodeId,
    pub new_target: PowerTarget
}


#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct UptimeReport {
    pub node_id: NodeId,
    pub uptime_secs: u64,
    pub timestamp_hint: Timestamp
}


/// Everything extracted from a single block, in on-chain event order.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct BlockEvents {
    pub uptime: Vec<UptimeReport>,
    pub power_state: Vec<PowerStateChange>,
    pub power_target: Vec<PowerTargetChange>
}


impl BlockEvents {
    pub fn is_empty(&self) -> bool {
        self.uptime.is_empty() && self.power_state.is_empty() && self.power_target.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uptime.len() + self.power_state.len() + self.power_target.len()
    }
}


/// Last-known state of a node, derived from its event log.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub state: PowerState,
    pub target: PowerTarget,
    pub updated_at_height: BlockNumber
}


impl NodeRecord {
    pub fn initial(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: PowerState::Up,
            target: PowerTarget::Unset,
            updated_at_height: 0
        }
    }
}


#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ProcessedBlock {
    pub height: BlockNumber,
    pub block_hash: String,
    pub processed_at: Timestamp,
    /// Set when event extraction failed and the block was recorded
    /// without its rows so that indexing could advance.
    pub anomalous: bool
}
