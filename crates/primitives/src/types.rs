use std::fmt::{Display, Formatter};


pub type BlockNumber = u64;
pub type NodeId = u32;
pub type Timestamp = i64;


#[derive(Debug, Default, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct BlockRef {
    pub number: BlockNumber,
    pub hash: String
}


impl Display for BlockRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.number, self.hash)
    }
}


/// Reported Up/Down status of a node.
///
/// A node that never emitted a power event is considered `Up` -
/// that is the default the chain assigns on registration.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum PowerState {
    #[default]
    Up,
    Down
}


impl Display for PowerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Up => write!(f, "Up"),
            PowerState::Down => write!(f, "Down")
        }
    }
}


/// Desired power state requested for a node by its controller.
///
/// `Unset` is the sentinel for nodes that never received a target;
/// it only ever appears as the `previous_target` of a node's first
/// power-target event.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[derive(borsh::BorshSerialize, borsh::BorshDeserialize)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum PowerTarget {
    #[default]
    Unset,
    Up,
    Down
}


impl Display for PowerTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerTarget::Unset => write!(f, "Unset"),
            PowerTarget::Up => write!(f, "Up"),
            PowerTarget::Down => write!(f, "Down")
        }
    }
}
