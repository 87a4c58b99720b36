use tfidx_primitives::{BlockNumber, NodeId};


// All keys are big-endian so that rocksdb iteration order equals
// logical (node, height, index) order.


pub fn node_key(node_id: NodeId) -> [u8; 4] {
    node_id.to_be_bytes()
}


pub fn node_prefix(node_id: NodeId) -> [u8; 4] {
    node_id.to_be_bytes()
}


pub fn event_key(node_id: NodeId, height: BlockNumber, index: u32) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..4].copy_from_slice(&node_id.to_be_bytes());
    key[4..12].copy_from_slice(&height.to_be_bytes());
    key[12..16].copy_from_slice(&index.to_be_bytes());
    key
}


pub fn height_key(height: BlockNumber) -> [u8; 8] {
    height.to_be_bytes()
}


pub fn decode_height_key(key: &[u8]) -> Option<BlockNumber> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(BlockNumber::from_be_bytes(bytes))
}
