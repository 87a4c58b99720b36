use tfidx_primitives::{BlockNumber, Timestamp};


/// One block as delivered by the chain endpoint.
///
/// Event attributes are kept as opaque JSON here; they are validated
/// and converted into typed events at the extractor boundary.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RawBlock {
    pub height: BlockNumber,
    pub hash: String,
    pub parent_hash: String,
    /// Block timestamp in milliseconds, as the chain reports it.
    pub timestamp_ms: Timestamp,
    pub events: Vec<RawEvent>
}


impl RawBlock {
    /// Block timestamp in whole seconds. All stored timestamps use
    /// second precision.
    pub fn timestamp_secs(&self) -> Timestamp {
        self.timestamp_ms / 1000
    }
}


#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RawEvent {
    pub event_id: String,
    pub attributes: serde_json::Value
}
