use std::fmt::{Display, Formatter};

use serde::Deserialize;

use tfidx_chain_client::{RawBlock, RawEvent};
use tfidx_primitives::{
    BlockEvents, BlockNumber, NodeId, PowerState, PowerStateChange, PowerTarget,
    PowerTargetChange, Timestamp, UptimeReport
};


/// A recognized event whose attributes did not have the expected
/// shape. The block is then recorded as anomalous and skipped, so
/// that one bad block never stalls the pipeline.
#[derive(Debug)]
pub struct ExtractionError {
    pub event_index: usize,
    pub event_id: String,
    pub message: String
}


impl Display for ExtractionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed {} event at index {}: {}",
            self.event_id, self.event_index, self.message
        )
    }
}


impl std::error::Error for ExtractionError {}


// Attribute shapes as emitted by the chain. `PowerState` arrives
// either as the string "Up" or as {"Down": <height>}; unknown fields
// like farm_id are ignored.

#[derive(Deserialize)]
enum RawPowerState {
    Up,
    Down(BlockNumber)
}


#[derive(Deserialize)]
enum RawPowerTarget {
    Up,
    Down
}


#[derive(Deserialize)]
struct PowerStateAttrs {
    node_id: NodeId,
    power_state: RawPowerState
}


#[derive(Deserialize)]
struct PowerTargetAttrs {
    node_id: NodeId,
    power_target: RawPowerTarget
}


type UptimeAttrs = (NodeId, Timestamp, u64);


/// Maps one block's raw events into typed domain events.
///
/// Pure and deterministic: identical input always yields identical
/// output, which is what makes retries and post-crash re-application
/// safe. Events the indexer does not care about are ignored.
pub fn extract(block: &RawBlock) -> Result<BlockEvents, ExtractionError> {
    let mut events = BlockEvents::default();

    for (index, event) in block.events.iter().enumerate() {
        match event.event_id.as_str() {
            "NodeUptimeReported" => {
                let (node_id, timestamp_hint, uptime_secs): UptimeAttrs =
                    parse_attributes(index, event)?;
                events.uptime.push(UptimeReport {
                    node_id,
                    uptime_secs,
                    // unlike the block timestamp, the hint is reported
                    // in whole seconds already
                    timestamp_hint
                });
            },
            "PowerStateChanged" => {
                let attrs: PowerStateAttrs = parse_attributes(index, event)?;
                let (new_state, down_at) = match attrs.power_state {
                    RawPowerState::Up => (PowerState::Up, None),
                    RawPowerState::Down(height) => (PowerState::Down, Some(height))
                };
                events.power_state.push(PowerStateChange {
                    node_id: attrs.node_id,
                    new_state,
                    down_at
                });
            },
            "PowerTargetChanged" => {
                let attrs: PowerTargetAttrs = parse_attributes(index, event)?;
                let new_target = match attrs.power_target {
                    RawPowerTarget::Up => PowerTarget::Up,
                    RawPowerTarget::Down => PowerTarget::Down
                };
                events.power_target.push(PowerTargetChange {
                    node_id: attrs.node_id,
                    new_target
                });
            },
            _ => {}
        }
    }

    Ok(events)
}


fn parse_attributes<T: serde::de::DeserializeOwned>(
    index: usize,
    event: &RawEvent
) -> Result<T, ExtractionError> {
    serde_json::from_value(event.attributes.clone()).map_err(|err| ExtractionError {
        event_index: index,
        event_id: event.event_id.clone(),
        message: err.to_string()
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(events: Vec<RawEvent>) -> RawBlock {
        RawBlock {
            height: 100,
            hash: "0xaa".to_string(),
            parent_hash: "0xa9".to_string(),
            timestamp_ms: 1_700_000_000_000,
            events
        }
    }

    fn event(event_id: &str, attributes: serde_json::Value) -> RawEvent {
        RawEvent {
            event_id: event_id.to_string(),
            attributes
        }
    }

    #[test]
    fn extracts_uptime_report() {
        let block = block(vec![
            event("NodeUptimeReported", json!([42, 1_700_000_000i64, 86400]))
        ]);
        let events = extract(&block).unwrap();
        assert_eq!(events.uptime, vec![UptimeReport {
            node_id: 42,
            uptime_secs: 86400,
            timestamp_hint: 1_700_000_000
        }]);
        assert!(events.power_state.is_empty());
    }

    // the chain reports the hint in seconds while block timestamps are
    // in milliseconds; the hint must be stored untouched
    #[test]
    fn uptime_hint_is_not_rescaled() {
        let block = block(vec![
            event("NodeUptimeReported", json!([42, 1_700_000_000i64, 60]))
        ]);
        let events = extract(&block).unwrap();
        assert_eq!(events.uptime[0].timestamp_hint, block.timestamp_secs());
    }

    #[test]
    fn extracts_power_state_up_and_down() {
        let block = block(vec![
            event("PowerStateChanged", json!({
                "farm_id": 1,
                "node_id": 42,
                "power_state": {"Down": 95}
            })),
            event("PowerStateChanged", json!({
                "farm_id": 1,
                "node_id": 43,
                "power_state": "Up"
            }))
        ]);
        let events = extract(&block).unwrap();
        assert_eq!(events.power_state, vec![
            PowerStateChange { node_id: 42, new_state: PowerState::Down, down_at: Some(95) },
            PowerStateChange { node_id: 43, new_state: PowerState::Up, down_at: None }
        ]);
    }

    #[test]
    fn extracts_power_target() {
        let block = block(vec![
            event("PowerTargetChanged", json!({
                "farm_id": 7,
                "node_id": 9,
                "power_target": "Down"
            }))
        ]);
        let events = extract(&block).unwrap();
        assert_eq!(events.power_target, vec![
            PowerTargetChange { node_id: 9, new_target: PowerTarget::Down }
        ]);
    }

    #[test]
    fn ignores_unrelated_events() {
        let block = block(vec![
            event("Transfer", json!({"from": "a", "to": "b", "amount": 10})),
            event("NodeStored", json!([42]))
        ]);
        let events = extract(&block).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_recognized_event_is_an_error() {
        let block = block(vec![
            event("NodeUptimeReported", json!({"bogus": true}))
        ]);
        let err = extract(&block).unwrap_err();
        assert_eq!(err.event_index, 0);
        assert_eq!(err.event_id, "NodeUptimeReported");
    }

    #[test]
    fn extraction_is_deterministic() {
        let block = block(vec![
            event("NodeUptimeReported", json!([1, 1_700_000_000i64, 60])),
            event("PowerStateChanged", json!({
                "node_id": 1,
                "power_state": {"Down": 90}
            }))
        ]);
        assert_eq!(extract(&block).unwrap(), extract(&block).unwrap());
    }
}
