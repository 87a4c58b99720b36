use crate::types::{BlockNumber, Timestamp};


/// Timestamp of the start of the first minting period.
pub const FIRST_PERIOD_START_TIMESTAMP: Timestamp = 1_522_501_000;

/// Duration of a standard minting period in seconds. Chosen by the
/// chain so that there are exactly 12 periods per year, averaged over
/// the leap cycle.
pub const STANDARD_PERIOD_DURATION: Timestamp = 24 * 60 * 60 * (365 * 3 + 366 * 2) / 60;


/// On-chain constants the period calculator and the scanner need.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ChainConstants {
    /// Height at which period accounting starts.
    pub epoch_anchor: BlockNumber,
    /// Period length in blocks.
    pub period_length: u64,
    /// Target block production interval in seconds.
    pub block_time_secs: u64
}


/// A fixed-length range of block heights over which incentive payouts
/// are calculated. Bounds are inclusive.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MintingPeriod {
    pub period_id: u64,
    pub start_height: BlockNumber,
    pub end_height: BlockNumber
}


impl MintingPeriod {
    /// The period containing `height`. Heights below the epoch anchor
    /// are clamped into period 0.
    pub fn containing(constants: &ChainConstants, height: BlockNumber) -> Self {
        let period_id = height.saturating_sub(constants.epoch_anchor) / constants.period_length;
        let start_height = constants.epoch_anchor + period_id * constants.period_length;
        Self {
            period_id,
            start_height,
            end_height: start_height + constants.period_length - 1
        }
    }

    pub fn contains(&self, height: BlockNumber) -> bool {
        self.start_height <= height && height <= self.end_height
    }
}


/// The wall-clock rendition of a minting period, used to resolve the
/// default backfill start against the chain head.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimePeriod {
    pub offset: i64,
    pub start: Timestamp,
    pub end: Timestamp
}


impl TimePeriod {
    pub fn containing(timestamp: Timestamp) -> Self {
        let offset = (timestamp - FIRST_PERIOD_START_TIMESTAMP).div_euclid(STANDARD_PERIOD_DURATION);
        Self::at_offset(offset)
    }

    pub fn at_offset(offset: i64) -> Self {
        let start = FIRST_PERIOD_START_TIMESTAMP + STANDARD_PERIOD_DURATION * offset;
        Self {
            offset,
            start,
            end: start + STANDARD_PERIOD_DURATION
        }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}
