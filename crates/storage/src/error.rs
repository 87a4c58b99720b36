use std::fmt::{Display, Formatter};

use tfidx_primitives::BlockNumber;


/// Progress-ledger violation. Always fatal: the process aborts rather
/// than silently repairing, since it indicates a logic bug or external
/// corruption of the store.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConsistencyError {
    OutOfOrderCommit {
        expected: BlockNumber,
        got: BlockNumber
    },
    ProgressGap {
        missing: BlockNumber
    }
}


impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyError::OutOfOrderCommit { expected, got } => write!(
                f,
                "out-of-order commit: expected block {}, got {}",
                expected, got
            ),
            ConsistencyError::ProgressGap { missing } => write!(
                f,
                "processed-blocks ledger has a gap: block {} is missing",
                missing
            )
        }
    }
}


impl std::error::Error for ConsistencyError {}
