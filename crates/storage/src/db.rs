use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options as RocksOptions};

use tfidx_primitives::{
    BlockEvents, BlockNumber, NodeId, NodeRecord, PowerStateEvent, PowerTargetEvent,
    ProcessedBlock, Timestamp, UptimeEvent
};

use crate::error::ConsistencyError;
use crate::keys;
use crate::snapshot::ReadSnapshot;


pub(crate) const CF_NODES: &str = "NODES";
pub(crate) const CF_UPTIME_EVENTS: &str = "UPTIME_EVENTS";
pub(crate) const CF_POWER_STATE_EVENTS: &str = "POWER_STATE_EVENTS";
pub(crate) const CF_POWER_TARGET_EVENTS: &str = "POWER_TARGET_EVENTS";
pub(crate) const CF_PROCESSED_BLOCKS: &str = "PROCESSED_BLOCKS";

const ALL_CF: [&str; 5] = [
    CF_NODES,
    CF_UPTIME_EVENTS,
    CF_POWER_STATE_EVENTS,
    CF_POWER_TARGET_EVENTS,
    CF_PROCESSED_BLOCKS
];


pub(crate) type RocksDB = rocksdb::OptimisticTransactionDB;
pub(crate) type RocksTransaction<'a> = rocksdb::Transaction<'a, RocksDB>;
pub(crate) type RocksSnapshot<'a> = rocksdb::SnapshotWithThreadMode<'a, RocksDB>;


/// Embedded durable store holding nodes, event tables and indexing
/// progress.
///
/// All writes go through [`Database::commit_block`], one atomic
/// transaction per block, issued by a single logical writer. Readers
/// take [`ReadSnapshot`]s and never observe a partially written block.
pub struct Database {
    db: RocksDB,
    resume: Mutex<Option<BlockNumber>>
}


impl Database {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut options = RocksOptions::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let db = RocksDB::open_cf_descriptors(
            &options,
            path,
            ALL_CF.map(|name| ColumnFamilyDescriptor::new(name, RocksOptions::default()))
        )?;

        let database = Self {
            db,
            resume: Mutex::new(None)
        };

        let resume = database.read_top_height()?;
        *database.resume.lock() = resume;

        Ok(database)
    }

    /// Highest contiguously processed block height, or `None` for an
    /// empty store.
    pub fn resume_height(&self) -> Option<BlockNumber> {
        *self.resume.lock()
    }

    /// Walks the whole processed-blocks ledger and fails on any hole.
    /// Returns the `(base, top)` heights of the processed range.
    pub fn verify_progress(&self) -> anyhow::Result<Option<(BlockNumber, BlockNumber)>> {
        let mut cursor = self.db.raw_iterator_cf(self.cf_handle(CF_PROCESSED_BLOCKS));
        cursor.seek_to_first();

        let mut range: Option<(BlockNumber, BlockNumber)> = None;

        while cursor.valid() {
            let height = keys::decode_height_key(cursor.key().unwrap())
                .context("malformed key in the processed-blocks ledger")?;
            range = match range {
                None => Some((height, height)),
                Some((base, top)) if height == top + 1 => Some((base, height)),
                Some((_, top)) => {
                    return Err(ConsistencyError::ProgressGap { missing: top + 1 }.into())
                }
            };
            cursor.next();
        }
        cursor.status()?;

        Ok(range)
    }

    /// Applies one block's worth of derived rows plus the progress
    /// advance as a single atomic transaction.
    ///
    /// The committed height must be exactly one past the current
    /// resume height; anything else fails with [`ConsistencyError`]
    /// and leaves the store untouched. An empty store accepts any
    /// height as its base.
    pub fn commit_block(
        &self,
        height: BlockNumber,
        block_hash: &str,
        block_timestamp: Timestamp,
        events: &BlockEvents,
        anomalous: bool
    ) -> anyhow::Result<()> {
        let mut resume = self.resume.lock();

        if let Some(top) = *resume {
            if height != top + 1 {
                return Err(ConsistencyError::OutOfOrderCommit {
                    expected: top + 1,
                    got: height
                }.into());
            }
        }

        let tx = self.db.transaction();

        let processed = ProcessedBlock {
            height,
            block_hash: block_hash.to_string(),
            processed_at: unix_now(),
            anomalous
        };
        tx.put_cf(
            self.cf_handle(CF_PROCESSED_BLOCKS),
            keys::height_key(height),
            borsh::to_vec(&processed).unwrap()
        )?;

        for (index, report) in events.uptime.iter().enumerate() {
            let event = UptimeEvent {
                node_id: report.node_id,
                block_height: height,
                block_timestamp,
                uptime_secs: report.uptime_secs,
                timestamp_hint: report.timestamp_hint
            };
            tx.put_cf(
                self.cf_handle(CF_UPTIME_EVENTS),
                keys::event_key(report.node_id, height, index as u32),
                borsh::to_vec(&event).unwrap()
            )?;
        }

        for (index, change) in events.power_state.iter().enumerate() {
            let mut node = self.get_node_for_update(&tx, change.node_id)?;
            let event = PowerStateEvent {
                node_id: change.node_id,
                block_height: height,
                block_timestamp,
                previous_state: node.state,
                new_state: change.new_state,
                down_at: change.down_at
            };
            tx.put_cf(
                self.cf_handle(CF_POWER_STATE_EVENTS),
                keys::event_key(change.node_id, height, index as u32),
                borsh::to_vec(&event).unwrap()
            )?;
            node.state = change.new_state;
            node.updated_at_height = height;
            self.put_node(&tx, &node)?;
        }

        for (index, change) in events.power_target.iter().enumerate() {
            let mut node = self.get_node_for_update(&tx, change.node_id)?;
            let event = PowerTargetEvent {
                node_id: change.node_id,
                block_height: height,
                block_timestamp,
                previous_target: node.target,
                new_target: change.new_target
            };
            tx.put_cf(
                self.cf_handle(CF_POWER_TARGET_EVENTS),
                keys::event_key(change.node_id, height, index as u32),
                borsh::to_vec(&event).unwrap()
            )?;
            node.target = change.new_target;
            node.updated_at_height = height;
            self.put_node(&tx, &node)?;
        }

        tx.commit().with_context(|| {
            format!("failed to commit block {}", height)
        })?;

        *resume = Some(height);
        Ok(())
    }

    pub fn snapshot(&self) -> ReadSnapshot<'_> {
        ReadSnapshot::new(&self.db)
    }

    /// Out-of-band re-indexing entry point: clears every table and
    /// resets progress. Never called by the indexing loop itself.
    pub fn truncate(&self) -> anyhow::Result<()> {
        let mut resume = self.resume.lock();

        let tx = self.db.transaction();
        for cf_name in ALL_CF {
            let cf = self.cf_handle(cf_name);
            let mut cursor = self.db.raw_iterator_cf(cf);
            cursor.seek_to_first();
            while cursor.valid() {
                tx.delete_cf(cf, cursor.key().unwrap())?;
                cursor.next();
            }
            cursor.status()?;
        }
        tx.commit().context("failed to truncate the store")?;

        *resume = None;
        Ok(())
    }

    fn get_node_for_update(
        &self,
        tx: &RocksTransaction<'_>,
        node_id: NodeId
    ) -> anyhow::Result<NodeRecord> {
        let maybe_bytes = tx.get_pinned_for_update_cf(
            self.cf_handle(CF_NODES),
            keys::node_key(node_id),
            true
        )?;
        Ok(if let Some(bytes) = maybe_bytes {
            borsh::from_slice(bytes.as_ref())?
        } else {
            NodeRecord::initial(node_id)
        })
    }

    fn put_node(&self, tx: &RocksTransaction<'_>, node: &NodeRecord) -> anyhow::Result<()> {
        tx.put_cf(
            self.cf_handle(CF_NODES),
            keys::node_key(node.node_id),
            borsh::to_vec(node).unwrap()
        )?;
        Ok(())
    }

    fn read_top_height(&self) -> anyhow::Result<Option<BlockNumber>> {
        let mut cursor = self.db.raw_iterator_cf(self.cf_handle(CF_PROCESSED_BLOCKS));
        cursor.seek_to_last();
        if !cursor.valid() {
            cursor.status()?;
            return Ok(None);
        }
        let height = keys::decode_height_key(cursor.key().unwrap())
            .context("malformed key in the processed-blocks ledger")?;
        Ok(Some(height))
    }

    pub(crate) fn cf_handle(&self, name: &str) -> &ColumnFamily {
        self.db.cf_handle(name).unwrap()
    }
}


impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("resume_height", &self.resume_height())
            .finish()
    }
}


fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}
