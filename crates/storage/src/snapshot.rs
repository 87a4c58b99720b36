use anyhow::Context;
use borsh::BorshDeserialize;
use rocksdb::{ColumnFamily, ReadOptions};

use tfidx_primitives::{
    BlockNumber, NodeId, NodeRecord, PowerStateEvent, PowerTargetEvent, ProcessedBlock,
    UptimeEvent
};

use crate::db::{
    RocksDB, RocksSnapshot, CF_NODES, CF_POWER_STATE_EVENTS, CF_POWER_TARGET_EVENTS,
    CF_PROCESSED_BLOCKS, CF_UPTIME_EVENTS
};
use crate::keys;


/// Consistent point-in-time view of the store. Cheap to create; holds
/// a rocksdb snapshot for its lifetime.
pub struct ReadSnapshot<'a> {
    db: &'a RocksDB,
    snapshot: RocksSnapshot<'a>
}


impl<'a> ReadSnapshot<'a> {
    pub(crate) fn new(db: &'a RocksDB) -> Self {
        Self {
            db,
            snapshot: db.snapshot()
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> anyhow::Result<Option<NodeRecord>> {
        self.get_value(CF_NODES, &keys::node_key(node_id))
    }

    pub fn list_nodes(&self) -> anyhow::Result<Vec<NodeRecord>> {
        self.scan_prefix(CF_NODES, &[])
    }

    pub fn uptime_events(&self, node_id: NodeId) -> anyhow::Result<Vec<UptimeEvent>> {
        self.scan_prefix(CF_UPTIME_EVENTS, &keys::node_prefix(node_id))
    }

    pub fn power_state_events(&self, node_id: NodeId) -> anyhow::Result<Vec<PowerStateEvent>> {
        self.scan_prefix(CF_POWER_STATE_EVENTS, &keys::node_prefix(node_id))
    }

    pub fn power_target_events(&self, node_id: NodeId) -> anyhow::Result<Vec<PowerTargetEvent>> {
        self.scan_prefix(CF_POWER_TARGET_EVENTS, &keys::node_prefix(node_id))
    }

    pub fn get_processed_block(
        &self,
        height: BlockNumber
    ) -> anyhow::Result<Option<ProcessedBlock>> {
        self.get_value(CF_PROCESSED_BLOCKS, &keys::height_key(height))
    }

    pub fn processed_heights(&self) -> anyhow::Result<Vec<BlockNumber>> {
        let mut cursor = self.db.raw_iterator_cf_opt(
            self.cf_handle(CF_PROCESSED_BLOCKS),
            self.new_options()
        );
        cursor.seek_to_first();

        let mut heights = Vec::new();
        while cursor.valid() {
            let height = keys::decode_height_key(cursor.key().unwrap())
                .context("malformed key in the processed-blocks ledger")?;
            heights.push(height);
            cursor.next();
        }
        cursor.status()?;
        Ok(heights)
    }

    fn get_value<T: BorshDeserialize>(
        &self,
        cf: &str,
        key: &[u8]
    ) -> anyhow::Result<Option<T>> {
        let maybe_bytes = self.db.get_pinned_cf_opt(
            self.cf_handle(cf),
            key,
            &self.new_options()
        )?;
        Ok(if let Some(bytes) = maybe_bytes {
            Some(borsh::from_slice(bytes.as_ref())?)
        } else {
            None
        })
    }

    fn scan_prefix<T: BorshDeserialize>(
        &self,
        cf: &str,
        prefix: &[u8]
    ) -> anyhow::Result<Vec<T>> {
        let mut cursor = self.db.raw_iterator_cf_opt(self.cf_handle(cf), self.new_options());
        cursor.seek(prefix);

        let mut values = Vec::new();
        while cursor.valid() && cursor.key().unwrap().starts_with(prefix) {
            values.push(borsh::from_slice(cursor.value().unwrap())?);
            cursor.next();
        }
        cursor.status()?;
        Ok(values)
    }

    fn new_options(&self) -> ReadOptions {
        let mut options = ReadOptions::default();
        options.set_snapshot(&self.snapshot);
        options
    }

    fn cf_handle(&self, name: &str) -> &ColumnFamily {
        self.db.cf_handle(name).unwrap()
    }
}
