mod db;
mod error;
mod keys;
mod snapshot;

pub use db::Database;
pub use error::ConsistencyError;
pub use snapshot::ReadSnapshot;
