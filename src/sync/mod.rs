//! Synchronization-state collaborators: the persistence boundary the
//! dispatcher writes CRM identifiers back through, and the periodic catch-up
//! pass that self-heals records missed at submission time.

pub mod catchup;
pub mod store;

pub use catchup::CatchUpConfig;
pub use store::{MemoryRecordStore, RecordStore};
