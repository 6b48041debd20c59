//! Storage for the beacon node: a bucketed key-value contract, an in-memory
//! implementation, block repositories over it, and e2store-based era files
//! for cold history.
//!
//! The database engine itself is a collaborator. Everything in the hot path
//! programs against [`KeyValueStore`]; `MemoryStore` is the reference
//! implementation and the test substrate.

mod block_store;
mod errors;
mod kv_store;
mod memory_store;

pub mod era;

pub use block_store::BlockStore;
pub use errors::Error;
pub use kv_store::{DBColumn, KeyValueStore, KeyValueStoreOp, RangeQuery};
pub use memory_store::MemoryStore;
