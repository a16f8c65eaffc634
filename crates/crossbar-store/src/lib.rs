//! Durable storage for response and conversation objects.
//!
//! A thin CRUD layer over RocksDB with one column family per record
//! kind. Records are JSON-serialized; expiry is lazy against a TTL
//! checked on read.

mod records;
mod store;

pub use records::{ConversationRecord, ResponseError, ResponseRecord, ResponseStatus};
pub use store::{Store, StoreError, generate_id};
