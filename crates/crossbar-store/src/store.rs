use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use thiserror::Error;

use crate::records::{ConversationRecord, ResponseRecord};

const CF_RESPONSES: &str = "responses";
const CF_CONVERSATIONS: &str = "conversations";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("column family missing: {0}")]
    ColumnFamily(String),
}

/// Generate a prefixed, time-ordered identifier
pub fn generate_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{prefix}_{millis:x}{count:04x}")
}

/// RocksDB-backed store for response and conversation objects
pub struct Store {
    db: DB,
    ttl: Option<Duration>,
}

impl Store {
    /// Open (or create) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if RocksDB cannot open the directory.
    pub fn open(path: &Path, ttl_days: u64) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(CF_RESPONSES, Options::default()),
            ColumnFamilyDescriptor::new(CF_CONVERSATIONS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&options, path, column_families)?;
        let ttl = (ttl_days > 0).then(|| Duration::from_secs(ttl_days * 24 * 60 * 60));

        tracing::info!(path = %path.display(), ttl_days, "opened object store");

        Ok(Self { db, ttl })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::ColumnFamily(name.to_owned()))
    }

    /// Whether a record created at `created_at` has outlived the TTL
    fn expired(&self, created_at: u64) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(created_at) > ttl.as_secs()
    }

    // -- Responses --

    pub fn put_response(&self, record: &ResponseRecord) -> Result<(), StoreError> {
        let cf = self.cf(CF_RESPONSES)?;
        self.db.put_cf(cf, &record.id, serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn get_response(&self, id: &str) -> Result<ResponseRecord, StoreError> {
        let cf = self.cf(CF_RESPONSES)?;
        let bytes = self
            .db
            .get_cf(cf, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let record: ResponseRecord = serde_json::from_slice(&bytes)?;

        if self.expired(record.created_at) {
            self.db.delete_cf(cf, id)?;
            return Err(StoreError::NotFound(id.to_owned()));
        }

        Ok(record)
    }

    pub fn delete_response(&self, id: &str) -> Result<(), StoreError> {
        let cf = self.cf(CF_RESPONSES)?;
        if self.db.get_cf(cf, id)?.is_none() {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        self.db.delete_cf(cf, id)?;
        Ok(())
    }

    // -- Conversations --

    pub fn put_conversation(&self, record: &ConversationRecord) -> Result<(), StoreError> {
        let cf = self.cf(CF_CONVERSATIONS)?;
        self.db.put_cf(cf, &record.id, serde_json::to_vec(record)?)?;
        Ok(())
    }

    pub fn get_conversation(&self, id: &str) -> Result<ConversationRecord, StoreError> {
        let cf = self.cf(CF_CONVERSATIONS)?;
        let bytes = self
            .db
            .get_cf(cf, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let record: ConversationRecord = serde_json::from_slice(&bytes)?;

        if self.expired(record.created_at) {
            self.db.delete_cf(cf, id)?;
            return Err(StoreError::NotFound(id.to_owned()));
        }

        Ok(record)
    }

    pub fn delete_conversation(&self, id: &str) -> Result<(), StoreError> {
        let cf = self.cf(CF_CONVERSATIONS)?;
        if self.db.get_cf(cf, id)?.is_none() {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        self.db.delete_cf(cf, id)?;
        Ok(())
    }
}
