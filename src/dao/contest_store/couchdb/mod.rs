mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchContestStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::DocumentConflict { .. } | CouchDaoError::VersionMismatch { .. } => {
                StorageError::conflict(err.to_string())
            }
            CouchDaoError::DeserializeValue { .. } | CouchDaoError::InvalidDocId { .. } => {
                StorageError::corrupt(err.to_string())
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
