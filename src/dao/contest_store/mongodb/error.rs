use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures that can occur while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Connection string as configured.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused to build a client.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings tried.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A health ping failed on an established connection.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Creating a required index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection of the index.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A write was rejected.
    #[error("failed to write `{id}` into `{collection}`")]
    Write {
        /// Collection written to.
        collection: &'static str,
        /// Id of the document.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A read failed.
    #[error("failed to read from `{collection}`")]
    Read {
        /// Collection read from.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A unique index rejected the document.
    #[error("document `{id}` in `{collection}` violates a unique index")]
    DuplicateKey {
        /// Collection written to.
        collection: &'static str,
        /// Id of the rejected document.
        id: Uuid,
    },
    /// The stored document no longer carries the version the caller read.
    #[error("document `{id}` in `{collection}` no longer has version {expected}")]
    VersionMismatch {
        /// Collection written to.
        collection: &'static str,
        /// Id of the document.
        id: Uuid,
        /// Version the caller read.
        expected: u64,
    },
}

/// Whether the driver rejected a write because of a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}
