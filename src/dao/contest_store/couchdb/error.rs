//! Error types shared by the CouchDB storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// A document request never got an answer.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path relative to the server root.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered a document request with an unexpected status.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path relative to the server root.
        path: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// CouchDB answered 409: the document exists or its revision moved on.
    #[error("CouchDB document `{path}` conflicts with a concurrent write")]
    DocumentConflict {
        /// Path of the conflicting document.
        path: String,
    },
    /// The stored document no longer carries the version the caller read.
    #[error("CouchDB document `{path}` no longer has version {expected}")]
    VersionMismatch {
        /// Path of the document.
        path: String,
        /// Version the caller read.
        expected: u64,
    },
    /// The response body could not be read as JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path relative to the server root.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A stored document does not match the expected shape.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        /// Request path relative to the server root.
        path: String,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// A document id does not follow the `<kind>::<uuid>` layout.
    #[error("invalid document ID `{doc_id}`: {kind}")]
    InvalidDocId {
        /// Offending document id.
        doc_id: String,
        /// Record kind the id was expected to name.
        kind: &'static str,
    },
}
