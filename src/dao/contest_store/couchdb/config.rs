use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "knockout";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth pair sent with every CouchDB request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Where the contest documents live and how to reach them.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding contests, participants, questions and answers.
    pub database: String,
    /// Basic-auth credentials, if the server requires them.
    pub credentials: Option<CouchCredentials>,
    /// Per-request timeout; a hung request would otherwise stall a lifecycle.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Settings for `base_url` with the default database and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: DEFAULT_DATABASE.to_owned(),
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, `COUCH_TIMEOUT_SECS` and the optional
    /// `COUCH_USERNAME` / `COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = non_empty("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let mut config = Self::new(base_url);

        if let Some(database) = non_empty("COUCH_DB") {
            config.database = database;
        }
        if let Some(secs) = non_empty("COUCH_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        config.credentials = non_empty("COUCH_USERNAME")
            .zip(non_empty("COUCH_PASSWORD"))
            .map(|(username, password)| CouchCredentials { username, password });

        Ok(config)
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}
