use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::CouchDaoError;

pub const CONTEST_PREFIX: &str = "contest::";
pub const PARTICIPANT_PREFIX: &str = "participant::";
pub const QUESTION_PREFIX: &str = "question::";
pub const ANSWER_PREFIX: &str = "answer::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Envelope adding CouchDB bookkeeping fields around a stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self {
            id,
            rev: None,
            body,
        }
    }
}

pub fn contest_doc_id(id: Uuid) -> String {
    format!("{CONTEST_PREFIX}{id}")
}

/// Keyed by user so a second join of the same user collides on insert.
pub fn participant_doc_id(contest_id: Uuid, user_id: Uuid) -> String {
    format!("{PARTICIPANT_PREFIX}{contest_id}::{user_id}")
}

pub fn participant_prefix(contest_id: Uuid) -> String {
    format!("{PARTICIPANT_PREFIX}{contest_id}::")
}

pub fn question_doc_id(contest_id: Uuid, id: Uuid) -> String {
    format!("{QUESTION_PREFIX}{contest_id}::{id}")
}

pub fn question_prefix(contest_id: Uuid) -> String {
    format!("{QUESTION_PREFIX}{contest_id}::")
}

/// Keyed by (round, participant) so a second answer for the same round collides on insert.
/// Rounds are zero-padded to keep `_all_docs` ordering numeric.
pub fn answer_doc_id(contest_id: Uuid, round: u32, participant_id: Uuid) -> String {
    format!("{ANSWER_PREFIX}{contest_id}::{round:010}::{participant_id}")
}

pub fn answer_prefix(contest_id: Uuid, round: Option<u32>) -> String {
    match round {
        Some(round) => format!("{ANSWER_PREFIX}{contest_id}::{round:010}::"),
        None => format!("{ANSWER_PREFIX}{contest_id}::"),
    }
}

/// Recover the contest id embedded in a scoped document id.
pub fn contest_of(doc_id: &str, prefix: &str) -> Result<Uuid, CouchDaoError> {
    let rest = doc_id
        .strip_prefix(prefix)
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_owned(),
            kind: "unexpected prefix",
        })?;
    let contest = rest
        .split("::")
        .next()
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_owned(),
            kind: "missing contest segment",
        })?;
    Uuid::parse_str(contest).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_owned(),
        kind: "contest segment is not a UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_ids_sort_by_round() {
        let contest = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let round_2 = answer_doc_id(contest, 2, participant);
        let round_10 = answer_doc_id(contest, 10, participant);
        assert!(round_2 < round_10);
        assert!(round_2.starts_with(&answer_prefix(contest, Some(2))));
        assert!(!round_10.starts_with(&answer_prefix(contest, Some(1))));
    }

    #[test]
    fn contest_is_recovered_from_scoped_ids() {
        let contest = Uuid::new_v4();
        let id = question_doc_id(contest, Uuid::new_v4());
        assert_eq!(contest_of(&id, QUESTION_PREFIX).unwrap(), contest);
        assert!(contest_of("question::nope", QUESTION_PREFIX).is_err());
    }
}
