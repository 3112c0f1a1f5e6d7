use mongodb::bson::{self, Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity};

fn to_bson_uuid(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

fn from_bson_uuid(id: bson::Uuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

/// Uuid encoded as BSON binary subtype 4, usable in filters.
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::from(to_bson_uuid(id))
}

pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": uuid_bson(id) }
}

/// Filter matching a document only while it still carries `version`.
pub fn doc_id_at_version(id: Uuid, version: u64) -> Document {
    doc! { "_id": uuid_bson(id), "version": version as i64 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoContestDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    name: String,
    starts_at: Option<DateTime>,
    lobby_open: bool,
    submission_open: bool,
    current_round: u32,
    finished: bool,
    #[serde(default)]
    closed_round: Option<u32>,
    #[serde(default)]
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<ContestEntity> for MongoContestDocument {
    fn from(value: ContestEntity) -> Self {
        Self {
            id: to_bson_uuid(value.id),
            name: value.name,
            starts_at: value.starts_at.map(DateTime::from_system_time),
            lobby_open: value.lobby_open,
            submission_open: value.submission_open,
            current_round: value.current_round,
            finished: value.finished,
            closed_round: value.closed_round,
            version: value.version as i64,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoContestDocument> for ContestEntity {
    fn from(value: MongoContestDocument) -> Self {
        Self {
            id: from_bson_uuid(value.id),
            name: value.name,
            starts_at: value.starts_at.map(DateTime::to_system_time),
            lobby_open: value.lobby_open,
            submission_open: value.submission_open,
            current_round: value.current_round,
            finished: value.finished,
            closed_round: value.closed_round,
            version: value.version.max(0) as u64,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    contest_id: bson::Uuid,
    user_id: bson::Uuid,
    display_name: String,
    active: bool,
    elimination_round: Option<u32>,
    #[serde(default)]
    reinstated_round: Option<u32>,
    #[serde(default)]
    version: i64,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: to_bson_uuid(value.id),
            contest_id: to_bson_uuid(value.contest_id),
            user_id: to_bson_uuid(value.user_id),
            display_name: value.display_name,
            active: value.active,
            elimination_round: value.elimination_round,
            reinstated_round: value.reinstated_round,
            version: value.version as i64,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            id: from_bson_uuid(value.id),
            contest_id: from_bson_uuid(value.contest_id),
            user_id: from_bson_uuid(value.user_id),
            display_name: value.display_name,
            active: value.active,
            elimination_round: value.elimination_round,
            reinstated_round: value.reinstated_round,
            version: value.version.max(0) as u64,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    contest_id: bson::Uuid,
    round: u32,
    text: String,
    options: Vec<String>,
    correct_option: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: to_bson_uuid(value.id),
            contest_id: to_bson_uuid(value.contest_id),
            round: value.round,
            text: value.text,
            options: value.options,
            correct_option: value.correct_option,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: from_bson_uuid(value.id),
            contest_id: from_bson_uuid(value.contest_id),
            round: value.round,
            text: value.text,
            options: value.options,
            correct_option: value.correct_option,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    contest_id: bson::Uuid,
    participant_id: bson::Uuid,
    round: u32,
    answer: Option<String>,
    submitted_at: DateTime,
}

impl From<AnswerEntity> for MongoAnswerDocument {
    fn from(value: AnswerEntity) -> Self {
        Self {
            id: to_bson_uuid(value.id),
            contest_id: to_bson_uuid(value.contest_id),
            participant_id: to_bson_uuid(value.participant_id),
            round: value.round,
            answer: value.answer,
            submitted_at: DateTime::from_system_time(value.submitted_at),
        }
    }
}

impl From<MongoAnswerDocument> for AnswerEntity {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            id: from_bson_uuid(value.id),
            contest_id: from_bson_uuid(value.contest_id),
            participant_id: from_bson_uuid(value.participant_id),
            round: value.round,
            answer: value.answer,
            submitted_at: value.submitted_at.to_system_time(),
        }
    }
}
