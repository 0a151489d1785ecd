//! Loosely typed backend rows and their conversion into typed records.
//!
//! Columns that the hosted store keeps as JSON (`options`, `settings`,
//! `selected_options`) arrive as [`serde_json::Value`]. Each field has a
//! fixed fallback policy; a row either decodes into a complete record or is
//! rejected with a [`DecodeError`].
//!
//! | field | policy |
//! |---|---|
//! | `polls.options` | array of strings, otherwise rejected |
//! | `polls.settings` | absent / null / non-object → defaults; missing or non-boolean keys → defaults |
//! | `votes.user_id`, `votes.ip_hash` | user id wins; otherwise a non-empty hash; neither → rejected |
//! | `votes.selected_options` | non-array → empty; non-string entries dropped |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::voting::{AnonymousId, Poll, PollId, PollSettings, UserId, Vote, VoteId, Voter};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("poll {id}: options must be an array of strings")]
    PollOptions { id: Uuid },

    #[error("vote {id}: neither user_id nor ip_hash is set")]
    VoteVoter { id: Uuid },

    #[error("notification payload: {0}")]
    Notification(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollRow {
    pub id: Uuid,
    pub question: String,
    pub options: Value,
    pub settings: Option<Value>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRow {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_hash: Option<String>,
    pub selected_options: Value,
    pub created_at: DateTime<Utc>,
}

pub fn decode_poll(row: PollRow) -> Result<Poll, DecodeError> {
    let PollRow { id, question, options, settings, created_by, created_at, ends_at } = row;

    let options = match options {
        Value::Array(items) => items.into_iter()
            .map(|item| match item {
                Value::String(label) => Ok(label),
                _ => Err(DecodeError::PollOptions { id }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(DecodeError::PollOptions { id }),
    };

    Ok(Poll {
        id: PollId(id),
        question,
        options,
        settings: decode_settings(settings),
        created_by: created_by.map(UserId),
        created_at,
        ends_at,
    })
}

pub fn decode_vote(row: VoteRow) -> Result<Vote, DecodeError> {
    let VoteRow { id, poll_id, user_id, ip_hash, selected_options, created_at } = row;

    let voter = match (user_id, ip_hash) {
        (Some(user_id), _) => Voter::User(UserId(user_id)),
        (None, Some(hash)) if !hash.is_empty() => Voter::Anonymous(AnonymousId(hash)),
        _ => return Err(DecodeError::VoteVoter { id }),
    };

    let selected_options = match selected_options {
        Value::Array(items) => items.into_iter()
            .filter_map(|item| match item {
                Value::String(label) => Some(label),
                _ => None,
            })
            .collect(),
        _ => vec![],
    };

    Ok(Vote {
        id: VoteId(id),
        poll_id: PollId(poll_id),
        voter,
        selected_options,
        created_at,
    })
}

fn decode_settings(settings: Option<Value>) -> PollSettings {
    let defaults = PollSettings::default();
    match settings {
        Some(Value::Object(fields)) => PollSettings {
            allow_multiple: flag(&fields, "allowMultiple", defaults.allow_multiple),
            show_results: flag(&fields, "showResults", defaults.show_results),
        },
        _ => defaults,
    }
}

fn flag(fields: &Map<String, Value>, key: &str, default: bool) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn encode_options(options: &[String]) -> Value {
    Value::Array(options.iter().cloned().map(Value::String).collect())
}

pub fn encode_settings(settings: &PollSettings) -> Value {
    let mut fields = Map::new();
    fields.insert(String::from("allowMultiple"), Value::Bool(settings.allow_multiple));
    fields.insert(String::from("showResults"), Value::Bool(settings.show_results));
    Value::Object(fields)
}
