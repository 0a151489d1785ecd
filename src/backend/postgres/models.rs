use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::schema;
use crate::backend::decode::{encode_options, encode_settings, PollRow, VoteRow};
use crate::voting;

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::polls)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Value,
    pub settings: Option<Value>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl From<Poll> for PollRow {
    fn from(Poll { id, question, options, settings, created_by, created_at, ends_at }: Poll) -> Self {
        PollRow { id, question, options, settings, created_by, created_at, ends_at }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::polls)]
pub struct NewPoll {
    pub question: String,
    pub options: Value,
    pub settings: Option<Value>,
    pub created_by: Option<Uuid>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl From<voting::NewPoll> for NewPoll {
    fn from(voting::NewPoll {
        question,
        options,
        settings,
        ends_at,
        created_by,
    }: voting::NewPoll) -> Self {
        Self {
            question,
            options: encode_options(&options),
            settings: Some(encode_settings(&settings)),
            created_by: created_by.map(|id| id.0),
            ends_at,
        }
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = schema::polls)]
pub struct UpdatePoll {
    pub question: Option<String>,
    pub options: Option<Value>,
    pub settings: Option<Value>,
    pub ends_at: Option<Option<DateTime<Utc>>>,
}

impl From<voting::PollChanges> for UpdatePoll {
    fn from(voting::PollChanges {
        question,
        options,
        settings,
        ends_at,
    }: voting::PollChanges) -> Self {
        Self {
            question,
            options: options.map(|o| encode_options(&o)),
            settings: settings.map(|s| encode_settings(&s)),
            ends_at,
        }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::votes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Poll, foreign_key = poll_id))]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_hash: Option<String>,
    pub selected_options: Value,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteRow {
    fn from(Vote { id, poll_id, user_id, ip_hash, selected_options, created_at }: Vote) -> Self {
        VoteRow { id, poll_id, user_id, ip_hash, selected_options, created_at }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::votes)]
pub struct NewVote {
    pub poll_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_hash: Option<String>,
    pub selected_options: Value,
}

impl From<voting::NewVote> for NewVote {
    fn from(voting::NewVote { poll_id, voter, selected_options }: voting::NewVote) -> Self {
        Self {
            poll_id: poll_id.0,
            user_id: voter.user_id().map(|id| id.0),
            ip_hash: voter.anonymous_id().map(|id| id.0.clone()),
            selected_options: encode_options(&selected_options),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_digest: String,
    pub salt: String,
}

#[derive(Insertable)]
#[diesel(table_name = schema::accounts)]
pub struct NewAccount {
    pub email: String,
    pub password_digest: String,
    pub salt: String,
}

impl From<Account> for voting::User {
    fn from(account: Account) -> Self {
        voting::User::new(voting::UserId(account.id), account.email)
    }
}
