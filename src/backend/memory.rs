use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::accounts::{new_salt, password_digest, verify_password};
use super::decode::{decode_poll, decode_vote, encode_options, encode_settings, PollRow, VoteRow};
use super::{Backend, BackendError, PollFilter, VoteFeed, VoteInserted, FEED_CAPACITY};
use crate::voting::{Credentials, NewPoll, NewVote, Poll, PollChanges, PollId, User, UserId, Vote};

struct Account {
    id: Uuid,
    salt: String,
    password_digest: String,
}

#[derive(Default)]
struct Tables {
    polls: Vec<PollRow>,
    votes: Vec<VoteRow>,
    accounts: HashMap<String, Account>,
}

/// In-process backend. Rows are stored in their loosely typed shape and go
/// through the same decode step as rows from PostgreSQL.
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    feed: broadcast::Sender<VoteInserted>,
    online: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new()
    }
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        MemoryBackend {
            tables: RwLock::new(Tables::default()),
            feed,
            online: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call fail as if the network were down.
    pub fn disconnect(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    /// Delivers a notification again. Realtime feeds are at-least-once, so
    /// subscribers must tolerate repeats.
    pub fn announce(&self, event: VoteInserted) {
        let _ = self.feed.send(event);
    }

    /// Number of live feed subscriptions across all polls.
    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(String::from("network unreachable")))
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, BackendError> {
        self.ensure_online()?;
        let row = PollRow {
            id: Uuid::new_v4(),
            question: poll.question,
            options: encode_options(&poll.options),
            settings: Some(encode_settings(&poll.settings)),
            created_by: poll.created_by.map(|id| id.0),
            created_at: Utc::now(),
            ends_at: poll.ends_at,
        };
        self.tables.write().await.polls.push(row.clone());
        Ok(decode_poll(row)?)
    }

    async fn get_poll(&self, id: &PollId) -> Result<Option<Poll>, BackendError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        match tables.polls.iter().find(|row| row.id == id.0) {
            Some(row) => Ok(Some(decode_poll(row.clone())?)),
            None => Ok(None),
        }
    }

    async fn update_poll(&self, id: &PollId, changes: PollChanges) -> Result<Option<Poll>, BackendError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let Some(row) = tables.polls.iter_mut().find(|row| row.id == id.0) else {
            return Ok(None);
        };

        let mut poll = decode_poll(row.clone())?;
        changes.apply_to(&mut poll);

        row.question = poll.question.clone();
        row.options = encode_options(&poll.options);
        row.settings = Some(encode_settings(&poll.settings));
        row.ends_at = poll.ends_at;
        Ok(Some(poll))
    }

    async fn delete_poll(&self, id: &PollId) -> Result<bool, BackendError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let before = tables.polls.len();
        tables.polls.retain(|row| row.id != id.0);
        let removed = tables.polls.len() != before;
        if removed {
            tables.votes.retain(|row| row.poll_id != id.0);
        }
        Ok(removed)
    }

    async fn list_polls(&self, filter: &PollFilter) -> Result<Vec<Poll>, BackendError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut polls = vec![];
        // newest insert first, so equal timestamps still list newest first
        for row in tables.polls.iter().rev() {
            let poll = decode_poll(row.clone())?;
            if filter.matches(&poll) {
                polls.push(poll);
            }
        }
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn count_votes(&self, poll_ids: &[PollId]) -> Result<HashMap<PollId, u64>, BackendError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for row in &tables.votes {
            let poll_id = PollId(row.poll_id);
            if poll_ids.contains(&poll_id) {
                *counts.entry(poll_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, BackendError> {
        self.ensure_online()?;
        let row = VoteRow {
            id: Uuid::new_v4(),
            poll_id: vote.poll_id.0,
            user_id: vote.voter.user_id().map(|id| id.0),
            ip_hash: vote.voter.anonymous_id().map(|id| id.0.clone()),
            selected_options: encode_options(&vote.selected_options),
            created_at: Utc::now(),
        };
        let vote = decode_vote(row.clone())?;

        let mut tables = self.tables.write().await;
        if !tables.polls.iter().any(|poll| poll.id == row.poll_id) {
            return Err(BackendError::Query(format!("poll {} does not exist", vote.poll_id)));
        }
        tables.votes.push(row);
        drop(tables);

        debug!(vote_id = %vote.id, poll_id = %vote.poll_id, "vote inserted");
        self.announce(VoteInserted { id: vote.id, poll_id: vote.poll_id });
        Ok(vote)
    }

    async fn list_votes(&self, poll_id: &PollId) -> Result<Vec<Vote>, BackendError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        tables.votes.iter()
            .filter(|row| row.poll_id == poll_id.0)
            .map(|row| decode_vote(row.clone()).map_err(BackendError::from))
            .collect()
    }

    fn subscribe_votes(&self, poll_id: &PollId) -> Result<VoteFeed, BackendError> {
        self.ensure_online()?;
        Ok(VoteFeed::new(*poll_id, self.feed.subscribe()))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<User, BackendError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&credentials.email) {
            return Err(BackendError::Auth(format!("{} is already registered", credentials.email)));
        }

        let salt = new_salt();
        let account = Account {
            id: Uuid::new_v4(),
            password_digest: password_digest(&salt, &credentials.password),
            salt,
        };
        let user = User::new(UserId(account.id), credentials.email.clone());
        tables.accounts.insert(credentials.email.clone(), account);
        Ok(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, BackendError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        match tables.accounts.get(&credentials.email) {
            Some(account) if verify_password(&account.salt, &credentials.password, &account.password_digest) => {
                Ok(User::new(UserId(account.id), credentials.email.clone()))
            }
            _ => Err(BackendError::Auth(String::from("invalid email or password"))),
        }
    }
}
