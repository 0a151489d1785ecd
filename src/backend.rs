//! Hosted-backend seam: the `polls` and `votes` collections, account
//! sign-up/sign-in, and the vote insert change feed.
//!
//! Everything above this module talks to `dyn Backend`. Two implementations
//! ship with the crate: [`MemoryBackend`] keeps rows in process, and
//! [`PgBackend`] stores them in PostgreSQL through diesel and relays
//! `NOTIFY vote_inserts` to subscribers.

mod accounts;
pub mod decode;
mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::voting::{Credentials, NewPoll, NewVote, Poll, PollChanges, PollId, User, UserId, Vote, VoteId};

pub use decode::DecodeError;
pub use memory::MemoryBackend;
pub use postgres::PgBackend;

/// Capacity of the insert notification channel shared by all subscribers.
pub const FEED_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend query failed: {0}")]
    Query(String),

    #[error("malformed backend row: {0}")]
    Decode(#[from] DecodeError),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Row-level filter for [`Backend::list_polls`]. Empty fields do not filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollFilter {
    pub owner: Option<UserId>,
    pub ids: Option<Vec<PollId>>,
    /// Case-insensitive substring of the question.
    pub search: Option<String>,
}

impl PollFilter {
    pub fn owned_by(owner: UserId) -> PollFilter {
        PollFilter { owner: Some(owner), ..Default::default() }
    }

    pub fn with_ids(ids: Vec<PollId>) -> PollFilter {
        PollFilter { ids: Some(ids), ..Default::default() }
    }

    /// The search term, trimmed, if there is anything left to search for.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|term| !term.is_empty())
    }

    pub fn matches(&self, poll: &Poll) -> bool {
        if let Some(owner) = &self.owner {
            if !poll.is_owned_by(owner) {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&poll.id) {
                return false;
            }
        }
        if let Some(term) = self.search_term() {
            if !poll.question.to_lowercase().contains(&term.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Payload of an insert notification on the `votes` collection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoteInserted {
    pub id: VoteId,
    pub poll_id: PollId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeedEvent {
    Inserted(VoteInserted),
    /// Notifications were dropped; the subscriber should re-fetch.
    Lagged(u64),
}

/// Insert notifications scoped to one poll. Dropping it unsubscribes.
pub struct VoteFeed {
    poll_id: PollId,
    events: broadcast::Receiver<VoteInserted>,
}

impl VoteFeed {
    pub fn new(poll_id: PollId, events: broadcast::Receiver<VoteInserted>) -> VoteFeed {
        VoteFeed { poll_id, events }
    }

    /// Next notification for this poll, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.poll_id == self.poll_id => return Some(FeedEvent::Inserted(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(poll_id = %self.poll_id, skipped, "vote feed lagged");
                    return Some(FeedEvent::Lagged(skipped));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, BackendError>;

    async fn get_poll(&self, id: &PollId) -> Result<Option<Poll>, BackendError>;

    /// Returns the updated poll, or `None` if it does not exist.
    async fn update_poll(&self, id: &PollId, changes: PollChanges) -> Result<Option<Poll>, BackendError>;

    /// Deletes the poll and its votes. Returns whether a poll was removed.
    async fn delete_poll(&self, id: &PollId) -> Result<bool, BackendError>;

    /// Matching polls, newest first.
    async fn list_polls(&self, filter: &PollFilter) -> Result<Vec<Poll>, BackendError>;

    /// Vote counts for the given polls. Polls without votes may be absent.
    async fn count_votes(&self, poll_ids: &[PollId]) -> Result<HashMap<PollId, u64>, BackendError>;

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, BackendError>;

    /// Every vote recorded for the poll, oldest first.
    async fn list_votes(&self, poll_id: &PollId) -> Result<Vec<Vote>, BackendError>;

    fn subscribe_votes(&self, poll_id: &PollId) -> Result<VoteFeed, BackendError>;

    async fn sign_up(&self, credentials: &Credentials) -> Result<User, BackendError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, BackendError>;
}
