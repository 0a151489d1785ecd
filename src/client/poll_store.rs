use std::convert::TryFrom;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{Backend, PollFilter};
use crate::error::PollError;
use crate::visitor::{IdentityResolver, VisitorState};
use crate::voting::{CreatePoll, NewPoll, Poll, PollChanges, PollId, UnvalidatedCreatePoll, UnvalidatedPollChanges};

/// A poll as shown in listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PollSummary {
    #[serde(flatten)]
    pub poll: Poll,
    pub vote_count: u64,
    pub active: bool,
}

/// Create, read, update and delete polls as the current visitor.
#[derive(Clone)]
pub struct PollStore {
    backend: Arc<dyn Backend>,
    identity: IdentityResolver,
    visitor: Arc<VisitorState>,
}

impl PollStore {
    pub fn new(backend: Arc<dyn Backend>, identity: IdentityResolver, visitor: Arc<VisitorState>) -> PollStore {
        PollStore { backend, identity, visitor }
    }

    /// Validates and inserts a poll owned by the signed-in user, or by nobody.
    /// Polls created anonymously are remembered in the visitor's local state.
    pub async fn create(&self, form: UnvalidatedCreatePoll) -> Result<Poll, PollError> {
        let create = CreatePoll::try_from(form)?;
        let owner = self.identity.session().user().map(|user| user.id);
        if owner.is_none() {
            self.identity.anonymous_id().await;
        }

        let poll = self.backend.insert_poll(NewPoll::new(create, owner)).await?;
        info!(poll_id = %poll.id, options = poll.options.len(), "poll created");

        if owner.is_none() {
            let poll_id = poll.id;
            if let Err(err) = self.visitor.write(move |visitor| visitor.add_anonymous_poll(&poll_id)).await {
                warn!(poll_id = %poll.id, "Failed to remember anonymous poll: {err}");
            }
        }
        Ok(poll)
    }

    pub async fn read(&self, id: &PollId) -> Result<Poll, PollError> {
        self.backend.get_poll(id).await?
            .ok_or(PollError::NotFound(*id))
    }

    pub async fn update(&self, id: &PollId, changes: UnvalidatedPollChanges) -> Result<Poll, PollError> {
        let changes = PollChanges::try_from(changes)?;
        let poll = self.read(id).await?;
        self.ensure_owner(&poll)?;

        let poll = self.backend.update_poll(id, changes).await?
            .ok_or(PollError::NotFound(*id))?;
        info!(poll_id = %poll.id, "poll updated");
        Ok(poll)
    }

    pub async fn delete(&self, id: &PollId) -> Result<(), PollError> {
        let poll = self.read(id).await?;
        self.ensure_owner(&poll)?;

        if !self.backend.delete_poll(id).await? {
            return Err(PollError::NotFound(*id));
        }
        info!(poll_id = %id, "poll deleted");
        Ok(())
    }

    /// Matching polls, newest first.
    pub async fn list(&self, filter: &PollFilter) -> Result<Vec<Poll>, PollError> {
        Ok(self.backend.list_polls(filter).await?)
    }

    /// Polls owned by the signed-in user; empty when signed out.
    pub async fn list_mine(&self) -> Result<Vec<Poll>, PollError> {
        match self.identity.session().user() {
            Some(user) => self.list(&PollFilter::owned_by(user.id)).await,
            None => Ok(vec![]),
        }
    }

    /// Polls this visitor created without an account.
    pub async fn list_anonymous(&self) -> Result<Vec<Poll>, PollError> {
        let ids = self.visitor.anonymous_polls();
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.list(&PollFilter::with_ids(ids)).await
    }

    pub async fn summaries(&self, filter: &PollFilter) -> Result<Vec<PollSummary>, PollError> {
        let polls = self.list(filter).await?;
        self.summarize(polls).await
    }

    pub async fn summarize(&self, polls: Vec<Poll>) -> Result<Vec<PollSummary>, PollError> {
        let ids: Vec<PollId> = polls.iter().map(|poll| poll.id).collect();
        let counts = self.backend.count_votes(&ids).await?;
        let now = Utc::now();

        Ok(polls.into_iter()
            .map(|poll| PollSummary {
                vote_count: counts.get(&poll.id).copied().unwrap_or(0),
                active: !poll.is_expired_at(now),
                poll,
            })
            .collect())
    }

    /// Whether the signed-in user may edit or delete `poll`.
    pub fn can_manage(&self, poll: &Poll) -> bool {
        self.identity.session().user()
            .is_some_and(|user| poll.is_owned_by(&user.id))
    }

    fn ensure_owner(&self, poll: &Poll) -> Result<(), PollError> {
        if self.can_manage(poll) {
            Ok(())
        } else {
            Err(PollError::NotOwner(poll.id))
        }
    }
}
