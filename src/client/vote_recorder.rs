use std::convert::TryFrom;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::change_feed::RefreshBus;
use crate::backend::Backend;
use crate::error::PollError;
use crate::visitor::{IdentityResolver, VisitorState};
use crate::voting::{NewVote, Poll, PollId, Selection, UnvalidatedSelection, Vote, Voter};

/// Submits votes on behalf of the current visitor.
///
/// Duplicate votes are only prevented through the visitor's local voted
/// list; the backend accepts any number of votes per voter.
#[derive(Clone)]
pub struct VoteRecorder {
    backend: Arc<dyn Backend>,
    identity: IdentityResolver,
    visitor: Arc<VisitorState>,
    refresh: RefreshBus,
}

impl VoteRecorder {
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: IdentityResolver,
        visitor: Arc<VisitorState>,
        refresh: RefreshBus,
    ) -> VoteRecorder {
        VoteRecorder { backend, identity, visitor, refresh }
    }

    pub fn has_voted(&self, poll_id: &PollId) -> bool {
        self.visitor.has_voted(poll_id)
    }

    pub async fn vote(&self, poll_id: &PollId, selection: UnvalidatedSelection) -> Result<Vote, PollError> {
        let poll = self.backend.get_poll(poll_id).await?
            .ok_or(PollError::NotFound(*poll_id))?;
        self.vote_at(&poll, selection, Utc::now()).await
    }

    /// Records a vote submitted at `now`. The checks run in order: poll
    /// still open, selection shape, then the local voted list.
    pub async fn vote_at(&self, poll: &Poll, selection: UnvalidatedSelection, now: DateTime<Utc>) -> Result<Vote, PollError> {
        if let Some(ended_at) = poll.ends_at.filter(|_| poll.is_expired_at(now)) {
            return Err(PollError::PollExpired { poll_id: poll.id, ended_at });
        }
        let selection = Selection::try_from((selection, poll))?;
        if self.has_voted(&poll.id) {
            return Err(PollError::AlreadyVoted(poll.id));
        }

        let voter = Voter::from(self.identity.resolve().await);
        let vote = self.backend.insert_vote(NewVote::new(poll, voter, selection)).await?;
        info!(poll_id = %poll.id, vote_id = %vote.id, voter = %vote.voter, "vote recorded");

        // the vote is stored either way; a lost flag only weakens the local guard
        let poll_id = poll.id;
        if let Err(err) = self.visitor.write(move |visitor| visitor.mark_voted(&poll_id)).await {
            warn!(poll_id = %poll.id, "Failed to remember vote locally: {err}");
        }
        self.refresh.request(poll.id);
        Ok(vote)
    }
}
