use serde::{Deserialize, Serialize};

use crate::client::PollSummary;
use crate::voting::{AnonymousId, Poll, User};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive search in poll questions.
    pub q: Option<String>,
    /// Only the signed-in user's polls.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct PollListing {
    pub polls: Vec<PollSummary>,
    pub total_polls: usize,
    pub total_votes: u64,
    pub active_polls: usize,
}

impl PollListing {
    pub fn new(polls: Vec<PollSummary>) -> PollListing {
        PollListing {
            total_polls: polls.len(),
            total_votes: polls.iter().map(|summary| summary.vote_count).sum(),
            active_polls: polls.iter().filter(|summary| summary.active).count(),
            polls,
        }
    }
}

/// Everything the poll page needs to render.
#[derive(Debug, Serialize)]
pub struct PollView {
    pub poll: Poll,
    pub has_voted: bool,
    pub expired: bool,
    pub can_manage: bool,
    pub results_visible: bool,
    pub share_path: String,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub user: Option<User>,
    pub anonymous_id: Option<AnonymousId>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
