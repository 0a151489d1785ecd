use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{PollId, VoteId};
use super::poll::Poll;
use super::voter::Voter;
use crate::error::PollError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub poll_id: PollId,
    pub voter: Voter,
    pub selected_options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn selects(&self, option: &str) -> bool {
        self.selected_options.iter().any(|selected| selected == option)
    }
}

impl Display for Vote {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "({}: {:?})", self.voter, self.selected_options)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnvalidatedSelection {
    pub selected_options: Vec<String>,
}

/// Option labels picked on a ballot, trimmed, blanks and duplicates removed,
/// in the order they were picked. Labels are not checked against the poll's
/// options.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection(Vec<String>);

impl Selection {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl TryFrom<(UnvalidatedSelection, &Poll)> for Selection {
    type Error = PollError;
    fn try_from(value: (UnvalidatedSelection, &Poll)) -> Result<Self, Self::Error> {
        let (UnvalidatedSelection { selected_options }, poll) = value;

        let mut selected: Vec<String> = Vec::with_capacity(selected_options.len());
        for option in selected_options {
            let option = option.trim();
            if !option.is_empty() && !selected.iter().any(|s| s == option) {
                selected.push(option.to_string());
            }
        }

        if selected.is_empty() {
            return Err(PollError::NoSelection);
        }
        if !poll.settings.allow_multiple && selected.len() > 1 {
            return Err(PollError::TooManySelections { count: selected.len() });
        }

        Ok(Selection(selected))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewVote {
    pub poll_id: PollId,
    pub voter: Voter,
    pub selected_options: Vec<String>,
}

impl NewVote {
    pub fn new(poll: &Poll, voter: Voter, selection: Selection) -> NewVote {
        NewVote {
            poll_id: poll.id,
            voter,
            selected_options: selection.into_inner(),
        }
    }
}
