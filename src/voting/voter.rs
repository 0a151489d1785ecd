use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::id::{AnonymousId, UserId};

/// Who cast a vote: exactly one of an account or an anonymous visitor.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voter {
    User(UserId),
    Anonymous(AnonymousId),
}

impl Voter {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Voter::User(id) => Some(id),
            Voter::Anonymous(_) => None,
        }
    }

    pub fn anonymous_id(&self) -> Option<&AnonymousId> {
        match self {
            Voter::User(_) => None,
            Voter::Anonymous(id) => Some(id),
        }
    }
}

impl Display for Voter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Voter::User(id) => write!(f, "user {id}"),
            Voter::Anonymous(id) => write!(f, "visitor {id}"),
        }
    }
}
