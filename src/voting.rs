mod id;
mod poll;
mod poll_result;
mod user;
mod vote;
mod voter;

pub use id::{AnonymousId, PollId, UserId, VoteId};
pub use poll::{
    CreatePoll, NewPoll, Poll, PollChanges, PollSettings, UnvalidatedCreatePoll, UnvalidatedPollChanges,
    OPTION_LIMITS,
};
pub use poll_result::{aggregate, OptionTally, PollResult};
pub use user::{Credentials, UnvalidatedCredentials, User, MIN_PASSWORD_LEN};
pub use vote::{NewVote, Selection, UnvalidatedSelection, Vote};
pub use voter::Voter;
