//! Visitor-facing operations on top of a [`Backend`](crate::backend::Backend).

pub mod auth;
pub mod change_feed;
pub mod poll_store;
pub mod vote_recorder;

pub use auth::{AuthError, Authenticator};
pub use change_feed::{ChangeFeedListener, RefreshBus};
pub use poll_store::{PollStore, PollSummary};
pub use vote_recorder::VoteRecorder;
