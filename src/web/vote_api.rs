use std::sync::Arc;

use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use super::error_response;
use crate::state::AppState;
use crate::voting::{PollId, UnvalidatedSelection};

pub async fn cast(poll_id: PollId, state: Arc<AppState>, selection: UnvalidatedSelection) -> Response {
    match state.votes.vote(&poll_id, selection).await {
        Err(err) => error_response(&err),
        Ok(vote) => reply::with_status(reply::json(&vote), StatusCode::CREATED).into_response(),
    }
}
