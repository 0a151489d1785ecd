use std::sync::Arc;

use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use super::error_response;
use super::models::{ListQuery, PollListing, PollView};
use crate::backend::PollFilter;
use crate::state::AppState;
use crate::voting::{Poll, PollId, UnvalidatedCreatePoll, UnvalidatedPollChanges};

pub async fn list(state: Arc<AppState>, query: ListQuery) -> Response {
    let mut filter = PollFilter { search: query.q, ..Default::default() };
    if query.mine {
        match state.session.user() {
            Some(user) => filter.owner = Some(user.id),
            None => return reply::json(&PollListing::default()).into_response(),
        }
    }

    match state.polls.summaries(&filter).await {
        Err(err) => error_response(&err),
        Ok(summaries) => reply::json(&PollListing::new(summaries)).into_response(),
    }
}

pub async fn list_anonymous(state: Arc<AppState>) -> Response {
    let polls = match state.polls.list_anonymous().await {
        Err(err) => { return error_response(&err); },
        Ok(p) => p,
    };
    match state.polls.summarize(polls).await {
        Err(err) => error_response(&err),
        Ok(summaries) => reply::json(&PollListing::new(summaries)).into_response(),
    }
}

pub async fn create(state: Arc<AppState>, form: UnvalidatedCreatePoll) -> Response {
    match state.polls.create(form).await {
        Err(err) => error_response(&err),
        Ok(poll) => reply::with_status(reply::json(&poll), StatusCode::CREATED).into_response(),
    }
}

pub async fn get(id: PollId, state: Arc<AppState>) -> Response {
    match state.polls.read(&id).await {
        Err(err) => error_response(&err),
        Ok(poll) => reply::json(&view(&state, poll)).into_response(),
    }
}

pub async fn update(id: PollId, state: Arc<AppState>, changes: UnvalidatedPollChanges) -> Response {
    match state.polls.update(&id, changes).await {
        Err(err) => error_response(&err),
        Ok(poll) => reply::json(&poll).into_response(),
    }
}

pub async fn delete(id: PollId, state: Arc<AppState>) -> Response {
    match state.polls.delete(&id).await {
        Err(err) => error_response(&err),
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
    }
}

fn view(state: &AppState, poll: Poll) -> PollView {
    let can_manage = state.polls.can_manage(&poll);
    PollView {
        has_voted: state.votes.has_voted(&poll.id),
        expired: poll.is_expired(),
        results_visible: poll.settings.show_results || can_manage,
        share_path: format!("/poll/{}", poll.id),
        can_manage,
        poll,
    }
}
