use std::sync::Arc;

use futures::{future, stream, StreamExt};
use tracing::debug;
use warp::reply::{self, Reply, Response};
use warp::sse::{self, Event};

use super::error_response;
use crate::backend::Backend;
use crate::client::ChangeFeedListener;
use crate::error::PollError;
use crate::state::AppState;
use crate::voting::{Poll, PollId, PollResult};

pub async fn get(poll_id: PollId, state: Arc<AppState>) -> Response {
    let poll = match visible_poll(&state, &poll_id).await {
        Err(err) => { return error_response(&err); },
        Ok(p) => p,
    };

    match state.backend.list_votes(&poll.id).await {
        Err(err) => error_response(&PollError::from(err)),
        Ok(votes) => reply::json(&PollResult::evaluate(&poll, &votes)).into_response(),
    }
}

/// Streams the current result, then every recomputed result, as `results`
/// events until the client goes away.
pub async fn live(poll_id: PollId, state: Arc<AppState>) -> Response {
    let poll = match visible_poll(&state, &poll_id).await {
        Err(err) => { return error_response(&err); },
        Ok(p) => p,
    };
    let listener = match ChangeFeedListener::start(state.backend.clone(), poll, &state.refresh).await {
        Err(err) => { return error_response(&err); },
        Ok(l) => l,
    };
    debug!(%poll_id, "live results stream opened");

    let current = listener.latest();
    let updates = stream::unfold(listener, |mut listener| async move {
        listener.next().await.map(|result| (result, listener))
    });
    let events = stream::once(future::ready(current))
        .chain(updates)
        .map(|result| Event::default().event("results").json_data(&result));

    sse::reply(sse::keep_alive().stream(events)).into_response()
}

async fn visible_poll(state: &AppState, poll_id: &PollId) -> Result<Poll, PollError> {
    let poll = state.polls.read(poll_id).await?;
    if !poll.settings.show_results && !state.polls.can_manage(&poll) {
        return Err(PollError::ResultsHidden(poll.id));
    }
    Ok(poll)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::Config;
    use crate::visitor::VisitorState;
    use crate::voting::{UnvalidatedCreatePoll, UnvalidatedSelection};

    #[tokio::test]
    async fn live_stream_opens_and_closes() {
        let backend = Arc::new(MemoryBackend::new());
        let config = Config {
            bind_addr: [127, 0, 0, 1].into(),
            port: 0,
            database_url: None,
            visitor_state: PathBuf::from("unused.json"),
            static_dir: PathBuf::from("static"),
            notify_interval: Duration::from_millis(10),
        };
        let state = AppState::with_parts(config, backend.clone(), VisitorState::in_memory());
        let poll = state.polls.create(UnvalidatedCreatePoll {
            question: String::from("Colour?"),
            options: vec![String::from("Red"), String::from("Blue")],
            ..Default::default()
        }).await.unwrap();

        let response = live(poll.id, state.clone()).await;
        assert_eq!(response.status(), warp::http::StatusCode::OK);
        assert_eq!(backend.subscriber_count(), 1);

        state.votes.vote(&poll.id, UnvalidatedSelection {
            selected_options: vec![String::from("Red")],
        }).await.unwrap();

        drop(response);
        timeout(Duration::from_secs(2), async {
            while backend.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }).await.unwrap();
    }
}
