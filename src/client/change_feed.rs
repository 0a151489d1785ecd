//! Live results for one open poll view.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{Backend, FeedEvent};
use crate::error::PollError;
use crate::voting::{Poll, PollId, PollResult};

const REFRESH_CAPACITY: usize = 64;

/// Local requests for open listeners to re-fetch a poll's votes, raised after
/// this visitor's own vote lands.
#[derive(Clone)]
pub struct RefreshBus {
    requests: broadcast::Sender<PollId>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        RefreshBus::new()
    }
}

impl RefreshBus {
    pub fn new() -> RefreshBus {
        let (requests, _) = broadcast::channel(REFRESH_CAPACITY);
        RefreshBus { requests }
    }

    pub fn request(&self, poll_id: PollId) {
        // nobody listening is fine
        let _ = self.requests.send(poll_id);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollId> {
        self.requests.subscribe()
    }
}

/// Keeps a [`PollResult`] current while it is alive.
///
/// Every insert notification for the poll, and every refresh request for it,
/// triggers a full re-fetch of the poll's votes followed by a fresh tally.
/// Re-fetching rather than applying deltas means a repeated notification
/// changes nothing. Dropping the listener cancels its task, which releases
/// the backend subscription.
pub struct ChangeFeedListener {
    poll_id: PollId,
    results: watch::Receiver<PollResult>,
    task: JoinHandle<()>,
}

impl ChangeFeedListener {
    pub async fn start(backend: Arc<dyn Backend>, poll: Poll, refresh: &RefreshBus) -> Result<ChangeFeedListener, PollError> {
        // subscribe before the first fetch so no insert falls in between
        let mut feed = backend.subscribe_votes(&poll.id)?;
        let mut requests = refresh.subscribe();
        let bus = refresh.clone();

        let votes = backend.list_votes(&poll.id).await?;
        let (publish, results) = watch::channel(PollResult::evaluate(&poll, &votes));
        let poll_id = poll.id;
        debug!(%poll_id, "change feed listener started");

        let task = tokio::spawn(async move {
            // holding a sender keeps `requests` from ever reporting Closed
            let _bus = bus;
            loop {
                tokio::select! {
                    event = feed.next() => match event {
                        Some(FeedEvent::Inserted(inserted)) => {
                            debug!(%poll_id, vote_id = %inserted.id, "vote insert notification");
                        }
                        Some(FeedEvent::Lagged(_)) => {}
                        None => {
                            debug!(%poll_id, "vote feed closed");
                            break;
                        }
                    },
                    request = requests.recv() => match request {
                        Ok(id) if id == poll_id => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }

                match backend.list_votes(&poll_id).await {
                    Ok(votes) => {
                        publish.send_replace(PollResult::evaluate(&poll, &votes));
                    }
                    Err(err) => warn!(%poll_id, "Failed to refresh results: {err}"),
                }
            }
        });

        Ok(ChangeFeedListener { poll_id, results, task })
    }

    pub fn latest(&self) -> PollResult {
        self.results.borrow().clone()
    }

    /// Waits for the next published result. `None` once the listener task
    /// has stopped.
    pub async fn next(&mut self) -> Option<PollResult> {
        self.results.changed().await.ok()?;
        Some(self.results.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for ChangeFeedListener {
    fn drop(&mut self) {
        self.task.abort();
        debug!(poll_id = %self.poll_id, "change feed listener stopped");
    }
}
