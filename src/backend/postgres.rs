//! PostgreSQL backend over diesel.
//!
//! Queries run on a blocking thread pool with connections from an r2d2 pool.
//! Vote inserts reach subscribers through `NOTIFY vote_inserts`, raised by a
//! trigger on `votes` (see `migrations/`), so inserts from any client are
//! relayed, not just those made by this process.

pub mod models;
pub mod schema;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DbError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::accounts::{new_salt, password_digest, verify_password};
use super::decode::{decode_poll, decode_vote, DecodeError};
use super::{Backend, BackendError, PollFilter, VoteFeed, VoteInserted, FEED_CAPACITY};
use crate::voting::{self, Credentials, NewPoll, NewVote, PollChanges, PollId, User};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const NOTIFY_CHANNEL: &str = "vote_inserts";

type PgPool = Pool<ConnectionManager<PgConnection>>;

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        BackendError::Query(value.to_string())
    }
}

pub struct PgBackend {
    pool: PgPool,
    feed: broadcast::Sender<VoteInserted>,
    listening: Arc<AtomicBool>,
}

impl PgBackend {
    /// Opens the pool and starts relaying insert notifications, polling the
    /// listening connection every `notify_interval`.
    pub fn connect(database_url: &str, notify_interval: Duration) -> Result<PgBackend, BackendError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .connection_timeout(CONNECT_TIMEOUT)
            .build(manager)
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        let listening = Arc::new(AtomicBool::new(true));
        spawn_listener(database_url.to_string(), notify_interval, feed.clone(), listening.clone());

        info!("Connected to PostgreSQL");
        Ok(PgBackend { pool, feed, listening })
    }

    async fn run<T, F>(&self, query: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, BackendError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| BackendError::Unavailable(e.to_string()))?;
            query(&mut conn)
        })
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?
    }
}

impl Drop for PgBackend {
    fn drop(&mut self) {
        self.listening.store(false, Ordering::SeqCst);
    }
}

fn spawn_listener(
    database_url: String,
    interval: Duration,
    feed: broadcast::Sender<VoteInserted>,
    listening: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        while listening.load(Ordering::SeqCst) {
            let mut conn = match PgConnection::establish(&database_url) {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("Failed to open notification connection: {err}");
                    thread::sleep(interval * 20);
                    continue;
                }
            };
            if let Err(err) = diesel::sql_query(format!("LISTEN {NOTIFY_CHANNEL}")).execute(&mut conn) {
                warn!("Failed to LISTEN on {NOTIFY_CHANNEL}: {err}");
                thread::sleep(interval * 20);
                continue;
            }
            debug!("Listening on {NOTIFY_CHANNEL}");

            'relay: while listening.load(Ordering::SeqCst) {
                for notification in conn.notifications_iter() {
                    match notification {
                        Ok(notification) => match parse_notification(&notification.payload) {
                            Ok(event) => {
                                let _ = feed.send(event);
                            }
                            Err(err) => warn!("Ignoring notification: {err}"),
                        },
                        Err(err) => {
                            warn!("Notification connection lost: {err}");
                            break 'relay;
                        }
                    }
                }
                thread::sleep(interval);
            }
        }
    });
}

fn parse_notification(payload: &str) -> Result<VoteInserted, DecodeError> {
    serde_json::from_str(payload).map_err(|e| DecodeError::Notification(e.to_string()))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Backend for PgBackend {
    async fn insert_poll(&self, poll: NewPoll) -> Result<voting::Poll, BackendError> {
        let values = models::NewPoll::from(poll);
        self.run(move |conn| {
            let row: models::Poll = diesel::insert_into(schema::polls::table)
                .values(&values)
                .returning(models::Poll::as_returning())
                .get_result(conn)?;
            Ok(decode_poll(row.into())?)
        }).await
    }

    async fn get_poll(&self, id: &PollId) -> Result<Option<voting::Poll>, BackendError> {
        let id = id.0;
        self.run(move |conn| {
            let row: Option<models::Poll> = schema::polls::table
                .find(id)
                .select(models::Poll::as_select())
                .first(conn)
                .optional()?;
            match row {
                Some(row) => Ok(Some(decode_poll(row.into())?)),
                None => Ok(None),
            }
        }).await
    }

    async fn update_poll(&self, id: &PollId, changes: PollChanges) -> Result<Option<voting::Poll>, BackendError> {
        let id = id.0;
        let changes = models::UpdatePoll::from(changes);
        self.run(move |conn| {
            let row: Option<models::Poll> = diesel::update(schema::polls::table.find(id))
                .set(&changes)
                .returning(models::Poll::as_returning())
                .get_result(conn)
                .optional()?;
            match row {
                Some(row) => Ok(Some(decode_poll(row.into())?)),
                None => Ok(None),
            }
        }).await
    }

    async fn delete_poll(&self, id: &PollId) -> Result<bool, BackendError> {
        let id = id.0;
        // votes go with the poll through ON DELETE CASCADE
        self.run(move |conn| {
            let deleted = diesel::delete(schema::polls::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        }).await
    }

    async fn list_polls(&self, filter: &PollFilter) -> Result<Vec<voting::Poll>, BackendError> {
        let owner = filter.owner.map(|id| id.0);
        let ids = filter.ids.as_ref().map(|ids| ids.iter().map(|id| id.0).collect::<Vec<_>>());
        let pattern = filter.search_term().map(escape_like);
        self.run(move |conn| {
            let mut query = schema::polls::table
                .select(models::Poll::as_select())
                .into_boxed();
            if let Some(owner) = owner {
                query = query.filter(schema::polls::created_by.eq(owner));
            }
            if let Some(ids) = ids {
                query = query.filter(schema::polls::id.eq_any(ids));
            }
            if let Some(pattern) = pattern {
                query = query.filter(schema::polls::question.ilike(pattern));
            }

            let rows: Vec<models::Poll> = query
                .order(schema::polls::created_at.desc())
                .load(conn)?;
            rows.into_iter()
                .map(|row| decode_poll(row.into()).map_err(BackendError::from))
                .collect()
        }).await
    }

    async fn count_votes(&self, poll_ids: &[PollId]) -> Result<HashMap<PollId, u64>, BackendError> {
        let ids: Vec<_> = poll_ids.iter().map(|id| id.0).collect();
        self.run(move |conn| {
            let counts: Vec<(uuid::Uuid, i64)> = schema::votes::table
                .filter(schema::votes::poll_id.eq_any(ids))
                .group_by(schema::votes::poll_id)
                .select((schema::votes::poll_id, count_star()))
                .load(conn)?;
            Ok(counts.into_iter()
                .map(|(id, count)| (PollId(id), count.max(0) as u64))
                .collect())
        }).await
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<voting::Vote, BackendError> {
        let values = models::NewVote::from(vote);
        self.run(move |conn| {
            let row: models::Vote = diesel::insert_into(schema::votes::table)
                .values(&values)
                .returning(models::Vote::as_returning())
                .get_result(conn)?;
            Ok(decode_vote(row.into())?)
        }).await
    }

    async fn list_votes(&self, poll_id: &PollId) -> Result<Vec<voting::Vote>, BackendError> {
        let poll_id = poll_id.0;
        self.run(move |conn| {
            let rows: Vec<models::Vote> = schema::votes::table
                .filter(schema::votes::poll_id.eq(poll_id))
                .order(schema::votes::created_at.asc())
                .select(models::Vote::as_select())
                .load(conn)?;
            rows.into_iter()
                .map(|row| decode_vote(row.into()).map_err(BackendError::from))
                .collect()
        }).await
    }

    fn subscribe_votes(&self, poll_id: &PollId) -> Result<VoteFeed, BackendError> {
        Ok(VoteFeed::new(*poll_id, self.feed.subscribe()))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<User, BackendError> {
        let salt = new_salt();
        let account = models::NewAccount {
            email: credentials.email.clone(),
            password_digest: password_digest(&salt, &credentials.password),
            salt,
        };
        self.run(move |conn| {
            let inserted: Result<models::Account, DbError> = diesel::insert_into(schema::accounts::table)
                .values(&account)
                .returning(models::Account::as_returning())
                .get_result(conn);
            match inserted {
                Ok(account) => Ok(account.into()),
                Err(DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    Err(BackendError::Auth(format!("{} is already registered", account.email)))
                }
                Err(err) => Err(err.into()),
            }
        }).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, BackendError> {
        let credentials = credentials.clone();
        self.run(move |conn| {
            let account: Option<models::Account> = schema::accounts::table
                .filter(schema::accounts::email.eq(&credentials.email))
                .select(models::Account::as_select())
                .first(conn)
                .optional()?;
            match account {
                Some(account) if verify_password(&account.salt, &credentials.password, &account.password_digest) => {
                    Ok(account.into())
                }
                _ => Err(BackendError::Auth(String::from("invalid email or password"))),
            }
        }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::VoteId;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("pizza"), "%pizza%");
        assert_eq!(escape_like("100%_done\\"), "%100\\%\\_done\\\\%");
    }

    #[test]
    fn parses_trigger_payload() {
        let id = VoteId::new();
        let poll_id = PollId::new();
        let payload = format!(r#"{{"id":"{id}","poll_id":"{poll_id}"}}"#);
        assert_eq!(parse_notification(&payload), Ok(VoteInserted { id, poll_id }));
        assert!(parse_notification("not json").is_err());
    }
}
