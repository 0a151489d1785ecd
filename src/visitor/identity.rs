use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use super::local_state::VisitorState;
use super::session::Session;
use crate::voting::{AnonymousId, User, Voter};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 9;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Identity {
    Authenticated(User),
    Anonymous(AnonymousId),
}

impl From<Identity> for Voter {
    fn from(identity: Identity) -> Self {
        match identity {
            Identity::Authenticated(user) => Voter::User(user.id),
            Identity::Anonymous(id) => Voter::Anonymous(id),
        }
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    session: Session,
    visitor: Arc<VisitorState>,
}

impl IdentityResolver {
    pub fn new(session: Session, visitor: Arc<VisitorState>) -> IdentityResolver {
        IdentityResolver { session, visitor }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn resolve(&self) -> Identity {
        match self.session.user() {
            Some(user) => Identity::Authenticated(user),
            None => Identity::Anonymous(self.anonymous_id().await),
        }
    }

    /// The stored anonymous id, generated and persisted on first use.
    pub async fn anonymous_id(&self) -> AnonymousId {
        if let Some(id) = self.visitor.anonymous_id() {
            return id;
        }

        let first_use = self.visitor.write(|visitor| Ok(visitor.anonymous_id_or_insert_with(generate_logged)));
        match first_use.await {
            Ok(id) => id,
            Err(err) => {
                warn!("Storing anonymous id off the runtime failed: {err}");
                self.visitor.anonymous_id_or_insert_with(generate_logged)
            }
        }
    }
}

fn generate_logged() -> AnonymousId {
    let id = generate_anonymous_id();
    debug!(anonymous_id = %id, "generated anonymous id");
    id
}

/// `anon_` + random base-36 characters + the base-36 millisecond timestamp.
/// Collisions are possible; this only tells casual repeat visits apart.
pub fn generate_anonymous_id() -> AnonymousId {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    AnonymousId(format!("anon_{random}{}", to_base36(millis)))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return String::from("0");
    }
    let mut digits = vec![];
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
