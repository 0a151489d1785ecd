use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::voting::User;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
}

/// The visitor's authenticated account, if any.
///
/// Cloning shares the same session. [`Session::apply`] is the only way to
/// change it; observers subscribe to be told when it does.
#[derive(Clone)]
pub struct Session {
    user: Arc<watch::Sender<Option<User>>>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    pub fn new() -> Session {
        let (user, _) = watch::channel(None);
        Session { user: Arc::new(user) }
    }

    pub fn user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }

    pub fn apply(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(user) => {
                info!(user_id = %user.id, "signed in");
                self.user.send_replace(Some(user));
            }
            AuthEvent::SignedOut => {
                info!("signed out");
                self.user.send_replace(None);
            }
        }
    }
}
