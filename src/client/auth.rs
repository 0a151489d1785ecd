use std::convert::TryFrom;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::backend::{Backend, BackendError};
use crate::error::ValidationError;
use crate::visitor::{AuthEvent, Session};
use crate::voting::{Credentials, UnvalidatedCredentials, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Signs the visitor in and out, publishing each change on the [`Session`].
#[derive(Clone)]
pub struct Authenticator {
    backend: Arc<dyn Backend>,
    session: Session,
}

impl Authenticator {
    pub fn new(backend: Arc<dyn Backend>, session: Session) -> Authenticator {
        Authenticator { backend, session }
    }

    /// Creates an account and signs straight into it.
    pub async fn register(&self, credentials: UnvalidatedCredentials) -> Result<User, AuthError> {
        let credentials = Credentials::try_from(credentials)?;
        let user = self.backend.sign_up(&credentials).await
            .inspect_err(|err| warn!("Registration failed: {err}"))?;
        self.session.apply(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    pub async fn login(&self, credentials: UnvalidatedCredentials) -> Result<User, AuthError> {
        let credentials = Credentials::try_from(credentials)?;
        let user = self.backend.sign_in(&credentials).await
            .inspect_err(|err| warn!("Login failed: {err}"))?;
        self.session.apply(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    pub fn logout(&self) {
        self.session.apply(AuthEvent::SignedOut);
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }
}
