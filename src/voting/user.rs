use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use super::id::UserId;
use crate::error::{self, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

impl User {
    pub const fn new(id: UserId, email: String) -> User {
        User {
            id,
            email,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct UnvalidatedCredentials {
    pub email: String,
    pub password: String,
}

/// Login or registration input. The email is trimmed and lowercased.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl TryFrom<UnvalidatedCredentials> for Credentials {
    type Error = ValidationError;
    fn try_from(value: UnvalidatedCredentials) -> Result<Self, Self::Error> {
        let UnvalidatedCredentials { email, password } = value;

        let email = email.trim().to_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(error::credentials_email_invalid(&email)),
        }

        let len = password.chars().count();
        if len < MIN_PASSWORD_LEN {
            return Err(error::credentials_password_too_short(MIN_PASSWORD_LEN, len));
        }

        Ok(Credentials { email, password })
    }
}
