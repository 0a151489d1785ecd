use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub const fn nil() -> $name {
                $name(Uuid::nil())
            }
            pub fn new() -> $name {
                $name(Uuid::new_v4())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                $name(value)
            }
        }
    };
}

uuid_id!(
    /// Server-assigned poll identifier.
    PollId
);
uuid_id!(
    /// Server-assigned vote identifier.
    VoteId
);
uuid_id!(
    /// Account identifier issued by the auth service.
    UserId
);

/// Locally generated visitor marker. Only distinguishes casual repeat visits
/// from the same browser; it is not unique and not a security boundary.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(pub String);

impl AnonymousId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AnonymousId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
