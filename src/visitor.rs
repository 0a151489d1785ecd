//! Everything that belongs to the one visitor this process serves: who they
//! are and what they have done from this browser.

pub mod identity;
pub mod local_state;
pub mod session;

pub use identity::{generate_anonymous_id, Identity, IdentityResolver};
pub use local_state::{FileStore, LocalStore, MemoryStore, StoreError, VisitorState};
pub use session::{AuthEvent, Session};
