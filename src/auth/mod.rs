// Authentication module
// Manages login and the session token lifecycle

mod login;
mod manager;
mod types;

pub use login::{normalize_scheme, parse_token};
pub use manager::AuthManager;
pub use types::{Credentials, SessionToken, DEFAULT_SCHEME, TOKEN_FIELDS};
