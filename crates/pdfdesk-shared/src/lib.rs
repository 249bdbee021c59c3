//! # pdfdesk-shared
//!
//! Types shared by the pdfdesk backend, gateway and admin tooling: user
//! roles, session claims, the signed session token issuer/validator,
//! password hashing and helpers for pulling a session token out of request
//! headers.

pub mod constants;
pub mod error;
pub mod passwords;
pub mod session;
pub mod types;

pub use error::{PasswordError, SessionError};
pub use session::{extract_session_token, parse_lifetime, SessionSigner};
pub use types::{Role, SessionClaims};
