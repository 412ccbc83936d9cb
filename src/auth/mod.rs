//! Authentication Module
//!
//! Cross-node login handshake.
//!
//! ```text
//!  client ──LOGIN──► origin node ──AUTHENTICATION──► authority (owner of pId 0)
//!                         ▲                               │ resolve()
//!                         └──────AUTHENTICATION_ACK───────┘
//!  client ◄──reply── origin node
//! ```
//!
//! ## Responsibilities
//! - Pending-login registry with timeout sweep ([`AuthRegistry`])
//! - AUTHENTICATION / AUTHENTICATION_ACK codecs ([`message`])
//! - Identity, role and database id resolution ([`resolve`])
//! - Login request validation ([`validate_login`])

mod context;
pub mod message;
mod resolver;

pub use context::{AuthKey, AuthRegistry, AuthenticationContext};
pub use message::{AuthHeader, AuthenticationAck, AuthenticationRequest};
pub use resolver::{resolve, Resolution};

use crate::error::{codes, Result, TxnError};

/// Longest accepted user, database or application name
pub const MAX_NAME_LENGTH: usize = 64;

/// Check the shape of a LOGIN request
pub fn validate_login(
    user_name: &str,
    digest: &str,
    db_name: &str,
    application_name: &str,
) -> Result<()> {
    if user_name.is_empty() {
        return Err(TxnError::user(codes::INVALID_REQUEST, "User name is empty"));
    }
    check_name("user name", user_name, false)?;
    check_name("database name", db_name, false)?;
    check_name("application name", application_name, true)?;
    if digest.len() > MAX_NAME_LENGTH {
        return Err(TxnError::user(
            codes::INVALID_REQUEST,
            format!("Digest too long ({} > {})", digest.len(), MAX_NAME_LENGTH),
        ));
    }
    Ok(())
}

fn check_name(what: &str, value: &str, allow_space: bool) -> Result<()> {
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(TxnError::user(
            codes::INVALID_REQUEST,
            format!("{} too long (limit={})", what, MAX_NAME_LENGTH),
        ));
    }
    let invalid = value
        .chars()
        .find(|c| c.is_control() || (!allow_space && c.is_whitespace()) || *c == ':');
    if let Some(c) = invalid {
        return Err(TxnError::user(
            codes::INVALID_REQUEST,
            format!("{} contains invalid character {:?}", what, c),
        ));
    }
    Ok(())
}
