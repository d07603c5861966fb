//! Authentication and session lifecycle for restaurant back offices.
//!
//! Administrators log in with a password and receive a short-lived PASETO
//! access token plus a long-lived refresh cookie. Refresh tokens rotate on
//! every use; presenting a superseded one revokes the whole session.
//! Invitations and password resets use single-use tokens, and every
//! security-relevant action lands in an append-only audit log.

pub mod api;
pub mod auth;
pub mod cli;
pub mod email;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
