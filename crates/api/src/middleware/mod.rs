//! Authentication extractors.
//!
//! - [`auth::TeamAuth`] -- Resolves the team owning a Bearer API key.
//! - [`auth::RequireAdmin`] -- Requires the configured admin key.

pub mod auth;
