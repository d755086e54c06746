//! Broker channel naming.
//!
//! Every team gets its own channel (`team:<id>:events`); admin fan-out uses a
//! single fixed channel. Subscribers listen on the team wildcard pattern plus
//! the admin channel.

use crate::types::DbId;

/// Fixed channel carrying admin-scoped events.
pub const ADMIN_CHANNEL: &str = "admin:events";

/// Pattern matching every team channel.
pub const TEAM_CHANNEL_PATTERN: &str = "team:*:events";

const TEAM_PREFIX: &str = "team:";
const TEAM_SUFFIX: &str = ":events";

/// Channel name for a single team.
pub fn team_channel(team_id: DbId) -> String {
    format!("{TEAM_PREFIX}{team_id}{TEAM_SUFFIX}")
}

/// Extract the team id from a team channel name.
///
/// Returns `None` for anything that is not exactly `team:<integer>:events`.
pub fn parse_team_channel(channel: &str) -> Option<DbId> {
    channel
        .strip_prefix(TEAM_PREFIX)?
        .strip_suffix(TEAM_SUFFIX)?
        .parse()
        .ok()
}
