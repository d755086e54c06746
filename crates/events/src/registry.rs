use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use pulseboard_core::types::DbId;
use tokio::sync::RwLock;

use crate::connection::{ClientConnection, ConnectionId, Outbound};

/// Close code sent to every client when the server shuts down.
const GOING_AWAY: u16 = 1001;

type ConnectionMap = HashMap<ConnectionId, Arc<ClientConnection>>;

/// Open client connections on this instance.
///
/// Team connections are bucketed by team id; admin connections see every
/// team. Connections that refuse a frame are pruned during the send, so the
/// registry never keeps delivering to a dead socket.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct ConnectionRegistry {
    teams: RwLock<HashMap<DbId, ConnectionMap>>,
    admins: RwLock<ConnectionMap>,
    team_names: RwLock<HashMap<DbId, String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            admins: RwLock::new(HashMap::new()),
            team_names: RwLock::new(HashMap::new()),
        }
    }

    /// Register a team-scoped connection. Adding the same connection twice
    /// is a no-op; returns whether it was newly added.
    pub async fn add_connection(&self, team_id: DbId, conn: Arc<ClientConnection>) -> bool {
        let mut teams = self.teams.write().await;
        let bucket = teams.entry(team_id).or_default();
        if bucket.contains_key(&conn.id()) {
            return false;
        }
        bucket.insert(conn.id(), conn);
        true
    }

    /// Unregister a team-scoped connection. Removing an unknown connection is
    /// a no-op; an emptied team bucket is dropped.
    pub async fn remove_connection(&self, team_id: DbId, conn_id: ConnectionId) -> bool {
        let mut teams = self.teams.write().await;
        let Some(bucket) = teams.get_mut(&team_id) else {
            return false;
        };
        let removed = bucket.remove(&conn_id).is_some();
        if bucket.is_empty() {
            teams.remove(&team_id);
        }
        removed
    }

    pub async fn add_admin_connection(&self, conn: Arc<ClientConnection>) -> bool {
        let mut admins = self.admins.write().await;
        if admins.contains_key(&conn.id()) {
            return false;
        }
        admins.insert(conn.id(), conn);
        true
    }

    pub async fn remove_admin_connection(&self, conn_id: ConnectionId) -> bool {
        self.admins.write().await.remove(&conn_id).is_some()
    }

    /// Remember a team's display name for admin event enrichment.
    pub async fn register_team_name(&self, team_id: DbId, name: &str) {
        self.team_names
            .write()
            .await
            .insert(team_id, name.to_string());
    }

    pub async fn team_name(&self, team_id: DbId) -> Option<String> {
        self.team_names.read().await.get(&team_id).cloned()
    }

    /// Deliver a serialized event to every open connection of `team_id` on
    /// this instance. Never touches the broker.
    ///
    /// Returns the number of connections the frame was queued for.
    pub async fn send_local(&self, team_id: DbId, raw: &str) -> usize {
        let (delivered, failed) = {
            let teams = self.teams.read().await;
            match teams.get(&team_id) {
                Some(bucket) => deliver(bucket, raw),
                None => return 0,
            }
        };

        if !failed.is_empty() {
            let mut teams = self.teams.write().await;
            if let Some(bucket) = teams.get_mut(&team_id) {
                for id in &failed {
                    bucket.remove(id);
                }
                if bucket.is_empty() {
                    teams.remove(&team_id);
                }
            }
            tracing::debug!(team_id, pruned = failed.len(), "Pruned closed team connections");
        }
        delivered
    }

    /// Deliver a serialized event to every open admin connection on this
    /// instance. Never touches the broker.
    ///
    /// When the event's `data.teamId` names a team with a registered display
    /// name, `data.teamName` is added before delivery.
    pub async fn send_local_admin(&self, raw: &str) -> usize {
        let frame = {
            let names = self.team_names.read().await;
            enrich_with_team_name(raw, &names)
        };

        let (delivered, failed) = {
            let admins = self.admins.read().await;
            if admins.is_empty() {
                return 0;
            }
            deliver(&admins, &frame)
        };

        if !failed.is_empty() {
            let mut admins = self.admins.write().await;
            for id in &failed {
                admins.remove(id);
            }
            tracing::debug!(pruned = failed.len(), "Pruned closed admin connections");
        }
        delivered
    }

    /// Total open connections, team and admin.
    pub async fn connection_count(&self) -> usize {
        let teams: usize = self.teams.read().await.values().map(HashMap::len).sum();
        teams + self.admins.read().await.len()
    }

    pub async fn team_connection_count(&self, team_id: DbId) -> usize {
        self.teams
            .read()
            .await
            .get(&team_id)
            .map_or(0, HashMap::len)
    }

    pub async fn admin_connection_count(&self) -> usize {
        self.admins.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let teams = self.teams.read().await;
        for conn in teams.values().flat_map(HashMap::values) {
            let _ = conn.send(Outbound::Ping);
        }
        drop(teams);

        for conn in self.admins.read().await.values() {
            let _ = conn.send(Outbound::Ping);
        }
    }

    /// Send a Close frame to every connection, then clear the registry.
    pub async fn shutdown_all(&self) {
        let mut teams = self.teams.write().await;
        let mut admins = self.admins.write().await;

        let count = teams.values().map(HashMap::len).sum::<usize>() + admins.len();
        for conn in teams.values().flat_map(HashMap::values).chain(admins.values()) {
            conn.close_with(GOING_AWAY, "server shutting down");
        }
        teams.clear();
        admins.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue `raw` on each connection, returning the delivered count and the ids
/// that refused it.
fn deliver(conns: &ConnectionMap, raw: &str) -> (usize, Vec<ConnectionId>) {
    let mut delivered = 0;
    let mut failed = Vec::new();
    for (id, conn) in conns {
        match conn.send_text(raw) {
            Ok(()) => delivered += 1,
            Err(_) => failed.push(*id),
        }
    }
    (delivered, failed)
}

/// Add `data.teamName` when `data.teamId` has a known name. Anything that is
/// not an object envelope passes through untouched.
fn enrich_with_team_name<'a>(raw: &'a str, names: &HashMap<DbId, String>) -> Cow<'a, str> {
    if names.is_empty() {
        return Cow::Borrowed(raw);
    }
    let Ok(mut envelope) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Cow::Borrowed(raw);
    };
    let Some(data) = envelope.get_mut("data").and_then(|d| d.as_object_mut()) else {
        return Cow::Borrowed(raw);
    };
    if data.contains_key("teamName") {
        return Cow::Borrowed(raw);
    }
    let Some(name) = data
        .get("teamId")
        .and_then(serde_json::Value::as_i64)
        .and_then(|id| names.get(&id))
    else {
        return Cow::Borrowed(raw);
    };
    data.insert("teamName".into(), serde_json::Value::String(name.clone()));
    match serde_json::to_string(&envelope) {
        Ok(text) => Cow::Owned(text),
        Err(_) => Cow::Borrowed(raw),
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::connection::{ConnectionScope, ConnectionState};

    fn open(scope: ConnectionScope) -> (Arc<ClientConnection>, UnboundedReceiver<Outbound>) {
        let (conn, rx) = ClientConnection::new(scope);
        conn.open();
        (conn, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    // ---------------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------------

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(ConnectionScope::Team(1));

        assert!(registry.add_connection(1, conn.clone()).await);
        assert!(!registry.add_connection(1, conn.clone()).await);
        assert_eq!(registry.team_connection_count(1).await, 1);

        assert!(registry.remove_connection(1, conn.id()).await);
        assert!(!registry.remove_connection(1, conn.id()).await);
        assert!(!registry.remove_connection(99, conn.id()).await);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn counts_cover_teams_and_admins() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = open(ConnectionScope::Team(1));
        let (b, _rb) = open(ConnectionScope::Team(2));
        let (admin, _rc) = open(ConnectionScope::Admin);

        registry.add_connection(1, a).await;
        registry.add_connection(2, b).await;
        registry.add_admin_connection(admin.clone()).await;

        assert_eq!(registry.connection_count().await, 3);
        assert_eq!(registry.admin_connection_count().await, 1);

        assert!(registry.remove_admin_connection(admin.id()).await);
        assert_eq!(registry.connection_count().await, 2);
    }

    // ---------------------------------------------------------------------------
    // Local delivery
    // ---------------------------------------------------------------------------

    #[tokio::test]
    async fn send_local_reaches_only_that_team() {
        let registry = ConnectionRegistry::new();
        let (a, mut ra) = open(ConnectionScope::Team(1));
        let (b, mut rb) = open(ConnectionScope::Team(2));
        let (admin, mut radmin) = open(ConnectionScope::Admin);
        registry.add_connection(1, a).await;
        registry.add_connection(2, b).await;
        registry.add_admin_connection(admin).await;

        assert_eq!(registry.send_local(1, "hello").await, 1);

        assert_eq!(drain(&mut ra), vec![Outbound::Text("hello".into())]);
        assert!(drain(&mut rb).is_empty());
        assert!(drain(&mut radmin).is_empty());
    }

    #[tokio::test]
    async fn send_local_to_unknown_team_is_a_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.send_local(42, "x").await, 0);
    }

    #[tokio::test]
    async fn frames_arrive_in_send_order() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = open(ConnectionScope::Team(1));
        registry.add_connection(1, conn).await;

        for i in 0..5 {
            registry.send_local(1, &i.to_string()).await;
        }

        let texts: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|frame| match frame {
                Outbound::Text(text) => text,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(texts, ["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn failed_team_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let (alive, mut ralive) = open(ConnectionScope::Team(1));
        let (dead, rdead) = open(ConnectionScope::Team(1));
        let (closed, _rclosed) = open(ConnectionScope::Team(1));
        registry.add_connection(1, alive).await;
        registry.add_connection(1, dead.clone()).await;
        registry.add_connection(1, closed.clone()).await;
        drop(rdead);
        closed.close();

        assert_eq!(registry.send_local(1, "evt").await, 1);
        assert_eq!(registry.team_connection_count(1).await, 1);
        assert_eq!(dead.state(), ConnectionState::Closed);
        assert_eq!(drain(&mut ralive).len(), 1);
    }

    #[tokio::test]
    async fn failed_admin_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let (dead, rdead) = open(ConnectionScope::Admin);
        registry.add_admin_connection(dead).await;
        drop(rdead);

        assert_eq!(registry.send_local_admin("{}").await, 0);
        assert_eq!(registry.admin_connection_count().await, 0);
    }

    // ---------------------------------------------------------------------------
    // Admin enrichment
    // ---------------------------------------------------------------------------

    #[tokio::test]
    async fn admin_events_gain_registered_team_name() {
        let registry = ConnectionRegistry::new();
        let (admin, mut rx) = open(ConnectionScope::Admin);
        registry.add_admin_connection(admin).await;
        registry.register_team_name(7, "Checkout").await;

        let raw = r#"{"event":"result:new","data":{"teamId":7},"timestamp":"2026-01-01T00:00:00Z"}"#;
        registry.send_local_admin(raw).await;

        let Outbound::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["teamName"], "Checkout");
        assert_eq!(value["data"]["teamId"], 7);
        assert_eq!(value["event"], "result:new");
    }

    #[test]
    fn enrichment_leaves_unknown_and_malformed_frames_alone() {
        let names = HashMap::from([(7, "Checkout".to_string())]);

        let unknown = r#"{"event":"x","data":{"teamId":8}}"#;
        assert!(matches!(enrich_with_team_name(unknown, &names), Cow::Borrowed(_)));

        let named = r#"{"event":"x","data":{"teamId":7,"teamName":"Other"}}"#;
        assert!(matches!(enrich_with_team_name(named, &names), Cow::Borrowed(_)));

        assert_eq!(enrich_with_team_name("not json", &names), "not json");
    }

    // ---------------------------------------------------------------------------
    // Heartbeat and shutdown
    // ---------------------------------------------------------------------------

    #[tokio::test]
    async fn ping_all_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let (team, mut rteam) = open(ConnectionScope::Team(1));
        let (admin, mut radmin) = open(ConnectionScope::Admin);
        registry.add_connection(1, team).await;
        registry.add_admin_connection(admin).await;

        registry.ping_all().await;

        assert_eq!(drain(&mut rteam), vec![Outbound::Ping]);
        assert_eq!(drain(&mut radmin), vec![Outbound::Ping]);
    }

    #[tokio::test]
    async fn shutdown_closes_and_clears() {
        let registry = ConnectionRegistry::new();
        let (team, mut rteam) = open(ConnectionScope::Team(1));
        registry.add_connection(1, team.clone()).await;

        registry.shutdown_all().await;

        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(team.state(), ConnectionState::Closed);
        assert!(matches!(
            rteam.try_recv().unwrap(),
            Outbound::Close { code: 1001, .. }
        ));
    }
}
