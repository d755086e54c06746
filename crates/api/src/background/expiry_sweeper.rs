//! Periodic expiry of abandoned retry requests.
//!
//! A PENDING request that no watcher picked up within the staleness window
//! is moved to EXPIRED, and `retry:expired` is broadcast to its team and to
//! admins. The bulk update is conditional on PENDING, so a sweep racing a
//! pickup loses cleanly and repeated sweeps expire nothing twice.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pulseboard_core::event_names::EVENT_RETRY_EXPIRED;
use pulseboard_core::retry::RetryRequest;
use pulseboard_core::tasks::RecurringJob;
use pulseboard_core::types::Timestamp;
use pulseboard_db::{RetryRequestStore, StoreResult};
use pulseboard_events::EventBroadcaster;

pub struct ExpirySweeper {
    retries: Arc<dyn RetryRequestStore>,
    broadcaster: Arc<EventBroadcaster>,
}

impl ExpirySweeper {
    pub fn new(retries: Arc<dyn RetryRequestStore>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            retries,
            broadcaster,
        }
    }

    /// Expire everything stale at `now` and announce each expired request.
    pub async fn sweep(&self, now: Timestamp) -> StoreResult<Vec<RetryRequest>> {
        let expired = self.retries.expire_stale(now).await?;

        for request in &expired {
            tracing::info!(
                retry_request_id = request.id,
                team_id = request.team_id,
                requested_at = %request.requested_at,
                "Retry request expired",
            );
            match serde_json::to_value(request) {
                Ok(payload) => {
                    self.broadcaster
                        .broadcast_with_admin(request.team_id, EVENT_RETRY_EXPIRED, payload)
                        .await;
                }
                Err(e) => {
                    tracing::error!(retry_request_id = request.id, error = %e, "Failed to encode expiry event");
                }
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl RecurringJob for ExpirySweeper {
    fn name(&self) -> &'static str {
        "expiry_sweeper"
    }

    async fn tick(&self) {
        match self.sweep(Utc::now()).await {
            Ok(expired) if !expired.is_empty() => {
                tracing::info!(count = expired.len(), "Expiry sweep: expired stale retry requests");
            }
            Ok(_) => tracing::debug!("Expiry sweep: nothing to expire"),
            Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pulseboard_core::retry::{RetryStatus, RetryTransition};
    use pulseboard_db::{MemoryStore, ResultStore};
    use pulseboard_events::{ClientConnection, ConnectionRegistry, ConnectionScope, Outbound};

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        sweeper: ExpirySweeper,
        team_rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
        admin_rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());

        let (team_conn, team_rx) = ClientConnection::new(ConnectionScope::Team(1));
        let (admin_conn, admin_rx) = ClientConnection::new(ConnectionScope::Admin);
        team_conn.open();
        admin_conn.open();
        registry.add_connection(1, team_conn).await;
        registry.add_admin_connection(admin_conn).await;

        let broadcaster = Arc::new(EventBroadcaster::new(registry, "test"));
        let sweeper = ExpirySweeper::new(store.clone(), broadcaster);
        Fixture {
            store,
            sweeper,
            team_rx,
            admin_rx,
        }
    }

    fn event_name(frame: Outbound) -> String {
        let Outbound::Text(text) = frame else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["event"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn stale_requests_expire_and_are_announced() {
        let mut fx = fixture().await;
        let tc = fx.store.upsert_test_case(1, "checkout works", None).await.unwrap();
        let now = Utc::now();
        let stale = fx
            .store
            .create_retry(1, tc.id, now - Duration::minutes(11))
            .await
            .unwrap();
        let fresh = fx
            .store
            .create_retry(1, tc.id, now - Duration::minutes(9))
            .await
            .unwrap();

        let expired = fx.sweeper.sweep(now).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(expired[0].status, RetryStatus::Expired);
        assert_eq!(expired[0].completed_at, Some(now));

        let untouched = fx.store.find_retry(fresh.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, RetryStatus::Pending);

        assert_eq!(event_name(fx.team_rx.try_recv().unwrap()), "retry:expired");
        assert_eq!(event_name(fx.admin_rx.try_recv().unwrap()), "retry:expired");
    }

    #[tokio::test]
    async fn sweeping_twice_expires_nothing_new() {
        let mut fx = fixture().await;
        let tc = fx.store.upsert_test_case(1, "login", None).await.unwrap();
        let now = Utc::now();
        fx.store
            .create_retry(1, tc.id, now - Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(fx.sweeper.sweep(now).await.unwrap().len(), 1);
        assert!(fx.sweeper.sweep(now).await.unwrap().is_empty());

        assert!(fx.team_rx.try_recv().is_ok());
        assert!(fx.team_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn running_requests_are_left_alone() {
        let fx = fixture().await;
        let tc = fx.store.upsert_test_case(1, "search", None).await.unwrap();
        let now = Utc::now();
        let request = fx
            .store
            .create_retry(1, tc.id, now - Duration::minutes(30))
            .await
            .unwrap();
        fx.store
            .transition(request.id, RetryTransition::PickUp, now - Duration::minutes(29))
            .await
            .unwrap();

        assert!(fx.sweeper.sweep(now).await.unwrap().is_empty());
        let current = fx.store.find_retry(request.id).await.unwrap().unwrap();
        assert_eq!(current.status, RetryStatus::Running);
    }
}
