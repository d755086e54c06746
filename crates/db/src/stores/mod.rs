//! Store traits consumed by the API server.
//!
//! Handlers and background jobs only see these traits, so the same code runs
//! against PostgreSQL ([`postgres::PgStore`]) or process memory
//! ([`memory::MemoryStore`]).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use pulseboard_core::error::CoreError;
use pulseboard_core::retry::{PendingRetryRequest, RetryRequest, RetryTransition};
use pulseboard_core::types::{DbId, Timestamp};

use crate::models::retry_request::RetryRequestListQuery;
use crate::models::team::Team;
use crate::models::test_result::{Artifact, CreateArtifact, CreateResult, TestCase, TestResult};

/// Errors returned by any store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain-level failure (not found, illegal transition, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The backing database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Liveness check of the backing storage.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

/// Team lookups used by authentication.
#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn create_team(&self, name: &str, api_key_hash: &str) -> StoreResult<Team>;

    async fn find_team(&self, id: DbId) -> StoreResult<Option<Team>>;

    async fn find_team_by_key_hash(&self, api_key_hash: &str) -> StoreResult<Option<Team>>;
}

/// Test cases, results and artifacts.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Return the team's test case with `title`, creating it on first sight.
    async fn upsert_test_case(
        &self,
        team_id: DbId,
        title: &str,
        file_path: Option<&str>,
    ) -> StoreResult<TestCase>;

    async fn find_test_case(&self, id: DbId) -> StoreResult<Option<TestCase>>;

    async fn create_result(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        input: &CreateResult,
    ) -> StoreResult<TestResult>;

    async fn find_result(&self, id: DbId) -> StoreResult<Option<TestResult>>;

    /// Newest result for `test_case_id` recorded at or after `since`.
    async fn latest_result_since(
        &self,
        test_case_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Option<TestResult>>;

    /// Newest result posted with `retryRequestId = retry_request_id`.
    async fn latest_result_for_retry(
        &self,
        retry_request_id: DbId,
    ) -> StoreResult<Option<TestResult>>;

    async fn create_artifact(
        &self,
        team_id: DbId,
        result_id: DbId,
        input: &CreateArtifact,
    ) -> StoreResult<Artifact>;
}

/// Retry request records and their lifecycle.
#[async_trait]
pub trait RetryRequestStore: Send + Sync {
    /// Insert a new PENDING request with `requested_at = now`.
    async fn create_retry(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        now: Timestamp,
    ) -> StoreResult<RetryRequest>;

    async fn find_retry(&self, id: DbId) -> StoreResult<Option<RetryRequest>>;

    /// PENDING requests of `team_id` that are not yet stale at `now`.
    async fn list_pending(&self, team_id: DbId, now: Timestamp)
        -> StoreResult<Vec<PendingRetryRequest>>;

    /// Apply one lifecycle step.
    ///
    /// Fails with `NotFound`, `InvalidTransition` (record unchanged) or
    /// `Conflict` when the record moved underneath the caller.
    async fn transition(
        &self,
        id: DbId,
        transition: RetryTransition,
        now: Timestamp,
    ) -> StoreResult<RetryRequest>;

    /// Expire every PENDING request that is stale at `now` and return them.
    async fn expire_stale(&self, now: Timestamp) -> StoreResult<Vec<RetryRequest>>;

    /// Page through requests of all teams, newest first.
    async fn list_all(&self, params: &RetryRequestListQuery) -> StoreResult<Vec<RetryRequest>>;
}
