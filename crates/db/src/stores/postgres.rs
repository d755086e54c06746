//! PostgreSQL-backed stores, delegating to the repositories.

use async_trait::async_trait;
use pulseboard_core::error::CoreError;
use pulseboard_core::retry::{stale_cutoff, PendingRetryRequest, RetryRequest, RetryTransition};
use pulseboard_core::types::{DbId, Timestamp};

use super::{ResultStore, RetryRequestStore, StoreHealth, StoreResult, TeamStore};
use crate::models::retry_request::{RetryRequestListQuery, RetryRequestRow};
use crate::models::team::Team;
use crate::models::test_result::{Artifact, CreateArtifact, CreateResult, TestCase, TestResult};
use crate::repositories::{
    ArtifactRepo, RetryRequestRepo, TeamRepo, TestCaseRepo, TestResultRepo,
};
use crate::DbPool;

/// All stores over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn to_domain(rows: Vec<RetryRequestRow>) -> StoreResult<Vec<RetryRequest>> {
    rows.into_iter()
        .map(|row| RetryRequest::try_from(row).map_err(Into::into))
        .collect()
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn create_team(&self, name: &str, api_key_hash: &str) -> StoreResult<Team> {
        Ok(TeamRepo::create(&self.pool, name, api_key_hash).await?)
    }

    async fn find_team(&self, id: DbId) -> StoreResult<Option<Team>> {
        Ok(TeamRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_team_by_key_hash(&self, api_key_hash: &str) -> StoreResult<Option<Team>> {
        Ok(TeamRepo::find_by_api_key_hash(&self.pool, api_key_hash).await?)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn upsert_test_case(
        &self,
        team_id: DbId,
        title: &str,
        file_path: Option<&str>,
    ) -> StoreResult<TestCase> {
        Ok(TestCaseRepo::upsert(&self.pool, team_id, title, file_path).await?)
    }

    async fn find_test_case(&self, id: DbId) -> StoreResult<Option<TestCase>> {
        Ok(TestCaseRepo::find_by_id(&self.pool, id).await?)
    }

    async fn create_result(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        input: &CreateResult,
    ) -> StoreResult<TestResult> {
        Ok(TestResultRepo::create(&self.pool, team_id, test_case_id, input).await?)
    }

    async fn find_result(&self, id: DbId) -> StoreResult<Option<TestResult>> {
        Ok(TestResultRepo::find_by_id(&self.pool, id).await?)
    }

    async fn latest_result_since(
        &self,
        test_case_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Option<TestResult>> {
        Ok(TestResultRepo::latest_since(&self.pool, test_case_id, since).await?)
    }

    async fn latest_result_for_retry(
        &self,
        retry_request_id: DbId,
    ) -> StoreResult<Option<TestResult>> {
        Ok(TestResultRepo::latest_for_retry(&self.pool, retry_request_id).await?)
    }

    async fn create_artifact(
        &self,
        team_id: DbId,
        result_id: DbId,
        input: &CreateArtifact,
    ) -> StoreResult<Artifact> {
        Ok(ArtifactRepo::create(&self.pool, team_id, result_id, input).await?)
    }
}

#[async_trait]
impl RetryRequestStore for PgStore {
    async fn create_retry(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        now: Timestamp,
    ) -> StoreResult<RetryRequest> {
        let row = RetryRequestRepo::create(&self.pool, team_id, test_case_id, now).await?;
        Ok(row.try_into()?)
    }

    async fn find_retry(&self, id: DbId) -> StoreResult<Option<RetryRequest>> {
        match RetryRequestRepo::find_by_id(&self.pool, id).await? {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn list_pending(
        &self,
        team_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<PendingRetryRequest>> {
        let rows = RetryRequestRepo::list_pending(&self.pool, team_id, stale_cutoff(now)).await?;
        rows.into_iter()
            .map(|row| PendingRetryRequest::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn transition(
        &self,
        id: DbId,
        transition: RetryTransition,
        now: Timestamp,
    ) -> StoreResult<RetryRequest> {
        let row = RetryRequestRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "RetryRequest",
                id,
            })?;
        let current = RetryRequest::try_from(row)?;

        let mut next = current.clone();
        next.apply(transition, now)?;

        match RetryRequestRepo::update_if_status(&self.pool, current.status, &next).await? {
            Some(row) => Ok(row.try_into()?),
            None => {
                tracing::warn!(
                    retry_request_id = id,
                    from = %current.status,
                    to = %transition.target(),
                    "Retry request changed concurrently, transition rejected",
                );
                Err(CoreError::Conflict(format!(
                    "retry request {id} changed while moving to {}",
                    transition.target()
                ))
                .into())
            }
        }
    }

    async fn expire_stale(&self, now: Timestamp) -> StoreResult<Vec<RetryRequest>> {
        let rows = RetryRequestRepo::expire_older_than(&self.pool, stale_cutoff(now), now).await?;
        if !rows.is_empty() {
            tracing::debug!(count = rows.len(), "Expired stale retry requests");
        }
        to_domain(rows)
    }

    async fn list_all(&self, params: &RetryRequestListQuery) -> StoreResult<Vec<RetryRequest>> {
        let rows = RetryRequestRepo::list_all(&self.pool, params).await?;
        to_domain(rows)
    }
}
