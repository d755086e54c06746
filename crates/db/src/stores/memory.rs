//! In-process stores.
//!
//! Mirror the PostgreSQL semantics (unique test titles per team, conditional
//! status transitions, stale filtering) without a database. Used by the API
//! test harness and by unit tests of anything built on the store traits.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use pulseboard_core::error::CoreError;
use pulseboard_core::retry::{
    stale_cutoff, PendingRetryRequest, RetryRequest, RetryStatus, RetryTransition,
};
use pulseboard_core::types::{DbId, Timestamp};

use super::{ResultStore, RetryRequestStore, StoreHealth, StoreResult, TeamStore};
use crate::models::retry_request::RetryRequestListQuery;
use crate::models::team::Team;
use crate::models::test_result::{Artifact, CreateArtifact, CreateResult, TestCase, TestResult};

#[derive(Default)]
struct State {
    next_id: DbId,
    teams: BTreeMap<DbId, Team>,
    test_cases: BTreeMap<DbId, TestCase>,
    results: BTreeMap<DbId, TestResult>,
    artifacts: BTreeMap<DbId, Artifact>,
    retries: BTreeMap<DbId, RetryRequest>,
}

impl State {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Every store trait over shared in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn create_team(&self, name: &str, api_key_hash: &str) -> StoreResult<Team> {
        let mut state = self.state();
        if state.teams.values().any(|t| t.api_key_hash == api_key_hash) {
            return Err(CoreError::Conflict("API key already in use".into()).into());
        }
        let team = Team {
            id: state.allocate_id(),
            name: name.to_string(),
            api_key_hash: api_key_hash.to_string(),
            created_at: Utc::now(),
        };
        state.teams.insert(team.id, team.clone());
        Ok(team)
    }

    async fn find_team(&self, id: DbId) -> StoreResult<Option<Team>> {
        Ok(self.state().teams.get(&id).cloned())
    }

    async fn find_team_by_key_hash(&self, api_key_hash: &str) -> StoreResult<Option<Team>> {
        Ok(self
            .state()
            .teams
            .values()
            .find(|t| t.api_key_hash == api_key_hash)
            .cloned())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn upsert_test_case(
        &self,
        team_id: DbId,
        title: &str,
        file_path: Option<&str>,
    ) -> StoreResult<TestCase> {
        let mut state = self.state();

        if let Some(existing) = state
            .test_cases
            .values_mut()
            .find(|tc| tc.team_id == team_id && tc.title == title)
        {
            if let Some(path) = file_path {
                existing.file_path = Some(path.to_string());
            }
            return Ok(existing.clone());
        }

        let test_case = TestCase {
            id: state.allocate_id(),
            team_id,
            title: title.to_string(),
            file_path: file_path.map(str::to_string),
            created_at: Utc::now(),
        };
        state.test_cases.insert(test_case.id, test_case.clone());
        Ok(test_case)
    }

    async fn find_test_case(&self, id: DbId) -> StoreResult<Option<TestCase>> {
        Ok(self.state().test_cases.get(&id).cloned())
    }

    async fn create_result(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        input: &CreateResult,
    ) -> StoreResult<TestResult> {
        let mut state = self.state();
        let result = TestResult {
            id: state.allocate_id(),
            team_id,
            test_case_id,
            status: input.status,
            duration_ms: input.duration_ms,
            error_message: input.error_message.clone(),
            retry_request_id: input.retry_request_id,
            created_at: Utc::now(),
        };
        state.results.insert(result.id, result.clone());
        Ok(result)
    }

    async fn find_result(&self, id: DbId) -> StoreResult<Option<TestResult>> {
        Ok(self.state().results.get(&id).cloned())
    }

    async fn latest_result_since(
        &self,
        test_case_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Option<TestResult>> {
        Ok(self
            .state()
            .results
            .values()
            .filter(|r| r.test_case_id == test_case_id && r.created_at >= since)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn latest_result_for_retry(
        &self,
        retry_request_id: DbId,
    ) -> StoreResult<Option<TestResult>> {
        Ok(self
            .state()
            .results
            .values()
            .filter(|r| r.retry_request_id == Some(retry_request_id))
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn create_artifact(
        &self,
        team_id: DbId,
        result_id: DbId,
        input: &CreateArtifact,
    ) -> StoreResult<Artifact> {
        let mut state = self.state();
        let artifact = Artifact {
            id: state.allocate_id(),
            team_id,
            result_id,
            name: input.name.clone(),
            content_type: input.content_type.clone(),
            storage_key: input.storage_key.clone(),
            created_at: Utc::now(),
        };
        state.artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }
}

#[async_trait]
impl RetryRequestStore for MemoryStore {
    async fn create_retry(
        &self,
        team_id: DbId,
        test_case_id: DbId,
        now: Timestamp,
    ) -> StoreResult<RetryRequest> {
        let mut state = self.state();
        let request = RetryRequest::pending(state.allocate_id(), team_id, test_case_id, now);
        state.retries.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_retry(&self, id: DbId) -> StoreResult<Option<RetryRequest>> {
        Ok(self.state().retries.get(&id).cloned())
    }

    async fn list_pending(
        &self,
        team_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<PendingRetryRequest>> {
        let state = self.state();
        let cutoff = stale_cutoff(now);

        let mut pending: Vec<PendingRetryRequest> = state
            .retries
            .values()
            .filter(|r| {
                r.team_id == team_id
                    && r.status == RetryStatus::Pending
                    && r.requested_at >= cutoff
            })
            .map(|r| {
                let test_case = state.test_cases.get(&r.test_case_id);
                PendingRetryRequest {
                    request: r.clone(),
                    test_title: test_case.map(|tc| tc.title.clone()).unwrap_or_default(),
                    file_path: test_case.and_then(|tc| tc.file_path.clone()),
                }
            })
            .collect();

        pending.sort_by_key(|p| (p.request.requested_at, p.request.id));
        Ok(pending)
    }

    async fn transition(
        &self,
        id: DbId,
        transition: RetryTransition,
        now: Timestamp,
    ) -> StoreResult<RetryRequest> {
        let mut state = self.state();
        let request = state.retries.get_mut(&id).ok_or(CoreError::NotFound {
            entity: "RetryRequest",
            id,
        })?;
        request.apply(transition, now)?;
        Ok(request.clone())
    }

    async fn expire_stale(&self, now: Timestamp) -> StoreResult<Vec<RetryRequest>> {
        let mut state = self.state();
        let mut expired = Vec::new();

        for request in state.retries.values_mut() {
            if request.is_stale(now) {
                request.apply(RetryTransition::Expire, now)?;
                expired.push(request.clone());
            }
        }
        Ok(expired)
    }

    async fn list_all(&self, params: &RetryRequestListQuery) -> StoreResult<Vec<RetryRequest>> {
        let state = self.state();

        let mut all: Vec<RetryRequest> = state
            .retries
            .values()
            .filter(|r| params.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        all.sort_by(|a, b| (b.requested_at, b.id).cmp(&(a.requested_at, a.id)));

        Ok(all
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
