//! HTTP client for the retry request endpoints of the Pulseboard API.

use async_trait::async_trait;
use pulseboard_core::retry::{PendingRetryRequest, RetryRequest, RetryStatus};
use pulseboard_core::types::DbId;
use serde::Deserialize;

/// Errors talking to the API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// The operations a poll cycle needs from the retry request store.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// PENDING requests of the watcher's team, oldest first.
    async fn list_pending(&self) -> Result<Vec<PendingRetryRequest>, ClientError>;

    async fn mark_running(&self, id: DbId) -> Result<RetryRequest, ClientError>;

    /// Conclude a request. Without `result_id` the API links the newest
    /// result recorded since pickup.
    async fn mark_completed(
        &self,
        id: DbId,
        result_id: Option<DbId>,
    ) -> Result<RetryRequest, ClientError>;
}

#[derive(Deserialize)]
struct DataResponse<T> {
    data: T,
}

/// [`RetryQueue`] over the REST API, authenticated with a team key.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/retry-requests{}", self.base_url, path)
    }

    async fn update_status(
        &self,
        id: DbId,
        status: RetryStatus,
        result_id: Option<DbId>,
    ) -> Result<RetryRequest, ClientError> {
        let body = serde_json::json!({
            "status": status,
            "resultId": result_id,
        });

        let response = self
            .client
            .patch(self.url(&format!("/{id}")))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        parse_data(response).await
    }
}

#[async_trait]
impl RetryQueue for ApiClient {
    async fn list_pending(&self) -> Result<Vec<PendingRetryRequest>, ClientError> {
        let response = self
            .client
            .get(self.url("/pending"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        parse_data(response).await
    }

    async fn mark_running(&self, id: DbId) -> Result<RetryRequest, ClientError> {
        self.update_status(id, RetryStatus::Running, None).await
    }

    async fn mark_completed(
        &self,
        id: DbId,
        result_id: Option<DbId>,
    ) -> Result<RetryRequest, ClientError> {
        self.update_status(id, RetryStatus::Completed, result_id)
            .await
    }
}

/// Unwrap the `{ "data": ... }` envelope of a successful response.
async fn parse_data<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<DataResponse<T>>().await?.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_the_api_prefix() {
        let client = ApiClient::new("http://api:3000", "k");
        assert_eq!(
            client.url("/pending"),
            "http://api:3000/api/v1/retry-requests/pending"
        );
        assert_eq!(client.url("/7"), "http://api:3000/api/v1/retry-requests/7");
    }

    #[test]
    fn pending_envelope_deserializes() {
        let body = serde_json::json!({
            "data": [{
                "id": 3,
                "teamId": 1,
                "testCaseId": 9,
                "status": "PENDING",
                "requestedAt": "2026-01-01T00:00:00Z",
                "pickedUpAt": null,
                "completedAt": null,
                "resultId": null,
                "testTitle": "checkout completes",
                "filePath": "tests/checkout.spec.ts",
            }]
        });

        let parsed: DataResponse<Vec<PendingRetryRequest>> =
            serde_json::from_value(body).unwrap();

        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].request.id, 3);
        assert_eq!(parsed.data[0].test_title, "checkout completes");
    }
}
