//! The HTTP client for the decision engine's data API.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{PolicyError, PolicyResult};

/// Default bound on a single decision round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous (per-request) client for the decision engine.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct PolicyClient {
    http: reqwest::Client,
    base: String,
}

impl PolicyClient {
    /// Builds a client against `base_url` (e.g. `http://localhost:8181`)
    /// with the given per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> PolicyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PolicyError::unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client with the default 5s timeout.
    pub fn with_defaults(base_url: &str) -> PolicyResult<Self> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    /// Queries `policy_path` with `input` and returns the raw `result`
    /// subtree.
    ///
    /// An HTTP-level failure or timeout is `Unavailable`; a reply without a
    /// `result` member is `Undefined`.
    #[instrument(skip(self, input), fields(policy = policy_path))]
    pub async fn decide(&self, policy_path: &str, input: Value) -> PolicyResult<Value> {
        let url = format!("{}/v1/data{}", self.base, policy_path);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PolicyError::unavailable(format!(
                "decision engine returned {status}"
            )));
        }

        let mut body: Value = response.json().await?;
        match body.get_mut("result") {
            Some(result) => {
                debug!(policy = policy_path, "decision received");
                Ok(result.take())
            }
            None => Err(PolicyError::Undefined),
        }
    }

    /// Queries `policy_path` and decodes the `result` subtree into `T`.
    pub async fn decide_as<T: DeserializeOwned>(
        &self,
        policy_path: &str,
        input: Value,
    ) -> PolicyResult<T> {
        let result = self.decide(policy_path, input).await?;
        serde_json::from_value(result).map_err(|e| PolicyError::malformed(e.to_string()))
    }
}
