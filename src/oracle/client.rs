use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    AnswersRequest, GenerateQuestionRequest, GeneratedQuestion, OracleEnvelope, StageLimits,
    SymptomCandidate,
};
use super::Oracle;
use crate::config::{OracleConfig, RequestConfig};
use crate::error::{OracleError, OracleResult};

/// HTTP client for the question oracle
#[derive(Clone)]
pub struct OracleClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl OracleClient {
    /// Create a new oracle client
    pub fn new(config: &OracleConfig, request_config: RequestConfig) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(OracleError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run an oracle operation with retries and exponential backoff.
    ///
    /// `build` is invoked once per attempt because a sent request cannot be reused.
    async fn call<T, F>(&self, operation: &str, build: F) -> OracleResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying oracle request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute(operation, build()).await {
                Ok(data) => {
                    info!(
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Oracle call succeeded"
                    );
                    return Ok(data);
                }
                Err(e) => {
                    error!(
                        operation = %operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Oracle call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        match last_error {
            Some(OracleError::Timeout { timeout_ms }) => Err(OracleError::Timeout { timeout_ms }),
            other => Err(OracleError::Unavailable {
                message: other
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries: retries.saturating_sub(1),
            }),
        }
    }

    /// Execute a single request and unwrap the response envelope
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> OracleResult<T> {
        debug!(operation = %operation, "Calling oracle");

        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    OracleError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let envelope: OracleEnvelope<T> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                OracleError::InvalidResponse {
                    message: format!("Failed to parse {} response: {}", operation, e),
                }
            }
        })?;

        if envelope.error {
            return Err(OracleError::Rejected {
                operation: operation.to_string(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "no message".to_string()),
            });
        }

        envelope.data.ok_or_else(|| OracleError::InvalidResponse {
            message: format!("{} response has no data", operation),
        })
    }
}

#[async_trait]
impl Oracle for OracleClient {
    async fn generate_question(
        &self,
        index: u32,
        prior_answer: &str,
        disorder_key: &str,
        question_set: &str,
    ) -> OracleResult<GeneratedQuestion> {
        let url = format!("{}/generateQues/{}/{}", self.base_url, question_set, index);
        let body = GenerateQuestionRequest {
            user_res: prior_answer,
        };

        self.call("generateQues", || {
            self.client
                .post(&url)
                .query(&[("idDisorder", disorder_key)])
                .json(&body)
        })
        .await
    }

    async fn classify_first_stage(&self, answers: &[String]) -> OracleResult<i64> {
        let url = format!("{}/predictDisorderForFirstStage", self.base_url);
        let body = AnswersRequest { user_ans: answers };

        self.call("predictDisorderForFirstStage", || {
            self.client.post(&url).json(&body)
        })
        .await
    }

    async fn extract_symptoms(
        &self,
        answers: &[String],
        disorder: i64,
    ) -> OracleResult<Vec<SymptomCandidate>> {
        let url = format!("{}/extractSymptoms", self.base_url);
        let body = AnswersRequest { user_ans: answers };
        let key = disorder.to_string();

        self.call("extractSymptoms", || {
            self.client
                .post(&url)
                .query(&[("idDisorder", key.as_str())])
                .json(&body)
        })
        .await
    }

    async fn stage_limits(&self) -> OracleResult<StageLimits> {
        let url = format!("{}/stageLimits", self.base_url);

        self.call("stageLimits", || self.client.get(&url)).await
    }
}
