use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, PipeDefinition, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};

const RUN_PATH: &str = "/v1/pipes/run";
const PIPES_PATH: &str = "/v1/pipes";

/// HTTP client for the Langbase Pipes API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Build a client. The per-attempt timeout comes from `request_config`.
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a pipe.
    ///
    /// Transport failures and error statuses are retried with exponential
    /// backoff, `retry_delay_ms * 2^(n-1)` before the n-th retry. A body that
    /// cannot be decoded fails at once with [`LangbaseError::InvalidResponse`].
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let mut last_error = None;
        let mut attempt: u32 = 0;

        while attempt <= self.request_config.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(
                    pipe = %request.name,
                    retry = attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(pipe = %request.name, messages = request.messages.len(), "Calling Langbase pipe");
            let start = Instant::now();

            match self.post::<_, PipeResponse>(RUN_PATH, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis(),
                        total_tokens = ?response.total_tokens(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e @ LangbaseError::InvalidResponse { .. }) => {
                    error!(pipe = %request.name, error = %e, "Langbase pipe returned garbage");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        attempt,
                        "Langbase pipe call failed"
                    );
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
            retries: attempt,
        })
    }

    /// Create or update a pipe from its definition. An existing pipe (409) is fine.
    pub async fn ensure_pipe(&self, definition: &PipeDefinition) -> LangbaseResult<()> {
        info!(pipe = %definition.name, "Upserting Langbase pipe");
        let request = CreatePipeRequest::from(definition);

        match self
            .post::<_, CreatePipeResponse>(PIPES_PATH, &request)
            .await
        {
            Ok(created) => {
                info!(pipe = %created.name, url = %created.url, "Pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %definition.name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.request_config.retry_delay_ms.saturating_mul(factor))
    }

    /// One authorized JSON POST, decoding the success body as `R`.
    async fn post<B, R>(&self, path: &str, body: &B) -> LangbaseResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("{} answered with an undecodable body: {}", path, e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(retry_delay_ms: u64) -> LangbaseClient {
        let config = LangbaseConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
        };
        LangbaseClient::new(
            &config,
            RequestConfig {
                retry_delay_ms,
                ..RequestConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_client_creation_trims_base_url() {
        assert_eq!(client(1000).base_url(), "https://api.langbase.com");
    }

    #[test]
    fn test_backoff_doubles() {
        let c = client(100);
        assert_eq!(c.backoff(1), Duration::from_millis(100));
        assert_eq!(c.backoff(2), Duration::from_millis(200));
        assert_eq!(c.backoff(4), Duration::from_millis(800));
    }
}
