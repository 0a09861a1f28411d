use super::error::{Result, SsbError};
use super::klass::{ClassificationWindow, CodeList};
use super::metadata::TableMetadata;
use super::published::{select_publication, TablePublication};
use super::query::TableQuery;
use super::throttle::request_gate;
use crate::config::FetchConfig;
use backon::{ExponentialBuilder, Retryable};
use governor::DefaultDirectRateLimiter;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use std::time::Duration;

/// Why one HTTP exchange failed after all attempts
#[derive(Debug)]
enum RequestFailure {
    Status { status: StatusCode, body: String },
    Transport(reqwest::Error),
}

impl RequestFailure {
    fn is_retryable(&self) -> bool {
        match self {
            RequestFailure::Status { status, .. } => status.is_server_error(),
            RequestFailure::Transport(_) => true,
        }
    }
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestFailure::Status { status, body } if body.is_empty() => {
                write!(f, "HTTP {}", status)
            }
            RequestFailure::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            RequestFailure::Transport(e) => write!(f, "{}", e),
        }
    }
}

/// Client for the SSB table API and the KLASS classification service
///
/// Every request passes the shared rate gate first; retries do too.
pub struct SsbClient {
    http: HttpClient,
    api_base: String,
    klass_base: String,
    gate: Option<DefaultDirectRateLimiter>,
    retry_policy: ExponentialBuilder,
}

impl SsbClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        tracing::info!(
            api = config.api_base.as_str(),
            klass = config.klass_base.as_str(),
            interval_ms = config.request_interval.as_millis() as u64,
            "Creating SSB client"
        );

        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SsbError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            klass_base: config.klass_base.trim_end_matches('/').to_string(),
            gate: request_gate(config.request_interval),
            retry_policy: ExponentialBuilder::default()
                .with_min_delay(config.request_backoff)
                .with_max_delay(config.request_backoff * 16)
                .with_max_times(config.request_attempts.max(1) as usize - 1),
        })
    }

    /// `GET {api}/table/{id}`
    pub async fn table_metadata(&self, table_id: &str) -> Result<TableMetadata> {
        let url = format!("{}/table/{}", self.api_base, table_id);
        let body = self
            .send(|| self.http.get(&url))
            .await
            .map_err(|e| SsbError::MetadataFetch {
                table_id: table_id.to_string(),
                reason: e.to_string(),
            })?;

        serde_json::from_str(&body).map_err(|e| SsbError::MetadataFetch {
            table_id: table_id.to_string(),
            reason: format!("unexpected metadata document: {}", e),
        })
    }

    /// `GET {klass}/classifications/{id}/codes?from=..&to=..&includeFuture=true`
    pub async fn classification_codes(
        &self,
        classification_id: &str,
        window: ClassificationWindow,
    ) -> Result<CodeList> {
        let url = format!(
            "{}/classifications/{}/codes?{}",
            self.klass_base,
            classification_id,
            window.query_string()
        );
        let body = self
            .send(|| self.http.get(&url).header("Accept", "application/json"))
            .await
            .map_err(|e| SsbError::ClassificationFetch {
                classification_id: classification_id.to_string(),
                reason: e.to_string(),
            })?;

        serde_json::from_str(&body).map_err(|e| SsbError::ClassificationFetch {
            classification_id: classification_id.to_string(),
            reason: format!("unexpected code list: {}", e),
        })
    }

    /// `POST {api}/table/{id}`, returning the raw json-stat2 body
    pub async fn post_query(&self, table_id: &str, query: &TableQuery) -> Result<String> {
        let url = format!("{}/table/{}", self.api_base, table_id);
        self.send(|| self.http.post(&url).json(query))
            .await
            .map_err(|e| match e {
                RequestFailure::Transport(e) => SsbError::Http(e),
                other => SsbError::Other(other.to_string()),
            })
    }

    /// Latest publication of a table, `None` when the search has no hits
    pub async fn published(&self, table_id: &str) -> Result<Option<TablePublication>> {
        let url = format!("{}/table/", self.api_base);
        let query = format!("title:{}", table_id);
        let body = self
            .send(|| self.http.get(&url).query(&[("query", query.as_str())]))
            .await
            .map_err(|e| SsbError::Other(format!("Publication lookup for {}: {}", table_id, e)))?;

        let hits: Vec<TablePublication> = serde_json::from_str(&body)?;
        Ok(select_publication(table_id, hits))
    }

    /// Gated send with bounded retry on transport errors and 5xx
    async fn send<F>(&self, build: F) -> std::result::Result<String, RequestFailure>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempt = || async {
            if let Some(gate) = &self.gate {
                gate.until_ready().await;
            }

            match build().send().await {
                Ok(response) if response.status().is_success() => {
                    response.text().await.map_err(RequestFailure::Transport)
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Err(RequestFailure::Status { status, body })
                }
                Err(e) => Err(RequestFailure::Transport(e)),
            }
        };

        attempt
            .retry(self.retry_policy)
            .when(RequestFailure::is_retryable)
            .notify(notify_retry)
            .await
    }
}

fn notify_retry(failure: &RequestFailure, delay: Duration) {
    tracing::warn!(
        error = %failure,
        "Request failed. Retrying in {:.1}s",
        delay.as_secs_f32()
    );
}
