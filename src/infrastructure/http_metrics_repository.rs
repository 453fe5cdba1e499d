// Metrics API repository implementation
use crate::application::metrics_repository::{MetricsRepository, QueryRequest};
use crate::domain::series::QueryResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpMetricsRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    api_path: String,
}

/// The API either wraps the payload or returns it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryResponse {
    Envelope {
        #[serde(default = "default_result")]
        result: bool,
        #[serde(default)]
        message: Option<String>,
        data: QueryResult,
    },
    Bare(QueryResult),
}

fn default_result() -> bool {
    true
}

impl HttpMetricsRepository {
    pub fn new(host: String, token: String, api_path: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            token,
            api_path: api_path.trim_matches('/').to_string(),
        })
    }

    fn build_query_url(&self, request: &QueryRequest) -> String {
        format!(
            "{}/{}?target={}",
            self.host,
            self.api_path,
            urlencoding::encode(&request.target_id)
        )
    }
}

#[async_trait]
impl MetricsRepository for HttpMetricsRepository {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        let url = self.build_query_url(request);
        tracing::debug!("Executing metrics query: {}", url);

        let mut builder = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(request);
        if !self.token.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.token));
        }
        let response = builder
            .send()
            .await
            .context("Failed to send request to metrics API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metrics query failed with status {}: {}", status, body);
        }

        let payload = response
            .json::<QueryResponse>()
            .await
            .context("Failed to parse metrics API response")?;

        match payload {
            QueryResponse::Envelope {
                result: false,
                message,
                ..
            } => anyhow::bail!(
                "Metrics query error: {}",
                message.unwrap_or_else(|| "unknown error".to_string())
            ),
            QueryResponse::Envelope { data, .. } | QueryResponse::Bare(data) => Ok(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interval::Interval;
    use serde_json::json;

    fn request() -> QueryRequest {
        QueryRequest {
            target_id: "cpu usage".to_string(),
            body: json!({"expression": "a"}),
            start_time: 0,
            end_time: 3_600,
            time_shift: "1d".to_string(),
            interval: Interval::Seconds(60),
        }
    }

    #[test]
    fn test_build_query_url() {
        let repository = HttpMetricsRepository::new(
            "http://monitor.local/".to_string(),
            String::new(),
            "/query/graph/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            repository.build_query_url(&request()),
            "http://monitor.local/query/graph?target=cpu%20usage"
        );
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(request()).unwrap();
        assert_eq!(
            body,
            json!({"expression": "a", "start_time": 0, "end_time": 3600, "time_shift": "1d", "interval": 60})
        );
    }

    #[test]
    fn test_response_shapes() {
        let wrapped: QueryResponse = serde_json::from_value(json!({
            "result": true,
            "data": {"series": [{"target": "a", "datapoints": [[1, 0]]}]}
        }))
        .unwrap();
        assert!(matches!(wrapped, QueryResponse::Envelope { ref data, .. } if data.series.len() == 1));

        let failed: QueryResponse = serde_json::from_value(json!({
            "result": false,
            "message": "bad query",
            "data": {}
        }))
        .unwrap();
        assert!(matches!(failed, QueryResponse::Envelope { result: false, .. }));

        let bare: QueryResponse =
            serde_json::from_value(json!({"series": [], "metrics": []})).unwrap();
        assert!(matches!(bare, QueryResponse::Bare(_)));
    }
}
