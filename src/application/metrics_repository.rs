// Repository trait for metric query access
use crate::domain::interval::Interval;
use crate::domain::series::QueryResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One upstream query: a target's body evaluated over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    #[serde(skip)]
    pub target_id: String,
    /// Target query with template variables already substituted.
    #[serde(flatten)]
    pub body: Value,
    /// Window start in seconds.
    pub start_time: i64,
    /// Window end in seconds.
    pub end_time: i64,
    /// Comparison offset such as `1d`; empty for the current window.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub time_shift: String,
    pub interval: Interval,
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Run one target query; the answer carries every series of that target.
    async fn query(&self, request: &QueryRequest) -> anyhow::Result<QueryResult>;
}
