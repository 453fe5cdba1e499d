use crate::domain::chart::{ChartType, TooltipSort};
use crate::domain::markup::Threshold;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub host: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Offset applied to time labels, in minutes east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Latest charts kept for legend, tooltip and stale fallback, across all viewers.
    #[serde(default = "default_retained_charts")]
    pub retained_charts: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            utc_offset_minutes: 0,
            retained_charts: default_retained_charts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PanelsConfig {
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub dashboards: Vec<DashboardConfig>,
}

impl PanelsConfig {
    pub fn panel(&self, id: &str) -> Option<&PanelConfig> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn dashboard(&self, id: &str) -> Option<&DashboardConfig> {
        self.dashboards.iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub kind: ChartType,
    pub unit: Option<String>,
    pub precision: Option<usize>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Comparison offsets such as `1d` or `1w`.
    #[serde(default)]
    pub time_shifts: Vec<String>,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Collection step of the underlying metric, in seconds.
    pub collect_interval: Option<u64>,
    #[serde(default)]
    pub only_one_result: bool,
    pub near_series_num: Option<usize>,
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub only_begin_end: bool,
    #[serde(default = "default_true")]
    pub y_axis_need_unit: bool,
    #[serde(default)]
    pub tooltip_sort: TooltipSort,
    #[serde(default)]
    pub colors: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub id: String,
    pub alias: Option<String>,
    /// Request body sent upstream; string leaves may contain `${var}` placeholders.
    pub query: Value,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub panels: Vec<String>,
}

fn default_api_path() -> String {
    "query/graph_unify_query".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_retained_charts() -> usize {
    1024
}

fn default_interval() -> String {
    "auto".to_string()
}

fn default_height() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

pub fn load_service_config() -> anyhow::Result<ServiceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/service"))
        .add_source(config::Environment::with_prefix("CHART").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_panels_config() -> anyhow::Result<PanelsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/panels"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

/// Replace template variables in every string of a query body
pub fn prepare_query_value(query: &Value, vars: &HashMap<String, String>) -> Value {
    match query {
        Value::String(s) => Value::String(prepare_query(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| prepare_query_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), prepare_query_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}
