// HTTP request handlers
use crate::application::chart_service::{ChartRequest, ChartServiceError};
use crate::application::dashboard_stream::DashboardRequest;
use crate::domain::chart::{ChartType, HoverPoint};
use crate::domain::legend::LegendAction;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_WINDOW_SECS: i64 = 3_600;
const ANONYMOUS_VIEWER: &str = "anonymous";

/// Query parameters the handlers consume; everything else becomes a template variable.
const RESERVED_PARAMS: [&str; 6] = ["start", "end", "view", "interval", "hidden", "compact"];

#[derive(Debug, PartialEq)]
struct WindowParams {
    viewer: String,
    start_time: i64,
    end_time: i64,
    interval: Option<String>,
    hidden: Vec<String>,
    compact: bool,
    vars: HashMap<String, String>,
}

fn window_params(mut params: HashMap<String, String>, now: i64) -> Result<WindowParams, String> {
    let parse_time = |name: &str, value: Option<&String>| -> Result<Option<i64>, String> {
        value
            .map(|v| v.parse::<i64>().map_err(|_| format!("invalid {} timestamp: {}", name, v)))
            .transpose()
    };
    let end_time = parse_time("end", params.get("end"))?.unwrap_or(now);
    let start_time = parse_time("start", params.get("start"))?.unwrap_or(end_time - DEFAULT_WINDOW_SECS);
    if start_time > end_time {
        return Err(format!("start {} is after end {}", start_time, end_time));
    }

    let viewer = params
        .remove("view")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| ANONYMOUS_VIEWER.to_string());
    let interval = params.remove("interval").filter(|v| !v.is_empty());
    let hidden = params
        .remove("hidden")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let compact = params
        .remove("compact")
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    params.retain(|key, _| !RESERVED_PARAMS.contains(&key.as_str()));

    Ok(WindowParams {
        viewer,
        start_time,
        end_time,
        interval,
        hidden,
        compact,
        vars: params,
    })
}

fn status_of(error: &ChartServiceError) -> StatusCode {
    match error {
        ChartServiceError::PanelNotFound(_) | ChartServiceError::DashboardNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ChartServiceError::Superseded(_) => StatusCode::CONFLICT,
        ChartServiceError::NotLoaded(_) => StatusCode::PRECONDITION_FAILED,
    }
}

async fn error_response(status: StatusCode, message: String, compress: bool) -> Response<Body> {
    match json_response(status, &json!({ "error": message }), compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn respond<T: Serialize>(value: &T, compress: bool) -> Response<Body> {
    match json_response(StatusCode::OK, value, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[derive(Serialize)]
struct PanelSummary<'a> {
    id: &'a str,
    title: &'a str,
    kind: ChartType,
    targets: usize,
}

#[derive(Serialize)]
struct DashboardSummary<'a> {
    id: &'a str,
    title: &'a str,
    panels: &'a [String],
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured panels and dashboards
pub async fn list_panels(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response<Body> {
    let config = state.chart_service.panels();
    let panels: Vec<PanelSummary> = config
        .panels
        .iter()
        .map(|p| PanelSummary {
            id: &p.id,
            title: &p.title,
            kind: p.kind,
            targets: p.targets.len(),
        })
        .collect();
    let dashboards: Vec<DashboardSummary> = config
        .dashboards
        .iter()
        .map(|d| DashboardSummary {
            id: &d.id,
            title: &d.title,
            panels: &d.panels,
        })
        .collect();

    respond(
        &json!({ "panels": panels, "dashboards": dashboards }),
        accepts_brotli(&headers),
    )
    .await
}

/// Refresh and return the chart model of one panel
pub async fn panel_chart(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let window = match window_params(params, chrono::Utc::now().timestamp()) {
        Ok(window) => window,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message, compress).await,
    };

    let request = ChartRequest {
        panel_id: id,
        viewer: window.viewer,
        start_time: window.start_time,
        end_time: window.end_time,
        interval: window.interval,
        hidden: window.hidden,
        compact: window.compact,
        vars: window.vars,
    };
    match state.chart_service.chart(&request).await {
        Ok(model) => respond(&model, compress).await,
        Err(e) => error_response(status_of(&e), e.to_string(), compress).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct LegendRequest {
    #[serde(default)]
    pub view: Option<String>,
    pub action: LegendAction,
    pub name: String,
}

/// Apply a legend click to the latest chart of a panel
pub async fn legend_action(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(body): Json<LegendRequest>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let viewer = body.view.as_deref().unwrap_or(ANONYMOUS_VIEWER);
    match state
        .chart_service
        .apply_legend_action(viewer, &id, body.action, &body.name)
    {
        Ok(model) => respond(&model, compress).await,
        Err(e) => error_response(status_of(&e), e.to_string(), compress).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct TooltipRequest {
    #[serde(default)]
    pub view: Option<String>,
    pub points: Vec<HoverPoint>,
}

/// Render the hover tooltip for points of the latest chart of a panel
pub async fn tooltip(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TooltipRequest>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let viewer = body.view.as_deref().unwrap_or(ANONYMOUS_VIEWER);
    match state.chart_service.tooltip(viewer, &id, &body.points) {
        Ok(html) => respond(&json!({ "html": html }), compress).await,
        Err(e) => error_response(status_of(&e), e.to_string(), compress).await,
    }
}

/// Stream every panel of a dashboard (progressive loading)
pub async fn stream_dashboard(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let window = match window_params(params, chrono::Utc::now().timestamp()) {
        Ok(window) => window,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message, compress).await,
    };

    let request = DashboardRequest {
        viewer: window.viewer,
        start_time: window.start_time,
        end_time: window.end_time,
        compact: window.compact,
        vars: window.vars,
    };
    match state.stream_service.stream_dashboard(&id, request) {
        Ok(rx) => stream_from_receiver(rx, compress),
        Err(e) => error_response(status_of(&e), e.to_string(), compress).await,
    }
}
