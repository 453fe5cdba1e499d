// Dashboard stream service - Progressive loading, one chart per message
use crate::application::chart_service::{ChartRequest, ChartService, ChartServiceError};
use crate::domain::chart::{ChartModel, ChartType};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Serialize)]
pub struct PanelSkeleton {
    pub id: String,
    pub title: String,
    pub kind: ChartType,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSkeleton {
    pub id: String,
    pub title: String,
    pub panels: Vec<PanelSkeleton>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub total_panels: usize,
    pub failed_panels: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Skeleton(DashboardSkeleton),
    Chart { panel_id: String, model: Box<ChartModel> },
    PanelError { panel_id: String, message: String },
    Complete(CompletionEvent),
}

/// Window and viewer shared by every panel of a dashboard request.
#[derive(Debug, Clone, Default)]
pub struct DashboardRequest {
    pub viewer: String,
    pub start_time: i64,
    pub end_time: i64,
    pub compact: bool,
    pub vars: HashMap<String, String>,
}

#[derive(Clone)]
pub struct DashboardStreamService {
    chart_service: ChartService,
}

impl DashboardStreamService {
    pub fn new(chart_service: ChartService) -> Self {
        Self { chart_service }
    }

    pub fn stream_dashboard(
        &self,
        dashboard_id: &str,
        request: DashboardRequest,
    ) -> Result<mpsc::Receiver<StreamMessage>, ChartServiceError> {
        let dashboard = self
            .chart_service
            .panels()
            .dashboard(dashboard_id)
            .cloned()
            .ok_or_else(|| ChartServiceError::DashboardNotFound(dashboard_id.to_string()))?;

        let (tx, rx) = mpsc::channel(100);
        let start_time = Instant::now();

        // Unknown panel ids are left out of the skeleton.
        let panels: Vec<PanelSkeleton> = dashboard
            .panels
            .iter()
            .filter_map(|id| match self.chart_service.panels().panel(id) {
                Some(panel) => Some(PanelSkeleton {
                    id: panel.id.clone(),
                    title: panel.title.clone(),
                    kind: panel.kind,
                    height: panel.height,
                }),
                None => {
                    tracing::warn!("Dashboard {} references unknown panel {}", dashboard.id, id);
                    None
                }
            })
            .collect();

        let skeleton = DashboardSkeleton {
            id: dashboard.id.clone(),
            title: dashboard.title.clone(),
            panels: panels.clone(),
        };
        let chart_service = self.chart_service.clone();

        tokio::spawn(async move {
            if tx.send(StreamMessage::Skeleton(skeleton)).await.is_err() {
                return;
            }

            let mut tasks = JoinSet::new();
            for panel in &panels {
                let tx = tx.clone();
                let chart_service = chart_service.clone();
                let chart_request = ChartRequest {
                    panel_id: panel.id.clone(),
                    viewer: request.viewer.clone(),
                    start_time: request.start_time,
                    end_time: request.end_time,
                    interval: None,
                    hidden: Vec::new(),
                    compact: request.compact,
                    vars: request.vars.clone(),
                };

                tasks.spawn(async move {
                    let panel_id = chart_request.panel_id.clone();
                    let (msg, failed) = match chart_service.chart(&chart_request).await {
                        Ok(model) => (
                            StreamMessage::Chart {
                                panel_id,
                                model: Box::new(model),
                            },
                            false,
                        ),
                        Err(e) => {
                            tracing::warn!("Panel {} not streamed: {}", panel_id, e);
                            (
                                StreamMessage::PanelError {
                                    panel_id,
                                    message: e.to_string(),
                                },
                                true,
                            )
                        }
                    };
                    let _ = tx.send(msg).await;
                    failed
                });
            }

            let mut failed_panels = 0;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(true) => failed_panels += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!("Panel task failed: {}", e);
                        failed_panels += 1;
                    }
                }
            }

            let complete = CompletionEvent {
                total_panels: panels.len(),
                failed_panels,
                duration_ms: start_time.elapsed().as_millis() as u64,
            };
            tracing::debug!(
                "Dashboard streamed {} panels in {}ms",
                complete.total_panels,
                complete.duration_ms
            );
            let _ = tx.send(StreamMessage::Complete(complete)).await;
        });

        Ok(rx)
    }
}
