// Chart service - Use case for refreshing one panel's chart model
use crate::application::chart_cache::ChartCache;
use crate::application::metrics_repository::{MetricsRepository, QueryRequest};
use crate::application::refresh::{RefreshCycle, RefreshRegistry};
use crate::domain::chart::{ChartModel, HoverPoint};
use crate::domain::error::FetchError;
use crate::domain::ingest::{ingest, IngestOptions, TargetOutcome};
use crate::domain::interval::{self, Interval};
use crate::domain::legend::LegendAction;
use crate::domain::pipeline::{assemble, PipelineOptions};
use crate::infrastructure::config::{prepare_query_value, PanelConfig, PanelsConfig};
use chrono::FixedOffset;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinSet;

/// Charts retained across viewers unless configured otherwise.
const DEFAULT_RETAINED_CHARTS: usize = 1024;

/// Height used for compact (sparkline) rendering.
const COMPACT_HEIGHT: u32 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ChartServiceError {
    #[error("panel {0} not found")]
    PanelNotFound(String),
    #[error("dashboard {0} not found")]
    DashboardNotFound(String),
    #[error("refresh of {0} was superseded by a newer one")]
    Superseded(String),
    #[error("chart of panel {0} has not been loaded yet")]
    NotLoaded(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChartRequest {
    pub panel_id: String,
    /// Identifies the viewer; refreshes of the same viewer and panel cancel each other.
    pub viewer: String,
    /// Window start in seconds.
    pub start_time: i64,
    /// Window end in seconds.
    pub end_time: i64,
    pub interval: Option<String>,
    pub hidden: Vec<String>,
    pub compact: bool,
    pub vars: HashMap<String, String>,
}

impl ChartRequest {
    fn refresh_key(&self) -> String {
        refresh_key(&self.viewer, &self.panel_id)
    }
}

fn refresh_key(viewer: &str, panel_id: &str) -> String {
    format!("{}:{}", viewer, panel_id)
}

#[derive(Clone)]
pub struct ChartService {
    repository: Arc<dyn MetricsRepository>,
    panels: Arc<PanelsConfig>,
    registry: RefreshRegistry,
    last_good: Arc<Mutex<ChartCache>>,
    offset: FixedOffset,
}

impl ChartService {
    pub fn new(
        repository: Arc<dyn MetricsRepository>,
        panels: Arc<PanelsConfig>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            repository,
            panels,
            registry: RefreshRegistry::new(),
            last_good: Arc::new(Mutex::new(ChartCache::new(DEFAULT_RETAINED_CHARTS))),
            offset,
        }
    }

    /// Caps how many latest charts are kept across viewers and panels.
    pub fn with_retained_charts(mut self, capacity: usize) -> Self {
        self.last_good = Arc::new(Mutex::new(ChartCache::new(capacity)));
        self
    }

    pub fn panels(&self) -> &PanelsConfig {
        &self.panels
    }

    pub async fn chart(&self, request: &ChartRequest) -> Result<ChartModel, ChartServiceError> {
        let panel = self
            .panels
            .panel(&request.panel_id)
            .ok_or_else(|| ChartServiceError::PanelNotFound(request.panel_id.clone()))?;

        let key = request.refresh_key();
        let cycle = self.registry.begin(&key);
        let finish = self.registry.finish_on_drop(&cycle);
        let outcomes = self.fetch(panel, request, &cycle).await?;
        if !self.registry.is_current(&cycle) {
            return Err(ChartServiceError::Superseded(panel.id.clone()));
        }
        drop(finish);

        let ingested = ingest(
            outcomes,
            &IngestOptions {
                time_shifts: panel.time_shifts.clone(),
                only_one_result: panel.only_one_result,
                near_series_num: panel.near_series_num,
            },
        );
        let model = assemble(&ingested, &self.pipeline_options(panel, request));

        let mut last_good = self.last_good();
        if !model.is_empty() {
            last_good.insert(key, model.clone());
            return Ok(model);
        }
        if ingested.succeeded_targets == 0 && !model.errors.is_empty() {
            if let Some(previous) = last_good.get(&key) {
                tracing::warn!(
                    "All targets of panel {} failed, serving last good chart",
                    panel.id
                );
                let mut stale = previous.clone();
                stale.errors = model.errors;
                stale.stale = true;
                return Ok(stale);
            }
        }
        Ok(model)
    }

    /// Applies a legend click to the viewer's latest chart of a panel.
    pub fn apply_legend_action(
        &self,
        viewer: &str,
        panel_id: &str,
        action: LegendAction,
        name: &str,
    ) -> Result<ChartModel, ChartServiceError> {
        let mut last_good = self.last_good();
        let model = last_good
            .get_mut(&refresh_key(viewer, panel_id))
            .ok_or_else(|| ChartServiceError::NotLoaded(panel_id.to_string()))?;
        if !model.apply_legend_action(action, name) {
            tracing::debug!("Legend action {:?} on {} changed nothing", action, name);
        }
        Ok(model.clone())
    }

    /// Renders the hover tooltip against the viewer's latest chart of a panel.
    pub fn tooltip(
        &self,
        viewer: &str,
        panel_id: &str,
        points: &[HoverPoint],
    ) -> Result<String, ChartServiceError> {
        self.last_good()
            .get(&refresh_key(viewer, panel_id))
            .map(|model| model.tooltip.format(points))
            .ok_or_else(|| ChartServiceError::NotLoaded(panel_id.to_string()))
    }

    fn last_good(&self) -> MutexGuard<'_, ChartCache> {
        self.last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fans out one query per (time shift, target) and waits for all of them.
    ///
    /// Outcomes come back in configuration order regardless of completion order.
    async fn fetch(
        &self,
        panel: &PanelConfig,
        request: &ChartRequest,
        cycle: &RefreshCycle,
    ) -> Result<Vec<TargetOutcome>, ChartServiceError> {
        let interval = interval::resolve(
            request.interval.as_deref().unwrap_or(&panel.interval),
            panel.collect_interval,
        );
        let mut vars = request.vars.clone();
        vars.insert("start_time".to_string(), request.start_time.to_string());
        vars.insert("end_time".to_string(), request.end_time.to_string());
        if let Interval::Seconds(seconds) = interval {
            vars.insert("interval".to_string(), seconds.to_string());
        }

        let shifts: Vec<String> = std::iter::once(String::new())
            .chain(panel.time_shifts.iter().cloned())
            .collect();

        let mut tasks = JoinSet::new();
        let mut task_slots = HashMap::new();
        let mut slots: Vec<Option<TargetOutcome>> = Vec::new();
        for time_shift in &shifts {
            for target in &panel.targets {
                let slot = slots.len();
                slots.push(None);
                let query = QueryRequest {
                    target_id: target.id.clone(),
                    body: prepare_query_value(&target.query, &vars),
                    start_time: request.start_time,
                    end_time: request.end_time,
                    time_shift: time_shift.clone(),
                    interval,
                };
                let alias = target.alias.clone();
                let repository = self.repository.clone();

                tracing::debug!(
                    "Querying target {} of panel {} (shift {:?})",
                    target.id,
                    panel.id,
                    time_shift
                );
                let handle = tasks.spawn(async move {
                    let result = repository.query(&query).await.map_err(|e| FetchError::Upstream {
                        target: query.target_id.clone(),
                        message: e.to_string(),
                    });
                    (
                        slot,
                        TargetOutcome {
                            target_id: query.target_id,
                            target_alias: alias,
                            time_shift: query.time_shift,
                            result,
                        },
                    )
                });
                task_slots.insert(
                    handle.id(),
                    (slot, target.id.clone(), time_shift.clone(), target.alias.clone()),
                );
                self.registry.track(cycle, handle);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("Refresh of panel {} superseded", panel.id);
                    return Err(ChartServiceError::Superseded(panel.id.clone()));
                }
                Err(e) => {
                    tracing::error!("Query task of panel {} failed: {}", panel.id, e);
                    if let Some((slot, target_id, time_shift, alias)) = task_slots.remove(&e.id()) {
                        slots[slot] = Some(TargetOutcome {
                            result: Err(FetchError::Task {
                                target: target_id.clone(),
                                message: e.to_string(),
                            }),
                            target_id,
                            target_alias: alias,
                            time_shift,
                        });
                    }
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    fn pipeline_options(&self, panel: &PanelConfig, request: &ChartRequest) -> PipelineOptions {
        PipelineOptions {
            chart_type: panel.kind,
            unit: panel.unit.clone(),
            precision: panel.precision,
            thresholds: panel.thresholds.clone(),
            height: if request.compact {
                COMPACT_HEIGHT
            } else {
                panel.height
            },
            only_begin_end: panel.only_begin_end || request.compact,
            y_axis_need_unit: panel.y_axis_need_unit,
            colors: panel.colors.clone(),
            hidden: request.hidden.clone(),
            tooltip_sort: panel.tooltip_sort,
            offset: self.offset,
        }
    }
}
