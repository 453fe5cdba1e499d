// Application state for HTTP handlers
use crate::application::chart_service::ChartService;
use crate::application::dashboard_stream::DashboardStreamService;

#[derive(Clone)]
pub struct AppState {
    pub chart_service: ChartService,
    pub stream_service: DashboardStreamService,
}
