// Application layer - Use cases and ports
pub mod chart_cache;
pub mod chart_service;
pub mod dashboard_stream;
pub mod metrics_repository;
pub mod refresh;
