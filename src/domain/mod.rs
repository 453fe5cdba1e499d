// Domain layer - Chart pipeline stages and models
pub mod axis;
pub mod boundary;
pub mod chart;
pub mod error;
pub mod ingest;
pub mod interval;
pub mod legend;
pub mod markup;
pub mod pipeline;
pub mod precision;
pub mod series;
pub mod unit;
