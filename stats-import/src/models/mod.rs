//! Data models for the stats importer

pub mod report;
pub mod schema;

pub use report::{ImportFileReport, ImportReport, ReportStatus};
pub use schema::{
    AggregationConfig, AggregationMethod, AggregationPeriod, EntityType, EventType, ImportType,
    InputFileFormat, Provenance, Source, StatVar, VerticalSpec,
};
