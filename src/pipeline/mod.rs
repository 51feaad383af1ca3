// Data processing pipeline: ingestion, processing, and storage

pub mod build;
pub mod ingestion;
pub mod processing;
pub mod storage;

pub use build::{persist_to_json, BuildOptions, BuildPipeline, BuildResult, CatalogSummary};
