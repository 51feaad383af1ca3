//! The record store: per-source records with per-catalog provenance and a
//! master value per quantity.

pub mod correction;
pub mod merger;
pub mod policy;
pub mod provenance;
pub mod record;

pub use correction::{apply_bolometric_correction, bolometric_factor};
pub use merger::{MergeStats, RecordMerger};
pub use policy::MergePolicy;
pub use provenance::{CatalogInput, ChangeType, MergeRecord, MergeRun, ProvenanceTracker};
pub use record::{CatalogValue, GalaxyRecord, MasterValue, QuantityEntry};
