//! Observation store adapter
//!
//! Raw monthly observations, their tagged metadata, the metric catalog and
//! the paginated store interface with an in-memory implementation.

mod catalog;
mod memory;
mod metadata;
mod store;
mod types;

pub use catalog::{
    EmissionScope, InMemoryMetricCatalog, MetricCatalog, MetricCategory, MetricDefinition,
};
pub use memory::InMemoryObservationStore;
pub use metadata::{GridMixMetadata, ObservationMetadata};
pub use store::{
    fetch_all, ObservationPage, ObservationQuery, ObservationStore, PageRequest, UpsertSummary,
};
pub use types::{DataQuality, Observation, ObservationKey};
