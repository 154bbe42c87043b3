//! Schema metadata: model, cached introspection, coverage reporting and profiling

pub mod coverage;
pub mod introspector;
pub mod model;
pub mod profile;

pub use coverage::{MetadataCoverageReport, MetadataQuality, QualityLevel, TableCoverage};
pub use introspector::SchemaIntrospector;
pub use model::{ColumnSchema, ForeignKey, IndexInfo, SchemaModel, TableSchema, TableSummary};
pub use profile::{TableProfile, TableProfiler, TableSample};
