//! orgshift core library: the migration pipeline and the traits its
//! collaborators implement.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod migrate;
pub mod models;
pub mod platform;
pub mod snapshot;

pub use config::MigrationConfig;
pub use error::{Error, Result};
pub use migrate::engine::{MigrationEngine, ObjectReport, ReconcileReport, RunMode, RunReport};
pub use models::{
    FieldDescriptor, FieldKind, IdMap, IdMaps, ObjectMeta, ObjectType, Record, SaveError,
    SaveOutcome, UpdateSpec,
};
pub use platform::Platform;
pub use snapshot::{SnapshotStore, SnapshotTable};
