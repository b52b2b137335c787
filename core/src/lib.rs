//! Inspect and safely edit kernel module parameters.
//!
//! Three sources of truth disagree about a parameter: the live sysfs file
//! (`/sys/module/<mod>/parameters/<param>`), the module's declared
//! metadata (`modinfo -p`), and persistent configuration
//! (`/etc/modprobe.d`). This crate reconciles them into immutable,
//! versioned [`Snapshot`]s and runs runtime edits through a
//! validate-write-confirm pipeline that either provably applies a change
//! or reports a specific reason it did not.
//!
//! [`StateStore`] is the entry point; everything else is the machinery it
//! coordinates.

pub mod aggregate;
pub mod config;
pub mod edit;
pub mod error;
pub mod metadata;
pub mod modprobe;
pub mod runtime;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod validate;

pub use config::ConfigError;
pub use config::CoreConfig;
pub use edit::EditOutcome;
pub use error::MetadataError;
pub use error::RejectReason;
pub use error::ScanError;
pub use metadata::MetadataSource;
pub use metadata::ModinfoFetcher;
pub use metadata::NullMetadataSource;
pub use metadata::ParamMetadata;
pub use modprobe::ConfigEntry;
pub use modprobe::Precedence;
pub use snapshot::ModuleRecord;
pub use snapshot::ParamRecord;
pub use snapshot::Snapshot;
pub use store::StateStore;
pub use types::ParamId;
pub use types::ParameterType;
pub use types::PermissionClass;
pub use types::RuntimeState;
