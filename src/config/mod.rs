//! Configuration / working-set resolver (spec §4.1, §3 "Configuration",
//! §3 Lifecycles). `resolver` builds a fresh `Configuration` snapshot;
//! `reload` installs it atomically and diffs against the predecessor;
//! `dao` defines the trait boundaries to the external collaborators
//! (profile database, OCI snapshot resolver, legacy catalog) that spec.md
//! §1 places out of this core's scope.

pub mod dao;
pub mod options;
pub mod reload;
pub mod resolver;

pub use dao::{CatalogReader, ImagePuller, OciSnapshotResolver, ProfileDao, ProfileRow};
pub use options::GatewayOptions;
pub use reload::ConfigurationReloader;
pub use resolver::{resolve, ResolveInput};
