#![forbid(unsafe_code)]
//! Build-and-publish pipeline, artifact store and project administration for docship.

pub mod admin;
pub mod build;
pub mod error;
pub mod init;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use admin::{DeleteReport, NewProject, VersionInfo};
pub use build::{BuildCommand, BuildRun, BuildStatus};
pub use error::{EngineError, ErrorKind};
pub use init::init_config;
pub use pipeline::{BuildReport, Publisher, SwitchReport};
pub use reconcile::ReconcileReport;
pub use store::{ArtifactStore, Publication, StoredArtifact, CURRENT_ALIAS};
pub use workspace::Workspace;
