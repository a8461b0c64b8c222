//! Parse and validate `docship.toml`, and persist project records.

pub mod config;
pub mod project;
pub mod registry;

pub use config::Config;
pub use project::{Project, Version};
pub use registry::Registry;
