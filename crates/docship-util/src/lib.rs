#![forbid(unsafe_code)]
//! Filesystem, process, locking and naming helpers shared by docship crates.

pub mod error;
pub mod fs;
pub mod lock;
pub mod process;
pub mod segment;
