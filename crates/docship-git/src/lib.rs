#![forbid(unsafe_code)]
//! Repository acquisition for docship: clone a remote and check out a ref.

pub mod checkout;
pub mod detect;
pub mod error;

pub use checkout::{GitCli, SourceControl, Status, StatusEntry};
pub use detect::{git_binary, resolve_git, GitInfo};
pub use error::GitError;
