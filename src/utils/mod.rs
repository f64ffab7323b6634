//! # utils
//!
//! Utilities

#[cfg(target_family = "unix")]
pub mod smb;
pub mod uri;
