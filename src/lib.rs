#![crate_name = "smbc_context"]
#![crate_type = "lib"]

//! # smbc-context
//!
//! smbc-context is an SMB client context: it holds connection options and a credential
//! resolution policy, and opens handles to remote directories and files.
//!
//! ## Get started
//!
//! First of all you need to add **smbc-context** to your project dependencies:
//!
//! ```toml
//! smbc-context = "^0.1"
//! ```
//!
//! these features are supported:
//!
//! - `no-log`: disable logging. By default, this library will log via the `log` crate.
//!
//! ### Client context (UNIX)
//!
//! On UNIX the context is backed by libsmbclient through [pavao](https://github.com/veeso/pavao).
//!
//! ```rust,no_run
//! use smbc_context::{AuthData, AuthRequest, ClientContext, ContextOptions, OpenFlags};
//! use remotefs::fs::UnixPex;
//!
//! let context = ClientContext::new(
//!     ContextOptions::default()
//!         .debug(0)
//!         .credential_resolver(|req: &AuthRequest<'_>| {
//!             println!("credentials requested for {}/{}", req.server, req.share);
//!             Some(AuthData::new("WORKGROUP", "alice", "secret"))
//!         }),
//! )
//! .unwrap();
//!
//! // list a share
//! for entry in context.open_dir("smb://localhost:3445/temp").unwrap() {
//!     println!("{}", entry.unwrap().name);
//! }
//! // read a file
//! let mut file = context.open("smb://localhost:3445/temp/file.txt").unwrap();
//! let data = file.read(1024).unwrap();
//! file.close().unwrap();
//! // write a file
//! let mut file = context
//!     .open_file(
//!         "smb://localhost:3445/temp/new.txt",
//!         OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
//!         UnixPex::from(0o644),
//!     )
//!     .unwrap();
//! file.write_all(&data).unwrap();
//! file.close().unwrap();
//! ```
//!
//! ### Other protocols
//!
//! Any [`RemoteFilesystemProtocol`] implementation can back a context,
//! see [`ClientContext::with_protocol`].
//!

#![doc(html_playground_url = "https://play.rust-lang.org")]

// -- crates
#[macro_use]
extern crate log;

mod auth;
mod client;
mod error;
mod options;
mod protocol;

pub use auth::{
    AuthChallenge, AuthData, AuthRequest, CredentialLimits, CredentialResolver, StaticCredentials,
};
pub use client::{ClientContext, RemoteDirectoryHandle, RemoteFileHandle};
pub use error::{SmbcError, SmbcResult};
pub use options::{ContextFlags, ContextOption, ContextOptions, ProtocolConfig};
#[cfg(target_family = "unix")]
pub use protocol::PavaoProtocol;
pub use protocol::{DirEntry, DirEntryType, DirId, FileId, OpenFlags, RemoteFilesystemProtocol};
pub use utils::uri::SmbUri;

// -- utils
pub(crate) mod utils;
// -- mock
#[cfg(test)]
pub(crate) mod mock;
