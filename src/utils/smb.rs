//! # smb utils
//!
//! Conversions between pavao types and the crate types

use std::io;

use pavao::{SmbDirent, SmbDirentType, SmbError};

use crate::protocol::{DirEntry, DirEntryType};
use crate::utils::uri::SmbUri;
use crate::SmbcError;

/// Convert `SmbDirent` to `DirEntry`
pub fn dirent_to_entry(dirent: &SmbDirent) -> DirEntry {
    DirEntry::new(dirent.name(), get_entry_type(dirent.get_type())).comment(dirent.comment())
}

fn get_entry_type(kind: SmbDirentType) -> DirEntryType {
    match kind {
        SmbDirentType::Workgroup => DirEntryType::Workgroup,
        SmbDirentType::Server => DirEntryType::Server,
        SmbDirentType::FileShare => DirEntryType::FileShare,
        SmbDirentType::PrinterShare => DirEntryType::PrinterShare,
        SmbDirentType::CommsShare => DirEntryType::CommsShare,
        SmbDirentType::IpcShare => DirEntryType::IpcShare,
        SmbDirentType::Dir => DirEntryType::Dir,
        SmbDirentType::File => DirEntryType::File,
        SmbDirentType::Link => DirEntryType::Link,
    }
}

/// Convert a failed pavao call into `SmbcError`.
/// The errno captured by pavao is used to tell failures apart.
pub fn smb_error(err: SmbError, uri: &SmbUri) -> SmbcError {
    match err {
        SmbError::Io(err) => io_error(err, uri),
        err => classify(None, err.to_string(), uri),
    }
}

/// Convert an io error raised by a pavao file into `SmbcError`
pub fn io_error(err: io::Error, uri: &SmbUri) -> SmbcError {
    match err.raw_os_error() {
        Some(errno) => classify(Some(errno), err.to_string(), uri),
        None => match err.kind() {
            io::ErrorKind::NotFound => SmbcError::NotFound(uri.to_string()),
            io::ErrorKind::PermissionDenied => SmbcError::PermissionDenied(uri.to_string()),
            _ => SmbcError::Connection(format!("{uri}: {err}")),
        },
    }
}

fn classify(errno: Option<i32>, message: String, uri: &SmbUri) -> SmbcError {
    match errno {
        Some(libc::EPERM) => SmbcError::Authentication {
            server: uri.server().to_string(),
            share: uri.share().unwrap_or_default().to_string(),
        },
        Some(libc::EACCES) => SmbcError::PermissionDenied(uri.to_string()),
        Some(libc::ENOENT) | Some(libc::ENOTDIR) => SmbcError::NotFound(uri.to_string()),
        Some(libc::EINVAL) => SmbcError::InvalidArgument(format!("{uri}: {message}")),
        _ => SmbcError::Connection(format!("{uri}: {message}")),
    }
}
