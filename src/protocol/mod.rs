//! # protocol
//!
//! The SMB protocol capability a [`crate::ClientContext`] drives

use std::io::SeekFrom;

use bitflags::bitflags;
use remotefs::fs::UnixPex;

use crate::auth::AuthChallenge;
use crate::options::ProtocolConfig;
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

#[cfg(target_family = "unix")]
mod smbclient;
#[cfg(target_family = "unix")]
pub use self::smbclient::PavaoProtocol;

/// Descriptor of a file opened through a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

/// Descriptor of a directory opened through a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub u64);

bitflags! {
    /// Flags used to open a remote file
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        const TRUNCATE = 1 << 4;
        const EXCLUSIVE = 1 << 5;
    }
}

impl OpenFlags {
    /// Convert POSIX `open(2)` flags
    #[cfg(target_family = "unix")]
    pub fn from_posix(flags: i32) -> Self {
        let mut open = match flags & libc::O_ACCMODE {
            libc::O_WRONLY => Self::WRITE,
            libc::O_RDWR => Self::READ | Self::WRITE,
            _ => Self::READ,
        };
        if flags & libc::O_APPEND != 0 {
            open |= Self::APPEND;
        }
        if flags & libc::O_CREAT != 0 {
            open |= Self::CREATE;
        }
        if flags & libc::O_TRUNC != 0 {
            open |= Self::TRUNCATE;
        }
        if flags & libc::O_EXCL != 0 {
            open |= Self::EXCLUSIVE;
        }
        open
    }

    /// Check the combination makes sense
    pub(crate) fn validate(&self) -> SmbcResult<()> {
        if !self.intersects(Self::READ | Self::WRITE) {
            return Err(SmbcError::InvalidArgument(
                "file must be opened for reading or writing".to_string(),
            ));
        }
        if self.intersects(Self::APPEND | Self::CREATE | Self::TRUNCATE | Self::EXCLUSIVE)
            && !self.contains(Self::WRITE)
        {
            return Err(SmbcError::InvalidArgument(
                "append, create and truncate require write access".to_string(),
            ));
        }
        Ok(())
    }
}

/// Type of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryType {
    Workgroup,
    Server,
    FileShare,
    PrinterShare,
    CommsShare,
    IpcShare,
    Dir,
    File,
    Link,
}

impl DirEntryType {
    pub fn is_share(&self) -> bool {
        matches!(
            self,
            Self::FileShare | Self::PrinterShare | Self::CommsShare | Self::IpcShare
        )
    }
}

impl From<DirEntryType> for u32 {
    fn from(kind: DirEntryType) -> Self {
        match kind {
            DirEntryType::Workgroup => 1,
            DirEntryType::Server => 2,
            DirEntryType::FileShare => 3,
            DirEntryType::PrinterShare => 4,
            DirEntryType::CommsShare => 5,
            DirEntryType::IpcShare => 6,
            DirEntryType::Dir => 7,
            DirEntryType::File => 8,
            DirEntryType::Link => 9,
        }
    }
}

impl TryFrom<u32> for DirEntryType {
    type Error = SmbcError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Workgroup),
            2 => Ok(Self::Server),
            3 => Ok(Self::FileShare),
            4 => Ok(Self::PrinterShare),
            5 => Ok(Self::CommsShare),
            6 => Ok(Self::IpcShare),
            7 => Ok(Self::Dir),
            8 => Ok(Self::File),
            9 => Ok(Self::Link),
            code => Err(SmbcError::InvalidArgument(format!(
                "unknown directory entry type {code}"
            ))),
        }
    }
}

/// An entry of a remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: DirEntryType,
    pub comment: String,
}

impl DirEntry {
    pub fn new<S: AsRef<str>>(name: S, kind: DirEntryType) -> Self {
        Self {
            name: name.as_ref().to_string(),
            kind,
            comment: String::new(),
        }
    }

    /// Construct DirEntry with the provided comment
    pub fn comment<S: AsRef<str>>(mut self, comment: S) -> Self {
        self.comment = comment.as_ref().to_string();
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryType::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == DirEntryType::File
    }
}

/// SMB protocol client capability.
///
/// Implementations perform the actual network exchanges; they are driven by a
/// single context at a time and never see concurrent calls.
pub trait RemoteFilesystemProtocol: Send {
    /// Apply debug level and option flags
    fn configure(&mut self, config: &ProtocolConfig) -> SmbcResult<()>;

    /// Establish (or reuse) a session to the server and share of `uri`.
    ///
    /// When the server requires credentials, `challenge` must be asked for them.
    fn connect(&mut self, uri: &SmbUri, challenge: &AuthChallenge) -> SmbcResult<()>;

    fn open_dir(&mut self, uri: &SmbUri) -> SmbcResult<DirId>;

    /// Fetch up to `max` entries; an empty batch marks the end of the directory
    fn read_dir(&mut self, dir: DirId, max: usize) -> SmbcResult<Vec<DirEntry>>;

    fn close_dir(&mut self, dir: DirId) -> SmbcResult<()>;

    fn open_file(&mut self, uri: &SmbUri, flags: OpenFlags, mode: UnixPex) -> SmbcResult<FileId>;

    /// Read into `buf` from the current position; 0 means end of file
    fn read(&mut self, file: FileId, buf: &mut [u8]) -> SmbcResult<usize>;

    /// Write `data` at the current position; may write less than requested
    fn write(&mut self, file: FileId, data: &[u8]) -> SmbcResult<usize>;

    fn seek(&mut self, file: FileId, pos: SeekFrom) -> SmbcResult<u64>;

    fn truncate(&mut self, file: FileId, len: u64) -> SmbcResult<()>;

    fn close_file(&mut self, file: FileId) -> SmbcResult<()>;

    /// Release every session; called once when the context is released
    fn shutdown(&mut self);
}
