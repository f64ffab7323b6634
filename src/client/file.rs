//! # file
//!
//! Handle to a remote file

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Weak;

use remotefs::fs::stream::{ReadAndSeek, WriteAndSeek};

use super::session::Session;
use super::ContextInner;
use crate::protocol::{FileId, OpenFlags};
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

/// Size of the chunks `read` asks the protocol for
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// An open remote file.
///
/// Writes may go through a write buffer (see
/// [`crate::ContextOptions::write_buffer_size`]); reads, seeks and
/// truncation flush it first, and so does `close`.
pub struct RemoteFileHandle {
    context: Weak<ContextInner>,
    id: FileId,
    uri: SmbUri,
    flags: OpenFlags,
    closed: bool,
}

impl RemoteFileHandle {
    pub(crate) fn new(
        context: Weak<ContextInner>,
        id: FileId,
        uri: SmbUri,
        flags: OpenFlags,
    ) -> Self {
        Self {
            context,
            id,
            uri,
            flags,
            closed: false,
        }
    }

    pub fn uri(&self) -> &SmbUri {
        &self.uri
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn session<T>(&self, f: impl FnOnce(&mut Session, FileId) -> SmbcResult<T>) -> SmbcResult<T> {
        if self.closed {
            return Err(SmbcError::ClosedHandle);
        }
        let context = self.context.upgrade().ok_or(SmbcError::ClosedContext)?;
        let id = self.id;
        context.with_session(|session| f(session, id))
    }

    /// Read up to `max` bytes.
    /// Fewer bytes are returned only at the end of the file; an empty buffer
    /// means the end was reached.
    pub fn read(&mut self, max: usize) -> SmbcResult<Vec<u8>> {
        self.session(|session, id| {
            let mut chunk = vec![0; max.min(READ_CHUNK_SIZE)];
            let mut data = Vec::new();
            while data.len() < max {
                let want = (max - data.len()).min(chunk.len());
                match session.read(id, &mut chunk[..want])? {
                    0 => break,
                    n => data.extend_from_slice(&chunk[..n]),
                }
            }
            Ok(data)
        })
    }

    /// Write `data` returning the amount of bytes accepted, which may be less
    /// than `data.len()`
    pub fn write(&mut self, data: &[u8]) -> SmbcResult<usize> {
        self.session(|session, id| session.write(id, data))
    }

    /// Write the whole of `data`
    pub fn write_all(&mut self, mut data: &[u8]) -> SmbcResult<()> {
        while !data.is_empty() {
            match RemoteFileHandle::write(self, data)? {
                0 => {
                    return Err(SmbcError::Connection(format!(
                        "{}: remote accepted no data",
                        self.uri
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Move the stream position, returning the new position from the start of the file
    pub fn seek(&mut self, pos: SeekFrom) -> SmbcResult<u64> {
        self.session(|session, id| session.seek(id, pos))
    }

    /// Current stream position
    pub fn position(&mut self) -> SmbcResult<u64> {
        RemoteFileHandle::seek(self, SeekFrom::Current(0))
    }

    /// Resize the file to `len` bytes; the stream position is unchanged
    pub fn truncate(&mut self, len: u64) -> SmbcResult<()> {
        self.session(|session, id| session.truncate(id, len))
    }

    /// Send buffered data to the server
    pub fn flush(&mut self) -> SmbcResult<()> {
        self.session(|session, id| session.flush(id))
    }

    /// Flush and close the file.
    ///
    /// The remote file is released even if flushing fails, in which case
    /// [`SmbcError::Flush`] is returned. Closing an already closed handle does
    /// nothing.
    pub fn close(&mut self) -> SmbcResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Some(context) = self.context.upgrade() else {
            return Ok(());
        };
        let id = self.id;
        trace!("closing {}", self.uri);
        match context.with_session(|session| session.close_file(id)) {
            // released with the context
            Err(SmbcError::ClosedContext) => Ok(()),
            Err(err) => {
                error!("failed to close {}: {}", self.uri, err);
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }
}

impl Read for RemoteFileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.session(|session, id| session.read(id, buf))
            .map_err(io::Error::from)
    }
}

impl Write for RemoteFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RemoteFileHandle::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RemoteFileHandle::flush(self).map_err(io::Error::from)
    }
}

impl Seek for RemoteFileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        RemoteFileHandle::seek(self, pos).map_err(io::Error::from)
    }
}

impl ReadAndSeek for RemoteFileHandle {}

impl WriteAndSeek for RemoteFileHandle {}

impl Drop for RemoteFileHandle {
    fn drop(&mut self) {
        // errors are logged by close
        let _ = self.close();
    }
}
