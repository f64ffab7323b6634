//! # dir
//!
//! Handle to a remote directory

use std::collections::VecDeque;
use std::sync::Weak;

use super::ContextInner;
use crate::protocol::{DirEntry, DirId};
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

/// An open remote directory.
///
/// Entries are produced lazily, one batch per round trip. Enumeration is
/// single-pass: reopen the directory to list it again.
pub struct RemoteDirectoryHandle {
    context: Weak<ContextInner>,
    id: DirId,
    uri: SmbUri,
    batch: VecDeque<DirEntry>,
    exhausted: bool,
    closed: bool,
    /// The iterator already yielded an error
    fused: bool,
}

impl RemoteDirectoryHandle {
    pub(crate) fn new(context: Weak<ContextInner>, id: DirId, uri: SmbUri) -> Self {
        Self {
            context,
            id,
            uri,
            batch: VecDeque::new(),
            exhausted: false,
            closed: false,
            fused: false,
        }
    }

    pub fn uri(&self) -> &SmbUri {
        &self.uri
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Get the next entry, or `None` once the directory has been fully listed.
    ///
    /// A connection failure closes the handle.
    pub fn next_entry(&mut self) -> SmbcResult<Option<DirEntry>> {
        if self.closed {
            return Err(SmbcError::ClosedHandle);
        }
        let context = self.context.upgrade().ok_or(SmbcError::ClosedContext)?;
        if context.is_released() {
            self.batch.clear();
            return Err(SmbcError::ClosedContext);
        }
        if let Some(entry) = self.batch.pop_front() {
            return Ok(Some(entry));
        }
        if self.exhausted {
            return Ok(None);
        }
        let id = self.id;
        match context.with_session(|session| session.read_dir(id)) {
            Ok(entries) if entries.is_empty() => {
                trace!("end of {}", self.uri);
                self.exhausted = true;
                Ok(None)
            }
            Ok(entries) => {
                trace!("got {} entries from {}", entries.len(), self.uri);
                self.batch.extend(entries);
                Ok(self.batch.pop_front())
            }
            Err(SmbcError::Connection(msg)) => {
                error!("enumeration of {} interrupted: {}", self.uri, msg);
                self.closed = true;
                self.batch.clear();
                if let Err(err) = context.with_session(|session| session.close_dir(id)) {
                    debug!("could not release {}: {}", self.uri, err);
                }
                Err(SmbcError::Connection(msg))
            }
            Err(err) => Err(err),
        }
    }

    /// Close the directory. Closing an already closed handle does nothing.
    pub fn close(&mut self) -> SmbcResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.batch.clear();
        let Some(context) = self.context.upgrade() else {
            return Ok(());
        };
        let id = self.id;
        trace!("closing {}", self.uri);
        match context.with_session(|session| session.close_dir(id)) {
            // released with the context
            Err(SmbcError::ClosedContext) => Ok(()),
            res => res,
        }
    }
}

impl Iterator for RemoteDirectoryHandle {
    type Item = SmbcResult<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(err) => {
                self.fused = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for RemoteDirectoryHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!("failed to close {}: {}", self.uri, err);
        }
    }
}
