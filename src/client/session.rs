//! # session
//!
//! Protocol session owned by a context, with the registry of open descriptors

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;

use remotefs::fs::UnixPex;

use crate::auth::AuthChallenge;
use crate::options::ProtocolConfig;
use crate::protocol::{DirEntry, DirId, FileId, OpenFlags, RemoteFilesystemProtocol};
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

/// Per-file state kept by the session
struct FileState {
    uri: SmbUri,
    /// Data accepted from the caller but not yet sent
    buffer: Vec<u8>,
}

pub(crate) struct Session {
    protocol: Box<dyn RemoteFilesystemProtocol>,
    config: ProtocolConfig,
    dirent_batch_size: usize,
    write_buffer_size: usize,
    files: HashMap<FileId, FileState>,
    dirs: HashSet<DirId>,
    released: bool,
}

impl Session {
    pub fn new(
        protocol: Box<dyn RemoteFilesystemProtocol>,
        config: ProtocolConfig,
        dirent_batch_size: usize,
        write_buffer_size: usize,
    ) -> Self {
        Self {
            protocol,
            config,
            dirent_batch_size,
            write_buffer_size,
            files: HashMap::new(),
            dirs: HashSet::new(),
            released: false,
        }
    }

    pub fn config(&self) -> ProtocolConfig {
        self.config
    }

    /// Push a new configuration to the protocol; kept only if accepted
    pub fn reconfigure(&mut self, config: ProtocolConfig) -> SmbcResult<()> {
        self.protocol.configure(&config)?;
        debug!(
            "context reconfigured (debug: {}, flags: {:?})",
            config.debug, config.flags
        );
        self.config = config;
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    pub fn open_dirs(&self) -> usize {
        self.dirs.len()
    }

    // -- directories

    pub fn open_dir(&mut self, uri: &SmbUri, challenge: &AuthChallenge) -> SmbcResult<DirId> {
        self.protocol.connect(uri, challenge)?;
        let id = self.protocol.open_dir(uri)?;
        self.dirs.insert(id);
        Ok(id)
    }

    /// Fetch the next batch of entries of `dir`
    pub fn read_dir(&mut self, dir: DirId) -> SmbcResult<Vec<DirEntry>> {
        if !self.dirs.contains(&dir) {
            return Err(SmbcError::ClosedHandle);
        }
        self.protocol.read_dir(dir, self.dirent_batch_size)
    }

    pub fn close_dir(&mut self, dir: DirId) -> SmbcResult<()> {
        if !self.dirs.remove(&dir) {
            return Err(SmbcError::ClosedHandle);
        }
        self.protocol.close_dir(dir)
    }

    // -- files

    pub fn open_file(
        &mut self,
        uri: &SmbUri,
        flags: OpenFlags,
        mode: UnixPex,
        challenge: &AuthChallenge,
    ) -> SmbcResult<FileId> {
        self.protocol.connect(uri, challenge)?;
        let id = self.protocol.open_file(uri, flags, mode)?;
        self.files.insert(
            id,
            FileState {
                uri: uri.clone(),
                buffer: Vec::with_capacity(self.write_buffer_size),
            },
        );
        Ok(id)
    }

    /// Send buffered data of `file` to the protocol
    pub fn flush(&mut self, file: FileId) -> SmbcResult<()> {
        let state = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        while !state.buffer.is_empty() {
            let written = match self.protocol.write(file, &state.buffer) {
                Ok(0) => {
                    return Err(SmbcError::Flush(format!(
                        "{}: remote accepted no data",
                        state.uri
                    )))
                }
                Ok(n) => n,
                Err(err) => return Err(SmbcError::Flush(format!("{}: {}", state.uri, err))),
            };
            trace!("flushed {} bytes to {}", written, state.uri);
            state.buffer.drain(..written);
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes with a single protocol call
    pub fn read(&mut self, file: FileId, buf: &mut [u8]) -> SmbcResult<usize> {
        self.flush(file)?;
        self.protocol.read(file, buf)
    }

    /// Write `data`, going through the write buffer when enabled.
    /// May accept fewer bytes than provided.
    pub fn write(&mut self, file: FileId, data: &[u8]) -> SmbcResult<usize> {
        let capacity = self.write_buffer_size;
        let buffered = self
            .files
            .get(&file)
            .map(|state| state.buffer.len())
            .ok_or(SmbcError::ClosedHandle)?;
        if capacity == 0 {
            return self.protocol.write(file, data);
        }
        if buffered + data.len() > capacity {
            self.flush(file)?;
        }
        if data.len() >= capacity {
            return self.protocol.write(file, data);
        }
        if let Some(state) = self.files.get_mut(&file) {
            state.buffer.extend_from_slice(data);
        }
        Ok(data.len())
    }

    pub fn seek(&mut self, file: FileId, pos: SeekFrom) -> SmbcResult<u64> {
        self.flush(file)?;
        self.protocol.seek(file, pos)
    }

    pub fn truncate(&mut self, file: FileId, len: u64) -> SmbcResult<()> {
        self.flush(file)?;
        self.protocol.truncate(file, len)
    }

    /// Flush and close `file`.
    /// The descriptor is released even when the flush fails.
    pub fn close_file(&mut self, file: FileId) -> SmbcResult<()> {
        let flushed = self.flush(file);
        let Some(state) = self.files.remove(&file) else {
            return Err(SmbcError::ClosedHandle);
        };
        if !state.buffer.is_empty() {
            error!(
                "dropping {} unflushed bytes of {}",
                state.buffer.len(),
                state.uri
            );
        }
        let closed = self.protocol.close_file(file);
        flushed?;
        closed
    }

    /// Close every descriptor and shut the protocol down
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        debug!(
            "releasing context: closing {} files and {} directories",
            self.files.len(),
            self.dirs.len()
        );
        let files: Vec<FileId> = self.files.keys().copied().collect();
        for file in files {
            if let Err(err) = self.close_file(file) {
                error!("failed to close {:?}: {}", file, err);
            }
        }
        let dirs: Vec<DirId> = self.dirs.drain().collect();
        for dir in dirs {
            if let Err(err) = self.protocol.close_dir(dir) {
                error!("failed to close {:?}: {}", dir, err);
            }
        }
        self.protocol.shutdown();
        self.released = true;
    }
}
