//! ## Mock
//!
//! Contains mock for test units

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::Mutex;
use remotefs::fs::UnixPex;

use crate::auth::{AuthChallenge, AuthData};
use crate::options::ProtocolConfig;
use crate::protocol::{DirEntry, DirId, FileId, OpenFlags, RemoteFilesystemProtocol};
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

// -- logger

#[allow(dead_code)]
pub fn logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// -- protocol

/// State of the in-memory server, shared between the test and the protocol
#[derive(Default)]
pub struct MockServer {
    /// Content of files, keyed by `server/share/path`
    pub files: HashMap<String, Vec<u8>>,
    /// Directory listings, keyed by `server/share/path`
    pub dirs: HashMap<String, Vec<DirEntry>>,
    /// Credentials required by each server
    pub required: HashMap<String, AuthData>,
    /// Paths that can't be opened for writing
    pub read_only: Vec<String>,
    /// Credentials received on each connect
    pub challenges: Vec<(String, String, AuthData)>,
    pub configs: Vec<ProtocolConfig>,
    pub refuse_config: bool,
    /// Maximum bytes accepted by a single write
    pub max_write: Option<usize>,
    /// Number of writes accepted before writes start failing
    pub failing_writes_after: Option<usize>,
    /// Number of directory batches served before enumeration fails
    pub failing_read_dir_after: Option<usize>,
    pub read_dir_calls: usize,
    pub open_files: usize,
    pub open_dirs: usize,
    pub shutdown: bool,
}

impl MockServer {
    pub fn file<S: AsRef<str>>(&mut self, key: S, content: &[u8]) {
        self.files.insert(key.as_ref().to_string(), content.to_vec());
    }

    pub fn dir<S: AsRef<str>>(&mut self, key: S, entries: Vec<DirEntry>) {
        self.dirs.insert(key.as_ref().to_string(), entries);
    }
}

/// Sessions are bound to a server and share
fn session_key(uri: &SmbUri) -> (String, String) {
    (
        uri.server().to_string(),
        uri.share().unwrap_or_default().to_string(),
    )
}

fn key(uri: &SmbUri) -> String {
    match uri.share() {
        Some(share) => format!("{}/{}{}", uri.server(), share, uri.path()),
        None => uri.server().to_string(),
    }
}

struct MockFile {
    key: String,
    flags: OpenFlags,
    pos: u64,
}

struct MockDir {
    entries: Vec<DirEntry>,
    cursor: usize,
}

/// In-memory `RemoteFilesystemProtocol`
pub struct MockProtocol {
    server: Arc<Mutex<MockServer>>,
    sessions: Vec<(String, String)>,
    files: HashMap<FileId, MockFile>,
    dirs: HashMap<DirId, MockDir>,
    next_id: u64,
}

impl MockProtocol {
    pub fn new() -> (Self, Arc<Mutex<MockServer>>) {
        let server = Arc::new(Mutex::new(MockServer::default()));
        (
            Self {
                server: server.clone(),
                sessions: Vec::new(),
                files: HashMap::new(),
                dirs: HashMap::new(),
                next_id: 1,
            },
            server,
        )
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_session(&self, uri: &SmbUri) -> SmbcResult<()> {
        if self.sessions.contains(&session_key(uri)) {
            Ok(())
        } else {
            Err(SmbcError::Connection(format!("not connected to {uri}")))
        }
    }
}

impl RemoteFilesystemProtocol for MockProtocol {
    fn configure(&mut self, config: &ProtocolConfig) -> SmbcResult<()> {
        let mut server = self.server.lock();
        if server.refuse_config {
            return Err(SmbcError::ContextInit("out of memory".to_string()));
        }
        server.configs.push(*config);
        Ok(())
    }

    fn connect(&mut self, uri: &SmbUri, challenge: &AuthChallenge) -> SmbcResult<()> {
        if self.sessions.contains(&session_key(uri)) {
            return Ok(());
        }
        let mut auth = AuthData::new(
            uri.workgroup().unwrap_or_default(),
            uri.username().unwrap_or_default(),
            uri.password().unwrap_or_default(),
        );
        let share = uri.share().unwrap_or_default();
        challenge.respond(uri.server(), share, &mut auth);
        let mut server = self.server.lock();
        server
            .challenges
            .push((uri.server().to_string(), share.to_string(), auth.clone()));
        if let Some(required) = server.required.get(uri.server()) {
            if *required != auth {
                return Err(SmbcError::Authentication {
                    server: uri.server().to_string(),
                    share: share.to_string(),
                });
            }
        }
        self.sessions.push(session_key(uri));
        Ok(())
    }

    fn open_dir(&mut self, uri: &SmbUri) -> SmbcResult<DirId> {
        self.check_session(uri)?;
        let mut server = self.server.lock();
        let entries = server
            .dirs
            .get(&key(uri))
            .cloned()
            .ok_or_else(|| SmbcError::NotFound(uri.to_string()))?;
        server.open_dirs += 1;
        drop(server);
        let id = DirId(self.next_id());
        self.dirs.insert(id, MockDir { entries, cursor: 0 });
        Ok(id)
    }

    fn read_dir(&mut self, dir: DirId, max: usize) -> SmbcResult<Vec<DirEntry>> {
        let mut server = self.server.lock();
        if server
            .failing_read_dir_after
            .is_some_and(|n| server.read_dir_calls >= n)
        {
            return Err(SmbcError::Connection("connection reset by peer".to_string()));
        }
        server.read_dir_calls += 1;
        let dir = self.dirs.get_mut(&dir).ok_or(SmbcError::ClosedHandle)?;
        let end = (dir.cursor + max).min(dir.entries.len());
        let batch = dir.entries[dir.cursor..end].to_vec();
        dir.cursor = end;
        Ok(batch)
    }

    fn close_dir(&mut self, dir: DirId) -> SmbcResult<()> {
        self.dirs.remove(&dir).ok_or(SmbcError::ClosedHandle)?;
        self.server.lock().open_dirs -= 1;
        Ok(())
    }

    fn open_file(
        &mut self,
        uri: &SmbUri,
        flags: OpenFlags,
        _mode: UnixPex,
    ) -> SmbcResult<FileId> {
        self.check_session(uri)?;
        let key = key(uri);
        let mut server = self.server.lock();
        if flags.contains(OpenFlags::WRITE) && server.read_only.contains(&key) {
            return Err(SmbcError::PermissionDenied(uri.to_string()));
        }
        let exists = server.files.contains_key(&key);
        if exists && flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
            return Err(SmbcError::InvalidArgument(format!("{uri} already exists")));
        }
        if !exists && !flags.contains(OpenFlags::CREATE) {
            return Err(SmbcError::NotFound(uri.to_string()));
        }
        let content = server.files.entry(key.clone()).or_default();
        if flags.contains(OpenFlags::TRUNCATE) {
            content.clear();
        }
        server.open_files += 1;
        drop(server);
        let id = FileId(self.next_id());
        self.files.insert(id, MockFile { key, flags, pos: 0 });
        Ok(id)
    }

    fn read(&mut self, file: FileId, buf: &mut [u8]) -> SmbcResult<usize> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let server = self.server.lock();
        let content = server
            .files
            .get(&file.key)
            .ok_or_else(|| SmbcError::NotFound(file.key.clone()))?;
        let start = (file.pos as usize).min(content.len());
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: FileId, data: &[u8]) -> SmbcResult<usize> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let mut server = self.server.lock();
        if let Some(n) = server.failing_writes_after {
            if n == 0 {
                return Err(SmbcError::Connection("broken pipe".to_string()));
            }
            server.failing_writes_after = Some(n - 1);
        }
        let n = server.max_write.unwrap_or(usize::MAX).min(data.len());
        let content = server
            .files
            .get_mut(&file.key)
            .ok_or_else(|| SmbcError::NotFound(file.key.clone()))?;
        if file.flags.contains(OpenFlags::APPEND) {
            file.pos = content.len() as u64;
        }
        let start = file.pos as usize;
        if content.len() < start + n {
            content.resize(start + n, 0);
        }
        content[start..start + n].copy_from_slice(&data[..n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, file: FileId, pos: SeekFrom) -> SmbcResult<u64> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let size = self
            .server
            .lock()
            .files
            .get(&file.key)
            .map(|c| c.len() as u64)
            .unwrap_or_default();
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => file.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
        };
        file.pos = new_pos
            .ok_or_else(|| SmbcError::InvalidArgument(format!("invalid seek to {pos:?}")))?;
        Ok(file.pos)
    }

    fn truncate(&mut self, file: FileId, len: u64) -> SmbcResult<()> {
        let file = self.files.get(&file).ok_or(SmbcError::ClosedHandle)?;
        let mut server = self.server.lock();
        let content = server
            .files
            .get_mut(&file.key)
            .ok_or_else(|| SmbcError::NotFound(file.key.clone()))?;
        content.resize(len as usize, 0);
        Ok(())
    }

    fn close_file(&mut self, file: FileId) -> SmbcResult<()> {
        self.files.remove(&file).ok_or(SmbcError::ClosedHandle)?;
        self.server.lock().open_files -= 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.sessions.clear();
        self.server.lock().shutdown = true;
    }
}
