//! # smbclient
//!
//! `RemoteFilesystemProtocol` implemented on top of pavao (libsmbclient)

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use libc::mode_t;
use pavao::{SmbClient, SmbCredentials, SmbOpenOptions, SmbOptions};
use remotefs::fs::UnixPex;

use super::{DirEntry, DirId, FileId, OpenFlags, RemoteFilesystemProtocol};
use crate::auth::{AuthChallenge, AuthData};
use crate::options::{ContextFlags, ProtocolConfig};
use crate::utils::smb as smb_utils;
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

/// pavao keeps a single libsmbclient context for the whole process, which is
/// freed whenever one of its clients is dropped. Only one `PavaoProtocol` may
/// be alive at a time.
static IN_USE: AtomicBool = AtomicBool::new(false);

/// Chunk size used when growing or rewriting a file
const CHUNK_SIZE: usize = 64 * 1024;

/// Server and share a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionKey {
    host: String,
    share: String,
}

impl From<&SmbUri> for SessionKey {
    fn from(uri: &SmbUri) -> Self {
        Self {
            host: uri.host(),
            share: uri.share().unwrap_or_default().to_string(),
        }
    }
}

/// A file opened through pavao.
///
/// pavao files borrow their client, so the file is reopened for every
/// operation and the position is tracked here.
struct OpenFile {
    uri: SmbUri,
    flags: OpenFlags,
    mode: UnixPex,
    pos: u64,
}

impl OpenFile {
    /// Options to reopen an already created file
    fn reopen_options(&self) -> SmbOpenOptions {
        SmbOpenOptions::default()
            .read(self.flags.contains(OpenFlags::READ))
            .write(self.flags.contains(OpenFlags::WRITE))
            .append(self.flags.contains(OpenFlags::APPEND))
            .mode(u32::from(self.mode) as mode_t)
    }
}

/// SMB protocol backed by libsmbclient.
///
/// libsmbclient is driven through a single pavao client, bound to one server
/// and share at a time. Moving to another share replaces the client, which is
/// refused while files are open. Directory listings are fetched whole when
/// the directory is opened.
pub struct PavaoProtocol {
    config: ProtocolConfig,
    session: Option<(SessionKey, SmbClient)>,
    files: HashMap<FileId, OpenFile>,
    dirs: HashMap<DirId, VecDeque<DirEntry>>,
    next_id: u64,
}

// SAFETY: libsmbclient contexts may be moved between threads as long as they
// are not used concurrently; the owning `ClientContext` serializes every call.
unsafe impl Send for PavaoProtocol {}

impl PavaoProtocol {
    /// Claim the libsmbclient context of this process.
    /// Fails while another `PavaoProtocol` is alive.
    pub fn new() -> SmbcResult<Self> {
        if IN_USE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SmbcError::ContextInit(
                "libsmbclient context already in use by another context".to_string(),
            ));
        }
        Ok(Self {
            config: ProtocolConfig::default(),
            session: None,
            files: HashMap::new(),
            dirs: HashMap::new(),
            next_id: 1,
        })
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn smb_options(&self) -> SmbOptions {
        let flags = self.config.flags;
        SmbOptions::default()
            .case_sensitive(false)
            .one_share_per_server(true)
            .no_auto_anonymous_login(flags.contains(ContextFlags::NO_AUTO_ANONYMOUS_LOGIN))
            .use_kerberos(flags.contains(ContextFlags::USE_KERBEROS))
            .fallback_after_kerberos(flags.contains(ContextFlags::FALLBACK_AFTER_KERBEROS))
            .use_ccache(flags.contains(ContextFlags::USE_CCACHE))
    }

    fn client(&self) -> SmbcResult<&SmbClient> {
        Self::session_client(&self.session)
    }

    fn session_client(session: &Option<(SessionKey, SmbClient)>) -> SmbcResult<&SmbClient> {
        session
            .as_ref()
            .map(|(_, client)| client)
            .ok_or_else(|| SmbcError::Connection("session closed".to_string()))
    }

    /// Drop the current client; refused while files still need it
    fn end_session(&mut self, reason: &'static str) -> SmbcResult<()> {
        if let Some((key, _)) = &self.session {
            if !self.files.is_empty() {
                return Err(SmbcError::Unsupported(reason));
            }
            debug!("closing session to {}/{}", key.host, key.share);
        }
        self.session = None;
        Ok(())
    }

    /// Open `file` and move to its current position
    fn reopen<'a>(
        client: &'a SmbClient,
        file: &OpenFile,
    ) -> SmbcResult<impl Read + Write + Seek + 'a> {
        let mut smb_file = client
            .open_with(file.uri.path(), file.reopen_options())
            .map_err(|e| smb_utils::smb_error(e, &file.uri))?;
        smb_file
            .seek(SeekFrom::Start(file.pos))
            .map_err(|e| smb_utils::io_error(e, &file.uri))?;
        Ok(smb_file)
    }

    fn file_size(client: &SmbClient, file: &OpenFile) -> SmbcResult<u64> {
        client
            .stat(file.uri.path())
            .map(|stat| stat.size)
            .map_err(|e| smb_utils::smb_error(e, &file.uri))
    }

    /// Append `len` zero bytes to `uri`
    fn grow(client: &SmbClient, uri: &SmbUri, mode: UnixPex, mut len: u64) -> SmbcResult<()> {
        let mut smb_file = client
            .open_with(
                uri.path(),
                SmbOpenOptions::default()
                    .write(true)
                    .append(true)
                    .mode(u32::from(mode) as mode_t),
            )
            .map_err(|e| smb_utils::smb_error(e, uri))?;
        let zeros = [0u8; CHUNK_SIZE];
        while len > 0 {
            let n = usize::try_from(len).map_or(CHUNK_SIZE, |len| len.min(CHUNK_SIZE));
            smb_file
                .write_all(&zeros[..n])
                .map_err(|e| smb_utils::io_error(e, uri))?;
            len -= n as u64;
        }
        Ok(())
    }

    /// Cut `uri` to `len` bytes.
    ///
    /// The kept prefix is copied to a sibling file which then replaces the
    /// original, so a failure leaves the original untouched.
    fn shrink(client: &SmbClient, uri: &SmbUri, mode: UnixPex, len: u64) -> SmbcResult<()> {
        let tmp = format!("{}.{}.truncate", uri.path(), std::process::id());
        let copied = (|| -> io::Result<u64> {
            let source = client
                .open_with(uri.path(), SmbOpenOptions::default().read(true))
                .map_err(smb_to_io)?;
            let mut target = client
                .open_with(
                    &tmp,
                    SmbOpenOptions::default()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .mode(u32::from(mode) as mode_t),
                )
                .map_err(smb_to_io)?;
            io::copy(&mut source.take(len), &mut target)
        })();
        let renamed = match copied {
            Ok(n) if n == len => client
                .rename(tmp.as_str(), uri.path())
                .map_err(|e| smb_utils::smb_error(e, uri)),
            Ok(n) => Err(SmbcError::Connection(format!(
                "{uri}: copied {n} of {len} bytes while truncating"
            ))),
            Err(err) => Err(smb_utils::io_error(err, uri)),
        };
        if renamed.is_err() {
            if let Err(err) = client.unlink(tmp.as_str()) {
                debug!("could not remove {}: {}", tmp, err);
            }
        }
        renamed
    }
}

fn smb_to_io(err: pavao::SmbError) -> io::Error {
    match err {
        pavao::SmbError::Io(err) => err,
        err => io::Error::new(io::ErrorKind::Other, err.to_string()),
    }
}

impl Drop for PavaoProtocol {
    fn drop(&mut self) {
        self.session = None;
        IN_USE.store(false, Ordering::Release);
    }
}

impl RemoteFilesystemProtocol for PavaoProtocol {
    fn configure(&mut self, config: &ProtocolConfig) -> SmbcResult<()> {
        debug!(
            "configuring libsmbclient (debug: {}, flags: {:?})",
            config.debug, config.flags
        );
        if config.debug != 0 || config.flags.contains(ContextFlags::DEBUG_TO_STDERR) {
            return Err(SmbcError::Unsupported(
                "libsmbclient debug output is not configurable through pavao",
            ));
        }
        if config.flags != self.config.flags {
            // options are applied when the client is created
            self.end_session("changing options while files are open")?;
        }
        self.config = *config;
        Ok(())
    }

    fn connect(&mut self, uri: &SmbUri, challenge: &AuthChallenge) -> SmbcResult<()> {
        let key = SessionKey::from(uri);
        if matches!(&self.session, Some((current, _)) if *current == key) {
            trace!("reusing session to {}/{}", key.host, key.share);
            return Ok(());
        }
        self.end_session("files are open on another share")?;
        let mut auth = AuthData::new(
            uri.workgroup().unwrap_or_default(),
            uri.username().unwrap_or_default(),
            uri.password().unwrap_or_default(),
        );
        challenge.respond(uri.server(), &key.share, &mut auth);
        let share = if key.share.is_empty() {
            String::new()
        } else {
            format!("/{}", key.share)
        };
        debug!(
            "opening session to smb://{}{} as {}",
            key.host, share, auth.username
        );
        let credentials = SmbCredentials::default()
            .server(format!("smb://{}", key.host))
            .share(share)
            .username(auth.username)
            .password(auth.password)
            .workgroup(auth.workgroup);
        let client = SmbClient::new(credentials, self.smb_options()).map_err(|e| {
            error!("could not create smb context: {}", e);
            SmbcError::Connection(format!("{uri}: {e}"))
        })?;
        self.session = Some((key, client));
        Ok(())
    }

    fn open_dir(&mut self, uri: &SmbUri) -> SmbcResult<DirId> {
        trace!("listing {}", uri);
        let entries: VecDeque<DirEntry> = self
            .client()?
            .list_dir(uri.path())
            .map_err(|e| smb_utils::smb_error(e, uri))?
            .iter()
            .map(smb_utils::dirent_to_entry)
            .collect();
        let id = DirId(self.next_id());
        debug!("{} has {} entries", uri, entries.len());
        self.dirs.insert(id, entries);
        Ok(id)
    }

    fn read_dir(&mut self, dir: DirId, max: usize) -> SmbcResult<Vec<DirEntry>> {
        let entries = self.dirs.get_mut(&dir).ok_or(SmbcError::ClosedHandle)?;
        let n = max.min(entries.len());
        Ok(entries.drain(..n).collect())
    }

    fn close_dir(&mut self, dir: DirId) -> SmbcResult<()> {
        self.dirs
            .remove(&dir)
            .map(|_| ())
            .ok_or(SmbcError::ClosedHandle)
    }

    fn open_file(
        &mut self,
        uri: &SmbUri,
        flags: OpenFlags,
        mode: UnixPex,
    ) -> SmbcResult<FileId> {
        trace!("opening {} with {:?}", uri, flags);
        let options = SmbOpenOptions::default()
            .read(flags.contains(OpenFlags::READ))
            .write(flags.contains(OpenFlags::WRITE))
            .append(flags.contains(OpenFlags::APPEND))
            .create(flags.contains(OpenFlags::CREATE))
            .truncate(flags.contains(OpenFlags::TRUNCATE))
            .exclusive(flags.contains(OpenFlags::EXCLUSIVE))
            .mode(u32::from(mode) as mode_t);
        // open once to create/truncate the file and check permissions
        drop(
            self.client()?
                .open_with(uri.path(), options)
                .map_err(|e| smb_utils::smb_error(e, uri))?,
        );
        let id = FileId(self.next_id());
        self.files.insert(
            id,
            OpenFile {
                uri: uri.clone(),
                flags: flags - (OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::EXCLUSIVE),
                mode,
                pos: 0,
            },
        );
        Ok(id)
    }

    fn read(&mut self, file: FileId, buf: &mut [u8]) -> SmbcResult<usize> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let client = Self::session_client(&self.session)?;
        let mut smb_file = Self::reopen(client, file)?;
        let n = smb_file
            .read(buf)
            .map_err(|e| smb_utils::io_error(e, &file.uri))?;
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: FileId, data: &[u8]) -> SmbcResult<usize> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let client = Self::session_client(&self.session)?;
        let mut smb_file = Self::reopen(client, file)?;
        let n = smb_file
            .write(data)
            .map_err(|e| smb_utils::io_error(e, &file.uri))?;
        file.pos = if file.flags.contains(OpenFlags::APPEND) {
            smb_file
                .stream_position()
                .map_err(|e| smb_utils::io_error(e, &file.uri))?
        } else {
            file.pos + n as u64
        };
        Ok(n)
    }

    fn seek(&mut self, file: FileId, pos: SeekFrom) -> SmbcResult<u64> {
        let file = self.files.get_mut(&file).ok_or(SmbcError::ClosedHandle)?;
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => file.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let client = Self::session_client(&self.session)?;
                Self::file_size(client, file)?.checked_add_signed(delta)
            }
        };
        file.pos = new_pos.ok_or_else(|| {
            SmbcError::InvalidArgument(format!("invalid seek to {pos:?}"))
        })?;
        Ok(file.pos)
    }

    /// pavao exposes no `ftruncate`: growing appends zeros, shrinking
    /// replaces the file with a copy of its prefix
    fn truncate(&mut self, file: FileId, len: u64) -> SmbcResult<()> {
        let file = self.files.get(&file).ok_or(SmbcError::ClosedHandle)?;
        let client = self.client()?;
        let size = Self::file_size(client, file)?;
        match len.cmp(&size) {
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Greater => Self::grow(client, &file.uri, file.mode, len - size),
            std::cmp::Ordering::Less => Self::shrink(client, &file.uri, file.mode, len),
        }
    }

    fn close_file(&mut self, file: FileId) -> SmbcResult<()> {
        self.files
            .remove(&file)
            .map(|_| ())
            .ok_or(SmbcError::ClosedHandle)
    }

    fn shutdown(&mut self) {
        debug!(
            "shutting down libsmbclient ({} files, {} directories still open)",
            self.files.len(),
            self.dirs.len()
        );
        self.files.clear();
        self.dirs.clear();
        self.session = None;
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;
    #[cfg(feature = "with-containers")]
    use crate::auth::{CredentialLimits, StaticCredentials};

    #[test]
    #[serial]
    fn should_allow_one_protocol_at_a_time() {
        let protocol = PavaoProtocol::new().unwrap();
        assert!(matches!(
            PavaoProtocol::new(),
            Err(SmbcError::ContextInit(_))
        ));
        drop(protocol);
        assert!(PavaoProtocol::new().is_ok());
    }

    #[test]
    #[serial]
    fn should_refuse_debug_settings() {
        let mut protocol = PavaoProtocol::new().unwrap();
        assert!(matches!(
            protocol.configure(&ProtocolConfig {
                debug: 3,
                flags: ContextFlags::empty(),
            }),
            Err(SmbcError::Unsupported(_))
        ));
        assert!(matches!(
            protocol.configure(&ProtocolConfig {
                debug: 0,
                flags: ContextFlags::DEBUG_TO_STDERR,
            }),
            Err(SmbcError::Unsupported(_))
        ));
        let config = ProtocolConfig {
            debug: 0,
            flags: ContextFlags::USE_KERBEROS,
        };
        protocol.configure(&config).unwrap();
        assert_eq!(protocol.config, config);
    }

    #[test]
    #[serial]
    #[cfg(feature = "with-containers")]
    fn should_write_and_read_file() {
        crate::mock::logger();
        let (mut protocol, uri) = init_protocol("smb://localhost:3445/temp/cargo-test-a.txt");
        let file = protocol
            .open_file(
                &uri,
                OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                UnixPex::from(0o644),
            )
            .unwrap();
        assert_eq!(protocol.write(file, b"test data\n").unwrap(), 10);
        assert_eq!(protocol.seek(file, SeekFrom::Start(5)).unwrap(), 5);
        let mut buf = [0; 16];
        assert_eq!(protocol.read(file, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"data\n");
        assert_eq!(protocol.read(file, &mut buf).unwrap(), 0);
        protocol.truncate(file, 4).unwrap();
        assert_eq!(protocol.seek(file, SeekFrom::End(0)).unwrap(), 4);
        protocol.truncate(file, CHUNK_SIZE as u64 + 6).unwrap();
        assert_eq!(
            protocol.seek(file, SeekFrom::End(0)).unwrap(),
            CHUNK_SIZE as u64 + 6
        );
        protocol.seek(file, SeekFrom::Start(0)).unwrap();
        assert_eq!(protocol.read(file, &mut buf).unwrap(), 16);
        assert_eq!(&buf[..6], b"test\0\0");
        protocol.close_file(file).unwrap();
        protocol.shutdown();
    }

    #[test]
    #[serial]
    #[cfg(feature = "with-containers")]
    fn should_refuse_another_share_while_files_are_open() {
        crate::mock::logger();
        let (mut protocol, uri) = init_protocol("smb://localhost:3445/temp/cargo-test-b.txt");
        let file = protocol
            .open_file(
                &uri,
                OpenFlags::WRITE | OpenFlags::CREATE,
                UnixPex::from(0o644),
            )
            .unwrap();
        let other = SmbUri::parse("smb://localhost:3445/other").unwrap();
        assert!(matches!(
            protocol.connect(&other, &AuthChallenge::default()),
            Err(SmbcError::Unsupported(_))
        ));
        protocol.close_file(file).unwrap();
        protocol.shutdown();
    }

    #[test]
    #[serial]
    #[cfg(feature = "with-containers")]
    fn should_list_share() {
        crate::mock::logger();
        let (mut protocol, uri) = init_protocol("smb://localhost:3445/temp");
        let dir = protocol.open_dir(&uri).unwrap();
        let entries = protocol.read_dir(dir, 1024).unwrap();
        assert!(entries.iter().all(|e| !e.name.is_empty()));
        assert!(protocol.read_dir(dir, 1024).unwrap().is_empty());
        protocol.close_dir(dir).unwrap();
        protocol.shutdown();
    }

    #[test]
    #[serial]
    #[cfg(feature = "with-containers")]
    fn should_not_open_missing_file() {
        crate::mock::logger();
        let (mut protocol, uri) = init_protocol("smb://localhost:3445/temp/aaaa/bbbb/c.txt");
        assert!(protocol
            .open_file(&uri, OpenFlags::READ, UnixPex::from(0o644))
            .is_err());
        protocol.shutdown();
    }

    #[cfg(feature = "with-containers")]
    fn init_protocol(uri: &str) -> (PavaoProtocol, SmbUri) {
        let uri = SmbUri::parse(uri).unwrap();
        let mut protocol = PavaoProtocol::new().unwrap();
        protocol.configure(&ProtocolConfig::default()).unwrap();
        let challenge = AuthChallenge::new(
            Some(std::sync::Arc::new(StaticCredentials::new(AuthData::new(
                "pavao", "test", "test",
            )))),
            CredentialLimits::default(),
        );
        protocol.connect(&uri, &challenge).unwrap();
        (protocol, uri)
    }
}
