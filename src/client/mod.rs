//! # client
//!
//! Smb client context and the handles it creates

mod dir;
mod file;
mod session;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use remotefs::fs::UnixPex;

pub use self::dir::RemoteDirectoryHandle;
pub use self::file::RemoteFileHandle;
use self::session::Session;
use crate::auth::{AuthChallenge, CredentialLimits, CredentialResolver};
use crate::options::{ContextOption, ContextOptions};
#[cfg(target_family = "unix")]
use crate::protocol::PavaoProtocol;
use crate::protocol::{OpenFlags, RemoteFilesystemProtocol};
use crate::utils::uri::SmbUri;
use crate::{SmbcError, SmbcResult};

/// State shared between a context and its handles.
///
/// Handles only keep a `Weak` reference to it.
pub(crate) struct ContextInner {
    session: Mutex<Session>,
    resolver: RwLock<Option<Arc<dyn CredentialResolver>>>,
    limits: CredentialLimits,
}

impl ContextInner {
    /// Run `f` on the session, unless the context has been released
    pub(crate) fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> SmbcResult<T>,
    ) -> SmbcResult<T> {
        let mut session = self.session.lock();
        if session.is_released() {
            return Err(SmbcError::ClosedContext);
        }
        f(&mut *session)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.session.lock().is_released()
    }

    fn challenge(&self) -> AuthChallenge {
        AuthChallenge::new(self.resolver.read().clone(), self.limits)
    }
}

/// An SMB client context.
///
/// The context owns one protocol session and produces handles to remote
/// directories and files. Every operation performed through the context or
/// one of its handles is serialized by an internal lock, so handles may be
/// shared between threads.
///
/// Dropping the context closes every handle still open beneath it; any
/// further use of those handles fails with [`SmbcError::ClosedContext`].
pub struct ClientContext {
    inner: Arc<ContextInner>,
}

impl ClientContext {
    /// Create a context backed by libsmbclient.
    ///
    /// libsmbclient state is process-wide, so only one such context may be
    /// alive at a time; a second one fails with [`SmbcError::ContextInit`].
    #[cfg(target_family = "unix")]
    pub fn new(options: ContextOptions) -> SmbcResult<Self> {
        Self::with_protocol(options, PavaoProtocol::new()?)
    }

    /// Create a context on top of the provided protocol.
    /// Fails if the options are invalid or the protocol refuses them.
    pub fn with_protocol<P>(options: ContextOptions, mut protocol: P) -> SmbcResult<Self>
    where
        P: RemoteFilesystemProtocol + 'static,
    {
        trace!("-> ClientContext::new({:?})", options);
        if options.dirent_batch_size == 0 {
            return Err(SmbcError::ContextInit(
                "directory batch size must be positive".to_string(),
            ));
        }
        let config = options.protocol_config();
        if let Err(err) = protocol.configure(&config) {
            error!("could not configure protocol: {}", err);
            return Err(match err {
                SmbcError::ContextInit(_) => err,
                err => SmbcError::ContextInit(err.to_string()),
            });
        }
        let session = Session::new(
            Box::new(protocol),
            config,
            options.dirent_batch_size,
            options.write_buffer_size,
        );
        debug!("context initialized (debug: {})", config.debug);
        Ok(Self {
            inner: Arc::new(ContextInner {
                session: Mutex::new(session),
                resolver: RwLock::new(options.resolver),
                limits: options.limits,
            }),
        })
    }

    /// Open the directory at `uri` for enumeration
    pub fn open_dir<S: AsRef<str>>(&self, uri: S) -> SmbcResult<RemoteDirectoryHandle> {
        let uri = SmbUri::parse(uri)?;
        trace!("-> open_dir({})", uri);
        let challenge = self.inner.challenge();
        let id = self
            .inner
            .with_session(|session| session.open_dir(&uri, &challenge))
            .map_err(|err| {
                error!("<- open_dir({}) failed: {}", uri, err);
                err
            })?;
        trace!("<- open_dir({}) = {:?}", uri, id);
        Ok(RemoteDirectoryHandle::new(
            Arc::downgrade(&self.inner),
            id,
            uri,
        ))
    }

    /// Open the file at `uri`; `mode` is used when the file gets created
    pub fn open_file<S: AsRef<str>>(
        &self,
        uri: S,
        flags: OpenFlags,
        mode: UnixPex,
    ) -> SmbcResult<RemoteFileHandle> {
        let uri = SmbUri::parse(uri)?;
        trace!("-> open_file({}, {:?})", uri, flags);
        flags.validate()?;
        if uri.share().is_none() {
            return Err(SmbcError::invalid_uri(uri.as_str(), "missing share"));
        }
        let challenge = self.inner.challenge();
        let id = self
            .inner
            .with_session(|session| session.open_file(&uri, flags, mode, &challenge))
            .map_err(|err| {
                error!("<- open_file({}) failed: {}", uri, err);
                err
            })?;
        trace!("<- open_file({}) = {:?}", uri, id);
        Ok(RemoteFileHandle::new(
            Arc::downgrade(&self.inner),
            id,
            uri,
            flags,
        ))
    }

    /// Open the file at `uri` for reading
    pub fn open<S: AsRef<str>>(&self, uri: S) -> SmbcResult<RemoteFileHandle> {
        self.open_file(uri, OpenFlags::READ, UnixPex::from(0o644))
    }

    /// Replace the credential resolver.
    /// The next authentication challenge, including one raised for an open
    /// handle, uses the new resolver.
    pub fn set_credential_resolver<R: CredentialResolver + 'static>(&self, resolver: R) {
        debug!("credential resolver replaced");
        *self.inner.resolver.write() = Some(Arc::new(resolver));
    }

    pub fn clear_credential_resolver(&self) {
        debug!("credential resolver removed");
        *self.inner.resolver.write() = None;
    }

    pub fn has_credential_resolver(&self) -> bool {
        self.inner.resolver.read().is_some()
    }

    /// Debug level
    pub fn debug(&self) -> u32 {
        self.inner.session.lock().config().debug
    }

    pub fn set_debug(&self, level: u32) -> SmbcResult<()> {
        self.inner.with_session(|session| {
            let mut config = session.config();
            config.debug = level;
            session.reconfigure(config)
        })
    }

    /// Get the value of a boolean option
    pub fn option(&self, option: ContextOption) -> bool {
        self.inner
            .session
            .lock()
            .config()
            .flags
            .contains(option.flag())
    }

    pub fn set_option(&self, option: ContextOption, value: bool) -> SmbcResult<()> {
        trace!("setting option {} to {}", option, value);
        self.inner.with_session(|session| {
            let mut config = session.config();
            config.flags.set(option.flag(), value);
            session.reconfigure(config)
        })
    }

    /// Whether to log to standard error instead of standard output
    pub fn option_debug_to_stderr(&self) -> bool {
        self.option(ContextOption::DebugToStderr)
    }

    pub fn set_option_debug_to_stderr(&self, value: bool) -> SmbcResult<()> {
        self.set_option(ContextOption::DebugToStderr, value)
    }

    /// Whether automatic anonymous login is disabled
    pub fn option_no_auto_anonymous_login(&self) -> bool {
        self.option(ContextOption::NoAutoAnonymousLogin)
    }

    pub fn set_option_no_auto_anonymous_login(&self, value: bool) -> SmbcResult<()> {
        self.set_option(ContextOption::NoAutoAnonymousLogin, value)
    }

    /// Number of file handles currently open
    pub fn open_files(&self) -> usize {
        self.inner.session.lock().open_files()
    }

    /// Number of directory handles currently open
    pub fn open_dirs(&self) -> usize {
        self.inner.session.lock().open_dirs()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_released()
    }

    /// Release the context.
    /// Open handles are closed and the protocol session shut down.
    pub fn close(&self) {
        self.inner.session.lock().release();
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        self.close();
    }
}
