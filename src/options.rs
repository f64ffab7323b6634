//! # options
//!
//! Context configuration

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;

use crate::auth::{CredentialLimits, CredentialResolver};
use crate::SmbcError;

bitflags! {
    /// Context option flags.
    ///
    /// The low bits share their values with libsmbclient's `SMBCCTX_FLAG_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        const USE_KERBEROS = 1 << 0;
        const FALLBACK_AFTER_KERBEROS = 1 << 1;
        const NO_AUTO_ANONYMOUS_LOGIN = 1 << 2;
        const USE_CCACHE = 1 << 3;
        const DEBUG_TO_STDERR = 1 << 4;
    }
}

/// A boolean option of the context, addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextOption {
    /// Log to standard error instead of standard output
    DebugToStderr,
    /// Never fall back to an anonymous login
    NoAutoAnonymousLogin,
    UseKerberos,
    FallbackAfterKerberos,
    UseCcache,
}

impl ContextOption {
    pub const ALL: [ContextOption; 5] = [
        Self::DebugToStderr,
        Self::NoAutoAnonymousLogin,
        Self::UseKerberos,
        Self::FallbackAfterKerberos,
        Self::UseCcache,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DebugToStderr => "debug_to_stderr",
            Self::NoAutoAnonymousLogin => "no_auto_anonymous_login",
            Self::UseKerberos => "use_kerberos",
            Self::FallbackAfterKerberos => "fallback_after_kerberos",
            Self::UseCcache => "use_ccache",
        }
    }

    /// The flag backing this option
    pub fn flag(&self) -> ContextFlags {
        match self {
            Self::DebugToStderr => ContextFlags::DEBUG_TO_STDERR,
            Self::NoAutoAnonymousLogin => ContextFlags::NO_AUTO_ANONYMOUS_LOGIN,
            Self::UseKerberos => ContextFlags::USE_KERBEROS,
            Self::FallbackAfterKerberos => ContextFlags::FALLBACK_AFTER_KERBEROS,
            Self::UseCcache => ContextFlags::USE_CCACHE,
        }
    }
}

impl fmt::Display for ContextOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContextOption {
    type Err = SmbcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|opt| opt.name() == s)
            .ok_or_else(|| SmbcError::InvalidArgument(format!("unknown option '{s}'")))
    }
}

/// Settings forwarded to the protocol whenever they change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolConfig {
    pub debug: u32,
    pub flags: ContextFlags,
}

/// Options used to create a [`crate::ClientContext`]
#[derive(Clone)]
pub struct ContextOptions {
    pub(crate) debug: u32,
    pub(crate) flags: ContextFlags,
    pub(crate) resolver: Option<Arc<dyn CredentialResolver>>,
    pub(crate) limits: CredentialLimits,
    pub(crate) dirent_batch_size: usize,
    pub(crate) write_buffer_size: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            debug: 0,
            flags: ContextFlags::empty(),
            resolver: None,
            limits: CredentialLimits::default(),
            dirent_batch_size: 64,
            write_buffer_size: 0,
        }
    }
}

impl ContextOptions {
    /// Set the debug level
    pub fn debug(mut self, level: u32) -> Self {
        self.debug = level;
        self
    }

    /// Set option flags
    pub fn flags(mut self, flags: ContextFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the resolver asked for credentials when a server requires them
    pub fn credential_resolver<R: CredentialResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the maximum lengths of resolved credentials
    pub fn credential_limits(mut self, limits: CredentialLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set how many directory entries are fetched per round trip
    pub fn dirent_batch_size(mut self, size: usize) -> Self {
        self.dirent_batch_size = size;
        self
    }

    /// Set the size of the per-file write buffer; 0 disables buffering
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub(crate) fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            debug: self.debug,
            flags: self.flags,
        }
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("debug", &self.debug)
            .field("flags", &self.flags)
            .field("resolver", &self.resolver.is_some())
            .field("limits", &self.limits)
            .field("dirent_batch_size", &self.dirent_batch_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .finish()
    }
}
