//! # auth
//!
//! Credential resolvers and the authentication challenge dispatched to them

use std::fmt;
use std::sync::Arc;

/// Credentials used to authenticate against a server/share pair
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthData {
    pub workgroup: String,
    pub username: String,
    pub password: String,
}

impl AuthData {
    pub fn new<S: AsRef<str>>(workgroup: S, username: S, password: S) -> Self {
        Self {
            workgroup: workgroup.as_ref().to_string(),
            username: username.as_ref().to_string(),
            password: password.as_ref().to_string(),
        }
    }
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("workgroup", &self.workgroup)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A credential request, carrying the credentials known so far
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub server: &'a str,
    pub share: &'a str,
    pub workgroup: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Supplies credentials when a server asks for them.
///
/// Returning `None` declines the request: the connection then proceeds with
/// the credentials it already had.
///
/// Any `Fn(&AuthRequest) -> Option<AuthData>` closure is a resolver.
/// Resolvers are invoked while the owning context is locked, so they must not
/// call back into it.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, request: &AuthRequest<'_>) -> Option<AuthData>;
}

impl<F> CredentialResolver for F
where
    F: Fn(&AuthRequest<'_>) -> Option<AuthData> + Send + Sync,
{
    fn resolve(&self, request: &AuthRequest<'_>) -> Option<AuthData> {
        self(request)
    }
}

/// Resolver answering every request with the same cached credentials
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    auth: AuthData,
}

impl StaticCredentials {
    pub fn new(auth: AuthData) -> Self {
        Self { auth }
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve(&self, _request: &AuthRequest<'_>) -> Option<AuthData> {
        Some(self.auth.clone())
    }
}

/// Maximum length in bytes of each resolved credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialLimits {
    pub workgroup: usize,
    pub username: usize,
    pub password: usize,
}

impl Default for CredentialLimits {
    fn default() -> Self {
        Self {
            workgroup: 255,
            username: 255,
            password: 255,
        }
    }
}

/// The authentication challenge handed to a protocol on `connect`.
///
/// Holds a snapshot of the resolver configured on the context when the
/// operation started.
#[derive(Clone, Default)]
pub struct AuthChallenge {
    resolver: Option<Arc<dyn CredentialResolver>>,
    limits: CredentialLimits,
}

impl AuthChallenge {
    pub fn new(resolver: Option<Arc<dyn CredentialResolver>>, limits: CredentialLimits) -> Self {
        Self { resolver, limits }
    }

    /// Returns whether a resolver is configured
    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Ask the resolver for credentials for `server`/`share`.
    ///
    /// `auth` holds the current credentials and is only updated when the
    /// resolver answers; answers are truncated to the configured limits.
    pub fn respond(&self, server: &str, share: &str, auth: &mut AuthData) {
        trace!("-> auth challenge (server={}, share={})", server, share);
        let Some(resolver) = self.resolver.as_ref() else {
            trace!("<- auth challenge, no resolver");
            return;
        };
        if server.is_empty() {
            trace!("<- auth challenge, no server");
            return;
        }
        let request = AuthRequest {
            server,
            share,
            workgroup: &auth.workgroup,
            username: &auth.username,
            password: &auth.password,
        };
        let Some(resolved) = resolver.resolve(&request) else {
            debug!("<- auth challenge, resolver declined");
            return;
        };
        auth.workgroup = truncate("workgroup", resolved.workgroup, self.limits.workgroup);
        auth.username = truncate("username", resolved.username, self.limits.username);
        auth.password = truncate("password", resolved.password, self.limits.password);
        trace!("<- auth challenge, got credentials for {}", auth.username);
    }
}

/// Cut `value` at the last char boundary not exceeding `max` bytes
fn truncate(field: &str, mut value: String, max: usize) -> String {
    if value.len() > max {
        let mut end = max;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        debug!(
            "resolved {} is {} bytes long; truncated to {}",
            field,
            value.len(),
            end
        );
        value.truncate(end);
    }
    value
}
