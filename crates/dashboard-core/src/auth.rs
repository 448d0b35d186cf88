//! Bearer token sources.
//!
//! The authentication provider itself lives outside this workspace. All the
//! data layer needs from it is the current bearer token, which the provider
//! persists locally; [`TokenSource`] is that seam.

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Supplies the bearer token attached to outgoing requests.
#[async_trait]
pub trait TokenSource: Send + Sync + Debug {
    /// Returns the current token, or `None` when signed out.
    ///
    /// A missing token is not an error; the request proceeds without one.
    async fn token(&self) -> Option<String>;
}

/// A fixed token, mostly for tests and scripts.
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Creates a source that always returns `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Creates a source that never has a token.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from a file written by the authentication provider.
///
/// The file is read on every call so a token refreshed by the provider is
/// picked up without restarting. Surrounding whitespace is trimmed and an
/// empty file counts as signed out.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenSource for FileTokenStore {
    async fn token(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    trace!(path = %self.path.display(), "Token file is empty");
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No token file");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read token file");
                None
            }
        }
    }
}
