//! Session credential bootstrap.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use super::{StateError, TallyState};

/// Something that can produce a fresh session credential, typically by
/// walking a human through a login.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn request_credential(&self) -> Result<String, Self::Error>;
}

/// How the session for this run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// A stored credential was reused.
    Restored,
    /// A new credential was obtained and saved.
    FreshLogin,
}

/// Errors from [`ensure_credential`].
#[derive(Debug, Error)]
pub enum CredentialError<E: std::error::Error + 'static> {
    #[error("Login failed: {0}")]
    Login(#[source] E),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Makes sure `state` carries a session credential.
///
/// A stored credential is kept as is. Otherwise a new one is requested
/// from `provider` and the state is saved to `path` right away, before
/// any scanning happens.
pub async fn ensure_credential<P>(
    state: &mut TallyState,
    path: &Path,
    provider: &P,
) -> Result<SessionOrigin, CredentialError<P::Error>>
where
    P: CredentialProvider + ?Sized,
{
    if state.has_credential() {
        return Ok(SessionOrigin::Restored);
    }

    let credential = provider
        .request_credential()
        .await
        .map_err(CredentialError::Login)?;
    state.session_credential = credential;

    info!("Session initialized. Saving session credential to {}", path.display());
    state.save(path)?;

    Ok(SessionOrigin::FreshLogin)
}
