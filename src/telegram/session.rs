//! Session credential handling and interactive login.
//!
//! The credential stored in the totals file is the base64-encoded grammers
//! session database. A non-empty credential is unpacked into the session
//! file before connecting; a fresh login packs the new session back up.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{error, info};

use super::{TelegramBot, TelegramError};
use crate::tally::CredentialProvider;

/// Attempts allowed for each of the code and password prompts.
const MAX_LOGIN_ATTEMPTS: u32 = 3;

/// Encodes session bytes as a credential string.
#[must_use]
pub fn encode_credential(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a credential string back into session bytes.
///
/// # Errors
///
/// Returns an error if the credential is not valid base64.
pub fn decode_credential(credential: &str) -> Result<Vec<u8>, TelegramError> {
    STANDARD
        .decode(credential.trim())
        .map_err(|e| TelegramError::Session(format!("stored credential is not valid: {e}")))
}

/// Writes the stored credential to the session file unless one already exists.
///
/// An existing session file is newer than any snapshot of it, so it wins.
/// Returns whether the file was written.
///
/// # Errors
///
/// Returns an error if the credential cannot be decoded or written.
pub fn prepare_session_file(path: &Path, credential: &str) -> Result<bool, TelegramError> {
    if credential.trim().is_empty() || path.exists() {
        return Ok(false);
    }

    let bytes = decode_credential(credential)?;
    std::fs::write(path, bytes).map_err(|e| {
        TelegramError::Session(format!("failed to write session file {}: {}", path.display(), e))
    })?;
    info!("Restored session file {} from stored credential", path.display());
    Ok(true)
}

/// Source of the answers an interactive login needs.
pub trait LoginPrompt {
    /// Asks for the account's phone number.
    fn phone_number(&self) -> io::Result<String>;

    /// Asks for the login code Telegram just sent.
    fn login_code(&self) -> io::Result<String>;

    /// Asks for the 2FA password.
    fn password(&self, hint: Option<&str>) -> io::Result<String>;

    /// Reports a failed step to the operator.
    fn report_error(&self, err: &TelegramError) {
        error!("{}", err);
    }
}

/// Obtains a credential by logging in through a [`LoginPrompt`].
#[derive(Debug)]
pub struct InteractiveLogin<'a, P> {
    bot: &'a TelegramBot,
    api_hash: &'a str,
    prompt: P,
}

impl<'a, P: LoginPrompt> InteractiveLogin<'a, P> {
    #[must_use]
    pub const fn new(bot: &'a TelegramBot, api_hash: &'a str, prompt: P) -> Self {
        Self { bot, api_hash, prompt }
    }

    fn ask(answer: io::Result<String>) -> Result<String, TelegramError> {
        answer.map(|s| s.trim().to_owned()).map_err(TelegramError::Prompt)
    }

    async fn login(&self) -> Result<(), TelegramError> {
        info!("Authentication required");

        let phone = Self::ask(self.prompt.phone_number())?;
        let token = self.bot.request_login_code(&phone, self.api_hash).await?;
        info!("Login code sent to your Telegram app");

        let mut attempt = 0;
        let mut password_token = loop {
            attempt += 1;
            let code = Self::ask(self.prompt.login_code())?;
            match self.bot.sign_in(&token, &code).await {
                Ok(()) => return Ok(()),
                Err(TelegramError::PasswordRequired(password_token)) => break password_token,
                Err(e @ TelegramError::InvalidCode) if attempt < MAX_LOGIN_ATTEMPTS => {
                    self.prompt.report_error(&e);
                }
                Err(e) => {
                    self.prompt.report_error(&e);
                    return Err(e);
                }
            }
        };

        info!("Two-factor authentication is enabled");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let hint = password_token.hint().map(str::to_owned);
            let password = self
                .prompt
                .password(hint.as_deref())
                .map_err(TelegramError::Prompt)?;

            match self.bot.check_password(password_token, &password).await {
                Ok(()) => return Ok(()),
                Err(TelegramError::InvalidPassword(next)) if attempt < MAX_LOGIN_ATTEMPTS => {
                    error!("Invalid password, {} attempt(s) left", MAX_LOGIN_ATTEMPTS - attempt);
                    password_token = next;
                }
                Err(e) => {
                    self.prompt.report_error(&e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<P: LoginPrompt + Send + Sync> CredentialProvider for InteractiveLogin<'_, P> {
    type Error = TelegramError;

    async fn request_credential(&self) -> Result<String, TelegramError> {
        if self.bot.is_authorized().await? {
            info!("Session file is already signed in, reusing it");
        } else {
            self.login().await?;
        }
        self.bot.export_credential().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_encoding() {
        let bytes = b"SQLite format 3\0session";
        let credential = encode_credential(bytes);
        assert!(credential.is_ascii());
        assert_eq!(decode_credential(&format!("  {credential}\n")).unwrap(), bytes);
    }

    #[test]
    fn test_decode_invalid_credential() {
        assert!(matches!(decode_credential("not base64!"), Err(TelegramError::Session(_))));
    }

    #[test]
    fn test_prepare_session_file_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.session");

        assert!(prepare_session_file(&path, &encode_credential(b"first")).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        assert!(!prepare_session_file(&path, &encode_credential(b"second")).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_prepare_session_file_ignores_blank_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.session");

        assert!(!prepare_session_file(&path, "   ").unwrap());
        assert!(!path.exists());
    }
}
