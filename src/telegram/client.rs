//! Telegram client wrapper for the tally.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::{Client, InvocationError, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::history::{history_request, page_from_response};
use super::session::encode_credential;
use super::{GroupPeer, GroupRef, RateLimiter};
use crate::config::{TallySettings, TelegramConfig};
use crate::tally::ChatMessage;

/// Pause between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. The stored session is no longer valid; clear the session credential to log in again.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Invalid login code")]
    InvalidCode,

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Failed to read input: {0}")]
    Prompt(#[source] io::Error),

    #[error("Group {0} not found among this account's chats")]
    GroupNotFound(i64),

    #[error("Message id {0} is outside the range Telegram accepts")]
    IdOutOfRange(i64),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        if let InvocationError::Rpc(rpc) = &err
            && rpc.name.starts_with("FLOOD_WAIT")
            && let Some(seconds) = rpc.value
        {
            return Self::FloodWait(seconds);
        }

        let err_str = err.to_string();

        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];
    let lower = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lower.find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Session database backing the credential.
    session_path: PathBuf,

    /// Paces history requests.
    rate_limiter: RateLimiter,

    /// Flood waits tolerated per page before giving up.
    max_flood_retries: u32,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// The first round trip is retried up to `connection_retries` times.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or every attempt fails.
    pub async fn connect(config: &TelegramConfig, settings: &TallySettings) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let attempts = config.connection_retries.max(1);
        let mut attempt = 0;
        let is_authorized = loop {
            attempt += 1;
            match client.is_authorized().await {
                Ok(authorized) => break authorized,
                Err(e) if attempt < attempts => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => {
                    handle.thin.quit();
                    return Err(TelegramError::Connection(e.to_string()));
                }
            }
        };

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            session_path: config.session_path.clone(),
            rate_limiter: RateLimiter::from_millis(settings.page_interval_ms),
            max_flood_retries: settings.max_flood_retries,
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Fails with [`TelegramError::NotAuthorized`] unless the session is signed in.
    pub async fn ensure_authorized(&self) -> Result<(), TelegramError> {
        if self.is_authorized().await? {
            Ok(())
        } else {
            Err(TelegramError::NotAuthorized)
        }
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(&self, phone: &str, api_hash: &str) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code.trim()).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => Err(TelegramError::InvalidCode),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(&self, password_token: PasswordToken, password: &str) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Captures the current session as an opaque credential string.
    ///
    /// # Errors
    ///
    /// Returns an error if the session file cannot be read.
    pub async fn export_credential(&self) -> Result<String, TelegramError> {
        let bytes = tokio::fs::read(&self.session_path).await.map_err(|e| {
            TelegramError::Session(format!(
                "failed to read session file {}: {}",
                self.session_path.display(),
                e
            ))
        })?;
        Ok(encode_credential(&bytes))
    }

    /// Finds the configured group among the chats this account belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError::GroupNotFound`] if no matching chat exists.
    pub async fn resolve_group(&self, group_id: i64) -> Result<GroupPeer, TelegramError> {
        let group = GroupRef::from_bot_api_id(group_id);
        debug!("Resolving {} (configured as {})", group, group_id);

        let request = tl::functions::messages::GetAllChats { except_ids: vec![] };
        let chats = match self.client.invoke(&request).await? {
            tl::enums::messages::Chats::Chats(chats) => chats.chats,
            tl::enums::messages::Chats::Slice(chats) => chats.chats,
        };
        debug!("Account belongs to {} chats", chats.len());

        let (title, input) = group.find(chats).ok_or(TelegramError::GroupNotFound(group_id))?;
        info!("Found group \"{}\"", title);

        Ok(GroupPeer {
            id: group_id,
            title,
            input,
        })
    }

    /// Fetches up to `limit` messages newer than `after_id`, oldest first.
    ///
    /// Flood waits are slept out and the page retried, up to the configured
    /// number of times.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn fetch_history(
        &self,
        group: &GroupPeer,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TelegramError> {
        let request = history_request(group.input.clone(), after_id, limit)?;
        let mut flood_waits = 0;

        let response = loop {
            let waited = self.rate_limiter.wait_and_acquire().await;
            if !waited.is_zero() {
                debug!("Waited {:?} for rate limit", waited);
            }

            match self.client.invoke(&request).await {
                Ok(response) => break response,
                Err(e) => match TelegramError::from(e) {
                    TelegramError::FloodWait(seconds) if flood_waits < self.max_flood_retries => {
                        flood_waits += 1;
                        self.rate_limiter.handle_flood_wait(seconds).await;
                    }
                    err => return Err(err),
                },
            }
        };

        let page = page_from_response(response, after_id);
        debug!("Fetched {} messages after id {}", page.len(), after_id);
        Ok(page)
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("session_path", &self.session_path)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+1234567890"), "***7890");
        assert_eq!(mask_phone("123"), "****");
        assert_eq!(mask_phone("+7 (999) 123-45-67"), "***4567");
    }

    #[test]
    fn test_extract_flood_wait() {
        assert_eq!(extract_flood_wait_seconds("FLOOD_WAIT_120"), Some(120));
        assert_eq!(extract_flood_wait_seconds("flood wait 60 seconds"), Some(60));
        assert_eq!(extract_flood_wait_seconds("some other error"), None);
    }
}
