use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::oauth2::storage::{TokenInfo, TokenStorage};
use google_gmail1::oauth2::{
    self, ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::Path;

const APP_NAME: &str = "mailpilot";
const TOKEN_KEY: &str = "google_token";

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar.events",
];

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

pub type GoogleAuthenticator = oauth2::authenticator::DefaultAuthenticator;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Keeps the OAuth token in the OS keyring instead of a file on disk.
pub struct RingStorage;

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let entry = entry()?;

        let data = TokenData {
            tokens: vec![token],
        };

        let serialized = serde_json::to_string(&data).context("Failed to serialize tokens")?;

        entry
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.get_all()
            .await
            .ok()
            .and_then(|data| data.tokens.first().cloned())
    }
}

impl RingStorage {
    async fn get_all(&self) -> Result<TokenData> {
        match entry()?.get_password() {
            Ok(serialized) => {
                serde_json::from_str(&serialized).context("Failed to deserialize tokens")
            }
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub async fn clear_token(&self) -> Result<()> {
        match entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

fn entry() -> Result<Entry> {
    Entry::new(APP_NAME, TOKEN_KEY).map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        read_application_secret(path)
            .await
            .context("Failed to read application secret")
    }

    pub async fn authenticate(secret: ApplicationSecret) -> Result<GoogleAuthenticator> {
        let auth =
            InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                .with_storage(Box::new(RingStorage))
                .build()
                .await
                .context("Failed to build authenticator")?;

        // Run the consent flow up front so it never interrupts a cycle.
        auth.token(SCOPES)
            .await
            .context("Failed to obtain Google access token")?;

        Ok(auth)
    }
}

/// Bearer tokens for the REST clients that do not go through a generated hub.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, scopes: &[&str]) -> Result<String>;
}

#[async_trait]
impl AccessTokenSource for GoogleAuthenticator {
    async fn access_token(&self, scopes: &[&str]) -> Result<String> {
        let token = self
            .token(scopes)
            .await
            .context("Failed to obtain Google access token")?;
        token
            .token()
            .map(str::to_string)
            .context("Google returned an access token without a value")
    }
}

/// A fixed bearer token for tests.
#[cfg(test)]
pub struct StaticToken(pub String);

#[cfg(test)]
#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self, _scopes: &[&str]) -> Result<String> {
        Ok(self.0.clone())
    }
}
