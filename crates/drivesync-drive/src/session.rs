//! Authentication state shared by every Drive request
//!
//! A [`DriveSession`] is created once per signed-in account and injected into
//! the client and the service. It owns the current [`Tokens`] and coalesces
//! concurrent sign-in requests: the first caller starts the sign-in, later
//! callers queue a completion handler, and when the sign-in finishes the
//! queue is taken with one swap under the lock and drained outside it. A
//! handler can therefore never be delivered twice, and a caller that arrives
//! after the drain starts a fresh sign-in instead of being dropped.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Why a sign-in or sign-out did not succeed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The user dismissed the sign-in
    #[error("Sign-in was cancelled")]
    Cancelled,

    /// Silent sign-in found nothing to restore
    #[error("No saved credentials")]
    NoSavedCredentials,

    /// Any other provider or platform failure
    #[error("Authentication failed: {0}")]
    Other(String),
}

/// OAuth tokens for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// True if the access token expires within `margin`
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Performs the provider sign-in flows
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Interactive sign-in
    async fn sign_in(&self) -> Result<Tokens, AuthError>;

    /// Restores a previous sign-in without user interaction
    async fn sign_in_silently(&self) -> Result<Tokens, AuthError>;

    /// Forgets the saved credentials
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Supplies the bearer token attached to each request
pub trait Authorizer: Send + Sync {
    fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed token, for tools and tests that obtain tokens elsewhere
pub struct StaticToken(pub String);

impl Authorizer for StaticToken {
    fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// DriveSession
// ============================================================================

type AuthHandler = oneshot::Sender<Result<(), AuthError>>;

#[derive(Debug, Clone, Copy)]
enum SignInMode {
    Interactive,
    Silent,
}

/// Explicitly owned authentication state for one account
pub struct DriveSession {
    authenticator: Arc<dyn Authenticator>,
    tokens: RwLock<Option<Tokens>>,
    authorization_handlers: Mutex<Vec<AuthHandler>>,
    deauthorization_handlers: Mutex<Vec<AuthHandler>>,
}

impl DriveSession {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Arc<Self> {
        Arc::new(Self {
            authenticator,
            tokens: RwLock::new(None),
            authorization_handlers: Mutex::new(Vec::new()),
            deauthorization_handlers: Mutex::new(Vec::new()),
        })
    }

    /// Interactive sign-in; joins one already in progress
    pub async fn authenticate(self: &Arc<Self>) -> Result<(), AuthError> {
        self.enqueue_sign_in(SignInMode::Interactive).await
    }

    /// Silent sign-in from saved credentials; joins one already in progress
    pub async fn authenticate_in_background(self: &Arc<Self>) -> Result<(), AuthError> {
        self.enqueue_sign_in(SignInMode::Silent).await
    }

    /// Signs out and drops the current tokens
    pub async fn deauthenticate(self: &Arc<Self>) -> Result<(), AuthError> {
        let (tx, rx) = oneshot::channel();
        let start = push_handler(&self.deauthorization_handlers, tx);

        if start {
            let session = self.clone();
            tokio::spawn(async move {
                let result = session.authenticator.sign_out().await;
                if result.is_ok() {
                    session.set_tokens(None);
                    info!("Signed out");
                } else {
                    warn!(error = ?result, "Sign-out failed");
                }
                drain(&session.deauthorization_handlers, result);
            });
        }

        wait(rx).await
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_tokens().is_some()
    }

    pub fn tokens(&self) -> Option<Tokens> {
        self.read_tokens()
    }

    /// Installs tokens obtained outside the session
    pub fn set_tokens(&self, tokens: Option<Tokens>) {
        *self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = tokens;
    }

    fn read_tokens(&self) -> Option<Tokens> {
        self.tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn enqueue_sign_in(self: &Arc<Self>, mode: SignInMode) -> Result<(), AuthError> {
        let (tx, rx) = oneshot::channel();
        let start = push_handler(&self.authorization_handlers, tx);

        if start {
            debug!(?mode, "Starting sign-in");
            let session = self.clone();
            tokio::spawn(async move {
                let outcome = match mode {
                    SignInMode::Interactive => session.authenticator.sign_in().await,
                    SignInMode::Silent => session.authenticator.sign_in_silently().await,
                };
                let result = match outcome {
                    Ok(tokens) => {
                        session.set_tokens(Some(tokens));
                        info!(?mode, "Signed in");
                        Ok(())
                    }
                    Err(error) => {
                        debug!(?mode, %error, "Sign-in failed");
                        Err(error)
                    }
                };
                drain(&session.authorization_handlers, result);
            });
        } else {
            debug!(?mode, "Joining sign-in already in progress");
        }

        wait(rx).await
    }
}

impl Authorizer for DriveSession {
    fn access_token(&self) -> Result<String, AuthError> {
        self.read_tokens()
            .map(|tokens| tokens.access_token)
            .ok_or(AuthError::NoSavedCredentials)
    }
}

/// Queues a handler; returns true if the queue was empty and the caller
/// must start the underlying request
fn push_handler(queue: &Mutex<Vec<AuthHandler>>, handler: AuthHandler) -> bool {
    let mut handlers = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    handlers.push(handler);
    handlers.len() == 1
}

fn drain(queue: &Mutex<Vec<AuthHandler>>, result: Result<(), AuthError>) {
    let handlers = std::mem::take(&mut *queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
    for handler in handlers {
        // A caller that stopped waiting is not an error.
        let _ = handler.send(result.clone());
    }
}

async fn wait(rx: oneshot::Receiver<Result<(), AuthError>>) -> Result<(), AuthError> {
    rx.await
        .unwrap_or_else(|_| Err(AuthError::Other("sign-in task stopped".to_string())))
}
