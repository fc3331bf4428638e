//! OAuth2 PKCE sign-in for Google Drive
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for a native
//! desktop application, with tokens kept in the system keyring.
//!
//! ## Components
//!
//! - [`KeyringTokenStorage`] - Secure token storage using the system keyring
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange logic
//! - [`LocalCallbackServer`] - Minimal HTTP server for the OAuth redirect
//! - [`OAuthAuthenticator`] - The [`Authenticator`] driving the full flow

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use drivesync_core::config::AuthConfig;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::session::{AuthError, Authenticator, Tokens};

/// Google OAuth2 authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Keyring service name for storing tokens
const KEYRING_SERVICE: &str = "drivesync";

/// Saved tokens this close to expiry are refreshed on silent sign-in
const REFRESH_MARGIN_SECS: i64 = 300;

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Stores and retrieves OAuth tokens from the system keyring
///
/// Tokens are serialized as JSON under the service name "drivesync" and the
/// configured keyring user.
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    user: String,
}

impl KeyringTokenStorage {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.user).context("Failed to create keyring entry")
    }

    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store tokens in keyring")?;

        debug!(user = %self.user, "Stored tokens in keyring");
        Ok(())
    }

    /// Returns `None` if nothing is stored for this user
    pub fn load(&self) -> Result<Option<Tokens>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let tokens: Tokens = serde_json::from_str(&json)
                    .context("Failed to deserialize tokens from keyring")?;
                debug!(user = %self.user, "Loaded tokens from keyring");
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.user, "No tokens found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(user = %self.user, "Cleared tokens from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.user, "No tokens to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl PKCEFlow {
    pub fn new(client_id: &str, config: &AuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
            http,
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// Offline access is requested so that the exchange yields a refresh
    /// token for later silent sign-ins.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    pub async fn exchange_code(&self, code: String, pkce_verifier: PkceCodeVerifier) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry(token_result.expires_in()),
        })
    }

    /// Refreshes an access token, keeping the old refresh token if the
    /// provider does not rotate it
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry(token_result.expires_in()),
        })
    }
}

fn expiry(expires_in: Option<std::time::Duration>) -> chrono::DateTime<Utc> {
    expires_in
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// What the browser brought back to the redirect URI
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackParams {
    /// The user granted access
    Code { code: String, state: String },
    /// The user declined the consent screen
    Denied,
    /// The provider reported another error
    Error(String),
}

/// Minimal HTTP server that listens on the loopback redirect address.
///
/// Bound before the browser is opened so the redirect can never race the
/// listener. Serves a single request, then shuts down.
pub struct LocalCallbackServer {
    listener: TcpListener,
}

impl LocalCallbackServer {
    /// Binds the host and port of `redirect_uri`
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = url::Url::parse(redirect_uri).context("Invalid redirect URI")?;
        let host = url.host_str().context("Redirect URI has no host")?;
        let port = url
            .port_or_known_default()
            .context("Redirect URI has no port")?;

        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind callback server to {host}:{port}"))?;

        info!(host, port, "Started local OAuth callback server");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Callback server has no local address")
    }

    /// Waits for the OAuth redirect and answers it with a result page
    pub async fn wait(self) -> Result<CallbackParams> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::header::{HeaderValue, CONTENT_TYPE};
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::sync::{oneshot, Mutex};

        let (tx, rx) = oneshot::channel::<CallbackParams>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection on callback server")?;
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            let tx = tx.clone();
            async move {
                let uri = req.uri().to_string();
                debug!(%uri, "Callback server received request");

                let (status, html, params) = match parse_callback_params(&uri) {
                    Some(CallbackParams::Code { code, state }) => (
                        StatusCode::OK,
                        success_html(),
                        Some(CallbackParams::Code { code, state }),
                    ),
                    Some(CallbackParams::Denied) => (
                        StatusCode::OK,
                        error_html("Access was not granted"),
                        Some(CallbackParams::Denied),
                    ),
                    Some(CallbackParams::Error(error)) => (
                        StatusCode::BAD_REQUEST,
                        error_html(&error),
                        Some(CallbackParams::Error(error)),
                    ),
                    None => (
                        StatusCode::BAD_REQUEST,
                        error_html("Missing authorization code in callback"),
                        None,
                    ),
                };

                if let Some(params) = params {
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(params);
                    }
                }

                let mut response = Response::new(Full::new(Bytes::from(html)));
                *response.status_mut() = status;
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                Ok::<_, hyper::Error>(response)
            }
        });

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = %e, "Callback server connection error");
            }
        });

        rx.await
            .context("Callback server closed without receiving parameters")
    }
}

/// Parses the redirect query; `None` if it carries neither a code nor an error
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    match (code, error) {
        (_, Some(error)) if error == "access_denied" => Some(CallbackParams::Denied),
        (_, Some(error)) => Some(CallbackParams::Error(error)),
        (Some(code), None) => Some(CallbackParams::Code {
            code,
            state: state.unwrap_or_default(),
        }),
        (None, None) => None,
    }
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>DriveSync - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>You have been signed in to Google Drive.</p>
    <p>You can close this window and return to DriveSync.</p>
    <script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>DriveSync - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{message}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#
    )
}

// ============================================================================
// OAuthAuthenticator
// ============================================================================

/// Browser-based sign-in backed by the system keyring
///
/// 1. Binds the loopback callback server
/// 2. Opens the user's browser at the Google consent page
/// 3. Checks the returned state against the CSRF token
/// 4. Exchanges the code and saves the tokens to the keyring
pub struct OAuthAuthenticator {
    config: AuthConfig,
    flow: PKCEFlow,
    storage: KeyringTokenStorage,
}

impl OAuthAuthenticator {
    /// Fails if no client id is configured
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .as_deref()
            .context("auth.client_id is not configured")?;
        let flow = PKCEFlow::new(client_id, &config)?;
        let storage = KeyringTokenStorage::new(config.keyring_user.clone());

        Ok(Self {
            config,
            flow,
            storage,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn interactive(&self) -> Result<Tokens, AuthError> {
        let server = LocalCallbackServer::bind(&self.config.redirect_uri)
            .await
            .map_err(other)?;
        let (auth_url, csrf_token, pkce_verifier) = self.flow.generate_auth_url();

        info!("Opening browser for authentication");
        webbrowser::open(&auth_url)
            .context("Failed to open browser for authentication")
            .map_err(other)?;

        let (code, state) = match server.wait().await.map_err(other)? {
            CallbackParams::Code { code, state } => (code, state),
            CallbackParams::Denied => {
                info!("Sign-in was declined");
                return Err(AuthError::Cancelled);
            }
            CallbackParams::Error(error) => {
                return Err(AuthError::Other(format!("authorization failed: {error}")))
            }
        };
        if state != *csrf_token.secret() {
            warn!("OAuth callback state mismatch");
            return Err(AuthError::Other("OAuth state mismatch".to_string()));
        }

        let tokens = self
            .flow
            .exchange_code(code, pkce_verifier)
            .await
            .map_err(other)?;
        self.storage.store(&tokens).map_err(other)?;

        info!("OAuth2 PKCE sign-in completed");
        Ok(tokens)
    }
}

fn other(error: anyhow::Error) -> AuthError {
    AuthError::Other(format!("{error:#}"))
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn sign_in(&self) -> Result<Tokens, AuthError> {
        self.interactive().await
    }

    async fn sign_in_silently(&self) -> Result<Tokens, AuthError> {
        let Some(tokens) = self.storage.load().map_err(other)? else {
            return Err(AuthError::NoSavedCredentials);
        };
        if !tokens.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(tokens);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            debug!("Saved token expired and cannot be refreshed");
            return Err(AuthError::NoSavedCredentials);
        };
        let refreshed = self.flow.refresh_token(refresh_token).await.map_err(other)?;
        self.storage.store(&refreshed).map_err(other)?;
        Ok(refreshed)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.storage.clear().map_err(other)
    }
}
