//! OAuth authentication for Google APIs
//!
//! Handles the OAuth 2.0 installed-app flow:
//! - Loading client credentials
//! - Authorization URL generation and code exchange
//! - Token caching, refresh and atomic persistence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{ensure_parent_dir, Config};
use crate::error::{AuthError, GsuiteMcpError, Result};

/// Tokens expiring within this window are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 10;

/// OAuth client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthKeys {
    pub client_id: String,
    pub client_secret: String,

    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// credentials.json layout (either "installed" or "web")
#[derive(Debug, Deserialize)]
struct OAuthKeysFile {
    installed: Option<OAuthKeys>,
    web: Option<OAuthKeys>,
}

impl OAuthKeys {
    /// Parse the contents of a credentials.json file
    pub fn from_json(content: &str) -> Result<Self> {
        let file: OAuthKeysFile = serde_json::from_str(content)?;
        file.installed
            .or(file.web)
            .ok_or(GsuiteMcpError::Auth(AuthError::InvalidKeysFormat))
    }
}

/// Cached OAuth token, in the standard token.json layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Usable at `now`: non-empty and not within the expiry skew
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Metadata about the cached token, safe to show to a user
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub valid: bool,
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
    pub expires_in_secs: Option<i64>,
    pub has_refresh: bool,
}

/// OAuth authenticator
pub struct Authenticator {
    /// Where the token is cached
    token_path: PathBuf,

    /// Requested scopes
    scopes: Vec<String>,

    /// Loopback redirect URI
    redirect_uri: String,

    /// Loopback port for the interactive flow
    callback_port: u16,

    /// HTTP client for the token endpoint
    http_client: reqwest::Client,

    /// OAuth client credentials
    keys: OAuthKeys,

    /// Token cache, loaded from disk on first use
    token: Arc<RwLock<Option<StoredToken>>>,
}

impl Authenticator {
    /// Create an authenticator from the configured credentials file
    pub fn new(config: &Config) -> Result<Self> {
        let keys = Self::load_oauth_keys(&config.credentials_path)?;
        Ok(Self::with_keys(config, keys))
    }

    /// Create an authenticator from already-loaded client credentials
    pub fn with_keys(config: &Config, keys: OAuthKeys) -> Self {
        Self {
            token_path: config.token_path.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri(),
            callback_port: config.oauth_callback_port,
            http_client: reqwest::Client::new(),
            keys,
            token: Arc::new(RwLock::new(None)),
        }
    }

    fn load_oauth_keys(path: &Path) -> Result<OAuthKeys> {
        if !path.exists() {
            return Err(GsuiteMcpError::Auth(AuthError::KeysFileNotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path)?;
        OAuthKeys::from_json(&content)
    }

    async fn load_token(&self) -> Result<StoredToken> {
        let content = tokio::fs::read_to_string(&self.token_path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the token: write a temp file, then rename over the target
    async fn save_token(&self, token: &StoredToken) -> Result<()> {
        ensure_parent_dir(&self.token_path)?;

        let tmp_path = self
            .token_path
            .with_file_name(format!(".token-{}.tmp", std::process::id()));
        let content = serde_json::to_vec_pretty(token)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = async {
            use tokio::io::AsyncWriteExt;
            let mut file = options.open(&tmp_path).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &self.token_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Cached token, reading it from disk if not yet loaded
    async fn cached_token(&self) -> Option<StoredToken> {
        if let Some(token) = self.token.read().await.clone() {
            return Some(token);
        }

        let token = self.load_token().await.ok()?;
        *self.token.write().await = Some(token.clone());
        Some(token)
    }

    /// Check if a token is available
    pub async fn is_authenticated(&self) -> bool {
        self.cached_token().await.is_some()
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn access_token(&self) -> Result<String> {
        let token = self.cached_token().await.ok_or_else(|| {
            GsuiteMcpError::Auth(AuthError::NotAuthenticated {
                path: self.token_path.display().to_string(),
            })
        })?;

        if token.is_valid_at(Utc::now()) {
            return Ok(token.access_token);
        }

        self.refresh(token).await
    }

    /// Refresh the access token using the refresh token
    async fn refresh(&self, token: StoredToken) -> Result<String> {
        let refresh_token = token.refresh_token.ok_or_else(|| {
            GsuiteMcpError::Auth(AuthError::TokenRefreshFailed {
                message: "No refresh token available".to_string(),
            })
        })?;

        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.keys.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GsuiteMcpError::Auth(AuthError::TokenRefreshFailed {
                message: text,
            }));
        }

        let refreshed = response
            .json::<TokenResponse>()
            .await?
            .into_token(Some(refresh_token));

        // A failed write only costs a refresh on the next start
        if let Err(e) = self.save_token(&refreshed).await {
            tracing::warn!("Failed to persist refreshed token: {}", e);
        }
        tracing::info!("Access token refreshed");

        let access_token = refreshed.access_token.clone();
        *self.token.write().await = Some(refreshed);
        Ok(access_token)
    }

    /// Generate the authorization URL
    pub fn auth_url(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state=state-token",
            self.keys.auth_uri,
            urlencoding::encode(&self.keys.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes)
        )
    }

    /// Exchange an authorization code for tokens and persist them
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.keys.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GsuiteMcpError::Auth(AuthError::TokenExchangeFailed {
                message: text,
            }));
        }

        let token = response.json::<TokenResponse>().await?.into_token(None);
        self.save_token(&token).await?;
        *self.token.write().await = Some(token);

        tracing::info!("Token saved to {}", self.token_path.display());
        Ok(())
    }

    /// Token metadata without making API calls
    pub async fn token_info(&self) -> TokenInfo {
        // Always read the file: another process may have re-authenticated
        let Ok(token) = self.load_token().await else {
            return TokenInfo {
                valid: false,
                access_token: String::new(),
                expiry: None,
                expires_in_secs: None,
                has_refresh: false,
            };
        };

        let now = Utc::now();
        TokenInfo {
            valid: token.is_valid_at(now),
            access_token: mask_token(&token.access_token),
            expiry: token.expiry,
            expires_in_secs: token.expiry.map(|e| (e - now).num_seconds()),
            has_refresh: token.refresh_token.is_some(),
        }
    }

    /// Delete the cached token, forcing re-authentication
    pub async fn revoke_token(&self) -> Result<()> {
        *self.token.write().await = None;

        match tokio::fs::remove_file(&self.token_path).await {
            Ok(()) => {
                tracing::info!("Token removed from {}", self.token_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Run interactive authentication flow with a loopback HTTP server
    pub async fn authenticate_interactive(&self) -> Result<()> {
        use axum::{extract::Query, response::Html, routing::get, Router};
        use std::collections::HashMap;
        use tokio::sync::oneshot;

        let auth_url = self.auth_url();
        eprintln!("\nPlease visit this URL to authenticate:");
        eprintln!("{}\n", auth_url);

        if let Err(e) = open::that(&auth_url) {
            eprintln!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.");
        }

        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let callback_handler = move |Query(params): Query<HashMap<String, String>>| async move {
            match params.get("code") {
                Some(code) => {
                    if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                        let _ = tx.send(code.clone());
                    }
                    Html("<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>")
                }
                None => Html("<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>"),
            }
        };

        let app = Router::new().route("/", get(callback_handler));

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.callback_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        eprintln!(
            "Waiting for authentication callback on port {}...",
            self.callback_port
        );

        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    return Err(GsuiteMcpError::Auth(AuthError::CallbackError {
                        message: e.to_string(),
                    }));
                }
            }
            code = rx => {
                let code = code.map_err(|_| GsuiteMcpError::Auth(AuthError::NoAuthCode))?;
                eprintln!("Received authorization code, exchanging for tokens...");
                self.exchange_code(&code).await?;
            }
        }

        Ok(())
    }
}

/// Show the first and last four characters of a token
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return token.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Accept either a bare authorization code or the full redirect URL
pub fn extract_auth_code(code_or_url: &str) -> String {
    let input = code_or_url.trim();
    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return input.to_string();
    }

    let query = input
        .split_once('?')
        .map(|(_, q)| q.split('#').next().unwrap_or(q))
        .unwrap_or("");

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "code")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|code| code.into_owned())
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> OAuthKeys {
        OAuthKeys::from_json(
            r#"{
                "installed": {
                    "client_id": "test-client-id",
                    "client_secret": "test-secret",
                    "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                    "token_uri": "https://oauth2.googleapis.com/token",
                    "redirect_uris": ["http://localhost"]
                }
            }"#,
        )
        .unwrap()
    }

    fn test_authenticator(token_path: PathBuf) -> Authenticator {
        let mut config = Config::ish("http://localhost:9000", "testuser");
        config.token_path = token_path;
        Authenticator::with_keys(&config, test_keys())
    }

    #[test]
    fn test_oauth_keys_installed_and_web() {
        assert_eq!(test_keys().client_id, "test-client-id");

        let web = OAuthKeys::from_json(
            r#"{"web": {"client_id": "web-id", "client_secret": "s"}}"#,
        )
        .unwrap();
        assert_eq!(web.client_id, "web-id");
        assert_eq!(web.token_uri, "https://oauth2.googleapis.com/token");

        let missing = OAuthKeys::from_json(r#"{"other": {}}"#);
        assert!(matches!(
            missing,
            Err(GsuiteMcpError::Auth(AuthError::InvalidKeysFormat))
        ));
    }

    #[test]
    fn test_stored_token_reads_standard_layout() {
        let json = r#"{
            "access_token": "ya29.token",
            "token_type": "Bearer",
            "refresh_token": "1//refresh",
            "expiry": "2030-01-02T03:04:05.123456789-08:00"
        }"#;
        let token: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert!(token.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_token_validity_window() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: Some(now + ChronoDuration::seconds(5)),
        };
        assert!(!token.is_valid_at(now));

        token.expiry = Some(now + ChronoDuration::minutes(5));
        assert!(token.is_valid_at(now));

        token.expiry = None;
        assert!(token.is_valid_at(now));

        token.access_token.clear();
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ya29.a0AfH6SMBx7890"), "ya29...7890");
        assert_eq!(mask_token("short"), "short");
    }

    #[test]
    fn test_extract_auth_code() {
        assert_eq!(
            extract_auth_code("http://localhost/?code=4/0AfJohX&scope=gmail"),
            "4/0AfJohX"
        );
        assert_eq!(
            extract_auth_code("http://localhost:8080/?state=state-token&code=4%2F0Ab"),
            "4/0Ab"
        );
        assert_eq!(extract_auth_code("  4/0AfJohX  "), "4/0AfJohX");
        assert_eq!(
            extract_auth_code("http://localhost/?error=access_denied"),
            "http://localhost/?error=access_denied"
        );
    }

    #[test]
    fn test_auth_url() {
        let auth = test_authenticator(PathBuf::from("token.json"));
        let url = auth.auth_url();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
        assert!(url.contains("gmail.modify"));
    }

    #[tokio::test]
    async fn test_token_save_info_and_revoke() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let auth = test_authenticator(path.clone());

        assert!(!auth.is_authenticated().await);
        assert!(!auth.token_info().await.valid);

        let token = StoredToken {
            access_token: "ya29.a0AfH6SMBx7890".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: Some(Utc::now() + ChronoDuration::hours(1)),
        };
        auth.save_token(&token).await.unwrap();

        let info = auth.token_info().await;
        assert!(info.valid);
        assert!(info.has_refresh);
        assert_eq!(info.access_token, "ya29...7890");
        assert_eq!(auth.access_token().await.unwrap(), "ya29.a0AfH6SMBx7890");

        auth.revoke_token().await.unwrap();
        assert!(!path.exists());
        assert!(auth.access_token().await.is_err());
        // Revoking twice is fine
        auth.revoke_token().await.unwrap();
    }
}
