//! Error types for the GSuite MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.
//! API failures keep their HTTP status so the retry wrapper can classify them.

use std::fmt;

use thiserror::Error;

use crate::retry::HttpStatusError;

/// Main error type for the GSuite MCP Server
#[derive(Error, Debug)]
pub enum GsuiteMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-success response from a Google API
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A failed API call, labelled with what was being attempted
    #[error("{action}: {source}")]
    Request {
        action: String,
        #[source]
        source: Box<GsuiteMcpError>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GsuiteMcpError {
    /// Prefix the error with the operation that failed.
    pub fn context(self, action: impl Into<String>) -> Self {
        GsuiteMcpError::Request {
            action: action.into(),
            source: Box::new(self),
        }
    }
}

impl HttpStatusError for GsuiteMcpError {
    fn http_status_code(&self) -> Option<u16> {
        match self {
            GsuiteMcpError::Api(err) => err.http_status_code(),
            GsuiteMcpError::Request { source, .. } => source.http_status_code(),
            GsuiteMcpError::Http(err) => err.http_status_code(),
            _ => None,
        }
    }
}

/// HTTP error returned by a Google API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code of the response
    pub status: u16,

    /// Response body or short description
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "HTTP {} error", self.status)
        } else {
            write!(f, "HTTP {}: {}", self.status, self.message)
        }
    }
}

impl HttpStatusError for ApiError {
    fn http_status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

impl HttpStatusError for reqwest::Error {
    fn http_status_code(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("credentials.json not found at {path}. Download from Google Cloud Console")]
    KeysFileNotFound { path: String },

    #[error("Invalid OAuth keys format: expected 'installed' or 'web' credentials")]
    InvalidKeysFormat,

    #[error("Not authenticated: no token at {path}. Run 'gsuite-mcp setup' or use the auth_init tool")]
    NotAuthenticated { path: String },

    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("No authorization code provided")]
    NoAuthCode,

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to create directory: {path}")]
    DirCreationFailed { path: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    EmptyField { field: String },

    #[error("invalid {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("{0}")]
    Conflict(String),
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("Unknown prompt: {name}")]
    UnknownPrompt { name: String },

    #[error("Missing required prompt argument: {name}")]
    MissingPromptArgument { name: String },
}

/// Result type alias for GSuite MCP operations
pub type Result<T> = std::result::Result<T, GsuiteMcpError>;
