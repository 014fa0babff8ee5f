//! Configuration management for the GSuite MCP Server
//!
//! Handles credential/token paths, environment variables, API endpoints and
//! the fake-backend ("ish") testing mode.

use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, GsuiteMcpError, Result};
use crate::retry::RetryPolicy;

const APP_NAME: &str = "gsuite-mcp";
const DEFAULT_CREDENTIALS: &str = "credentials.json";
const DEFAULT_TOKEN: &str = "token.json";
const DEFAULT_OAUTH_PORT: u16 = 8080;
const DEFAULT_ISH_BASE_URL: &str = "http://localhost:9000";
const DEFAULT_ISH_USER: &str = "testuser";

/// Configuration for the GSuite MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to OAuth client credentials (downloaded from Google Cloud Console)
    pub credentials_path: PathBuf,

    /// Path to the cached OAuth token
    pub token_path: PathBuf,

    /// Loopback port used as the OAuth redirect target
    pub oauth_callback_port: u16,

    /// OAuth scopes requested during authorization
    pub scopes: Vec<String>,

    /// Base URLs of the Google APIs
    pub endpoints: Endpoints,

    /// Fake backend settings, when running in ish mode
    pub ish: Option<IshConfig>,

    /// Retry policy applied to every API call
    pub retry: RetryPolicy,
}

/// API base URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gmail: String,
    pub calendar: String,
    pub people: String,
}

impl Endpoints {
    /// Route every API to a single base URL.
    pub fn single(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            gmail: base.clone(),
            calendar: base.clone(),
            people: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail: google::GMAIL_BASE_URL.to_string(),
            calendar: google::CALENDAR_BASE_URL.to_string(),
            people: google::PEOPLE_BASE_URL.to_string(),
        }
    }
}

/// Fake backend settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IshConfig {
    pub base_url: String,
    pub user: String,
}

impl IshConfig {
    /// Bearer token understood by the fake backend
    pub fn bearer_token(&self) -> String {
        format!("user:{}", self.user)
    }
}

impl Config {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F, home: Option<PathBuf>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let credentials_path = resolve_path(
            var("GSUITE_MCP_CREDENTIALS_PATH"),
            var("XDG_CONFIG_HOME"),
            home.as_deref(),
            ".config",
            DEFAULT_CREDENTIALS,
        );

        let token_path = resolve_path(
            var("GSUITE_MCP_TOKEN_PATH"),
            var("XDG_DATA_HOME"),
            home.as_deref(),
            ".local/share",
            DEFAULT_TOKEN,
        );

        let oauth_callback_port = match var("GSUITE_MCP_OAUTH_PORT") {
            Some(value) => value.parse().map_err(|_| {
                GsuiteMcpError::Config(ConfigError::InvalidEnvVar {
                    var: "GSUITE_MCP_OAUTH_PORT".to_string(),
                    value,
                })
            })?,
            None => DEFAULT_OAUTH_PORT,
        };

        let ish = (var("ISH_MODE").as_deref() == Some("true")).then(|| IshConfig {
            base_url: var("ISH_BASE_URL").unwrap_or_else(|| DEFAULT_ISH_BASE_URL.to_string()),
            user: var("ISH_USER").unwrap_or_else(|| DEFAULT_ISH_USER.to_string()),
        });

        let endpoints = match &ish {
            Some(ish) => Endpoints::single(&ish.base_url),
            None => Endpoints::default(),
        };

        Ok(Self {
            credentials_path,
            token_path,
            oauth_callback_port,
            scopes: google::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            endpoints,
            ish,
            retry: RetryPolicy::API_DEFAULT,
        })
    }

    /// Configuration pointing every API at a fake backend
    pub fn ish(base_url: impl Into<String>, user: impl Into<String>) -> Self {
        let ish = IshConfig {
            base_url: base_url.into(),
            user: user.into(),
        };

        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS),
            token_path: PathBuf::from(DEFAULT_TOKEN),
            oauth_callback_port: DEFAULT_OAUTH_PORT,
            scopes: google::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            endpoints: Endpoints::single(&ish.base_url),
            ish: Some(ish),
            retry: RetryPolicy::API_DEFAULT,
        }
    }

    /// Whether requests go to the fake backend
    pub fn is_ish_mode(&self) -> bool {
        self.ish.is_some()
    }

    /// OAuth redirect URI (installed-app loopback)
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.oauth_callback_port)
    }

    /// Check if the OAuth client credentials file exists
    pub fn credentials_exist(&self) -> bool {
        self.credentials_path.exists()
    }
}

/// Resolve a file path: explicit override, then an absolute XDG base, then
/// `$HOME/<fallback_subdir>`, then the bare file name in the working directory.
fn resolve_path(
    override_path: Option<String>,
    xdg_base: Option<String>,
    home: Option<&Path>,
    fallback_subdir: &str,
    file_name: &str,
) -> PathBuf {
    if let Some(path) = override_path {
        return clean_path(Path::new(&path));
    }

    let base = match xdg_base.map(PathBuf::from).filter(|p| p.is_absolute()) {
        Some(base) => base,
        None => match home {
            Some(home) => home.join(fallback_subdir),
            None => return PathBuf::from(file_name),
        },
    };

    clean_path(&base.join(APP_NAME).join(file_name))
}

/// Lexically normalise a path (no filesystem access)
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match cleaned.components().next_back() {
                    Some(Component::Normal(_)) => cleaned.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Create the parent directory of `path` with owner-only permissions
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(dir).map_err(|_| {
        GsuiteMcpError::Config(ConfigError::DirCreationFailed {
            path: dir.display().to_string(),
        })
    })
}

/// Google API constants
pub mod google {
    pub const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com";
    pub const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
    pub const PEOPLE_BASE_URL: &str = "https://people.googleapis.com";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Calendar all event operations target
    pub const CALENDAR_ID: &str = "primary";

    pub const DEFAULT_SCOPES: &[&str] = &[
        "https://www.googleapis.com/auth/gmail.modify",
        "https://www.googleapis.com/auth/gmail.labels",
        "https://www.googleapis.com/auth/calendar",
        "https://www.googleapis.com/auth/contacts",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)], home: Option<&str>) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned(), home.map(PathBuf::from)).unwrap()
    }

    #[test]
    fn test_default_paths_under_home() {
        let config = config_with(&[], Some("/home/alice"));
        assert_eq!(
            config.credentials_path,
            PathBuf::from("/home/alice/.config/gsuite-mcp/credentials.json")
        );
        assert_eq!(
            config.token_path,
            PathBuf::from("/home/alice/.local/share/gsuite-mcp/token.json")
        );
        assert!(!config.is_ish_mode());
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn test_env_override_wins() {
        let config = config_with(
            &[
                ("GSUITE_MCP_CREDENTIALS_PATH", "/tmp/creds/../creds.json"),
                ("XDG_CONFIG_HOME", "/xdg/config"),
                ("GSUITE_MCP_TOKEN_PATH", "relative/./token.json"),
            ],
            Some("/home/alice"),
        );
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/creds.json"));
        assert_eq!(config.token_path, PathBuf::from("relative/token.json"));
    }

    #[test]
    fn test_xdg_dirs_must_be_absolute() {
        let config = config_with(
            &[("XDG_CONFIG_HOME", "/xdg/config"), ("XDG_DATA_HOME", "data")],
            Some("/home/alice"),
        );
        assert_eq!(
            config.credentials_path,
            PathBuf::from("/xdg/config/gsuite-mcp/credentials.json")
        );
        assert_eq!(
            config.token_path,
            PathBuf::from("/home/alice/.local/share/gsuite-mcp/token.json")
        );
    }

    #[test]
    fn test_empty_env_treated_as_unset() {
        let config = config_with(&[("GSUITE_MCP_TOKEN_PATH", "")], None);
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.credentials_path, PathBuf::from("credentials.json"));
    }

    #[test]
    fn test_ish_mode() {
        let config = config_with(
            &[("ISH_MODE", "true"), ("ISH_BASE_URL", "http://fake:9000/")],
            Some("/home/alice"),
        );
        let ish = config.ish.as_ref().unwrap();
        assert_eq!(ish.user, "testuser");
        assert_eq!(ish.bearer_token(), "user:testuser");
        assert_eq!(config.endpoints, Endpoints::single("http://fake:9000"));
        assert_eq!(config.endpoints.people, "http://fake:9000");
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(
            |k| (k == "GSUITE_MCP_OAUTH_PORT").then(|| "not-a-port".to_string()),
            None,
        );
        assert!(matches!(
            result,
            Err(GsuiteMcpError::Config(ConfigError::InvalidEnvVar { .. }))
        ));
    }

    #[test]
    fn test_default_scopes() {
        let config = config_with(&[], None);
        assert_eq!(config.scopes.len(), 4);
        assert!(config.scopes[0].contains("gmail.modify"));
        assert_eq!(config.redirect_uri(), "http://localhost:8080");
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new("/..")), PathBuf::from("/"));
    }
}
