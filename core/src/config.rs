//! Client configuration.
//!
//! Values come from code (`ClientConfig::new` plus `with_*` setters) or from
//! the environment (`ClientConfig::from_env`). The Movebank service needs an
//! account for nearly every entity type, but credentials stay optional so the
//! client also works against public mirrors and the local mock server.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://www.movebank.org/movebank/service";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_BASE_URL: &str = "MOVEBANK_URL";
pub const ENV_USERNAME: &str = "MOVEBANK_USERNAME";
pub const ENV_PASSWORD: &str = "MOVEBANK_PASSWORD";
pub const ENV_TIMEOUT_SECS: &str = "MOVEBANK_TIMEOUT_SECS";

/// Account used for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Keeps passwords out of logs and panic messages.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service root; `direct-read` and `json-auth` are resolved below it.
    pub base_url: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    /// Accept study license terms automatically by echoing their MD5.
    pub accept_license: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            accept_license: true,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_accept_license(mut self, accept: bool) -> Self {
        self.accept_license = accept;
        self
    }

    /// Read configuration from `MOVEBANK_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`] but reads through `lookup`.
    ///
    /// A username without a password (or the reverse) is rejected rather than
    /// silently sending anonymous requests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base_url);

        match (lookup(ENV_USERNAME), lookup(ENV_PASSWORD)) {
            (Some(user), Some(pass)) => config = config.with_credentials(user, pass),
            (None, None) => {}
            (Some(_), None) => {
                return Err(ApiError::Config(format!("{ENV_USERNAME} is set but {ENV_PASSWORD} is not")));
            }
            (None, Some(_)) => {
                return Err(ApiError::Config(format!("{ENV_PASSWORD} is set but {ENV_USERNAME} is not")));
            }
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}")))?;
            if secs == 0 {
                return Err(ApiError::Config(format!("{ENV_TIMEOUT_SECS} must be at least 1 second")));
            }
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<url::Url, ApiError> {
        if self.timeout.is_zero() {
            return Err(ApiError::Config("timeout must be greater than zero".to_string()));
        }
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base URL {:?}: {e}", self.base_url)))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::Config(format!("base URL {:?} cannot carry a path", self.base_url)));
        }
        Ok(parsed)
    }
}
