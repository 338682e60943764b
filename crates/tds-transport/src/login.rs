//! Login parameters and client library versions.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default login timeout.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol version to request at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolVersion {
    /// TDS 7.2 (SQL Server 2005 and later).
    Tds72,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tds72 => f.write_str("7.2"),
        }
    }
}

/// Everything a [`Connector`](crate::Connector) needs to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginParams {
    /// Server host (or server name from the library's configuration).
    pub host: String,
    /// Login name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database to select in the login packet.
    pub database: Option<String>,
    /// Protocol version; `None` lets the library choose.
    pub protocol_version: Option<ProtocolVersion>,
    /// Client character set.
    pub charset: String,
    /// How long to wait for the login to complete.
    pub login_timeout: Duration,
}

impl LoginParams {
    /// Create login parameters with the default character set and timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: None,
            protocol_version: Some(ProtocolVersion::Tds72),
            charset: "UTF-8".to_string(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    /// Set the database to select at login.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the protocol version.
    #[must_use]
    pub fn protocol_version(mut self, version: Option<ProtocolVersion>) -> Self {
        self.protocol_version = version;
        self
    }
}

impl fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginParams")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("protocol_version", &self.protocol_version)
            .field("charset", &self.charset)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

static VERSION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"v(\d+)\.(\d+)\.(\d+)").ok());

/// Version of the client library, parsed from its banner
/// (for example `freetds v1.3.17`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LibraryVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl LibraryVersion {
    /// Extract the version from a library banner.
    #[must_use]
    pub fn parse(banner: &str) -> Option<Self> {
        let caps = VERSION_RE.as_ref()?.captures(banner)?;
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok());
        Some(Self {
            major: part(1)?,
            minor: part(2)?,
            patch: part(3)?,
        })
    }

    /// Whether the library sizes wide-character parameters itself
    /// (0.95 and later).
    #[must_use]
    pub fn sizes_wide_params(self) -> bool {
        self.major > 0 || self.minor >= 95
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_banner() {
        assert_eq!(
            LibraryVersion::parse("freetds v1.3.17"),
            Some(LibraryVersion {
                major: 1,
                minor: 3,
                patch: 17
            })
        );
        assert_eq!(LibraryVersion::parse("freetds"), None);
        assert_eq!(LibraryVersion::parse("v0.91"), None);
    }

    #[test]
    fn test_wide_param_sizing() {
        let check = |banner: &str| LibraryVersion::parse(banner).is_some_and(LibraryVersion::sizes_wide_params);
        assert!(check("freetds v0.95.0"));
        assert!(check("freetds v1.0.0"));
        assert!(!check("freetds v0.91.112"));
        assert!(!check("unknown"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let params = LoginParams::new("srv", "sa", "secret");
        let debug = format!("{params:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("srv"));
    }
}
