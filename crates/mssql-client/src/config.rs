//! Connection credentials.

use std::fmt;
use std::str::FromStr;

use tds_transport::{LoginParams, ProtocolVersion};

use crate::error::Error;

/// Default maximum number of sessions a pool opens.
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;

/// Server dialect the session talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Compatibility {
    /// SQL Server.
    #[default]
    Default,
    /// Sybase ASE.
    Sybase,
    /// Sybase ASE 12.5.
    Sybase12_5,
    /// Any other value found in the connection string, lower-cased.
    Other(String),
}

impl Compatibility {
    /// Whether this is one of the Sybase modes.
    #[must_use]
    pub fn is_sybase(&self) -> bool {
        matches!(self, Self::Sybase | Self::Sybase12_5)
    }
}

impl From<&str> for Compatibility {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "default" | "mssql" | "sqlserver" => Self::Default,
            "sybase" => Self::Sybase,
            "sybase_12_5" => Self::Sybase12_5,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Sybase => f.write_str("sybase"),
            Self::Sybase12_5 => f.write_str("sybase_12_5"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// Everything needed to open a session, parsed from a connection string.
///
/// Credentials are immutable once built. Mirror failover replaces them with
/// [`swapped_mirror`](Self::swapped_mirror).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Server host.
    pub host: String,
    /// Database to select.
    pub database: Option<String>,
    /// Login name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Mirror (failover partner) host.
    pub mirror_host: Option<String>,
    /// Server dialect.
    pub compatibility: Compatibility,
    /// Maximum number of sessions a pool opens with these credentials.
    pub max_pool_size: usize,
    /// Lock timeout in seconds applied to every new session.
    pub lock_timeout: Option<u32>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            host: String::new(),
            database: None,
            user: String::new(),
            password: String::new(),
            mirror_host: None,
            compatibility: Compatibility::Default,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            lock_timeout: None,
        }
    }
}

impl Credentials {
    /// Create credentials for a host and login.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Parse a connection string.
    ///
    /// ```text
    /// host=myServerA;database=myDataBase;user=myUsername;pwd=myPassword;mirror=myMirror
    /// ```
    ///
    /// Keys are case-insensitive, the value is everything after the first
    /// `=`, and unknown keys are ignored.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, Error> {
        let mut credentials = Self::default();

        for part in conn_str.split(';') {
            if part.trim().is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();

            match key.as_str() {
                "server" | "host" => credentials.host = value.to_string(),
                "database" => credentials.database = non_empty(value),
                "user id" | "user_id" | "user" => credentials.user = value.to_string(),
                "password" | "pwd" => credentials.password = value.to_string(),
                "failover partner" | "failover_partner" | "mirror" | "mirror_host"
                | "mirror host" => credentials.mirror_host = non_empty(value),
                "max pool size" | "max_pool_size" => {
                    credentials.max_pool_size = value.trim().parse().map_err(|_| {
                        Error::Config(format!("invalid max pool size: {value}"))
                    })?;
                }
                "lock timeout" | "lock_timeout" => {
                    credentials.lock_timeout = Some(value.trim().parse().map_err(|_| {
                        Error::Config(format!("invalid lock timeout: {value}"))
                    })?);
                }
                "compatibility" | "compatibility_mode" | "compatibility mode" => {
                    credentials.compatibility = Compatibility::from(value);
                }
                _ => {
                    tracing::debug!(key = key, "ignoring unknown connection string option");
                }
            }
        }

        Ok(credentials)
    }

    /// Set the database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the mirror host.
    #[must_use]
    pub fn mirror_host(mut self, host: impl Into<String>) -> Self {
        self.mirror_host = Some(host.into());
        self
    }

    /// Set the server dialect.
    #[must_use]
    pub fn compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the lock timeout in seconds.
    #[must_use]
    pub fn lock_timeout(mut self, seconds: u32) -> Self {
        self.lock_timeout = Some(seconds);
        self
    }

    /// Whether a mirror host is configured.
    #[must_use]
    pub fn mirror_defined(&self) -> bool {
        self.mirror_host.is_some()
    }

    /// A copy with host and mirror host exchanged. Without a mirror the
    /// copy is identical.
    #[must_use]
    pub fn swapped_mirror(&self) -> Self {
        let Some(mirror) = &self.mirror_host else {
            return self.clone();
        };
        Self {
            host: mirror.clone(),
            mirror_host: Some(self.host.clone()),
            ..self.clone()
        }
    }

    /// Login parameters for these credentials.
    #[must_use]
    pub fn login_params(&self) -> LoginParams {
        let mut params = LoginParams::new(&self.host, &self.user, &self.password);
        if let Some(database) = &self.database {
            params = params.database(database);
        }
        // Sybase servers refuse the 7.2 login; let the library choose.
        if self.compatibility.is_sybase() {
            params = params.protocol_version(None);
        } else {
            params = params.protocol_version(Some(ProtocolVersion::Tds72));
        }
        params
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl FromStr for Credentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_connection_string(s)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("mirror_host", &self.mirror_host)
            .field("compatibility", &self.compatibility)
            .field("max_pool_size", &self.max_pool_size)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_parsing() {
        let c: Credentials =
            "host=myServerA;database=myDataBase;user=myUsername;pwd=myPassword;mirror=myMirror"
                .parse()
                .unwrap();
        assert_eq!(c.host, "myServerA");
        assert_eq!(c.database.as_deref(), Some("myDataBase"));
        assert_eq!(c.user, "myUsername");
        assert_eq!(c.password, "myPassword");
        assert_eq!(c.mirror_host.as_deref(), Some("myMirror"));
        assert_eq!(c.max_pool_size, DEFAULT_MAX_POOL_SIZE);
        assert_eq!(c.compatibility, Compatibility::Default);
        assert_eq!(c.lock_timeout, None);
    }

    #[test]
    fn test_connection_string_aliases() {
        let c = Credentials::from_connection_string(
            "Server=myServerA;Database=myDataBase;User Id=myUsername;Password=myPassword;\
             Failover Partner=myMirror;Max Pool Size=16;Lock Timeout=5;Compatibility Mode=Sybase",
        )
        .unwrap();
        assert_eq!(c.host, "myServerA");
        assert_eq!(c.user, "myUsername");
        assert_eq!(c.mirror_host.as_deref(), Some("myMirror"));
        assert_eq!(c.max_pool_size, 16);
        assert_eq!(c.lock_timeout, Some(5));
        assert_eq!(c.compatibility, Compatibility::Sybase);

        let c = Credentials::from_connection_string(
            "host=a;user_id=u;failover_partner=b;max_pool_size=3;compatibility_mode=sybase_12_5",
        )
        .unwrap();
        assert_eq!(c.user, "u");
        assert_eq!(c.mirror_host.as_deref(), Some("b"));
        assert_eq!(c.max_pool_size, 3);
        assert_eq!(c.compatibility, Compatibility::Sybase12_5);
    }

    #[test]
    fn test_value_keeps_everything_after_first_equals() {
        let c = Credentials::from_connection_string("host=srv;pwd=a=b=c;").unwrap();
        assert_eq!(c.password, "a=b=c");
    }

    #[test]
    fn test_unknown_keys_and_empty_segments_are_ignored() {
        let c = Credentials::from_connection_string(";;host=srv; ;app=whatever;").unwrap();
        assert_eq!(c.host, "srv");
    }

    #[test]
    fn test_invalid_segments_are_config_errors() {
        assert!(matches!(
            Credentials::from_connection_string("host=srv;garbage"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Credentials::from_connection_string("host=srv;max_pool_size=lots"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Credentials::from_connection_string("host=srv;lock_timeout=-1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_other_compatibility_is_kept_lower_cased() {
        let c = Credentials::from_connection_string("host=srv;compatibility=Azure").unwrap();
        assert_eq!(c.compatibility, Compatibility::Other("azure".into()));
        assert!(!c.compatibility.is_sybase());
    }

    #[test]
    fn test_swapped_mirror() {
        let c = Credentials::new("a", "u", "p").mirror_host("b");
        let swapped = c.swapped_mirror();
        assert_eq!(swapped.host, "b");
        assert_eq!(swapped.mirror_host.as_deref(), Some("a"));
        assert_eq!(swapped.swapped_mirror(), c);

        let plain = Credentials::new("a", "u", "p");
        assert_eq!(plain.swapped_mirror(), plain);
    }

    #[test]
    fn test_login_params() {
        let c = Credentials::new("srv", "sa", "pwd").database("pubs");
        let params = c.login_params();
        assert_eq!(params.database.as_deref(), Some("pubs"));
        assert_eq!(params.protocol_version, Some(ProtocolVersion::Tds72));
        assert_eq!(params.charset, "UTF-8");

        let params = c.compatibility(Compatibility::Sybase).login_params();
        assert_eq!(params.protocol_version, None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = Credentials::new("srv", "sa", "hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
    }
}
