//! Remote host configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::DriverError;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    /// This is the default and matches common SSH client behavior.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// Authentication method for remote sessions.
#[derive(Debug, Clone, Default)]
pub enum AuthMethod {
    /// Try `~/.ssh/id_ed25519`, `~/.ssh/id_ecdsa` and `~/.ssh/id_rsa` in turn.
    #[default]
    DefaultKeys,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Machine on which the engine is started, in `user@host[:port]` form.
///
/// The user part defaults to the current login (`$USER`).
#[derive(Debug, Clone)]
pub struct RemoteHost {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,

    /// Terminal width for the PTY.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,
}

impl RemoteHost {
    /// Create a descriptor for `host` using the current login name.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
            auth: AuthMethod::default(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            terminal_width: 256,
            terminal_height: 24,
        }
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }
}

impl FromStr for RemoteHost {
    type Err = DriverError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let invalid = || DriverError::InvalidConfig {
            message: format!("invalid remote host '{descriptor}', expected user@host[:port]"),
        };

        let (user, rest) = match descriptor.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(invalid()),
            None => (None, descriptor),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (rest, 22),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let mut remote = RemoteHost::new(host).port(port);
        if let Some(user) = user {
            remote = remote.username(user);
        }
        Ok(remote)
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_descriptor() {
        let remote: RemoteHost = "analyst@node17:2222".parse().unwrap();
        assert_eq!(remote.username, "analyst");
        assert_eq!(remote.host, "node17");
        assert_eq!(remote.port, 2222);
    }

    #[test]
    fn test_parse_host_only() {
        let remote: RemoteHost = "cluster01".parse().unwrap();
        assert_eq!(remote.host, "cluster01");
        assert_eq!(remote.port, 22);
        assert!(matches!(remote.auth, AuthMethod::DefaultKeys));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("@host".parse::<RemoteHost>().is_err());
        assert!("user@".parse::<RemoteHost>().is_err());
        assert!("host:notaport".parse::<RemoteHost>().is_err());
    }
}
