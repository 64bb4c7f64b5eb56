//! SSH session that runs the engine remotely.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, RemoteHost};
use crate::error::{Result, TransportError};

/// Key files tried, in order, by [`AuthMethod::DefaultKeys`].
const DEFAULT_KEY_FILES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// SSH connection to the machine that runs the engine.
pub struct SshTransport {
    session: Handle<SshHandler>,
    remote: RemoteHost,
}

impl SshTransport {
    /// Connect to `remote` and authenticate.
    pub async fn connect(remote: RemoteHost) -> Result<Self> {
        // No inactivity timeout: engine commands may legitimately run for hours.
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: remote.host.clone(),
            port: remote.port,
            host_key_verification: remote.host_key_verification.clone(),
            known_hosts_path: remote.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = client::connect(ssh_config, (remote.host.as_str(), remote.port), handler)
            .await
            .map_err(|e| {
                host_key_error
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .unwrap_or(TransportError::Ssh(e))
            })?;

        Self::authenticate(&mut session, &remote).await?;

        Ok(Self { session, remote })
    }

    /// Open a PTY channel that runs `command` instead of a login shell.
    pub async fn exec(&self, command: &str) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.remote.terminal_width,
                self.remote.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        debug!("exec on {}: {}", self.remote, command);
        channel
            .exec(true, command)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Remote host of this connection.
    pub fn remote(&self) -> &RemoteHost {
        &self.remote
    }

    async fn authenticate(session: &mut Handle<SshHandler>, remote: &RemoteHost) -> Result<()> {
        let success = match &remote.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&remote.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let passphrase = passphrase.as_ref().map(|p| p.expose_secret());
                Self::authenticate_key(session, &remote.username, path, passphrase).await?
            }
            AuthMethod::DefaultKeys => {
                let mut success = false;
                for path in default_key_paths() {
                    match Self::authenticate_key(session, &remote.username, &path, None).await {
                        Ok(true) => {
                            success = true;
                            break;
                        }
                        Ok(false) => debug!("key {} rejected", path.display()),
                        Err(e) => debug!("skipping key {}: {}", path.display(), e),
                    }
                }
                success
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: remote.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    async fn authenticate_key(
        session: &mut Handle<SshHandler>,
        username: &str,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<bool> {
        let key =
            load_secret_key(path, passphrase).map_err(|e| TransportError::Key(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .map_err(TransportError::Ssh)?
            .flatten();

        let result = session
            .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
            .await
            .map_err(TransportError::Ssh)?;

        Ok(result.success())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Existing default key files under `$HOME/.ssh`.
fn default_key_paths() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return Vec::new();
    };
    let ssh_dir = PathBuf::from(home).join(".ssh");
    DEFAULT_KEY_FILES
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Accepts or rejects the server's host key.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Why the key was rejected; russh itself only reports `UnknownKey`.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Apply the verification mode to `key`.
    fn verify(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        if matches!(self.host_key_verification, HostKeyVerification::Disabled) {
            return Ok(());
        }

        let known = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };
        let known = known.map_err(|e| match e {
            russh::keys::Error::KeyChanged { line } => TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            },
            other => TransportError::KnownHosts(other.to_string()),
        })?;
        if known {
            return Ok(());
        }

        match self.host_key_verification {
            HostKeyVerification::Strict => Err(TransportError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            }),
            _ => {
                let learned = match &self.known_hosts_path {
                    Some(path) => russh::keys::known_hosts::learn_known_hosts_path(
                        &self.host, self.port, key, path,
                    ),
                    None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, key),
                };
                match learned {
                    Ok(()) => debug!("learned host key of {}:{}", self.host, self.port),
                    Err(e) => warn!("could not save host key of {}: {}", self.host, e),
                }
                Ok(())
            }
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                if let Ok(mut slot) = self.host_key_error.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}
