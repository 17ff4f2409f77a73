//! Transport provider: the seam between the relay core and russh.
//!
//! The core only sees two traits:
//!
//! - [`Connector`] — creates authenticated, ready-to-use sessions.
//! - [`RemoteSession`] — one live connection: command execution plus a
//!   per-operation SFTP file channel (put/get/stat/list/realpath).
//!
//! The production implementation ([`SshConnector`] / [`SshSession`]) wraps
//! russh and russh-sftp. Connection establishment parses `host:port`
//! (IPv6-safe via `rsplit_once`), connects with a bounded handshake timeout,
//! and authenticates with the first method that succeeds in the order:
//! password, private key file, SSH agent (agent only when no explicit
//! credential was configured — the same chain priority the config surface
//! documents).
//!
//! No timeout is enforced here on `exec`: deadlines belong to the execution
//! engine, which also decides what happens to the session afterwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client, keys};
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode as SftpStatusCode;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

use crate::relay::config::{Target, TransportConfig};
use crate::relay::error::RelayError;

/// Collected output of one remote command run to completion.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the remote server did not report an exit status.
    pub exit_code: i32,
}

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntryKind {
    File,
    Directory,
    Other,
}

/// One entry of a non-recursive remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteDirEntry {
    pub name: String,
    pub kind: RemoteEntryKind,
    pub size: u64,
    /// Modification time as unix seconds, when the server reports one.
    pub modified_unix: Option<u64>,
}

/// Result of a remote stat call.
#[derive(Debug, Clone)]
pub struct RemoteFileStat {
    pub is_dir: bool,
    pub is_regular: bool,
    pub size: Option<u64>,
    pub modified_unix: Option<u64>,
}

/// One authenticated, live connection to a remote target.
///
/// A session is owned by the pool while idle and lent exclusively to one
/// operation at a time; implementations do not need internal per-operation
/// locking beyond what the underlying protocol multiplexing requires.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Run a command to completion, collecting stdout, stderr and exit status.
    async fn exec(&self, command: &str) -> Result<ExecOutput, RelayError>;

    /// Stream a local regular file to the remote path. Returns bytes written.
    async fn put(&self, local: &Path, remote: &str) -> Result<u64, RelayError>;

    /// Stream a remote regular file to the local path. Returns bytes written.
    async fn get(&self, remote: &str, local: &Path) -> Result<u64, RelayError>;

    /// Stat one remote path.
    async fn stat(&self, remote: &str) -> Result<RemoteFileStat, RelayError>;

    /// List one remote directory, non-recursively.
    async fn list_dir(&self, remote: &str) -> Result<Vec<RemoteDirEntry>, RelayError>;

    /// Resolve a remote path to an absolute path.
    async fn realpath(&self, remote: &str) -> Result<String, RelayError>;

    /// Close the connection. Best effort; errors are swallowed.
    async fn close(&self);
}

/// Creates authenticated sessions for the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self, target: &Target) -> Result<Self::Session, RelayError>;
}

/// Parse address string into host and port components.
///
/// Supports `host:port` and bare `host` (default port 22). Uses
/// `rsplit_once` so IPv6 forms like `[::1]:22` keep their brackets intact.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), String> {
    if let Some((host, port_str)) = address.rsplit_once(':') {
        let port = port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {}", e))?;
        Ok((host.to_string(), port))
    } else {
        Ok((address.to_string(), 22))
    }
}

/// Build the russh client configuration.
///
/// Keepalives every 30 seconds (max 3 missed) keep pooled sessions from
/// being dropped by middleboxes while idle; the inactivity timeout is left
/// unset because the pool's idle TTL governs session lifetime.
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Client handler that accepts all host keys.
///
/// Equivalent to `StrictHostKeyChecking=no`; production deployments should
/// extend this to verify against known_hosts.
pub struct RelayClientHandler;

impl client::Handler for RelayClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Production connector backed by russh.
pub struct SshConnector {
    config: TransportConfig,
}

impl SshConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &Target) -> Result<SshSession, RelayError> {
        let config = build_client_config(self.config.compress);
        let timeout = self.config.connect_timeout;

        let connect_future = client::connect(
            config,
            (target.host.as_str(), target.port),
            RelayClientHandler,
        );

        let mut handle = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| {
                RelayError::Connection(format!("Connection timed out after {:?}", timeout))
            })?
            .map_err(|e| RelayError::Connection(format!("Failed to connect: {}", e)))?;

        authenticate(&mut handle, target).await?;

        info!(
            "connected to {}@{}:{}",
            target.username, target.host, target.port
        );

        Ok(SshSession { handle })
    }
}

/// Authenticate with the first method that succeeds: password, key, agent.
///
/// The agent is only consulted when no explicit credential was configured,
/// mirroring the chain priority of the config surface.
async fn authenticate(
    handle: &mut client::Handle<RelayClientHandler>,
    target: &Target,
) -> Result<(), RelayError> {
    if let Some(password) = &target.password {
        let result = handle
            .authenticate_password(&target.username, password)
            .await
            .map_err(|e| {
                RelayError::Connection(format!("Password authentication failed: {}", e))
            })?;
        if result.success() {
            return Ok(());
        }
        debug!("password not accepted for {}", target.username);
    }

    if let Some(key_path) = &target.key_path {
        let key_pair = keys::load_secret_key(Path::new(key_path), None).map_err(|e| {
            RelayError::Connection(format!(
                "Key authentication failed: cannot load {}: {}",
                key_path, e
            ))
        })?;

        // For RSA keys, use the best hash algorithm the server supports.
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(&target.username, key_with_hash)
            .await
            .map_err(|e| RelayError::Connection(format!("Key authentication failed: {}", e)))?;
        if result.success() {
            return Ok(());
        }
        debug!("key not accepted for {}", target.username);
    }

    if target.password.is_none() && target.key_path.is_none() {
        if authenticate_with_agent(handle, &target.username).await? {
            return Ok(());
        }
    }

    Err(RelayError::Connection(
        "Authentication failed: no authentication methods succeeded".to_string(),
    ))
}

/// Try every identity the SSH agent offers until one is accepted.
async fn authenticate_with_agent(
    handle: &mut client::Handle<RelayClientHandler>,
    username: &str,
) -> Result<bool, RelayError> {
    let mut agent = keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| {
            RelayError::Connection(format!(
                "Agent authentication failed: cannot reach agent: {}",
                e
            ))
        })?;

    let identities = agent.request_identities().await.map_err(|e| {
        RelayError::Connection(format!("Agent authentication failed: {}", e))
    })?;

    for identity in identities {
        debug!("trying agent identity {:?}", identity.comment());

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        match handle
            .authenticate_publickey_with(username, identity.clone(), hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => continue,
            Err(e) => {
                debug!("agent identity rejected: {}, trying next", e);
                continue;
            }
        }
    }

    Ok(false)
}

/// Production session over a russh handle, with per-operation SFTP channels.
pub struct SshSession {
    handle: client::Handle<RelayClientHandler>,
}

impl SshSession {
    /// Open a fresh SFTP channel for one file operation.
    async fn file_channel(&self) -> Result<SftpSession, RelayError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to start sftp: {}", e)))?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to open sftp session: {}", e)))
    }
}

/// Stream a remote reader into a freshly created local file.
///
/// If the copy fails midway the partial file is removed; a download either
/// produces the complete file or leaves nothing behind.
async fn copy_to_local<R>(reader: &mut R, local: &Path) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut file = tokio::fs::File::create(local).await?;
    match tokio::io::copy(reader, &mut file).await {
        Ok(bytes) => {
            file.flush().await?;
            Ok(bytes)
        }
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(local).await;
            Err(e)
        }
    }
}

/// Map an SFTP error, turning a missing remote path into `RemotePathInvalid`.
fn map_sftp_error(remote: &str, err: SftpError) -> RelayError {
    if let SftpError::Status(status) = &err {
        if status.status_code == SftpStatusCode::NoSuchFile {
            return RelayError::RemotePathInvalid {
                path: remote.to_string(),
                reason: "no such file or directory".to_string(),
                suggestion: format!("check that {} exists on the remote host", remote),
            };
        }
    }
    RelayError::Connection(format!("sftp operation on {} failed: {}", remote, err))
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<ExecOutput, RelayError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to execute command: {}", e)))?;

        let mut stdout = Vec::with_capacity(4096);
        let mut stderr = Vec::with_capacity(1024);
        let mut exit_code: Option<u32> = None;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    // ext == 1 is stderr in the SSH protocol
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    // Keep waiting for the exit status if it hasn't arrived.
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) => {
                    break;
                }
                Some(_) => {}
                None => {
                    break;
                }
            }
        }

        let _ = channel.close().await;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: exit_code.map(|c| c as i32).unwrap_or(-1),
        })
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64, RelayError> {
        let mut local_file = tokio::fs::File::open(local).await.map_err(|e| {
            RelayError::Connection(format!("cannot read {}: {}", local.display(), e))
        })?;

        let sftp = self.file_channel().await?;
        let mut remote_file = sftp
            .create(remote)
            .await
            .map_err(|e| map_sftp_error(remote, e))?;

        let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| RelayError::Connection(format!("upload to {} failed: {}", remote, e)))?;

        remote_file
            .shutdown()
            .await
            .map_err(|e| RelayError::Connection(format!("upload to {} failed: {}", remote, e)))?;
        let _ = sftp.close().await;

        Ok(bytes)
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<u64, RelayError> {
        let sftp = self.file_channel().await?;
        let mut remote_file = sftp
            .open(remote)
            .await
            .map_err(|e| map_sftp_error(remote, e))?;

        let bytes = copy_to_local(&mut remote_file, local).await.map_err(|e| {
            RelayError::Connection(format!(
                "download of {} to {} failed: {}",
                remote,
                local.display(),
                e
            ))
        })?;
        let _ = sftp.close().await;

        Ok(bytes)
    }

    async fn stat(&self, remote: &str) -> Result<RemoteFileStat, RelayError> {
        let sftp = self.file_channel().await?;
        let attrs = sftp
            .metadata(remote)
            .await
            .map_err(|e| map_sftp_error(remote, e))?;
        let _ = sftp.close().await;

        Ok(RemoteFileStat {
            is_dir: attrs.is_dir(),
            is_regular: attrs.is_regular(),
            size: attrs.size,
            modified_unix: attrs.mtime.map(u64::from),
        })
    }

    async fn list_dir(&self, remote: &str) -> Result<Vec<RemoteDirEntry>, RelayError> {
        let sftp = self.file_channel().await?;
        let read_dir = sftp
            .read_dir(remote)
            .await
            .map_err(|e| map_sftp_error(remote, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let attrs = entry.metadata();
            let kind = if attrs.is_dir() {
                RemoteEntryKind::Directory
            } else if attrs.is_regular() {
                RemoteEntryKind::File
            } else {
                RemoteEntryKind::Other
            };
            entries.push(RemoteDirEntry {
                name: entry.file_name(),
                kind,
                size: attrs.size.unwrap_or(0),
                modified_unix: attrs.mtime.map(u64::from),
            });
        }
        let _ = sftp.close().await;

        Ok(entries)
    }

    async fn realpath(&self, remote: &str) -> Result<String, RelayError> {
        let sftp = self.file_channel().await?;
        let resolved = sftp
            .canonicalize(remote)
            .await
            .map_err(|e| map_sftp_error(remote, e))?;
        let _ = sftp.close().await;
        Ok(resolved)
    }

    async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "relay session closed", "en")
            .await;
    }
}
