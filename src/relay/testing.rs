//! Mock connector, session, and audit sink for pool/engine tests.
//!
//! `MockConnector` hands out scripted sessions and keeps a probe per session
//! so tests can assert on close flags and the exact commands sent. Only the
//! first `exec` on a session follows the script; subsequent execs (the
//! engine's best-effort abort, for instance) complete immediately with exit
//! status 0 and are visible in the probe's exec log.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::relay::audit::{AuditSink, OutcomeRecord, OutcomeStatus};
use crate::relay::config::Target;
use crate::relay::error::RelayError;
use crate::relay::transport::{
    Connector, ExecOutput, RemoteDirEntry, RemoteFileStat, RemoteSession,
};

/// Scripted behavior for the first exec on a mock session.
#[derive(Clone)]
pub(crate) enum ExecScript {
    /// Respond after `delay` with the given output.
    Respond { delay: Duration, output: ExecOutput },
    /// Fail after `delay` with a connection error.
    Fail { delay: Duration, message: String },
}

impl ExecScript {
    pub(crate) fn instant(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        ExecScript::Respond {
            delay: Duration::ZERO,
            output: ExecOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        }
    }

    pub(crate) fn slow(delay: Duration, stdout: &str) -> Self {
        ExecScript::Respond {
            delay,
            output: ExecOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: 0,
            },
        }
    }
}

/// Per-session observation point kept by the connector.
#[derive(Default)]
pub(crate) struct SessionProbe {
    pub closed: AtomicBool,
    pub execs: Mutex<Vec<String>>,
    pub transfers: Mutex<Vec<String>>,
}

impl SessionProbe {
    pub(crate) fn exec_log(&self) -> Vec<String> {
        self.execs.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Shared behavior template applied to every session a connector creates.
///
/// `remote_files` is a shared in-memory remote filesystem: `put` stores the
/// local file's bytes under the remote path, `get` writes them back out, and
/// `stat` reports any stored path as a regular file (explicit `stats`
/// entries take precedence).
pub(crate) struct MockBehavior {
    pub script: ExecScript,
    pub stats: HashMap<String, RemoteFileStat>,
    pub listing: Vec<RemoteDirEntry>,
    pub home: String,
    pub realpath_fails: bool,
    pub fail_file_ops: bool,
    /// When set, every exec after the scripted first one never completes.
    pub kill_hangs: bool,
    pub remote_files: Mutex<HashMap<String, Vec<u8>>>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            script: ExecScript::instant("", "", 0),
            stats: HashMap::new(),
            listing: Vec::new(),
            home: "/home/agent".to_string(),
            realpath_fails: false,
            fail_file_ops: false,
            kill_hangs: false,
            remote_files: Mutex::new(HashMap::new()),
        }
    }
}

pub(crate) struct MockSession {
    probe: Arc<SessionProbe>,
    behavior: Arc<MockBehavior>,
    exec_count: AtomicUsize,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&self, command: &str) -> Result<ExecOutput, RelayError> {
        self.probe.execs.lock().unwrap().push(command.to_string());

        // Script applies to the first exec only; later execs (abort attempts)
        // finish immediately, or never when the session is set to hang them.
        if self.exec_count.fetch_add(1, Ordering::SeqCst) > 0 {
            if self.behavior.kill_hangs {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
            }
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            });
        }

        match &self.behavior.script {
            ExecScript::Respond { delay, output } => {
                tokio::time::sleep(*delay).await;
                Ok(output.clone())
            }
            ExecScript::Fail { delay, message } => {
                tokio::time::sleep(*delay).await;
                Err(RelayError::Connection(message.clone()))
            }
        }
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64, RelayError> {
        if self.behavior.fail_file_ops {
            return Err(RelayError::Connection("broken pipe".to_string()));
        }
        let bytes = std::fs::read(local).map_err(|e| {
            RelayError::Connection(format!("cannot read {}: {}", local.display(), e))
        })?;
        let len = bytes.len() as u64;
        self.probe
            .transfers
            .lock()
            .unwrap()
            .push(format!("put {} -> {}", local.display(), remote));
        self.behavior
            .remote_files
            .lock()
            .unwrap()
            .insert(remote.to_string(), bytes);
        Ok(len)
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<u64, RelayError> {
        if self.behavior.fail_file_ops {
            return Err(RelayError::Connection("broken pipe".to_string()));
        }
        let bytes = self
            .behavior
            .remote_files
            .lock()
            .unwrap()
            .get(remote)
            .cloned();
        let Some(bytes) = bytes else {
            return Err(RelayError::RemotePathInvalid {
                path: remote.to_string(),
                reason: "no such file or directory".to_string(),
                suggestion: format!("check that {} exists on the remote host", remote),
            });
        };
        self.probe
            .transfers
            .lock()
            .unwrap()
            .push(format!("get {} -> {}", remote, local.display()));
        std::fs::write(local, &bytes).map_err(|e| {
            RelayError::Connection(format!("cannot write {}: {}", local.display(), e))
        })?;
        Ok(bytes.len() as u64)
    }

    async fn stat(&self, remote: &str) -> Result<RemoteFileStat, RelayError> {
        if let Some(stat) = self.behavior.stats.get(remote) {
            return Ok(stat.clone());
        }
        if let Some(bytes) = self.behavior.remote_files.lock().unwrap().get(remote) {
            return Ok(RemoteFileStat {
                is_dir: false,
                is_regular: true,
                size: Some(bytes.len() as u64),
                modified_unix: None,
            });
        }
        Err(RelayError::RemotePathInvalid {
            path: remote.to_string(),
            reason: "no such file or directory".to_string(),
            suggestion: format!("check that {} exists on the remote host", remote),
        })
    }

    async fn list_dir(&self, _remote: &str) -> Result<Vec<RemoteDirEntry>, RelayError> {
        Ok(self.behavior.listing.clone())
    }

    async fn realpath(&self, remote: &str) -> Result<String, RelayError> {
        if self.behavior.realpath_fails {
            return Err(RelayError::Connection("realpath failed".to_string()));
        }
        if remote == "." {
            Ok(self.behavior.home.clone())
        } else {
            Ok(remote.to_string())
        }
    }

    async fn close(&self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector producing scripted sessions, with an opened-connections counter.
pub(crate) struct MockConnector {
    behavior: Arc<MockBehavior>,
    pub opened: AtomicUsize,
    pub probes: Mutex<Vec<Arc<SessionProbe>>>,
    pub fail_connect: Option<String>,
}

impl MockConnector {
    pub(crate) fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(behavior),
            opened: AtomicUsize::new(0),
            probes: Mutex::new(Vec::new()),
            fail_connect: None,
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        let mut connector = Self::new(MockBehavior::default());
        connector.fail_connect = Some(message.to_string());
        connector
    }

    pub(crate) fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn probe(&self, index: usize) -> Arc<SessionProbe> {
        self.probes.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Connector for Arc<MockConnector> {
    type Session = MockSession;

    async fn connect(&self, _target: &Target) -> Result<MockSession, RelayError> {
        if let Some(message) = &self.fail_connect {
            return Err(RelayError::Connection(message.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let probe = Arc::new(SessionProbe::default());
        self.probes.lock().unwrap().push(probe.clone());
        Ok(MockSession {
            probe,
            behavior: self.behavior.clone(),
            exec_count: AtomicUsize::new(0),
        })
    }
}

/// Audit sink collecting records for assertions.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub records: Mutex<Vec<OutcomeRecord>>,
}

impl RecordingSink {
    pub(crate) fn statuses(&self) -> Vec<OutcomeStatus> {
        self.records.lock().unwrap().iter().map(|r| r.status).collect()
    }

    pub(crate) fn last(&self) -> OutcomeRecord {
        self.records.lock().unwrap().last().cloned().expect("no records")
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl AuditSink for Arc<RecordingSink> {
    fn record(&self, record: &OutcomeRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// A localhost target for tests.
pub(crate) fn test_target() -> Target {
    Target {
        host: "127.0.0.1".to_string(),
        port: 22,
        username: "agent".to_string(),
        password: Some("secret".to_string()),
        key_path: None,
    }
}
