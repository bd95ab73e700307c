//! Multi-host fan-out: the connection pool, the task orchestrator and the
//! transport, owned by one `Fleet` value that every command handler borrows.
//!
//! connect / put / get launch one unit per host; remote runs hosts one after
//! another unless `RemoteMode::Parallel` is configured. `wait_all` is the
//! global barrier behind the `done` command.

pub mod pool;
pub mod tasks;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::cmd::format::{Role, StyleOptions, color};
use crate::ssh::{DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, DialTarget, Transport};
use crate::utils::paths::{basename, join_remote};

pub use pool::{Connection, ConnectionPool, Reservation};
pub use tasks::{Batch, TaskOrchestrator};

/// Token in a `put` source path that expands to `<download_root>/<host>`,
/// so files fetched with `get` can be pushed back per host.
pub const HOST_PLACEHOLDER: char = '@';

/// What `put` / `get` wait for before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierScope {
    /// Only the units launched by the call itself.
    #[default]
    Batch,
    /// Every outstanding unit, including earlier `connect`s.
    Global,
}

/// How `remote` walks the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    /// One host at a time, output streamed live.
    #[default]
    Sequential,
    /// All hosts at once, output buffered and printed in host order.
    Parallel,
}

#[derive(Debug, Clone)]
pub struct FleetSettings {
    pub download_root: PathBuf,
    pub barrier: BarrierScope,
    pub remote_mode: RemoteMode,
    pub max_parallel: Option<usize>,
    pub default_port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for FleetSettings {
    fn default() -> Self {
        FleetSettings {
            download_root: PathBuf::from("download"),
            barrier: BarrierScope::Batch,
            remote_mode: RemoteMode::Sequential,
            max_parallel: None,
            default_port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Per-host result of a fan-out unit. `Ok` carries a short detail
/// (destination path, byte count).
#[derive(Debug)]
pub struct HostReport {
    pub host: String,
    pub result: Result<String>,
}

impl HostReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStart {
    Launched,
    AlreadyConnected,
    InFlight,
}

pub struct Fleet {
    pool: Arc<ConnectionPool>,
    tasks: TaskOrchestrator,
    transport: Arc<dyn Transport>,
    settings: FleetSettings,
}

impl Fleet {
    pub fn new(settings: FleetSettings, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Fleet {
            pool: Arc::new(ConnectionPool::new()),
            tasks: TaskOrchestrator::new(settings.max_parallel)?,
            transport,
            settings,
        })
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn tasks(&self) -> &TaskOrchestrator {
        &self.tasks
    }

    /// Start connecting to `host_key` in the background. A host that is live
    /// or already being dialed is left alone, without any network I/O.
    pub fn connect(&self, host_key: &str, target: DialTarget) -> ConnectStart {
        match self.pool.reserve(host_key) {
            Reservation::AlreadyConnected => {
                info!("[{host_key}] connected");
                return ConnectStart::AlreadyConnected;
            }
            Reservation::InFlight => {
                info!("[{host_key}] connect already in progress");
                return ConnectStart::InFlight;
            }
            Reservation::Granted => {}
        }

        let pool = Arc::clone(&self.pool);
        let transport = Arc::clone(&self.transport);
        let key = host_key.to_string();
        debug!("[{key}] dialing {target}");
        self.tasks.launch(host_key, move || {
            let slot = PendingSlot::new(&pool, &key);
            match open_connection(transport.as_ref(), &key, &target) {
                Ok(conn) => {
                    slot.settled();
                    admit(&pool, conn);
                }
                Err(e) => error!("[{key}] {e:#}"),
            }
        });
        ConnectStart::Launched
    }

    /// Close and forget `host`. Returns false when it was not connected.
    pub fn release(&self, host: &str) -> bool {
        let Some(conn) = self.pool.remove(host) else {
            warn!("[{host}] has not connected yet");
            return false;
        };
        close_logged(&conn);
        warn!("[{host}] released");
        true
    }

    /// Report pool membership. No remote round-trip is made.
    pub fn check(&self) -> Vec<String> {
        let hosts = self.pool.hosts();
        for host in &hosts {
            info!("[{host}] connecting");
        }
        for host in self.pool.pending() {
            info!("[{host}] handshake pending");
        }
        if hosts.is_empty() {
            info!("no host connected");
        }
        hosts
    }

    /// Upload `local_path` to every pooled host.
    ///
    /// - destination dir: `remote_dir`, or the host's home when empty
    /// - destination name: basename of `local_path` as given
    /// - `@` in `local_path` becomes `<download_root>/<host>` for each host
    pub fn put(&self, local_path: &str, remote_dir: &str) -> Vec<HostReport> {
        let name = basename(local_path).to_string();
        let mut batch = Batch::new();
        for conn in self.pool.snapshot() {
            let host = conn.host_key.clone();
            let dir = if remote_dir.is_empty() {
                conn.home_dir.clone()
            } else {
                remote_dir.to_string()
            };
            let dest = join_remote(&dir, &name);
            let source = self.host_source_path(local_path, &host);
            let handle = self.tasks.launch(&host, move || {
                let result = conn
                    .handle
                    .upload(&source, &dest)
                    .with_context(|| format!("scp file {} error", source.display()))
                    .map(|bytes| {
                        info!(
                            "[{}] put file [{}] to [{}] success ({bytes} bytes)",
                            conn.host_key,
                            source.display(),
                            dest
                        );
                        dest.clone()
                    });
                if let Err(e) = &result {
                    error!("[{}] {e:#}", conn.host_key);
                }
                HostReport {
                    host: conn.host_key.clone(),
                    result,
                }
            });
            batch.push(host, handle);
        }
        self.settle(batch)
    }

    /// Download `remote_path` from every pooled host into
    /// `<download_root>/<host>/<basename>`.
    pub fn get(&self, remote_path: &str) -> Vec<HostReport> {
        let name = basename(remote_path).to_string();
        let mut batch = Batch::new();
        for conn in self.pool.snapshot() {
            let host = conn.host_key.clone();
            let dir = self.settings.download_root.join(&host);
            let local = dir.join(&name);
            let remote = remote_path.to_string();
            let handle = self.tasks.launch(&host, move || {
                let result = fetch(conn.as_ref(), &remote, &dir, &local).map(|bytes| {
                    info!(
                        "[{}] get file [{remote}] to [{}] success ({bytes} bytes)",
                        conn.host_key,
                        local.display()
                    );
                    local.display().to_string()
                });
                if let Err(e) = &result {
                    error!("[{}] {e:#}", conn.host_key);
                }
                HostReport {
                    host: conn.host_key.clone(),
                    result,
                }
            });
            batch.push(host, handle);
        }
        self.settle(batch)
    }

    /// Run `command` on every pooled host, writing a banner and the remote
    /// stdout for each host into `sink`.
    pub fn remote(&self, command: &str, sink: &mut dyn Write) -> Vec<HostReport> {
        match self.settings.remote_mode {
            RemoteMode::Sequential => self.remote_sequential(command, sink),
            RemoteMode::Parallel => self.remote_parallel(command, sink),
        }
    }

    fn remote_sequential(&self, command: &str, sink: &mut dyn Write) -> Vec<HostReport> {
        let mut reports = Vec::new();
        for conn in self.pool.snapshot() {
            let _ = writeln!(sink, "{}", banner(&conn.host_key, command));
            let result = conn.handle.stream(command, sink);
            reports.push(log_remote(&conn.host_key, command, result));
        }
        reports
    }

    fn remote_parallel(&self, command: &str, sink: &mut dyn Write) -> Vec<HostReport> {
        let mut batch = Batch::new();
        for conn in self.pool.snapshot() {
            let host = conn.host_key.clone();
            let command = command.to_string();
            let handle = self.tasks.launch(&host, move || {
                let mut buf = Vec::new();
                let result = conn.handle.stream(&command, &mut buf);
                (conn.host_key.clone(), buf, result)
            });
            batch.push(host, handle);
        }
        self.tasks
            .join(batch)
            .into_iter()
            .map(|(host, buf, result)| {
                let _ = writeln!(sink, "{}", banner(&host, command));
                let _ = sink.write_all(&buf);
                log_remote(&host, command, result)
            })
            .collect()
    }

    /// Global barrier.
    pub fn wait_all(&self) {
        self.tasks.wait_all();
        info!("multi command done");
    }

    /// Wait for outstanding units, then close every live connection.
    pub fn shutdown(&self) {
        self.tasks.wait_all();
        let conns = self.pool.drain();
        let count = conns.len();
        for conn in conns {
            close_logged(&conn);
        }
        debug!("closed {count} connection(s)");
    }

    fn settle<T>(&self, batch: Batch<T>) -> Vec<T> {
        if self.settings.barrier == BarrierScope::Global {
            self.tasks.wait_all();
        }
        let results = self.tasks.join(batch);
        info!("multi command done");
        results
    }

    fn host_source_path(&self, local_path: &str, host: &str) -> PathBuf {
        if !local_path.contains(HOST_PLACEHOLDER) {
            return PathBuf::from(local_path);
        }
        let expanded = self.settings.download_root.join(host);
        PathBuf::from(local_path.replace(HOST_PLACEHOLDER, &expanded.to_string_lossy()))
    }
}

/// Hand a fresh connection to the pool. A duplicate of a live host is
/// closed instead. Returns whether `conn` was inserted.
fn admit(pool: &ConnectionPool, conn: Connection) -> bool {
    let key = conn.host_key.clone();
    match pool.insert(conn) {
        Ok(()) => {
            info!("[{key}] connect success");
            true
        }
        Err(dup) => {
            warn!("[{}] already connected, dropping duplicate session", dup.host_key);
            close_logged(&dup);
            false
        }
    }
}

/// Close a handle; a failure is a warning, never an error.
fn close_logged(conn: &Connection) -> bool {
    match conn.handle.close() {
        Ok(()) => true,
        Err(e) => {
            warn!("[{}] close error: {e:#}", conn.host_key);
            false
        }
    }
}

/// Frees a reserved connect slot when dropped, unless the connection was
/// handed to the pool. Covers failed dials and panicking units alike.
struct PendingSlot<'a> {
    pool: &'a ConnectionPool,
    key: &'a str,
    armed: bool,
}

impl<'a> PendingSlot<'a> {
    fn new(pool: &'a ConnectionPool, key: &'a str) -> Self {
        PendingSlot {
            pool,
            key,
            armed: true,
        }
    }

    /// `ConnectionPool::insert` clears the slot itself.
    fn settled(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.abandon(self.key);
        }
    }
}

fn open_connection(transport: &dyn Transport, key: &str, target: &DialTarget) -> Result<Connection> {
    let handle = transport.dial(target).context("ssh dial error")?;
    let home = match handle.output("pwd") {
        Ok(out) => out.trim().to_string(),
        Err(e) => {
            if let Err(ce) = handle.close() {
                warn!("[{key}] close error: {ce:#}");
            }
            return Err(e.context("get home path error"));
        }
    };
    Ok(Connection::new(key, handle, &home))
}

fn fetch(conn: &Connection, remote: &str, dir: &Path, local: &Path) -> Result<u64> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create '{}'", dir.display()))?;
    conn.handle
        .download(remote, local)
        .context("copy from remote error")
}

fn banner(host: &str, command: &str) -> String {
    let style = StyleOptions::detect();
    color(
        Role::Primary,
        format!(">>>>>>>>>>>>>>> {host} [{command}] <<<<<<<<<<<<<<<"),
        &style,
    )
}

fn log_remote(host: &str, command: &str, result: Result<()>) -> HostReport {
    match &result {
        Ok(()) => info!("[{host}] remote command [{command}] success"),
        Err(e) => error!("[{host}] remote command [{command}] failed: {e:#}"),
    }
    HostReport {
        host: host.to_string(),
        result: result.map(|()| command.to_string()),
    }
}
