//! In-memory transport for tests: no sockets, records every call.

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{DialTarget, RemoteHandle, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub host: String,
    pub local: PathBuf,
    pub remote: String,
}

#[derive(Default)]
pub struct FakeState {
    pub dials: AtomicUsize,
    pub closes: AtomicUsize,
    pub uploads: Mutex<Vec<Upload>>,
    pub commands: Mutex<Vec<(String, String)>>,
}

/// Hosts are reachable unless listed in `unreachable`; the home directory is
/// `/home/<host>` unless overridden.
#[derive(Default)]
pub struct FakeTransport {
    pub state: Arc<FakeState>,
    unreachable: HashSet<String>,
    failing_commands: HashSet<String>,
    panicking: HashSet<String>,
    homes: HashMap<String, String>,
    dial_delay: Option<Duration>,
    failing_close: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// Dialing `host` panics, as a bug in the transport would.
    pub fn panicking(mut self, host: &str) -> Self {
        self.panicking.insert(host.to_string());
        self
    }

    pub fn home(mut self, host: &str, dir: &str) -> Self {
        self.homes.insert(host.to_string(), dir.to_string());
        self
    }

    pub fn failing_command(mut self, command: &str) -> Self {
        self.failing_commands.insert(command.to_string());
        self
    }

    /// Every `close` is counted, then fails.
    pub fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    pub fn dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = Some(delay);
        self
    }
}

impl Transport for FakeTransport {
    fn dial(&self, target: &DialTarget) -> Result<Box<dyn RemoteHandle>> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.dial_delay {
            std::thread::sleep(delay);
        }
        if self.panicking.contains(&target.host) {
            panic!("transport bug dialing {}", target.host);
        }
        if self.unreachable.contains(&target.host) {
            bail!("connection refused");
        }
        let home = self
            .homes
            .get(&target.host)
            .cloned()
            .unwrap_or_else(|| format!("/home/{}", target.host));
        Ok(Box::new(FakeHandle {
            host: target.host.clone(),
            home,
            failing_commands: self.failing_commands.clone(),
            failing_close: self.failing_close,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeHandle {
    host: String,
    home: String,
    failing_commands: HashSet<String>,
    failing_close: bool,
    state: Arc<FakeState>,
}

impl RemoteHandle for FakeHandle {
    fn output(&self, command: &str) -> Result<String> {
        self.state
            .commands
            .lock()
            .unwrap()
            .push((self.host.clone(), command.to_string()));
        if self.failing_commands.contains(command) {
            bail!("'{command}' exited with status 1");
        }
        match command {
            "pwd" => Ok(format!("{}\n", self.home)),
            other => Ok(format!("{}: {}\n", self.host, other)),
        }
    }

    fn stream(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        let out = self.output(command)?;
        sink.write_all(out.as_bytes())?;
        Ok(())
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let meta = std::fs::metadata(local)?;
        self.state.uploads.lock().unwrap().push(Upload {
            host: self.host.clone(),
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        Ok(meta.len())
    }

    fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let body = format!("{} from {}\n", remote, self.host);
        std::fs::write(local, &body)?;
        Ok(body.len() as u64)
    }

    fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.failing_close {
            bail!("channel already closed");
        }
        Ok(())
    }
}
