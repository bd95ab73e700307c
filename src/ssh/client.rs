//! libssh2-backed transport: password auth, exec channels and SCP.
//!
//! The dial timeout bounds the TCP connect and the handshake/auth exchange;
//! once authenticated the session runs without a libssh2 timeout so long
//! transfers are not cut short.

use anyhow::{Context, Result, anyhow, bail};
use ssh2::{ExtendedData, Session};
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DialTarget, RemoteHandle, Transport};

#[derive(Debug, Default, Clone, Copy)]
pub struct SshTransport;

impl Transport for SshTransport {
    fn dial(&self, target: &DialTarget) -> Result<Box<dyn RemoteHandle>> {
        let addr = target
            .addr()
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve '{}'", target.addr()))?
            .next()
            .ok_or_else(|| anyhow!("no address found for '{}'", target.addr()))?;

        let tcp = TcpStream::connect_timeout(&addr, target.timeout)
            .with_context(|| format!("tcp connect to {addr} failed"))?;

        let mut session = Session::new().context("failed to create ssh session")?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_ms(target));
        session.handshake().context("ssh handshake failed")?;
        session
            .userauth_password(&target.user, &target.password)
            .with_context(|| format!("password auth failed for user '{}'", target.user))?;
        if !session.authenticated() {
            bail!("server did not accept credentials for '{}'", target.user);
        }
        session.set_timeout(0);

        Ok(Box::new(SshHandle {
            session: Mutex::new(session),
        }))
    }
}

fn timeout_ms(target: &DialTarget) -> u32 {
    u32::try_from(target.timeout.as_millis()).unwrap_or(u32::MAX)
}

pub struct SshHandle {
    session: Mutex<Session>,
}

impl SshHandle {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteHandle for SshHandle {
    fn output(&self, command: &str) -> Result<String> {
        let session = self.session();
        let mut channel = session.channel_session().context("failed to open channel")?;
        channel.handle_extended_data(ExtendedData::Ignore)?;
        channel
            .exec(command)
            .with_context(|| format!("failed to exec '{command}'"))?;
        let mut out = String::new();
        channel
            .read_to_string(&mut out)
            .context("failed to read command output")?;
        channel.wait_close()?;
        let status = channel.exit_status()?;
        if status != 0 {
            bail!("'{command}' exited with status {status}");
        }
        Ok(out)
    }

    fn stream(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        let session = self.session();
        let mut channel = session.channel_session().context("failed to open channel")?;
        channel.handle_extended_data(ExtendedData::Ignore)?;
        channel
            .exec(command)
            .with_context(|| format!("failed to exec '{command}'"))?;
        io::copy(&mut channel, sink).context("failed to stream command output")?;
        sink.flush()?;
        channel.wait_close()?;
        let status = channel.exit_status()?;
        if status != 0 {
            bail!("exited with status {status}");
        }
        Ok(())
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut file = File::open(local)
            .with_context(|| format!("cannot open '{}'", local.display()))?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            bail!("'{}' is not a regular file", local.display());
        }

        let session = self.session();
        let mut channel = session
            .scp_send(Path::new(remote), file_mode(&meta), meta.len(), None)
            .with_context(|| format!("scp send init failed for '{remote}'"))?;
        let sent = io::copy(&mut file, &mut channel).context("scp write failed")?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        Ok(sent)
    }

    fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let session = self.session();
        let (channel, stat) = session
            .scp_recv(Path::new(remote))
            .with_context(|| format!("scp recv init failed for '{remote}'"))?;
        let mut file = File::create(local)
            .with_context(|| format!("cannot create '{}'", local.display()))?;
        let mut body = channel.take(stat.size());
        let received = io::copy(&mut body, &mut file).context("scp read failed")?;
        let mut channel = body.into_inner();
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        if received != stat.size() {
            bail!("short read: {received} of {} bytes", stat.size());
        }
        Ok(received)
    }

    fn close(&self) -> Result<()> {
        self.session()
            .disconnect(None, "mssh release", None)
            .context("ssh disconnect failed")
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    (meta.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> i32 {
    0o644
}
