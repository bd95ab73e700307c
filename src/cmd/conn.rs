/*!
conn.rs - pool membership commands.

  connect <username> <password> <host> [port] [timeout]
  release <host>
  check
*/

use anyhow::{Context, Result};

use super::Shell;
use super::dispatch::Flow;
use super::registry::{CommandRegistry, ParamSpec};
use super::shared::{arg, required};
use crate::ssh::DialTarget;

const GROUP: &str = "conn";
const CONNECT_USAGE: &str = "connect <username> <password> <host> <port> <timeout>";

pub fn register(registry: &mut CommandRegistry) {
    registry.register(
        GROUP,
        "connect",
        connect,
        "Connect to a remote host in the background",
        CONNECT_USAGE,
        vec![
            ParamSpec::required("username", "string", "login user"),
            ParamSpec::required("password", "string", "login password"),
            ParamSpec::required("host", "string", "server address, optionally host:port"),
            ParamSpec::optional("port", "int", "sshd port, default 22"),
            ParamSpec::optional("timeout", "int", "connect timeout in seconds, default 5"),
        ],
    );
    registry.register(
        GROUP,
        "release",
        release,
        "Close the connection to a host",
        "release <host>",
        vec![ParamSpec::required("host", "string", "server address")],
    );
    registry.register(
        GROUP,
        "check",
        check,
        "List tracked connections",
        "check",
        vec![],
    );
}

fn connect(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let user = required(args, 0, "username", CONNECT_USAGE)?;
    // Passwords are taken verbatim, surrounding blanks included.
    let password = args.get(1).map(String::as_str).unwrap_or("");
    let host = required(args, 2, "host", CONNECT_USAGE)?;

    let settings = shell.fleet.settings();
    let target = DialTarget::parse(
        user,
        password,
        host,
        arg(args, 3),
        arg(args, 4),
        settings.default_port,
        settings.connect_timeout_secs,
    )
    .with_context(|| format!("[{host}] invalid connect arguments"))?;

    shell.fleet.connect(host, target);
    Ok(Flow::Continue)
}

fn release(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let host = required(args, 0, "host", "release <host>")?;
    shell.fleet.release(host);
    Ok(Flow::Continue)
}

fn check(shell: &mut Shell, _: &[String]) -> Result<Flow> {
    shell.fleet.check();
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Dispatch;
    use crate::cmd::testing::{shell_with, test_shell};
    use crate::ssh::fake::FakeTransport;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn argv(line: &str) -> Vec<String> {
        shell_words::split(line).unwrap()
    }

    #[test]
    fn connect_pads_optional_port_and_timeout() {
        let (mut shell, _dir) = test_shell();
        assert_eq!(
            shell.dispatch(&argv("connect root secret h1")),
            Dispatch::Invoked(Flow::Continue)
        );
        shell.fleet.wait_all();
        assert_eq!(shell.fleet.pool().hosts(), vec!["h1".to_string()]);
    }

    #[test]
    fn connect_twice_dials_once() {
        let fake = FakeTransport::new();
        let state = Arc::clone(&fake.state);
        let (mut shell, _dir) = shell_with(fake);
        shell.dispatch(&argv("connect root secret h1 22 5"));
        shell.fleet.wait_all();
        shell.dispatch(&argv("connect root other h1"));
        shell.fleet.wait_all();
        assert_eq!(shell.fleet.pool().len(), 1);
        assert_eq!(state.dials.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_timeout_skips_connect() {
        let fake = FakeTransport::new();
        let state = Arc::clone(&fake.state);
        let (mut shell, _dir) = shell_with(fake);
        assert_eq!(
            shell.dispatch(&argv("connect root secret h1 22 soon")),
            Dispatch::Invoked(Flow::Continue)
        );
        shell.fleet.wait_all();
        assert!(shell.fleet.pool().is_empty());
        assert_eq!(state.dials.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn connect_without_host_is_refused() {
        let (mut shell, _dir) = test_shell();
        assert!(connect(&mut shell, &argv("root secret")).is_err());
        assert!(shell.fleet.pool().is_empty());
    }

    #[test]
    fn release_unknown_host_keeps_pool() {
        let (mut shell, _dir) = test_shell();
        shell.dispatch(&argv("connect root secret h1"));
        shell.fleet.wait_all();
        assert_eq!(
            shell.dispatch(&argv("release h2")),
            Dispatch::Invoked(Flow::Continue)
        );
        assert_eq!(shell.fleet.pool().len(), 1);
        shell.dispatch(&argv("release h1"));
        assert!(shell.fleet.pool().is_empty());
    }

    #[test]
    fn too_many_arguments_rejected() {
        let (mut shell, _dir) = test_shell();
        assert_eq!(
            shell.dispatch(&argv("connect root secret h1 22 5 extra")),
            Dispatch::Rejected
        );
        shell.fleet.wait_all();
        assert!(shell.fleet.pool().is_empty());
        assert_eq!(shell.dispatch(&argv("check now")), Dispatch::Rejected);
    }
}
