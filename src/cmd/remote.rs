/*!
remote.rs - run one command line on every connected host.

  remote "<command line>"

The command line is a single argument, so quote it when it contains
blanks. The interpreter fallback can also route unknown input here (see
`shell::Fallback::Remote`).
*/

use anyhow::Result;

use super::Shell;
use super::dispatch::Flow;
use super::registry::{CommandRegistry, ParamSpec};
use super::shared::required;

const GROUP: &str = "exec";

pub fn register(registry: &mut CommandRegistry) {
    registry.register(
        GROUP,
        "remote",
        remote,
        "Execute a command on every connected host and print its output",
        "remote <command>",
        vec![ParamSpec::required("command", "string", "command line, quoted")],
    );
}

fn remote(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let command = required(args, 0, "command", "remote <command>")?;
    run_everywhere(shell, command);
    Ok(Flow::Continue)
}

/// Execute `command` on the pool, streaming to stdout.
///
/// Stdout is locked per write only: fan-out units log through stdout while
/// the command runs, so the lock must never be held across the join.
pub fn run_everywhere(shell: &Shell, command: &str) {
    if shell.fleet.pool().is_empty() {
        log::warn!("remote: no host connected");
        return;
    }
    shell.fleet.remote(command, &mut std::io::stdout());
}
