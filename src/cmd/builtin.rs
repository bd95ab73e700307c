/*!
builtin.rs - interpreter-level commands.

  [cmdline] help [command] / exit / clear / vim <filename>
  [logger]  log <filename>
  [inner]   done
*/

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::Command;

use super::Shell;
use super::dispatch::Flow;
use super::format::{Role, StyleOptions, TableOpts, color, table};
use super::registry::{CommandDescriptor, CommandRegistry, ParamSpec};
use super::shared::{arg, required};
use crate::utils::logging;

pub const GROUP: &str = "cmdline";
const LOGGER_GROUP: &str = "logger";
const INNER_GROUP: &str = "inner";

pub fn register(registry: &mut CommandRegistry) {
    registry.register(
        GROUP,
        "help",
        help,
        "Show all commands, or the usage of one command",
        "help <command>",
        vec![ParamSpec::optional("command", "string", "command name")],
    );
    registry.register(GROUP, "exit", exit, "Close all connections and quit", "exit", vec![]);
    registry.register(GROUP, "clear", clear, "Clear the screen", "clear", vec![]);
    registry.register(
        GROUP,
        "vim",
        vim,
        "Edit a file with $EDITOR (default vim)",
        "vim <filename>",
        vec![ParamSpec::required("filename", "string", "file to edit")],
    );
    registry.register(
        LOGGER_GROUP,
        "log",
        log_to_file,
        "Also append log records to a file",
        "log <filename>",
        vec![ParamSpec::required("filename", "string", "log file name")],
    );
    registry.register(
        INNER_GROUP,
        "done",
        done,
        "Wait until every background task has finished",
        "done",
        vec![],
    );
}

fn help(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let name = arg(args, 0);
    let text = if name.is_empty() {
        render_index(&shell.registry, &shell.style)
    } else {
        match shell.registry.describe(name) {
            Some(desc) => render_command(desc, &shell.style),
            None => format!("    command {name} is not registered"),
        }
    };
    println!("{text}");
    Ok(Flow::Continue)
}

fn exit(_: &mut Shell, _: &[String]) -> Result<Flow> {
    Ok(Flow::Exit)
}

fn clear(_: &mut Shell, _: &[String]) -> Result<Flow> {
    let mut out = std::io::stdout().lock();
    write!(out, "\x1b[2J\x1b[1;1H")?;
    out.flush()?;
    Ok(Flow::Continue)
}

fn vim(_: &mut Shell, args: &[String]) -> Result<Flow> {
    let filename = required(args, 0, "filename", "vim <filename>")?;
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vim".to_string());
    let status = Command::new(&editor)
        .arg(filename)
        .status()
        .with_context(|| format!("open {editor} failed"))?;
    if status.success() {
        log::info!("{editor} edit success");
    } else {
        log::warn!("{editor} exited with {status}");
    }
    Ok(Flow::Continue)
}

fn log_to_file(_: &mut Shell, args: &[String]) -> Result<Flow> {
    let filename = required(args, 0, "filename", "log <filename>")?;
    logging::add_file_sink(Path::new(filename))?;
    log::info!("logging to {filename}");
    Ok(Flow::Continue)
}

fn done(shell: &mut Shell, _: &[String]) -> Result<Flow> {
    shell.fleet.wait_all();
    Ok(Flow::Continue)
}

/// Grouped one-line listing of every command.
pub fn render_index(registry: &CommandRegistry, style: &StyleOptions) -> String {
    let mut lines = vec![color(Role::Bold, "All commands:", style)];
    for (group, descs) in registry.list_all() {
        lines.push(format!("  [{}]", color(Role::Accent, group, style)));
        for d in descs {
            lines.push(format!("    {}: {}", color(Role::Primary, d.name, style), d.help));
        }
    }
    lines.join("\n")
}

/// Usage and parameter table for one command.
pub fn render_command(desc: &CommandDescriptor, style: &StyleOptions) -> String {
    let mut out = vec![
        format!("command: {}", color(Role::Primary, desc.name, style)),
        format!("summary: {}", desc.help),
        format!("usage:   {}", desc.usage),
    ];
    if desc.params.is_empty() {
        out.push("params:  (none)".to_string());
        return out.join("\n");
    }
    out.push("params:".to_string());
    let rows: Vec<Vec<String>> = desc
        .params
        .iter()
        .map(|p| {
            let necessity = if p.required {
                color(Role::Success, "required", style)
            } else {
                color(Role::Dim, "optional", style)
            };
            vec![format!("<{}>", p.name), p.kind.to_string(), necessity, p.desc.to_string()]
        })
        .collect();
    let opts = TableOpts {
        indent: 4,
        ..TableOpts::default()
    };
    out.push(table(&["NAME", "TYPE", "NECESSITY", "DESCRIPTION"], &rows, opts, style));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_shell;

    #[test]
    fn index_lists_groups_with_help_lines() {
        let (shell, _dir) = test_shell();
        let text = render_index(&shell.registry, &StyleOptions::plain());
        assert!(text.starts_with("All commands:"));
        assert!(text.contains("  [conn]"));
        assert!(text.contains("    connect: "));
        assert!(text.contains("    run: Execute script files"));
        assert!(text.find("[cmdline]").unwrap() < text.find("[conn]").unwrap());
    }

    #[test]
    fn command_help_has_param_table() {
        let (shell, _dir) = test_shell();
        let desc = shell.registry.describe("connect").unwrap();
        let text = render_command(desc, &StyleOptions::plain());
        assert!(text.contains("usage:   connect <username> <password> <host> <port> <timeout>"));
        assert!(text.contains("<host>"));
        assert!(text.contains("required"));
        assert!(text.contains("optional"));
    }

    #[test]
    fn command_help_without_params() {
        let (shell, _dir) = test_shell();
        let desc = shell.registry.describe("done").unwrap();
        assert!(render_command(desc, &StyleOptions::plain()).ends_with("(none)"));
    }

    #[test]
    fn help_for_unknown_command_is_not_an_error() {
        let (mut shell, _dir) = test_shell();
        let flow = help(&mut shell, &["nosuch".to_string()]).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn done_returns_when_idle() {
        let (mut shell, _dir) = test_shell();
        assert_eq!(done(&mut shell, &[]).unwrap(), Flow::Continue);
        assert_eq!(shell.fleet.tasks().outstanding(), 0);
    }

    #[test]
    fn log_requires_filename() {
        let (mut shell, _dir) = test_shell();
        assert!(log_to_file(&mut shell, &[String::new()]).is_err());
    }
}
