use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod cmd;
mod config;
mod fleet;
mod shell;
mod ssh;
mod utils;

use cmd::Flow;
use cmd::format::StyleOptions;
use config::Config;
use fleet::Fleet;
use shell::{EditorOptions, Interpreter};
use ssh::SshTransport;
use utils::logging;

/// mssh - drive many SSH hosts from one prompt.
///
/// Usage:
///   mssh                       interactive shell (runs ./.msshrc first)
///   mssh deploy.mssh more.mssh run scripts, then exit
///
/// Inside the shell:
///   connect <user> <password> <host> [port] [timeout]
///   put <file> [remoteDir] / get <remotePath> / remote "<command>"
///   run <script>... / done / check / release <host> / help [command]
///
/// Global flags / env:
///   -v / -vv        Increase verbosity
///   -q / --quiet    Errors only
///   -c / --config   YAML config file (or MSSH_CONFIG env)
///   NO_COLOR        Disable colored output
#[derive(Parser, Debug)]
#[command(
    name = "mssh",
    version,
    author,
    about = "mssh - interactive multi-host SSH shell",
    propagate_version = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    /// YAML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Prompt name shown as [NAME ~ ]#
    #[arg(long, value_name = "NAME")]
    prompt: Option<String>,

    /// Directory that `get` downloads into
    #[arg(long = "download-root", value_name = "DIR")]
    download_root: Option<PathBuf>,

    /// Skip the init script
    #[arg(long = "no-init")]
    no_init: bool,

    /// Script files to run instead of the interactive prompt
    #[arg(value_name = "SCRIPT")]
    scripts: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = logging::derive_level(cli.verbose, cli.quiet);
    logging::init_logging(level);

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(prompt) = cli.prompt {
        cfg.prompt = prompt;
    }
    if let Some(root) = cli.download_root {
        cfg.download_root = root;
    }

    let fleet = Fleet::new(cfg.fleet_settings(), Arc::new(SshTransport))?;
    let shell = cmd::Shell::new(fleet, StyleOptions::detect());
    let mut interp = Interpreter::new(shell, cfg.fallback);

    let mut flow = Flow::Continue;
    if !cli.no_init
        && let Some(init) = &cfg.init_script
        && init.is_file()
    {
        log::debug!("running init script {}", init.display());
        flow = interp.run_script(init);
    }

    let outcome = if flow == Flow::Exit {
        Ok(Flow::Exit)
    } else if cli.scripts.is_empty() {
        interp.interactive(&EditorOptions {
            prompt: cfg.prompt.clone(),
            history_file: cfg.history_file.clone(),
        })
    } else {
        let mut flow = Flow::Continue;
        for script in &cli.scripts {
            flow = interp.run_script(script);
            if flow == Flow::Exit {
                break;
            }
        }
        Ok(flow)
    };

    interp.shell().fleet.shutdown();
    outcome?;
    Ok(())
}
