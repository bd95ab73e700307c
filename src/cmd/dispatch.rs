/*!
dispatch.rs - resolve argv[0] and invoke the handler with coerced arguments.

Coercion is positional and type-erased:
  - fewer arguments than declared parameters: pad with empty strings
  - more arguments than declared: refuse, nothing is invoked
  - handler errors are logged here; the interpreter keeps going
*/

use anyhow::{Result, bail};
use log::{error, warn};

use super::Shell;
use super::registry::{CommandDescriptor, Invocation};

/// What the interpreter should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran (successfully or not).
    Invoked(Flow),
    /// Argument shape did not fit; handler not invoked.
    Rejected,
    /// No dispatchable command under that name.
    NotFound,
}

/// Shape `supplied` to exactly `declared` positional arguments.
pub fn coerce_args(declared: usize, supplied: &[String]) -> Result<Vec<String>> {
    if supplied.len() > declared {
        bail!(
            "parameter count mismatch: expected at most {declared}, got {}",
            supplied.len()
        );
    }
    let mut args = supplied.to_vec();
    args.resize(declared, String::new());
    Ok(args)
}

impl Shell {
    /// Dispatch a tokenized line. `argv[0]` is the command name.
    pub fn dispatch(&mut self, argv: &[String]) -> Dispatch {
        let Some((name, rest)) = argv.split_first() else {
            return Dispatch::NotFound;
        };
        let (handler, declared) = match self.registry.describe(name) {
            Some(CommandDescriptor {
                invocation: Invocation::Handler(handler),
                params,
                ..
            }) => (*handler, params.len()),
            _ => return Dispatch::NotFound,
        };

        let args = match coerce_args(declared, rest) {
            Ok(args) => args,
            Err(e) => {
                warn!("{name}: {e}");
                return Dispatch::Rejected;
            }
        };

        match handler(self, &args) {
            Ok(flow) => Dispatch::Invoked(flow),
            Err(e) => {
                error!("{name}: {e:#}");
                Dispatch::Invoked(Flow::Continue)
            }
        }
    }
}
