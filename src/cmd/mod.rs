/*!
Command layer: registry, dispatcher and the built-in command handlers.

  src/cmd/
    mod.rs       (this file: `Shell` + registration of every command)
    registry.rs  (CommandDescriptor / ParamSpec / CommandRegistry)
    dispatch.rs  (argument coercion + Shell::dispatch)
    shared.rs    (argument helpers used by handlers)
    builtin.rs   (help / exit / clear / vim / log / done)
    conn.rs      (connect / release / check)
    file.rs      (put / get)
    remote.rs    (remote)
    format.rs    (color + table rendering)

Conventions:
  - Each handler module exposes `register(&mut CommandRegistry)`.
  - Handlers share one signature (`registry::Handler`) and return
    `anyhow::Result<Flow>`; errors are logged by the dispatcher.
*/

pub mod builtin;
pub mod conn;
pub mod dispatch;
pub mod file;
pub mod format;
pub mod registry;
pub mod remote;
pub mod shared;

pub use dispatch::{Dispatch, Flow};
pub use registry::{CommandDescriptor, CommandRegistry, ParamSpec};

use crate::fleet::Fleet;
use format::StyleOptions;

/// Script-execution keyword. Reserved in the registry and implemented by the
/// interpreter.
pub const SCRIPT_KEYWORD: &str = "run";

/// Everything a handler can touch.
pub struct Shell {
    pub registry: CommandRegistry,
    pub fleet: Fleet,
    pub style: StyleOptions,
}

impl Shell {
    pub fn new(fleet: Fleet, style: StyleOptions) -> Self {
        let mut registry = CommandRegistry::new();
        register_all(&mut registry);
        Shell {
            registry,
            fleet,
            style,
        }
    }
}

pub fn register_all(registry: &mut CommandRegistry) {
    registry.reserve(
        builtin::GROUP,
        SCRIPT_KEYWORD,
        "Execute script files line by line",
        "run <filename> [filename...]",
        vec![ParamSpec::required("filename", "string", "script file name")],
    );
    builtin::register(registry);
    conn::register(registry);
    file::register(registry);
    remote::register(registry);
}
