/*!
registry.rs - command metadata and handler lookup.

Every invocable command is described once at startup by a `CommandDescriptor`
(group, name, help, usage, parameter list). The first registration under a
name wins. Keywords the interpreter implements itself (script execution) are
*reserved*: they show up in help and completion but `lookup` never returns
them, so they cannot be dispatched through the registry.
*/

use std::collections::BTreeMap;

use super::Shell;
use super::dispatch::Flow;

/// Uniform handler contract: positional textual arguments, already padded to
/// the declared parameter count.
pub type Handler = fn(&mut Shell, &[String]) -> anyhow::Result<Flow>;

#[derive(Clone, Copy)]
pub enum Invocation {
    Handler(Handler),
    Reserved,
}

/// Descriptive only: `kind` and `required` feed help and completion, they are
/// not enforced before a handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub desc: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: &'static str, desc: &'static str) -> Self {
        ParamSpec {
            name,
            kind,
            required: true,
            desc,
        }
    }

    pub const fn optional(name: &'static str, kind: &'static str, desc: &'static str) -> Self {
        ParamSpec {
            name,
            kind,
            required: false,
            desc,
        }
    }
}

pub struct CommandDescriptor {
    pub group: &'static str,
    pub name: &'static str,
    pub invocation: Invocation,
    pub help: &'static str,
    pub usage: &'static str,
    pub params: Vec<ParamSpec>,
}

impl CommandDescriptor {
    pub fn is_reserved(&self) -> bool {
        matches!(self.invocation, Invocation::Reserved)
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a command. Returns false (and changes nothing) when `name` is
    /// already taken.
    pub fn register(
        &mut self,
        group: &'static str,
        name: &'static str,
        handler: Handler,
        help: &'static str,
        usage: &'static str,
        params: Vec<ParamSpec>,
    ) -> bool {
        self.insert(CommandDescriptor {
            group,
            name,
            invocation: Invocation::Handler(handler),
            help,
            usage,
            params,
        })
    }

    /// Describe a keyword that is handled outside the registry.
    pub fn reserve(
        &mut self,
        group: &'static str,
        name: &'static str,
        help: &'static str,
        usage: &'static str,
        params: Vec<ParamSpec>,
    ) -> bool {
        self.insert(CommandDescriptor {
            group,
            name,
            invocation: Invocation::Reserved,
            help,
            usage,
            params,
        })
    }

    fn insert(&mut self, desc: CommandDescriptor) -> bool {
        if self.commands.contains_key(desc.name) {
            log::debug!("command '{}' already registered, ignoring", desc.name);
            return false;
        }
        self.commands.insert(desc.name, desc);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Handler> {
        match self.commands.get(name)?.invocation {
            Invocation::Handler(h) => Some(h),
            Invocation::Reserved => None,
        }
    }

    pub fn describe(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.commands.get(name).is_some_and(|d| d.is_reserved())
    }

    /// All descriptors grouped by `group`; groups and names are sorted.
    pub fn list_all(&self) -> Vec<(&'static str, Vec<&CommandDescriptor>)> {
        let mut groups: BTreeMap<&'static str, Vec<&CommandDescriptor>> = BTreeMap::new();
        for desc in self.commands.values() {
            groups.entry(desc.group).or_default().push(desc);
        }
        groups.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
