//! Interactive front-end: prompt, history and tab completion on rustyline.
//!
//! Completion works from a snapshot of the registry taken when the editor
//! starts: the first word completes to command names, later words offer the
//! `<param>` placeholder for that position plus file names.
//!
//! Ctrl-C on an empty line ends the session; on a non-empty line it only
//! discards what was typed.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use log::{debug, warn};
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{
    Cmd, ConditionalEventHandler, Context, Editor, Event, EventContext, EventHandler, Helper,
    Highlighter, Hinter, KeyEvent, Movement, RepeatCount, Validator,
};

use super::Interpreter;
use crate::cmd::{CommandRegistry, Flow};

#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
}

/// Prompt text, `[mssh ~ ]# ` in yellow when color is on.
pub fn render_prompt(name: &str, use_color: bool) -> String {
    let text = format!("[{name} ~ ]#");
    if use_color {
        format!("\x1b[33m{text}\x1b[0m ")
    } else {
        format!("{text} ")
    }
}

/// What Ctrl-C does given the line being edited.
fn interrupt_action(line: &str) -> Cmd {
    if line.is_empty() {
        Cmd::Interrupt
    } else {
        Cmd::Kill(Movement::WholeLine)
    }
}

struct InterruptHandler;

impl ConditionalEventHandler for InterruptHandler {
    fn handle(
        &self,
        _: &Event,
        _: RepeatCount,
        _: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        Some(interrupt_action(ctx.line()))
    }
}

struct CommandHint {
    name: &'static str,
    help: &'static str,
    params: Vec<(&'static str, &'static str)>,
}

#[derive(Helper, Highlighter, Hinter, Validator)]
pub struct ShellHelper {
    commands: Vec<CommandHint>,
    files: FilenameCompleter,
}

impl ShellHelper {
    pub fn from_registry(registry: &CommandRegistry) -> Self {
        let commands = registry
            .list_all()
            .into_iter()
            .flat_map(|(_, descs)| descs)
            .map(|d| CommandHint {
                name: d.name,
                help: d.help,
                params: d.params.iter().map(|p| (p.name, p.desc)).collect(),
            })
            .collect();
        ShellHelper {
            commands,
            files: FilenameCompleter::new(),
        }
    }

    /// Command-name candidates when the cursor is in the first word, else
    /// the placeholder for the argument under the cursor.
    fn complete_words(&self, line: &str, pos: usize) -> (usize, Vec<Pair>, bool) {
        let before = &line[..pos];
        let start = before
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let word = &before[start..];
        let mut words = before[..start].split_whitespace();

        let Some(command) = words.next() else {
            let mut names: Vec<Pair> = self
                .commands
                .iter()
                .filter(|c| c.name.starts_with(word))
                .map(|c| Pair {
                    display: format!("{:<10} {}", c.name, c.help),
                    replacement: c.name.to_string(),
                })
                .collect();
            names.sort_by(|a, b| a.replacement.cmp(&b.replacement));
            return (start, names, false);
        };

        let index = words.count();
        let mut out = Vec::new();
        if word.is_empty()
            && let Some(hint) = self.commands.iter().find(|c| c.name == command)
            && let Some((name, desc)) = hint.params.get(index)
        {
            out.push(Pair {
                display: format!("<{name}> {desc}"),
                replacement: String::new(),
            });
        }
        (start, out, true)
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, mut candidates, wants_files) = self.complete_words(line, pos);
        if wants_files {
            let (file_start, files) = self.files.complete(line, pos, ctx)?;
            if !files.is_empty() {
                if candidates.is_empty() {
                    return Ok((file_start, files));
                }
                // Placeholder entries replace nothing, so they can share the
                // file completer's start offset.
                candidates.extend(files);
                return Ok((file_start, candidates));
            }
        }
        Ok((start, candidates))
    }
}

impl Interpreter {
    /// Read-eval loop on the terminal until `exit`, Ctrl-D, or Ctrl-C on an
    /// empty line.
    pub fn interactive(&mut self, opts: &EditorOptions) -> Result<Flow> {
        let mut editor: Editor<ShellHelper, DefaultHistory> =
            Editor::new().context("failed to initialise line editor")?;
        editor.set_helper(Some(ShellHelper::from_registry(&self.shell().registry)));
        editor.bind_sequence(
            KeyEvent::ctrl('C'),
            EventHandler::Conditional(Box::new(InterruptHandler)),
        );

        if let Some(path) = &opts.history_file
            && let Err(e) = editor.load_history(path)
        {
            debug!("history {}: {e}", path.display());
        }

        let prompt = render_prompt(&opts.prompt, self.shell().style.use_color);
        let result = loop {
            match editor.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty()
                        && let Err(e) = editor.add_history_entry(line.as_str())
                    {
                        debug!("history: {e}");
                    }
                    if self.handle_line(&line) == Flow::Exit {
                        break Ok(Flow::Exit);
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break Ok(Flow::Exit),
                Err(e) => break Err(anyhow::Error::new(e).context("read line failed")),
            }
        };

        if let Some(path) = &opts.history_file
            && let Err(e) = editor.save_history(path)
        {
            warn!("save history {}: {e}", path.display());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_shell;

    fn helper() -> ShellHelper {
        let (shell, _dir) = test_shell();
        ShellHelper::from_registry(&shell.registry)
    }

    #[test]
    fn prompt_is_yellow_when_colored() {
        assert_eq!(render_prompt("mssh", false), "[mssh ~ ]# ");
        assert_eq!(render_prompt("mssh", true), "\x1b[33m[mssh ~ ]#\x1b[0m ");
    }

    #[test]
    fn first_word_completes_command_names() {
        let h = helper();
        let (start, pairs, files) = h.complete_words("re", 2);
        assert_eq!(start, 0);
        assert!(!files);
        let names: Vec<&str> = pairs.iter().map(|p| p.replacement.as_str()).collect();
        assert_eq!(names, vec!["release", "remote"]);
    }

    #[test]
    fn script_keyword_is_completed() {
        let h = helper();
        let (_, pairs, _) = h.complete_words("ru", 2);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].replacement, "run");
    }

    #[test]
    fn later_words_offer_param_placeholder() {
        let h = helper();
        let line = "connect root pw ";
        let (start, pairs, files) = h.complete_words(line, line.len());
        assert_eq!(start, line.len());
        assert!(files);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].display.starts_with("<host>"));
        assert!(pairs[0].replacement.is_empty());
    }

    #[test]
    fn multibyte_separator_is_a_word_boundary() {
        let h = helper();
        let line = "connect\u{3000}";
        let (start, pairs, files) = h.complete_words(line, line.len());
        assert_eq!(start, line.len());
        assert!(files);
        assert!(pairs[0].display.starts_with("<username>"));

        let line = "connect\u{3000}ro";
        let (start, _, _) = h.complete_words(line, line.len());
        assert_eq!(&line[start..], "ro");
    }

    #[test]
    fn interrupt_ends_session_only_on_empty_line() {
        assert_eq!(interrupt_action(""), Cmd::Interrupt);
        assert_eq!(interrupt_action("conn"), Cmd::Kill(Movement::WholeLine));
        assert_eq!(interrupt_action(" "), Cmd::Kill(Movement::WholeLine));
    }

    #[test]
    fn no_placeholder_past_declared_params() {
        let h = helper();
        let line = "check ";
        let (_, pairs, _) = h.complete_words(line, line.len());
        assert!(pairs.is_empty());
    }
}
