//! Line interpreter and script runner.
//!
//! Every line, typed or read from a script, goes through `handle_line`:
//! blank and `#` lines are skipped, the rest is split shell-style and
//! dispatched. `run <file>...` executes scripts through the same loop;
//! anything else the registry does not know goes to the fallback handler.

pub mod editor;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{error, warn};
use serde::Deserialize;

use crate::cmd::{Dispatch, Flow, SCRIPT_KEYWORD, Shell, remote};

pub use editor::EditorOptions;

pub const COMMENT_PREFIX: char = '#';

/// Built-in choices for unrecognised input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Print the line back.
    #[default]
    Echo,
    /// Run the whole line on every connected host.
    Remote,
}

pub type FallbackHandler = Box<dyn FnMut(&mut Shell, &str)>;

impl Fallback {
    pub fn into_handler(self) -> FallbackHandler {
        match self {
            Fallback::Echo => Box::new(|_: &mut Shell, line: &str| {
                println!("exec with fallback: {line}");
            }),
            Fallback::Remote => Box::new(|shell: &mut Shell, line: &str| {
                remote::run_everywhere(shell, line);
            }),
        }
    }
}

pub struct Interpreter {
    shell: Shell,
    fallback: FallbackHandler,
    /// Scripts currently executing, outermost first.
    active: Vec<PathBuf>,
}

impl Interpreter {
    pub fn new(shell: Shell, fallback: Fallback) -> Self {
        Self::with_fallback(shell, fallback.into_handler())
    }

    pub fn with_fallback(shell: Shell, fallback: FallbackHandler) -> Self {
        Interpreter {
            shell,
            fallback,
            active: Vec::new(),
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Process one input line.
    pub fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            return Flow::Continue;
        }
        let argv = match shell_words::split(line) {
            Ok(argv) => argv,
            Err(e) => {
                error!("{line}: {e}");
                return Flow::Continue;
            }
        };
        let Some(first) = argv.first() else {
            return Flow::Continue;
        };

        match self.shell.dispatch(&argv) {
            Dispatch::Invoked(flow) => flow,
            Dispatch::Rejected => Flow::Continue,
            Dispatch::NotFound if first == SCRIPT_KEYWORD => self.run_scripts(&argv[1..]),
            Dispatch::NotFound => {
                (self.fallback)(&mut self.shell, line);
                Flow::Continue
            }
        }
    }

    fn run_scripts(&mut self, paths: &[String]) -> Flow {
        if paths.is_empty() {
            warn!("usage: {SCRIPT_KEYWORD} <filename> [filename...]");
            return Flow::Continue;
        }
        for path in paths {
            if self.run_script(Path::new(path)) == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Read lines from `reader` until end of input or `exit`. A line that is
    /// not valid UTF-8 is logged and skipped like any other unparsable line.
    pub fn interpret<R: BufRead>(&mut self, mut reader: R) -> Flow {
        let mut buf = Vec::new();
        let mut lineno = 0usize;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => lineno += 1,
                Err(e) => {
                    error!("read error: {e}");
                    break;
                }
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    error!("line {lineno}: {e}");
                    continue;
                }
            };
            if self.handle_line(line) == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Execute a script file. A script that is already running (directly or
    /// through nesting) is refused instead of recursing forever.
    pub fn run_script(&mut self, path: &Path) -> Flow {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.active.contains(&key) {
            error!(
                "run script {} error: already running (recursive {SCRIPT_KEYWORD})",
                path.display()
            );
            return Flow::Continue;
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                error!("run script {} error: {e}", path.display());
                return Flow::Continue;
            }
        };

        self.active.push(key);
        let flow = self.interpret(BufReader::new(file));
        self.active.pop();
        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_shell;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    fn recording() -> (Interpreter, Rc<RefCell<Vec<String>>>, tempfile::TempDir) {
        let (shell, dir) = test_shell();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let interp = Interpreter::with_fallback(
            shell,
            Box::new(move |_: &mut Shell, line: &str| sink.borrow_mut().push(line.to_string())),
        );
        (interp, seen, dir)
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let (mut interp, seen, _dir) = recording();
        let input = "\n   \n# connect root pw h1\n  #indented comment\n";
        assert_eq!(interp.interpret(Cursor::new(input)), Flow::Continue);
        assert!(seen.borrow().is_empty());
        assert!(interp.shell().fleet.pool().is_empty());
    }

    #[test]
    fn unknown_command_goes_to_fallback_verbatim_once() {
        let (mut interp, seen, _dir) = recording();
        let before = interp.shell().registry.len();
        interp.handle_line("  ls -la '/tmp/a b'  ");
        assert_eq!(*seen.borrow(), vec!["ls -la '/tmp/a b'".to_string()]);
        assert_eq!(interp.shell().registry.len(), before);
        assert!(interp.shell().registry.describe("ls").is_none());
    }

    #[test]
    fn tokenizer_error_skips_line() {
        let (mut interp, seen, _dir) = recording();
        assert_eq!(interp.handle_line("connect root 'pw h1"), Flow::Continue);
        assert!(seen.borrow().is_empty());
        interp.shell().fleet.wait_all();
        assert!(interp.shell().fleet.pool().is_empty());
    }

    #[test]
    fn nested_script_runs_inline() {
        let (mut interp, seen, dir) = recording();
        let inner = write(dir.path(), "inner.mssh", "connect root pw h1\ndone\n");
        let outer = write(
            dir.path(),
            "outer.mssh",
            &format!(
                "# setup\n\n{SCRIPT_KEYWORD} {}\ncheck\n",
                shell_words::quote(inner.to_str().unwrap())
            ),
        );
        assert_eq!(interp.run_script(&outer), Flow::Continue);
        assert_eq!(interp.shell().fleet.pool().hosts(), vec!["h1".to_string()]);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn self_referencing_script_stops() {
        let (mut interp, seen, dir) = recording();
        let path = dir.path().join("loop.mssh");
        let body = format!(
            "{SCRIPT_KEYWORD} {}\nmarker\n",
            shell_words::quote(path.to_str().unwrap())
        );
        std::fs::write(&path, body).unwrap();
        assert_eq!(interp.run_script(&path), Flow::Continue);
        assert_eq!(*seen.borrow(), vec!["marker".to_string()]);
    }

    #[test]
    fn same_script_may_run_twice_in_sequence() {
        let (mut interp, seen, dir) = recording();
        let path = write(dir.path(), "once.mssh", "hello\n");
        let line = format!(
            "{SCRIPT_KEYWORD} {0} {0}",
            shell_words::quote(path.to_str().unwrap())
        );
        interp.handle_line(&line);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn exit_in_nested_script_stops_everything() {
        let (mut interp, seen, dir) = recording();
        let inner = write(dir.path(), "inner.mssh", "exit\nafter-exit\n");
        let input = format!(
            "{SCRIPT_KEYWORD} {}\nnever\n",
            shell_words::quote(inner.to_str().unwrap())
        );
        assert_eq!(interp.interpret(Cursor::new(input)), Flow::Exit);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn missing_script_is_logged_and_skipped() {
        let (mut interp, seen, dir) = recording();
        let missing = dir.path().join("missing.mssh");
        let input = format!(
            "{SCRIPT_KEYWORD} {}\nstill-here\n",
            shell_words::quote(missing.to_str().unwrap())
        );
        assert_eq!(interp.interpret(Cursor::new(input)), Flow::Continue);
        assert_eq!(*seen.borrow(), vec!["still-here".to_string()]);
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let (mut interp, seen, dir) = recording();
        let path = dir.path().join("binary.mssh");
        std::fs::write(&path, b"first\n\xff\xfe bad\nafter\n").unwrap();
        assert_eq!(interp.run_script(&path), Flow::Continue);
        assert_eq!(*seen.borrow(), vec!["first".to_string(), "after".to_string()]);
    }

    #[test]
    fn crlf_line_endings_are_trimmed() {
        let (mut interp, seen, _dir) = recording();
        interp.interpret(Cursor::new("one\r\ntwo"));
        assert_eq!(*seen.borrow(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn bare_script_keyword_is_ignored() {
        let (mut interp, seen, _dir) = recording();
        assert_eq!(interp.handle_line(SCRIPT_KEYWORD), Flow::Continue);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn count_mismatch_does_not_reach_fallback() {
        let (mut interp, seen, _dir) = recording();
        interp.handle_line("release a b");
        assert!(seen.borrow().is_empty());
    }
}
