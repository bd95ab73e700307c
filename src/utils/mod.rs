//! Utilities: logging (dynamic level, console + appended file sinks) and
//! small path helpers shared by the fan-out commands.
//!
//! Key items:
//!   init_logging / derive_level / add_file_sink
//!   paths::basename / paths::join_remote

/// Logging helpers.
///
/// The shell installs its own `log::Log` implementation so every module can use
/// the plain `log::info!` / `log::warn!` macros. Records always go to stdout;
/// the `log <file>` command attaches extra append-only file sinks at runtime.
pub mod logging {
    use anyhow::{Context, Result};
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, PoisonError};

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    pub enum LogLevel {
        Error = 0,
        Warn = 1,
        Info = 2,
        Debug = 3,
        Trace = 4,
    }

    impl LogLevel {
        /// Four letter tag printed in front of every record.
        pub fn as_str(&self) -> &'static str {
            match self {
                LogLevel::Error => "ERRO",
                LogLevel::Warn => "WARN",
                LogLevel::Info => "INFO",
                LogLevel::Debug => "DEBU",
                LogLevel::Trace => "TRAC",
            }
        }

        fn ansi_code(&self) -> u8 {
            match self {
                LogLevel::Error => 31,
                LogLevel::Warn => 33,
                LogLevel::Debug | LogLevel::Trace => 37,
                LogLevel::Info => 36,
            }
        }

        pub fn filter(&self) -> log::LevelFilter {
            match self {
                LogLevel::Error => log::LevelFilter::Error,
                LogLevel::Warn => log::LevelFilter::Warn,
                LogLevel::Info => log::LevelFilter::Info,
                LogLevel::Debug => log::LevelFilter::Debug,
                LogLevel::Trace => log::LevelFilter::Trace,
            }
        }
    }

    impl From<log::Level> for LogLevel {
        fn from(level: log::Level) -> Self {
            match level {
                log::Level::Error => LogLevel::Error,
                log::Level::Warn => LogLevel::Warn,
                log::Level::Info => LogLevel::Info,
                log::Level::Debug => LogLevel::Debug,
                log::Level::Trace => LogLevel::Trace,
            }
        }
    }

    struct FileSink {
        path: PathBuf,
        file: File,
    }

    struct ShellLogger {
        sinks: Mutex<Vec<FileSink>>,
    }

    static LOGGER: ShellLogger = ShellLogger {
        sinks: Mutex::new(Vec::new()),
    };

    pub fn init_logging(level: LogLevel) {
        // A second install (tests, re-init) keeps the first logger.
        let _ = log::set_logger(&LOGGER);
        set_log_level(level);
    }

    pub fn set_log_level(level: LogLevel) {
        log::set_max_level(level.filter());
    }

    pub fn derive_level(verbose: u8, quiet: bool) -> LogLevel {
        if quiet {
            return LogLevel::Error;
        }
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Append every subsequent record to `path` (created if missing).
    /// Adding the same path twice is a no-op.
    pub fn add_file_sink(path: &Path) -> Result<()> {
        let mut sinks = LOGGER.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        if sinks.iter().any(|s| s.path == path) {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file '{}'", path.display()))?;
        sinks.push(FileSink {
            path: path.to_path_buf(),
            file,
        });
        Ok(())
    }

    pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Local wall-clock time stamped on file sink records.
    pub(crate) fn timestamp() -> String {
        chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
    }

    fn console_tag(level: LogLevel) -> String {
        if std::env::var_os("NO_COLOR").is_some() {
            return format!("[{}]", level.as_str());
        }
        format!("[\x1b[{}m{}\x1b[0m]", level.ansi_code(), level.as_str())
    }

    impl log::Log for ShellLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &log::Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let level = LogLevel::from(record.level());
            println!("{} {}", console_tag(level), record.args());

            let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
            for sink in sinks.iter_mut() {
                // A broken sink must not take the console down with it.
                let _ = writeln!(
                    sink.file,
                    "{} [{}] [{}] {}",
                    timestamp(),
                    level.as_str(),
                    record.target(),
                    record.args()
                );
            }
        }

        fn flush(&self) {
            let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
            for sink in sinks.iter_mut() {
                let _ = sink.file.flush();
            }
        }
    }
}

pub use logging::{derive_level, init_logging};

/// Path helpers for remote (always `/`-separated) paths.
pub mod paths {
    /// Last component of a `/`-separated path. Trailing slashes are ignored;
    /// an empty or root path yields itself.
    pub fn basename(path: &str) -> &str {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return if path.is_empty() { "" } else { "/" };
        }
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// Join a remote directory and a file name with exactly one separator.
    pub fn join_remote(dir: &str, name: &str) -> String {
        if dir.is_empty() {
            return name.to_string();
        }
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}
