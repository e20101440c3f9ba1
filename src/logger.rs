//! Session logger — backs the `log` facade with a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\BackdropFE\backdropfe.log`
//!   Linux:    `~/.local/share/BackdropFE/backdropfe.log`
//!   macOS:    `~/Library/Application Support/BackdropFE/backdropfe.log`
//!
//! Use the ordinary `log::info!` / `log::warn!` / `log::error!` macros
//! anywhere in the crate. Records from other crates are kept at warn and above.
//! Panics are mirrored to the file by a hook before the default handler runs.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Library and binary crate names: records from these honour the session level.
const CRATE_TARGET: &str = "backdropfe";
const BIN_TARGET: &str = "BackdropFE";

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

struct SessionLogger {
    file: Option<Mutex<File>>,
    level: LevelFilter,
    /// Mirror records to stderr (CLI `--verbose`).
    echo: bool,
}

impl SessionLogger {
    fn write_line(&self, line: &str) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let target = metadata.target();
        if target.starts_with(CRATE_TARGET) || target.starts_with(BIN_TARGET) {
            metadata.level() <= self.level
        } else {
            metadata.level() <= Level::Warn
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&timestamp(), record.level(), &record.args().to_string());
        self.write_line(&line);
        if self.echo {
            eprintln!("{}", line);
        }
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// `[HH:MM:SS] [LEVEL] message`
pub fn format_line(ts: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", ts, level, msg)
}

/// Create (or truncate) the session file at `path`, creating parent folders.
pub fn open_session_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Initialise the session logger.  Call once, before any logging.
///
/// * Creates (or truncates) the log file; failure to open it is not fatal.
/// * Installs the `log` backend (debug level when `verbose`, info otherwise).
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init(verbose: bool) {
    let path = log_file_path();
    let file = match open_session_file(&path) {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            Some(Mutex::new(f))
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let logger = SessionLogger { file, level, echo: verbose };
    logger.write_line(&format!(
        "=== BackdropFE {} session started {} ===",
        env!("CARGO_PKG_VERSION"),
        human_timestamp()
    ));
    logger.write_line(&format!("Log file: {}", path.display()));
    logger.write_line("");

    if log::set_boxed_logger(Box::new(logger)).is_err() {
        return;
    }
    log::set_max_level(level);

    // Mirror panics to the log, then run the default handler
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!(target: CRATE_TARGET, "PANIC: {}", info);
        log::logger().flush();
        prev(info);
    }));
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_file_path() -> PathBuf {
    data_dir().join("BackdropFE").join("backdropfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort: current working directory
    PathBuf::from(".")
}

/// Wall-clock time of day (UTC) for log lines.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            let h = (secs % 86400) / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_text() {
        let err = std::panic::catch_unwind(|| -> u8 { panic!("fixed") }).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "fixed");
        let err = std::panic::catch_unwind(|| -> u8 { panic!("code {}", 7) }).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "code 7");
    }

    #[test]
    fn line_format_is_level_tagged() {
        assert_eq!(
            format_line("12:00:01", Level::Warn, "disk full"),
            "[12:00:01] [WARN] disk full"
        );
    }

    #[test]
    fn session_file_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.log");
        {
            let mut f = open_session_file(&path).unwrap();
            writeln!(f, "old session").unwrap();
        }
        open_session_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn foreign_targets_are_limited_to_warnings() {
        let logger = SessionLogger { file: None, level: LevelFilter::Debug, echo: false };
        let meta = |target: &'static str, level| Metadata::builder().target(target).level(level).build();
        assert!(logger.enabled(&meta("backdropfe::cache", Level::Debug)));
        assert!(!logger.enabled(&meta("backdropfe::cache", Level::Trace)));
        assert!(!logger.enabled(&meta("wgpu_core", Level::Info)));
        assert!(logger.enabled(&meta("wgpu_core", Level::Error)));
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(&ts[2..3], ":");
    }
}
