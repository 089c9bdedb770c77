/// File sink for the logger
///
/// Plain (uncolored) lines are appended to a single log file. The sink is
/// optional: until `init_file_logging` succeeds, file writes are dropped.
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

static FILE_SINK: Lazy<Mutex<Option<FileSink>>> = Lazy::new(|| Mutex::new(None));

/// Default log file location: <data dir>/cryptopilot/logs/cryptopilot.log
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("cryptopilot").join("logs").join("cryptopilot.log"))
}

/// Open (or create) the log file at `path`
pub fn init_file_logging(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    *FILE_SINK.lock() = Some(FileSink {
        path: path.to_path_buf(),
        writer: BufWriter::new(file),
    });

    Ok(())
}

/// Path of the active log file, if any
pub fn current_log_path() -> Option<PathBuf> {
    FILE_SINK.lock().as_ref().map(|sink| sink.path.clone())
}

pub fn write_to_file(line: &str) {
    let mut guard = FILE_SINK.lock();
    if let Some(sink) = guard.as_mut() {
        if writeln!(sink.writer, "{}", line).is_err() {
            // Disk full or file removed; stop trying
            *guard = None;
        }
    }
}

pub fn flush_file_logging() {
    if let Some(sink) = FILE_SINK.lock().as_mut() {
        let _ = sink.writer.flush();
    }
}
