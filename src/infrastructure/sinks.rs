use crate::core::sink::{InteractiveSink, LogSink};
use crate::domain::error::{SerialMonError, SerialMonResult};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Session log persisted to a file
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
    shown: AtomicBool,
}

impl FileLogSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> SerialMonResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SerialMonError::Config {
                message: format!("Failed to create log directory {}: {}", parent.display(), e),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SerialMonError::Config {
                message: format!("Failed to open log file {}: {}", path.display(), e),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            shown: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&self, text: &str) {
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(text.as_bytes()).and_then(|()| file.flush()) {
            warn!("Failed to write session log {}: {}", self.path.display(), e);
        }
    }

    fn show(&self) {
        if !self.shown.swap(true, Ordering::SeqCst) {
            info!("Session log at {}", self.path.display());
        }
    }
}

/// Records everything written to it. Usable as either sink.
#[derive(Default)]
pub struct MemorySink {
    contents: Mutex<String>,
    shown: AtomicUsize,
    dimensions: Mutex<Option<(u16, u16)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.contents.lock() {
            Ok(contents) => contents.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn show_count(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn dimensions(&self) -> Option<(u16, u16)> {
        match self.dimensions.lock() {
            Ok(dimensions) => *dimensions,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn push(&self, text: &str) {
        match self.contents.lock() {
            Ok(mut contents) => contents.push_str(text),
            Err(poisoned) => poisoned.into_inner().push_str(text),
        }
    }
}

impl LogSink for MemorySink {
    fn append(&self, text: &str) {
        self.push(text);
    }

    fn show(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }
}

impl InteractiveSink for MemorySink {
    fn append(&self, text: &str) {
        self.push(text);
    }

    fn set_dimensions(&self, columns: u16, rows: u16) {
        match self.dimensions.lock() {
            Ok(mut dimensions) => *dimensions = Some((columns, rows)),
            Err(poisoned) => *poisoned.into_inner() = Some((columns, rows)),
        }
    }
}
