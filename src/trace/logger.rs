use std::{fs::OpenOptions, io::Write, path::Path};

use parking_lot::Mutex;
use tracing::warn;

use crate::LOG_INTERNAL;
use crate::trace::trace::TraceEvent;

/// Appends [`TraceEvent`]s to a JSONL file. Failures only warn: a broken
/// trace never affects the session.
pub struct TraceLogger {
    file: Option<Mutex<std::fs::File>>,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path);

        match file {
            Ok(f) => Self {
                file: Some(Mutex::new(f)),
            },
            Err(e) => {
                warn!(target: LOG_INTERNAL, path = %path.display(), error = %e, "could not open trace file");
                Self { file: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn log(&self, event: &TraceEvent) {
        let Some(file_mutex) = &self.file else {
            return;
        };

        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                warn!(target: LOG_INTERNAL, error = %e, "failed to serialize trace event");
                return;
            }
        };

        if let Err(e) = writeln!(file_mutex.lock(), "{}", json) {
            warn!(target: LOG_INTERNAL, error = %e, "failed to write trace event");
        }
    }
}
