//! JSONL scenario log.
//!
//! Every [`ScenarioRecord`] becomes one line with a fixed header followed by
//! the event's own fields:
//!
//! ```json
//! {"seq":3,"scenario":1,"type":"step_complete","timestamp":"...","elapsed_ms":5012,"patient":2,...}
//! ```
//!
//! `seq` is gap-free per file, so a reader can tell events that raced on
//! the wall clock apart. Payload keys that collide with the header are
//! dropped; non-object payloads land under `data`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;
use ward_application::{ScenarioLogger, ScenarioRecord};

const HEADER_KEYS: [&str; 5] = ["seq", "scenario", "type", "timestamp", "elapsed_ms"];

#[derive(Serialize)]
struct LogLine<'a> {
    seq: u64,
    scenario: u64,
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: String,
    elapsed_ms: u64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

struct LogFile {
    writer: BufWriter<File>,
    next_seq: u64,
}

/// Appends scenario records to a `.jsonl` file.
pub struct JsonlScenarioLogger {
    file: Mutex<LogFile>,
    opened: Instant,
    path: PathBuf,
}

impl JsonlScenarioLogger {
    /// Create (or truncate) the log at `path`, creating parent directories.
    ///
    /// Returns `None` and logs a warning if the file cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(dir = %parent.display(), error = %e, "Could not create scenario log directory");
            return None;
        }

        let file = File::create(path)
            .inspect_err(|e| {
                warn!(path = %path.display(), error = %e, "Could not create scenario log file");
            })
            .ok()?;

        Some(Self {
            file: Mutex::new(LogFile {
                writer: BufWriter::new(file),
                next_seq: 0,
            }),
            opened: Instant::now(),
            path: path.to_path_buf(),
        })
    }

    /// Create a log in `dir` named after the current local time
    /// (`scenario-20260101-120000.jsonl`).
    pub fn in_dir(dir: impl AsRef<Path>) -> Option<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        Self::new(dir.as_ref().join(format!("scenario-{}.jsonl", stamp)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn payload_fields(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(mut map) => {
            for key in HEADER_KEYS {
                map.remove(key);
            }
            map
        }
        Value::Null => Map::new(),
        other => Map::from_iter([("data".to_string(), other)]),
    }
}

impl ScenarioLogger for JsonlScenarioLogger {
    fn log(&self, record: ScenarioRecord) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let elapsed_ms = u64::try_from(self.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        let fields = payload_fields(record.payload);

        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let line = LogLine {
            seq: file.next_seq,
            scenario: record.scenario,
            kind: record.event_type,
            timestamp,
            elapsed_ms,
            fields,
        };
        let Ok(line) = serde_json::to_string(&line) else {
            return;
        };
        file.next_seq += 1;
        // flushed per line so a crashed run still leaves a readable log
        let written = writeln!(file.writer, "{}", line).and_then(|()| file.writer.flush());
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Could not write scenario log");
        }
    }
}

impl Drop for JsonlScenarioLogger {
    fn drop(&mut self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.writer.flush();
        }
    }
}
