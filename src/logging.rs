//! Structured logging for the strategy dashboard.
//!
//! Every record is one JSON line with a run id and a sequence number so a
//! session can be replayed: which row was added, which command was dispatched,
//! how it was reconciled. Records are mirrored to stderr (stdout belongs to the
//! console grid) and to `LOG_DIR/<run_id>/events.jsonl`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Registry, // Row creation, edits, removal
    Command,  // Dispatch and reconciliation
    Grid,     // Display widget events
    Session,  // Login info, credentials
    System,   // Startup, shutdown
    Audit,    // Journal writes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Registry => "registry",
            Domain::Command => "command",
            Domain::Grid => "grid",
            Domain::Session => "session",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS is a comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        // LOG_DIR=off keeps everything on stderr
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        if base == "off" {
            return RunContext { run_id, events: None, trace: None };
        }
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
            return RunContext { run_id, events: None, trace: None };
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

const REDACTED_KEYS: [&str; 5] = ["password", "license", "authorization", "Authorization", "api_key"];

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in REDACTED_KEYS {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["row_id", "strategy", "command", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    let ctx = ensure_run_context();
    let line = build_record(&ctx.run_id, level, domain.as_str(), event, fields).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

fn build_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> Value {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_row_added(row_id: u64, strategy: &str) {
    log(
        Level::Info,
        Domain::Registry,
        "row_added",
        obj(&[("row_id", json!(row_id)), ("strategy", v_str(strategy))]),
    );
}

pub fn log_row_removed(row_id: u64, strategy: &str, cancelled: bool) {
    log(
        Level::Info,
        Domain::Registry,
        "row_removed",
        obj(&[
            ("row_id", json!(row_id)),
            ("strategy", v_str(strategy)),
            ("cancelled_in_flight", Value::Bool(cancelled)),
        ]),
    );
}

pub fn log_command_dispatch(row_id: u64, strategy: &str, command: &str, from: &str, to: &str) {
    log(
        Level::Info,
        Domain::Command,
        "dispatch",
        obj(&[
            ("row_id", json!(row_id)),
            ("strategy", v_str(strategy)),
            ("command", v_str(command)),
            ("from", v_str(from)),
            ("to", v_str(to)),
        ]),
    );
}

pub fn log_command_rejected(row_id: u64, command: &str, code: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Command,
        "rejected",
        obj(&[
            ("row_id", json!(row_id)),
            ("command", v_str(command)),
            ("code", v_str(code)),
            ("msg", v_str(reason)),
        ]),
    );
}

pub fn log_command_outcome(row_id: u64, command: &str, state: &str, error: Option<&str>) {
    let level = if error.is_some() { Level::Warn } else { Level::Info };
    log(
        level,
        Domain::Command,
        "outcome",
        obj(&[
            ("row_id", json!(row_id)),
            ("command", v_str(command)),
            ("state", v_str(state)),
            ("error", error.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

/// An outcome arrived for a row that no longer exists.
pub fn log_row_missing(row_id: u64, command: &str) {
    log(
        Level::Warn,
        Domain::Command,
        "row_missing",
        obj(&[
            ("row_id", json!(row_id)),
            ("command", v_str(command)),
            ("msg", v_str("outcome discarded")),
        ]),
    );
}

/// Session summary on shutdown
pub fn log_session_summary(rows: usize, dispatched: u64, confirmed: u64, failed: u64, rejected: u64) {
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("rows", json!(rows)),
            ("dispatched", json!(dispatched)),
            ("confirmed", json!(confirmed)),
            ("failed", json!(failed)),
            ("rejected", json!(rejected)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================
