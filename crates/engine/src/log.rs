//! Narrow logging trait the engine emits through.
//!
//! The engine never assumes a concrete logging backend. A host wires
//! [`EngineLog`] to whatever logging stack it already runs (`tracing`,
//! `log`, a structured event bus, …); [`NoopLog`] and [`StderrLog`] are the
//! only implementations the engine itself ships, the same way the teacher
//! library leaves `PrintWriter` and `VmTracer` as host-supplied traits.

use std::fmt;

/// Severity of a single log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A sink for engine-emitted log records.
pub trait EngineLog: fmt::Debug {
    fn log(&self, level: Level, target: &str, message: &str);
}

/// Default: drops every record. Zero overhead in embedders that don't care.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl EngineLog for NoopLog {
    fn log(&self, _level: Level, _target: &str, _message: &str) {}
}

/// Reference implementation: writes `[LEVEL target] message` to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLog;

impl EngineLog for StderrLog {
    fn log(&self, level: Level, target: &str, message: &str) {
        eprintln!("[{level} {target}] {message}");
    }
}
