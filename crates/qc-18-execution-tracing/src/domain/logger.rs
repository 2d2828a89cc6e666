//! Context logger.
//!
//! Lines always go to `tracing`. When the engine attaches a capture, the same
//! line is also appended to a buffer owned by the current span, so the span
//! carries the logger output produced while it was open.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;

/// Span-scoped copy of logger output.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<String>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buf.lock().clone()
    }

    fn append(&self, line: &str) {
        let mut buf = self.buf.lock();
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Logger handed to the observed code through the execution context.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    module: Option<Arc<str>>,
    capture: Option<LogCapture>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger tagging every line with `module`.
    #[must_use]
    pub fn with_module(&self, module: &str) -> Self {
        Self {
            module: Some(Arc::from(module)),
            capture: self.capture.clone(),
        }
    }

    /// Logger writing to the normal sink and to a fresh capture buffer.
    ///
    /// The capture replaces any capture of `self`; output of nested scopes
    /// does not leak into the parent's buffer.
    pub fn capturing(&self) -> (Self, LogCapture) {
        let capture = LogCapture::new();
        let logger = Self {
            module: self.module.clone(),
            capture: Some(capture.clone()),
        };
        (logger, capture)
    }

    /// True when both loggers copy into the same capture buffer.
    pub fn shares_capture(&self, other: &Logger) -> bool {
        match (&self.capture, &other.capture) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a.buf, &b.buf),
            _ => false,
        }
    }

    pub fn debug(&self, msg: &str, kvs: &[(&str, &dyn fmt::Display)]) {
        self.log(Level::DEBUG, msg, kvs);
    }

    pub fn info(&self, msg: &str, kvs: &[(&str, &dyn fmt::Display)]) {
        self.log(Level::INFO, msg, kvs);
    }

    pub fn warn(&self, msg: &str, kvs: &[(&str, &dyn fmt::Display)]) {
        self.log(Level::WARN, msg, kvs);
    }

    pub fn error(&self, msg: &str, kvs: &[(&str, &dyn fmt::Display)]) {
        self.log(Level::ERROR, msg, kvs);
    }

    pub fn log(&self, level: Level, msg: &str, kvs: &[(&str, &dyn fmt::Display)]) {
        let mut fields = String::new();
        for (k, v) in kvs {
            // Writing into a String cannot fail.
            let _ = write!(fields, " {k}={v}");
        }
        let module = self.module.as_deref().unwrap_or("-");

        let kv = fields.trim_start();
        if level == Level::ERROR {
            tracing::error!(module, fields = %kv, "{msg}");
        } else if level == Level::WARN {
            tracing::warn!(module, fields = %kv, "{msg}");
        } else if level == Level::INFO {
            tracing::info!(module, fields = %kv, "{msg}");
        } else if level == Level::DEBUG {
            tracing::debug!(module, fields = %kv, "{msg}");
        } else {
            tracing::trace!(module, fields = %kv, "{msg}");
        }

        if let Some(capture) = &self.capture {
            capture.append(&format!("{level} {msg} module={module}{fields}"));
        }
    }
}
