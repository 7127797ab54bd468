//! Diagnostics sink
//!
//! Every pass reports through a [`Diagnostics`] value owned by the compiling
//! thread. Messages are counted per severity, filtered by an ignore level,
//! forwarded to the `log` facade, and kept for the hand-off report.

use std::fmt;
use std::panic::Location as CallSite;

use serde::{Deserialize, Serialize};

use crate::utils::Location;

/// Diagnostic severity, ascending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Diagnostic-only chatter
    Trace,
    /// Non-fatal defect
    Warning,
    /// Concrete semantic violation
    Error,
    /// The pass cannot safely continue for this unit
    Fatal,
    /// Compiler invariant violated
    Internal,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
        Severity::Internal,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn header(self) -> &'static str {
        match self {
            Self::Trace => "[TRACE   ]",
            Self::Warning => "[WARNING ]",
            Self::Error => "[ERROR   ]",
            Self::Fatal => "[FATAL   ]",
            Self::Internal => "[INTERNAL]",
        }
    }

    /// Severities that capture the reporting call site when debugging.
    fn captures_context(self) -> bool {
        self >= Self::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A single recorded message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
    /// Compiler source position that raised the diagnostic (debug mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} @{}: {}", self.severity.header(), loc, self.message),
            None => write!(f, "{} {}", self.severity.header(), self.message),
        }
    }
}

/// Serializable summary handed to whoever drives the compiler
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub warnings: usize,
    pub errors: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Append-only diagnostics log
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Messages at or below this severity are counted but not kept
    ignore_level: Option<Severity>,
    /// Capture the reporting call site for error, fatal and internal
    debug: bool,
    counts: [usize; 5],
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore all messages at or below `level`; `None` keeps everything.
    pub fn set_ignore_level(&mut self, level: Option<Severity>) {
        self.ignore_level = level;
    }

    pub fn with_ignore_level(mut self, level: Option<Severity>) -> Self {
        self.set_ignore_level(level);
        self
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    #[track_caller]
    pub fn trace(&mut self, loc: &Location, msg: impl fmt::Display) {
        self.record(Severity::Trace, Some(loc), msg.to_string());
    }

    #[track_caller]
    pub fn warning(&mut self, loc: &Location, msg: impl fmt::Display) {
        self.record(Severity::Warning, Some(loc), msg.to_string());
    }

    #[track_caller]
    pub fn error(&mut self, loc: &Location, msg: impl fmt::Display) {
        self.record(Severity::Error, Some(loc), msg.to_string());
    }

    #[track_caller]
    pub fn fatal(&mut self, loc: &Location, msg: impl fmt::Display) {
        self.record(Severity::Fatal, Some(loc), msg.to_string());
    }

    #[track_caller]
    pub fn internal(&mut self, loc: Option<&Location>, msg: impl fmt::Display) {
        self.record(Severity::Internal, loc, msg.to_string());
    }

    #[track_caller]
    fn record(&mut self, severity: Severity, loc: Option<&Location>, message: String) {
        self.counts[severity.index()] += 1;
        if self.ignore_level.is_some_and(|level| severity <= level) {
            return;
        }

        let origin = (self.debug && severity.captures_context()).then(|| {
            let site = CallSite::caller();
            format!("{}:{}", site.file(), site.line())
        });
        let diagnostic = Diagnostic {
            severity,
            location: loc.cloned(),
            message,
            origin,
        };

        match severity {
            Severity::Trace => log::trace!("{}", diagnostic),
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Error | Severity::Fatal | Severity::Internal => log::error!("{}", diagnostic),
        }
        if let Some(origin) = &diagnostic.origin {
            log::debug!("[debug   ] raised at {}", origin);
        }
        self.messages.push(diagnostic);
    }

    /// Running count for one severity, including ignored messages
    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity.index()]
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Errors, fatals and internals together
    pub fn errors(&self) -> usize {
        self.count(Severity::Error) + self.count(Severity::Fatal) + self.count(Severity::Internal)
    }

    /// Total number of diagnostics of any severity
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn has_errors(&self) -> bool {
        self.errors() > 0
    }

    pub fn has_internal(&self) -> bool {
        self.count(Severity::Internal) > 0
    }

    /// Messages that passed the ignore filter, in reporting order
    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn report(&self) -> DiagnosticReport {
        DiagnosticReport {
            warnings: self.warnings(),
            errors: self.errors(),
            diagnostics: self.messages.clone(),
        }
    }
}
