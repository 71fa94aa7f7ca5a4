// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile diagnostics.
//!
//! Every static error raised by the emitter carries an [`ErrorNumber`]. The
//! text is produced by a pluggable [`MessageFormatter`] so the host controls
//! locale and presentation, and the finished [`Diagnostic`] is handed to an
//! [`ErrorReporter`] before the failure is returned to the caller.

use std::fmt;

use serde::Serialize;

/// Identifies a diagnostic independently of its rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorNumber {
    /// Emission drove the operand stack below zero (args: filename, pc)
    StackUnderflow,
    /// A jump or note offset does not fit its encoding (args: statement name)
    NeedDiet,
    /// A switch case label is not a usable constant (args: filename, line)
    BadCase,
    /// More than 65536 distinct literals in one unit
    TooManyLiterals,
    /// The arena layer could not obtain memory
    OutOfMemory,
    /// A formal parameter name is repeated (args: name)
    DuplicateFormal,
    /// `break label`/`continue label` names no enclosing label (args: label)
    UndefinedLabel,
    /// `break` outside any loop, switch or label
    BadBreak,
    /// `continue` outside any loop, or naming a non-loop label
    BadContinue,
}

impl ErrorNumber {
    /// Default English template; `{0}`, `{1}` are replaced positionally.
    pub fn template(self) -> &'static str {
        match self {
            ErrorNumber::StackUnderflow => "internal error compiling {0}: stack underflow at pc {1}",
            ErrorNumber::NeedDiet => "{0} too large",
            ErrorNumber::BadCase => "{0}, line {1}: invalid case expression",
            ErrorNumber::TooManyLiterals => "too many literals",
            ErrorNumber::OutOfMemory => "out of memory",
            ErrorNumber::DuplicateFormal => "duplicate formal argument {0}",
            ErrorNumber::UndefinedLabel => "label {0} not found",
            ErrorNumber::BadBreak => "invalid break",
            ErrorNumber::BadContinue => "invalid continue",
        }
    }
}

/// Renders an error number and its arguments into text.
pub trait MessageFormatter: Send + Sync {
    /// Formats the message for `number`.
    fn format(&self, number: ErrorNumber, args: &[&str]) -> String;
}

/// The built-in English formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFormatter;

impl MessageFormatter for DefaultFormatter {
    fn format(&self, number: ErrorNumber, args: &[&str]) -> String {
        let mut message = number.template().to_string();
        for (i, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{}}}", i), arg);
        }
        message
    }
}

/// A formatted compile diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// What went wrong
    pub number: ErrorNumber,
    /// Text produced by the active formatter
    pub message: String,
    /// Source file, when known
    pub filename: Option<String>,
    /// Source line, 0 when unknown
    pub line: u32,
    /// Warnings are reported but do not fail the compile
    pub warning: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.warning { "warning" } else { "error" };
        match &self.filename {
            Some(file) if self.line > 0 => write!(f, "{}:{}: {}: {}", file, self.line, kind, self.message),
            Some(file) => write!(f, "{}: {}: {}", file, kind, self.message),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

/// Receives diagnostics as they are raised.
pub trait ErrorReporter {
    /// Called once per diagnostic, before the failure propagates.
    fn report(&mut self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&mut self, diagnostic: &Diagnostic) {
        if diagnostic.warning {
            tracing::warn!(number = ?diagnostic.number, line = diagnostic.line, "{}", diagnostic.message);
        } else {
            tracing::error!(number = ?diagnostic.number, line = diagnostic.line, "{}", diagnostic.message);
        }
    }
}

/// Keeps every diagnostic it sees.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    /// Diagnostics in the order they were reported
    pub diagnostics: Vec<Diagnostic>,
}

impl ErrorReporter for CollectingReporter {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formatter_substitutes_args() {
        let text = DefaultFormatter.format(ErrorNumber::StackUnderflow, &["stdin", "12"]);
        assert_eq!(text, "internal error compiling stdin: stack underflow at pc 12");
    }

    #[test]
    fn test_need_diet_message() {
        let text = DefaultFormatter.format(ErrorNumber::NeedDiet, &["for loop"]);
        assert_eq!(text, "for loop too large");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic {
            number: ErrorNumber::BadCase,
            message: "bad".into(),
            filename: Some("a.js".into()),
            line: 3,
            warning: false,
        };
        assert_eq!(diag.to_string(), "a.js:3: error: bad");
    }

    #[test]
    fn test_collecting_reporter() {
        let mut reporter = CollectingReporter::default();
        let diag = Diagnostic {
            number: ErrorNumber::BadBreak,
            message: "invalid break".into(),
            filename: None,
            line: 0,
            warning: false,
        };
        reporter.report(&diag);
        assert_eq!(reporter.diagnostics.len(), 1);
        assert_eq!(diag.to_string(), "error: invalid break");
    }
}
