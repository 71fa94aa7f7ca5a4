// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the engine core.

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the arena, scope and emitter layers.
///
/// Every failure is scoped to a single compilation attempt: discarding the
/// pools and the partially built generator leaves the engine usable.
#[derive(Debug, Error)]
pub enum Error {
    /// The arena layer could not obtain memory
    #[error("out of memory")]
    OutOfMemory,

    /// A static error detected while emitting code
    #[error("{0}")]
    Compile(Diagnostic),

    /// A slab handle that does not name a live object, scope or property
    #[error("invalid {kind} handle {index}")]
    InvalidHandle {
        /// What the handle was supposed to refer to
        kind: &'static str,
        /// The raw slab index
        index: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error (AST or options input)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the diagnostic carried by a compile error.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Compile(diag) => Some(diag),
            _ => None,
        }
    }
}
