// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Language version the emitter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageVersion {
    /// Pre-ECMA semantics: switch cases are folded at compile time and
    /// `eval` calls are ordinary calls
    Legacy,
    /// ECMA semantics
    #[default]
    Ecma,
}

/// Options for one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Target language version
    pub version: LanguageVersion,

    /// Source file name used in diagnostics ("stdin" when absent)
    pub filename: Option<String>,

    /// Line number of the first source line
    pub first_line: u32,

    /// Treat duplicate formal parameters as errors instead of warnings
    pub strict: bool,

    /// Bytecode buffer growth increment in bytes
    pub code_chunk: usize,

    /// Source-note buffer growth increment in bytes
    pub note_chunk: usize,

    /// Try-note buffer growth increment in notes
    pub try_note_chunk: usize,

    /// Arena size for the code pool
    pub code_arena_size: usize,

    /// Arena size for the temp pool
    pub temp_arena_size: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            version: LanguageVersion::Ecma,
            filename: None,
            first_line: 1,
            strict: false,
            code_chunk: 256,
            note_chunk: 64,
            try_note_chunk: 64,
            code_arena_size: 1024,
            temp_arena_size: 1024,
        }
    }
}

impl CompileOptions {
    /// Loads options from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The name diagnostics use for the source.
    pub fn display_filename(&self) -> &str {
        self.filename.as_deref().unwrap_or("stdin")
    }

    /// Whether the legacy switch/eval rules apply.
    pub fn is_legacy(&self) -> bool {
        self.version == LanguageVersion::Legacy
    }
}
