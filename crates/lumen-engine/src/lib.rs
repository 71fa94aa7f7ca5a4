// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # lumen-engine
//!
//! The compile-time core of the Lumen script engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - An arena allocator with mark/release and a shared free list
//! - A scope store mapping property keys to shared property records
//! - A bytecode emitter producing bytecode, source notes and try notes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lumen_engine::{CompileOptions, Compiler, ast::Program};
//!
//! let program: Program = serde_json::from_str(&json)?;
//! let mut compiler = Compiler::new(CompileOptions::default());
//! let compiled = compiler.compile(&program)?;
//! for line in compiled.script.disassemble() {
//!     println!("{}", line);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod ast;
pub mod atom;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod options;
pub mod scope;

// Re-exports for convenience
pub use arena::{ArenaPool, ArenaStats, FreeList};
pub use compiler::{CompiledFunction, CompiledProgram, Compiler, OpCode, Script, SrcNoteType, TryNote};
pub use diagnostics::{CollectingReporter, Diagnostic, ErrorNumber, ErrorReporter, MessageFormatter};
pub use error::{Error, Result};
pub use options::{CompileOptions, LanguageVersion};
pub use scope::ObjectSpace;
