// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode emitter.
//!
//! Transforms an AST into bytecode, source notes and try notes.
//!
//! # Module Structure
//!
//! - `bytecode`: Opcode table and immediate encoding
//! - `srcnote`: Source-note encoding and line mapping
//! - `trynote`: Exception ranges
//! - `script`: Finished units and the instruction decoder
//! - `codegen`: Code generation from AST
//!   - `codegen::statements`, `codegen::expressions`: lowering
//!   - `codegen::switch`, `codegen::exceptions`: switch and try

pub mod bytecode;
pub mod codegen;
pub(crate) mod fold;
pub mod script;
pub mod srcnote;
pub mod trynote;

pub use bytecode::{OpCode, OpFormat, OpSpec};
pub use codegen::Compiler;
pub use script::{CompiledFunction, CompiledProgram, DisasmLine, Instruction, Instructions, Operand, Script, decode_at};
pub use srcnote::{SrcNote, SrcNoteType, SrcNotes};
pub use trynote::{TryNote, decode_try_notes, encode_try_notes};
