// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Finished compilation units and the instruction decoder.

use std::fmt;

use serde::Serialize;

use super::bytecode::{OpCode, OpFormat, instruction_length, jump_offset, read_u16};
use super::srcnote::{SrcNotes, pc_to_line};
use super::trynote::{TryNote, encode_try_notes};
use crate::atom::{AtomValue, FunctionId};

/// The buffers a code generator hands to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    /// Bytecode
    pub code: Vec<u8>,
    /// Source notes, zero-terminated
    pub notes: Vec<u8>,
    /// Exception ranges
    pub try_notes: Vec<TryNote>,
    /// Literal table indexed by atom operands
    pub atoms: Vec<AtomValue>,
    /// Operand stack high-water mark
    pub max_stack_depth: usize,
    /// Source file name
    pub filename: Option<String>,
    /// Line of the first bytecode
    pub first_line: u32,
    /// The function this script is the body of
    pub function: Option<FunctionId>,
}

impl Script {
    /// Decoded instructions in code order.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.code)
    }

    /// Source line of the instruction at `pc`.
    pub fn line_of(&self, pc: usize) -> u32 {
        pc_to_line(&self.notes, self.first_line, pc)
    }

    /// Count-prefixed try-note encoding.
    pub fn encoded_try_notes(&self) -> Vec<u8> {
        encode_try_notes(&self.try_notes)
    }

    /// One line per instruction.
    pub fn disassemble(&self) -> Vec<DisasmLine> {
        self.instructions()
            .map(|insn| DisasmLine {
                pc: insn.pc,
                line: self.line_of(insn.pc),
                op: insn.op,
                operand: self.render_operand(&insn),
            })
            .collect()
    }

    fn render_operand(&self, insn: &Instruction) -> String {
        let target = |off: isize| (insn.pc as isize + off) as usize;
        match &insn.operand {
            Operand::None => String::new(),
            Operand::Jump(off) => format!("{} ({:+})", target(*off), off),
            Operand::Atom(index) => match self.atoms.get(*index as usize) {
                Some(AtomValue::String(s)) => format!("\"{}\"", s),
                Some(value) => value.to_string(),
                None => format!("#{}", index),
            },
            Operand::Uint16(n) | Operand::Argc(n) | Operand::Slot(n) | Operand::Depth(n) => n.to_string(),
            Operand::Table {
                default,
                low,
                high,
                targets,
            } => {
                let mut text = format!("default {} low {} high {}", target(*default), low, high);
                for (i, off) in targets.iter().enumerate() {
                    text.push_str(&format!("\n\t{}: {}", *low as isize + i as isize, target(*off)));
                }
                text
            }
            Operand::Lookup { default, pairs } => {
                let mut text = format!("default {} npairs {}", target(*default), pairs.len());
                for (index, off) in pairs {
                    let key = self
                        .atoms
                        .get(*index as usize)
                        .map_or_else(|| format!("#{}", index), |v| v.to_string());
                    text.push_str(&format!("\n\t{}: {}", key, target(*off)));
                }
                text
            }
        }
    }

    /// Renders the note stream.
    pub fn note_listing(&self) -> Vec<String> {
        SrcNotes::new(&self.notes)
            .enumerate()
            .map(|(i, note)| {
                let operands: Vec<String> = note.operands.iter().map(|o| o.to_string()).collect();
                format!(
                    "{:3}: {:5} [{:4}] {:<12} {}",
                    i,
                    note.pc,
                    note.delta,
                    note.kind.name(),
                    operands.join(" ")
                )
            })
            .collect()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.disassemble() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// One rendered instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmLine {
    /// Bytecode offset
    pub pc: usize,
    /// Source line
    pub line: u32,
    /// Opcode
    pub op: OpCode,
    /// Rendered immediate
    pub operand: String,
}

impl fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05}:{:4}  {}", self.pc, self.line, self.op.name())?;
        if !self.operand.is_empty() {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

/// Decoded immediate operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No immediate
    None,
    /// Relative jump offset
    Jump(isize),
    /// Atom index
    Atom(u16),
    /// Literal integer
    Uint16(u16),
    /// Call argument count
    Argc(u16),
    /// Argument or variable slot
    Slot(u16),
    /// Stack depth
    Depth(u16),
    /// Dense switch table
    Table {
        /// Default offset
        default: isize,
        /// Lowest case value
        low: i16,
        /// Highest case value
        high: i16,
        /// Offsets for `low..=high`
        targets: Vec<isize>,
    },
    /// Sparse switch table
    Lookup {
        /// Default offset
        default: isize,
        /// `(atom index, offset)` pairs
        pairs: Vec<(u16, isize)>,
    },
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub pc: usize,
    /// Opcode
    pub op: OpCode,
    /// Immediate
    pub operand: Operand,
    /// Encoded length
    pub length: usize,
}

impl Instruction {
    /// Absolute target of a jump instruction.
    pub fn jump_target(&self) -> Option<usize> {
        match self.operand {
            Operand::Jump(off) => Some((self.pc as isize + off) as usize),
            _ => None,
        }
    }
}

/// Decodes the instruction at `pc`, or `None` if the bytes are malformed.
pub fn decode_at(code: &[u8], pc: usize) -> Option<Instruction> {
    let op = OpCode::from_u8(*code.get(pc)?)?;
    let length = instruction_length(code, pc)?;
    if pc + length > code.len() {
        return None;
    }
    let imm = || read_u16(code, pc + 1);
    let operand = match op.spec().format {
        OpFormat::Byte => Operand::None,
        OpFormat::Jump => Operand::Jump(jump_offset(code, pc)),
        OpFormat::Atom => Operand::Atom(imm()),
        OpFormat::Uint16 => Operand::Uint16(imm()),
        OpFormat::Argc => Operand::Argc(imm()),
        OpFormat::Arg | OpFormat::Var => Operand::Slot(imm()),
        OpFormat::Depth => Operand::Depth(imm()),
        OpFormat::TableSwitch => {
            let low = read_u16(code, pc + 3) as i16;
            let high = read_u16(code, pc + 5) as i16;
            let targets = (0..(length - 7) / 2)
                .map(|i| jump_offset(code, pc + 6 + 2 * i))
                .collect();
            Operand::Table {
                default: jump_offset(code, pc),
                low,
                high,
                targets,
            }
        }
        OpFormat::LookupSwitch => {
            let npairs = read_u16(code, pc + 3) as usize;
            let pairs = (0..npairs)
                .map(|i| {
                    let at = pc + 5 + 4 * i;
                    (read_u16(code, at), jump_offset(code, at + 1))
                })
                .collect();
            Operand::Lookup {
                default: jump_offset(code, pc),
                pairs,
            }
        }
    };
    Some(Instruction {
        pc,
        op,
        operand,
        length,
    })
}

/// Iterator over the instructions of a code buffer. Stops at the end of
/// the buffer or at the first malformed instruction.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Instructions<'a> {
    /// Starts at offset zero.
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let insn = decode_at(self.code, self.pc)?;
        self.pc += insn.length;
        Some(insn)
    }
}

/// A compiled function body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFunction {
    /// Function name, if any
    pub name: Option<String>,
    /// Formal parameter count
    pub nargs: u16,
    /// Local variable count
    pub nvars: u16,
    /// The body
    pub script: Script,
}

/// Output of compiling a program: the top-level script and every function
/// it contains, indexed by [`FunctionId`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledProgram {
    /// Top-level code
    pub script: Script,
    /// Function bodies
    pub functions: Vec<CompiledFunction>,
}

impl CompiledProgram {
    /// The function body for `id`.
    pub fn function(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.functions.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(code: Vec<u8>) -> Script {
        Script {
            code,
            notes: vec![0],
            try_notes: Vec::new(),
            atoms: vec![AtomValue::String("x".into())],
            max_stack_depth: 1,
            filename: None,
            first_line: 1,
            function: None,
        }
    }

    #[test]
    fn test_decode_simple_sequence() {
        let s = script(vec![OpCode::Name as u8, 0, 0, OpCode::IfEq as u8, 0, 4, OpCode::Zero as u8]);
        let insns: Vec<_> = s.instructions().collect();
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[0].operand, Operand::Atom(0));
        assert_eq!(insns[1].jump_target(), Some(7));
        assert_eq!(insns[2].op, OpCode::Zero);
    }

    #[test]
    fn test_decode_tableswitch() {
        let code = vec![
            OpCode::TableSwitch as u8,
            0,
            11,
            0,
            0,
            0,
            1,
            0,
            9,
            0,
            10,
            OpCode::Nop as u8,
        ];
        let insn = decode_at(&code, 0).unwrap();
        assert_eq!(insn.length, 11);
        match insn.operand {
            Operand::Table { low, high, targets, .. } => {
                assert_eq!((low, high), (0, 1));
                assert_eq!(targets, vec![9, 10]);
            }
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn test_disassembly_renders_atoms() {
        let s = script(vec![OpCode::Name as u8, 0, 0, OpCode::PopV as u8]);
        let text = s.to_string();
        assert!(text.contains("name \"x\""));
        assert!(text.contains("popv"));
    }

    #[test]
    fn test_truncated_code_stops_decoding() {
        let s = script(vec![OpCode::Goto as u8, 0]);
        assert_eq!(s.instructions().count(), 0);
    }
}
