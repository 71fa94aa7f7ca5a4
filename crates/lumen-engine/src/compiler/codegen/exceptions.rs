// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! try/catch/finally compilation.
//!
//! ```text
//! try { B } catch (e if G) { C } finally { F }
//!
//! Bytecode:
//!   nop                      <- tryfin note
//! start:
//!   [B]
//!   gosub -> finally
//!   goto -> done
//! end:                       <- catch entry (try note start..end)
//!   setsp depth
//!   nop                      <- catch note (guard length)
//!   name "Object"; pushobj; newinit; exception; initprop "e"; enterwith
//!   [G]; ifeq -> rethrow
//!   [C]
//!   leavewith; gosub -> finally; goto -> done
//! rethrow:
//!   leavewith
//! finally_catch:             <- finally entry (try note start..finally_catch)
//!   setsp depth
//!   gosub -> finally
//!   exception; throw
//! finally:
//!   nop                      <- tryfin note
//!   [F]
//!   retsub
//! done:
//!   nop                      <- endbrace note
//! ```
//!
//! Jumps to a finally block that is not emitted yet are written as
//! `gosub` with a placeholder offset: `0` for the innermost enclosing
//! finally, `-1` for the next one out, and so on. Each finally block
//! resolves the zero placeholders in its own try range and moves the
//! others one level closer.

use crate::ast::TryStatement;
use crate::compiler::bytecode::OpCode;
use crate::compiler::script::{Operand, decode_at};
use crate::compiler::srcnote::SrcNoteType;
use crate::error::Result;

use super::{CodeGenerator, StmtKind};

impl CodeGenerator<'_> {
    pub(crate) fn compile_try_statement(&mut self, try_stmt: &TryStatement) -> Result<()> {
        let has_finally = try_stmt.finalizer.is_some();
        let kind = if has_finally { StmtKind::Finally } else { StmtKind::Try };
        self.push_statement(kind, self.offset());
        let depth = self.stack_depth.max(0) as u16;

        let try_note = self.new_note2(SrcNoteType::TryFin, 0)?;
        self.emit1(OpCode::Nop)?;
        let start = self.offset();
        self.compile_statement(&try_stmt.block)?;
        if has_finally {
            self.emit_hidden_jump(OpCode::Gosub)?;
        }
        let jmp = self.emit_hidden_jump(OpCode::Goto)?;
        let end = self.offset();
        self.set_note_offset(try_note, 0, end - start)?;

        let mut catch_exits = Vec::new();
        let mut guard_jump: Option<usize> = None;
        for handler in &try_stmt.handlers {
            self.update_line_notes(handler.line())?;
            handler.offset.set(self.offset());

            // A failed guard arrives here with the previous catch's scope
            // object still pushed
            if let Some(pc) = guard_jump.take() {
                self.patch_to_here(pc)?;
                self.adjust_depth(1);
                self.emit_hidden(OpCode::LeaveWith)?;
            } else {
                self.emit3(OpCode::SetSp, depth)?;
            }

            let catch_note = self.new_note2(SrcNoteType::Catch, 0)?;
            self.emit1(OpCode::Nop)?;

            self.emit_name_op(OpCode::Name, "Object")?;
            self.emit1(OpCode::PushObj)?;
            self.emit1(OpCode::NewInit)?;
            self.emit1(OpCode::Exception)?;
            self.emit_name_op(OpCode::InitProp, &handler.kind.param.name)?;
            self.emit_hidden(OpCode::EnterWith)?;

            if let Some(guard) = &handler.kind.guard {
                let guard_start = self.offset();
                self.compile_expression(guard)?;
                guard_jump = Some(self.emit_jump(OpCode::IfEq, 0)?);
                self.set_note_offset(catch_note, 0, self.offset() - guard_start)?;
            }

            self.push_statement(StmtKind::Catch, self.offset());
            self.compile_statement(&handler.kind.body)?;
            self.pop_statement()?;

            self.emit_hidden(OpCode::LeaveWith)?;
            if has_finally {
                self.emit_hidden_jump(OpCode::Gosub)?;
            }
            catch_exits.push(self.emit_hidden_jump(OpCode::Goto)?);
        }

        let mut finally_catch = None;
        if has_finally || guard_jump.is_some() {
            if let Some(pc) = guard_jump.take() {
                self.patch_to_here(pc)?;
                self.adjust_depth(1);
                self.emit_hidden(OpCode::LeaveWith)?;
            }
            if has_finally {
                finally_catch = Some(self.offset());
            }
            self.new_note(SrcNoteType::Hidden)?;
            self.emit3(OpCode::SetSp, depth)?;
            if has_finally {
                self.emit_hidden_jump(OpCode::Gosub)?;
            }
            self.emit_hidden(OpCode::Exception)?;
            self.emit_hidden(OpCode::Throw)?;
        }

        match &try_stmt.finalizer {
            Some(finalizer) => {
                let finally_start = self.offset();
                self.fixup_finally_jumps(start, finally_start)?;
                self.pop_statement()?;

                self.update_line_notes(finalizer.line())?;
                self.new_note2(SrcNoteType::TryFin, 1)?;
                self.emit1(OpCode::Nop)?;
                // The gosub return address
                self.adjust_depth(1);
                self.compile_statement(finalizer)?;
                self.emit1(OpCode::RetSub)?;
            }
            None => self.pop_statement()?,
        }

        self.new_note(SrcNoteType::EndBrace)?;
        self.emit1(OpCode::Nop)?;
        for pc in catch_exits {
            self.patch_to_here(pc)?;
        }
        self.patch_to_here(jmp)?;

        if !try_stmt.handlers.is_empty() {
            self.add_try_note(start, end, end)?;
        }
        if let Some(finally_catch) = finally_catch {
            self.add_try_note(start, finally_catch, finally_catch)?;
        }
        Ok(())
    }

    fn emit_hidden(&mut self, op: OpCode) -> Result<usize> {
        self.new_note(SrcNoteType::Hidden)?;
        self.emit1(op)
    }

    /// Emits a hidden jump with a zero offset, to be patched later.
    fn emit_hidden_jump(&mut self, op: OpCode) -> Result<usize> {
        self.new_note(SrcNoteType::Hidden)?;
        self.emit_jump(op, 0)
    }

    /// Points the placeholder `gosub`s in `start..finally` at the finally
    /// block and moves outer placeholders one level in.
    fn fixup_finally_jumps(&mut self, start: usize, finally: usize) -> Result<()> {
        let mut fixes = Vec::new();
        {
            let code = self.code()?;
            let mut pc = start;
            while pc < finally {
                let Some(insn) = decode_at(code, pc) else {
                    break;
                };
                if let (OpCode::Gosub, Operand::Jump(offset)) = (insn.op, &insn.operand) {
                    match *offset {
                        0 => fixes.push((pc, finally as isize - pc as isize)),
                        n if n < 0 => fixes.push((pc, n + 1)),
                        _ => {}
                    }
                }
                pc += insn.length;
            }
        }
        for (pc, offset) in fixes {
            self.set_jump_offset_at(pc, offset)?;
        }
        Ok(())
    }
}
