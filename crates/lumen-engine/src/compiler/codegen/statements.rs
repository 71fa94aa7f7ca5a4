// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement compilation.
//!
//! ## Lowering Overview
//!
//! | Statement | Key Operations | Notes |
//! |-----------|----------------|-------|
//! | `var` | `bindname`, `setname`/`setvar`, `pop` | `var` note, `pcdelta` between declarators |
//! | `if/else` | `ifeq`, `goto` | `if` note retyped to `if-else` |
//! | `while` | `ifeq`, `goto` (back) | `while` note |
//! | `do-while` | `ifne` (back) | `while` note on a leading `nop` |
//! | `for` | `ifeq`, `goto` (back) | `for` note with three offsets |
//! | `for-in` | `toobject`, `forname`/`forprop`/`forelem`, `pop2` | iterator state is two stack slots |
//! | `with` | `enterwith`, `leavewith` | |
//! | `label` | `nop` | `label`/`labelbrace` note |
//! | `break/continue` | `goto` (patched on pop) | unwinds with, for-in and finally |
//! | `return` | `gosub` per finally, `return` | |
//!
//! ### For Loop
//!
//! ```text
//! for (init; cond; update) body
//!
//! Bytecode:
//!   [init]
//!   pop | nop                 <- for note (cond, update, goto offsets from top)
//! top:
//!   [cond]
//!   ifeq -> end
//!   [body]
//! update:
//!   [update]
//!   pop
//!   goto -> top
//! end:
//! ```
//!
//! ### Break and Continue
//!
//! A jump out of nested statements first undoes what each crossed statement
//! put on the stack or scope chain: `leavewith` for `with` and catch
//! bodies, `pop2` for for-in loops, and a `gosub` into every crossed
//! finally block. The jump itself is emitted with a zero offset and
//! recorded on the target statement, which patches it when popped.

use crate::ast::{
    DoWhileStatement, Expression, ForInStatement, ForStatement, Function, IfStatement, JumpStatement,
    LabeledStatement, ReturnStatement, Statement, Stmt, VariableDeclaration, WhileStatement, WithStatement,
};
use crate::compiler::bytecode::OpCode;
use crate::compiler::srcnote::SrcNoteType;
use crate::diagnostics::ErrorNumber;
use crate::error::Result;

use super::expressions::NameBinding;
use super::{CodeGenerator, StmtKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpKind {
    Break,
    Continue,
}

impl CodeGenerator<'_> {
    pub fn compile_statement(&mut self, stmt: &Stmt) -> Result<()> {
        stmt.offset.set(self.offset());
        self.update_line_notes(stmt.line())?;

        match &stmt.kind {
            Statement::Var(decl) => {
                self.compile_var_declaration(decl)?;
            }
            Statement::Function(func) => self.compile_function_declaration(func, stmt.line())?,
            Statement::Expression(expr_stmt) => {
                self.compile_expression(&expr_stmt.expression)?;
                let op = if self.function.is_some() { OpCode::Pop } else { OpCode::PopV };
                self.emit1(op)?;
            }
            Statement::Block(block) => {
                self.push_statement(StmtKind::Block, self.offset());
                self.compile_statements(&block.body)?;
                self.pop_statement()?;
            }
            Statement::If(if_stmt) => self.compile_if_statement(if_stmt)?,
            Statement::Switch(switch_stmt) => self.compile_switch_statement(switch_stmt)?,
            Statement::While(while_stmt) => self.compile_while_statement(while_stmt)?,
            Statement::DoWhile(do_while) => self.compile_do_while_statement(do_while)?,
            Statement::For(for_stmt) => self.compile_for_statement(stmt, for_stmt)?,
            Statement::ForIn(for_in) => self.compile_for_in_statement(for_in)?,
            Statement::Return(ret) => self.compile_return_statement(ret)?,
            Statement::Break(jump) => self.compile_jump_statement(jump, JumpKind::Break)?,
            Statement::Continue(jump) => self.compile_jump_statement(jump, JumpKind::Continue)?,
            Statement::Throw(throw) => {
                self.compile_expression(&throw.argument)?;
                self.emit1(OpCode::Throw)?;
            }
            Statement::Try(try_stmt) => self.compile_try_statement(try_stmt)?,
            Statement::With(with_stmt) => self.compile_with_statement(with_stmt)?,
            Statement::Labeled(labeled) => self.compile_labeled_statement(labeled)?,
            Statement::Debugger => {
                self.emit1(OpCode::Debugger)?;
            }
            Statement::Empty => {}
        }
        Ok(())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Emits a `var` statement, leaving nothing on the stack.
    pub(crate) fn compile_var_declaration(&mut self, decl: &VariableDeclaration) -> Result<()> {
        let mut prev: Option<(usize, usize)> = None;
        for (i, declarator) in decl.declarations.iter().enumerate() {
            let binding = self.resolve_name(&declarator.id.name)?;
            let op = match (&declarator.init, binding) {
                (Some(init), NameBinding::Name(index)) => {
                    self.emit3(OpCode::BindName, index)?;
                    self.compile_expression(init)?;
                    (OpCode::SetName, index)
                }
                (Some(init), NameBinding::Arg(slot)) => {
                    self.compile_expression(init)?;
                    (OpCode::SetArg, slot)
                }
                (Some(init), NameBinding::Var(slot)) => {
                    self.compile_expression(init)?;
                    (OpCode::SetVar, slot)
                }
                (None, NameBinding::Name(index)) => (OpCode::Name, index),
                (None, NameBinding::Arg(slot)) => (OpCode::GetArg, slot),
                (None, NameBinding::Var(slot)) => (OpCode::GetVar, slot),
            };
            if i == 0 {
                self.new_note(SrcNoteType::Var)?;
            }
            self.emit3(op.0, op.1)?;
            let tmp = self.offset();
            if let Some((note, off)) = prev {
                self.set_note_offset(note, 0, tmp - off)?;
            }
            if i + 1 == decl.declarations.len() {
                break;
            }
            let note = self.new_note(SrcNoteType::PcDelta)?;
            prev = Some((note, tmp));
            self.emit1(OpCode::Pop)?;
        }
        self.emit1(OpCode::Pop)?;
        Ok(())
    }

    fn compile_function_declaration(&mut self, func: &Function, line: u32) -> Result<()> {
        let index = self.compile_function(func, line)?;
        if self.stmts.is_empty() {
            self.new_note2(SrcNoteType::FuncDef, index as usize)?;
            self.emit1(OpCode::Nop)?;
        } else {
            self.emit3(OpCode::Closure, index)?;
        }
        Ok(())
    }

    // ========================================================================
    // Conditionals and loops
    // ========================================================================

    fn compile_if_statement(&mut self, if_stmt: &IfStatement) -> Result<()> {
        self.compile_expression(&if_stmt.test)?;
        self.push_statement(StmtKind::If, self.offset());
        let note = self.new_note(SrcNoteType::If)?;
        let beq = self.emit_jump(OpCode::IfEq, 0)?;
        self.compile_statement(&if_stmt.consequent)?;

        if let Some(alternate) = &if_stmt.alternate {
            if let Some(top) = self.top_statement() {
                top.kind = StmtKind::Else;
            }
            self.set_note_type(note, SrcNoteType::IfElse)?;
            let jmp = self.emit_jump(OpCode::Goto, 0)?;
            self.patch_to_here(beq)?;
            self.compile_statement(alternate)?;
            self.patch_to_here(jmp)?;
        } else {
            self.patch_to_here(beq)?;
        }
        self.pop_statement()
    }

    fn compile_while_statement(&mut self, while_stmt: &WhileStatement) -> Result<()> {
        let top = self.offset();
        self.push_statement(StmtKind::WhileLoop, top);
        self.compile_expression(&while_stmt.test)?;
        self.new_note(SrcNoteType::While)?;
        let beq = self.emit_jump(OpCode::IfEq, 0)?;
        self.compile_statement(&while_stmt.body)?;
        self.emit_backward(OpCode::Goto, top)?;
        self.patch_to_here(beq)?;
        self.pop_statement()
    }

    fn compile_do_while_statement(&mut self, do_while: &DoWhileStatement) -> Result<()> {
        self.new_note(SrcNoteType::While)?;
        self.emit1(OpCode::Nop)?;
        let top = self.offset();
        self.push_statement(StmtKind::DoLoop, top);
        self.compile_statement(&do_while.body)?;
        self.set_loop_update();
        self.compile_expression(&do_while.test)?;
        self.new_note(SrcNoteType::While)?;
        self.emit_backward(OpCode::IfNe, top)?;
        self.pop_statement()
    }

    fn compile_for_statement(&mut self, stmt: &Stmt, for_stmt: &ForStatement) -> Result<()> {
        self.push_statement(StmtKind::ForLoop, self.offset());

        let note = match &for_stmt.init {
            None => {
                let note = self.new_note(SrcNoteType::For)?;
                self.emit1(OpCode::Nop)?;
                note
            }
            Some(init) => {
                // A var statement pops its own value
                let op = match &init.kind {
                    Statement::Var(_) => {
                        self.compile_statement(init)?;
                        OpCode::Nop
                    }
                    Statement::Expression(expr_stmt) => {
                        self.compile_expression(&expr_stmt.expression)?;
                        OpCode::Pop
                    }
                    _ => {
                        self.compile_statement(init)?;
                        OpCode::Nop
                    }
                };
                let note = self.new_note(SrcNoteType::For)?;
                self.emit1(op)?;
                note
            }
        };

        let top = self.offset();
        if let Some(info) = self.top_statement() {
            info.top = top;
            info.update = top;
        }

        let beq = match &for_stmt.test {
            None => {
                self.set_note_offset(note, 0, 0)?;
                None
            }
            Some(test) => {
                self.compile_expression(test)?;
                self.set_note_offset(note, 0, self.offset() - top)?;
                Some(self.emit_jump(OpCode::IfEq, 0)?)
            }
        };

        self.compile_statement(&for_stmt.body)?;
        self.set_note_offset(note, 1, self.offset() - top)?;

        if let Some(update) = &for_stmt.update {
            self.set_loop_update();
            self.compile_expression(update)?;
            self.emit1(OpCode::Pop)?;
            let end_line = stmt.end_line();
            if end_line != 0 && self.current_line != end_line {
                self.new_note2(SrcNoteType::SetLine, end_line as usize)?;
                self.current_line = end_line;
            }
        }

        self.set_note_offset(note, 2, self.offset() - top)?;
        self.emit_backward(OpCode::Goto, top)?;
        if let Some(beq) = beq {
            self.patch_to_here(beq)?;
        }
        self.pop_statement()
    }

    fn compile_for_in_statement(&mut self, for_in: &ForInStatement) -> Result<()> {
        self.push_statement(StmtKind::ForInLoop, self.offset());

        // `for (var x = init in o)` evaluates the initialiser once, up front
        let var_init = match &for_in.left.kind {
            Statement::Var(decl) => {
                let has_init = decl.declarations.first().is_some_and(|d| d.init.is_some());
                if has_init {
                    self.compile_var_declaration(decl)?;
                }
                has_init
            }
            _ => false,
        };

        self.emit1(OpCode::Push)?;
        self.compile_expression(&for_in.right)?;
        self.emit1(OpCode::ToObject)?;

        let top = self.offset();
        if let Some(info) = self.top_statement() {
            info.top = top;
            info.update = top;
        }

        match &for_in.left.kind {
            Statement::Var(decl) => {
                let name = decl.declarations.first().map(|d| d.id.name.as_str()).unwrap_or_default();
                if var_init {
                    self.emit_name_op(OpCode::ForName, name)?;
                } else {
                    self.new_note(SrcNoteType::Var)?;
                    self.emit_for_name(name)?;
                }
            }
            Statement::Expression(expr_stmt) => {
                let target = &expr_stmt.expression;
                target.offset.set(self.offset());
                match &target.kind {
                    Expression::Identifier(id) => {
                        self.emit_for_name(&id.name)?;
                    }
                    Expression::Member(member) => {
                        self.compile_expression(&member.object)?;
                        match member.property_name() {
                            Some(name) => {
                                self.new_note2(SrcNoteType::PcBase, self.offset() - target.offset.get())?;
                                self.emit_name_op(OpCode::ForProp, name)?;
                            }
                            None => {
                                self.compile_expression(&member.property)?;
                                self.new_note2(SrcNoteType::PcBase, self.offset() - target.offset.get())?;
                                self.emit1(OpCode::ForElem)?;
                            }
                        }
                    }
                    _ => {
                        // Not a reference; the key lands in a throwaway name
                        self.compile_expression(target)?;
                        self.emit1(OpCode::Pop)?;
                        self.emit_name_op(OpCode::ForName, "")?;
                    }
                }
            }
            _ => {
                self.compile_statement(&for_in.left)?;
                self.emit_name_op(OpCode::ForName, "")?;
            }
        }

        let beq = self.emit_jump(OpCode::IfEq, 0)?;
        self.compile_statement(&for_in.body)?;
        self.emit_backward(OpCode::Goto, top)?;
        self.patch_to_here(beq)?;
        self.pop_statement()?;
        self.emit1(OpCode::Pop2)?;
        Ok(())
    }

    fn emit_for_name(&mut self, name: &str) -> Result<()> {
        match self.resolve_name(name)? {
            NameBinding::Name(index) => self.emit3(OpCode::ForName, index)?,
            NameBinding::Arg(slot) => self.emit3(OpCode::ForArg, slot)?,
            NameBinding::Var(slot) => self.emit3(OpCode::ForVar, slot)?,
        };
        Ok(())
    }

    fn compile_with_statement(&mut self, with_stmt: &WithStatement) -> Result<()> {
        self.compile_expression(&with_stmt.object)?;
        self.push_statement(StmtKind::With, self.offset());
        self.emit1(OpCode::EnterWith)?;
        self.compile_statement(&with_stmt.body)?;
        self.emit1(OpCode::LeaveWith)?;
        self.pop_statement()
    }

    fn compile_labeled_statement(&mut self, labeled: &LabeledStatement) -> Result<()> {
        let atom = self.cx.atoms.intern_str(&labeled.label.name);
        let index = self.index_name(&labeled.label.name)?;
        let braced = matches!(labeled.body.kind, Statement::Block(_));
        let kind = if braced {
            SrcNoteType::LabelBrace
        } else {
            SrcNoteType::Label
        };
        self.new_note2(kind, index as usize)?;
        self.emit1(OpCode::Nop)?;

        self.push_statement(StmtKind::Label, self.offset());
        if let Some(info) = self.top_statement() {
            info.label = Some(atom);
        }
        self.compile_statement(&labeled.body)?;
        self.pop_statement()?;

        if braced {
            self.new_note(SrcNoteType::EndBrace)?;
            self.emit1(OpCode::Nop)?;
        }
        Ok(())
    }

    // ========================================================================
    // Jumps
    // ========================================================================

    fn compile_return_statement(&mut self, ret: &ReturnStatement) -> Result<()> {
        match &ret.argument {
            Some(argument) => self.compile_expression(argument)?,
            None => {
                self.emit1(OpCode::Push)?;
            }
        }
        let finallies = self.stmts.iter().filter(|s| s.kind == StmtKind::Finally).count();
        for i in 0..finallies {
            self.new_note(SrcNoteType::Hidden)?;
            self.emit_jump(OpCode::Gosub, -(i as isize))?;
        }
        self.emit1(OpCode::Return)?;
        Ok(())
    }

    fn compile_jump_statement(&mut self, jump: &JumpStatement, kind: JumpKind) -> Result<()> {
        let line = self.line();
        let label = match &jump.label {
            Some(label) => {
                let atom = self.cx.atoms.intern_str(&label.name);
                let found = self
                    .stmts
                    .iter()
                    .rposition(|s| s.kind == StmtKind::Label && s.label == Some(atom));
                match found {
                    Some(at) => Some((at, self.index_name(&label.name)?)),
                    None => return Err(self.cx.error(ErrorNumber::UndefinedLabel, &[label.name.as_str()], line)),
                }
            }
            None => None,
        };

        let (target, note) = match (kind, label) {
            (JumpKind::Break, Some((at, index))) => (at, Some((SrcNoteType::Break2Label, Some(index)))),
            (JumpKind::Break, None) => {
                let found = self
                    .stmts
                    .iter()
                    .rposition(|s| s.kind.is_loop() || s.kind == StmtKind::Switch);
                match found {
                    Some(at) => (at, None),
                    None => return Err(self.cx.error(ErrorNumber::BadBreak, &[], line)),
                }
            }
            (JumpKind::Continue, Some((at, index))) => {
                // The label, or a run of labels, must directly wrap a loop
                let found = self.stmts[at + 1..]
                    .iter()
                    .position(|s| s.kind != StmtKind::Label)
                    .map(|offset| at + 1 + offset)
                    .filter(|&loop_at| self.stmts[loop_at].kind.is_loop());
                match found {
                    Some(loop_at) => (loop_at, Some((SrcNoteType::Cont2Label, Some(index)))),
                    None => return Err(self.cx.error(ErrorNumber::BadContinue, &[], line)),
                }
            }
            (JumpKind::Continue, None) => match self.stmts.iter().rposition(|s| s.kind.is_loop()) {
                Some(at) => (at, Some((SrcNoteType::Continue, None))),
                None => return Err(self.cx.error(ErrorNumber::BadContinue, &[], line)),
            },
        };

        self.emit_goto(target, note, kind)
    }

    /// Jumps to the end (break) or update point (continue) of the statement
    /// at `target`, unwinding every statement above it.
    fn emit_goto(&mut self, target: usize, note: Option<(SrcNoteType, Option<u16>)>, kind: JumpKind) -> Result<()> {
        let mut finally_index: isize = 0;
        for i in (target + 1..self.stmts.len()).rev() {
            match self.stmts[i].kind {
                StmtKind::Finally => {
                    self.new_note(SrcNoteType::Hidden)?;
                    self.emit_jump(OpCode::Gosub, finally_index)?;
                    finally_index -= 1;
                }
                StmtKind::With | StmtKind::Catch => {
                    self.new_note(SrcNoteType::Hidden)?;
                    self.adjust_depth(1);
                    self.emit1(OpCode::LeaveWith)?;
                }
                StmtKind::ForInLoop => {
                    self.new_note(SrcNoteType::Hidden)?;
                    self.adjust_depth(2);
                    self.emit1(OpCode::Pop2)?;
                }
                _ => {}
            }
        }

        match note {
            Some((note_type, Some(index))) => {
                self.new_note2(note_type, index as usize)?;
            }
            Some((note_type, None)) => {
                self.new_note(note_type)?;
            }
            None => {}
        }
        let pc = self.emit_jump(OpCode::Goto, 0)?;
        let stmt = &mut self.stmts[target];
        match kind {
            JumpKind::Break => stmt.breaks.push(pc),
            JumpKind::Continue => stmt.continues.push(pc),
        }
        Ok(())
    }
}
