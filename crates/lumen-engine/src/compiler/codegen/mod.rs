// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from AST to bytecode.
//!
//! A [`CodeGenerator`] compiles one unit (the program, or one function
//! body) into an arena-backed bytecode buffer, a source-note stream and a
//! try-note table. Function literals are compiled by a nested generator
//! that borrows the same [`CompileContext`]; each generator takes marks in
//! the code and temp pools when it starts and releases them when dropped,
//! so nested units allocate and free in stack order.
//!
//! Lowering is split by construct:
//!
//! - `statements`: simple statements, loops, labels, break/continue
//! - `switch`: the three switch strategies
//! - `exceptions`: try/catch/finally
//! - `expressions`: expressions, function literals and name resolution

mod exceptions;
mod expressions;
mod statements;
mod switch;


use tracing::{debug, trace};

use crate::arena::{ArenaBuf, ArenaMark, ArenaPool, ArenaStats};
use crate::ast::{Function, Program, Statement, Stmt};
use crate::atom::{AtomId, AtomList, AtomTable, AtomValue, FunctionId};
use crate::compiler::bytecode::{self, JUMP_OFFSET_MAX, JUMP_OFFSET_MIN, OpCode};
use crate::compiler::script::{CompiledFunction, CompiledProgram, Script};
use crate::compiler::srcnote::{self, OFFSET_LIMIT, SrcNoteType};
use crate::compiler::trynote::{TryNote, TryNoteBuf};
use crate::diagnostics::{
    DefaultFormatter, Diagnostic, ErrorNumber, ErrorReporter, MessageFormatter, TracingReporter,
};
use crate::error::{Error, Result};
use crate::options::CompileOptions;
use crate::scope::{ObjectId, ObjectSpace};

/// State shared by every code generator of one compilation: the arena
/// pools, the atom table, the object space function scopes live in, and
/// the diagnostic hooks.
pub(crate) struct CompileContext {
    pub(crate) options: CompileOptions,
    pub(crate) code_pool: ArenaPool,
    pub(crate) temp_pool: ArenaPool,
    pub(crate) atoms: AtomTable,
    pub(crate) space: ObjectSpace,
    pub(crate) functions: Vec<Option<CompiledFunction>>,
    formatter: Box<dyn MessageFormatter>,
    reporter: Box<dyn ErrorReporter>,
    diagnostics: Vec<Diagnostic>,
}

impl CompileContext {
    /// Creates a context with the default formatter and a `tracing`
    /// reporter.
    pub fn new(options: CompileOptions) -> Self {
        let code_pool = ArenaPool::new("code", options.code_arena_size, 0);
        let temp_pool = ArenaPool::new("temp", options.temp_arena_size, 0);
        Self {
            options,
            code_pool,
            temp_pool,
            atoms: AtomTable::new(),
            space: ObjectSpace::new(),
            functions: Vec::new(),
            formatter: Box::new(DefaultFormatter),
            reporter: Box::new(TracingReporter),
            diagnostics: Vec::new(),
        }
    }

    /// Builds a diagnostic, hands it to the reporter and records it.
    pub(crate) fn report(&mut self, number: ErrorNumber, args: &[&str], line: u32, warning: bool) -> Diagnostic {
        let diagnostic = Diagnostic {
            number,
            message: self.formatter.format(number, args),
            filename: Some(self.options.display_filename().to_string()),
            line,
            warning,
        };
        self.reporter.report(&diagnostic);
        self.diagnostics.push(diagnostic.clone());
        diagnostic
    }

    /// Reports an error diagnostic and returns it as an [`Error`].
    pub(crate) fn error(&mut self, number: ErrorNumber, args: &[&str], line: u32) -> Error {
        Error::Compile(self.report(number, args, line, false))
    }
}

/// Compiles programs and function bodies.
///
/// # Examples
///
/// ```rust,ignore
/// let program: Program = serde_json::from_str(json)?;
/// let mut compiler = Compiler::new(CompileOptions::default());
/// let compiled = compiler.compile(&program)?;
/// println!("{}", compiled.script);
/// ```
pub struct Compiler {
    cx: CompileContext,
}

impl Compiler {
    /// Creates a compiler.
    pub fn new(options: CompileOptions) -> Self {
        Self {
            cx: CompileContext::new(options),
        }
    }

    /// Replaces the message formatter.
    pub fn with_formatter(mut self, formatter: impl MessageFormatter + 'static) -> Self {
        self.cx.formatter = Box::new(formatter);
        self
    }

    /// Replaces the error reporter.
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.cx.reporter = Box::new(reporter);
        self
    }

    /// The active options.
    pub fn options(&self) -> &CompileOptions {
        &self.cx.options
    }

    /// Every diagnostic reported so far, warnings included.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.cx.diagnostics
    }

    /// Code pool statistics.
    pub fn code_pool_stats(&self) -> &ArenaStats {
        self.cx.code_pool.stats()
    }

    /// Temp pool statistics.
    pub fn temp_pool_stats(&self) -> &ArenaStats {
        self.cx.temp_pool.stats()
    }

    /// The object space holding function scopes.
    pub fn objects(&self) -> &ObjectSpace {
        &self.cx.space
    }

    /// Compiles a whole program.
    pub fn compile(&mut self, program: &Program) -> Result<CompiledProgram> {
        let script = self.guard(|cx| {
            let first_line = cx.options.first_line;
            let mut cg = CodeGenerator::new(cx, first_line, None)?;
            cg.compile_statements(&program.body)?;
            cg.finish()
        })?;
        let functions = std::mem::take(&mut self.cx.functions).into_iter().flatten().collect();
        Ok(CompiledProgram { script, functions })
    }

    /// Compiles one function on its own, returning its id. The body is
    /// available from [`Compiler::function`].
    pub fn compile_function(&mut self, function: &Function, line: u32) -> Result<FunctionId> {
        self.guard(|cx| {
            let first_line = cx.options.first_line;
            let mut cg = CodeGenerator::new(cx, first_line, None)?;
            cg.compile_function_body(function, line)
        })
    }

    /// A function compiled by [`Compiler::compile_function`].
    pub fn function(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.cx.functions.get(id.index()).and_then(|f| f.as_ref())
    }

    // Out-of-memory from the arena layer carries no diagnostic yet.
    fn guard<T>(&mut self, f: impl FnOnce(&mut CompileContext) -> Result<T>) -> Result<T> {
        match f(&mut self.cx) {
            Err(Error::OutOfMemory) => Err(self.cx.error(ErrorNumber::OutOfMemory, &[], 0)),
            other => other,
        }
    }
}

// ============================================================================
// Statement stack
// ============================================================================

/// Kinds of statement that can be the target of, or be crossed by, a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StmtKind {
    Block,
    Label,
    If,
    Else,
    Switch,
    With,
    Try,
    Catch,
    Finally,
    DoLoop,
    ForLoop,
    ForInLoop,
    WhileLoop,
}

impl StmtKind {
    /// Name used in "too large" diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            StmtKind::Block => "block",
            StmtKind::Label => "label statement",
            StmtKind::If => "if statement",
            StmtKind::Else => "else statement",
            StmtKind::Switch => "switch statement",
            StmtKind::With => "with statement",
            StmtKind::Try => "try statement",
            StmtKind::Catch => "catch block",
            StmtKind::Finally => "finally statement",
            StmtKind::DoLoop => "do loop",
            StmtKind::ForLoop => "for loop",
            StmtKind::ForInLoop => "for/in loop",
            StmtKind::WhileLoop => "while loop",
        }
    }

    pub fn is_loop(self) -> bool {
        matches!(
            self,
            StmtKind::DoLoop | StmtKind::ForLoop | StmtKind::ForInLoop | StmtKind::WhileLoop
        )
    }

    /// Whether the statement has a scope object on the scope chain.
    pub fn has_scope_object(self) -> bool {
        matches!(self, StmtKind::With | StmtKind::Catch)
    }
}

/// One level of statement nesting.
#[derive(Debug, Clone)]
pub(crate) struct StmtInfo {
    pub kind: StmtKind,
    /// Start of the controlled region
    pub top: usize,
    /// Continue target
    pub update: usize,
    /// Pending break jumps, patched to the statement end on pop
    pub breaks: Vec<usize>,
    /// Pending continue jumps, patched to `update` on pop
    pub continues: Vec<usize>,
    pub label: Option<AtomId>,
}

/// The function whose body a generator is compiling.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FunctionScope {
    pub id: FunctionId,
    pub object: ObjectId,
}

// ============================================================================
// Code generator
// ============================================================================

/// Compiles one unit.
pub(crate) struct CodeGenerator<'cx> {
    pub(crate) cx: &'cx mut CompileContext,
    code: ArenaBuf,
    notes: ArenaBuf,
    try_notes: TryNoteBuf,
    code_mark: ArenaMark,
    temp_mark: ArenaMark,
    atom_list: AtomList,
    pub(crate) stmts: Vec<StmtInfo>,
    pub(crate) stack_depth: i32,
    pub(crate) max_stack_depth: u32,
    pub(crate) current_line: u32,
    first_line: u32,
    last_note_offset: usize,
    pub(crate) function: Option<FunctionScope>,
}

impl<'cx> CodeGenerator<'cx> {
    pub fn new(cx: &'cx mut CompileContext, first_line: u32, function: Option<FunctionScope>) -> Result<Self> {
        let code_mark = cx.code_pool.mark();
        let temp_mark = cx.temp_pool.mark();
        let mut code = ArenaBuf::new(cx.options.code_chunk);
        code.reserve(&mut cx.code_pool, cx.options.code_chunk)?;
        debug!(first_line, function = ?function.map(|f| f.id), "code generator started");
        Ok(Self {
            code,
            notes: ArenaBuf::new(cx.options.note_chunk),
            try_notes: TryNoteBuf::new(cx.options.try_note_chunk),
            code_mark,
            temp_mark,
            atom_list: AtomList::new(),
            stmts: Vec::new(),
            stack_depth: 0,
            max_stack_depth: 0,
            current_line: first_line,
            first_line,
            last_note_offset: 0,
            function,
            cx,
        })
    }

    /// Copies the buffers out into a [`Script`]. The arena space is given
    /// back when the generator is dropped.
    pub fn finish(&mut self) -> Result<Script> {
        let code = self.code.as_slice(&self.cx.code_pool)?.to_vec();
        let mut notes = self.notes.as_slice(&self.cx.temp_pool)?.to_vec();
        notes.push(0);
        let try_notes = self.try_notes.to_vec(&self.cx.temp_pool)?;
        let atoms = self
            .atom_list
            .atoms()
            .iter()
            .map(|&id| {
                self.cx.atoms.get(id).cloned().ok_or(Error::InvalidHandle {
                    kind: "atom",
                    index: id.index(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            code = code.len(),
            notes = notes.len(),
            try_notes = try_notes.len(),
            max_stack_depth = self.max_stack_depth,
            "code generator finished"
        );
        Ok(Script {
            code,
            notes,
            try_notes,
            atoms,
            max_stack_depth: self.max_stack_depth as usize,
            filename: self.cx.options.filename.clone(),
            first_line: self.first_line,
            function: self.function.map(|f| f.id),
        })
    }

    // ========================================================================
    // Bytecode buffer
    // ========================================================================

    /// Offset of the next instruction.
    #[inline]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> Result<&[u8]> {
        self.code.as_slice(&self.cx.code_pool)
    }

    fn code_mut(&mut self) -> Result<&mut [u8]> {
        self.code.as_mut_slice(&mut self.cx.code_pool)
    }

    fn emit_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let pc = self.offset();
        self.code.extend(&mut self.cx.code_pool, bytes)?;
        self.update_depth(pc)?;
        Ok(pc)
    }

    /// Emits a one-byte instruction.
    pub fn emit1(&mut self, op: OpCode) -> Result<usize> {
        self.emit_bytes(&[op as u8])
    }

    /// Emits an instruction with a 16-bit immediate.
    pub fn emit3(&mut self, op: OpCode, imm: u16) -> Result<usize> {
        let [hi, lo] = imm.to_be_bytes();
        self.emit_bytes(&[op as u8, hi, lo])
    }

    /// Emits `op` followed by `extra` zeroed bytes to be filled in later.
    pub fn emit_n(&mut self, op: OpCode, extra: usize) -> Result<usize> {
        let mut bytes = vec![0u8; 1 + extra];
        bytes[0] = op as u8;
        self.emit_bytes(&bytes)
    }

    /// Applies the stack effect of the instruction at `pc`.
    fn update_depth(&mut self, pc: usize) -> Result<()> {
        let code = self.code()?;
        let Some(op) = OpCode::from_u8(code[pc]) else {
            return Err(Error::InvalidHandle {
                kind: "opcode",
                index: code[pc] as usize,
            });
        };
        let spec = op.spec();
        let nuses = if spec.uses < 0 {
            2 + bytecode::read_u16(code, pc + 1) as i32
        } else {
            spec.uses as i32
        };
        self.stack_depth -= nuses;
        if self.stack_depth < 0 {
            let filename = self.cx.options.display_filename().to_string();
            let line = self.current_line;
            return Err(self.cx.error(ErrorNumber::StackUnderflow, &[filename.as_str(), pc.to_string().as_str()], line));
        }
        self.stack_depth += spec.defs as i32;
        self.max_stack_depth = self.max_stack_depth.max(self.stack_depth as u32);
        trace!(pc, op = op.name(), depth = self.stack_depth, "emit");
        Ok(())
    }

    /// Adjusts the modelled depth for control flow the linear walk cannot
    /// see.
    pub fn adjust_depth(&mut self, delta: i32) {
        self.stack_depth += delta;
        self.max_stack_depth = self.max_stack_depth.max(self.stack_depth.max(0) as u32);
    }

    // ========================================================================
    // Jumps
    // ========================================================================

    /// Reports a construct whose encoding overflowed, naming the innermost
    /// statement.
    pub fn too_large(&mut self) -> Error {
        let name = self.stmts.last().map_or("script", |s| s.kind.name());
        let line = self.current_line;
        self.cx.error(ErrorNumber::NeedDiet, &[name], line)
    }

    /// Emits a jump with a known offset.
    pub fn emit_jump(&mut self, op: OpCode, offset: isize) -> Result<usize> {
        if !(JUMP_OFFSET_MIN..=JUMP_OFFSET_MAX).contains(&offset) {
            return Err(self.too_large());
        }
        self.emit3(op, offset as i16 as u16)
    }

    /// Emits a jump back to `target`.
    pub fn emit_backward(&mut self, op: OpCode, target: usize) -> Result<usize> {
        let offset = target as isize - self.offset() as isize;
        self.emit_jump(op, offset)
    }

    /// Sets the offset of the jump at `pc`.
    pub fn set_jump_offset_at(&mut self, pc: usize, offset: isize) -> Result<()> {
        if !(JUMP_OFFSET_MIN..=JUMP_OFFSET_MAX).contains(&offset) {
            return Err(self.too_large());
        }
        bytecode::set_jump_offset(self.code_mut()?, pc, offset);
        Ok(())
    }

    /// Points the jump at `pc` to the current offset.
    pub fn patch_to_here(&mut self, pc: usize) -> Result<()> {
        let offset = self.offset() as isize - pc as isize;
        self.set_jump_offset_at(pc, offset)
    }

    /// Writes a raw 16-bit value into an emitted table.
    pub fn write_u16_at(&mut self, at: usize, value: u16) -> Result<()> {
        bytecode::write_u16(self.code_mut()?, at, value);
        Ok(())
    }

    // ========================================================================
    // Source notes
    // ========================================================================

    /// Appends a note annotating the next instruction.
    pub fn new_note(&mut self, kind: SrcNoteType) -> Result<usize> {
        let offset = self.offset();
        let delta = offset - self.last_note_offset;
        self.last_note_offset = offset;
        let index = srcnote::append_note(&mut self.notes, &mut self.cx.temp_pool, kind, delta)?;
        trace!(index, pc = offset, note = kind.name(), "note");
        Ok(index)
    }

    pub fn new_note2(&mut self, kind: SrcNoteType, offset: usize) -> Result<usize> {
        let index = self.new_note(kind)?;
        self.set_note_offset(index, 0, offset)?;
        Ok(index)
    }

    /// Sets operand `which` of the note at `index`.
    pub fn set_note_offset(&mut self, index: usize, which: usize, offset: usize) -> Result<()> {
        if offset >= OFFSET_LIMIT {
            return Err(self.too_large());
        }
        srcnote::set_offset(&mut self.notes, &mut self.cx.temp_pool, index, which, offset)
    }

    /// Retypes the note at `index`, keeping its delta.
    pub fn set_note_type(&mut self, index: usize, kind: SrcNoteType) -> Result<()> {
        let notes = self.notes.as_mut_slice(&mut self.cx.temp_pool)?;
        notes[index] = srcnote::make_note(kind, srcnote::note_delta(notes[index]));
        Ok(())
    }

    /// Emits the notes that move the current line to `line`.
    pub fn update_line_notes(&mut self, line: u32) -> Result<()> {
        if line == 0 {
            return Ok(());
        }
        let delta = line.wrapping_sub(self.current_line);
        self.current_line = line;
        if delta == 0 {
            return Ok(());
        }
        let wide = u32::from(line > 0x7f);
        if delta >= 2 + wide {
            self.new_note2(SrcNoteType::SetLine, line as usize)?;
        } else {
            for _ in 0..delta {
                self.new_note(SrcNoteType::Newline)?;
            }
        }
        Ok(())
    }

    pub fn add_try_note(&mut self, start: usize, end: usize, catch_start: usize) -> Result<()> {
        let note = TryNote {
            start: start as u32,
            length: (end - start) as u32,
            catch_start: catch_start as u32,
        };
        self.try_notes.push(&mut self.cx.temp_pool, note)
    }

    // ========================================================================
    // Atoms
    // ========================================================================

    /// Index of `value` in this unit's literal table.
    pub fn index_atom(&mut self, value: AtomValue) -> Result<u16> {
        let id = self.cx.atoms.intern(value);
        self.index_atom_id(id)
    }

    pub fn index_name(&mut self, name: &str) -> Result<u16> {
        let id = self.cx.atoms.intern_str(name);
        self.index_atom_id(id)
    }

    fn index_atom_id(&mut self, id: AtomId) -> Result<u16> {
        match self.atom_list.index_of(id) {
            Some(index) => Ok(index),
            None => {
                let line = self.current_line;
                Err(self.cx.error(ErrorNumber::TooManyLiterals, &[], line))
            }
        }
    }

    /// Emits `op` with the atom index of `name`.
    pub fn emit_name_op(&mut self, op: OpCode, name: &str) -> Result<usize> {
        let index = self.index_name(name)?;
        self.emit3(op, index)
    }

    // ========================================================================
    // Statement stack
    // ========================================================================

    pub fn push_statement(&mut self, kind: StmtKind, top: usize) {
        self.stmts.push(StmtInfo {
            kind,
            top,
            update: top,
            breaks: Vec::new(),
            continues: Vec::new(),
            label: None,
        });
    }

    pub fn top_statement(&mut self) -> Option<&mut StmtInfo> {
        self.stmts.last_mut()
    }

    /// Patches the innermost statement's breaks and continues and pops it.
    pub fn pop_statement(&mut self) -> Result<()> {
        let Some(stmt) = self.stmts.last_mut() else {
            return Ok(());
        };
        let breaks = std::mem::take(&mut stmt.breaks);
        let continues = std::mem::take(&mut stmt.continues);
        let update = stmt.update;
        for pc in breaks {
            self.patch_to_here(pc)?;
        }
        for pc in continues {
            self.set_jump_offset_at(pc, update as isize - pc as isize)?;
        }
        self.stmts.pop();
        Ok(())
    }

    /// Sets the continue target of the innermost loop and of the labels
    /// directly enclosing it.
    pub fn set_loop_update(&mut self) {
        let offset = self.offset();
        for (i, stmt) in self.stmts.iter_mut().rev().enumerate() {
            if i > 0 && stmt.kind != StmtKind::Label {
                break;
            }
            stmt.update = offset;
        }
    }

    /// Whether any enclosing statement puts an object on the scope chain.
    pub fn in_scope_statement(&self) -> bool {
        self.stmts.iter().any(|s| s.kind.has_scope_object())
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    pub fn compile_statements(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Records a compiled function body under `id`.
    pub(crate) fn store_function(&mut self, id: FunctionId, function: CompiledFunction) {
        if let Some(slot) = self.cx.functions.get_mut(id.index()) {
            *slot = Some(function);
        }
    }

    /// Reserves a function id before its body is compiled.
    pub(crate) fn reserve_function(&mut self) -> FunctionId {
        self.cx.functions.push(None);
        FunctionId((self.cx.functions.len() - 1) as u32)
    }

    /// The line a diagnostic raised now should carry.
    pub fn line(&self) -> u32 {
        self.current_line
    }
}

impl Drop for CodeGenerator<'_> {
    fn drop(&mut self) {
        self.cx.code_pool.release(self.code_mark);
        self.cx.temp_pool.release(self.temp_mark);
    }
}

// ============================================================================
// Hoisting
// ============================================================================

/// Collects the `var` names declared anywhere in `statements`, outside
/// nested functions, in first-declaration order.
pub(crate) fn collect_hoisted_var_names(statements: &[Stmt]) -> Vec<String> {
    let mut var_names = Vec::new();
    for stmt in statements {
        collect_hoisted_from_statement(stmt, &mut var_names);
    }
    var_names
}

fn collect_hoisted_from_statement(stmt: &Stmt, var_names: &mut Vec<String>) {
    let declare = |name: &str, var_names: &mut Vec<String>| {
        if !var_names.iter().any(|n| n == name) {
            var_names.push(name.to_string());
        }
    };
    match &stmt.kind {
        Statement::Var(decl) => {
            for declarator in &decl.declarations {
                declare(&declarator.id.name, var_names);
            }
        }
        Statement::Block(block) => {
            for inner in &block.body {
                collect_hoisted_from_statement(inner, var_names);
            }
        }
        Statement::If(if_stmt) => {
            collect_hoisted_from_statement(&if_stmt.consequent, var_names);
            if let Some(alt) = &if_stmt.alternate {
                collect_hoisted_from_statement(alt, var_names);
            }
        }
        Statement::While(while_stmt) => collect_hoisted_from_statement(&while_stmt.body, var_names),
        Statement::DoWhile(do_while) => collect_hoisted_from_statement(&do_while.body, var_names),
        Statement::For(for_stmt) => {
            if let Some(init) = &for_stmt.init {
                collect_hoisted_from_statement(init, var_names);
            }
            collect_hoisted_from_statement(&for_stmt.body, var_names);
        }
        Statement::ForIn(for_in) => {
            collect_hoisted_from_statement(&for_in.left, var_names);
            collect_hoisted_from_statement(&for_in.body, var_names);
        }
        Statement::Switch(switch_stmt) => {
            for case in &switch_stmt.cases {
                for inner in &case.kind.consequent {
                    collect_hoisted_from_statement(inner, var_names);
                }
            }
        }
        Statement::Try(try_stmt) => {
            collect_hoisted_from_statement(&try_stmt.block, var_names);
            for handler in &try_stmt.handlers {
                collect_hoisted_from_statement(&handler.kind.body, var_names);
            }
            if let Some(finalizer) = &try_stmt.finalizer {
                collect_hoisted_from_statement(finalizer, var_names);
            }
        }
        Statement::With(with_stmt) => collect_hoisted_from_statement(&with_stmt.body, var_names),
        Statement::Labeled(labeled) => collect_hoisted_from_statement(&labeled.body, var_names),
        // Function bodies hoist into their own scope
        _ => {}
    }
}
