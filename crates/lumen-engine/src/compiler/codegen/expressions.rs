// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression compilation.
//!
//! Every expression leaves exactly one value on the stack.
//!
//! | Expression | Key Operations | Stack Effect |
//! |------------|----------------|--------------|
//! | Literal | `zero`/`one`/`uint16`/`number`/`string` | Push value |
//! | Identifier | `name`, or `getarg`/`getvar` inside functions | Push value |
//! | Member | `getprop`/`getelem` | Pop 1 or 2, push 1 |
//! | Assignment | `bindname` ... `setname`, `setprop`, `setelem` | Push value |
//! | Call | `pushobj`, `call argc` | Pop 2+argc, push 1 |
//! | Array/Object | `newinit`, `initelem`/`initprop`, `endinit` | Push object |
//! | Conditional | `ifeq`, `goto` | Pop 1, push 1 |
//! | `&&`/`\|\|` | `and`/`or` | Short-circuit keeps the left value |
//!
//! ## Member Assignment
//!
//! ```text
//! o.p += v
//!
//! Bytecode:
//!   [o]
//!   dup
//!   getprop "p"
//!   [v]
//!   add              <- assignop note
//!   setprop "p"      <- pcbase note (distance back to [o])
//! ```

use tracing::debug;

use crate::ast::{
    AssignmentExpression, BinaryOperator, CallExpression, Expr, Expression, Function, LogicalOperator,
    MemberExpression, PropertyName, UnaryOperator, UpdateExpression, UpdateOperator,
};
use crate::atom::{AtomValue, FunctionId, number_to_int};
use crate::compiler::bytecode::OpCode;
use crate::compiler::script::CompiledFunction;
use crate::compiler::srcnote::SrcNoteType;
use crate::diagnostics::ErrorNumber;
use crate::error::Result;
use crate::scope::{Attrs, Class, ObjectId, PropertyKey, PropertyOp};

use super::{CodeGenerator, FunctionScope, collect_hoisted_var_names};

/// Where a name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameBinding {
    /// Looked up by name at runtime; atom index
    Name(u16),
    /// Formal parameter slot
    Arg(u16),
    /// Local variable slot
    Var(u16),
}

/// The storage an assignment writes to.
enum Target {
    Name(u16),
    Arg(u16),
    Var(u16),
    Prop(u16),
    Elem,
}

impl CodeGenerator<'_> {
    // ========================================================================
    // Names
    // ========================================================================

    /// Resolves `name` against the enclosing function's parameters and
    /// variables. Names inside `with` and catch bodies are always looked up
    /// at runtime.
    pub(crate) fn resolve_name(&mut self, name: &str) -> Result<NameBinding> {
        if let Some(scope) = self.function {
            if !self.in_scope_statement() {
                let atom = self.cx.atoms.intern_str(name);
                if let Some(prop) = self.cx.space.find_property(scope.object, PropertyKey::Atom(atom))? {
                    let prop = self.cx.space.property(prop)?;
                    match prop.getter() {
                        PropertyOp::Argument => return Ok(NameBinding::Arg(prop.short_id())),
                        PropertyOp::Variable => return Ok(NameBinding::Var(prop.short_id())),
                        PropertyOp::Stub => {}
                    }
                }
            }
        }
        Ok(NameBinding::Name(self.index_name(name)?))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn compile_expression(&mut self, expr: &Expr) -> Result<()> {
        expr.offset.set(self.offset());
        self.update_line_notes(expr.line())?;

        match &expr.kind {
            Expression::Number { value } => self.emit_number(*value)?,
            Expression::String { value } => {
                let index = self.index_atom(AtomValue::String(value.as_str().into()))?;
                self.emit3(OpCode::String, index)?;
            }
            Expression::Boolean { value } => {
                self.emit1(if *value { OpCode::True } else { OpCode::False })?;
            }
            Expression::Null => {
                self.emit1(OpCode::Null)?;
            }
            Expression::This => {
                self.emit1(OpCode::This)?;
            }
            Expression::Identifier(id) => {
                match self.resolve_name(&id.name)? {
                    NameBinding::Name(index) => self.emit3(OpCode::Name, index)?,
                    NameBinding::Arg(slot) => self.emit3(OpCode::GetArg, slot)?,
                    NameBinding::Var(slot) => self.emit3(OpCode::GetVar, slot)?,
                };
            }
            Expression::Array(array) => {
                self.emit_name_op(OpCode::Name, "Array")?;
                self.emit1(OpCode::PushObj)?;
                self.emit1(OpCode::NewInit)?;
                for (i, element) in array.elements.iter().enumerate() {
                    self.emit_number(i as f64)?;
                    match element {
                        Some(element) => self.compile_expression(element)?,
                        None => {
                            self.emit1(OpCode::Push)?;
                        }
                    }
                    self.emit1(OpCode::InitElem)?;
                }
                if array.trailing_comma {
                    self.new_note(SrcNoteType::Continue)?;
                }
                self.emit1(OpCode::EndInit)?;
            }
            Expression::Object(object) => {
                self.emit_name_op(OpCode::Name, "Object")?;
                self.emit1(OpCode::PushObj)?;
                self.emit1(OpCode::NewInit)?;
                for property in &object.properties {
                    match &property.key {
                        PropertyName::Number { value } => {
                            self.emit_number(*value)?;
                            self.compile_expression(&property.value)?;
                            self.new_note(SrcNoteType::Label)?;
                            self.emit1(OpCode::InitElem)?;
                        }
                        PropertyName::Identifier(id) => {
                            let index = self.index_name(&id.name)?;
                            self.compile_expression(&property.value)?;
                            self.emit3(OpCode::InitProp, index)?;
                        }
                        PropertyName::String { value } => {
                            let index = self.index_name(value)?;
                            self.compile_expression(&property.value)?;
                            self.emit3(OpCode::InitProp, index)?;
                        }
                    }
                }
                self.emit1(OpCode::EndInit)?;
            }
            Expression::Binary(binary) => {
                self.compile_expression(&binary.left)?;
                self.compile_expression(&binary.right)?;
                self.emit1(binary_op(binary.operator))?;
            }
            Expression::Logical(logical) => {
                self.compile_expression(&logical.left)?;
                let op = match logical.operator {
                    LogicalOperator::Or => OpCode::Or,
                    LogicalOperator::And => OpCode::And,
                };
                let jmp = self.emit_jump(op, 0)?;
                self.compile_expression(&logical.right)?;
                self.patch_to_here(jmp)?;
            }
            Expression::Unary(unary) => {
                if unary.operator == UnaryOperator::Delete {
                    self.compile_delete(&unary.argument)?;
                } else {
                    self.compile_expression(&unary.argument)?;
                    self.emit1(unary_op(unary.operator))?;
                }
            }
            Expression::Assignment(assign) => self.compile_assignment(expr, assign)?,
            Expression::Call(call) => self.compile_call(call, false)?,
            Expression::New(call) => self.compile_call(call, true)?,
            Expression::Member(member) => self.compile_member(expr, member)?,
            Expression::Conditional(cond) => {
                self.compile_expression(&cond.test)?;
                self.new_note(SrcNoteType::Cond)?;
                let beq = self.emit_jump(OpCode::IfEq, 0)?;
                self.compile_expression(&cond.consequent)?;
                // Only one arm's value is live at the join
                self.adjust_depth(-1);
                let jmp = self.emit_jump(OpCode::Goto, 0)?;
                self.patch_to_here(beq)?;
                self.compile_expression(&cond.alternate)?;
                self.patch_to_here(jmp)?;
            }
            Expression::Function(func) => {
                let index = self.compile_function(func, expr.line())?;
                self.emit3(OpCode::Object, index)?;
            }
            Expression::Update(update) => self.compile_update(expr, update)?,
            Expression::Sequence(seq) => {
                let mut prev: Option<(usize, usize)> = None;
                for (i, operand) in seq.expressions.iter().enumerate() {
                    self.compile_expression(operand)?;
                    let tmp = self.offset();
                    if let Some((note, off)) = prev {
                        self.set_note_offset(note, 0, tmp - off)?;
                    }
                    if i + 1 == seq.expressions.len() {
                        break;
                    }
                    let note = self.new_note(SrcNoteType::PcDelta)?;
                    prev = Some((note, tmp));
                    self.emit1(OpCode::Pop)?;
                }
            }
            Expression::Paren(paren) => {
                self.compile_expression(&paren.expression)?;
                self.new_note(SrcNoteType::Paren)?;
                self.emit1(OpCode::Nop)?;
            }
        }
        Ok(())
    }

    /// Pushes a number using the shortest encoding.
    pub(crate) fn emit_number(&mut self, value: f64) -> Result<()> {
        match number_to_int(value) {
            Some(0) => self.emit1(OpCode::Zero)?,
            Some(1) => self.emit1(OpCode::One)?,
            Some(n) if (0..65536).contains(&n) => self.emit3(OpCode::Uint16, n as u16)?,
            _ => {
                let index = self.index_atom(AtomValue::number(value))?;
                self.emit3(OpCode::Number, index)?
            }
        };
        Ok(())
    }

    /// Emits the `pcbase` note for an operation on the reference that
    /// starts at `top`.
    fn note_pc_base(&mut self, top: usize) -> Result<()> {
        self.new_note2(SrcNoteType::PcBase, self.offset() - top)?;
        Ok(())
    }

    fn compile_member(&mut self, expr: &Expr, member: &MemberExpression) -> Result<()> {
        let top = expr.offset.get();
        self.compile_expression(&member.object)?;
        match member.property_name() {
            Some(name) => {
                let index = self.index_name(name)?;
                self.note_pc_base(top)?;
                self.emit3(OpCode::GetProp, index)?;
            }
            None => {
                self.compile_expression(&member.property)?;
                self.note_pc_base(top)?;
                self.emit1(OpCode::GetElem)?;
            }
        }
        Ok(())
    }

    fn compile_assignment(&mut self, expr: &Expr, assign: &AssignmentExpression) -> Result<()> {
        let top = expr.offset.get();
        let target = match &assign.left.kind {
            Expression::Identifier(id) => match self.resolve_name(&id.name)? {
                NameBinding::Name(index) => {
                    self.emit3(OpCode::BindName, index)?;
                    Target::Name(index)
                }
                NameBinding::Arg(slot) => Target::Arg(slot),
                NameBinding::Var(slot) => Target::Var(slot),
            },
            Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                match member.property_name() {
                    Some(name) => Target::Prop(self.index_name(name)?),
                    None => {
                        self.compile_expression(&member.property)?;
                        Target::Elem
                    }
                }
            }
            _ => {
                // Not a reference: evaluate for effect, yield the value
                self.compile_expression(&assign.left)?;
                self.emit1(OpCode::Pop)?;
                return self.compile_expression(&assign.right);
            }
        };

        let binary = assign.operator.binary();
        if binary.is_some() {
            match target {
                Target::Arg(slot) => {
                    self.emit3(OpCode::GetArg, slot)?;
                }
                Target::Var(slot) => {
                    self.emit3(OpCode::GetVar, slot)?;
                }
                Target::Name(index) | Target::Prop(index) => {
                    self.emit1(OpCode::Dup)?;
                    self.emit3(OpCode::GetProp, index)?;
                }
                Target::Elem => {
                    self.emit1(OpCode::Dup2)?;
                    self.emit1(OpCode::GetElem)?;
                }
            }
        }

        self.compile_expression(&assign.right)?;
        if let Some(op) = binary {
            self.new_note(SrcNoteType::AssignOp)?;
            self.emit1(binary_op(op))?;
        }

        match target {
            Target::Name(index) => self.emit3(OpCode::SetName, index)?,
            Target::Arg(slot) => self.emit3(OpCode::SetArg, slot)?,
            Target::Var(slot) => self.emit3(OpCode::SetVar, slot)?,
            Target::Prop(index) => {
                self.note_pc_base(top)?;
                self.emit3(OpCode::SetProp, index)?
            }
            Target::Elem => {
                self.note_pc_base(top)?;
                self.emit1(OpCode::SetElem)?
            }
        };
        Ok(())
    }

    fn compile_delete(&mut self, argument: &Expr) -> Result<()> {
        let top = self.offset();
        match &argument.kind {
            Expression::Identifier(id) => {
                self.emit_name_op(OpCode::DelName, &id.name)?;
            }
            Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                match member.property_name() {
                    Some(name) => {
                        let index = self.index_name(name)?;
                        self.note_pc_base(top)?;
                        self.emit3(OpCode::DelProp, index)?;
                    }
                    None => {
                        self.compile_expression(&member.property)?;
                        self.note_pc_base(top)?;
                        self.emit1(OpCode::DelElem)?;
                    }
                }
            }
            _ => {
                self.compile_expression(argument)?;
                self.emit1(OpCode::Pop)?;
                self.emit1(OpCode::True)?;
            }
        }
        Ok(())
    }

    fn compile_update(&mut self, expr: &Expr, update: &UpdateExpression) -> Result<()> {
        use OpCode::*;
        let top = expr.offset.get();
        let inc = update.operator == UpdateOperator::Increment;
        let pick = |ops: [OpCode; 4]| match (update.prefix, inc) {
            (true, true) => ops[0],
            (true, false) => ops[1],
            (false, true) => ops[2],
            (false, false) => ops[3],
        };

        match &update.argument.kind {
            Expression::Identifier(id) => {
                match self.resolve_name(&id.name)? {
                    NameBinding::Name(index) => self.emit3(pick([IncName, DecName, NameInc, NameDec]), index)?,
                    NameBinding::Arg(slot) => self.emit3(pick([IncArg, DecArg, ArgInc, ArgDec]), slot)?,
                    NameBinding::Var(slot) => self.emit3(pick([IncVar, DecVar, VarInc, VarDec]), slot)?,
                };
            }
            Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                match member.property_name() {
                    Some(name) => {
                        let index = self.index_name(name)?;
                        self.note_pc_base(top)?;
                        self.emit3(pick([IncProp, DecProp, PropInc, PropDec]), index)?;
                    }
                    None => {
                        self.compile_expression(&member.property)?;
                        self.note_pc_base(top)?;
                        self.emit1(pick([IncElem, DecElem, ElemInc, ElemDec]))?;
                    }
                }
            }
            _ => {
                self.compile_expression(&update.argument)?;
                self.emit1(Pos)?;
            }
        }
        Ok(())
    }

    fn compile_call(&mut self, call: &CallExpression, construct: bool) -> Result<()> {
        self.compile_expression(&call.callee)?;
        self.emit1(OpCode::PushObj)?;
        for argument in &call.arguments {
            self.compile_expression(argument)?;
        }
        let Ok(argc) = u16::try_from(call.arguments.len()) else {
            return Err(self.too_large());
        };
        let op = if construct {
            OpCode::New
        } else if is_direct_eval(&call.callee) && !self.cx.options.is_legacy() {
            OpCode::CallSpecial
        } else {
            OpCode::Call
        };
        self.emit3(op, argc)?;
        Ok(())
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Compiles a function literal and returns its index in this unit's
    /// literal table.
    pub(crate) fn compile_function(&mut self, func: &Function, line: u32) -> Result<u16> {
        let id = self.compile_function_body(func, line)?;
        self.index_atom(AtomValue::Function(id))
    }

    /// Compiles `func` into its own script with a nested generator.
    ///
    /// Parameters and hoisted `var`s are defined as properties of a fresh
    /// function object so the body can address them by slot; the object is
    /// finalized once the body is emitted.
    pub(crate) fn compile_function_body(&mut self, func: &Function, line: u32) -> Result<FunctionId> {
        let id = self.reserve_function();
        let object = self.cx.space.new_object(&Class::FUNCTION, None, None)?;
        match self.compile_function_in(func, line, id, object) {
            Ok(compiled) => {
                self.cx.space.finalize_object(object)?;
                self.store_function(id, compiled);
                Ok(id)
            }
            Err(err) => {
                // Drop the slot and any nested functions reserved after it
                self.cx.functions.truncate(id.index());
                if let Err(cleanup) = self.cx.space.finalize_object(object) {
                    debug!(%cleanup, "function object already gone");
                }
                Err(err)
            }
        }
    }

    fn compile_function_in(
        &mut self,
        func: &Function,
        line: u32,
        id: FunctionId,
        object: ObjectId,
    ) -> Result<CompiledFunction> {
        for (i, param) in func.params.iter().enumerate() {
            let key = PropertyKey::Atom(self.cx.atoms.intern_str(&param.name));
            if let Some(old) = self.cx.space.find_property(object, key)? {
                if self.cx.options.strict {
                    return Err(self.cx.error(ErrorNumber::DuplicateFormal, &[param.name.as_str()], line));
                }
                self.cx.report(ErrorNumber::DuplicateFormal, &[param.name.as_str()], line, true);
                // Keep the earlier parameter reachable by its index
                let old_index = self.cx.space.property(old)?.short_id();
                self.cx.space.alias_property(object, old, PropertyKey::Int(old_index as i32))?;
                self.cx.space.remove_property(object, key)?;
            }
            self.cx.space.define_property(
                object,
                key,
                PropertyOp::Argument,
                PropertyOp::Argument,
                Attrs::PERMANENT,
                i as u16,
            )?;
        }

        let mut nvars: u16 = 0;
        for name in collect_hoisted_var_names(&func.body) {
            let key = PropertyKey::Atom(self.cx.atoms.intern_str(&name));
            if self.cx.space.find_property(object, key)?.is_some() {
                continue;
            }
            self.cx.space.define_property(
                object,
                key,
                PropertyOp::Variable,
                PropertyOp::Variable,
                Attrs::PERMANENT,
                nvars,
            )?;
            nvars += 1;
        }

        let name = func.id.as_ref().map(|id| id.name.clone());
        debug!(?name, nargs = func.params.len(), nvars, "compiling function");

        let script = {
            let mut cg = CodeGenerator::new(&mut *self.cx, line, Some(FunctionScope { id, object }))?;
            cg.compile_statements(&func.body)?;
            cg.finish()?
        };
        Ok(CompiledFunction {
            name,
            nargs: func.params.len() as u16,
            nvars,
            script,
        })
    }
}

fn is_direct_eval(callee: &Expr) -> bool {
    matches!(&callee.kind, Expression::Identifier(id) if id.name == "eval")
}

fn binary_op(op: BinaryOperator) -> OpCode {
    use BinaryOperator::*;
    match op {
        Add => OpCode::Add,
        Subtract => OpCode::Sub,
        Multiply => OpCode::Mul,
        Divide => OpCode::Div,
        Modulo => OpCode::Mod,
        Equal => OpCode::Eq,
        NotEqual => OpCode::Ne,
        StrictEqual => OpCode::StrictEq,
        StrictNotEqual => OpCode::StrictNe,
        LessThan => OpCode::Lt,
        LessThanEqual => OpCode::Le,
        GreaterThan => OpCode::Gt,
        GreaterThanEqual => OpCode::Ge,
        BitwiseAnd => OpCode::BitAnd,
        BitwiseOr => OpCode::BitOr,
        BitwiseXor => OpCode::BitXor,
        LeftShift => OpCode::Lsh,
        RightShift => OpCode::Rsh,
        UnsignedRightShift => OpCode::Ursh,
        In => OpCode::In,
        InstanceOf => OpCode::InstanceOf,
    }
}

fn unary_op(op: UnaryOperator) -> OpCode {
    match op {
        UnaryOperator::Minus => OpCode::Neg,
        UnaryOperator::Plus => OpCode::Pos,
        UnaryOperator::LogicalNot => OpCode::Not,
        UnaryOperator::BitwiseNot => OpCode::BitNot,
        UnaryOperator::Typeof => OpCode::TypeOf,
        UnaryOperator::Void => OpCode::Void,
        // Lowered by compile_delete
        UnaryOperator::Delete => OpCode::True,
    }
}
