// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Switch statement compilation.
//!
//! Three encodings are chosen between:
//!
//! | Strategy | When | Layout after the opcode |
//! |----------|------|-------------------------|
//! | `tableswitch` | constant int cases in `i16`, table at most twice the case count | default, low, high, `high - low + 1` offsets |
//! | `lookupswitch` | constant cases otherwise | default, npairs, `(atom, offset)` pairs |
//! | `condswitch` | any case that is not a constant | a `case` test per clause, then `default` |
//!
//! All offsets are relative to the switch opcode. A table entry of zero
//! means "no case for this value" and falls to the default.

use crate::ast::{Node, SwitchCase, SwitchStatement};
use crate::compiler::bytecode::{JUMP_OFFSET_MAX, JUMP_OFFSET_MIN, OpCode};
use crate::compiler::fold::{self, Constant};
use crate::compiler::srcnote::SrcNoteType;
use crate::diagnostics::ErrorNumber;
use crate::error::Result;

use super::{CodeGenerator, StmtKind};

/// Largest dense table, in entries.
const TABLE_LENGTH_LIMIT: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Table,
    Lookup,
    Cond,
}

/// Case classification for one switch.
struct CasePlan {
    strategy: Strategy,
    values: Vec<Option<Constant>>,
    ncases: usize,
    low: i32,
    high: i32,
}

impl CodeGenerator<'_> {
    pub(crate) fn compile_switch_statement(&mut self, switch: &SwitchStatement) -> Result<()> {
        self.compile_expression(&switch.discriminant)?;
        let top = self.offset();
        self.push_statement(StmtKind::Switch, top);

        let plan = self.plan_cases(&switch.cases)?;
        let table_length = match plan.strategy {
            Strategy::Table if plan.ncases > 0 => (plan.high - plan.low + 1) as usize,
            _ => 0,
        };

        let note = self.new_note(SrcNoteType::Switch)?;
        match plan.strategy {
            Strategy::Cond => self.emit1(OpCode::CondSwitch)?,
            Strategy::Table => self.emit_n(OpCode::TableSwitch, 6 + 2 * table_length)?,
            Strategy::Lookup => self.emit_n(OpCode::LookupSwitch, 4 + 4 * plan.ncases)?,
        };

        let mut case_jumps = vec![None; switch.cases.len()];
        let mut default_jump = None;
        if plan.strategy == Strategy::Cond {
            let mut prev: Option<(usize, usize)> = None;
            for (i, case) in switch.cases.iter().enumerate() {
                if let Some(test) = &case.kind.test {
                    self.compile_expression(test)?;
                }
                if let Some((case_note, off)) = prev {
                    self.set_note_offset(case_note, 0, self.offset() - off)?;
                }
                if case.kind.test.is_none() {
                    continue;
                }
                // Widening the switch note shifts every note after it, so it
                // is set before the case note whose index is kept
                if prev.is_none() {
                    self.set_note_offset(note, 1, self.offset() - top)?;
                }
                let case_note = self.new_note2(SrcNoteType::PcDelta, 0)?;
                let pc = self.emit_jump(OpCode::Case, 0)?;
                case_jumps[i] = Some(pc);
                prev = Some((case_note, pc));
            }
            default_jump = Some(self.emit_jump(OpCode::Default, 0)?);
        }

        let mut default_offset = None;
        for (i, case) in switch.cases.iter().enumerate() {
            if let Some(pc) = case_jumps[i] {
                self.patch_to_here(pc)?;
            }
            case.offset.set(self.offset());
            if case.kind.test.is_none() {
                default_offset = Some(self.offset() - top);
            }
            self.compile_statements(&case.kind.consequent)?;
        }
        let default_offset = default_offset.unwrap_or(self.offset() - top);

        self.set_note_offset(note, 0, self.offset() - top)?;

        match plan.strategy {
            Strategy::Cond => {
                if let Some(pc) = default_jump {
                    let offset = default_offset as isize - (pc - top) as isize;
                    self.set_jump_offset_at(pc, offset)?;
                }
            }
            Strategy::Table => {
                self.set_jump_offset_at(top, default_offset as isize)?;
                let (low, high) = if plan.ncases == 0 { (0, -1) } else { (plan.low, plan.high) };
                self.write_u16_at(top + 3, low as i16 as u16)?;
                self.write_u16_at(top + 5, high as i16 as u16)?;
                let mut targets = vec![0isize; table_length];
                for (case, value) in switch.cases.iter().zip(&plan.values) {
                    if let Some(index) = value.as_ref().and_then(Constant::table_index) {
                        targets[(index as i32 - plan.low) as usize] = (case.offset.get() - top) as isize;
                    }
                }
                for (k, target) in targets.into_iter().enumerate() {
                    self.write_table_offset(top + 7 + 2 * k, target)?;
                }
            }
            Strategy::Lookup => {
                self.set_jump_offset_at(top, default_offset as isize)?;
                self.write_u16_at(top + 3, plan.ncases as u16)?;
                let mut at = top + 5;
                for (case, value) in switch.cases.iter().zip(&plan.values) {
                    let Some(value) = value else { continue };
                    let Some(atom) = value.to_atom() else { continue };
                    let index = self.index_atom(atom)?;
                    self.write_u16_at(at, index)?;
                    self.write_table_offset(at + 2, (case.offset.get() - top) as isize)?;
                    at += 4;
                }
            }
        }

        self.pop_statement()
    }

    /// Picks the encoding and evaluates the constant case labels.
    fn plan_cases(&mut self, cases: &[Node<SwitchCase>]) -> Result<CasePlan> {
        let legacy = self.cx.options.is_legacy();
        let mut plan = CasePlan {
            strategy: Strategy::Table,
            values: Vec::with_capacity(cases.len()),
            ncases: 0,
            low: i32::MAX,
            high: i32::MIN,
        };
        let mut seen = rustc_hash::FxHashSet::default();

        for case in cases {
            let Some(test) = &case.kind.test else {
                plan.values.push(None);
                continue;
            };
            plan.ncases += 1;
            if plan.strategy == Strategy::Cond {
                plan.values.push(None);
                continue;
            }

            let value = if legacy {
                match fold::fold(test) {
                    Some(value) if !matches!(value, Constant::Null | Constant::Undefined) => value,
                    _ => {
                        let filename = self.cx.options.display_filename().to_string();
                        let line = if test.line() != 0 { test.line() } else { self.line() };
                        return Err(self.cx.error(
                            ErrorNumber::BadCase,
                            &[filename.as_str(), line.to_string().as_str()],
                            line,
                        ));
                    }
                }
            } else {
                match fold::literal(test) {
                    Some(value) => value,
                    None => {
                        plan.strategy = Strategy::Cond;
                        plan.values.push(None);
                        continue;
                    }
                }
            };

            match value.table_index() {
                Some(index) if plan.strategy == Strategy::Table => {
                    let index = index as i32;
                    // Repeated values cannot share a table entry
                    if !seen.insert(index) {
                        plan.strategy = Strategy::Lookup;
                    }
                    plan.low = plan.low.min(index);
                    plan.high = plan.high.max(index);
                }
                Some(_) => {}
                None => plan.strategy = Strategy::Lookup,
            }
            plan.values.push(Some(value));
        }

        if plan.strategy == Strategy::Table && plan.ncases > 0 {
            let table_length = (plan.high - plan.low + 1) as usize;
            if table_length >= TABLE_LENGTH_LIMIT || table_length > 2 * plan.ncases {
                plan.strategy = Strategy::Lookup;
            }
        }
        if plan.strategy == Strategy::Cond {
            plan.values.iter_mut().for_each(|v| *v = None);
        }
        Ok(plan)
    }

    fn write_table_offset(&mut self, at: usize, offset: isize) -> Result<()> {
        if !(JUMP_OFFSET_MIN..=JUMP_OFFSET_MAX).contains(&offset) {
            return Err(self.too_large());
        }
        self.write_u16_at(at, offset as i16 as u16)
    }
}
