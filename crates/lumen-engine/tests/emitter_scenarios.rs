// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Emitter integration tests
//!
//! Programs are given as JSON ASTs, compiled through the public API, and
//! the output checked by decoding it back. `check_flow` walks every path
//! through the bytecode to make sure the stack model holds on each one.

use std::collections::{BTreeMap, HashMap};

use lumen_engine::ast::Program;
use lumen_engine::atom::AtomValue;
use lumen_engine::compiler::{Operand, SrcNotes, decode_at, decode_try_notes};
use lumen_engine::{CompileOptions, CompiledProgram, Compiler, ErrorNumber, OpCode, Script, SrcNoteType, TryNote};
use serde_json::{Value, json};

// ============================================================================
// Helpers
// ============================================================================

fn id(name: &str) -> Value {
    json!({ "type": "Identifier", "name": name })
}

fn num(value: f64) -> Value {
    json!({ "type": "NumericLiteral", "value": value })
}

fn expr_stmt(expression: Value) -> Value {
    json!({ "type": "ExpressionStatement", "expression": expression })
}

fn block(body: Vec<Value>) -> Value {
    json!({ "type": "BlockStatement", "body": body })
}

fn call(callee: Value, arguments: Vec<Value>) -> Value {
    json!({ "type": "CallExpression", "callee": callee, "arguments": arguments })
}

fn assign(name: &str, right: Value) -> Value {
    json!({ "type": "AssignmentExpression", "operator": "=", "left": id(name), "right": right })
}

fn brk() -> Value {
    json!({ "type": "BreakStatement" })
}

fn switch(discriminant: Value, tests: Vec<Value>) -> Value {
    let cases: Vec<Value> = tests
        .into_iter()
        .map(|test| {
            let consequent = vec![expr_stmt(assign("y", test.clone())), brk()];
            json!({ "test": test, "consequent": consequent })
        })
        .collect();
    json!({ "type": "SwitchStatement", "discriminant": discriminant, "cases": cases })
}

fn program(body: Vec<Value>) -> Program {
    serde_json::from_value(json!({ "body": body })).expect("valid AST")
}

fn compile_with(options: CompileOptions, body: Vec<Value>) -> lumen_engine::Result<CompiledProgram> {
    Compiler::new(options).compile(&program(body))
}

fn compile(body: Vec<Value>) -> CompiledProgram {
    compile_with(CompileOptions::default(), body).expect("compiles")
}

fn ops(script: &Script) -> Vec<OpCode> {
    script.instructions().map(|i| i.op).collect()
}

/// Walks every path from offset zero and from each catch entry, checking
/// that each instruction is always reached at the same stack depth and
/// that no path underflows. Finally blocks are subroutines: each is walked
/// once, entered at the shallowest depth any `gosub` calls it with, and a
/// `gosub` falls through to the next instruction. Returns the deepest
/// stack seen and the depth on falling off the end.
fn check_flow(script: &Script) -> (usize, Option<i32>) {
    let code = &script.code;
    let mut depth_at: HashMap<usize, i32> = HashMap::new();
    let mut work = vec![(0usize, 0i32)];
    for note in &script.try_notes {
        let entry = note.catch_start as usize;
        if let Some(Operand::Depth(depth)) = decode_at(code, entry).map(|i| i.operand) {
            work.push((entry, depth as i32));
        }
    }
    let mut subroutines: BTreeMap<usize, i32> = BTreeMap::new();
    let mut max = 0;
    let mut end_depth = None;

    loop {
        let Some((pc, depth)) = work.pop() else {
            let pending = subroutines.iter().find(|(pc, _)| !depth_at.contains_key(*pc));
            match pending {
                Some((&pc, &depth)) => {
                    work.push((pc, depth));
                    continue;
                }
                None => break,
            }
        };
        if pc == code.len() {
            if let Some(end) = end_depth {
                assert_eq!(end, depth, "paths leave the code at different depths");
            }
            end_depth = Some(depth);
            continue;
        }
        if let Some(&seen) = depth_at.get(&pc) {
            assert_eq!(seen, depth, "pc {} reached at depths {} and {}", pc, seen, depth);
            continue;
        }
        depth_at.insert(pc, depth);

        let insn = decode_at(code, pc).expect("well-formed instruction");
        let spec = insn.op.spec();
        let uses = match (spec.uses, &insn.operand) {
            (-1, Operand::Argc(argc)) => 2 + *argc as i32,
            (uses, _) => uses as i32,
        };
        assert!(depth >= uses, "stack underflow at pc {} ({})", pc, insn.op);
        let after = depth - uses + spec.defs as i32;
        max = max.max(after);

        let next = pc + insn.length;
        let target = |offset: isize| (pc as isize + offset) as usize;
        match (insn.op, &insn.operand) {
            (OpCode::Return | OpCode::Throw | OpCode::RetSub, _) => {}
            (OpCode::Goto | OpCode::Default, Operand::Jump(offset)) => work.push((target(*offset), after)),
            // The finally block runs with its return address pushed
            (OpCode::Gosub, Operand::Jump(offset)) => {
                let entry = subroutines.entry(target(*offset)).or_insert(after + 1);
                *entry = (*entry).min(after + 1);
                work.push((next, after));
            }
            (OpCode::SetSp, Operand::Depth(depth)) => work.push((next, *depth as i32)),
            // The tested value survives a short-circuit
            (OpCode::And | OpCode::Or, Operand::Jump(offset)) => {
                work.push((target(*offset), depth));
                work.push((next, after));
            }
            // A matching case also pops the discriminant
            (OpCode::Case, Operand::Jump(offset)) => {
                work.push((target(*offset), after - 1));
                work.push((next, after));
            }
            (_, Operand::Jump(offset)) => {
                work.push((target(*offset), after));
                work.push((next, after));
            }
            (_, Operand::Table { default, targets, .. }) => {
                work.push((target(*default), after));
                for &offset in targets.iter().filter(|&&o| o != 0) {
                    work.push((target(offset), after));
                }
            }
            (_, Operand::Lookup { default, pairs }) => {
                work.push((target(*default), after));
                for &(_, offset) in pairs {
                    work.push((target(offset), after));
                }
            }
            _ => work.push((next, after)),
        }
    }
    (max as usize, end_depth)
}

/// Offsets of the finally blocks, innermost first.
fn finally_starts(script: &Script) -> Vec<usize> {
    SrcNotes::new(&script.notes)
        .filter(|n| n.kind == SrcNoteType::TryFin && n.operands == vec![1])
        .map(|n| n.pc)
        .collect()
}

/// Targets of every `gosub`, in code order.
fn gosub_targets(script: &Script) -> Vec<usize> {
    script
        .instructions()
        .filter(|i| i.op == OpCode::Gosub)
        .filter_map(|i| i.jump_target())
        .collect()
}

fn try_finally(body: Vec<Value>, finalizer: Vec<Value>) -> Value {
    json!({ "type": "TryStatement", "block": block(body), "finalizer": block(finalizer) })
}

fn while_loop(body: Vec<Value>) -> Value {
    json!({ "type": "WhileStatement", "test": id("x"), "body": block(body) })
}

fn call_stmt(callee: &str) -> Value {
    expr_stmt(call(id(callee), vec![]))
}

fn assert_balanced(script: &Script) {
    let (max, end) = check_flow(script);
    assert_eq!(end, Some(0), "code does not end with an empty stack");
    assert!(max <= script.max_stack_depth, "model depth {} < walked depth {}", script.max_stack_depth, max);
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_for_loop_with_continue() {
    // for (i = 0; i < 10; i++) { if (i == 5) continue; f(i); }
    let body = block(vec![
        json!({
            "type": "IfStatement",
            "test": { "type": "BinaryExpression", "operator": "==", "left": id("i"), "right": num(5.0) },
            "consequent": { "type": "ContinueStatement" }
        }),
        expr_stmt(call(id("f"), vec![id("i")])),
    ]);
    let compiled = compile(vec![json!({
        "type": "ForStatement",
        "init": expr_stmt(assign("i", num(0.0))),
        "test": { "type": "BinaryExpression", "operator": "<", "left": id("i"), "right": num(10.0) },
        "update": { "type": "UpdateExpression", "operator": "++", "argument": id("i"), "prefix": false },
        "body": body
    })]);
    let script = &compiled.script;

    let continue_pc = SrcNotes::new(&script.notes)
        .find(|n| n.kind == SrcNoteType::Continue)
        .map(|n| n.pc)
        .unwrap();
    let update_pc = script.instructions().find(|i| i.op == OpCode::NameInc).unwrap().pc;
    let goto = decode_at(&script.code, continue_pc).unwrap();
    assert_eq!(goto.op, OpCode::Goto);
    assert_eq!(goto.jump_target(), Some(update_pc));

    assert_balanced(script);
}

#[test]
fn test_long_loop_within_jump_range() {
    let body: Vec<Value> = (0..7000).map(|_| expr_stmt(id("x"))).collect();
    let compiled = compile(vec![json!({ "type": "WhileStatement", "test": id("c"), "body": block(body) })]);
    let script = &compiled.script;
    let insns: Vec<_> = script.instructions().collect();
    assert_eq!(insns[1].op, OpCode::IfEq);
    assert_eq!(insns[1].jump_target(), Some(script.code.len()));
    let back = insns.last().unwrap();
    assert_eq!(back.op, OpCode::Goto);
    assert_eq!(back.jump_target(), Some(0));
    assert_eq!(script.atoms.len(), 2);
}

#[test]
fn test_oversized_loop_is_rejected() {
    let body: Vec<Value> = (0..9000).map(|_| expr_stmt(id("x"))).collect();
    let err = compile_with(
        CompileOptions::default(),
        vec![json!({ "type": "WhileStatement", "test": id("c"), "body": block(body) })],
    )
    .unwrap_err();
    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.number, ErrorNumber::NeedDiet);
    assert_eq!(diagnostic.message, "while loop too large");
}

// ============================================================================
// Switch
// ============================================================================

#[test]
fn test_switch_dense_cases_use_table() {
    let tests = (0..5).map(|n| num(n as f64)).collect();
    let compiled = compile(vec![switch(id("x"), tests)]);
    let script = &compiled.script;
    let insn = script.instructions().find(|i| i.op == OpCode::TableSwitch).unwrap();
    match &insn.operand {
        Operand::Table { low, high, targets, .. } => {
            assert_eq!((*low, *high), (0, 4));
            assert!(targets.windows(2).all(|w| w[0] < w[1]));
        }
        other => panic!("unexpected operand {:?}", other),
    }
    assert!(script.to_string().contains("tableswitch default"));
    assert_balanced(script);
}

#[test]
fn test_switch_sparse_cases_use_lookup() {
    let compiled = compile(vec![switch(id("x"), vec![num(0.0), num(1_000_000.0)])]);
    let script = &compiled.script;
    let insn = script.instructions().find(|i| i.op == OpCode::LookupSwitch).unwrap();
    match &insn.operand {
        Operand::Lookup { pairs, .. } => {
            let keys: Vec<&AtomValue> = pairs.iter().map(|(index, _)| &script.atoms[*index as usize]).collect();
            assert_eq!(keys, vec![&AtomValue::Int(0), &AtomValue::Int(1_000_000)]);
        }
        other => panic!("unexpected operand {:?}", other),
    }
    assert_balanced(script);
}

#[test]
fn test_switch_mixed_cases_use_condswitch() {
    let tests = vec![
        call(id("f"), vec![]),
        json!({ "type": "StringLiteral", "value": "x" }),
    ];
    let compiled = compile(vec![switch(id("x"), tests)]);
    let script = &compiled.script;
    let ops = ops(script);
    assert!(ops.contains(&OpCode::CondSwitch));
    assert_eq!(ops.iter().filter(|&&op| op == OpCode::Case).count(), 2);
    assert_eq!(ops.iter().filter(|&&op| op == OpCode::Default).count(), 1);
    assert_balanced(script);
}

#[test]
fn test_condswitch_case_notes_survive_wide_first_case() {
    // switch (x) { case f(x, x, ...): ...; case g(): ... }
    // The first case test is long enough to need a wide switch operand
    let wide = call(id("f"), (0..60).map(|_| id("x")).collect());
    let compiled = compile(vec![switch(id("x"), vec![wide, call(id("g"), vec![])])]);
    let script = &compiled.script;

    let top = script.instructions().find(|i| i.op == OpCode::CondSwitch).unwrap().pc;
    let cases: Vec<usize> = script.instructions().filter(|i| i.op == OpCode::Case).map(|i| i.pc).collect();
    assert_eq!(cases.len(), 2);
    assert!(cases[0] - top > 127);

    let notes: Vec<_> = SrcNotes::new(&script.notes).collect();
    let switch_note = notes.iter().find(|n| n.kind == SrcNoteType::Switch).unwrap();
    assert_eq!(switch_note.pc, top);
    assert_eq!(switch_note.operands[1], cases[0] - top);

    let deltas: Vec<_> = notes.iter().filter(|n| n.kind == SrcNoteType::PcDelta).collect();
    assert_eq!(deltas.iter().map(|n| n.pc).collect::<Vec<_>>(), cases);
    assert_eq!(deltas[0].operands, vec![cases[1] - cases[0]]);
    assert!(
        notes
            .iter()
            .all(|n| !matches!(n.kind, SrcNoteType::If | SrcNoteType::Break2Label))
    );
    assert_balanced(script);
}

#[test]
fn test_legacy_switch_folds_constant_cases() {
    let options: CompileOptions = serde_json::from_value(json!({ "version": "legacy" })).unwrap();
    let tests = vec![
        json!({ "type": "BinaryExpression", "operator": "+", "left": num(1.0), "right": num(1.0) }),
        json!({ "type": "UnaryExpression", "operator": "-", "argument": num(1.0) }),
    ];
    let compiled = compile_with(options, vec![switch(id("x"), tests)]).unwrap();
    let insn = compiled.script.instructions().find(|i| i.op == OpCode::TableSwitch).unwrap();
    match &insn.operand {
        Operand::Table { low, high, targets, .. } => {
            assert_eq!((*low, *high), (-1, 2));
            let filled: Vec<bool> = targets.iter().map(|&t| t != 0).collect();
            assert_eq!(filled, vec![true, false, false, true]);
        }
        other => panic!("unexpected operand {:?}", other),
    }
    assert_balanced(&compiled.script);
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_break_from_try_finally_in_loop() {
    // while (x) { try { break; } finally { g(); } }
    let try_stmt = json!({
        "type": "TryStatement",
        "block": block(vec![brk()]),
        "finalizer": block(vec![expr_stmt(call(id("g"), vec![]))])
    });
    let compiled = compile(vec![json!({ "type": "WhileStatement", "test": id("x"), "body": block(vec![try_stmt]) })]);
    let script = &compiled.script;

    let finally_pc = SrcNotes::new(&script.notes)
        .filter(|n| n.kind == SrcNoteType::TryFin)
        .find(|n| n.operands == vec![1])
        .map(|n| n.pc)
        .unwrap();
    assert_eq!(finally_pc, 27);

    let gosubs: Vec<_> = script.instructions().filter(|i| i.op == OpCode::Gosub).collect();
    assert_eq!(gosubs.len(), 3);
    assert!(gosubs.iter().all(|g| g.jump_target() == Some(finally_pc)));

    // The break runs the finally block, then leaves the loop
    let break_jump = decode_at(&script.code, gosubs[0].pc + 3).unwrap();
    assert_eq!(break_jump.op, OpCode::Goto);
    assert_eq!(break_jump.jump_target(), Some(script.code.len()));

    assert_eq!(
        script.try_notes,
        vec![TryNote {
            start: 7,
            length: 12,
            catch_start: 19
        }]
    );
    assert_balanced(script);
}

#[test]
fn test_guarded_catches_chain() {
    // try { f(); } catch (e if e.fatal) { g(); } catch (e) { h(); }
    let handler = |guard: Option<Value>, callee: &str| {
        json!({
            "param": { "name": "e" },
            "guard": guard,
            "body": block(vec![expr_stmt(call(id(callee), vec![]))])
        })
    };
    let guard = json!({ "type": "MemberExpression", "object": id("e"), "property": id("fatal") });
    let compiled = compile(vec![json!({
        "type": "TryStatement",
        "block": block(vec![expr_stmt(call(id("f"), vec![]))]),
        "handlers": [handler(Some(guard), "g"), handler(None, "h")]
    })]);
    let script = &compiled.script;
    let ops = ops(script);
    assert_eq!(ops.iter().filter(|&&op| op == OpCode::EnterWith).count(), 2);
    // One setsp at the first catch; the second is entered from the failed guard
    assert_eq!(ops.iter().filter(|&&op| op == OpCode::SetSp).count(), 1);
    assert_eq!(script.try_notes.len(), 1);
    let catch_start = script.try_notes[0].catch_start as usize;
    assert_eq!(decode_at(&script.code, catch_start).unwrap().op, OpCode::SetSp);
    assert_eq!(decode_try_notes(&script.encoded_try_notes()).unwrap(), script.try_notes);
    assert_balanced(script);
}

#[test]
fn test_break_crosses_three_finally_blocks() {
    // while (x) { try { try { try { break; } finally { f1(); } } finally { f2(); } } finally { f3(); } }
    let inner = try_finally(vec![brk()], vec![call_stmt("f1")]);
    let middle = try_finally(vec![inner], vec![call_stmt("f2")]);
    let outer = try_finally(vec![middle], vec![call_stmt("f3")]);
    let compiled = compile(vec![while_loop(vec![outer])]);
    let script = &compiled.script;

    let finals = finally_starts(script);
    assert_eq!(finals.len(), 3);
    assert!(finals.windows(2).all(|w| w[0] < w[1]));

    // The break calls each finally, innermost first, then leaves the loop
    let targets = gosub_targets(script);
    assert_eq!(&targets[..3], &finals[..]);
    let first = script.instructions().find(|i| i.op == OpCode::Gosub).unwrap();
    let exit = decode_at(&script.code, first.pc + 9).unwrap();
    assert_eq!(exit.op, OpCode::Goto);
    assert_eq!(exit.jump_target(), Some(script.code.len()));

    // Plus the normal and rethrow paths of each try
    for finally in &finals {
        assert_eq!(targets.iter().filter(|&t| t == finally).count(), 3);
    }
    assert_eq!(script.try_notes.len(), 3);
    assert_balanced(script);
}

#[test]
fn test_continue_crosses_nested_finally_blocks() {
    // while (x) { try { try { continue; } finally { f1(); } } finally { f2(); } }
    let inner = try_finally(vec![json!({ "type": "ContinueStatement" })], vec![call_stmt("f1")]);
    let outer = try_finally(vec![inner], vec![call_stmt("f2")]);
    let compiled = compile(vec![while_loop(vec![outer])]);
    let script = &compiled.script;

    let finals = finally_starts(script);
    assert_eq!(finals.len(), 2);
    let targets = gosub_targets(script);
    assert_eq!(&targets[..2], &finals[..]);
    for finally in &finals {
        assert_eq!(targets.iter().filter(|&t| t == finally).count(), 3);
    }

    let first = script.instructions().find(|i| i.op == OpCode::Gosub).unwrap();
    let back = decode_at(&script.code, first.pc + 6).unwrap();
    assert_eq!(back.op, OpCode::Goto);
    assert!(back.jump_target().unwrap() < first.pc);
    assert_balanced(script);
}

#[test]
fn test_return_crosses_nested_finally_blocks() {
    // function f() { try { try { return g(); } finally { f1(); } } finally { f2(); } }
    let ret = json!({ "type": "ReturnStatement", "argument": call(id("g"), vec![]) });
    let inner = try_finally(vec![ret], vec![call_stmt("f1")]);
    let outer = try_finally(vec![inner], vec![call_stmt("f2")]);
    let compiled = compile(vec![json!({
        "type": "FunctionDeclaration", "id": { "name": "f" }, "params": [], "body": [outer]
    })]);
    let script = &compiled.functions[0].script;

    let finals = finally_starts(script);
    assert_eq!(finals.len(), 2);
    let targets = gosub_targets(script);
    assert_eq!(&targets[..2], &finals[..]);
    for finally in &finals {
        assert_eq!(targets.iter().filter(|&t| t == finally).count(), 3);
    }

    let first = script.instructions().find(|i| i.op == OpCode::Gosub).unwrap();
    assert_eq!(decode_at(&script.code, first.pc + 6).unwrap().op, OpCode::Return);
    assert_balanced(script);
}

#[test]
fn test_break_from_finally_inside_catch() {
    // while (x) { try { f(); } catch (e) { try { break; } finally { f1(); } } finally { f2(); } }
    let inner = try_finally(vec![brk()], vec![call_stmt("f1")]);
    let outer = json!({
        "type": "TryStatement",
        "block": block(vec![call_stmt("f")]),
        "handlers": [{ "param": { "name": "e" }, "body": block(vec![inner]) }],
        "finalizer": block(vec![call_stmt("f2")])
    });
    let compiled = compile(vec![while_loop(vec![outer])]);
    let script = &compiled.script;

    let finals = finally_starts(script);
    assert_eq!(finals.len(), 2);

    // Inner finally, then out of the catch scope, then the outer finally
    let insns: Vec<_> = script.instructions().collect();
    let unwind = insns
        .windows(4)
        .find(|w| {
            w.iter().map(|i| i.op).eq([OpCode::Gosub, OpCode::LeaveWith, OpCode::Gosub, OpCode::Goto])
        })
        .unwrap();
    assert_eq!(unwind[0].jump_target(), Some(finals[0]));
    assert_eq!(unwind[2].jump_target(), Some(finals[1]));
    assert_eq!(unwind[3].jump_target(), Some(script.code.len()));

    assert!(gosub_targets(script).iter().all(|t| finals.contains(t)));
    assert_eq!(script.try_notes.len(), 3);
    assert_balanced(script);
}

// ============================================================================
// Stack model
// ============================================================================

#[test]
fn test_stack_depth_balances_across_constructs() {
    let labeled = json!({
        "type": "LabeledStatement",
        "label": { "name": "L" },
        "body": {
            "type": "WithStatement",
            "object": id("o"),
            "body": block(vec![
                json!({
                    "type": "IfStatement",
                    "test": { "type": "LogicalExpression", "operator": "&&", "left": id("a"), "right": id("b") },
                    "consequent": { "type": "BreakStatement", "label": { "name": "L" } }
                }),
                expr_stmt(assign("x", json!({
                    "type": "ConditionalExpression", "test": id("a"), "consequent": num(1.0), "alternate": num(2.0)
                }))),
            ])
        }
    });
    let for_in = json!({
        "type": "ForInStatement",
        "left": expr_stmt(id("k")),
        "right": id("o"),
        "body": block(vec![
            json!({ "type": "IfStatement", "test": id("k"), "consequent": brk() }),
            json!({ "type": "ContinueStatement" }),
        ])
    });
    let literal = expr_stmt(assign("obj", json!({
        "type": "ObjectExpression",
        "properties": [
            { "key": { "type": "Identifier", "name": "a" }, "value": num(1.0) },
            { "key": { "type": "StringLiteral", "value": "b" }, "value": num(2.0) },
            { "key": { "type": "NumericLiteral", "value": 3 }, "value": {
                "type": "ArrayExpression", "elements": [num(4.0), null, num(5.0)]
            } }
        ]
    })));
    let compiled = compile(vec![labeled, for_in, literal]);
    let script = &compiled.script;
    assert!(ops(script).contains(&OpCode::Pop2));
    assert!(ops(script).contains(&OpCode::LeaveWith));
    assert_balanced(script);
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_nested_functions_release_arena_marks() {
    let inner = json!({ "type": "FunctionDeclaration", "id": { "name": "g" }, "params": [], "body": [
        { "type": "ReturnStatement", "argument": id("a") }
    ] });
    let outer = json!({ "type": "FunctionDeclaration", "id": { "name": "f" }, "params": [{ "name": "a" }], "body": [
        inner,
        { "type": "ReturnStatement", "argument": call(id("g"), vec![]) }
    ] });
    let mut compiler = Compiler::new(CompileOptions::default());
    let compiled = compiler.compile(&program(vec![outer])).unwrap();

    assert_eq!(compiled.functions.len(), 2);
    // Ids are reserved before bodies are compiled, so the outer one comes first
    assert_eq!(compiled.functions[0].name.as_deref(), Some("f"));
    assert_eq!(compiled.functions[1].name.as_deref(), Some("g"));
    // `a` is not a local of `g`
    assert!(ops(&compiled.functions[1].script).contains(&OpCode::Name));
    assert_eq!(compiler.code_pool_stats().nreleases, 3);
    assert_eq!(compiler.temp_pool_stats().nreleases, 3);
}

#[test]
fn test_compile_single_function() {
    let function = serde_json::from_value(json!({
        "id": { "name": "add" },
        "params": [{ "name": "a" }, { "name": "b" }],
        "body": [{ "type": "ReturnStatement", "argument": {
            "type": "BinaryExpression", "operator": "+", "left": id("a"), "right": id("b")
        } }]
    }))
    .unwrap();
    let mut compiler = Compiler::new(CompileOptions::default());
    let id = compiler.compile_function(&function, 1).unwrap();
    let compiled = compiler.function(id).unwrap();
    assert_eq!(compiled.nargs, 2);
    assert_eq!(
        ops(&compiled.script),
        vec![OpCode::GetArg, OpCode::GetArg, OpCode::Add, OpCode::Return]
    );
}

#[test]
fn test_legacy_eval_is_plain_call() {
    let body = || vec![expr_stmt(call(id("eval"), vec![id("s")]))];
    let ecma = compile(body());
    assert!(ops(&ecma.script).contains(&OpCode::CallSpecial));

    let options: CompileOptions = serde_json::from_value(json!({ "version": "legacy", "filename": "old.js" })).unwrap();
    let legacy = compile_with(options, body()).unwrap();
    assert!(ops(&legacy.script).contains(&OpCode::Call));
    assert_eq!(legacy.script.filename.as_deref(), Some("old.js"));
}
