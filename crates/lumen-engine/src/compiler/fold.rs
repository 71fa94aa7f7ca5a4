// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile-time constants for switch case labels.

use std::sync::Arc;

use crate::ast::{BinaryOperator, Expr, Expression, LogicalOperator, UnaryOperator};
use crate::atom::AtomValue;

/// A value known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constant {
    Number(f64),
    String(Arc<str>),
    Boolean(bool),
    Null,
    Undefined,
}

impl Constant {
    fn truthy(&self) -> bool {
        match self {
            Constant::Number(n) => *n != 0.0 && !n.is_nan(),
            Constant::String(s) => !s.is_empty(),
            Constant::Boolean(b) => *b,
            Constant::Null | Constant::Undefined => false,
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Constant::Number(n) => Some(*n),
            Constant::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Constant::Null => Some(0.0),
            Constant::Undefined => Some(f64::NAN),
            Constant::String(_) => None,
        }
    }

    /// The atom a lookup switch keys this case on; `None` for values that
    /// cannot be case keys.
    pub fn to_atom(&self) -> Option<AtomValue> {
        match self {
            Constant::Number(n) => Some(AtomValue::number(*n)),
            Constant::String(s) => Some(AtomValue::String(s.clone())),
            Constant::Boolean(b) => Some(AtomValue::Boolean(*b)),
            Constant::Null | Constant::Undefined => None,
        }
    }

    /// The value as a jump-table index.
    pub fn table_index(&self) -> Option<i16> {
        match self {
            Constant::Number(n) if n.fract() == 0.0 && *n >= i16::MIN as f64 && *n <= i16::MAX as f64 => {
                if *n == 0.0 && n.is_sign_negative() {
                    None
                } else {
                    Some(*n as i16)
                }
            }
            _ => None,
        }
    }
}

/// Number, string and boolean literal syntax only.
pub(crate) fn literal(expr: &Expr) -> Option<Constant> {
    match &expr.kind {
        Expression::Number { value } => Some(Constant::Number(*value)),
        Expression::String { value } => Some(Constant::String(value.as_str().into())),
        Expression::Boolean { value } => Some(Constant::Boolean(*value)),
        _ => None,
    }
}

/// Evaluates an expression built from literals and operators.
pub(crate) fn fold(expr: &Expr) -> Option<Constant> {
    match &expr.kind {
        Expression::Number { .. } | Expression::String { .. } | Expression::Boolean { .. } => literal(expr),
        Expression::Null => Some(Constant::Null),
        Expression::Paren(paren) => fold(&paren.expression),
        Expression::Unary(unary) => {
            let value = fold(&unary.argument)?;
            match unary.operator {
                UnaryOperator::Minus => Some(Constant::Number(-value.number()?)),
                UnaryOperator::Plus => Some(Constant::Number(value.number()?)),
                UnaryOperator::LogicalNot => Some(Constant::Boolean(!value.truthy())),
                UnaryOperator::BitwiseNot => Some(Constant::Number(!to_int32(value.number()?) as f64)),
                UnaryOperator::Void => Some(Constant::Undefined),
                UnaryOperator::Typeof | UnaryOperator::Delete => None,
            }
        }
        Expression::Logical(logical) => {
            let left = fold(&logical.left)?;
            match (logical.operator, left.truthy()) {
                (LogicalOperator::Or, true) | (LogicalOperator::And, false) => Some(left),
                _ => fold(&logical.right),
            }
        }
        Expression::Conditional(cond) => {
            if fold(&cond.test)?.truthy() {
                fold(&cond.consequent)
            } else {
                fold(&cond.alternate)
            }
        }
        Expression::Binary(binary) => {
            let left = fold(&binary.left)?;
            let right = fold(&binary.right)?;
            fold_binary(binary.operator, &left, &right)
        }
        _ => None,
    }
}

fn fold_binary(op: BinaryOperator, left: &Constant, right: &Constant) -> Option<Constant> {
    use BinaryOperator::*;
    if let (Add, Constant::String(a), Constant::String(b)) = (op, left, right) {
        return Some(Constant::String(format!("{}{}", a, b).into()));
    }
    match op {
        Equal | StrictEqual => return Some(Constant::Boolean(strict_equals(left, right)?)),
        NotEqual | StrictNotEqual => return Some(Constant::Boolean(!strict_equals(left, right)?)),
        _ => {}
    }
    let a = left.number()?;
    let b = right.number()?;
    let int = |f: fn(i32, i32) -> i32| Some(Constant::Number(f(to_int32(a), to_int32(b)) as f64));
    let shift = (to_int32(b) as u32) & 31;
    match op {
        Add => Some(Constant::Number(a + b)),
        Subtract => Some(Constant::Number(a - b)),
        Multiply => Some(Constant::Number(a * b)),
        Divide => Some(Constant::Number(a / b)),
        Modulo => Some(Constant::Number(a % b)),
        LessThan => Some(Constant::Boolean(a < b)),
        LessThanEqual => Some(Constant::Boolean(a <= b)),
        GreaterThan => Some(Constant::Boolean(a > b)),
        GreaterThanEqual => Some(Constant::Boolean(a >= b)),
        BitwiseAnd => int(|x, y| x & y),
        BitwiseOr => int(|x, y| x | y),
        BitwiseXor => int(|x, y| x ^ y),
        LeftShift => Some(Constant::Number(to_int32(a).wrapping_shl(shift) as f64)),
        RightShift => Some(Constant::Number((to_int32(a) >> shift) as f64)),
        UnsignedRightShift => Some(Constant::Number(((to_int32(a) as u32) >> shift) as f64)),
        _ => None,
    }
}

// Same-type comparison only; mixed types are left to the runtime.
fn strict_equals(left: &Constant, right: &Constant) -> Option<bool> {
    match (left, right) {
        (Constant::Number(a), Constant::Number(b)) => Some(a == b),
        (Constant::String(a), Constant::String(b)) => Some(a == b),
        (Constant::Boolean(a), Constant::Boolean(b)) => Some(a == b),
        (Constant::Null, Constant::Null) | (Constant::Undefined, Constant::Undefined) => Some(true),
        _ => None,
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryExpression, UnaryExpression};

    fn num(n: f64) -> Expr {
        Expr::new(Expression::Number { value: n }, 1)
    }

    fn binary(op: BinaryOperator, l: Expr, r: Expr) -> Expr {
        Expr::new(
            Expression::Binary(BinaryExpression {
                operator: op,
                left: Box::new(l),
                right: Box::new(r),
            }),
            1,
        )
    }

    #[test]
    fn test_folds_arithmetic() {
        let e = binary(BinaryOperator::Multiply, num(3.0), binary(BinaryOperator::Add, num(1.0), num(1.0)));
        assert_eq!(fold(&e), Some(Constant::Number(6.0)));
        assert_eq!(fold(&e).and_then(|c| c.table_index()), Some(6));
    }

    #[test]
    fn test_negation_is_not_a_literal() {
        let e = Expr::new(
            Expression::Unary(UnaryExpression {
                operator: UnaryOperator::Minus,
                argument: Box::new(num(2.0)),
            }),
            1,
        );
        assert!(literal(&e).is_none());
        assert_eq!(fold(&e), Some(Constant::Number(-2.0)));
    }

    #[test]
    fn test_identifiers_do_not_fold() {
        let e = Expr::new(Expression::Identifier(crate::ast::Identifier { name: "x".into() }), 1);
        assert!(fold(&e).is_none());
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
    }
}
