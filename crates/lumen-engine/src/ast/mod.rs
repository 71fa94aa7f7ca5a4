// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree (AST) consumed by the emitter.
//!
//! The tree is produced by an external parser and read here as JSON. Node
//! types follow ESTree naming (with Babel's literal and parenthesized forms)
//! so existing tooling can produce it. Each node carries its source location
//! and a scratch cell the emitter uses to remember where the node's code
//! begins; the emitter never changes the tree otherwise.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// A line/column position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// Source span of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// First character
    pub start: Position,
    /// One past the last character
    pub end: Position,
}

/// A tree node: kind-specific payload plus location and scratch offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<T> {
    /// The node payload
    #[serde(flatten)]
    pub kind: T,
    /// Source span
    #[serde(default)]
    pub loc: SourceLocation,
    /// Bytecode offset at which the node's code begins, set during emission
    #[serde(skip)]
    pub offset: Cell<usize>,
}

impl<T> Node<T> {
    /// Wraps `kind` at the given line.
    pub fn new(kind: T, line: u32) -> Self {
        Self {
            kind,
            loc: SourceLocation {
                start: Position { line, column: 0 },
                end: Position { line, column: 0 },
            },
            offset: Cell::new(0),
        }
    }

    /// Starting line.
    pub fn line(&self) -> u32 {
        self.loc.start.line
    }

    /// Ending line.
    pub fn end_line(&self) -> u32 {
        self.loc.end.line
    }
}

/// A statement node.
pub type Stmt = Node<Statement>;
/// An expression node.
pub type Expr = Node<Expression>;

/// A complete program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// The statements in the program
    pub body: Vec<Stmt>,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    /// `var` declaration
    #[serde(rename = "VariableDeclaration")]
    Var(VariableDeclaration),
    /// Function declaration
    #[serde(rename = "FunctionDeclaration")]
    Function(Function),
    /// Expression statement
    #[serde(rename = "ExpressionStatement")]
    Expression(ExpressionStatement),
    /// Block statement `{ ... }`
    #[serde(rename = "BlockStatement")]
    Block(BlockStatement),
    /// If statement
    #[serde(rename = "IfStatement")]
    If(IfStatement),
    /// Switch statement
    #[serde(rename = "SwitchStatement")]
    Switch(SwitchStatement),
    /// While statement
    #[serde(rename = "WhileStatement")]
    While(WhileStatement),
    /// Do-while statement
    #[serde(rename = "DoWhileStatement")]
    DoWhile(DoWhileStatement),
    /// For statement
    #[serde(rename = "ForStatement")]
    For(ForStatement),
    /// For-in statement
    #[serde(rename = "ForInStatement")]
    ForIn(ForInStatement),
    /// Return statement
    #[serde(rename = "ReturnStatement")]
    Return(ReturnStatement),
    /// Break statement
    #[serde(rename = "BreakStatement")]
    Break(JumpStatement),
    /// Continue statement
    #[serde(rename = "ContinueStatement")]
    Continue(JumpStatement),
    /// Throw statement
    #[serde(rename = "ThrowStatement")]
    Throw(ThrowStatement),
    /// Try statement
    #[serde(rename = "TryStatement")]
    Try(TryStatement),
    /// With statement
    #[serde(rename = "WithStatement")]
    With(WithStatement),
    /// Labeled statement
    #[serde(rename = "LabeledStatement")]
    Labeled(LabeledStatement),
    /// Debugger statement
    #[serde(rename = "DebuggerStatement")]
    Debugger,
    /// Empty statement (;)
    #[serde(rename = "EmptyStatement")]
    Empty,
}

/// A `var` declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    /// The declarators
    pub declarations: Vec<VariableDeclarator>,
}

/// A single variable declarator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    /// The identifier being declared
    pub id: Identifier,
    /// Optional initializer expression
    #[serde(default)]
    pub init: Option<Expr>,
}

/// A function declaration or expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// The function name
    #[serde(default)]
    pub id: Option<Identifier>,
    /// The parameters
    #[serde(default)]
    pub params: Vec<Identifier>,
    /// The function body
    pub body: Vec<Stmt>,
}

/// An expression statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    /// The expression
    pub expression: Expr,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatement {
    /// The statements in the block
    pub body: Vec<Stmt>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// The condition
    pub test: Expr,
    /// The then branch
    pub consequent: Box<Stmt>,
    /// The optional else branch
    #[serde(default)]
    pub alternate: Option<Box<Stmt>>,
}

/// A while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    /// The condition
    pub test: Expr,
    /// The loop body
    pub body: Box<Stmt>,
}

/// A do-while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoWhileStatement {
    /// The loop body
    pub body: Box<Stmt>,
    /// The condition
    pub test: Expr,
}

/// A for statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    /// The initializer: a `var` declaration or an expression statement
    #[serde(default)]
    pub init: Option<Box<Stmt>>,
    /// The condition
    #[serde(default)]
    pub test: Option<Expr>,
    /// The update expression
    #[serde(default)]
    pub update: Option<Expr>,
    /// The loop body
    pub body: Box<Stmt>,
}

/// A for-in statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForInStatement {
    /// The left-hand side: a single-declarator `var` or an lvalue
    /// expression statement
    pub left: Box<Stmt>,
    /// The object to iterate over
    pub right: Expr,
    /// The loop body
    pub body: Box<Stmt>,
}

/// A switch statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    /// The discriminant expression
    pub discriminant: Expr,
    /// The case clauses
    pub cases: Vec<Node<SwitchCase>>,
}

/// A switch case clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// The test expression (`None` for default)
    #[serde(default)]
    pub test: Option<Expr>,
    /// The consequent statements
    #[serde(default)]
    pub consequent: Vec<Stmt>,
}

/// A break or continue statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JumpStatement {
    /// The target label
    #[serde(default)]
    pub label: Option<Identifier>,
}

/// A return statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    /// The return value
    #[serde(default)]
    pub argument: Option<Expr>,
}

/// A throw statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowStatement {
    /// The thrown expression
    pub argument: Expr,
}

/// A try statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStatement {
    /// The try block
    pub block: Box<Stmt>,
    /// Catch clauses; all but the last must be guarded to be reachable
    #[serde(default)]
    pub handlers: Vec<Node<CatchClause>>,
    /// The finally block
    #[serde(default)]
    pub finalizer: Option<Box<Stmt>>,
}

/// A catch clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// The exception variable
    pub param: Identifier,
    /// Optional `if` guard
    #[serde(default)]
    pub guard: Option<Expr>,
    /// The catch body
    pub body: Box<Stmt>,
}

/// A with statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithStatement {
    /// The object expression
    pub object: Expr,
    /// The body statement
    pub body: Box<Stmt>,
}

/// A labeled statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledStatement {
    /// The label identifier
    pub label: Identifier,
    /// The labeled body
    pub body: Box<Stmt>,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// Numeric literal
    #[serde(rename = "NumericLiteral")]
    Number {
        /// The value
        value: f64,
    },
    /// String literal
    #[serde(rename = "StringLiteral")]
    String {
        /// The value
        value: String,
    },
    /// Boolean literal
    #[serde(rename = "BooleanLiteral")]
    Boolean {
        /// The value
        value: bool,
    },
    /// `null`
    #[serde(rename = "NullLiteral")]
    Null,
    /// Identifier reference
    Identifier(Identifier),
    /// `this`
    #[serde(rename = "ThisExpression")]
    This,
    /// Array literal
    #[serde(rename = "ArrayExpression")]
    Array(ArrayExpression),
    /// Object literal
    #[serde(rename = "ObjectExpression")]
    Object(ObjectExpression),
    /// Binary expression
    #[serde(rename = "BinaryExpression")]
    Binary(BinaryExpression),
    /// Short-circuit `&&` / `||`
    #[serde(rename = "LogicalExpression")]
    Logical(LogicalExpression),
    /// Unary expression
    #[serde(rename = "UnaryExpression")]
    Unary(UnaryExpression),
    /// Assignment expression
    #[serde(rename = "AssignmentExpression")]
    Assignment(AssignmentExpression),
    /// Call expression
    #[serde(rename = "CallExpression")]
    Call(CallExpression),
    /// `new` expression
    #[serde(rename = "NewExpression")]
    New(CallExpression),
    /// Member access expression
    #[serde(rename = "MemberExpression")]
    Member(MemberExpression),
    /// Conditional (ternary) expression
    #[serde(rename = "ConditionalExpression")]
    Conditional(ConditionalExpression),
    /// Function expression
    #[serde(rename = "FunctionExpression")]
    Function(Function),
    /// Update expression (++/--)
    #[serde(rename = "UpdateExpression")]
    Update(UpdateExpression),
    /// Sequence expression (comma operator)
    #[serde(rename = "SequenceExpression")]
    Sequence(SequenceExpression),
    /// Parenthesized expression
    #[serde(rename = "ParenthesizedExpression")]
    Paren(ParenthesizedExpression),
}

/// An array expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpression {
    /// The elements (`None` represents a hole)
    pub elements: Vec<Option<Expr>>,
    /// Whether the literal ends with a trailing comma
    #[serde(default)]
    pub trailing_comma: bool,
}

/// An object expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpression {
    /// The properties
    pub properties: Vec<Property>,
}

/// An object literal property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The property key
    pub key: PropertyName,
    /// The property value
    pub value: Expr,
}

/// An object literal key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropertyName {
    /// Bare identifier key
    Identifier(Identifier),
    /// Quoted key
    #[serde(rename = "StringLiteral")]
    String {
        /// The key text
        value: String,
    },
    /// Numeric key
    #[serde(rename = "NumericLiteral")]
    Number {
        /// The key value
        value: f64,
    },
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// The left operand
    pub left: Box<Expr>,
    /// The right operand
    pub right: Box<Expr>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Arithmetic
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "%")]
    Modulo,
    // Comparison
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "===")]
    StrictEqual,
    #[serde(rename = "!==")]
    StrictNotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanEqual,
    // Bitwise
    #[serde(rename = "&")]
    BitwiseAnd,
    #[serde(rename = "|")]
    BitwiseOr,
    #[serde(rename = "^")]
    BitwiseXor,
    #[serde(rename = "<<")]
    LeftShift,
    #[serde(rename = ">>")]
    RightShift,
    #[serde(rename = ">>>")]
    UnsignedRightShift,
    // Other
    #[serde(rename = "in")]
    In,
    #[serde(rename = "instanceof")]
    InstanceOf,
}

/// A short-circuit expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    /// The operator
    pub operator: LogicalOperator,
    /// The left operand
    pub left: Box<Expr>,
    /// The right operand
    pub right: Box<Expr>,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// `||`
    #[serde(rename = "||")]
    Or,
    /// `&&`
    #[serde(rename = "&&")]
    And,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub argument: Box<Expr>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// -
    #[serde(rename = "-")]
    Minus,
    /// +
    #[serde(rename = "+")]
    Plus,
    /// !
    #[serde(rename = "!")]
    LogicalNot,
    /// ~
    #[serde(rename = "~")]
    BitwiseNot,
    /// typeof
    #[serde(rename = "typeof")]
    Typeof,
    /// void
    #[serde(rename = "void")]
    Void,
    /// delete
    #[serde(rename = "delete")]
    Delete,
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    /// The operator
    pub operator: AssignmentOperator,
    /// The left-hand side
    pub left: Box<Expr>,
    /// The right-hand side
    pub right: Box<Expr>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOperator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    AddAssign,
    #[serde(rename = "-=")]
    SubtractAssign,
    #[serde(rename = "*=")]
    MultiplyAssign,
    #[serde(rename = "/=")]
    DivideAssign,
    #[serde(rename = "%=")]
    ModuloAssign,
    #[serde(rename = "<<=")]
    LeftShiftAssign,
    #[serde(rename = ">>=")]
    RightShiftAssign,
    #[serde(rename = ">>>=")]
    UnsignedRightShiftAssign,
    #[serde(rename = "&=")]
    BitwiseAndAssign,
    #[serde(rename = "|=")]
    BitwiseOrAssign,
    #[serde(rename = "^=")]
    BitwiseXorAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOperator> {
        use AssignmentOperator::*;
        Some(match self {
            Assign => return None,
            AddAssign => BinaryOperator::Add,
            SubtractAssign => BinaryOperator::Subtract,
            MultiplyAssign => BinaryOperator::Multiply,
            DivideAssign => BinaryOperator::Divide,
            ModuloAssign => BinaryOperator::Modulo,
            LeftShiftAssign => BinaryOperator::LeftShift,
            RightShiftAssign => BinaryOperator::RightShift,
            UnsignedRightShiftAssign => BinaryOperator::UnsignedRightShift,
            BitwiseAndAssign => BinaryOperator::BitwiseAnd,
            BitwiseOrAssign => BinaryOperator::BitwiseOr,
            BitwiseXorAssign => BinaryOperator::BitwiseXor,
        })
    }
}

/// A call or `new` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    /// The function being called
    pub callee: Box<Expr>,
    /// The arguments
    #[serde(default)]
    pub arguments: Vec<Expr>,
}

/// A member access expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberExpression {
    /// The object
    pub object: Box<Expr>,
    /// The property; an [`Expression::Identifier`] unless `computed`
    pub property: Box<Expr>,
    /// Whether this is bracket notation
    #[serde(default)]
    pub computed: bool,
}

impl MemberExpression {
    /// The property name of a dot access.
    pub fn property_name(&self) -> Option<&str> {
        match &self.property.kind {
            Expression::Identifier(id) if !self.computed => Some(&id.name),
            _ => None,
        }
    }
}

/// A conditional (ternary) expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpression {
    /// The condition
    pub test: Box<Expr>,
    /// The consequent (if true)
    pub consequent: Box<Expr>,
    /// The alternate (if false)
    pub alternate: Box<Expr>,
}

/// An update expression (++/--).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpression {
    /// The operator
    pub operator: UpdateOperator,
    /// The operand
    pub argument: Box<Expr>,
    /// Whether prefix (++x) or postfix (x++)
    pub prefix: bool,
}

/// Update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOperator {
    /// ++
    #[serde(rename = "++")]
    Increment,
    /// --
    #[serde(rename = "--")]
    Decrement,
}

/// A sequence expression (comma operator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpression {
    /// The expressions
    pub expressions: Vec<Expr>,
}

/// A parenthesized expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParenthesizedExpression {
    /// The inner expression
    pub expression: Box<Expr>,
}
