// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.
//!
//! Instructions are a one-byte opcode followed by big-endian immediates.
//! Every opcode has a static [`OpSpec`]: its encoded length, how many stack
//! operands it pops (`uses`, or `-1` for `2 + argc`) and pushes (`defs`),
//! and the format of its immediate.

use std::fmt;

/// Immediate operand format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFormat {
    /// No immediate
    Byte,
    /// Signed 16-bit relative jump offset
    Jump,
    /// Atom index
    Atom,
    /// Unsigned 16-bit literal
    Uint16,
    /// Argument count of a call
    Argc,
    /// Formal argument index
    Arg,
    /// Local variable index
    Var,
    /// Stack depth to restore
    Depth,
    /// Dense jump table
    TableSwitch,
    /// Sparse (atom index, offset) table
    LookupSwitch,
}

/// Static properties of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    /// Mnemonic
    pub name: &'static str,
    /// Encoded length, or `-1` when variable
    pub length: i8,
    /// Operands popped, or `-1` for `2 + argc`
    pub uses: i8,
    /// Operands pushed
    pub defs: i8,
    /// Immediate format
    pub format: OpFormat,
}

macro_rules! opcodes {
    ($(
        $(#[$doc:meta])*
        $variant:ident = ($name:literal, $len:literal, $uses:literal, $defs:literal, $format:ident),
    )*) => {
        /// Operation codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $( $(#[$doc])* $variant, )*
        }

        const SPECS: &[OpSpec] = &[
            $( OpSpec { name: $name, length: $len, uses: $uses, defs: $defs, format: OpFormat::$format }, )*
        ];

        const ALL: &[OpCode] = &[ $( OpCode::$variant, )* ];
    };
}

opcodes! {
    // Stack and statement glue
    /// No operation; anchors source notes
    Nop = ("nop", 1, 0, 0, Byte),
    /// Push `undefined`
    Push = ("push", 1, 0, 1, Byte),
    /// Pop into the script result value
    PopV = ("popv", 1, 1, 0, Byte),
    /// Push an object onto the scope chain
    EnterWith = ("enterwith", 1, 1, 1, Byte),
    /// Pop the scope chain and the with object
    LeaveWith = ("leavewith", 1, 1, 0, Byte),
    /// Return the top of stack
    Return = ("return", 1, 1, 0, Byte),
    /// Unconditional jump
    Goto = ("goto", 3, 0, 0, Jump),
    /// Jump if false
    IfEq = ("ifeq", 3, 1, 0, Jump),
    /// Jump if true
    IfNe = ("ifne", 3, 1, 0, Jump),
    /// Duplicate the top value
    Dup = ("dup", 1, 1, 2, Byte),
    /// Duplicate the top two values
    Dup2 = ("dup2", 1, 2, 4, Byte),

    // Binary operators
    /// `|`
    BitOr = ("bitor", 1, 2, 1, Byte),
    /// `^`
    BitXor = ("bitxor", 1, 2, 1, Byte),
    /// `&`
    BitAnd = ("bitand", 1, 2, 1, Byte),
    /// `==`
    Eq = ("eq", 1, 2, 1, Byte),
    /// `!=`
    Ne = ("ne", 1, 2, 1, Byte),
    /// `<`
    Lt = ("lt", 1, 2, 1, Byte),
    /// `<=`
    Le = ("le", 1, 2, 1, Byte),
    /// `>`
    Gt = ("gt", 1, 2, 1, Byte),
    /// `>=`
    Ge = ("ge", 1, 2, 1, Byte),
    /// `<<`
    Lsh = ("lsh", 1, 2, 1, Byte),
    /// `>>`
    Rsh = ("rsh", 1, 2, 1, Byte),
    /// `>>>`
    Ursh = ("ursh", 1, 2, 1, Byte),
    /// `+`
    Add = ("add", 1, 2, 1, Byte),
    /// `-`
    Sub = ("sub", 1, 2, 1, Byte),
    /// `*`
    Mul = ("mul", 1, 2, 1, Byte),
    /// `/`
    Div = ("div", 1, 2, 1, Byte),
    /// `%`
    Mod = ("mod", 1, 2, 1, Byte),
    /// `===`
    StrictEq = ("stricteq", 1, 2, 1, Byte),
    /// `!==`
    StrictNe = ("strictne", 1, 2, 1, Byte),
    /// `in`
    In = ("in", 1, 2, 1, Byte),
    /// `instanceof`
    InstanceOf = ("instanceof", 1, 2, 1, Byte),

    // Unary operators
    /// `!`
    Not = ("not", 1, 1, 1, Byte),
    /// `~`
    BitNot = ("bitnot", 1, 1, 1, Byte),
    /// Unary `-`
    Neg = ("neg", 1, 1, 1, Byte),
    /// Unary `+`
    Pos = ("pos", 1, 1, 1, Byte),
    /// `typeof`
    TypeOf = ("typeof", 1, 1, 1, Byte),
    /// `void`
    Void = ("void", 1, 1, 1, Byte),

    // Delete
    /// `delete name`
    DelName = ("delname", 3, 0, 1, Atom),
    /// `delete obj.prop`
    DelProp = ("delprop", 3, 1, 1, Atom),
    /// `delete obj[key]`
    DelElem = ("delelem", 1, 2, 1, Byte),

    // Increment and decrement
    /// `++name`
    IncName = ("incname", 3, 0, 1, Atom),
    /// `++obj.prop`
    IncProp = ("incprop", 3, 1, 1, Atom),
    /// `++obj[key]`
    IncElem = ("incelem", 1, 2, 1, Byte),
    /// `--name`
    DecName = ("decname", 3, 0, 1, Atom),
    /// `--obj.prop`
    DecProp = ("decprop", 3, 1, 1, Atom),
    /// `--obj[key]`
    DecElem = ("decelem", 1, 2, 1, Byte),
    /// `name++`
    NameInc = ("nameinc", 3, 0, 1, Atom),
    /// `obj.prop++`
    PropInc = ("propinc", 3, 1, 1, Atom),
    /// `obj[key]++`
    ElemInc = ("eleminc", 1, 2, 1, Byte),
    /// `name--`
    NameDec = ("namedec", 3, 0, 1, Atom),
    /// `obj.prop--`
    PropDec = ("propdec", 3, 1, 1, Atom),
    /// `obj[key]--`
    ElemDec = ("elemdec", 1, 2, 1, Byte),
    /// `++arg`
    IncArg = ("incarg", 3, 0, 1, Arg),
    /// `--arg`
    DecArg = ("decarg", 3, 0, 1, Arg),
    /// `arg++`
    ArgInc = ("arginc", 3, 0, 1, Arg),
    /// `arg--`
    ArgDec = ("argdec", 3, 0, 1, Arg),
    /// `++var`
    IncVar = ("incvar", 3, 0, 1, Var),
    /// `--var`
    DecVar = ("decvar", 3, 0, 1, Var),
    /// `var++`
    VarInc = ("varinc", 3, 0, 1, Var),
    /// `var--`
    VarDec = ("vardec", 3, 0, 1, Var),

    // Property access
    /// `obj.prop`
    GetProp = ("getprop", 3, 1, 1, Atom),
    /// `obj.prop = v`
    SetProp = ("setprop", 3, 2, 1, Atom),
    /// `obj[key]`
    GetElem = ("getelem", 1, 2, 1, Byte),
    /// `obj[key] = v`
    SetElem = ("setelem", 1, 3, 1, Byte),
    /// Push the `this` object for a call
    PushObj = ("pushobj", 1, 0, 1, Byte),
    /// Call with `argc` arguments
    Call = ("call", 3, -1, 1, Argc),
    /// Construct with `argc` arguments
    New = ("new", 3, -1, 1, Argc),
    /// Direct `eval` call
    CallSpecial = ("callspecial", 3, -1, 1, Argc),

    // Names and variables
    /// Push the value of a name
    Name = ("name", 3, 0, 1, Atom),
    /// Push the object a name binds in
    BindName = ("bindname", 3, 0, 1, Atom),
    /// Assign a name bound by `bindname`
    SetName = ("setname", 3, 2, 1, Atom),
    /// Push a formal argument
    GetArg = ("getarg", 3, 0, 1, Arg),
    /// Assign a formal argument
    SetArg = ("setarg", 3, 1, 1, Arg),
    /// Push a local variable
    GetVar = ("getvar", 3, 0, 1, Var),
    /// Assign a local variable
    SetVar = ("setvar", 3, 1, 1, Var),

    // Literals
    /// Push a number atom
    Number = ("number", 3, 0, 1, Atom),
    /// Push a string atom
    String = ("string", 3, 0, 1, Atom),
    /// Push an integer below 65536
    Uint16 = ("uint16", 3, 0, 1, Uint16),
    /// Push `0`
    Zero = ("zero", 1, 0, 1, Byte),
    /// Push `1`
    One = ("one", 1, 0, 1, Byte),
    /// Push `null`
    Null = ("null", 1, 0, 1, Byte),
    /// Push `this`
    This = ("this", 1, 0, 1, Byte),
    /// Push `false`
    False = ("false", 1, 0, 1, Byte),
    /// Push `true`
    True = ("true", 1, 0, 1, Byte),
    /// Push a function object
    Object = ("object", 3, 0, 1, Atom),
    /// Bind a nested function declaration
    Closure = ("closure", 3, 0, 0, Atom),

    // Short-circuit
    /// `||`: jump keeping the value if truthy, else pop
    Or = ("or", 3, 1, 0, Jump),
    /// `&&`: jump keeping the value if falsy, else pop
    And = ("and", 3, 1, 0, Jump),

    // Switch
    /// Dense jump table switch
    TableSwitch = ("tableswitch", -1, 1, 0, TableSwitch),
    /// Sparse switch on constant atoms
    LookupSwitch = ("lookupswitch", -1, 1, 0, LookupSwitch),
    /// Start of a case-by-case switch
    CondSwitch = ("condswitch", 1, 0, 0, Byte),
    /// Compare with the discriminant and jump on match
    Case = ("case", 3, 1, 0, Jump),
    /// Pop the discriminant and jump to the default case
    Default = ("default", 3, 1, 0, Jump),

    // Exceptions
    /// Push the pending exception
    Exception = ("exception", 1, 0, 1, Byte),
    /// Reset the stack to a recorded depth
    SetSp = ("setsp", 3, 0, 0, Depth),
    /// Call a finally block
    Gosub = ("gosub", 3, 0, 0, Jump),
    /// Return from a finally block
    RetSub = ("retsub", 1, 1, 0, Byte),
    /// Throw the top of stack
    Throw = ("throw", 1, 1, 0, Byte),

    // Initialisers
    /// Construct the object or array being initialised
    NewInit = ("newinit", 1, 2, 1, Byte),
    /// Finish an initialiser
    EndInit = ("endinit", 1, 0, 0, Byte),
    /// Define a named property of the initialiser object
    InitProp = ("initprop", 3, 1, 0, Atom),
    /// Define an indexed element of the initialiser object
    InitElem = ("initelem", 1, 2, 0, Byte),

    // For-in
    /// Convert the iteration target to an object
    ToObject = ("toobject", 1, 1, 1, Byte),
    /// Assign the next key to a name
    ForName = ("forname", 3, 0, 1, Atom),
    /// Assign the next key to a property
    ForProp = ("forprop", 3, 1, 1, Atom),
    /// Assign the next key to an element
    ForElem = ("forelem", 1, 2, 1, Byte),
    /// Assign the next key to a formal argument
    ForArg = ("forarg", 3, 0, 1, Arg),
    /// Assign the next key to a local variable
    ForVar = ("forvar", 3, 0, 1, Var),
    /// Pop one value
    Pop = ("pop", 1, 1, 0, Byte),
    /// Pop two values
    Pop2 = ("pop2", 1, 2, 0, Byte),

    /// Debugger hook
    Debugger = ("debugger", 1, 0, 0, Byte),
}

impl OpCode {
    /// Decodes a byte.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        ALL.get(byte as usize).copied()
    }

    /// Static properties.
    pub fn spec(self) -> &'static OpSpec {
        &SPECS[self as usize]
    }

    /// Mnemonic.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Whether the immediate is a relative jump.
    pub fn is_jump(self) -> bool {
        self.spec().format == OpFormat::Jump
    }

    /// Number of opcodes.
    pub const COUNT: usize = ALL.len();
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Smallest encodable jump offset.
pub const JUMP_OFFSET_MIN: isize = i16::MIN as isize;
/// Largest encodable jump offset.
pub const JUMP_OFFSET_MAX: isize = i16::MAX as isize;

/// Reads a big-endian `u16` at `at`.
pub fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

/// Writes a big-endian `u16` at `at`.
pub fn write_u16(code: &mut [u8], at: usize, value: u16) {
    code[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

/// Reads the jump offset of the instruction at `pc`.
pub fn jump_offset(code: &[u8], pc: usize) -> isize {
    read_u16(code, pc + 1) as i16 as isize
}

/// Writes the jump offset of the instruction at `pc`; the caller has
/// range-checked `offset`.
pub fn set_jump_offset(code: &mut [u8], pc: usize, offset: isize) {
    write_u16(code, pc + 1, offset as i16 as u16);
}

/// Encoded length of the instruction at `pc`, reading switch tables for
/// the variable-length forms.
pub fn instruction_length(code: &[u8], pc: usize) -> Option<usize> {
    let op = OpCode::from_u8(*code.get(pc)?)?;
    let spec = op.spec();
    if spec.length > 0 {
        return Some(spec.length as usize);
    }
    match spec.format {
        OpFormat::TableSwitch => {
            let low = read_u16(code, pc + 3) as i16 as isize;
            let high = read_u16(code, pc + 5) as i16 as isize;
            let n = (high - low + 1).max(0) as usize;
            Some(1 + 2 + 2 + 2 + 2 * n)
        }
        OpFormat::LookupSwitch => {
            let npairs = read_u16(code, pc + 3) as usize;
            Some(1 + 2 + 2 + 4 * npairs)
        }
        _ => None,
    }
}
