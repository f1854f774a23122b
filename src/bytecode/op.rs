use serde::{Deserialize, Serialize};

use crate::lang::token::Token;

/// Bytes at or above this value reference a data slot: `offset + ID_THRESHOLD`.
pub const ID_THRESHOLD: usize = 128;

/// Largest data offset that still fits a one-byte reference.
pub const MAX_DATA_OFFSET: usize = 255 - ID_THRESHOLD;

macro_rules! opcodes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal => $text:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// Lowercase mnemonic used in listings and diagnostics.
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }

            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some($name::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    /// Blast instruction set.
    ///
    /// Every opcode is a single byte below [`ID_THRESHOLD`]; bytes above it
    /// are variable references.
    pub enum BlastOp {
        // ───────────────────────────── Control ──────────────────────────────
        Nop = 0 => "nop",

        // ──────────────────────────── Assignment ────────────────────────────
        Assign = 1 => "assign",
        Assigns = 2 => "assigns",
        Assignf = 3 => "assignf",
        Assignfe = 4 => "assignfe",
        Assignfn = 5 => "assignfn",
        Assignfen = 6 => "assignfen",
        Assignv = 7 => "assignv",

        // ─────────────────────────────── Stack ──────────────────────────────
        Push = 8 => "push",
        Pushv = 9 => "pushv",
        Pushf = 10 => "pushf",
        Pushc = 11 => "pushc",
        Pop = 12 => "pop",
        Peek = 13 => "peek",

        // ──────────────────────────── Flow control ──────────────────────────
        Yield = 14 => "yield",
        Begin = 15 => "begin",
        End = 16 => "end",
        Jz = 17 => "jz",
        Jnz = 18 => "jnz",
        Jump = 19 => "jump",
        JumpBack = 20 => "jump_back",

        // ───────────────────────────── Operators ────────────────────────────
        Add = 21 => "add",
        Substract = 22 => "substract",
        Multiply = 23 => "multiply",
        Divide = 24 => "divide",
        And = 25 => "and",
        Or = 26 => "or",
        Not = 27 => "not",
        Xor = 28 => "xor",
        Greater = 29 => "greater",
        GreaterEquals = 30 => "greater_equals",
        Smaller = 31 => "smaller",
        SmallerEquals = 32 => "smaller_equals",
        Equals = 33 => "equals",
        NotEquals = 34 => "not_equals",

        // ───────────────────────────── Functions ────────────────────────────
        Abs = 35 => "abs",
        Min = 36 => "min",
        Max = 37 => "max",
        Mina = 38 => "mina",
        Maxa = 39 => "maxa",
        Select = 40 => "select",
        Random = 41 => "random",
        Seed = 42 => "seed",
        Sqrt = 43 => "sqrt",
        Rsqrt = 44 => "rsqrt",
        Sin = 45 => "sin",
        Cos = 46 => "cos",
        Tan = 47 => "tan",
        Atan = 48 => "atan",
        Atan2 = 49 => "atan2",
        Floor = 50 => "floor",
        Ceil = 51 => "ceil",
        Frac = 52 => "frac",
        Lerp = 53 => "lerp",
        Fma = 54 => "fma",
        Clamp = 55 => "clamp",
        Saturate = 56 => "saturate",

        // ───────────────────────── Well-known constants ─────────────────────
        Pi = 64 => "pi",
        InvPi = 65 => "inv_pi",
        Epsilon = 66 => "epsilon",
        Infinity = 67 => "infinity",
        NegativeInfinity = 68 => "negative_infinity",
        Nan = 69 => "nan",
        MinValue = 70 => "min_value",
        Value0 = 71 => "value_0",
        Value1 = 72 => "value_1",
        Value2 = 73 => "value_2",
        Value3 = 74 => "value_3",
        Value4 = 75 => "value_4",
        Value8 = 76 => "value_8",
        Value10 = 77 => "value_10",
        Value16 = 78 => "value_16",
        Value24 = 79 => "value_24",
        Value30 = 80 => "value_30",
        Value32 = 81 => "value_32",
        Value45 = 82 => "value_45",
        Value64 = 83 => "value_64",
        Value90 = 84 => "value_90",
        Value100 = 85 => "value_100",
        Value128 = 86 => "value_128",
        Value180 = 87 => "value_180",
        Value256 = 88 => "value_256",
        Value270 = 89 => "value_270",
        Value360 = 90 => "value_360",
        Value512 = 91 => "value_512",
        Value1024 = 92 => "value_1024",
        InvValue2 = 93 => "inv_value_2",
        InvValue3 = 94 => "inv_value_3",
        InvValue4 = 95 => "inv_value_4",
        InvValue8 = 96 => "inv_value_8",
        InvValue10 = 97 => "inv_value_10",
        InvValue16 = 98 => "inv_value_16",
        InvValue30 = 99 => "inv_value_30",
        InvValue32 = 100 => "inv_value_32",
        InvValue64 = 101 => "inv_value_64",
        InvValue100 = 102 => "inv_value_100",

        // ───────────────────────────── Encoding ─────────────────────────────
        /// Followed by 4 little-endian bytes of an inlined `f32`.
        ConstantF32 = 126 => "constant_f32",
        /// Followed by one [`ExtendedOp`] byte.
        ExOp = 127 => "ex_op",
    }
}

opcodes! {
    /// Second byte of an `ex_op` sequence.
    pub enum ExtendedOp {
        Debug = 1 => "debug",
        DebugStack = 2 => "debugstack",
        Pow = 3 => "pow",
        Exp = 4 => "exp",
        Log2 = 5 => "log2",
        Exp10 = 6 => "exp10",
        Log10 = 7 => "log10",
        Length = 8 => "length",
        LengthSq = 9 => "lengthsq",
        Normalize = 10 => "normalize",
        Dot = 11 => "dot",
        Cross = 12 => "cross",
    }
}

impl BlastOp {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Value of a well-known constant opcode.
    pub fn constant_value(self) -> Option<f32> {
        use BlastOp::*;
        Some(match self {
            Pi => std::f32::consts::PI,
            InvPi => std::f32::consts::FRAC_1_PI,
            Epsilon => f32::EPSILON,
            Infinity => f32::INFINITY,
            NegativeInfinity => f32::NEG_INFINITY,
            Nan => f32::NAN,
            MinValue => f32::MIN,
            Value0 => 0.0,
            Value1 => 1.0,
            Value2 => 2.0,
            Value3 => 3.0,
            Value4 => 4.0,
            Value8 => 8.0,
            Value10 => 10.0,
            Value16 => 16.0,
            Value24 => 24.0,
            Value30 => 30.0,
            Value32 => 32.0,
            Value45 => 45.0,
            Value64 => 64.0,
            Value90 => 90.0,
            Value100 => 100.0,
            Value128 => 128.0,
            Value180 => 180.0,
            Value256 => 256.0,
            Value270 => 270.0,
            Value360 => 360.0,
            Value512 => 512.0,
            Value1024 => 1024.0,
            InvValue2 => 1.0 / 2.0,
            InvValue3 => 1.0 / 3.0,
            InvValue4 => 1.0 / 4.0,
            InvValue8 => 1.0 / 8.0,
            InvValue10 => 1.0 / 10.0,
            InvValue16 => 1.0 / 16.0,
            InvValue30 => 1.0 / 30.0,
            InvValue32 => 1.0 / 32.0,
            InvValue64 => 1.0 / 64.0,
            InvValue100 => 1.0 / 100.0,
            _ => return None,
        })
    }

    pub fn is_constant(self) -> bool {
        self.constant_value().is_some()
    }

    /// Well-known constant opcode for `value`, if one exists.
    pub fn constant_for(value: f32, epsilon: f32) -> Option<BlastOp> {
        if value.is_nan() {
            return None;
        }
        let mut best: Option<(BlastOp, f32)> = None;
        for op in BlastOp::ALL.iter().copied() {
            let Some(c) = op.constant_value() else {
                continue;
            };
            if c.is_infinite() || value.is_infinite() {
                if c == value {
                    return Some(op);
                }
                continue;
            }
            let distance = (c - value).abs();
            if distance <= epsilon && best.is_none_or(|(_, d)| distance < d) {
                best = Some((op, distance));
            }
        }
        best.map(|(op, _)| op)
    }

    /// Opcode for an operator token. Structural tokens have none.
    pub fn from_token(token: Token) -> Option<BlastOp> {
        Some(match token {
            Token::Add => BlastOp::Add,
            Token::Substract => BlastOp::Substract,
            Token::Multiply => BlastOp::Multiply,
            Token::Divide => BlastOp::Divide,
            Token::Equals => BlastOp::Equals,
            Token::NotEquals => BlastOp::NotEquals,
            Token::SmallerThen => BlastOp::Smaller,
            Token::GreaterThen => BlastOp::Greater,
            Token::SmallerThenEquals => BlastOp::SmallerEquals,
            Token::GreaterThenEquals => BlastOp::GreaterEquals,
            Token::And => BlastOp::And,
            Token::Or => BlastOp::Or,
            Token::Xor => BlastOp::Xor,
            Token::Not => BlastOp::Not,
            _ => return None,
        })
    }

    /// Jump opcodes are followed by a one-byte offset.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            BlastOp::Jz | BlastOp::Jnz | BlastOp::Jump | BlastOp::JumpBack
        )
    }
}

impl std::fmt::Display for BlastOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a built-in does with respect to the stack and the root level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Pure function of its parameters.
    Math,
    /// Pushes to or pops from the stack.
    Stack,
    /// Statement with side effects (seeding the random generator).
    Procedure,
    /// Diagnostic output; skipped unless debug functions are included.
    Debug,
}

/// A built-in function as the compiler sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFunction {
    pub name: &'static str,
    pub op: BlastOp,
    pub extended: Option<ExtendedOp>,
    pub min_params: u8,
    pub max_params: u8,
    pub kind: FunctionKind,
}

/// Functions allowed as statements directly under the root.
pub const ROOT_PROCEDURES: &[&str] = &[
    "push",
    "pushf",
    "pushv",
    "pushc",
    "yield",
    "pop",
    "seed",
    "debug",
    "debugstack",
];

const fn op(
    name: &'static str,
    op: BlastOp,
    min: u8,
    max: u8,
    kind: FunctionKind,
) -> ScriptFunction {
    ScriptFunction {
        name,
        op,
        extended: None,
        min_params: min,
        max_params: max,
        kind,
    }
}

const fn ex(
    name: &'static str,
    ext: ExtendedOp,
    min: u8,
    max: u8,
    kind: FunctionKind,
) -> ScriptFunction {
    ScriptFunction {
        name,
        op: BlastOp::ExOp,
        extended: Some(ext),
        min_params: min,
        max_params: max,
        kind,
    }
}

use FunctionKind as K;

pub static FUNCTIONS: &[ScriptFunction] = &[
    op("push", BlastOp::Push, 1, 63, K::Stack),
    op("pushf", BlastOp::Pushf, 1, 1, K::Stack),
    op("pushv", BlastOp::Pushv, 1, 63, K::Stack),
    op("pushc", BlastOp::Pushc, 1, 63, K::Stack),
    op("pop", BlastOp::Pop, 0, 0, K::Stack),
    op("peek", BlastOp::Peek, 0, 1, K::Stack),
    op("seed", BlastOp::Seed, 1, 1, K::Procedure),
    op("random", BlastOp::Random, 0, 2, K::Math),
    op("abs", BlastOp::Abs, 1, 1, K::Math),
    op("min", BlastOp::Min, 2, 63, K::Math),
    op("max", BlastOp::Max, 2, 63, K::Math),
    op("mina", BlastOp::Mina, 1, 1, K::Math),
    op("maxa", BlastOp::Maxa, 1, 1, K::Math),
    op("select", BlastOp::Select, 3, 3, K::Math),
    op("sqrt", BlastOp::Sqrt, 1, 1, K::Math),
    op("rsqrt", BlastOp::Rsqrt, 1, 1, K::Math),
    op("sin", BlastOp::Sin, 1, 1, K::Math),
    op("cos", BlastOp::Cos, 1, 1, K::Math),
    op("tan", BlastOp::Tan, 1, 1, K::Math),
    op("atan", BlastOp::Atan, 1, 1, K::Math),
    op("atan2", BlastOp::Atan2, 2, 2, K::Math),
    op("floor", BlastOp::Floor, 1, 1, K::Math),
    op("ceil", BlastOp::Ceil, 1, 1, K::Math),
    op("frac", BlastOp::Frac, 1, 1, K::Math),
    op("lerp", BlastOp::Lerp, 3, 3, K::Math),
    op("fma", BlastOp::Fma, 3, 3, K::Math),
    op("clamp", BlastOp::Clamp, 3, 3, K::Math),
    op("saturate", BlastOp::Saturate, 1, 1, K::Math),
    ex("debug", ExtendedOp::Debug, 1, 63, K::Debug),
    ex("debugstack", ExtendedOp::DebugStack, 0, 0, K::Debug),
    ex("pow", ExtendedOp::Pow, 2, 2, K::Math),
    ex("exp", ExtendedOp::Exp, 1, 1, K::Math),
    ex("log2", ExtendedOp::Log2, 1, 1, K::Math),
    ex("exp10", ExtendedOp::Exp10, 1, 1, K::Math),
    ex("log10", ExtendedOp::Log10, 1, 1, K::Math),
    ex("length", ExtendedOp::Length, 1, 1, K::Math),
    ex("lengthsq", ExtendedOp::LengthSq, 1, 1, K::Math),
    ex("normalize", ExtendedOp::Normalize, 1, 1, K::Math),
    ex("dot", ExtendedOp::Dot, 2, 2, K::Math),
    ex("cross", ExtendedOp::Cross, 2, 2, K::Math),
];

/// Look up a built-in by name.
pub fn function(name: &str) -> Option<&'static ScriptFunction> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

impl ScriptFunction {
    pub fn is_stack_function(&self) -> bool {
        self.kind == FunctionKind::Stack
    }

    pub fn is_pop(&self) -> bool {
        self.op == BlastOp::Pop
    }

    pub fn is_push(&self) -> bool {
        matches!(
            self.op,
            BlastOp::Push | BlastOp::Pushf | BlastOp::Pushv | BlastOp::Pushc
        )
    }

    pub fn is_debug(&self) -> bool {
        self.kind == FunctionKind::Debug
    }

    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    /// Variable-arity functions carry a parameter-count byte.
    pub fn has_variable_arity(&self) -> bool {
        self.min_params != self.max_params
    }

    pub fn is_root_procedure(&self) -> bool {
        ROOT_PROCEDURES.contains(&self.name)
    }
}
