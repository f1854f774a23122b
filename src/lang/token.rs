use serde::{Deserialize, Serialize};

/// Token kinds that survive into the syntax tree.
///
/// Operation nodes carry one of these. Only the operator tokens map to an
/// opcode; structural tokens reaching the emitter are a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    // ───────────────────────────── Arithmetic ───────────────────────────
    /// `+`
    Add,
    /// `-`, binary or unary
    Substract,
    /// `*`
    Multiply,
    /// `/`
    Divide,

    // ───────────────────────────── Comparison ───────────────────────────
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    SmallerThen,
    /// `>`
    GreaterThen,
    /// `<=`
    SmallerThenEquals,
    /// `>=`
    GreaterThenEquals,

    // ────────────────────────────── Logic ───────────────────────────────
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `!`
    Not,

    // ──────────────────────────── Structural ────────────────────────────
    OpenParenthesis,
    CloseParenthesis,
    Comma,
    DotComma,
    Identifier,
    Indexer,
    IndexOpen,
    IndexClose,
    Nop,
}

impl Token {
    /// Surface spelling of the token.
    pub fn symbol(self) -> &'static str {
        match self {
            Token::Add => "+",
            Token::Substract => "-",
            Token::Multiply => "*",
            Token::Divide => "/",
            Token::Equals => "=",
            Token::NotEquals => "!=",
            Token::SmallerThen => "<",
            Token::GreaterThen => ">",
            Token::SmallerThenEquals => "<=",
            Token::GreaterThenEquals => ">=",
            Token::And => "&",
            Token::Or => "|",
            Token::Xor => "^",
            Token::Not => "!",
            Token::OpenParenthesis => "(",
            Token::CloseParenthesis => ")",
            Token::Comma => ",",
            Token::DotComma => ";",
            Token::Identifier => "<identifier>",
            Token::Indexer => ".",
            Token::IndexOpen => "[",
            Token::IndexClose => "]",
            Token::Nop => "<nop>",
        }
    }

    /// Tokens that may appear in prefix position and flip the sign or truth
    /// of the operand that follows.
    pub fn is_negation(self) -> bool {
        matches!(self, Token::Substract | Token::Not)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
