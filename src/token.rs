//! Token kinds produced by the lexer.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Reserved words
    StateMachine,
    Name,
    Description,
    State,
    Entry,
    Exit,
    Transition,
    If,
    Else,
    Create,
    Delete,
    Timer,
    Tick,
    TypeFloat,
    TypeInt,
    TypeShort,
    TypeString,

    // Literals & identifiers
    Ident(String),
    /// Slash-delimited variable-server path, e.g. `/sys/alarm/armed`.
    VarPath(String),
    IntLit(i32),
    FloatLit(f32),
    StringLit(String),
    /// Raw text between a pair of triple-backtick fences.
    ShellBlock(String),

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semicolon,
    Colon,
    Comma,

    // Operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    Inc,
    Dec,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    AndAnd,
    OrOr,
    Not,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}
