//! One small `enum` per subsystem, each carrying the source line where
//! that's meaningful. Every variant here corresponds to a diagnostic the
//! runtime logs rather than a panic.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },
    #[error("line {line}: unterminated shell block")]
    UnterminatedShellBlock { line: u32 },
    #[error("line {line}: invalid number literal {text:?}")]
    InvalidNumber { line: u32, text: String },
    #[error("line {line}: unexpected character {ch:?}")]
    UnexpectedChar { line: u32, ch: char },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error at line {line}: expected {expected}, found {found}")]
    Expected {
        line: u32,
        expected: String,
        found: String,
    },
    #[error("syntax error at line {line}: {message}")]
    Message { line: u32, message: String },
    #[error(transparent)]
    Lex(#[from] LexError),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("use of local variable {0:?} before it is assigned")]
    UseBeforeAssign(String),
    #[error("unknown local variable {0:?}")]
    UnknownLocal(String),
    #[error("system variable {0:?} has no valid handle")]
    UnboundSysVar(String),
    #[error("variable server error: {0}")]
    VarServer(#[from] VarServerError),
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),
    #[error("shell command failed to launch: {0}")]
    ShellSpawn(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum VarServerError {
    #[error("no variable named {0:?}")]
    NotFound(String),
    #[error("invalid variable handle")]
    InvalidHandle,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TimerError {
    #[error("timer id {0} is outside the valid range [1, 254]")]
    InvalidId(u8),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot find init state")]
    NoInitState,
    #[error("transition target {0:?} not found")]
    TargetMissing(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
