//! Recursive-descent parser: turns a token stream into a `StateMachine`
//! plus the `Arena` backing its expression trees, registering guard
//! subscriptions with the variable server as each transition is
//! reduced.
//!
//! Concrete surface syntax (the retrieval pack carries no language
//! reference for this DSL, so this is this implementation's own
//! choice, recorded in `DESIGN.md`):
//!
//! ```text
//! statemachine {
//!     name: "furnace";
//!     description: "basic two-state controller";
//!
//!     state init {
//!         entry {
//!             int x;
//!             x = 1;
//!         }
//!         transition {
//!             on: timer 1;
//!         }
//!         exit { }
//!     }
//! }
//! ```

use std::sync::mpsc::Sender;

use log::warn;

use crate::action::LocalTable;
use crate::ast::{Arena, AssignOp, BinOp, CastKind, Expr, NodeId, Place, UnOp};
use crate::error::ParseError;
use crate::event::Event;
use crate::runtime::{ActionBlock, State, StateMachine, Transition};
use crate::token::{Token, TokenKind};
use crate::value::Value;
use crate::varserver::{VarHandle, VariableServer};

/// Parses `tokens` into a state machine. Errors are collected rather
/// than aborting: the machine is returned regardless so the runtime can
/// still start if the graph is well-formed enough (e.g. `init` parsed
/// correctly even though a later state has a typo).
pub fn parse(
    tokens: Vec<Token>,
    arena: &mut Arena,
    vars: &mut dyn VariableServer,
    tx: Sender<Event>,
) -> (StateMachine, Vec<ParseError>) {
    let mut parser = Parser {
        tokens,
        pos: 0,
        arena,
        vars,
        tx,
        current_locals: None,
        errors: Vec::new(),
    };
    let machine = parser.parse_program();
    (machine, parser.errors)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    arena: &'a mut Arena,
    vars: &'a mut dyn VariableServer,
    tx: Sender<Event>,
    current_locals: Option<LocalTable>,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always ends in Eof"))
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn error_expected(&mut self, what: &str) {
        self.errors.push(ParseError::Expected {
            line: self.peek().line,
            expected: what.into(),
            found: format!("{:?}", self.peek_kind()),
        });
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            self.error_expected(what);
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> String {
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            name
        } else {
            self.error_expected(what);
            String::new()
        }
    }

    fn expect_string(&mut self, what: &str) -> String {
        if let TokenKind::StringLit(s) = self.peek_kind().clone() {
            self.advance();
            s
        } else {
            self.error_expected(what);
            String::new()
        }
    }

    fn expect_int(&mut self, what: &str) -> i32 {
        if let TokenKind::IntLit(v) = self.peek_kind().clone() {
            self.advance();
            v
        } else {
            self.error_expected(what);
            0
        }
    }

    fn parse_program(&mut self) -> StateMachine {
        self.expect_kind(TokenKind::StateMachine, "'statemachine'");
        self.expect_kind(TokenKind::LBrace, "'{'");

        let mut name = String::new();
        let mut description = String::new();
        loop {
            match self.peek_kind() {
                TokenKind::Name => {
                    self.advance();
                    self.expect_kind(TokenKind::Colon, "':'");
                    name = self.expect_string("a string literal");
                    self.expect_kind(TokenKind::Semicolon, "';'");
                }
                TokenKind::Description => {
                    self.advance();
                    self.expect_kind(TokenKind::Colon, "':'");
                    description = self.expect_string("a string literal");
                    self.expect_kind(TokenKind::Semicolon, "';'");
                }
                _ => break,
            }
        }

        let mut machine = StateMachine::new(name, description, false);
        while self.check(&TokenKind::State) {
            let state = self.parse_state();
            machine.push_state(state);
        }
        self.expect_kind(TokenKind::RBrace, "'}'");
        machine
    }

    fn parse_state(&mut self) -> State {
        self.expect_kind(TokenKind::State, "'state'");
        let line = self.peek().line;
        let id = self.expect_ident("a state name");
        self.expect_kind(TokenKind::LBrace, "'{'");

        let entry = if self.check(&TokenKind::Entry) {
            self.advance();
            self.expect_kind(TokenKind::LBrace, "'{'");
            let block = self.parse_block_contents();
            self.expect_kind(TokenKind::RBrace, "'}'");
            Some(block)
        } else {
            self.errors.push(ParseError::Message {
                line,
                message: format!("state {id:?} is missing its 'entry' block"),
            });
            None
        };

        let transitions = if self.check(&TokenKind::Transition) {
            self.advance();
            self.expect_kind(TokenKind::LBrace, "'{'");
            let mut transitions = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                transitions.push(self.parse_transition());
            }
            self.expect_kind(TokenKind::RBrace, "'}'");
            transitions
        } else {
            self.errors.push(ParseError::Message {
                line,
                message: format!("state {id:?} is missing its 'transition' block"),
            });
            Vec::new()
        };

        let exit = if self.check(&TokenKind::Exit) {
            self.advance();
            self.expect_kind(TokenKind::LBrace, "'{'");
            let block = self.parse_block_contents();
            self.expect_kind(TokenKind::RBrace, "'}'");
            Some(block)
        } else {
            self.errors.push(ParseError::Message {
                line,
                message: format!("state {id:?} is missing its 'exit' block"),
            });
            None
        };

        self.expect_kind(TokenKind::RBrace, "'}'");
        State {
            id,
            entry,
            exit,
            transitions,
        }
    }

    fn parse_transition(&mut self) -> Transition {
        let target_state_name = self.expect_ident("a transition target state name");
        self.expect_kind(TokenKind::Colon, "':'");
        self.current_locals = None;
        let guard = self.parse_expr();
        self.expect_kind(TokenKind::Semicolon, "';'");
        self.register_guard_subscriptions(guard);
        Transition {
            target_state_name,
            guard,
        }
    }

    fn register_guard_subscriptions(&mut self, node: NodeId) {
        let mut handles = Vec::new();
        collect_sysvar_handles(self.arena, node, &mut handles);
        for handle in handles {
            if let Err(e) = self.vars.subscribe_modifications(VarHandle(handle), self.tx.clone()) {
                warn!("failed to subscribe to variable handle {handle}: {e}");
            }
        }
    }

    fn parse_block_contents(&mut self) -> ActionBlock {
        let mut locals = LocalTable::default();
        loop {
            let is_type = matches!(
                self.peek_kind(),
                TokenKind::TypeFloat | TokenKind::TypeInt | TokenKind::TypeShort | TokenKind::TypeString
            );
            if !is_type {
                break;
            }
            self.advance();
            let name = self.expect_ident("a declared variable name");
            self.expect_kind(TokenKind::Semicolon, "';'");
            locals.declare(name);
        }

        self.current_locals = Some(locals);
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt());
        }
        let locals = self.current_locals.take().unwrap();
        let body = self.arena.alloc(Expr::Block(stmts));
        ActionBlock { locals, body }
    }

    fn parse_stmt(&mut self) -> NodeId {
        match self.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::LBrace => self.parse_block_stmt(),
            _ => {
                let expr = self.parse_expr();
                self.expect_kind(TokenKind::Semicolon, "';'");
                expr
            }
        }
    }

    fn parse_block_stmt(&mut self) -> NodeId {
        self.expect_kind(TokenKind::LBrace, "'{'");
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt());
        }
        self.expect_kind(TokenKind::RBrace, "'}'");
        self.arena.alloc(Expr::Block(stmts))
    }

    /// Dangling `else` binds to the nearest `if`: the recursive call for
    /// the then-branch already consumed its own `else` (if any) before
    /// this frame checks for one of its own.
    fn parse_if(&mut self) -> NodeId {
        self.advance(); // 'if'
        self.expect_kind(TokenKind::LParen, "'('");
        let cond = self.parse_expr();
        self.expect_kind(TokenKind::RParen, "')'");
        let then_branch = self.parse_stmt();
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_stmt())
        } else {
            None
        };
        self.arena.alloc(Expr::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_expr(&mut self) -> NodeId {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> NodeId {
        let left = self.parse_or();
        let op = match self.peek_kind() {
            TokenKind::Assign => Some(AssignOp::Set),
            TokenKind::PlusAssign => Some(AssignOp::AddSet),
            TokenKind::MinusAssign => Some(AssignOp::SubSet),
            TokenKind::StarAssign => Some(AssignOp::MulSet),
            TokenKind::SlashAssign => Some(AssignOp::DivSet),
            TokenKind::AmpAssign => Some(AssignOp::AndSet),
            TokenKind::PipeAssign => Some(AssignOp::OrSet),
            TokenKind::CaretAssign => Some(AssignOp::XorSet),
            _ => None,
        };
        let Some(op) = op else { return left };
        let line = self.advance().line;
        if !matches!(self.arena.get(left), Expr::Place(_)) {
            self.errors.push(ParseError::Message {
                line,
                message: "left-hand side of assignment is not an lvalue".into(),
            });
        }
        let value = self.parse_assignment();
        self.arena.alloc(Expr::Assign {
            op,
            target: left,
            value,
            line,
        })
    }

    fn parse_or(&mut self) -> NodeId {
        let mut left = self.parse_and();
        while self.check(&TokenKind::OrOr) {
            let line = self.advance().line;
            let right = self.parse_and();
            left = self.arena.alloc(Expr::Binary { op: BinOp::Or, left, right, line });
        }
        left
    }

    fn parse_and(&mut self) -> NodeId {
        let mut left = self.parse_bor();
        while self.check(&TokenKind::AndAnd) {
            let line = self.advance().line;
            let right = self.parse_bor();
            left = self.arena.alloc(Expr::Binary { op: BinOp::And, left, right, line });
        }
        left
    }

    fn parse_bor(&mut self) -> NodeId {
        let mut left = self.parse_bxor();
        while self.check(&TokenKind::Pipe) {
            let line = self.advance().line;
            let right = self.parse_bxor();
            left = self.arena.alloc(Expr::Binary { op: BinOp::BOr, left, right, line });
        }
        left
    }

    fn parse_bxor(&mut self) -> NodeId {
        let mut left = self.parse_band();
        while self.check(&TokenKind::Caret) {
            let line = self.advance().line;
            let right = self.parse_band();
            left = self.arena.alloc(Expr::Binary { op: BinOp::Xor, left, right, line });
        }
        left
    }

    fn parse_band(&mut self) -> NodeId {
        let mut left = self.parse_equality();
        while self.check(&TokenKind::Amp) {
            let line = self.advance().line;
            let right = self.parse_equality();
            left = self.arena.alloc(Expr::Binary { op: BinOp::BAnd, left, right, line });
        }
        left
    }

    fn parse_equality(&mut self) -> NodeId {
        let mut left = self.parse_relational();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Neq => BinOp::Neq,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_relational();
            left = self.arena.alloc(Expr::Binary { op, left, right, line });
        }
        left
    }

    fn parse_relational(&mut self) -> NodeId {
        let mut left = self.parse_shift();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Lte => BinOp::Lte,
                TokenKind::Gte => BinOp::Gte,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_shift();
            left = self.arena.alloc(Expr::Binary { op, left, right, line });
        }
        left
    }

    fn parse_shift(&mut self) -> NodeId {
        let mut left = self.parse_additive();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_additive();
            left = self.arena.alloc(Expr::Binary { op, left, right, line });
        }
        left
    }

    fn parse_additive(&mut self) -> NodeId {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_multiplicative();
            left = self.arena.alloc(Expr::Binary { op, left, right, line });
        }
        left
    }

    fn parse_multiplicative(&mut self) -> NodeId {
        let mut left = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_unary();
            left = self.arena.alloc(Expr::Binary { op, left, right, line });
        }
        left
    }

    fn peek_cast_kind(&self) -> Option<CastKind> {
        let ty = self.tokens.get(self.pos + 1)?;
        let close = self.tokens.get(self.pos + 2)?;
        if !matches!(close.kind, TokenKind::RParen) {
            return None;
        }
        match ty.kind {
            TokenKind::TypeFloat => Some(CastKind::ToFloat),
            TokenKind::TypeInt => Some(CastKind::ToInt),
            TokenKind::TypeShort => Some(CastKind::ToShort),
            TokenKind::TypeString => Some(CastKind::ToString),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> NodeId {
        if self.check(&TokenKind::LParen) {
            if let Some(kind) = self.peek_cast_kind() {
                let line = self.peek().line;
                self.advance(); // '('
                self.advance(); // type keyword
                self.expect_kind(TokenKind::RParen, "')'");
                let operand = self.parse_unary();
                return self.arena.alloc(Expr::Cast { kind, operand, line });
            }
        }
        match self.peek_kind() {
            TokenKind::Minus => {
                let line = self.advance().line;
                let operand = self.parse_unary();
                self.arena.alloc(Expr::Unary { op: UnOp::Neg, operand, line })
            }
            TokenKind::Not => {
                let line = self.advance().line;
                let operand = self.parse_unary();
                self.arena.alloc(Expr::Unary { op: UnOp::Not, operand, line })
            }
            TokenKind::Inc => {
                let line = self.advance().line;
                let operand = self.parse_unary();
                self.arena.alloc(Expr::Unary { op: UnOp::Inc, operand, line })
            }
            TokenKind::Dec => {
                let line = self.advance().line;
                let operand = self.parse_unary();
                self.arena.alloc(Expr::Unary { op: UnOp::Dec, operand, line })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut node = self.parse_primary();
        loop {
            match self.peek_kind() {
                TokenKind::Inc => {
                    let line = self.advance().line;
                    node = self.arena.alloc(Expr::Unary { op: UnOp::Inc, operand: node, line });
                }
                TokenKind::Dec => {
                    let line = self.advance().line;
                    node = self.arena.alloc(Expr::Unary { op: UnOp::Dec, operand: node, line });
                }
                _ => break,
            }
        }
        node
    }

    fn parse_primary(&mut self) -> NodeId {
        let line = self.peek().line;
        match self.peek_kind().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                self.arena.alloc(Expr::Literal(Value::Int(v)))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                self.arena.alloc(Expr::Literal(Value::Float(v)))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                self.arena.alloc(Expr::Literal(Value::Str(s)))
            }
            TokenKind::ShellBlock(s) => {
                self.advance();
                self.arena.alloc(Expr::Shell { script: s, line })
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.resolve_ident(name, line)
            }
            TokenKind::VarPath(path) => {
                self.advance();
                self.resolve_sysvar(path, line)
            }
            TokenKind::Timer => self.parse_timer_literal(),
            TokenKind::Create => self.parse_create(),
            TokenKind::Delete => self.parse_delete(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect_kind(TokenKind::RParen, "')'");
                inner
            }
            _ => {
                self.error_expected("an expression");
                self.advance();
                self.arena.alloc(Expr::Literal(Value::Int(0)))
            }
        }
    }

    /// `timer N` desugars immediately to `N == ACTIVE_TIMER`, keeping the
    /// `Timer` literal node in the tree for the guard matcher while
    /// evaluation reads naturally as a comparison.
    fn parse_timer_literal(&mut self) -> NodeId {
        let line = self.advance().line; // 'timer'
        let n = self.expect_int("a timer id") as u8;
        let timer = self.arena.alloc(Expr::Timer(n));
        let active = self.arena.alloc(Expr::ActiveTimer);
        self.arena.alloc(Expr::Binary {
            op: BinOp::Eq,
            left: timer,
            right: active,
            line,
        })
    }

    fn parse_create(&mut self) -> NodeId {
        let line = self.advance().line; // 'create'
        match self.peek_kind() {
            TokenKind::Timer => {
                self.advance();
                self.expect_kind(TokenKind::LParen, "'('");
                let id = self.parse_expr();
                self.expect_kind(TokenKind::Comma, "','");
                let ms = self.parse_expr();
                self.expect_kind(TokenKind::RParen, "')'");
                self.arena.alloc(Expr::CreateTimer { id, ms, line })
            }
            TokenKind::Tick => {
                self.advance();
                self.expect_kind(TokenKind::LParen, "'('");
                let id = self.parse_expr();
                self.expect_kind(TokenKind::Comma, "','");
                let ms = self.parse_expr();
                self.expect_kind(TokenKind::RParen, "')'");
                self.arena.alloc(Expr::CreateTick { id, ms, line })
            }
            _ => {
                self.error_expected("'timer' or 'tick' after 'create'");
                self.arena.alloc(Expr::Literal(Value::Int(-1)))
            }
        }
    }

    fn parse_delete(&mut self) -> NodeId {
        let line = self.advance().line; // 'delete'
        self.expect_kind(TokenKind::Timer, "'timer' after 'delete'");
        self.expect_kind(TokenKind::LParen, "'('");
        let id = self.parse_expr();
        self.expect_kind(TokenKind::RParen, "')'");
        self.arena.alloc(Expr::DeleteTimer { id, line })
    }

    fn resolve_ident(&mut self, name: String, line: u32) -> NodeId {
        match self.current_locals.as_mut() {
            Some(locals) => {
                if !locals.is_declared(&name) {
                    self.errors.push(ParseError::Message {
                        line,
                        message: format!("undeclared local variable {name:?}"),
                    });
                    locals.declare(name.clone());
                }
            }
            None => {
                self.errors.push(ParseError::Message {
                    line,
                    message: format!("local variable {name:?} is not valid in a guard expression"),
                });
            }
        }
        self.arena.alloc(Expr::Place(Place::Local(name)))
    }

    fn resolve_sysvar(&mut self, path: String, line: u32) -> NodeId {
        let handle = self.vars.find_by_name(&path).map(|h| h.0);
        if handle.is_none() {
            warn!("line {line}: system variable {path:?} not found");
        }
        self.arena.alloc(Expr::Place(Place::SysVar { path, handle }))
    }
}

fn collect_sysvar_handles(arena: &Arena, node: NodeId, out: &mut Vec<u32>) {
    match arena.get(node) {
        Expr::Place(Place::SysVar { handle: Some(h), .. }) => out.push(*h),
        Expr::Binary { left, right, .. } => {
            collect_sysvar_handles(arena, *left, out);
            collect_sysvar_handles(arena, *right, out);
        }
        Expr::Unary { operand, .. } => collect_sysvar_handles(arena, *operand, out),
        Expr::Assign { target, value, .. } => {
            collect_sysvar_handles(arena, *target, out);
            collect_sysvar_handles(arena, *value, out);
        }
        Expr::Cast { operand, .. } => collect_sysvar_handles(arena, *operand, out),
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_sysvar_handles(arena, *cond, out);
            collect_sysvar_handles(arena, *then_branch, out);
            if let Some(e) = else_branch {
                collect_sysvar_handles(arena, *e, out);
            }
        }
        Expr::Block(stmts) => {
            for s in stmts {
                collect_sysvar_handles(arena, *s, out);
            }
        }
        Expr::CreateTimer { id, ms, .. } | Expr::CreateTick { id, ms, .. } => {
            collect_sysvar_handles(arena, *id, out);
            collect_sysvar_handles(arena, *ms, out);
        }
        Expr::DeleteTimer { id, .. } => collect_sysvar_handles(arena, *id, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::varserver::InMemoryVariableServer;
    use std::sync::mpsc;

    fn parse_src(src: &str, vars: &mut dyn VariableServer) -> (StateMachine, Arena, Vec<ParseError>) {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let mut arena = Arena::new();
        let (tx, _rx) = mpsc::channel();
        let (machine, errors) = parse(tokens, &mut arena, vars, tx);
        (machine, arena, errors)
    }

    #[test]
    fn minimal_machine_with_init_and_timer_transition() {
        let src = r#"
            statemachine {
                name: "toggle";
                description: "minimal example";
                state init {
                    entry { }
                    transition {
                        on: timer 1;
                    }
                    exit { }
                }
                state on {
                    entry { }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        assert_eq!(machine.name, "toggle");
        assert!(machine.by_id.contains_key("init"));
        assert!(machine.by_id.contains_key("on"));
        assert_eq!(machine.states[*machine.by_id.get("init").unwrap()].transitions.len(), 1);
    }

    #[test]
    fn declared_locals_assignment_round_trips() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry {
                        int x;
                        x = 5;
                    }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (_machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    }

    #[test]
    fn undeclared_local_is_a_parse_error() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry {
                        y = 5;
                    }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (_machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.iter().any(|e| matches!(e, ParseError::Message { message, .. } if message.contains("undeclared"))));
    }

    #[test]
    fn missing_exit_block_is_tolerated_and_recorded() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry { }
                    transition { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.iter().any(|e| matches!(e, ParseError::Message { message, .. } if message.contains("'exit'"))));
        let init = &machine.states[*machine.by_id.get("init").unwrap()];
        assert!(init.exit.is_none());
    }

    #[test]
    fn guard_referencing_sysvar_registers_a_subscription() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry { }
                    transition {
                        on: /sys/test/a == 1;
                    }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let handle = vars.declare("/sys/test/a", Value::Int(0));
        let tokens = Lexer::new(src).tokenize().unwrap();
        let mut arena = Arena::new();
        let (tx, rx) = mpsc::channel();
        let (_machine, errors) = parse(tokens, &mut arena, &mut vars, tx);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        vars.set(handle, Value::Int(1)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::VariableModified { handle: handle.0 });
    }

    #[test]
    fn dangling_else_binds_to_the_nearest_if() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry {
                        int a;
                        int b;
                        a = 0;
                        b = 0;
                        if (1)
                            if (0)
                                a = 1;
                            else
                                b = 1;
                    }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (_machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    }

    #[test]
    fn create_and_delete_timer_calls_parse() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry {
                        create timer(1, 1000);
                        create tick(2, 500);
                        delete timer(1);
                    }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (_machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    }

    #[test]
    fn cast_expression_parses() {
        let src = r#"
            statemachine {
                name: "n";
                description: "d";
                state init {
                    entry {
                        float f;
                        int i;
                        i = 3;
                        f = (float) i;
                    }
                    transition { }
                    exit { }
                }
            }
        "#;
        let mut vars = InMemoryVariableServer::new();
        let (_machine, _arena, errors) = parse_src(src, &mut vars);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    }
}
