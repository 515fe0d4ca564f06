//! Tokenizer for the state-machine definition language.
//!
//! Single pass over the source bytes. Produces the full token stream up
//! front; the parser indexes into it. Line numbers are tracked through
//! comments and shell blocks so diagnostics always point at real source
//! lines.

use crate::error::LexError;
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(b) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
            });
        };

        if b == b'`' && self.peek_at(1) == Some(b'`') && self.peek_at(2) == Some(b'`') {
            return self.read_shell_block(line);
        }

        if b.is_ascii_digit() {
            return self.read_number(line);
        }

        if b == b'"' {
            return self.read_string(line);
        }

        if b == b'/' && self.peek_at(1).map(is_ident_start).unwrap_or(false) {
            return self.read_var_path(line);
        }

        if is_ident_start(b) {
            return self.read_ident_or_keyword(line);
        }

        self.read_operator(line)
    }

    fn read_shell_block(&mut self, line: u32) -> Result<Token, LexError> {
        self.advance();
        self.advance();
        self.advance();
        let start = self.pos;
        loop {
            if self.peek() == Some(b'`') && self.peek_at(1) == Some(b'`') && self.peek_at(2) == Some(b'`') {
                let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.advance();
                self.advance();
                self.advance();
                return Ok(Token {
                    kind: TokenKind::ShellBlock(text),
                    line,
                });
            }
            if self.advance().is_none() {
                return Err(LexError::UnterminatedShellBlock { line });
            }
        }
    }

    fn read_number(&mut self, line: u32) -> Result<Token, LexError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            while self.peek().map(|b| b.is_ascii_hexdigit()).unwrap_or(false) {
                self.advance();
            }
            let text = std::str::from_utf8(&self.bytes[start + 2..self.pos]).unwrap();
            let value = i32::from_str_radix(text, 16).map_err(|_| LexError::InvalidNumber {
                line,
                text: text.to_string(),
            })?;
            return Ok(Token {
                kind: TokenKind::IntLit(value),
                line,
            });
        }

        let mut is_float = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !is_float {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        if is_float {
            let value = text.parse::<f32>().map_err(|_| LexError::InvalidNumber {
                line,
                text: text.to_string(),
            })?;
            Ok(Token {
                kind: TokenKind::FloatLit(value),
                line,
            })
        } else {
            let value = text.parse::<i32>().map_err(|_| LexError::InvalidNumber {
                line,
                text: text.to_string(),
            })?;
            Ok(Token {
                kind: TokenKind::IntLit(value),
                line,
            })
        }
    }

    fn read_string(&mut self, line: u32) -> Result<Token, LexError> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(b'"') => {
                    return Ok(Token {
                        kind: TokenKind::StringLit(text),
                        line,
                    })
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => text.push('\n'),
                    Some(b't') => text.push('\t'),
                    Some(b'"') => text.push('"'),
                    Some(b'\\') => text.push('\\'),
                    Some(other) => text.push(other as char),
                    None => return Err(LexError::UnterminatedString { line }),
                },
                Some(b) => text.push(b as char),
                None => return Err(LexError::UnterminatedString { line }),
            }
        }
    }

    fn read_var_path(&mut self, line: u32) -> Result<Token, LexError> {
        let start = self.pos;
        self.advance(); // leading '/'
        loop {
            match self.peek() {
                Some(b) if is_ident_continue(b) || b == b'/' => {
                    self.advance();
                }
                _ => break,
            }
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        Ok(Token {
            kind: TokenKind::VarPath(text),
            line,
        })
    }

    fn read_ident_or_keyword(&mut self, line: u32) -> Result<Token, LexError> {
        let start = self.pos;
        while self.peek().map(is_ident_continue).unwrap_or(false) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let kind = match text {
            "statemachine" => TokenKind::StateMachine,
            "name" => TokenKind::Name,
            "description" => TokenKind::Description,
            "state" => TokenKind::State,
            "entry" => TokenKind::Entry,
            "exit" => TokenKind::Exit,
            "transition" => TokenKind::Transition,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "create" => TokenKind::Create,
            "delete" => TokenKind::Delete,
            "timer" => TokenKind::Timer,
            "tick" => TokenKind::Tick,
            "float" => TokenKind::TypeFloat,
            "int" => TokenKind::TypeInt,
            "short" => TokenKind::TypeShort,
            "string" => TokenKind::TypeString,
            _ => TokenKind::Ident(text.to_string()),
        };
        Ok(Token { kind, line })
    }

    fn read_operator(&mut self, line: u32) -> Result<Token, LexError> {
        let b = self.advance().unwrap();
        let two = |lex: &mut Self, second: u8, then: TokenKind, otherwise: TokenKind| {
            if lex.peek() == Some(second) {
                lex.advance();
                then
            } else {
                otherwise
            }
        };
        let kind = match b {
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b',' => TokenKind::Comma,
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.advance();
                    TokenKind::Inc
                } else {
                    two(self, b'=', TokenKind::PlusAssign, TokenKind::Plus)
                }
            }
            b'-' => {
                if self.peek() == Some(b'-') {
                    self.advance();
                    TokenKind::Dec
                } else {
                    two(self, b'=', TokenKind::MinusAssign, TokenKind::Minus)
                }
            }
            b'*' => two(self, b'=', TokenKind::StarAssign, TokenKind::Star),
            b'/' => two(self, b'=', TokenKind::SlashAssign, TokenKind::Slash),
            b'=' => two(self, b'=', TokenKind::Eq, TokenKind::Assign),
            b'!' => two(self, b'=', TokenKind::Neq, TokenKind::Not),
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.advance();
                    TokenKind::Shl
                } else {
                    two(self, b'=', TokenKind::Lte, TokenKind::Lt)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.advance();
                    TokenKind::Shr
                } else {
                    two(self, b'=', TokenKind::Gte, TokenKind::Gt)
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.advance();
                    TokenKind::AndAnd
                } else {
                    two(self, b'=', TokenKind::AmpAssign, TokenKind::Amp)
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.advance();
                    TokenKind::OrOr
                } else {
                    two(self, b'=', TokenKind::PipeAssign, TokenKind::Pipe)
                }
            }
            b'^' => two(self, b'=', TokenKind::CaretAssign, TokenKind::Caret),
            other => return Err(LexError::UnexpectedChar { line, ch: other as char }),
        };
        Ok(Token { kind, line })
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_keywords_and_braces() {
        let k = kinds("state init { }");
        assert_eq!(
            k,
            vec![
                TokenKind::State,
                TokenKind::Ident("init".into()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_var_path() {
        let k = kinds("/sys/alarm/armed");
        assert_eq!(k, vec![TokenKind::VarPath("/sys/alarm/armed".into()), TokenKind::Eof]);
    }

    #[test]
    fn lexes_hex_and_float_literals() {
        let k = kinds("0xFF 3.5 42");
        assert_eq!(
            k,
            vec![
                TokenKind::IntLit(255),
                TokenKind::FloatLit(3.5),
                TokenKind::IntLit(42),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_string_literal_with_escapes() {
        let k = kinds(r#""hi\n""#);
        assert_eq!(k, vec![TokenKind::StringLit("hi\n".into()), TokenKind::Eof]);
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let toks = Lexer::new("# comment\nstate").tokenize().unwrap();
        assert_eq!(toks[0].kind, TokenKind::State);
        assert_eq!(toks[0].line, 2);
    }

    #[test]
    fn lexes_shell_block_as_single_token_and_tracks_lines_inside() {
        let toks = Lexer::new("```\necho hi\n```\nstate").tokenize().unwrap();
        assert_eq!(toks[0].kind, TokenKind::ShellBlock("\necho hi\n".into()));
        assert_eq!(toks[1].line, 4);
    }

    #[test]
    fn lexes_assignment_family_and_shifts() {
        let k = kinds("+= -= *= /= &= |= ^= << >> && || == != <= >=");
        assert_eq!(
            k,
            vec![
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::AmpAssign,
                TokenKind::PipeAssign,
                TokenKind::CaretAssign,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Lte,
                TokenKind::Gte,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unterminated_shell_block_is_an_error() {
        assert!(matches!(
            Lexer::new("```\necho hi").tokenize(),
            Err(LexError::UnterminatedShellBlock { .. })
        ));
    }
}
