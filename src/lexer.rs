use std::rc::Rc;

use thiserror::Error;

use crate::token::{Keyword, Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("invalid character '{character}'")]
    InvalidCharacter { character: char, span: Span },
}

impl LexError {
    pub fn span(&self) -> &Span {
        match self {
            Self::InvalidCharacter { span, .. } => span,
        }
    }
}

pub type LexResult<T> = Result<T, LexError>;

/// Read-only byte source with 1-based line/column tracking.
///
/// `peek` yields the `0` byte at end of input; the lexer uses that as its
/// EOF marker, which is safe because `0` can never begin a token.
pub struct CharStream {
    source: Vec<u8>,
    pos: usize,
    line: usize,
    col: usize,
}

impl CharStream {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.as_bytes().to_vec(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn peek(&self) -> u8 {
        self.source.get(self.pos).copied().unwrap_or(0)
    }

    pub fn next(&mut self) -> u8 {
        let ch = self.peek();
        if ch == 0 {
            return 0;
        }
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    pub fn eof(&self) -> bool {
        self.peek() == 0
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

/// Tokenizer with single-token lookahead.
///
/// EOF is "peek returns `None`". Whitespace and `#` line comments are
/// skipped between tokens.
pub struct Lexer {
    input: CharStream,
    file: Rc<str>,
    lookahead: Option<Token>,
}

fn is_digit(ch: u8) -> bool {
    ch.is_ascii_digit()
}

fn is_id_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

// `? ! - < > =` continue an identifier, so `empty?` and `to-upper` are
// single tokens; whitespace is the only separator.
fn is_id(ch: u8) -> bool {
    is_id_start(ch) || is_digit(ch) || b"?!-<>=".contains(&ch)
}

fn is_op_char(ch: u8) -> bool {
    b"+-*/%=&|<>!".contains(&ch)
}

fn is_punc(ch: u8) -> bool {
    b",;(){}[].:".contains(&ch)
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\r' | b'\t' | b'\n')
}

impl Lexer {
    pub fn new(source: &str, file: &str) -> Self {
        Self {
            input: CharStream::new(source),
            file: Rc::from(file),
            lookahead: None,
        }
    }

    pub fn peek(&mut self) -> LexResult<Option<&Token>> {
        if self.lookahead.is_none() {
            self.lookahead = self.read_next()?;
        }
        Ok(self.lookahead.as_ref())
    }

    pub fn next(&mut self) -> LexResult<Option<Token>> {
        match self.lookahead.take() {
            Some(token) => Ok(Some(token)),
            None => self.read_next(),
        }
    }

    pub fn eof(&mut self) -> LexResult<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Zero-length span at the current read position, for end-of-input
    /// diagnostics.
    pub fn here(&self) -> Span {
        Span::new(
            Rc::clone(&self.file),
            self.input.line(),
            self.input.col(),
            0,
        )
    }

    fn read_next(&mut self) -> LexResult<Option<Token>> {
        loop {
            self.read_while(is_whitespace);
            if self.input.eof() {
                return Ok(None);
            }
            let ch = self.input.peek();
            if ch == b'#' {
                self.skip_comment();
                continue;
            }
            let token = if ch == b'"' {
                self.read_string()
            } else if is_digit(ch) {
                self.read_number()
            } else if is_id_start(ch) {
                self.read_ident()
            } else if is_punc(ch) {
                let line = self.input.line();
                self.input.next();
                Token::new(TokenKind::Punc(ch as char), self.span_back(line, 1))
            } else if is_op_char(ch) {
                let line = self.input.line();
                let (op, len) = self.read_while(is_op_char);
                Token::new(TokenKind::Op(op), self.span_back(line, len))
            } else {
                return Err(LexError::InvalidCharacter {
                    character: ch as char,
                    span: self.here(),
                });
            };
            return Ok(Some(token));
        }
    }

    /// Span for a lexeme of `len` bytes that ends at the current position.
    fn span_back(&self, line: usize, len: usize) -> Span {
        Span::new(
            Rc::clone(&self.file),
            line,
            self.input.col().saturating_sub(len),
            len,
        )
    }

    fn read_while<P>(&mut self, keep: P) -> (String, usize)
    where
        P: Fn(u8) -> bool,
    {
        let mut text = String::new();
        while !self.input.eof() && keep(self.input.peek()) {
            text.push(self.input.next() as char);
        }
        let len = text.len();
        (text, len)
    }

    fn read_number(&mut self) -> Token {
        let line = self.input.line();
        // Permissive: any run of digits and dots. A literal with more than
        // one dot fails number decoding at evaluation time.
        let (text, len) = self.read_while(|ch| is_digit(ch) || ch == b'.');
        Token::new(TokenKind::Num(text), self.span_back(line, len))
    }

    fn read_ident(&mut self) -> Token {
        let line = self.input.line();
        let (text, len) = self.read_while(is_id);
        let span = self.span_back(line, len);
        match Keyword::from_ident(&text) {
            Some(kw) => Token::new(TokenKind::Kw(kw), span),
            None => Token::new(TokenKind::Var(text), span),
        }
    }

    fn read_string(&mut self) -> Token {
        let line = self.input.line();
        let start_col = self.input.col();
        let mut text = String::new();
        let mut escaped = false;
        self.input.next(); // opening quote
        let mut len = 1;
        while !self.input.eof() {
            let ch = self.input.next();
            len += 1;
            if escaped {
                // Backslash keeps the next byte verbatim.
                text.push(ch as char);
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == b'"' {
                break;
            } else {
                text.push(ch as char);
            }
        }
        // EOF before the closing quote is tolerated; the token carries
        // whatever was read.
        let span = Span::new(Rc::clone(&self.file), line, start_col, len);
        Token::new(TokenKind::Str(text), span)
    }

    fn skip_comment(&mut self) {
        self.read_while(|ch| ch != b'\n');
        self.input.next();
    }
}
