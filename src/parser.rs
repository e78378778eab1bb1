use thiserror::Error;

use crate::ast::{BinaryOp, Expr, ExprKind, Pair, UnaryOp};
use crate::lexer::{LexError, Lexer};
use crate::token::{Keyword, Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Expecting punctuation: '{expected}'")]
    ExpectedPunctuation { expected: char, span: Span },
    #[error("Expecting keyword: '{expected}'")]
    ExpectedKeyword { expected: &'static str, span: Span },
    #[error("Expecting variable name, but got: '{found}'")]
    ExpectedVarName { found: String, span: Span },
    #[error("Unexpected token: '{found}'")]
    UnexpectedToken { found: String, span: Span },
    #[error("Unexpected end of input")]
    UnexpectedEof { span: Span },
    #[error("Expecting 'else' after 'elif'")]
    MissingElse { span: Span },
    #[error("table key must be a string literal")]
    NonStringKey { span: Span },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            Self::Lex(inner) => inner.span(),
            Self::ExpectedPunctuation { span, .. }
            | Self::ExpectedKeyword { span, .. }
            | Self::ExpectedVarName { span, .. }
            | Self::UnexpectedToken { span, .. }
            | Self::UnexpectedEof { span }
            | Self::MissingElse { span }
            | Self::NonStringKey { span } => span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

fn precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "=" => 1,
        "||" => 2,
        "&&" => 3,
        "<" | ">" | "<=" | ">=" | "==" | "!=" => 7,
        "+" | "-" => 10,
        "*" | "/" | "%" => 20,
        _ => return None,
    };
    Some(prec)
}

/// Recursive-descent parser with precedence climbing for infix operators.
///
/// Consumes the lexer's token stream with single-token lookahead and builds
/// spanned [`Expr`] trees.
pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self { lexer }
    }

    /// Zero or more expressions up to EOF, assembled into a `Block`.
    pub fn parse_program(mut self) -> ParseResult<Expr> {
        let span = self.lexer.here();
        let mut prog = Vec::new();
        while !self.lexer.eof()? {
            prog.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Block(prog), span))
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        let atom = self.parse_atom()?;
        let expr = self.maybe_binary(atom, 0)?;
        self.maybe_postfix(expr)
    }

    fn maybe_binary(&mut self, mut left: Expr, min_prec: u8) -> ParseResult<Expr> {
        while let Some((op, span)) = self.peek_op()? {
            let Some(prec) = precedence(&op) else {
                break;
            };
            if prec <= min_prec {
                break;
            }
            self.lexer.next()?;
            let atom = self.parse_atom()?;
            // Assignment is right-associative; everything else associates
            // left by climbing with its own precedence as the floor.
            let floor = if op == "=" { prec - 1 } else { prec };
            let right = self.maybe_binary(atom, floor)?;
            let kind = match BinaryOp::from_text(&op) {
                _ if op == "=" => ExprKind::Assign {
                    target: Box::new(left),
                    value: Box::new(right),
                },
                Some(binary_op) => ExprKind::Binary {
                    op: binary_op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                None => return Err(ParseError::UnexpectedToken { found: op, span }),
            };
            left = Expr::new(kind, span);
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_atom_inner()?;
        self.maybe_postfix(expr)
    }

    fn parse_atom_inner(&mut self) -> ParseResult<Expr> {
        if self.peek_is_punc('(')? {
            self.lexer.next()?;
            let expr = self.parse_expression()?;
            self.skip_punc(')')?;
            return Ok(expr);
        }
        if self.peek_is_punc('{')? {
            return self.parse_block();
        }
        if self.peek_is_kw(Keyword::If)? {
            return self.parse_if();
        }
        if self.peek_is_kw(Keyword::While)? {
            return self.parse_while();
        }
        if self.peek_is_kw(Keyword::True)? || self.peek_is_kw(Keyword::False)? {
            return self.parse_bool();
        }
        if self.peek_is_kw(Keyword::Fun)? {
            let span = self.next_span()?;
            return self.parse_function_decl(span);
        }
        if self.peek_is_kw(Keyword::Array)? {
            return self.parse_array();
        }
        if self.peek_is_kw(Keyword::Table)? {
            return self.parse_table();
        }
        if self.peek_is_kw(Keyword::Import)? {
            return self.parse_import();
        }
        if self.peek_is_kw(Keyword::Not)? {
            let span = self.next_span()?;
            let operand = self.parse_atom()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if self.peek_is_kw(Keyword::Return)? {
            return self.parse_return();
        }
        if self.peek_is_kw(Keyword::Break)? {
            let span = self.next_span()?;
            return Ok(Expr::new(ExprKind::Break, span));
        }
        if self.peek_is_kw(Keyword::Continue)? {
            let span = self.next_span()?;
            return Ok(Expr::new(ExprKind::Continue, span));
        }

        let token = self.next_token()?;
        match token.kind {
            TokenKind::Var(name) => Ok(Expr::new(ExprKind::Var(name), token.span)),
            TokenKind::Num(text) => Ok(Expr::new(ExprKind::Num(text), token.span)),
            TokenKind::Str(text) => Ok(Expr::new(ExprKind::Str(text), token.span)),
            kind => Err(ParseError::UnexpectedToken {
                found: kind.text(),
                span: token.span,
            }),
        }
    }

    /// Trailing call, subscript, and field-access postfixes, applied as long
    /// as one follows.
    fn maybe_postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            if self.peek_is_punc('(')? {
                let span = self.peek_span()?;
                let args = self.parse_delimited('(', ')', ',', Self::parse_expression)?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.peek_is_punc('[')? {
                let span = self.peek_span()?;
                self.skip_punc('[')?;
                let index = self.parse_expression()?;
                self.skip_punc(']')?;
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.peek_is_punc('.')? {
                let span = self.peek_span()?;
                self.skip_punc('.')?;
                let (name, name_span) = self.parse_varname()?;
                let index = Expr::new(ExprKind::Str(name), name_span);
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        let cond = self.parse_expression()?;
        if !self.peek_is_punc('{')? {
            self.skip_kw(Keyword::Then)?;
        }
        let then_branch = self.parse_expression()?;

        let mut else_branch = None;
        if self.peek_is_kw(Keyword::Elif)? {
            // Each elif becomes a synthetic `If` without an else; the chain
            // lives in this if's else slot, closed by the mandatory `else`.
            let mut chain = Vec::new();
            let mut last_elif_span = span.clone();
            while self.peek_is_kw(Keyword::Elif)? {
                let elif_span = self.next_span()?;
                let elif_cond = self.parse_expression()?;
                if !self.peek_is_punc('{')? {
                    self.skip_kw(Keyword::Then)?;
                }
                let elif_then = self.parse_expression()?;
                last_elif_span = elif_span.clone();
                chain.push(Expr::new(
                    ExprKind::If {
                        cond: Box::new(elif_cond),
                        then_branch: Box::new(elif_then),
                        else_branch: None,
                    },
                    elif_span,
                ));
            }
            if self.peek_is_kw(Keyword::Else)? {
                self.lexer.next()?;
                chain.push(self.parse_expression()?);
            } else {
                return Err(ParseError::MissingElse {
                    span: last_elif_span,
                });
            }
            else_branch = Some(Box::new(Expr::new(
                ExprKind::Block(chain),
                span.clone(),
            )));
        } else if self.peek_is_kw(Keyword::Else)? {
            self.lexer.next()?;
            else_branch = Some(Box::new(self.parse_expression()?));
        }

        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        let cond = self.parse_expression()?;
        if !self.peek_is_punc('{')? {
            return Err(ParseError::ExpectedPunctuation {
                expected: '{',
                span: self.peek_span()?,
            });
        }
        let body = self.parse_block()?;
        Ok(Expr::new(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_function_decl(&mut self, span: Span) -> ParseResult<Expr> {
        let params = self.parse_delimited('(', ')', ',', |p| p.parse_varname().map(|(n, _)| n))?;
        let body = self.parse_expression()?;
        Ok(Expr::new(
            ExprKind::Fun {
                params,
                body: body.into(),
            },
            span,
        ))
    }

    fn parse_bool(&mut self) -> ParseResult<Expr> {
        let token = self.next_token()?;
        let value = matches!(token.kind, TokenKind::Kw(Keyword::True));
        Ok(Expr::new(ExprKind::Bool(value), token.span))
    }

    fn parse_array(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        let elements = self.parse_delimited('{', '}', ',', Self::parse_expression)?;
        Ok(Expr::new(ExprKind::Array(elements), span))
    }

    fn parse_table(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        let pairs = self.parse_delimited('{', '}', ',', Self::parse_pair)?;
        Ok(Expr::new(ExprKind::Table(pairs), span))
    }

    fn parse_pair(&mut self) -> ParseResult<Pair> {
        let key = self.parse_expression()?;
        let key = match key.kind {
            // Whitespace inside the key literal is not significant.
            ExprKind::Str(text) => Expr::new(
                ExprKind::Str(text.split_whitespace().collect()),
                key.span,
            ),
            _ => return Err(ParseError::NonStringKey { span: key.span }),
        };
        self.skip_punc(':')?;
        let value = self.parse_expression()?;
        Ok(Pair { key, value })
    }

    fn parse_return(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        // `return = expr` carries a payload; the `=` is a marker reusing the
        // assignment token, not an assignment.
        let payload = match self.peek_op()? {
            Some((op, _)) if op == "=" => {
                self.lexer.next()?;
                self.parse_expression()?
            }
            _ => Expr::new(ExprKind::Bool(false), span.clone()),
        };
        Ok(Expr::new(ExprKind::Return(Box::new(payload)), span))
    }

    fn parse_import(&mut self) -> ParseResult<Expr> {
        let span = self.next_span()?;
        let path = self.parse_expression()?;
        Ok(Expr::new(ExprKind::Import(Box::new(path)), span))
    }

    /// `{ e* }` — an empty block is the literal `false`, a singleton block
    /// is the sole expression itself.
    fn parse_block(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span()?;
        let mut block = self.parse_enclosed('{', '}', Self::parse_expression)?;
        match block.len() {
            0 => Ok(Expr::new(ExprKind::Bool(false), span)),
            1 => Ok(block.remove(0)),
            _ => Ok(Expr::new(ExprKind::Block(block), span)),
        }
    }

    fn parse_delimited<T>(
        &mut self,
        start: char,
        stop: char,
        separator: char,
        mut parse: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut items = Vec::new();
        let mut first = true;
        self.skip_punc(start)?;
        while !self.lexer.eof()? {
            if self.peek_is_punc(stop)? {
                break;
            }
            if !first {
                self.skip_punc(separator)?;
            }
            if self.peek_is_punc(stop)? {
                break;
            }
            items.push(parse(self)?);
            first = false;
        }
        self.skip_punc(stop)?;
        Ok(items)
    }

    fn parse_enclosed<T>(
        &mut self,
        start: char,
        stop: char,
        mut parse: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut items = Vec::new();
        self.skip_punc(start)?;
        while !self.lexer.eof()? {
            if self.peek_is_punc(stop)? {
                break;
            }
            items.push(parse(self)?);
        }
        self.skip_punc(stop)?;
        Ok(items)
    }

    fn parse_varname(&mut self) -> ParseResult<(String, Span)> {
        let token = self.next_token()?;
        match token.kind {
            TokenKind::Var(name) => Ok((name, token.span)),
            kind => Err(ParseError::ExpectedVarName {
                found: kind.text(),
                span: token.span,
            }),
        }
    }

    fn skip_punc(&mut self, expected: char) -> ParseResult<()> {
        if self.peek_is_punc(expected)? {
            self.lexer.next()?;
            Ok(())
        } else {
            Err(ParseError::ExpectedPunctuation {
                expected,
                span: self.peek_span()?,
            })
        }
    }

    fn skip_kw(&mut self, expected: Keyword) -> ParseResult<()> {
        if self.peek_is_kw(expected)? {
            self.lexer.next()?;
            Ok(())
        } else {
            Err(ParseError::ExpectedKeyword {
                expected: expected.text(),
                span: self.peek_span()?,
            })
        }
    }

    fn peek_is_punc(&mut self, ch: char) -> ParseResult<bool> {
        Ok(matches!(
            self.lexer.peek()?,
            Some(Token {
                kind: TokenKind::Punc(found),
                ..
            }) if *found == ch
        ))
    }

    fn peek_is_kw(&mut self, kw: Keyword) -> ParseResult<bool> {
        Ok(matches!(
            self.lexer.peek()?,
            Some(Token {
                kind: TokenKind::Kw(found),
                ..
            }) if *found == kw
        ))
    }

    fn peek_op(&mut self) -> ParseResult<Option<(String, Span)>> {
        match self.lexer.peek()? {
            Some(Token {
                kind: TokenKind::Op(op),
                span,
            }) => Ok(Some((op.clone(), span.clone()))),
            _ => Ok(None),
        }
    }

    fn peek_span(&mut self) -> ParseResult<Span> {
        match self.lexer.peek()? {
            Some(token) => Ok(token.span.clone()),
            None => Ok(self.lexer.here()),
        }
    }

    fn next_span(&mut self) -> ParseResult<Span> {
        self.next_token().map(|token| token.span)
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        let token = self.lexer.next()?;
        token.ok_or_else(|| ParseError::UnexpectedEof {
            span: self.lexer.here(),
        })
    }
}

/// Parse a full source string into a program `Block`.
pub fn parse_source(source: &str, file: &str) -> ParseResult<Expr> {
    Parser::new(Lexer::new(source, file)).parse_program()
}
