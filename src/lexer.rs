// Expression lexer
// One left-to-right scan with a single "open" token and a grouping stack,
// followed by a second pass that nests Group and Func children.

use chrono::FixedOffset;
use thiserror::Error;

use crate::operators;
use crate::path::{self, PathError};
use crate::token::{LiteralStyle, Token};
use crate::value_parser;
use crate::{functions, operators::SymbolMatchers};

/// Lexing failures. Each carries the character index it was detected at.
#[derive(Error, Debug)]
pub enum SyntaxError {
    #[error("unknown function \"{name}\" at index {index}")]
    UnknownFunction { name: String, index: usize },

    #[error("unmatched parenthesis at index {index}")]
    UnmatchedParen { index: usize },

    #[error("unterminated string literal starting at index {index}")]
    UnterminatedString { index: usize },

    #[error("unterminated property reference starting at index {index}")]
    UnterminatedPropertyRef { index: usize },

    #[error("unterminated comment starting at index {index}")]
    UnterminatedComment { index: usize },

    #[error("invalid property path at index {index}: {source}")]
    PropertyPath {
        index: usize,
        #[source]
        source: PathError,
    },
}

/// Lex `source` into a nested token tree. Naked literals are promoted with
/// `zone_offset` applied to offset-free date lexemes.
pub fn lex(source: &str, zone_offset: FixedOffset) -> Result<Vec<Token>, SyntaxError> {
    let flat = Scanner::new(source, zone_offset).scan()?;
    nest(flat)
}

/// The token currently absorbing characters.
enum Open {
    Literal {
        start: usize,
        buf: String,
        style: LiteralStyle,
    },
    PropertyRef {
        start: usize,
        buf: String,
    },
    Comment {
        start: usize,
        buf: String,
    },
}

/// What an unresolved `(` opened; disambiguates `)` and `,`.
#[derive(PartialEq, Eq)]
enum Paren {
    Group,
    Func,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    zone_offset: FixedOffset,
    matchers: std::sync::Arc<SymbolMatchers>,
    tokens: Vec<Token>,
    open: Option<Open>,
    stack: Vec<Paren>,
}

/// Longest operator symbol plus one boundary character.
const OPERATOR_WINDOW: usize = 16;

impl Scanner {
    fn new(source: &str, zone_offset: FixedOffset) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            zone_offset,
            matchers: operators::symbol_matchers(&[]),
            tokens: Vec::new(),
            open: None,
            stack: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn scan(mut self) -> Result<Vec<Token>, SyntaxError> {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            match self.open.take() {
                Some(Open::PropertyRef { start, buf }) => {
                    self.scan_property_ref(ch, start, buf)?;
                }
                Some(Open::Comment { start, buf }) => {
                    self.scan_comment(ch, start, buf);
                }
                Some(Open::Literal { start, buf, style }) => {
                    self.scan_literal(ch, start, buf, style)?;
                }
                None => {
                    self.scan_free(ch)?;
                }
            }
        }

        match self.open.take() {
            Some(Open::Literal {
                start,
                buf,
                style: LiteralStyle::Naked,
            }) => {
                self.close_literal(start, buf, LiteralStyle::Naked);
            }
            Some(Open::Literal { start, .. }) => {
                return Err(SyntaxError::UnterminatedString { index: start });
            }
            Some(Open::PropertyRef { start, .. }) => {
                return Err(SyntaxError::UnterminatedPropertyRef { index: start });
            }
            Some(Open::Comment { start, .. }) => {
                return Err(SyntaxError::UnterminatedComment { index: start });
            }
            None => {}
        }

        if !self.stack.is_empty() {
            return Err(SyntaxError::UnmatchedParen {
                index: self.chars.len(),
            });
        }

        Ok(self.tokens)
    }

    fn scan_property_ref(
        &mut self,
        ch: char,
        start: usize,
        mut buf: String,
    ) -> Result<(), SyntaxError> {
        if ch == '\\' && self.peek(1) == Some('}') {
            buf.push('}');
            self.pos += 2;
            self.open = Some(Open::PropertyRef { start, buf });
        } else if ch == '}' {
            if let Err(source) = path::parse(&buf) {
                return Err(SyntaxError::PropertyPath {
                    index: start,
                    source,
                });
            }
            self.tokens.push(Token::PropertyRef {
                start,
                end: self.pos + 1,
                path: buf,
            });
            self.pos += 1;
        } else {
            buf.push(ch);
            self.pos += 1;
            self.open = Some(Open::PropertyRef { start, buf });
        }
        Ok(())
    }

    fn scan_comment(&mut self, ch: char, start: usize, mut buf: String) {
        if ch == '\n' {
            self.tokens.push(Token::Comment {
                start,
                end: self.pos,
                text: buf,
            });
            self.pos += 1;
        } else {
            buf.push(ch);
            self.pos += 1;
            self.open = Some(Open::Comment { start, buf });
        }
    }

    fn scan_literal(
        &mut self,
        ch: char,
        start: usize,
        mut buf: String,
        style: LiteralStyle,
    ) -> Result<(), SyntaxError> {
        if style == LiteralStyle::Quoted {
            if ch == '\\' && self.peek(1) == Some('"') {
                buf.push('"');
                self.pos += 2;
                self.open = Some(Open::Literal { start, buf, style });
            } else if ch == '"' {
                self.tokens.push(Token::Literal {
                    start,
                    end: self.pos + 1,
                    value: value_parser::promote(&buf, style, self.zone_offset),
                    style,
                });
                self.pos += 1;
            } else {
                buf.push(ch);
                self.pos += 1;
                self.open = Some(Open::Literal { start, buf, style });
            }
            return Ok(());
        }

        // A naked literal directly (or across whitespace) followed by `(` is
        // the name of a function call
        if ch == '(' || (ch.is_whitespace() && self.next_non_space_is_paren()) {
            if !functions::is_known(&buf) {
                return Err(SyntaxError::UnknownFunction {
                    name: buf,
                    index: start,
                });
            }
            while self.chars[self.pos] != '(' {
                self.pos += 1;
            }
            self.pos += 1;
            self.tokens.push(Token::Func {
                start,
                end: self.pos,
                name: buf,
                children: Vec::new(),
            });
            self.stack.push(Paren::Func);
        } else if ch.is_whitespace() || "()[]{}".contains(ch) {
            // Close and reprocess the current character
            self.close_literal(start, buf, style);
        } else if ch == ',' && self.stack.last() == Some(&Paren::Func) {
            self.close_literal(start, buf, style);
            self.tokens.push(Token::FuncArgsSeparator {
                start: self.pos,
                end: self.pos + 1,
            });
            self.pos += 1;
        } else {
            buf.push(ch);
            self.pos += 1;
            self.open = Some(Open::Literal { start, buf, style });
        }
        Ok(())
    }

    fn next_non_space_is_paren(&self) -> bool {
        let mut i = self.pos;
        while i < self.chars.len() && self.chars[i].is_whitespace() {
            i += 1;
        }
        self.chars.get(i) == Some(&'(')
    }

    fn close_literal(&mut self, start: usize, buf: String, style: LiteralStyle) {
        self.tokens.push(Token::Literal {
            start,
            end: self.pos,
            value: value_parser::promote(&buf, style, self.zone_offset),
            style,
        });
    }

    fn scan_free(&mut self, ch: char) -> Result<(), SyntaxError> {
        match ch {
            '(' => {
                self.tokens.push(Token::GroupStart {
                    start: self.pos,
                    end: self.pos + 1,
                });
                self.stack.push(Paren::Group);
                self.pos += 1;
            }
            ')' => {
                match self.stack.pop() {
                    Some(Paren::Group) => self.tokens.push(Token::GroupEnd {
                        start: self.pos,
                        end: self.pos + 1,
                    }),
                    Some(Paren::Func) => self.tokens.push(Token::FuncArgsEnd {
                        start: self.pos,
                        end: self.pos + 1,
                    }),
                    None => {
                        return Err(SyntaxError::UnmatchedParen { index: self.pos });
                    }
                }
                self.pos += 1;
            }
            '{' => {
                self.open = Some(Open::PropertyRef {
                    start: self.pos,
                    buf: String::new(),
                });
                self.pos += 1;
            }
            '/' if self.peek(1) == Some('/') => {
                self.open = Some(Open::Comment {
                    start: self.pos,
                    buf: String::new(),
                });
                self.pos += 2;
            }
            ',' if self.stack.last() == Some(&Paren::Func) => {
                self.tokens.push(Token::FuncArgsSeparator {
                    start: self.pos,
                    end: self.pos + 1,
                });
                self.pos += 1;
            }
            c if c.is_whitespace() => {
                self.pos += 1;
            }
            _ => {
                if let Some((key, len)) = self.match_operator() {
                    self.tokens.push(Token::Operator {
                        start: self.pos,
                        end: self.pos + len,
                        key,
                    });
                    self.pos += len;
                } else if ch == '"' {
                    self.open = Some(Open::Literal {
                        start: self.pos,
                        buf: String::new(),
                        style: LiteralStyle::Quoted,
                    });
                    self.pos += 1;
                } else {
                    self.open = Some(Open::Literal {
                        start: self.pos,
                        buf: ch.to_string(),
                        style: LiteralStyle::Naked,
                    });
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }

    /// Try every operator pattern at the current position; a symbol only
    /// matches when followed by whitespace, a parenthesis, or end-of-input.
    fn match_operator(&self) -> Option<(&'static str, usize)> {
        let window: String = self.chars
            [self.pos..(self.pos + OPERATOR_WINDOW).min(self.chars.len())]
            .iter()
            .collect();
        for (key, pattern) in self.matchers.iter() {
            if let Some(caps) = pattern.captures(&window) {
                let matched = caps.get(1).map(|m| m.as_str().chars().count())?;
                return Some((key, matched));
            }
        }
        None
    }
}

// ── Second pass: nesting ─────────────────────────────────────────────────────

struct Frame {
    start: usize,
    /// Present for function frames; absent for plain groups.
    name: Option<String>,
    children: Vec<Token>,
    arg: Vec<Token>,
    saw_separator: bool,
}

impl Frame {
    fn group(start: usize) -> Self {
        Frame {
            start,
            name: None,
            children: Vec::new(),
            arg: Vec::new(),
            saw_separator: false,
        }
    }

    fn func(start: usize, name: String) -> Self {
        Frame {
            start,
            name: Some(name),
            children: Vec::new(),
            arg: Vec::new(),
            saw_separator: false,
        }
    }

    /// Wrap the pending argument tokens into one Group child.
    fn close_arg(&mut self, at: usize) {
        let arg = std::mem::take(&mut self.arg);
        let (start, end) = match (arg.first(), arg.last()) {
            (Some(first), Some(last)) => (first.start(), last.end()),
            _ => (at, at),
        };
        self.children.push(Token::Group {
            start,
            end,
            children: arg,
        });
    }
}

/// Convert the flat stream into a tree: Group and Func nodes own their
/// children, and each function argument becomes a Group of its own.
fn nest(flat: Vec<Token>) -> Result<Vec<Token>, SyntaxError> {
    let mut root: Vec<Token> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();

    fn emit(root: &mut Vec<Token>, frames: &mut [Frame], token: Token) {
        match frames.last_mut() {
            Some(frame) if frame.name.is_some() => frame.arg.push(token),
            Some(frame) => frame.children.push(token),
            None => root.push(token),
        }
    }

    for token in flat {
        match token {
            Token::GroupStart { start, .. } => {
                frames.push(Frame::group(start));
            }
            Token::Func { start, name, .. } => {
                frames.push(Frame::func(start, name));
            }
            Token::GroupEnd { start, end } => {
                let frame = frames
                    .pop()
                    .ok_or(SyntaxError::UnmatchedParen { index: start })?;
                let node = Token::Group {
                    start: frame.start,
                    end,
                    children: frame.children,
                };
                emit(&mut root, &mut frames, node);
            }
            Token::FuncArgsSeparator { start, .. } => {
                let frame = frames
                    .last_mut()
                    .ok_or(SyntaxError::UnmatchedParen { index: start })?;
                frame.saw_separator = true;
                frame.close_arg(start);
            }
            Token::FuncArgsEnd { start, end } => {
                let mut frame = frames
                    .pop()
                    .ok_or(SyntaxError::UnmatchedParen { index: start })?;
                if !frame.arg.is_empty() || frame.saw_separator {
                    frame.close_arg(start);
                }
                let node = Token::Func {
                    start: frame.start,
                    end,
                    name: frame.name.unwrap_or_default(),
                    children: frame.children,
                };
                emit(&mut root, &mut frames, node);
            }
            other => emit(&mut root, &mut frames, other),
        }
    }

    if let Some(frame) = frames.first() {
        return Err(SyntaxError::UnmatchedParen { index: frame.start });
    }

    Ok(root)
}
