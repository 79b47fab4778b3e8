// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Syntax parser
//!
//! A recursive-descent parser over the token stream of
//! [`Lexer`](lex::Lexer). [`Parser::parse_line`] consumes one complete
//! command (which may span lines when a construct is open) and returns
//! its [`Node`].
//!
//! Reserved words and aliases are position-dependent: the parser requests
//! them through [`TokenFlags`](lex::TokenFlags) exactly at the grammar
//! spots where POSIX recognizes them. Here-document bodies are collected
//! by the lexer at the first newline after the redirection operator; by
//! the time a command is returned, all of its here-documents are
//! complete.

pub mod lex;

use crate::alias::AliasSet;
use crate::syntax::{
    assignment_prefix, CaseClause, FileMode, HereDoc, Node, Redir, RedirKind, Word, CTL_ESC,
    CTL_QUOTEMARK,
};
use lex::{Keyword, Lexer, RedirOp, Token, TokenFlags, WordToken};
use std::rc::Rc;

/// Syntax error
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("syntax error: {message}")]
pub struct Error {
    /// What went wrong
    pub message: String,
    /// Line the error was detected on
    pub lineno: u64,
}

/// Result of parsing one line of input
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedLine {
    /// End of input
    Eof,
    /// Empty line (or line holding only a comment)
    Blank,
    /// A complete command
    Command(Node),
}

/// Function names rejected at definition time
///
/// A function must not shadow a special built-in.
const SPECIAL_BUILTIN_NAMES: &[&str] = &[
    "break", "continue", "eval", "exec", "exit", "export", "local", "readonly", "return", "set",
    "shift", "times", "trap", "unset",
];

/// The parser
///
/// Borrows the lexer for the duration of one command; the alias set is
/// the environment's, looked up at the grammar spots where substitution
/// applies.
#[derive(Debug)]
pub struct Parser<'a> {
    lexer: &'a mut Lexer,
    aliases: &'a AliasSet,
    lookahead: Option<Token>,
}

const CHK_NL: TokenFlags = TokenFlags {
    keywords: true,
    aliases: true,
    newlines: true,
};

fn describe(token: &Token) -> String {
    match token {
        Token::Eof => "end of file".to_owned(),
        Token::Newline => "newline".to_owned(),
        Token::Semi => "\";\"".to_owned(),
        Token::DSemi => "\";;\"".to_owned(),
        Token::Amp => "\"&\"".to_owned(),
        Token::AndIf => "\"&&\"".to_owned(),
        Token::OrIf => "\"||\"".to_owned(),
        Token::Pipe => "\"|\"".to_owned(),
        Token::OpenParen => "\"(\"".to_owned(),
        Token::CloseParen => "\")\"".to_owned(),
        Token::Keyword(k) => format!("\"{}\"", k.as_str()),
        Token::Redir { .. } => "redirection".to_owned(),
        Token::Word(w) => format!("\"{}\"", String::from_utf8_lossy(&w.word.text)),
    }
}

/// Whether this keyword terminates a compound list.
fn ends_list(keyword: Keyword) -> bool {
    use Keyword::*;
    matches!(keyword, Then | Else | Elif | Fi | Do | Done | Esac | CloseBrace)
}

impl<'a> Parser<'a> {
    pub fn new(lexer: &'a mut Lexer, aliases: &'a AliasSet) -> Self {
        Parser {
            lexer,
            aliases,
            lookahead: None,
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, Error> {
        Err(Error {
            message: message.into(),
            lineno: self.lexer.lineno(),
        })
    }

    fn unexpected<T>(&self, token: &Token) -> Result<T, Error> {
        self.error(format!("{} unexpected", describe(token)))
    }

    /// Reads the next token, applying the position flags.
    ///
    /// A pushed-back token is re-normalized for the new position: keyword
    /// recognition is reversible, so pushback across positions with
    /// different `keywords` settings is safe.
    fn next(&mut self, flags: TokenFlags) -> Result<Token, Error> {
        loop {
            let token = match self.lookahead.take() {
                Some(token) => token,
                None => self.lexer.next_token(flags, self.aliases)?,
            };
            if flags.newlines && token == Token::Newline {
                continue;
            }
            return Ok(match token {
                Token::Word(w) if flags.keywords => {
                    match (!w.quoted && w.word.substitutions.is_empty())
                        .then(|| Keyword::from_text(&w.word.text))
                        .flatten()
                    {
                        Some(keyword) => Token::Keyword(keyword),
                        None => Token::Word(w),
                    }
                }
                Token::Keyword(keyword) if !flags.keywords => Token::Word(WordToken {
                    word: Word::from_literal(keyword.as_str().as_bytes().to_vec()),
                    quoted: false,
                }),
                token => token,
            });
        }
    }

    fn unget(&mut self, token: Token) {
        debug_assert!(self.lookahead.is_none(), "token pushback overflow");
        self.lookahead = Some(token);
    }

    fn expect_keyword(&mut self, expected: Keyword) -> Result<(), Error> {
        let token = self.next(CHK_NL)?;
        if token == Token::Keyword(expected) {
            Ok(())
        } else {
            self.error(format!(
                "{} unexpected (expecting \"{}\")",
                describe(&token),
                expected.as_str()
            ))
        }
    }

    /// Parses one line of input: a complete command, a blank line, or the
    /// end of input.
    pub fn parse_line(&mut self) -> Result<ParsedLine, Error> {
        match self.next(TokenFlags::COMMAND)? {
            Token::Eof => return Ok(ParsedLine::Eof),
            Token::Newline => return Ok(ParsedLine::Blank),
            token => self.unget(token),
        }
        let node = self.list(true)?;
        match self.next(TokenFlags::NONE)? {
            Token::Newline | Token::Eof => Ok(ParsedLine::Command(node)),
            token => self.unexpected(&token),
        }
    }

    /// Parses a list of and-or chains separated by `;`, `&`, and (in
    /// compound context) newlines.
    ///
    /// At the top level (`top`), a newline ends the list and is left for
    /// the caller. In compound context the list ends at a closing token
    /// (`)`, `;;`, or a terminating keyword), which is also left for the
    /// caller.
    fn list(&mut self, top: bool) -> Result<Node, Error> {
        let mut acc: Option<Node> = None;
        loop {
            let mut item = self.and_or()?;

            let mut done = false;
            match self.next(TokenFlags::NONE)? {
                Token::Amp => {
                    item = Node::Background {
                        body: Box::new(item),
                    }
                }
                Token::Semi => {}
                Token::Newline if top => {
                    self.unget(Token::Newline);
                    done = true;
                }
                Token::Newline => {}
                token => {
                    self.unget(token);
                    done = true;
                }
            }

            acc = Some(match acc {
                None => item,
                Some(left) => Node::Semi {
                    left: Box::new(left),
                    right: Box::new(item),
                },
            });
            if done {
                return Ok(acc.expect("list holds at least one item"));
            }

            // Separator consumed; is another command coming?
            let flags = TokenFlags {
                keywords: true,
                aliases: true,
                newlines: !top,
            };
            let token = self.next(flags)?;
            match &token {
                Token::Eof | Token::Newline | Token::CloseParen | Token::DSemi => {
                    self.unget(token);
                    return Ok(acc.expect("list holds at least one item"));
                }
                Token::Keyword(k) if ends_list(*k) => {
                    self.unget(token);
                    return Ok(acc.expect("list holds at least one item"));
                }
                _ => self.unget(token),
            }
        }
    }

    /// Parses a compound list (the inside of `if`, loops, groups).
    fn compound_list(&mut self) -> Result<Node, Error> {
        // Leading newlines are allowed before the first command.
        let token = self.next(CHK_NL)?;
        self.unget(token);
        self.list(false)
    }

    fn and_or(&mut self) -> Result<Node, Error> {
        let mut node = self.pipeline(TokenFlags::COMMAND)?;
        loop {
            match self.next(TokenFlags::NONE)? {
                Token::AndIf => {
                    let right = self.pipeline(CHK_NL)?;
                    node = Node::And {
                        left: Box::new(node),
                        right: Box::new(right),
                    };
                }
                Token::OrIf => {
                    let right = self.pipeline(CHK_NL)?;
                    node = Node::Or {
                        left: Box::new(node),
                        right: Box::new(right),
                    };
                }
                token => {
                    self.unget(token);
                    return Ok(node);
                }
            }
        }
    }

    fn pipeline(&mut self, first_flags: TokenFlags) -> Result<Node, Error> {
        let mut negate = false;
        let mut token = self.next(first_flags)?;
        while token == Token::Keyword(Keyword::Bang) {
            negate = !negate;
            token = self.next(TokenFlags::COMMAND)?;
        }
        self.unget(token);

        let mut commands = vec![self.command()?];
        loop {
            match self.next(TokenFlags::NONE)? {
                Token::Pipe => commands.push(self.command_after(CHK_NL)?),
                token => {
                    self.unget(token);
                    break;
                }
            }
        }

        let node = if commands.len() == 1 {
            commands.pop().expect("one command")
        } else {
            Node::Pipe {
                background: false,
                commands,
            }
        };
        Ok(if negate {
            Node::Not {
                body: Box::new(node),
            }
        } else {
            node
        })
    }

    /// Parses one command, optionally swallowing newlines first.
    fn command_after(&mut self, flags: TokenFlags) -> Result<Node, Error> {
        let token = self.next(flags)?;
        self.unget(token);
        self.command()
    }

    /// Parses one command: compound, subshell, or simple.
    fn command(&mut self) -> Result<Node, Error> {
        let linno = self.lexer.lineno();
        let token = self.next(TokenFlags::COMMAND)?;
        let body = match token {
            Token::Keyword(Keyword::If) => self.if_command()?,
            Token::Keyword(Keyword::While) => {
                let condition = self.compound_list()?;
                self.expect_keyword(Keyword::Do)?;
                let body = self.compound_list()?;
                self.expect_keyword(Keyword::Done)?;
                Node::While {
                    condition: Box::new(condition),
                    body: Box::new(body),
                }
            }
            Token::Keyword(Keyword::Until) => {
                let condition = self.compound_list()?;
                self.expect_keyword(Keyword::Do)?;
                let body = self.compound_list()?;
                self.expect_keyword(Keyword::Done)?;
                Node::Until {
                    condition: Box::new(condition),
                    body: Box::new(body),
                }
            }
            Token::Keyword(Keyword::For) => self.for_command(linno)?,
            Token::Keyword(Keyword::Case) => self.case_command(linno)?,
            Token::Keyword(Keyword::OpenBrace) => {
                let body = self.compound_list()?;
                self.expect_keyword(Keyword::CloseBrace)?;
                body
            }
            Token::OpenParen => {
                let body = self.compound_list()?;
                match self.next(CHK_NL)? {
                    Token::CloseParen => {}
                    token => return self.unexpected(&token),
                }
                let redirs = self.redirection_suffix()?;
                return Ok(Node::Subshell {
                    linno,
                    body: Box::new(body),
                    redirs,
                });
            }
            token @ (Token::Word(_) | Token::Redir { .. }) => {
                self.unget(token);
                return self.simple_command(linno);
            }
            token => return self.unexpected(&token),
        };

        let redirs = self.redirection_suffix()?;
        Ok(if redirs.is_empty() {
            body
        } else {
            Node::Redirected {
                linno,
                body: Box::new(body),
                redirs,
            }
        })
    }

    fn if_command(&mut self) -> Result<Node, Error> {
        let condition = self.compound_list()?;
        self.expect_keyword(Keyword::Then)?;
        let then_body = self.compound_list()?;
        let else_body = match self.next(CHK_NL)? {
            Token::Keyword(Keyword::Elif) => Some(self.if_command()?),
            Token::Keyword(Keyword::Else) => {
                let body = self.compound_list()?;
                self.expect_keyword(Keyword::Fi)?;
                Some(body)
            }
            Token::Keyword(Keyword::Fi) => None,
            token => return self.unexpected(&token),
        };
        Ok(Node::If {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body: else_body.map(Box::new),
        })
    }

    fn for_command(&mut self, linno: u64) -> Result<Node, Error> {
        let var = match self.next(TokenFlags::NONE)? {
            Token::Word(w) if w.word.is_literal() => {
                match String::from_utf8(w.word.text.clone()) {
                    Ok(name) if is_name(&name) => name,
                    _ => return self.error("bad for loop variable"),
                }
            }
            token => return self.unexpected(&token),
        };

        let mut words = None;
        match self.next(CHK_NL)? {
            Token::Keyword(Keyword::In) => {
                let mut list = Vec::new();
                loop {
                    match self.next(TokenFlags::NONE)? {
                        Token::Word(w) => list.push(w.word),
                        Token::Semi | Token::Newline => break,
                        token => return self.unexpected(&token),
                    }
                }
                words = Some(list);
                self.expect_keyword(Keyword::Do)?;
            }
            Token::Keyword(Keyword::Do) => {}
            Token::Semi => self.expect_keyword(Keyword::Do)?,
            token => return self.unexpected(&token),
        }

        let body = self.compound_list()?;
        self.expect_keyword(Keyword::Done)?;
        Ok(Node::For {
            linno,
            var,
            words,
            body: Box::new(body),
        })
    }

    fn case_command(&mut self, linno: u64) -> Result<Node, Error> {
        let subject = match self.next(TokenFlags::NONE)? {
            Token::Word(w) => w.word,
            token => return self.unexpected(&token),
        };
        self.expect_keyword(Keyword::In)?;

        let mut clauses = Vec::new();
        loop {
            let mut token = self.next(CHK_NL)?;
            if token == Token::Keyword(Keyword::Esac) {
                break;
            }
            if token == Token::OpenParen {
                token = self.next(TokenFlags::NONE)?;
            }

            let mut patterns = Vec::new();
            loop {
                match token {
                    Token::Word(w) => patterns.push(w.word),
                    Token::Keyword(k) => patterns.push(Word::from_literal(
                        k.as_str().as_bytes().to_vec(),
                    )),
                    token => return self.unexpected(&token),
                }
                match self.next(TokenFlags::NONE)? {
                    Token::Pipe => token = self.next(TokenFlags::NONE)?,
                    Token::CloseParen => break,
                    token => return self.unexpected(&token),
                }
            }

            // The body may be empty.
            let mut body = None;
            let token = self.next(CHK_NL)?;
            match token {
                Token::DSemi => {
                    clauses.push(CaseClause { patterns, body });
                    continue;
                }
                Token::Keyword(Keyword::Esac) => {
                    clauses.push(CaseClause { patterns, body });
                    break;
                }
                token => self.unget(token),
            }
            body = Some(Box::new(self.list(false)?));
            let token = self.next(CHK_NL)?;
            match token {
                Token::DSemi => clauses.push(CaseClause { patterns, body }),
                Token::Keyword(Keyword::Esac) => {
                    clauses.push(CaseClause { patterns, body });
                    break;
                }
                token => return self.unexpected(&token),
            }
        }

        Ok(Node::Case {
            linno,
            subject,
            clauses,
        })
    }

    /// Parses redirections following a compound command.
    fn redirection_suffix(&mut self) -> Result<Vec<Redir>, Error> {
        let mut redirs = Vec::new();
        loop {
            match self.next(TokenFlags::NONE)? {
                Token::Redir { fd, op } => redirs.push(self.finish_redir(fd, op)?),
                token => {
                    self.unget(token);
                    return Ok(redirs);
                }
            }
        }
    }

    fn simple_command(&mut self, linno: u64) -> Result<Node, Error> {
        let mut assigns = Vec::new();
        let mut args: Vec<Word> = Vec::new();
        let mut redirs = Vec::new();
        let mut in_prefix = true;

        loop {
            match self.next(TokenFlags::NONE)? {
                Token::Word(w) => {
                    if in_prefix && assignment_prefix(&w.word.text).is_some() {
                        assigns.push(w.word);
                    } else {
                        in_prefix = false;
                        args.push(w.word);
                    }
                }
                Token::Redir { fd, op } => redirs.push(self.finish_redir(fd, op)?),
                Token::OpenParen
                    if args.len() == 1 && assigns.is_empty() && redirs.is_empty() =>
                {
                    return self.function_definition(linno, args.pop().expect("one word"));
                }
                token => {
                    self.unget(token);
                    break;
                }
            }
        }

        Ok(Node::Cmd {
            linno,
            assigns,
            args,
            redirs,
        })
    }

    fn function_definition(&mut self, linno: u64, name_word: Word) -> Result<Node, Error> {
        match self.next(TokenFlags::NONE)? {
            Token::CloseParen => {}
            token => return self.unexpected(&token),
        }
        let name = match String::from_utf8(name_word.text) {
            Ok(name) if is_name(&name) => name,
            _ => return self.error("bad function name"),
        };
        if SPECIAL_BUILTIN_NAMES.contains(&name.as_str()) {
            return self.error("bad function name");
        }
        let body = self.command_after(CHK_NL)?;
        Ok(Node::FunctionDef {
            linno,
            name,
            body: Rc::new(body),
        })
    }

    fn finish_redir(&mut self, fd: Option<i32>, op: RedirOp) -> Result<Redir, Error> {
        let target = match self.next(TokenFlags::NONE)? {
            Token::Word(w) => w,
            token => return self.unexpected(&token),
        };
        let redir = match op {
            RedirOp::DLess | RedirOp::DLessDash => {
                let doc = Rc::new(HereDoc {
                    strip_tabs: op == RedirOp::DLessDash,
                    expand: !target.quoted,
                    delimiter: literal_text(&target.word.text),
                    content: Default::default(),
                });
                self.lexer.push_pending_heredoc(Rc::clone(&doc));
                Redir {
                    fd: fd.unwrap_or(0),
                    kind: RedirKind::Here { doc },
                }
            }
            RedirOp::LessAnd => Redir {
                fd: fd.unwrap_or(0),
                kind: RedirKind::DupIn {
                    target: target.word,
                },
            },
            RedirOp::GreatAnd => Redir {
                fd: fd.unwrap_or(1),
                kind: RedirKind::DupOut {
                    target: target.word,
                },
            },
            op => {
                let (mode, default_fd) = match op {
                    RedirOp::Less => (FileMode::In, 0),
                    RedirOp::Great => (FileMode::Out, 1),
                    RedirOp::DGreat => (FileMode::Append, 1),
                    RedirOp::LessGreat => (FileMode::InOut, 0),
                    RedirOp::Clobber => (FileMode::Clobber, 1),
                    _ => unreachable!("here and dup operators handled above"),
                };
                Redir {
                    fd: fd.unwrap_or(default_fd),
                    kind: RedirKind::File {
                        mode,
                        target: target.word,
                    },
                }
            }
        };
        Ok(redir)
    }
}

/// Quote removal for contexts that need literal text at parse time
/// (here-document delimiters).
fn literal_text(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut iter = text.iter().copied();
    while let Some(byte) = iter.next() {
        match byte {
            CTL_QUOTEMARK => {}
            CTL_ESC => out.extend(iter.next()),
            byte => out.push(byte),
        }
    }
    out
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
