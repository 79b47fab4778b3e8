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

//! Tokenization
//!
//! [`Lexer::next_token`] recognizes operators, words, and redirection
//! prefixes. Words are built by a state machine over four
//! context-sensitive byte classifications (normal, double-quoted,
//! single-quoted, arithmetic); the output is the control-byte encoding
//! described in [`crate::syntax`].
//!
//! Reserved words and aliases are only recognized when the parser asks
//! for them through [`TokenFlags`], because both are position-dependent
//! in the shell grammar.

use crate::alias::AliasSet;
use crate::input::{InChar, InputStack};
use crate::parser::Error;
use crate::syntax::{
    self, HereDoc, Word, CTL_ARI, CTL_BACKQ, CTL_ENDARI, CTL_ENDVAR, CTL_ESC, CTL_QUOTEMARK,
    CTL_VAR, VS_ASSIGN, VS_LENGTH, VS_MINUS, VS_NORMAL, VS_NUL, VS_PLUS, VS_QUESTION,
    VS_TRIM_LEFT, VS_TRIM_LEFT_MAX, VS_TRIM_RIGHT, VS_TRIM_RIGHT_MAX,
};
use std::rc::Rc;

/// Reserved word
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Keyword {
    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    In,
    Do,
    Done,
    While,
    Until,
    Case,
    Esac,
    OpenBrace,
    CloseBrace,
    Bang,
}

impl Keyword {
    /// The source spelling of the keyword.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        use Keyword::*;
        match self {
            If => "if",
            Then => "then",
            Else => "else",
            Elif => "elif",
            Fi => "fi",
            For => "for",
            In => "in",
            Do => "do",
            Done => "done",
            While => "while",
            Until => "until",
            Case => "case",
            Esac => "esac",
            OpenBrace => "{",
            CloseBrace => "}",
            Bang => "!",
        }
    }

    /// Recognizes a reserved word from plain word text.
    #[must_use]
    pub fn from_text(text: &[u8]) -> Option<Keyword> {
        use Keyword::*;
        Some(match text {
            b"if" => If,
            b"then" => Then,
            b"else" => Else,
            b"elif" => Elif,
            b"fi" => Fi,
            b"for" => For,
            b"in" => In,
            b"do" => Do,
            b"done" => Done,
            b"while" => While,
            b"until" => Until,
            b"case" => Case,
            b"esac" => Esac,
            b"{" => OpenBrace,
            b"}" => CloseBrace,
            b"!" => Bang,
            _ => return None,
        })
    }
}

/// Redirection operator
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RedirOp {
    /// `<`
    Less,
    /// `>`
    Great,
    /// `>>`
    DGreat,
    /// `<>`
    LessGreat,
    /// `>|`
    Clobber,
    /// `<&`
    LessAnd,
    /// `>&`
    GreatAnd,
    /// `<<`
    DLess,
    /// `<<-`
    DLessDash,
}

/// Word token together with its quoting flag
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WordToken {
    pub word: Word,
    /// Whether any quoting or escaping was seen in the word
    pub quoted: bool,
}

/// Token returned by the lexer
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    Eof,
    Newline,
    /// `;`
    Semi,
    /// `;;`
    DSemi,
    /// `&`
    Amp,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `|`
    Pipe,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// Reserved word, produced only when [`TokenFlags::keywords`] is set
    Keyword(Keyword),
    /// Redirection operator with an optional explicit descriptor
    Redir { fd: Option<i32>, op: RedirOp },
    Word(WordToken),
}

/// Grammar-position hints for [`Lexer::next_token`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TokenFlags {
    /// Recognize reserved words
    pub keywords: bool,
    /// Perform alias substitution
    pub aliases: bool,
    /// Swallow newlines before the token
    pub newlines: bool,
}

impl TokenFlags {
    pub const NONE: TokenFlags = TokenFlags {
        keywords: false,
        aliases: false,
        newlines: false,
    };
    /// Start of a command: keywords and aliases apply.
    pub const COMMAND: TokenFlags = TokenFlags {
        keywords: true,
        aliases: true,
        newlines: false,
    };
}

/// Lexical context, one byte classification table each
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Syntax {
    Base,
    DQuote,
    SQuote,
    Arith,
}

/// Byte class within a [`Syntax`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Class {
    /// Ordinary word byte
    Word,
    /// Newline
    Nl,
    /// Backslash
    Back,
    /// Opening single quote
    SQuote,
    /// Opening double quote
    DQuote,
    /// Closing quote for the current context
    EndQuote,
    /// Backquote
    BQuote,
    /// `$`
    Var,
    /// `}`
    EndVar,
    /// `(` in arithmetic
    Lp,
    /// `)` in arithmetic
    Rp,
    /// Byte that must be escaped to survive later passes
    Ctl,
    /// Special byte that terminates a word
    Spcl,
    /// Ignored byte
    Ign,
    /// End of input
    Eos,
}

/// Classifies one unit of input in the given context.
///
/// This is the four-table classification of the original implementation,
/// written as matches.
fn classify(syntax: Syntax, c: InChar) -> Class {
    let byte = match c {
        InChar::Eof => return Class::Eos,
        InChar::EndOfAlias => {
            return match syntax {
                Syntax::Base => Class::Spcl,
                _ => Class::Ign,
            }
        }
        InChar::Byte(b) => b,
    };
    if syntax::is_ctl(byte) {
        return Class::Ctl;
    }
    match syntax {
        Syntax::Base => match byte {
            b'\n' => Class::Nl,
            b'\\' => Class::Back,
            b'\'' => Class::SQuote,
            b'"' => Class::DQuote,
            b'`' => Class::BQuote,
            b'$' => Class::Var,
            b'}' => Class::EndVar,
            b' ' | b'\t' | b'&' | b'(' | b')' | b';' | b'<' | b'>' | b'|' => Class::Spcl,
            _ => Class::Word,
        },
        Syntax::DQuote => match byte {
            b'\n' => Class::Nl,
            b'\\' => Class::Back,
            b'"' => Class::EndQuote,
            b'`' => Class::BQuote,
            b'$' => Class::Var,
            b'}' => Class::EndVar,
            b'!' | b'*' | b'-' | b'/' | b':' | b'=' | b'?' | b'[' | b']' | b'~' => Class::Ctl,
            _ => Class::Word,
        },
        Syntax::SQuote => match byte {
            b'\n' => Class::Nl,
            b'\'' => Class::EndQuote,
            b'!' | b'*' | b'-' | b'/' | b':' | b'=' | b'?' | b'[' | b'\\' | b']' | b'~' => {
                Class::Ctl
            }
            _ => Class::Word,
        },
        Syntax::Arith => match byte {
            b'\n' => Class::Nl,
            b'\\' => Class::Back,
            b'`' => Class::BQuote,
            b'$' => Class::Var,
            b'}' => Class::EndVar,
            b'(' => Class::Lp,
            b')' => Class::Rp,
            _ => Class::Word,
        },
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_special_param(b: u8) -> bool {
    matches!(b, b'@' | b'*' | b'#' | b'?' | b'-' | b'$' | b'!' | b'0')
}

/// The tokenizer
///
/// Owns the [`InputStack`] and the queue of here-documents whose bodies
/// are pending collection at the next newline.
#[derive(Debug)]
pub struct Lexer {
    pub input: InputStack,
    pending_heredocs: Vec<Rc<HereDoc>>,
    /// The last alias replacement ended in a blank, so the next word is
    /// also an alias candidate.
    check_alias_next: bool,
    /// Continuation prompt, written before further interactive lines of
    /// an unfinished command
    pub ps2: Vec<u8>,
}

impl Lexer {
    pub fn new(input: InputStack) -> Self {
        Lexer {
            input,
            pending_heredocs: Vec::new(),
            check_alias_next: false,
            ps2: b"> ".to_vec(),
        }
    }

    /// Registers a here-document whose body is collected at the next
    /// newline token.
    pub fn push_pending_heredoc(&mut self, doc: Rc<HereDoc>) {
        self.pending_heredocs.push(doc);
    }

    /// Line number at the current read position.
    #[must_use]
    pub fn lineno(&self) -> u64 {
        self.input.lineno()
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, Error> {
        Err(Error {
            message: message.into(),
            lineno: self.input.lineno(),
        })
    }

    /// Arms the continuation prompt before reading another line of an
    /// unfinished construct.
    fn nl_prompt(&mut self) {
        if self.input.interactive {
            let ps2 = self.ps2.clone();
            self.input.set_prompt(ps2);
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self, flags: TokenFlags, aliases: &AliasSet) -> Result<Token, Error> {
        loop {
            let c = match self.skip_blanks()? {
                InChar::Eof => {
                    self.gather_heredocs()?;
                    return Ok(Token::Eof);
                }
                InChar::Byte(b'\n') => {
                    self.gather_heredocs()?;
                    if flags.newlines {
                        self.nl_prompt();
                        continue;
                    }
                    return Ok(Token::Newline);
                }
                c => c,
            };

            let InChar::Byte(byte) = c else { continue };
            match byte {
                b';' => {
                    return Ok(if self.peek_byte(b';') {
                        Token::DSemi
                    } else {
                        Token::Semi
                    })
                }
                b'&' => {
                    return Ok(if self.peek_byte(b'&') {
                        Token::AndIf
                    } else {
                        Token::Amp
                    })
                }
                b'|' => {
                    return Ok(if self.peek_byte(b'|') {
                        Token::OrIf
                    } else {
                        Token::Pipe
                    })
                }
                b'(' => return Ok(Token::OpenParen),
                b')' => return Ok(Token::CloseParen),
                b'<' | b'>' => {
                    let op = self.read_redir_op(byte);
                    return Ok(Token::Redir { fd: None, op });
                }
                _ => {}
            }

            let token = self.read_word(c, WordMode::Normal)?;

            // An unquoted word of digits directly before `<` or `>` is
            // the descriptor of the redirection, not an argument.
            if !token.quoted
                && !token.word.text.is_empty()
                && token.word.text.iter().all(u8::is_ascii_digit)
            {
                match self.input.pget() {
                    InChar::Byte(b @ (b'<' | b'>')) => {
                        let text = std::str::from_utf8(&token.word.text).unwrap();
                        let fd: i32 = match text.parse() {
                            Ok(fd) => fd,
                            Err(_) => return self.error("file descriptor out of range"),
                        };
                        let op = self.read_redir_op(b);
                        return Ok(Token::Redir { fd: Some(fd), op });
                    }
                    c => self.input.unget(c),
                }
            }

            if token.word.substitutions.is_empty() && !token.quoted {
                if flags.keywords {
                    if let Some(keyword) = Keyword::from_text(&token.word.text) {
                        self.check_alias_next = false;
                        return Ok(Token::Keyword(keyword));
                    }
                }
                if flags.aliases || self.check_alias_next {
                    if let Ok(name) = std::str::from_utf8(&token.word.text) {
                        if !self.input.is_alias_active(name) {
                            if let Some(entry) = aliases.get(name) {
                                self.check_alias_next = entry.0.ends_in_blank();
                                let replacement = entry.0.replacement.clone();
                                self.input.push_alias(name, &replacement);
                                continue;
                            }
                        }
                    }
                }
            }
            self.check_alias_next = false;
            return Ok(Token::Word(token));
        }
    }

    /// Skips blanks, comments, and line continuations between tokens,
    /// returning the first significant unit.
    fn skip_blanks(&mut self) -> Result<InChar, Error> {
        loop {
            match self.input.pget() {
                InChar::Byte(b' ' | b'\t') | InChar::EndOfAlias => {}
                InChar::Byte(b'\\') => {
                    // Line continuation; anything else starts a word.
                    match self.input.pget() {
                        InChar::Byte(b'\n') => self.nl_prompt(),
                        c => {
                            self.input.unget(c);
                            return Ok(InChar::Byte(b'\\'));
                        }
                    }
                }
                InChar::Byte(b'#') => loop {
                    match self.input.pget() {
                        InChar::Byte(b'\n') | InChar::Eof => {
                            self.input.unget(InChar::Byte(b'\n'));
                            break;
                        }
                        InChar::EndOfAlias => {}
                        InChar::Byte(_) => {}
                    }
                },
                c => return Ok(c),
            }
        }
    }

    fn peek_byte(&mut self, expected: u8) -> bool {
        match self.input.pget() {
            InChar::Byte(b) if b == expected => true,
            c => {
                self.input.unget(c);
                false
            }
        }
    }

    /// Reads the rest of a redirection operator whose first byte is
    /// already consumed.
    fn read_redir_op(&mut self, first: u8) -> RedirOp {
        if first == b'<' {
            match self.input.pget() {
                InChar::Byte(b'<') => {
                    if self.peek_byte(b'-') {
                        RedirOp::DLessDash
                    } else {
                        RedirOp::DLess
                    }
                }
                InChar::Byte(b'&') => RedirOp::LessAnd,
                InChar::Byte(b'>') => RedirOp::LessGreat,
                c => {
                    self.input.unget(c);
                    RedirOp::Less
                }
            }
        } else {
            match self.input.pget() {
                InChar::Byte(b'>') => RedirOp::DGreat,
                InChar::Byte(b'&') => RedirOp::GreatAnd,
                InChar::Byte(b'|') => RedirOp::Clobber,
                c => {
                    self.input.unget(c);
                    RedirOp::Great
                }
            }
        }
    }

    /// Collects the bodies of all pending here-documents, in order.
    fn gather_heredocs(&mut self) -> Result<(), Error> {
        for doc in std::mem::take(&mut self.pending_heredocs) {
            let raw = self.read_heredoc_lines(&doc.delimiter, doc.strip_tabs);
            let body = if doc.expand {
                self.input.push_text(raw);
                let word = self.read_word_in_heredoc()?;
                self.input.pop_frame();
                word
            } else {
                Word::from_literal(raw)
            };
            doc.content
                .set(body)
                .expect("here-document body collected twice");
        }
        Ok(())
    }

    /// Reads raw body lines up to the delimiter line (or end of input).
    fn read_heredoc_lines(&mut self, delimiter: &[u8], strip_tabs: bool) -> Vec<u8> {
        let mut body = Vec::new();
        loop {
            self.nl_prompt();
            let mut line = Vec::new();
            let eof = loop {
                match self.input.pget() {
                    InChar::Byte(b'\n') => break false,
                    InChar::Eof => break true,
                    InChar::EndOfAlias => {}
                    InChar::Byte(b) => line.push(b),
                }
            };
            let stripped: &[u8] = if strip_tabs {
                let tabs = line.iter().take_while(|&&b| b == b'\t').count();
                &line[tabs..]
            } else {
                &line
            };
            if stripped == delimiter {
                return body;
            }
            body.extend_from_slice(stripped);
            body.push(b'\n');
            if eof {
                return body;
            }
        }
    }

    /// Reads a whole pushed text frame as a here-document body.
    fn read_word_in_heredoc(&mut self) -> Result<Word, Error> {
        let first = self.first_heredoc_char();
        let token = self.read_word(first, WordMode::Heredoc)?;
        Ok(token.word)
    }

    fn first_heredoc_char(&mut self) -> InChar {
        self.input.pget()
    }

    /// The word-building state machine.
    ///
    /// `first` is the already-consumed first unit of the word. In
    /// [`WordMode::Heredoc`] the machine starts in double-quote context
    /// and runs to the end of the current input frame.
    fn read_word(&mut self, first: InChar, mode: WordMode) -> Result<WordToken, Error> {
        let heredoc = mode == WordMode::Heredoc;
        let mut text: Vec<u8> = Vec::new();
        let mut subs: Vec<Rc<[u8]>> = Vec::new();
        let mut quoted = false;
        let mut syntax = if heredoc { Syntax::DQuote } else { Syntax::Base };
        let mut dblquote = heredoc;
        // One entry per `${` whose operator word is being read; the value
        // records whether the enclosing context was double-quoted.
        let mut varnest: Vec<bool> = Vec::new();
        let mut dq_varnest: usize = 0;
        // Arithmetic state: saved context and inner parenthesis level.
        let mut ari_prev: Option<(Syntax, bool)> = None;
        let mut ari_parens: usize = 0;

        let mut c = first;
        loop {
            match classify(syntax, c) {
                Class::Word => {
                    if let InChar::Byte(b) = c {
                        text.push(b);
                    }
                }
                Class::Ctl => {
                    if let InChar::Byte(b) = c {
                        // In a here-document body outside double quotes
                        // the byte goes through bare, as the original
                        // does; everywhere else it is protected.
                        if !heredoc || dblquote {
                            text.push(CTL_ESC);
                        }
                        text.push(b);
                    }
                }
                Class::Nl => match syntax {
                    Syntax::Base => {
                        self.input.unget(c);
                        break;
                    }
                    _ => {
                        text.push(b'\n');
                        self.nl_prompt();
                    }
                },
                Class::Spcl => {
                    self.input.unget(c);
                    break;
                }
                Class::Eos => {
                    if syntax != Syntax::Base && !heredoc {
                        return self.error("unterminated quoted string");
                    }
                    break;
                }
                Class::Ign => {}
                Class::Back => {
                    self.read_backslash(&mut text, &mut quoted, dblquote, heredoc)?;
                }
                Class::SQuote => {
                    syntax = Syntax::SQuote;
                    quoted = true;
                    if !heredoc {
                        text.push(CTL_QUOTEMARK);
                    }
                }
                Class::DQuote => {
                    syntax = Syntax::DQuote;
                    dblquote = true;
                    quoted = true;
                    if !heredoc {
                        text.push(CTL_QUOTEMARK);
                    }
                }
                Class::EndQuote => {
                    if heredoc && varnest.is_empty() {
                        if let InChar::Byte(b) = c {
                            text.push(b);
                        }
                    } else {
                        if syntax == Syntax::SQuote {
                            syntax = Syntax::Base;
                        } else if dq_varnest == 0 {
                            syntax = Syntax::Base;
                            dblquote = false;
                        }
                        quoted = true;
                        if !heredoc {
                            text.push(CTL_QUOTEMARK);
                        }
                    }
                }
                Class::BQuote => {
                    let content = self.scan_backquote()?;
                    subs.push(content.into());
                    text.push(CTL_BACKQ);
                }
                Class::Var => {
                    self.read_dollar(
                        &mut text,
                        &mut subs,
                        &mut syntax,
                        &mut dblquote,
                        &mut varnest,
                        &mut dq_varnest,
                        &mut ari_prev,
                        &mut ari_parens,
                    )?;
                }
                Class::EndVar => {
                    if let Some(was_dquoted) = varnest.pop() {
                        if was_dquoted {
                            dq_varnest -= 1;
                            dblquote = true;
                            syntax = Syntax::DQuote;
                        }
                        text.push(CTL_ENDVAR);
                    } else if let InChar::Byte(b) = c {
                        text.push(b);
                    }
                }
                Class::Lp => {
                    ari_parens += 1;
                    text.push(b'(');
                }
                Class::Rp => {
                    if ari_parens > 0 {
                        ari_parens -= 1;
                        text.push(b')');
                    } else if self.peek_byte(b')') {
                        text.push(CTL_ENDARI);
                        let (prev_syntax, prev_dblquote) =
                            ari_prev.take().expect("arithmetic context missing");
                        syntax = prev_syntax;
                        dblquote = prev_dblquote;
                    } else {
                        return self.error("missing '))' in arithmetic expansion");
                    }
                }
            }
            c = self.input.pget();
        }

        if !varnest.is_empty() {
            return self.error("missing '}' in parameter expansion");
        }
        if ari_prev.is_some() {
            return self.error("missing '))' in arithmetic expansion");
        }

        Ok(WordToken {
            word: Word {
                text,
                substitutions: subs,
            },
            quoted,
        })
    }

    /// Handles a backslash inside a word.
    fn read_backslash(
        &mut self,
        text: &mut Vec<u8>,
        quoted: &mut bool,
        dblquote: bool,
        heredoc: bool,
    ) -> Result<(), Error> {
        match self.input.pget() {
            InChar::Eof => {
                text.push(CTL_ESC);
                text.push(b'\\');
            }
            InChar::EndOfAlias => {
                text.push(CTL_ESC);
                text.push(b'\\');
            }
            InChar::Byte(b'\n') => self.nl_prompt(),
            InChar::Byte(b) => {
                if dblquote && b != b'\\' && b != b'`' && b != b'$' && (b != b'"' || heredoc) {
                    // Not escapable here; the backslash stays.
                    text.push(b'\\');
                }
                if classify(Syntax::SQuote, InChar::Byte(b)) == Class::Ctl {
                    text.push(CTL_ESC);
                }
                text.push(b);
                *quoted = true;
            }
        }
        Ok(())
    }

    /// Handles `$` in a word: parameter expansion, command substitution,
    /// or arithmetic.
    #[allow(clippy::too_many_arguments)]
    fn read_dollar(
        &mut self,
        text: &mut Vec<u8>,
        subs: &mut Vec<Rc<[u8]>>,
        syntax: &mut Syntax,
        dblquote: &mut bool,
        varnest: &mut Vec<bool>,
        dq_varnest: &mut usize,
        ari_prev: &mut Option<(Syntax, bool)>,
        ari_parens: &mut usize,
    ) -> Result<(), Error> {
        let c = self.input.pget();
        match c {
            InChar::Byte(b'(') => {
                if *syntax != Syntax::Arith && self.peek_byte(b'(') {
                    // $(( — arithmetic expansion
                    if ari_prev.is_some() {
                        return self.error("nested arithmetic expansion");
                    }
                    text.push(CTL_ARI);
                    *ari_prev = Some((*syntax, *dblquote));
                    *ari_parens = 0;
                    *syntax = Syntax::Arith;
                } else {
                    let content = self.scan_command_subst()?;
                    subs.push(content.into());
                    text.push(CTL_BACKQ);
                }
            }
            InChar::Byte(b'{') => {
                self.read_braced_param(text, *dblquote, varnest, dq_varnest)?;
            }
            InChar::Byte(b) if is_name_start(b) => {
                text.push(CTL_VAR);
                text.push(VS_NORMAL);
                text.push(b);
                loop {
                    match self.input.pget() {
                        InChar::Byte(b) if is_name_char(b) => text.push(b),
                        c => {
                            self.input.unget(c);
                            break;
                        }
                    }
                }
                text.push(b'=');
                text.push(CTL_ENDVAR);
            }
            InChar::Byte(b) if b.is_ascii_digit() || is_special_param(b) => {
                text.push(CTL_VAR);
                text.push(VS_NORMAL);
                text.push(b);
                text.push(b'=');
                text.push(CTL_ENDVAR);
            }
            c => {
                // A lone `$` is literal.
                text.push(b'$');
                self.input.unget(c);
            }
        }
        Ok(())
    }

    /// Parses `${...}` up to and including the operator; the operator
    /// word, if any, is read inline by the main machine.
    fn read_braced_param(
        &mut self,
        text: &mut Vec<u8>,
        dblquote: bool,
        varnest: &mut Vec<bool>,
        dq_varnest: &mut usize,
    ) -> Result<(), Error> {
        let mut name: Vec<u8> = Vec::new();
        let mut length = false;

        let mut c = self.input.pget();
        if c == InChar::Byte(b'#') {
            let c2 = self.input.pget();
            if c2 == InChar::Byte(b'}') {
                // ${#} is the positional count.
                text.extend_from_slice(&[CTL_VAR, VS_NORMAL, b'#', b'=', CTL_ENDVAR]);
                return Ok(());
            }
            length = true;
            c = c2;
        }

        match c {
            InChar::Byte(b) if is_name_start(b) => {
                name.push(b);
                loop {
                    match self.input.pget() {
                        InChar::Byte(b) if is_name_char(b) => name.push(b),
                        c => {
                            self.input.unget(c);
                            break;
                        }
                    }
                }
            }
            InChar::Byte(b) if b.is_ascii_digit() => {
                name.push(b);
                loop {
                    match self.input.pget() {
                        InChar::Byte(b) if b.is_ascii_digit() => name.push(b),
                        c => {
                            self.input.unget(c);
                            break;
                        }
                    }
                }
            }
            InChar::Byte(b) if is_special_param(b) => name.push(b),
            _ => return self.error("bad substitution"),
        }

        if length {
            match self.input.pget() {
                InChar::Byte(b'}') => {
                    text.push(CTL_VAR);
                    text.push(VS_LENGTH);
                    text.extend_from_slice(&name);
                    text.push(b'=');
                    text.push(CTL_ENDVAR);
                    return Ok(());
                }
                _ => return self.error("bad substitution"),
            }
        }

        let mut subtype_byte = 0u8;
        match self.input.pget() {
            InChar::Byte(b'}') => {
                text.push(CTL_VAR);
                text.push(VS_NORMAL);
                text.extend_from_slice(&name);
                text.push(b'=');
                text.push(CTL_ENDVAR);
                return Ok(());
            }
            InChar::Byte(b':') => {
                subtype_byte |= VS_NUL;
                match self.input.pget() {
                    InChar::Byte(b'-') => subtype_byte |= VS_MINUS,
                    InChar::Byte(b'+') => subtype_byte |= VS_PLUS,
                    InChar::Byte(b'?') => subtype_byte |= VS_QUESTION,
                    InChar::Byte(b'=') => subtype_byte |= VS_ASSIGN,
                    _ => return self.error("bad substitution"),
                }
            }
            InChar::Byte(b'-') => subtype_byte |= VS_MINUS,
            InChar::Byte(b'+') => subtype_byte |= VS_PLUS,
            InChar::Byte(b'?') => subtype_byte |= VS_QUESTION,
            InChar::Byte(b'=') => subtype_byte |= VS_ASSIGN,
            InChar::Byte(b'%') => {
                subtype_byte |= if self.peek_byte(b'%') {
                    VS_TRIM_RIGHT_MAX
                } else {
                    VS_TRIM_RIGHT
                };
            }
            InChar::Byte(b'#') => {
                subtype_byte |= if self.peek_byte(b'#') {
                    VS_TRIM_LEFT_MAX
                } else {
                    VS_TRIM_LEFT
                };
            }
            _ => return self.error("bad substitution"),
        }

        text.push(CTL_VAR);
        text.push(subtype_byte);
        text.extend_from_slice(&name);
        text.push(b'=');
        // The operator word follows; it is terminated by `}` which the
        // main machine turns into CTL_ENDVAR.
        varnest.push(dblquote);
        if dblquote {
            *dq_varnest += 1;
        }
        Ok(())
    }

    /// Scans the body of a `$(...)` command substitution, returning the
    /// raw command text.
    ///
    /// The scan tracks nested parentheses, quotes, backslashes, and
    /// comments; the text is parsed for real when the substitution is
    /// expanded.
    fn scan_command_subst(&mut self) -> Result<Vec<u8>, Error> {
        let mut content = Vec::new();
        let mut depth = 1usize;
        #[derive(PartialEq)]
        enum State {
            Normal,
            SQuote,
            DQuote,
            Comment,
        }
        let mut state = State::Normal;
        // `#` starts a comment only at the start of a word.
        let mut word_start = true;
        loop {
            let byte = match self.input.pget() {
                InChar::Eof => return self.error("unterminated command substitution"),
                InChar::EndOfAlias => continue,
                InChar::Byte(b) => b,
            };
            let was_word_start = word_start;
            word_start = matches!(byte, b' ' | b'\t' | b'\n' | b';' | b'&' | b'|' | b'(');
            match state {
                State::Normal => match byte {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(content);
                        }
                    }
                    b'\'' => state = State::SQuote,
                    b'"' => state = State::DQuote,
                    b'#' if was_word_start => state = State::Comment,
                    b'\\' => {
                        content.push(b'\\');
                        if let InChar::Byte(b) = self.input.pget() {
                            content.push(b);
                        }
                        continue;
                    }
                    b'\n' => self.nl_prompt(),
                    _ => {}
                },
                State::SQuote => {
                    if byte == b'\'' {
                        state = State::Normal;
                    }
                }
                State::DQuote => match byte {
                    b'"' => state = State::Normal,
                    b'\\' => {
                        content.push(b'\\');
                        if let InChar::Byte(b) = self.input.pget() {
                            content.push(b);
                        }
                        continue;
                    }
                    _ => {}
                },
                State::Comment => {
                    if byte == b'\n' {
                        state = State::Normal;
                    }
                }
            }
            content.push(byte);
        }
    }

    /// Scans a `` `...` `` command substitution, unescaping one level of
    /// backslashes before `$`, `` ` `` and `\`.
    fn scan_backquote(&mut self) -> Result<Vec<u8>, Error> {
        let mut content = Vec::new();
        loop {
            match self.input.pget() {
                InChar::Eof => return self.error("unterminated command substitution"),
                InChar::EndOfAlias => {}
                InChar::Byte(b'`') => return Ok(content),
                InChar::Byte(b'\\') => match self.input.pget() {
                    InChar::Byte(b @ (b'$' | b'`' | b'\\')) => content.push(b),
                    InChar::Byte(b'\n') => self.nl_prompt(),
                    c => {
                        content.push(b'\\');
                        if let InChar::Byte(b) = c {
                            content.push(b);
                        }
                    }
                },
                InChar::Byte(b'\n') => {
                    content.push(b'\n');
                    self.nl_prompt();
                }
                InChar::Byte(b) => content.push(b),
            }
        }
    }
}

/// Context the word machine runs in
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WordMode {
    /// Ordinary word in a command
    Normal,
    /// Body of a here-document with an unquoted delimiter
    Heredoc,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(text: &str) -> Lexer {
        Lexer::new(InputStack::from_text(text))
    }

    fn tokens(text: &str, flags: TokenFlags) -> Vec<Token> {
        let aliases = AliasSet::new();
        let mut lexer = lexer(text);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token(flags, &aliases).expect("lex error");
            let done = token == Token::Eof;
            out.push(token);
            if done {
                return out;
            }
        }
    }

    fn word(text: &str) -> WordToken {
        let aliases = AliasSet::new();
        let mut lexer = lexer(text);
        match lexer.next_token(TokenFlags::NONE, &aliases).unwrap() {
            Token::Word(w) => w,
            other => panic!("not a word: {other:?}"),
        }
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokens("; ;; & && | || ( )\n", TokenFlags::NONE),
            [
                Token::Semi,
                Token::DSemi,
                Token::Amp,
                Token::AndIf,
                Token::Pipe,
                Token::OrIf,
                Token::OpenParen,
                Token::CloseParen,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn plain_word() {
        let w = word("hello");
        assert_eq!(w.word.text, b"hello");
        assert!(!w.quoted);
        assert!(w.word.is_literal());
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens("a # rest of line\nb\n", TokenFlags::NONE),
            [
                Token::Word(word("a")),
                Token::Newline,
                Token::Word(word("b")),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn single_quotes() {
        let w = word("'a b'");
        assert_eq!(
            w.word.text,
            [
                &[CTL_QUOTEMARK][..],
                b"a b",
                &[CTL_QUOTEMARK][..],
            ]
            .concat()
        );
        assert!(w.quoted);
    }

    #[test]
    fn single_quoted_metachars_are_escaped() {
        let w = word("'*'");
        assert_eq!(w.word.text, [CTL_QUOTEMARK, CTL_ESC, b'*', CTL_QUOTEMARK]);
    }

    #[test]
    fn double_quote_backslash() {
        // In double quotes only $ ` " \ are escapable; an escaped `$`
        // becomes a plain byte (which no later pass interprets), and a
        // backslash before anything else stays.
        let w = word(r#""\$x \a""#);
        assert_eq!(
            w.word.text,
            [
                &[CTL_QUOTEMARK, b'$', b'x', b' ', b'\\', b'a'][..],
                &[CTL_QUOTEMARK][..],
            ]
            .concat()
        );
        assert!(w.quoted);
    }

    #[test]
    fn base_backslash_escapes_anything() {
        let w = word(r"\*");
        assert_eq!(w.word.text, [CTL_ESC, b'*']);
        assert!(w.quoted);
    }

    #[test]
    fn line_continuation() {
        let w = word("ab\\\ncd");
        assert_eq!(w.word.text, b"abcd");
        assert!(!w.quoted);
    }

    #[test]
    fn simple_parameter() {
        let w = word("$x");
        assert_eq!(
            w.word.text,
            [CTL_VAR, VS_NORMAL, b'x', b'=', CTL_ENDVAR]
        );
    }

    #[test]
    fn special_parameters() {
        for (src, name) in [("$?", b'?'), ("$#", b'#'), ("$$", b'$'), ("$!", b'!')] {
            let w = word(src);
            assert_eq!(w.word.text, [CTL_VAR, VS_NORMAL, name, b'=', CTL_ENDVAR]);
        }
    }

    #[test]
    fn braced_parameter_with_default() {
        let w = word("${x:-y}");
        assert_eq!(
            w.word.text,
            [
                CTL_VAR,
                VS_MINUS | VS_NUL,
                b'x',
                b'=',
                b'y',
                CTL_ENDVAR
            ]
        );
    }

    #[test]
    fn braced_parameter_trim() {
        let w = word("${x##*/}");
        assert_eq!(
            w.word.text,
            [
                &[CTL_VAR, VS_TRIM_LEFT_MAX, b'x', b'='][..],
                &[b'*', b'/', CTL_ENDVAR][..],
            ]
            .concat()
        );
    }

    #[test]
    fn parameter_length() {
        let w = word("${#x}");
        assert_eq!(w.word.text, [CTL_VAR, VS_LENGTH, b'x', b'=', CTL_ENDVAR]);
    }

    #[test]
    fn positional_count() {
        let w = word("${#}");
        assert_eq!(w.word.text, [CTL_VAR, VS_NORMAL, b'#', b'=', CTL_ENDVAR]);
    }

    #[test]
    fn command_substitution_modern() {
        let w = word("$(echo hi)");
        assert_eq!(w.word.text, [CTL_BACKQ]);
        assert_eq!(w.word.substitutions.len(), 1);
        assert_eq!(&*w.word.substitutions[0], b"echo hi");
    }

    #[test]
    fn command_substitution_nested_parens() {
        let w = word("$(a (b) c)");
        assert_eq!(&*w.word.substitutions[0], b"a (b) c");
    }

    #[test]
    fn command_substitution_with_quotes() {
        let w = word("$(echo ')' \")\")");
        assert_eq!(&*w.word.substitutions[0], b"echo ')' \")\"");
    }

    #[test]
    fn command_substitution_hash_in_word_is_not_a_comment() {
        let w = word("$(echo a#b)");
        assert_eq!(&*w.word.substitutions[0], b"echo a#b");
    }

    #[test]
    fn command_substitution_comment_hides_parens() {
        let w = word("$(echo x # )\n)");
        assert_eq!(&*w.word.substitutions[0], b"echo x # )\n");
    }

    #[test]
    fn backquote_substitution() {
        let w = word(r"`echo \$x \\ \z`");
        assert_eq!(w.word.text, [CTL_BACKQ]);
        assert_eq!(&*w.word.substitutions[0], br"echo $x \ \z");
    }

    #[test]
    fn arithmetic_expansion() {
        let w = word("$(( (1+2) * 3 ))");
        let mut expected = vec![CTL_ARI];
        expected.extend_from_slice(b" (1+2) * 3 ");
        expected.push(CTL_ENDARI);
        assert_eq!(w.word.text, expected);
    }

    #[test]
    fn redirection_tokens() {
        assert_eq!(
            tokens("< > >> <> >| <& >& << <<-\n", TokenFlags::NONE)[..9],
            [
                Token::Redir { fd: None, op: RedirOp::Less },
                Token::Redir { fd: None, op: RedirOp::Great },
                Token::Redir { fd: None, op: RedirOp::DGreat },
                Token::Redir { fd: None, op: RedirOp::LessGreat },
                Token::Redir { fd: None, op: RedirOp::Clobber },
                Token::Redir { fd: None, op: RedirOp::LessAnd },
                Token::Redir { fd: None, op: RedirOp::GreatAnd },
                Token::Redir { fd: None, op: RedirOp::DLess },
                Token::Redir { fd: None, op: RedirOp::DLessDash },
            ]
        );
    }

    #[test]
    fn descriptor_prefix() {
        let toks = tokens("2>file\n", TokenFlags::NONE);
        assert_eq!(toks[0], Token::Redir { fd: Some(2), op: RedirOp::Great });
        assert_eq!(toks[1], Token::Word(word("file")));
    }

    #[test]
    fn quoted_digits_are_not_a_descriptor() {
        let toks = tokens("\"2\">file\n", TokenFlags::NONE);
        assert!(matches!(toks[0], Token::Word(_)));
        assert_eq!(toks[1], Token::Redir { fd: None, op: RedirOp::Great });
    }

    #[test]
    fn keywords_only_when_requested() {
        let toks = tokens("if\n", TokenFlags::COMMAND);
        assert_eq!(toks[0], Token::Keyword(Keyword::If));
        let toks = tokens("if\n", TokenFlags::NONE);
        assert!(matches!(toks[0], Token::Word(_)));
    }

    #[test]
    fn quoted_keyword_is_a_word() {
        let toks = tokens("\\if\n", TokenFlags::COMMAND);
        assert!(matches!(toks[0], Token::Word(_)));
    }

    #[test]
    fn alias_substitution() {
        let mut aliases = AliasSet::new();
        aliases.insert(crate::alias::HashEntry::new("greet", "echo hello"));
        let mut lexer = lexer("greet world\n");
        let t1 = lexer.next_token(TokenFlags::COMMAND, &aliases).unwrap();
        assert_eq!(t1, Token::Word(word("echo")));
        let t2 = lexer.next_token(TokenFlags::NONE, &aliases).unwrap();
        assert_eq!(t2, Token::Word(word("hello")));
        let t3 = lexer.next_token(TokenFlags::NONE, &aliases).unwrap();
        assert_eq!(t3, Token::Word(word("world")));
    }

    #[test]
    fn alias_does_not_recurse() {
        let mut aliases = AliasSet::new();
        aliases.insert(crate::alias::HashEntry::new("x", "x y"));
        let mut lexer = lexer("x\n");
        let t1 = lexer.next_token(TokenFlags::COMMAND, &aliases).unwrap();
        assert_eq!(t1, Token::Word(word("x")));
        let t2 = lexer.next_token(TokenFlags::COMMAND, &aliases).unwrap();
        assert_eq!(t2, Token::Word(word("y")));
    }

    #[test]
    fn alias_ending_in_blank_checks_next_word() {
        let mut aliases = AliasSet::new();
        aliases.insert(crate::alias::HashEntry::new("r", "run "));
        aliases.insert(crate::alias::HashEntry::new("v", "verbose"));
        let mut lexer = lexer("r v\n");
        let t1 = lexer.next_token(TokenFlags::COMMAND, &aliases).unwrap();
        assert_eq!(t1, Token::Word(word("run")));
        // Argument position, but the trailing blank re-arms the check.
        let t2 = lexer.next_token(TokenFlags::NONE, &aliases).unwrap();
        assert_eq!(t2, Token::Word(word("verbose")));
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let aliases = AliasSet::new();
        let mut lexer = lexer("'oops\n");
        assert!(lexer.next_token(TokenFlags::NONE, &aliases).is_err());
    }

    #[test]
    fn ctl_range_input_bytes_are_escaped() {
        let text: Vec<u8> = vec![b'a', CTL_ESC, b'b', b'\n'];
        let aliases = AliasSet::new();
        let mut lexer = Lexer::new(InputStack::from_text(text));
        let token = lexer.next_token(TokenFlags::NONE, &aliases).unwrap();
        match token {
            Token::Word(w) => {
                assert_eq!(w.word.text, [b'a', CTL_ESC, CTL_ESC, b'b']);
            }
            other => panic!("not a word: {other:?}"),
        }
    }
}
