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

//! Tokenization of arithmetic expressions

use std::iter::FusedIterator;
use std::ops::Range;
use thiserror::Error;

/// Operator token
///
/// The variants cover every operator of the shell arithmetic grammar,
/// including the compound assignment forms.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operator {
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `|`
    Bar,
    /// `||`
    BarBar,
    /// `|=`
    BarEqual,
    /// `^`
    Caret,
    /// `^=`
    CaretEqual,
    /// `&`
    Amp,
    /// `&&`
    AmpAmp,
    /// `&=`
    AmpEqual,
    /// `=`
    Equal,
    /// `==`
    EqualEqual,
    /// `!`
    Bang,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `<<`
    LessLess,
    /// `<<=`
    LessLessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `>>`
    GreaterGreater,
    /// `>>=`
    GreaterGreaterEqual,
    /// `+`
    Plus,
    /// `+=`
    PlusEqual,
    /// `-`
    Minus,
    /// `-=`
    MinusEqual,
    /// `*`
    Asterisk,
    /// `*=`
    AsteriskEqual,
    /// `/`
    Slash,
    /// `/=`
    SlashEqual,
    /// `%`
    Percent,
    /// `%=`
    PercentEqual,
    /// `~`
    Tilde,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
}

impl Operator {
    /// Binding power of this operator when used as a binary operator, or
    /// `None` if it is not a plain binary operator.
    ///
    /// `?:` and the assignment operators are handled separately from the
    /// precedence climber and have no binding power here.
    pub fn binary_precedence(self) -> Option<u8> {
        use Operator::*;
        match self {
            BarBar => Some(1),
            AmpAmp => Some(2),
            Bar => Some(3),
            Caret => Some(4),
            Amp => Some(5),
            EqualEqual | BangEqual => Some(6),
            Less | LessEqual | Greater | GreaterEqual => Some(7),
            LessLess | GreaterGreater => Some(8),
            Plus | Minus => Some(9),
            Asterisk | Slash | Percent => Some(10),
            _ => None,
        }
    }

    /// For a compound assignment operator, the underlying binary operator.
    pub fn compound_assignment(self) -> Option<Operator> {
        use Operator::*;
        match self {
            BarEqual => Some(Bar),
            CaretEqual => Some(Caret),
            AmpEqual => Some(Amp),
            LessLessEqual => Some(LessLess),
            GreaterGreaterEqual => Some(GreaterGreater),
            PlusEqual => Some(Plus),
            MinusEqual => Some(Minus),
            AsteriskEqual => Some(Asterisk),
            SlashEqual => Some(Slash),
            PercentEqual => Some(Percent),
            _ => None,
        }
    }

    /// Whether this operator is `=` or a compound assignment.
    pub fn is_assignment(self) -> bool {
        self == Operator::Equal || self.compound_assignment().is_some()
    }
}

/// Value of a [`Token`]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TokenValue<'a> {
    /// Integer constant
    Number(i64),
    /// Variable name, resolved lazily by the evaluator
    Identifier(&'a str),
    /// Operator
    Operator(Operator),
}

/// Atomic unit of an arithmetic expression
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Token<'a> {
    /// Token content
    pub value: TokenValue<'a>,
    /// Range of the substring where the token occurs in the parsed expression
    pub location: Range<usize>,
}

/// Error in tokenization
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum TokenError {
    /// A numeric constant contains an invalid character, e.g. `0x` or `08`.
    #[error("invalid numeric constant")]
    InvalidNumericConstant,
    /// A character that is not part of any token, e.g. `#`.
    #[error("unrecognized character in expression")]
    UnrecognizedChar,
}

/// Iterator that breaks an expression string into tokens
///
/// Whitespace between tokens is skipped. After the first error, the iterator
/// is fused and yields nothing more.
#[derive(Clone, Debug)]
pub struct Tokens<'a> {
    source: &'a str,
    index: usize,
    failed: bool,
}

impl<'a> Tokens<'a> {
    /// Creates a tokenizer for the given expression.
    pub fn new(source: &'a str) -> Self {
        Tokens {
            source,
            index: 0,
            failed: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.index..]
    }

    fn skip_blanks(&mut self) {
        let trimmed = self.rest().trim_start();
        self.index = self.source.len() - trimmed.len();
    }

    fn number(&mut self) -> Result<Token<'a>, Error> {
        let start = self.index;
        let body = self.rest();
        let len = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(body.len());
        let text = &body[..len];
        self.index += len;
        let location = start..self.index;

        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            if hex.is_empty() {
                None
            } else {
                i64::from_str_radix(hex, 16).ok()
            }
        } else if text.len() > 1 && text.starts_with('0') {
            i64::from_str_radix(&text[1..], 8).ok()
        } else {
            text.parse().ok()
        };
        match parsed {
            Some(value) => Ok(Token {
                value: TokenValue::Number(value),
                location,
            }),
            None => Err(Error {
                cause: TokenError::InvalidNumericConstant,
                location,
            }),
        }
    }

    fn identifier(&mut self) -> Token<'a> {
        let start = self.index;
        let body = self.rest();
        let len = body
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(body.len());
        self.index += len;
        Token {
            value: TokenValue::Identifier(&body[..len]),
            location: start..self.index,
        }
    }

    fn operator(&mut self) -> Result<Token<'a>, Error> {
        use Operator::*;
        let start = self.index;
        let body = self.rest();
        // Longest match first
        const OPERATORS: &[(&str, Operator)] = &[
            ("<<=", LessLessEqual),
            (">>=", GreaterGreaterEqual),
            ("||", BarBar),
            ("|=", BarEqual),
            ("&&", AmpAmp),
            ("&=", AmpEqual),
            ("==", EqualEqual),
            ("!=", BangEqual),
            ("<=", LessEqual),
            ("<<", LessLess),
            (">=", GreaterEqual),
            (">>", GreaterGreater),
            ("+=", PlusEqual),
            ("-=", MinusEqual),
            ("*=", AsteriskEqual),
            ("/=", SlashEqual),
            ("%=", PercentEqual),
            ("^=", CaretEqual),
            ("?", Question),
            (":", Colon),
            ("|", Bar),
            ("^", Caret),
            ("&", Amp),
            ("=", Equal),
            ("!", Bang),
            ("<", Less),
            (">", Greater),
            ("+", Plus),
            ("-", Minus),
            ("*", Asterisk),
            ("/", Slash),
            ("%", Percent),
            ("~", Tilde),
            ("(", OpenParen),
            (")", CloseParen),
        ];
        for &(text, operator) in OPERATORS {
            if body.starts_with(text) {
                self.index += text.len();
                return Ok(Token {
                    value: TokenValue::Operator(operator),
                    location: start..self.index,
                });
            }
        }
        Err(Error {
            cause: TokenError::UnrecognizedChar,
            location: start..start + 1,
        })
    }
}

/// Error with a location, produced by [`Tokens`]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Error {
    /// Cause of the error
    pub cause: TokenError,
    /// Range of the substring where the error occurred
    pub location: Range<usize>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_blanks();
        let next = self.rest().chars().next()?;
        let result = if next.is_ascii_digit() {
            self.number()
        } else if next.is_ascii_alphabetic() || next == '_' {
            Ok(self.identifier())
        } else {
            self.operator()
        };
        self.failed = result.is_err();
        Some(result)
    }
}

impl FusedIterator for Tokens<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(source: &str) -> Vec<TokenValue> {
        Tokens::new(source)
            .map(|t| t.expect("token error").value)
            .collect()
    }

    #[test]
    fn decimal_constants() {
        assert_eq!(values("42"), [TokenValue::Number(42)]);
        assert_eq!(values(" 1 2 "), [TokenValue::Number(1), TokenValue::Number(2)]);
    }

    #[test]
    fn octal_and_hex_constants() {
        assert_eq!(values("0"), [TokenValue::Number(0)]);
        assert_eq!(values("0123"), [TokenValue::Number(0o123)]);
        assert_eq!(values("0x1F"), [TokenValue::Number(0x1F)]);
        assert_eq!(values("0Xff"), [TokenValue::Number(0xFF)]);
    }

    #[test]
    fn invalid_constants() {
        let mut tokens = Tokens::new("08");
        assert_eq!(
            tokens.next(),
            Some(Err(Error {
                cause: TokenError::InvalidNumericConstant,
                location: 0..2,
            }))
        );
        assert_eq!(tokens.next(), None);

        let mut tokens = Tokens::new("0x");
        assert_eq!(
            tokens.next(),
            Some(Err(Error {
                cause: TokenError::InvalidNumericConstant,
                location: 0..2,
            }))
        );
    }

    #[test]
    fn identifiers() {
        assert_eq!(values("foo"), [TokenValue::Identifier("foo")]);
        assert_eq!(values("_x9"), [TokenValue::Identifier("_x9")]);
    }

    #[test]
    fn longest_operator_match() {
        use Operator::*;
        assert_eq!(
            values("a<<=b"),
            [
                TokenValue::Identifier("a"),
                TokenValue::Operator(LessLessEqual),
                TokenValue::Identifier("b"),
            ]
        );
        assert_eq!(
            values("1<<2"),
            [
                TokenValue::Number(1),
                TokenValue::Operator(LessLess),
                TokenValue::Number(2),
            ]
        );
        assert_eq!(
            values("x||y"),
            [
                TokenValue::Identifier("x"),
                TokenValue::Operator(BarBar),
                TokenValue::Identifier("y"),
            ]
        );
    }

    #[test]
    fn token_locations() {
        let tokens: Vec<_> = Tokens::new(" foo + 2")
            .map(|t| t.unwrap().location)
            .collect();
        assert_eq!(tokens, [1..4, 5..6, 7..8]);
    }
}
