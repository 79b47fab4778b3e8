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

//! This crate implements the arithmetic expression evaluator used for
//! `$((...))` expansion.
//!
//! Expressions operate on signed 64-bit integers. The grammar is the usual
//! C-like operator set: unary `+ - ! ~`, the binary operators `* / % + -
//! << >> < <= > >= == != & ^ | && ||`, the conditional operator `?:`, and
//! the assignment operators `= *= /= %= += -= <<= >>= &= ^= |=` with
//! right associativity. `&&`, `||` and `?:` short-circuit: the unevaluated
//! side is still parsed, but variable references in it are not resolved and
//! assignments in it are not performed.
//!
//! Variables are resolved lazily through the [`Env`] trait. An unset
//! variable (or one whose value is not a number) evaluates to 0; the
//! caller's `Env` implementation may instead return an error, which is how
//! the shell makes `set -u` reject unset variables.
//!
//! Constants use the C radix prefixes: `0x`/`0X` for hexadecimal, a leading
//! `0` for octal, decimal otherwise.
//!
//! # Examples
//!
//! ```
//! # use rash_arith::eval;
//! let env = &mut std::collections::HashMap::new();
//! assert_eq!(eval("(1 + 2) * 3", env), Ok(9));
//! assert_eq!(eval("x = 6", env), Ok(6));
//! assert_eq!(env.get("x").map(String::as_str), Some("6"));
//! ```

use std::fmt::Display;
use std::iter::Peekable;
use std::ops::Range;

mod env;
mod token;

pub use env::Env;
use token::Operator;
pub use token::TokenError;
use token::{Token, TokenValue, Tokens};

/// Syntax error in an expression
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    /// An operand was expected but an operator or the end of input was found.
    #[error("expected a value")]
    MissingOperand,
    /// A `(` without a matching `)`.
    #[error("unbalanced parentheses")]
    UnbalancedParen,
    /// A `?` without a matching `:`.
    #[error("`?' without matching `:'")]
    MissingColon,
    /// The left-hand side of an assignment is not a variable.
    #[error("assignment to a non-variable")]
    InvalidLValue,
    /// Tokens remain after a complete expression.
    #[error("trailing characters after expression")]
    TrailingToken,
}

/// Cause of an evaluation error
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum ErrorCause<E> {
    /// Error in tokenization
    #[error(transparent)]
    TokenError(TokenError),
    /// Error in the expression grammar
    #[error(transparent)]
    SyntaxError(SyntaxError),
    /// Result out of the `i64` range
    #[error("overflow")]
    Overflow,
    /// Division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Error reported by the variable environment
    #[error("{0}")]
    EnvError(E),
}

/// Description of an error that occurred during evaluation
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Error<E> {
    /// Cause of the error
    pub cause: ErrorCause<E>,
    /// Range of the substring in the expression where the error occurred
    pub location: Range<usize>,
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.cause.fmt(f)
    }
}

impl<E: std::fmt::Debug + Display> std::error::Error for Error<E> {}

impl<E> From<token::Error> for Error<E> {
    fn from(e: token::Error) -> Self {
        Error {
            cause: ErrorCause::TokenError(e.cause),
            location: e.location,
        }
    }
}

/// Specifies whether a parse function evaluates what it parses.
///
/// The unchosen side of `&&`, `||` and `?:` is parsed in `Skip` mode so that
/// its variable references and assignments have no effect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Eval,
    Skip,
}

/// Partial result: either a computed value or a not-yet-resolved variable.
///
/// Keeping variables unresolved until their value is needed lets `x = 1`
/// assign without reading `x` first, and lets the skip mode avoid resolving
/// at all.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Term<'a> {
    Value(i64),
    Variable { name: &'a str, location: Range<usize> },
}

/// Parses a variable value the way `strtol` would: optional sign, radix
/// prefix, trailing garbage ignored by yielding 0 for the whole value.
fn parse_value(text: &str) -> i64 {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse()
    };
    match parsed {
        Ok(value) if negative => value.wrapping_neg(),
        Ok(value) => value,
        Err(_) => 0,
    }
}

type EvalResult<T, E> = Result<T, Error<<E as Env>::Error>>;

struct Evaluator<'a, E: Env> {
    tokens: Peekable<Tokens<'a>>,
    env: &'a mut E,
    /// End position of the expression, for errors at end of input.
    end: usize,
}

impl<'a, E: Env> Evaluator<'a, E> {
    fn error<T>(&self, cause: ErrorCause<E::Error>, location: Range<usize>) -> EvalResult<T, E> {
        Err(Error { cause, location })
    }

    fn syntax_error<T>(&self, error: SyntaxError, location: Range<usize>) -> EvalResult<T, E> {
        self.error(ErrorCause::SyntaxError(error), location)
    }

    fn peek_operator(&mut self) -> Option<(Operator, Range<usize>)> {
        match self.tokens.peek() {
            Some(Ok(Token {
                value: TokenValue::Operator(op),
                location,
            })) => Some((*op, location.clone())),
            _ => None,
        }
    }

    fn next_token(&mut self) -> EvalResult<Option<Token<'a>>, E> {
        Ok(self.tokens.next().transpose()?)
    }

    /// Resolves a term to its numeric value.
    fn value_of(&mut self, term: Term<'a>, mode: Mode) -> EvalResult<i64, E> {
        if mode == Mode::Skip {
            return Ok(0);
        }
        match term {
            Term::Value(value) => Ok(value),
            Term::Variable { name, location } => match self.env.get_variable(name) {
                Ok(Some(value)) => Ok(parse_value(&value)),
                Ok(None) => Ok(0),
                Err(e) => self.error(ErrorCause::EnvError(e), location),
            },
        }
    }

    /// Parses a constant, variable, parenthesized expression, or unary
    /// operator application.
    fn leaf(&mut self, mode: Mode) -> EvalResult<Term<'a>, E> {
        let Some(token) = self.next_token()? else {
            return self.syntax_error(SyntaxError::MissingOperand, self.end..self.end);
        };
        match token.value {
            TokenValue::Number(value) => Ok(Term::Value(value)),
            TokenValue::Identifier(name) => Ok(Term::Variable {
                name,
                location: token.location,
            }),
            TokenValue::Operator(Operator::OpenParen) => {
                let inner = self.assignment(mode)?;
                match self.next_token()? {
                    Some(Token {
                        value: TokenValue::Operator(Operator::CloseParen),
                        ..
                    }) => Ok(inner),
                    _ => self.syntax_error(SyntaxError::UnbalancedParen, token.location),
                }
            }
            TokenValue::Operator(Operator::Plus) => {
                let operand = self.leaf(mode)?;
                Ok(Term::Value(self.value_of(operand, mode)?))
            }
            TokenValue::Operator(Operator::Minus) => {
                let operand = self.leaf(mode)?;
                let value = self.value_of(operand, mode)?;
                match value.checked_neg() {
                    Some(value) => Ok(Term::Value(value)),
                    None => self.error(ErrorCause::Overflow, token.location),
                }
            }
            TokenValue::Operator(Operator::Tilde) => {
                let operand = self.leaf(mode)?;
                let value = self.value_of(operand, mode)?;
                Ok(Term::Value(!value))
            }
            TokenValue::Operator(Operator::Bang) => {
                let operand = self.leaf(mode)?;
                let value = self.value_of(operand, mode)?;
                Ok(Term::Value((value == 0) as i64))
            }
            TokenValue::Operator(_) => {
                self.syntax_error(SyntaxError::MissingOperand, token.location)
            }
        }
    }

    fn apply_binary(
        &self,
        op: Operator,
        lhs: i64,
        rhs: i64,
        location: Range<usize>,
    ) -> EvalResult<i64, E> {
        use Operator::*;
        fn overflow<E>(r: Option<i64>, location: &Range<usize>) -> Result<i64, Error<E>> {
            match r {
                Some(value) => Ok(value),
                None => Err(Error {
                    cause: ErrorCause::Overflow,
                    location: location.clone(),
                }),
            }
        }
        match op {
            Bar => Ok(lhs | rhs),
            Caret => Ok(lhs ^ rhs),
            Amp => Ok(lhs & rhs),
            EqualEqual => Ok((lhs == rhs) as i64),
            BangEqual => Ok((lhs != rhs) as i64),
            Less => Ok((lhs < rhs) as i64),
            LessEqual => Ok((lhs <= rhs) as i64),
            Greater => Ok((lhs > rhs) as i64),
            GreaterEqual => Ok((lhs >= rhs) as i64),
            LessLess => overflow(
                u32::try_from(rhs).ok().and_then(|n| lhs.checked_shl(n)),
                &location,
            ),
            GreaterGreater => overflow(
                u32::try_from(rhs).ok().and_then(|n| lhs.checked_shr(n)),
                &location,
            ),
            Plus => overflow(lhs.checked_add(rhs), &location),
            Minus => overflow(lhs.checked_sub(rhs), &location),
            Asterisk => overflow(lhs.checked_mul(rhs), &location),
            Slash | Percent if rhs == 0 => self.error(ErrorCause::DivisionByZero, location),
            Slash => overflow(lhs.checked_div(rhs), &location),
            Percent => overflow(lhs.checked_rem(rhs), &location),
            _ => unreachable!("not a binary operator: {op:?}"),
        }
    }

    /// Precedence climber over the plain binary operators.
    fn binary(&mut self, min_precedence: u8, mode: Mode) -> EvalResult<Term<'a>, E> {
        let mut term = self.leaf(mode)?;

        while let Some((operator, location)) = self.peek_operator() {
            let Some(precedence) = operator.binary_precedence() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.tokens.next();

            match operator {
                Operator::AmpAmp | Operator::BarBar => {
                    let lhs = self.value_of(term, mode)?;
                    let skip_rhs = match operator {
                        Operator::AmpAmp => lhs == 0,
                        _ => lhs != 0,
                    };
                    let rhs_mode = if skip_rhs { Mode::Skip } else { mode };
                    let rhs_term = self.binary(precedence + 1, rhs_mode)?;
                    let rhs = self.value_of(rhs_term, rhs_mode)?;
                    let result = match operator {
                        Operator::AmpAmp => lhs != 0 && rhs != 0,
                        _ => lhs != 0 || rhs != 0,
                    };
                    term = Term::Value(result as i64);
                }
                _ => {
                    let rhs_term = self.binary(precedence + 1, mode)?;
                    let lhs = self.value_of(term, mode)?;
                    let rhs = self.value_of(rhs_term, mode)?;
                    term = if mode == Mode::Eval {
                        Term::Value(self.apply_binary(operator, lhs, rhs, location)?)
                    } else {
                        Term::Value(0)
                    };
                }
            }
        }

        Ok(term)
    }

    /// Parses `a ? b : c`, evaluating only the chosen branch.
    fn conditional(&mut self, mode: Mode) -> EvalResult<Term<'a>, E> {
        let term = self.binary(1, mode)?;
        let Some((Operator::Question, location)) = self.peek_operator() else {
            return Ok(term);
        };
        self.tokens.next();

        let condition = self.value_of(term, mode)?;
        let (then_mode, else_mode) = match mode {
            Mode::Skip => (Mode::Skip, Mode::Skip),
            Mode::Eval if condition != 0 => (Mode::Eval, Mode::Skip),
            Mode::Eval => (Mode::Skip, Mode::Eval),
        };

        let then_term = self.assignment(then_mode)?;
        let then_value = self.value_of(then_term, then_mode)?;
        match self.next_token()? {
            Some(Token {
                value: TokenValue::Operator(Operator::Colon),
                ..
            }) => {}
            _ => return self.syntax_error(SyntaxError::MissingColon, location),
        }
        let else_term = self.assignment(else_mode)?;
        let else_value = self.value_of(else_term, else_mode)?;

        Ok(Term::Value(if condition != 0 {
            then_value
        } else {
            else_value
        }))
    }

    /// Parses an assignment, the lowest-precedence (right-associative)
    /// construct.
    fn assignment(&mut self, mode: Mode) -> EvalResult<Term<'a>, E> {
        let term = self.conditional(mode)?;
        let Some((operator, location)) = self.peek_operator() else {
            return Ok(term);
        };
        if !operator.is_assignment() {
            return Ok(term);
        }
        self.tokens.next();

        let Term::Variable { name, .. } = term else {
            return self.syntax_error(SyntaxError::InvalidLValue, location);
        };

        let rhs_term = self.assignment(mode)?;
        let rhs = self.value_of(rhs_term, mode)?;
        if mode == Mode::Skip {
            return Ok(Term::Value(0));
        }

        let value = match operator.compound_assignment() {
            None => rhs,
            Some(binary) => {
                let current = self.value_of(
                    Term::Variable {
                        name,
                        location: location.clone(),
                    },
                    mode,
                )?;
                self.apply_binary(binary, current, rhs, location.clone())?
            }
        };
        if let Err(e) = self.env.assign_variable(name, value.to_string()) {
            return self.error(ErrorCause::EnvError(e), location);
        }
        Ok(Term::Value(value))
    }
}

/// Evaluates an arithmetic expression.
///
/// Identifiers are resolved and assigned through `env`. On success the
/// result is the value of the whole expression.
///
/// # Errors
///
/// Tokenization errors, grammar errors, overflow, division by zero, and any
/// error returned by `env` abort the evaluation.
pub fn eval<E: Env>(expression: &str, env: &mut E) -> Result<i64, Error<E::Error>> {
    let mut evaluator = Evaluator {
        tokens: Tokens::new(expression).peekable(),
        env,
        end: expression.len(),
    };
    let term = evaluator.assignment(Mode::Eval)?;
    let value = evaluator.value_of(term, Mode::Eval)?;
    if let Some(token) = evaluator.next_token()? {
        return Err(Error {
            cause: ErrorCause::SyntaxError(SyntaxError::TrailingToken),
            location: token.location,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn eval_new(expression: &str) -> Result<i64, Error<std::convert::Infallible>> {
        eval(expression, &mut HashMap::new())
    }

    #[test]
    fn constants() {
        assert_eq!(eval_new("42"), Ok(42));
        assert_eq!(eval_new("0x10"), Ok(16));
        assert_eq!(eval_new("010"), Ok(8));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval_new("-5"), Ok(-5));
        assert_eq!(eval_new("+5"), Ok(5));
        assert_eq!(eval_new("~0"), Ok(-1));
        assert_eq!(eval_new("!0"), Ok(1));
        assert_eq!(eval_new("!7"), Ok(0));
        assert_eq!(eval_new("--5"), Ok(5));
        assert_eq!(eval_new("-~!0"), Ok(2));
    }

    #[test]
    fn binary_precedence() {
        assert_eq!(eval_new("1 + 2 * 3"), Ok(7));
        assert_eq!(eval_new("(1 + 2) * 3"), Ok(9));
        assert_eq!(eval_new("2 + 3 % 2"), Ok(3));
        assert_eq!(eval_new("1 << 4 - 1"), Ok(8));
        assert_eq!(eval_new("7 & 3 | 4"), Ok(7));
        assert_eq!(eval_new("1 | 2 ^ 2"), Ok(1));
        assert_eq!(eval_new("3 < 5 == 1"), Ok(1));
    }

    #[test]
    fn division_property() {
        for a in [-17, -5, -1, 0, 1, 5, 17, 1000] {
            for b in [-7, -3, -1, 1, 3, 7] {
                let expr = format!("({a} / {b}) * {b} + ({a} % {b})");
                assert_eq!(eval_new(&expr), Ok(a), "{expr}");
            }
        }
    }

    #[test]
    fn division_by_zero() {
        assert_matches!(eval_new("1 / 0"), Err(e) => {
            assert_eq!(e.cause, ErrorCause::DivisionByZero);
        });
        assert_matches!(eval_new("1 % 0"), Err(e) => {
            assert_eq!(e.cause, ErrorCause::DivisionByZero);
        });
    }

    #[test]
    fn overflow() {
        assert_matches!(eval_new("9223372036854775807 + 1"), Err(e) => {
            assert_eq!(e.cause, ErrorCause::Overflow);
        });
    }

    #[test]
    fn variables() {
        let env = &mut HashMap::new();
        env.insert("x".to_owned(), "17".to_owned());
        env.insert("hex".to_owned(), "0x11".to_owned());
        env.insert("junk".to_owned(), "foo".to_owned());
        assert_eq!(eval("x + 1", env), Ok(18));
        assert_eq!(eval("hex", env), Ok(17));
        // Unset and non-numeric variables evaluate to 0.
        assert_eq!(eval("unset_variable", env), Ok(0));
        assert_eq!(eval("junk", env), Ok(0));
    }

    #[test]
    fn assignment() {
        let env = &mut HashMap::new();
        assert_eq!(eval("x = 6", env), Ok(6));
        assert_eq!(env.get("x").map(String::as_str), Some("6"));
        assert_eq!(eval("x += 4", env), Ok(10));
        assert_eq!(eval("x <<= 2", env), Ok(40));
        assert_eq!(eval("x %= 7", env), Ok(5));
        assert_eq!(eval("y = x = 1", env), Ok(1));
        assert_eq!(env.get("y").map(String::as_str), Some("1"));
    }

    #[test]
    fn assignment_requires_lvalue() {
        assert_matches!(eval_new("1 = 2"), Err(e) => {
            assert_eq!(
                e.cause,
                ErrorCause::SyntaxError(SyntaxError::InvalidLValue)
            );
        });
    }

    #[test]
    fn short_circuit_suppresses_side_effects() {
        let env = &mut HashMap::new();
        assert_eq!(eval("0 && (x = 1)", env), Ok(0));
        assert_eq!(env.get("x"), None);
        assert_eq!(eval("1 || (x = 1)", env), Ok(1));
        assert_eq!(env.get("x"), None);
        assert_eq!(eval("1 && (x = 1)", env), Ok(1));
        assert_eq!(env.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn short_circuit_still_parses() {
        assert_matches!(eval_new("0 && ("), Err(e) => {
            assert_matches!(e.cause, ErrorCause::SyntaxError(_));
        });
    }

    #[test]
    fn conditional_operator() {
        let env = &mut HashMap::new();
        assert_eq!(eval("1 ? 2 : 3", env), Ok(2));
        assert_eq!(eval("0 ? 2 : 3", env), Ok(3));
        // Only the chosen branch is evaluated.
        assert_eq!(eval("1 ? 2 : (x = 9)", env), Ok(2));
        assert_eq!(env.get("x"), None);
        assert_eq!(eval("0 ? (x = 9) : 4", env), Ok(4));
        assert_eq!(env.get("x"), None);
        // Nesting associates to the right.
        assert_eq!(eval("0 ? 1 : 0 ? 2 : 3", env), Ok(3));
    }

    #[test]
    fn syntax_errors() {
        assert_matches!(eval_new(""), Err(e) => {
            assert_eq!(
                e.cause,
                ErrorCause::SyntaxError(SyntaxError::MissingOperand)
            );
        });
        assert_matches!(eval_new("(1"), Err(e) => {
            assert_eq!(
                e.cause,
                ErrorCause::SyntaxError(SyntaxError::UnbalancedParen)
            );
        });
        assert_matches!(eval_new("1 ? 2"), Err(e) => {
            assert_eq!(e.cause, ErrorCause::SyntaxError(SyntaxError::MissingColon));
        });
        assert_matches!(eval_new("1 2"), Err(e) => {
            assert_eq!(
                e.cause,
                ErrorCause::SyntaxError(SyntaxError::TrailingToken)
            );
        });
    }
}
