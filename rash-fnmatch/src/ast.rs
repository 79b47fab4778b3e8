// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors

//! Abstract syntax tree for globbing patterns

use crate::Error;
use crate::PatternByte;

/// POSIX character class usable in a bracket expression
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ByteClass {
    Alnum,
    Alpha,
    Blank,
    Cntrl,
    Digit,
    Graph,
    Lower,
    Print,
    Punct,
    Space,
    Upper,
    Xdigit,
}

impl ByteClass {
    /// Looks up a class by its `[:name:]` spelling.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        use ByteClass::*;
        Some(match name {
            b"alnum" => Alnum,
            b"alpha" => Alpha,
            b"blank" => Blank,
            b"cntrl" => Cntrl,
            b"digit" => Digit,
            b"graph" => Graph,
            b"lower" => Lower,
            b"print" => Print,
            b"punct" => Punct,
            b"space" => Space,
            b"upper" => Upper,
            b"xdigit" => Xdigit,
            _ => return None,
        })
    }

    /// Whether the byte belongs to the class. ASCII only.
    pub fn contains(self, byte: u8) -> bool {
        use ByteClass::*;
        match self {
            Alnum => byte.is_ascii_alphanumeric(),
            Alpha => byte.is_ascii_alphabetic(),
            Blank => byte == b' ' || byte == b'\t',
            Cntrl => byte.is_ascii_control(),
            Digit => byte.is_ascii_digit(),
            Graph => byte.is_ascii_graphic(),
            Lower => byte.is_ascii_lowercase(),
            Print => byte.is_ascii_graphic() || byte == b' ',
            Punct => byte.is_ascii_punctuation(),
            Space => matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C),
            Upper => byte.is_ascii_uppercase(),
            Xdigit => byte.is_ascii_hexdigit(),
        }
    }
}

/// Bracket expression component
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BracketItem {
    /// Single member byte
    Byte(u8),
    /// Inclusive byte range (`a-z`)
    Range(u8, u8),
    /// Character class (`[:digit:]`)
    Class(ByteClass),
}

impl BracketItem {
    fn contains(self, byte: u8) -> bool {
        match self {
            BracketItem::Byte(b) => byte == b,
            BracketItem::Range(lo, hi) => (lo..=hi).contains(&byte),
            BracketItem::Class(class) => class.contains(byte),
        }
    }
}

/// Bracket expression
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bracket {
    /// Whether the expression starts with `!`
    pub complement: bool,
    /// Members of the expression
    pub items: Vec<BracketItem>,
}

impl Bracket {
    /// Whether the byte matches the bracket expression.
    pub fn matches(&self, byte: u8) -> bool {
        self.items.iter().any(|item| item.contains(byte)) != self.complement
    }
}

/// Pattern component
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Atom {
    /// Byte that matches itself
    Byte(u8),
    /// `?`
    AnyByte,
    /// `*`
    AnyString,
    /// Bracket expression
    Bracket(Bracket),
}

/// Parses a whole pattern into atoms.
pub(crate) fn parse(pattern: &[PatternByte]) -> Result<Vec<Atom>, Error> {
    let mut atoms = Vec::with_capacity(pattern.len());
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            PatternByte::Normal(b'?') => {
                atoms.push(Atom::AnyByte);
                i += 1;
            }
            PatternByte::Normal(b'*') => {
                // Adjacent asterisks are equivalent to one.
                if atoms.last() != Some(&Atom::AnyString) {
                    atoms.push(Atom::AnyString);
                }
                i += 1;
            }
            PatternByte::Normal(b'[') => match parse_bracket(&pattern[i + 1..])? {
                Some((bracket, consumed)) => {
                    atoms.push(Atom::Bracket(bracket));
                    i += 1 + consumed;
                }
                // No closing `]`; the `[` matches itself.
                None => {
                    atoms.push(Atom::Byte(b'['));
                    i += 1;
                }
            },
            PatternByte::Normal(b) | PatternByte::Literal(b) => {
                atoms.push(Atom::Byte(b));
                i += 1;
            }
        }
    }
    Ok(atoms)
}

/// Parses a bracket expression body (everything after the opening `[`).
///
/// Returns the expression and the number of pattern units consumed,
/// including the closing `]`, or `None` if the expression is unterminated.
fn parse_bracket(body: &[PatternByte]) -> Result<Option<(Bracket, usize)>, Error> {
    let mut bracket = Bracket::default();
    let mut i = 0;

    if body.get(i) == Some(&PatternByte::Normal(b'!')) {
        bracket.complement = true;
        i += 1;
    }
    // A `]` right after the opening (and optional `!`) is a member.
    if body.get(i) == Some(&PatternByte::Normal(b']')) {
        bracket.items.push(BracketItem::Byte(b']'));
        i += 1;
    }

    loop {
        let unit = match body.get(i) {
            None => return Ok(None),
            Some(unit) => *unit,
        };
        match unit {
            PatternByte::Normal(b']') => return Ok(Some((bracket, i + 1))),
            PatternByte::Normal(b'[')
                if body.get(i + 1) == Some(&PatternByte::Normal(b':')) =>
            {
                match parse_class(&body[i + 2..])? {
                    Some((class, consumed)) => {
                        bracket.items.push(BracketItem::Class(class));
                        i += 2 + consumed;
                    }
                    // No closing `:]`; the `[` is an ordinary member.
                    None => {
                        bracket.items.push(BracketItem::Byte(b'['));
                        i += 1;
                    }
                }
            }
            unit => {
                let lo = unit.byte();
                // `a-z` is a range unless the `-` is quoted or the range
                // would end at the closing `]`.
                let is_range = body.get(i + 1) == Some(&PatternByte::Normal(b'-'))
                    && body.get(i + 2).is_some()
                    && body.get(i + 2) != Some(&PatternByte::Normal(b']'));
                if is_range {
                    let hi = body[i + 2].byte();
                    bracket.items.push(BracketItem::Range(lo, hi));
                    i += 3;
                } else {
                    bracket.items.push(BracketItem::Byte(lo));
                    i += 1;
                }
            }
        }
    }
}

/// Parses a character class body (everything after `[:`), up to and
/// including the closing `:]`.
fn parse_class(body: &[PatternByte]) -> Result<Option<(ByteClass, usize)>, Error> {
    let mut name = Vec::new();
    let mut i = 0;
    loop {
        match body.get(i) {
            None => return Ok(None),
            Some(&PatternByte::Normal(b':')) if body.get(i + 1) == Some(&PatternByte::Normal(b']')) =>
            {
                return match ByteClass::from_name(&name) {
                    Some(class) => Ok(Some((class, i + 2))),
                    None => Err(Error::UnknownClass),
                };
            }
            Some(unit) => {
                name.push(unit.byte());
                i += 1;
            }
        }
    }
}
