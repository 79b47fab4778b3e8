// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors

//! This crate performs pattern matching based on POSIX globbing patterns.
//!
//! The same matcher serves every pattern context in the shell: `case`
//! clauses, the `${x#pat}`/`${x%pat}` trim operators, and pathname
//! expansion. Patterns and subjects are byte strings; the matcher never
//! assumes any particular text encoding, so file names with arbitrary bytes
//! match correctly.
//!
//! Supported syntax:
//!
//! - Any single byte (`?`)
//! - Any byte sequence, including the empty one (`*`)
//! - Bracket expressions (`[...]`)
//!     - Byte literals and ranges (`a-z`)
//!     - Complement (`[!...]`)
//!     - Character classes (`[:alpha:]` etc., ASCII only)
//! - Quoted pattern bytes, which always match literally (see
//!   [`PatternByte::Literal`])
//!
//! A `[` that does not open a well-formed bracket expression matches a
//! literal `[`, as historical shells do.
//!
//! # Examples
//!
//! ```
//! # use rash_fnmatch::{Pattern, PatternByte};
//! let p = Pattern::parse(PatternByte::normal(b"a*c")).unwrap();
//! assert!(p.is_match(b"abc"));
//! assert!(p.is_match(b"ac"));
//! assert!(!p.is_match(b"ab"));
//! ```

mod ast;
mod matcher;

pub use ast::{Atom, Bracket, BracketItem, ByteClass};

use thiserror::Error;

/// Error parsing a pattern
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum Error {
    /// A `[:name:]` class with an unknown name.
    #[error("unknown character class in bracket expression")]
    UnknownClass,
}

/// Single unit of a pattern string
///
/// The shell distinguishes pattern bytes that came from quoted or escaped
/// parts of a word from the rest: a quoted `*` matches a literal asterisk.
/// `Normal` bytes may have their special meaning; `Literal` bytes never do.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PatternByte {
    /// Byte that is special if it is a metacharacter
    Normal(u8),
    /// Byte that always matches itself
    Literal(u8),
}

impl PatternByte {
    /// Wraps every byte of a string as [`PatternByte::Normal`].
    pub fn normal(bytes: &[u8]) -> impl Iterator<Item = PatternByte> + Clone + '_ {
        bytes.iter().copied().map(PatternByte::Normal)
    }

    /// The byte value, ignoring the literal/normal distinction.
    pub fn byte(self) -> u8 {
        match self {
            PatternByte::Normal(b) | PatternByte::Literal(b) => b,
        }
    }
}

/// Compiled glob pattern
///
/// A pattern is a sequence of [`Atom`]s produced by [`Pattern::parse`] and
/// matched with the query methods below. Matching is always anchored at
/// both ends; the trim scans ([`shortest_prefix`](Self::shortest_prefix)
/// and friends) probe anchored matches of every possible length.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Pattern {
    atoms: Vec<Atom>,
}

impl Pattern {
    /// Parses a pattern.
    pub fn parse<I>(pattern: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = PatternByte>,
    {
        let bytes: Vec<PatternByte> = pattern.into_iter().collect();
        let atoms = ast::parse(&bytes)?;
        Ok(Pattern { atoms })
    }

    /// Whether the pattern contains no metacharacter at all.
    ///
    /// A literal pattern can only match its own text; pathname expansion
    /// skips the directory walk for such fields.
    pub fn is_literal(&self) -> bool {
        self.atoms.iter().all(|a| matches!(a, Atom::Byte(_)))
    }

    /// Returns the pattern text if the pattern is literal.
    pub fn as_literal(&self) -> Option<Vec<u8>> {
        self.atoms
            .iter()
            .map(|a| match a {
                Atom::Byte(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Matches the pattern against the whole subject.
    #[must_use]
    pub fn is_match(&self, subject: &[u8]) -> bool {
        matcher::match_atoms(&self.atoms, subject)
    }

    /// Length of the shortest prefix of `subject` the pattern matches.
    ///
    /// This is the `${x#pattern}` scan. Returns `None` if no prefix
    /// matches, including the empty one.
    #[must_use]
    pub fn shortest_prefix(&self, subject: &[u8]) -> Option<usize> {
        (0..=subject.len()).find(|&len| self.is_match(&subject[..len]))
    }

    /// Length of the longest prefix of `subject` the pattern matches
    /// (the `${x##pattern}` scan).
    #[must_use]
    pub fn longest_prefix(&self, subject: &[u8]) -> Option<usize> {
        (0..=subject.len())
            .rev()
            .find(|&len| self.is_match(&subject[..len]))
    }

    /// Start index of the shortest suffix of `subject` the pattern matches
    /// (the `${x%pattern}` scan).
    #[must_use]
    pub fn shortest_suffix(&self, subject: &[u8]) -> Option<usize> {
        (0..=subject.len())
            .rev()
            .find(|&start| self.is_match(&subject[start..]))
    }

    /// Start index of the longest suffix of `subject` the pattern matches
    /// (the `${x%%pattern}` scan).
    #[must_use]
    pub fn longest_suffix(&self, subject: &[u8]) -> Option<usize> {
        (0..=subject.len()).find(|&start| self.is_match(&subject[start..]))
    }
}

/// Tells whether a pattern string contains any unquoted metacharacter.
///
/// This is a cheap pre-test used to decide whether a word is subject to
/// pathname expansion at all.
pub fn has_metachars<I>(pattern: I) -> bool
where
    I: IntoIterator<Item = PatternByte>,
{
    pattern
        .into_iter()
        .any(|b| matches!(b, PatternByte::Normal(b'*' | b'?' | b'[')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &[u8]) -> Pattern {
        Pattern::parse(PatternByte::normal(s)).unwrap()
    }

    #[test]
    fn literal_patterns() {
        assert!(pat(b"").is_match(b""));
        assert!(!pat(b"").is_match(b"x"));
        assert!(pat(b"abc").is_match(b"abc"));
        assert!(!pat(b"abc").is_match(b"abcd"));
        assert!(!pat(b"abc").is_match(b"ab"));
        assert!(pat(b"abc").is_literal());
    }

    #[test]
    fn any_byte() {
        assert!(pat(b"a?c").is_match(b"abc"));
        assert!(pat(b"a?c").is_match(b"axc"));
        assert!(!pat(b"a?c").is_match(b"ac"));
        assert!(!pat(b"?").is_match(b""));
    }

    #[test]
    fn any_string() {
        assert!(pat(b"a*").is_match(b"a"));
        assert!(pat(b"a*").is_match(b"abcdef"));
        assert!(pat(b"*c").is_match(b"abc"));
        assert!(pat(b"a*c*e").is_match(b"abcde"));
        assert!(pat(b"*").is_match(b""));
        assert!(!pat(b"a*b*c").is_match(b"acb"));
    }

    #[test]
    fn backtracking() {
        // The first `*` must give back bytes for the tail to match.
        assert!(pat(b"*ab").is_match(b"aab"));
        assert!(pat(b"*aab*").is_match(b"aaaab"));
        assert!(pat(b"a*a*a").is_match(b"aaa"));
        assert!(!pat(b"a*a*a").is_match(b"aa"));
    }

    #[test]
    fn bracket_expressions() {
        assert!(pat(b"[abc]").is_match(b"b"));
        assert!(!pat(b"[abc]").is_match(b"d"));
        assert!(pat(b"[a-z]").is_match(b"m"));
        assert!(!pat(b"[a-z]").is_match(b"M"));
        assert!(pat(b"[!a-z]").is_match(b"M"));
        assert!(!pat(b"[!a-z]").is_match(b"m"));
        // `]` as the first member is a literal member.
        assert!(pat(b"[]a]").is_match(b"]"));
        assert!(pat(b"[]a]").is_match(b"a"));
        // A trailing `-` is a literal member.
        assert!(pat(b"[a-]").is_match(b"-"));
    }

    #[test]
    fn character_classes() {
        assert!(pat(b"[[:digit:]]").is_match(b"7"));
        assert!(!pat(b"[[:digit:]]").is_match(b"x"));
        assert!(pat(b"[[:alpha:]_][[:alnum:]_]").is_match(b"_x"));
        assert!(pat(b"[![:space:]]").is_match(b"q"));
        assert_eq!(
            Pattern::parse(PatternByte::normal(b"[[:bogus:]]")),
            Err(Error::UnknownClass)
        );
    }

    #[test]
    fn unterminated_bracket_is_literal() {
        assert!(pat(b"[abc").is_match(b"[abc"));
        assert!(pat(b"a[").is_match(b"a["));
    }

    #[test]
    fn quoted_bytes_match_literally() {
        let units = [
            PatternByte::Literal(b'*'),
            PatternByte::Normal(b'*'),
        ];
        let p = Pattern::parse(units).unwrap();
        assert!(p.is_match(b"*"));
        assert!(p.is_match(b"*xyz"));
        assert!(!p.is_match(b"xyz"));
    }

    #[test]
    fn quoted_bracket_members() {
        // A quoted `]` inside a bracket expression is a member, not the
        // terminator.
        let mut units = vec![PatternByte::Normal(b'[')];
        units.push(PatternByte::Normal(b'a'));
        units.push(PatternByte::Literal(b']'));
        units.push(PatternByte::Normal(b']'));
        let p = Pattern::parse(units).unwrap();
        assert!(p.is_match(b"]"));
        assert!(p.is_match(b"a"));
        assert!(!p.is_match(b"b"));
    }

    #[test]
    fn prefix_scans() {
        let p = pat(b"a*");
        assert_eq!(p.shortest_prefix(b"aaab"), Some(1));
        assert_eq!(p.longest_prefix(b"aaab"), Some(4));
        assert_eq!(p.shortest_prefix(b"xaaab"), None);

        let p = pat(b"*.");
        assert_eq!(p.shortest_prefix(b"a.b.c"), Some(2));
        assert_eq!(p.longest_prefix(b"a.b.c"), Some(4));
    }

    #[test]
    fn suffix_scans() {
        let p = pat(b".*");
        assert_eq!(p.shortest_suffix(b"a.b.c"), Some(3));
        assert_eq!(p.longest_suffix(b"a.b.c"), Some(1));
        assert_eq!(p.shortest_suffix(b"abc"), None);
    }

    #[test]
    fn metachar_pretest() {
        assert!(has_metachars(PatternByte::normal(b"*.rs")));
        assert!(has_metachars(PatternByte::normal(b"a?c")));
        assert!(!has_metachars(PatternByte::normal(b"plain")));
        assert!(!has_metachars([PatternByte::Literal(b'*')]));
    }

    #[test]
    fn non_utf8_subjects() {
        assert!(pat(b"*").is_match(b"\xff\xfe"));
        assert!(pat(b"?\xff").is_match(b"\xc0\xff"));
        assert!(pat(b"[\x80-\xff]").is_match(b"\xbb"));
    }
}
