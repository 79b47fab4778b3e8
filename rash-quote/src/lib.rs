// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors

//! This crate provides a function that quotes a string so that the shell
//! reads it back as a single word with the original value.
//!
//! The result is meant to be pasted into a script or fed back to the shell,
//! which is what the `trap`, `alias` and `set` built-ins do when they list
//! their current state. The [`quote`] function picks the lightest quoting
//! that is still safe:
//!
//! - A non-empty string made of unproblematic characters is returned as is.
//! - A string without single quotes is wrapped in single quotes.
//! - Anything else is wrapped in double quotes with `"`, `` ` ``, `$` and
//!   `\` backslash-escaped.
//!
//! # Examples
//!
//! ```
//! # use std::borrow::Cow::{Borrowed, Owned};
//! # use rash_quote::quote;
//! assert_eq!(quote("ls"), Borrowed("ls"));
//! assert_eq!(quote("echo $x"), Owned::<str>("'echo $x'".to_owned()));
//! assert_eq!(quote("don't"), Owned::<str>(r#""don't""#.to_owned()));
//! ```

use std::borrow::Cow::{self, Borrowed, Owned};
use std::fmt::Display;

/// Quotes a string for re-input to the shell.
///
/// Returns `Borrowed(s)` when no quoting is needed and an `Owned` string
/// otherwise. See the [module documentation](self) for the quoting rules.
pub fn quote(s: &str) -> Cow<str> {
    if !needs_quoting(s) {
        return Borrowed(s);
    }

    if !s.contains('\'') {
        return Owned(format!("'{s}'"));
    }

    let mut result = String::with_capacity(s.len() + 8);
    result.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result.push('"');
    Owned(result)
}

/// Adapter that quotes a string when displayed.
///
/// `Quoted(s)` displays as `quote(s)` without allocating unless the
/// formatter requires it. Handy in `write!` chains:
///
/// ```
/// # use rash_quote::Quoted;
/// assert_eq!(format!("trap -- {} INT", Quoted("echo bye")), "trap -- 'echo bye' INT");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Quoted<'a>(pub &'a str);

impl Display for Quoted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        quote(self.0).fmt(f)
    }
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    // `~` and `#` are only special at the start of a word; everything in
    // the match below is special anywhere.
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if first == '~' || first == '#' {
        return true;
    }
    s.chars().any(|c| match c {
        ';' | '&' | '|' | '(' | ')' | '<' | '>' => true,
        '$' | '`' | '\\' | '"' | '\'' => true,
        '=' | '*' | '?' | '[' | '{' => true,
        c => c.is_whitespace(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquoted() {
        for s in ["a", "foo", "/usr/bin/env", "x.y-z_0", "%+@:,"] {
            assert_eq!(quote(s), Borrowed(s));
        }
    }

    #[test]
    fn empty_string_is_single_quoted() {
        assert_eq!(quote(""), Owned::<str>("''".to_owned()));
    }

    #[test]
    fn single_quoting() {
        assert_eq!(quote("a b"), Owned::<str>("'a b'".to_owned()));
        assert_eq!(quote("$HOME"), Owned::<str>("'$HOME'".to_owned()));
        assert_eq!(quote("a;b&c"), Owned::<str>("'a;b&c'".to_owned()));
        assert_eq!(quote("*.rs"), Owned::<str>("'*.rs'".to_owned()));
        assert_eq!(quote("~user"), Owned::<str>("'~user'".to_owned()));
        assert_eq!(quote("#comment"), Owned::<str>("'#comment'".to_owned()));
    }

    #[test]
    fn double_quoting() {
        assert_eq!(quote("don't"), Owned::<str>(r#""don't""#.to_owned()));
        assert_eq!(
            quote(r#"'$`\"'"#),
            Owned::<str>(r#""'\$\`\\\"'""#.to_owned())
        );
    }

    #[test]
    fn round_trip_shape() {
        // A single-quoted result must not itself contain a single quote.
        for s in ["a b", "x*y", "new\nline"] {
            let q = quote(s);
            assert!(q.starts_with('\''), "{q:?}");
            assert!(!q[1..q.len() - 1].contains('\''));
        }
    }

    #[test]
    fn quoted_display() {
        assert_eq!(Quoted("foo").to_string(), "foo");
        assert_eq!(Quoted("foo bar").to_string(), "'foo bar'");
    }
}
