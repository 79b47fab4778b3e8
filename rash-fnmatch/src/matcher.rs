// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors

//! Backtracking matcher over parsed pattern atoms

use crate::ast::Atom;

/// Matches the atom sequence against the whole subject.
///
/// The match is anchored at both ends. `*` is handled by backtracking:
/// every split of the remaining subject is tried until the rest of the
/// pattern matches. The recursion depth is bounded by the number of `*`
/// atoms in the pattern, since the runs between them are matched
/// iteratively.
pub(crate) fn match_atoms(atoms: &[Atom], subject: &[u8]) -> bool {
    let mut atoms = atoms;
    let mut subject = subject;

    // Consume single-byte atoms iteratively, recursing only for `*`.
    loop {
        let Some((first, rest)) = atoms.split_first() else {
            return subject.is_empty();
        };
        match first {
            Atom::AnyString => {
                // `*` at the end of the pattern matches any remainder.
                if rest.is_empty() {
                    return true;
                }
                return (0..=subject.len())
                    .any(|skip| match_atoms(rest, &subject[skip..]));
            }
            Atom::AnyByte => {
                let Some((_, tail)) = subject.split_first() else {
                    return false;
                };
                subject = tail;
            }
            Atom::Byte(b) => {
                let Some((&head, tail)) = subject.split_first() else {
                    return false;
                };
                if head != *b {
                    return false;
                }
                subject = tail;
            }
            Atom::Bracket(bracket) => {
                let Some((&head, tail)) = subject.split_first() else {
                    return false;
                };
                if !bracket.matches(head) {
                    return false;
                }
                subject = tail;
            }
        }
        atoms = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PatternByte;
    use crate::ast::parse;

    fn matches(pattern: &[u8], subject: &[u8]) -> bool {
        let atoms = parse(&PatternByte::normal(pattern).collect::<Vec<_>>()).unwrap();
        match_atoms(&atoms, subject)
    }

    #[test]
    fn empty_pattern() {
        assert!(matches(b"", b""));
        assert!(!matches(b"", b"a"));
    }

    #[test]
    fn star_gives_back() {
        assert!(matches(b"*b", b"abab"));
        assert!(matches(b"*ab*ab", b"ababab"));
        assert!(!matches(b"*ab*ab*ab", b"abab"));
    }

    #[test]
    fn star_runs_do_not_explode() {
        // Pathological subject for naive matchers; must still terminate
        // quickly because inter-star runs are matched iteratively.
        let subject = [b'a'; 64];
        assert!(matches(b"*a*a*a*a*", &subject));
        assert!(!matches(b"*a*a*b*", &subject));
    }
}
