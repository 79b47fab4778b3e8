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

//! Field splitting
//!
//! Splitting applies only to the ranges of the expanded text that came
//! from unquoted expansions. Within those ranges, IFS whitespace bytes
//! collapse into one delimiter and are trimmed at the edges; each IFS
//! non-whitespace byte delimits exactly one field. The forced
//! boundaries of a quoted `$@` always cut, and fields created by them
//! are kept even when empty.
//!
//! The output fields are still marked text; quote removal runs later.

use super::ExpandedWord;
use rash_syntax::syntax::{CTL_ESC, CTL_QUOTEMARK};

const IFS_WHITESPACE: &[u8] = b" \t\n";

/// One field under construction
#[derive(Default)]
struct Candidate {
    text: Vec<u8>,
    /// Any real byte or quote mark seen
    has_content: bool,
    /// Created by a forced boundary; kept even when empty
    forced: bool,
}

/// Splits one expanded word into fields of marked text.
pub(crate) fn split_fields(word: &ExpandedWord, ifs: &[u8]) -> Vec<Vec<u8>> {
    let text = &word.text;
    let mut fields: Vec<Vec<u8>> = Vec::new();
    let mut current = Candidate::default();
    let mut region_iter = word.regions.iter().peekable();
    let mut break_iter = word.breaks.iter().peekable();

    let finish = |current: &mut Candidate, fields: &mut Vec<Vec<u8>>, keep_empty: bool| {
        let done = std::mem::take(current);
        if done.has_content || done.forced || keep_empty {
            fields.push(done.text);
        }
    };

    let mut i = 0;
    while i <= text.len() {
        while break_iter.peek() == Some(&&i) {
            break_iter.next();
            current.forced = true;
            finish(&mut current, &mut fields, true);
            current.forced = true;
        }
        if i == text.len() {
            break;
        }

        // Advance past regions that ended.
        while region_iter.peek().is_some_and(|r| r.end <= i) {
            region_iter.next();
        }
        fn splittable(
            text: &[u8],
            ifs: &[u8],
            region_iter: &mut std::iter::Peekable<std::slice::Iter<'_, std::ops::Range<usize>>>,
            i: usize,
        ) -> bool {
            while region_iter.peek().is_some_and(|r| r.end <= i) {
                region_iter.next();
            }
            i < text.len()
                && region_iter.peek().is_some_and(|r| r.contains(&i))
                && ifs.contains(&text[i])
        }
        let in_region = region_iter.peek().is_some_and(|r| r.contains(&i));

        match text[i] {
            CTL_ESC => {
                current.text.push(CTL_ESC);
                if let Some(&b) = text.get(i + 1) {
                    current.text.push(b);
                }
                current.has_content = true;
                i += 2;
            }
            CTL_QUOTEMARK => {
                current.text.push(CTL_QUOTEMARK);
                current.has_content = true;
                i += 1;
            }
            byte if in_region && ifs.contains(&byte) => {
                if IFS_WHITESPACE.contains(&byte) {
                    // A whitespace run, possibly embedding one
                    // non-whitespace separator, is a single delimiter.
                    let completed_field = current.has_content || current.forced;
                    finish(&mut current, &mut fields, false);
                    i += 1;
                    while splittable(text, ifs, &mut region_iter, i)
                        && IFS_WHITESPACE.contains(&text[i])
                    {
                        i += 1;
                    }
                    if splittable(text, ifs, &mut region_iter, i)
                        && !IFS_WHITESPACE.contains(&text[i])
                    {
                        i += 1;
                        while splittable(text, ifs, &mut region_iter, i)
                            && IFS_WHITESPACE.contains(&text[i])
                        {
                            i += 1;
                        }
                        // A separator with no field before it delimits
                        // an empty field.
                        if !completed_field {
                            fields.push(Vec::new());
                        }
                    }
                } else {
                    // Non-whitespace separator: one boundary, empty
                    // fields are real. Trailing whitespace belongs to
                    // the same delimiter.
                    finish(&mut current, &mut fields, true);
                    i += 1;
                    while splittable(text, ifs, &mut region_iter, i)
                        && IFS_WHITESPACE.contains(&text[i])
                    {
                        i += 1;
                    }
                }
            }
            byte => {
                current.text.push(byte);
                current.has_content = true;
                i += 1;
            }
        }
    }

    finish(&mut current, &mut fields, false);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &[u8], regions: Vec<std::ops::Range<usize>>) -> ExpandedWord {
        ExpandedWord {
            text: text.to_vec(),
            regions,
            breaks: Vec::new(),
        }
    }

    fn strings(fields: Vec<Vec<u8>>) -> Vec<String> {
        fields
            .into_iter()
            .map(|f| String::from_utf8_lossy(&f).into_owned())
            .collect()
    }

    #[test]
    fn no_region_no_split() {
        let w = word(b"a b", vec![]);
        assert_eq!(strings(split_fields(&w, b" \t\n")), ["a b"]);
    }

    #[test]
    fn whitespace_runs_collapse() {
        let w = word(b"  a  b  ", vec![0..8]);
        assert_eq!(strings(split_fields(&w, b" \t\n")), ["a", "b"]);
    }

    #[test]
    fn non_whitespace_separators_make_empty_fields() {
        let w = word(b"a::b", vec![0..4]);
        assert_eq!(strings(split_fields(&w, b":")), ["a", "", "b"]);
    }

    #[test]
    fn trailing_non_whitespace_separator_is_silent() {
        let w = word(b"a:b:", vec![0..4]);
        assert_eq!(strings(split_fields(&w, b":")), ["a", "b"]);
    }

    #[test]
    fn leading_non_whitespace_separator_makes_empty_first_field() {
        let w = word(b":a", vec![0..2]);
        assert_eq!(strings(split_fields(&w, b":")), ["", "a"]);
    }

    #[test]
    fn mixed_whitespace_and_separator() {
        let w = word(b"a : b", vec![0..5]);
        assert_eq!(strings(split_fields(&w, b": \t\n")), ["a", "b"]);
    }

    #[test]
    fn splitting_only_inside_regions() {
        // "x y" where only the "y" part came from an expansion.
        let w = word(b"x y z", vec![3..5]);
        assert_eq!(strings(split_fields(&w, b" \t\n")), ["x y", "z"]);
    }

    #[test]
    fn escaped_bytes_never_split() {
        let text = vec![b'a', CTL_ESC, b' ', b'b'];
        let w = ExpandedWord {
            regions: vec![0..text.len()],
            text,
            breaks: Vec::new(),
        };
        let fields = split_fields(&w, b" \t\n");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn empty_word_yields_no_field() {
        let w = word(b"", vec![]);
        assert!(split_fields(&w, b" \t\n").is_empty());
    }

    #[test]
    fn quoted_empty_word_yields_one_field() {
        let w = word(&[CTL_QUOTEMARK, CTL_QUOTEMARK], vec![]);
        assert_eq!(split_fields(&w, b" \t\n").len(), 1);
    }

    #[test]
    fn forced_breaks_always_cut() {
        let w = ExpandedWord {
            text: b"ab".to_vec(),
            regions: vec![],
            breaks: vec![1],
        };
        assert_eq!(strings(split_fields(&w, b" \t\n")), ["a", "b"]);
    }

    #[test]
    fn forced_break_keeps_empty_fields() {
        let w = ExpandedWord {
            text: Vec::new(),
            regions: vec![],
            breaks: vec![0],
        };
        // Two parameters, both empty: two empty fields.
        assert_eq!(split_fields(&w, b" \t\n").len(), 2);
    }

    #[test]
    fn empty_ifs_disables_splitting() {
        let w = word(b"a b", vec![0..3]);
        assert_eq!(strings(split_fields(&w, b"")), ["a b"]);
    }
}
