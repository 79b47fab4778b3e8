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

//! Pathname expansion
//!
//! A field with unquoted metacharacters is matched against the file
//! system, one path component at a time: the pattern is split at
//! unquoted `/`, literal components are descended directly, and
//! components with metacharacters enumerate their directory. Results
//! are sorted bytewise; a pattern that matches nothing yields `None` and
//! the caller keeps the field as is.
//!
//! A leading dot in a file name must be matched by a literal dot, never
//! by `*`, `?`, or a bracket expression.

use rash_fnmatch::{Pattern, PatternByte};
use rash_syntax::syntax::{CTL_ESC, CTL_QUOTEMARK};
use std::os::unix::ffi::OsStrExt;

/// One path component of the pattern
struct Component {
    pattern: Vec<PatternByte>,
}

impl Component {
    /// Literal text if the component has no metacharacter.
    fn literal(&self) -> Option<Vec<u8>> {
        if rash_fnmatch::has_metachars(self.pattern.iter().copied()) {
            return None;
        }
        Some(self.pattern.iter().map(|b| b.byte()).collect())
    }

    fn matches(&self, name: &[u8]) -> bool {
        if name.starts_with(b".") {
            // The leading dot must be matched explicitly.
            match self.pattern.first() {
                Some(PatternByte::Normal(b'.') | PatternByte::Literal(b'.')) => {}
                _ => return false,
            }
        }
        Pattern::parse(self.pattern.iter().copied())
            .is_ok_and(|pattern| pattern.is_match(name))
    }
}

/// Splits marked field text into pattern components at unquoted `/`.
fn components(marked: &[u8]) -> (bool, Vec<Component>) {
    let mut parts: Vec<Component> = vec![Component {
        pattern: Vec::new(),
    }];
    let mut in_quotes = false;
    let mut absolute = false;
    let mut first = true;
    let mut iter = marked.iter().copied();
    while let Some(byte) = iter.next() {
        match byte {
            CTL_QUOTEMARK => in_quotes = !in_quotes,
            CTL_ESC => {
                if let Some(b) = iter.next() {
                    parts.last_mut().unwrap().pattern.push(PatternByte::Literal(b));
                    first = false;
                }
            }
            b'/' => {
                if first && parts.len() == 1 && parts[0].pattern.is_empty() {
                    absolute = true;
                } else {
                    parts.push(Component {
                        pattern: Vec::new(),
                    });
                }
                first = false;
            }
            byte => {
                let unit = if in_quotes {
                    PatternByte::Literal(byte)
                } else {
                    PatternByte::Normal(byte)
                };
                parts.last_mut().unwrap().pattern.push(unit);
                first = false;
            }
        }
    }
    // Collapse duplicate slashes.
    parts.retain(|c| !c.pattern.is_empty());
    (absolute, parts)
}

/// Expands a field against the file system.
///
/// Returns the matching paths sorted bytewise, or `None` when nothing
/// matches.
pub(crate) fn expand(marked: &[u8]) -> Option<Vec<Vec<u8>>> {
    let (absolute, parts) = components(marked);
    if parts.is_empty() {
        return None;
    }
    let trailing_slash = {
        // `pat/` must match directories only.
        let text = super::quote_removal(marked);
        text.ends_with(b"/")
    };

    let mut results: Vec<Vec<u8>> = Vec::new();
    let start: Vec<u8> = if absolute {
        b"/".to_vec()
    } else {
        Vec::new()
    };
    walk(&start, &parts, &mut results);

    if trailing_slash {
        results.retain(|path| std::path::Path::new(std::ffi::OsStr::from_bytes(path)).is_dir());
        for path in &mut results {
            path.push(b'/');
        }
    }
    results.sort();
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

fn join(prefix: &[u8], name: &[u8]) -> Vec<u8> {
    let mut path = prefix.to_vec();
    if !path.is_empty() && path.last() != Some(&b'/') {
        path.push(b'/');
    }
    path.extend_from_slice(name);
    path
}

fn walk(prefix: &[u8], parts: &[Component], results: &mut Vec<Vec<u8>>) {
    let Some((head, rest)) = parts.split_first() else {
        if !prefix.is_empty() {
            results.push(prefix.to_vec());
        }
        return;
    };

    if let Some(literal) = head.literal() {
        // No enumeration needed; descend if the path exists.
        let path = join(prefix, &literal);
        let exists =
            std::path::Path::new(std::ffi::OsStr::from_bytes(&path)).symlink_metadata().is_ok();
        if exists {
            walk(&path, rest, results);
        }
        return;
    }

    let dir: &[u8] = if prefix.is_empty() { b"." } else { prefix };
    let Ok(entries) = std::fs::read_dir(std::ffi::OsStr::from_bytes(dir)) else {
        return;
    };
    let mut names: Vec<Vec<u8>> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().as_bytes().to_vec())
        .filter(|name| head.matches(name))
        .collect();
    names.sort();
    for name in names {
        let path = join(prefix, &name);
        if rest.is_empty() {
            results.push(path);
        } else {
            let is_dir = std::path::Path::new(std::ffi::OsStr::from_bytes(&path)).is_dir();
            if is_dir {
                walk(&path, rest, results);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(pattern: &str) -> Option<Vec<String>> {
        expand(pattern.as_bytes()).map(|paths| {
            paths
                .into_iter()
                .map(|p| String::from_utf8_lossy(&p).into_owned())
                .collect()
        })
    }

    #[test]
    fn matches_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let got = expand_str(&format!("{}/*.txt", dir.path().display())).unwrap();
        assert_eq!(
            got,
            [
                format!("{}/a.txt", dir.path().display()),
                format!("{}/b.txt", dir.path().display()),
            ]
        );
    }

    #[test]
    fn no_match_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(expand_str(&format!("{}/*.zzz", dir.path().display())), None);
    }

    #[test]
    fn hidden_files_need_a_literal_dot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::write(dir.path().join("shown"), "").unwrap();
        let all = expand_str(&format!("{}/*", dir.path().display())).unwrap();
        assert_eq!(all, [format!("{}/shown", dir.path().display())]);
        let dotted = expand_str(&format!("{}/.*", dir.path().display())).unwrap();
        assert!(dotted.contains(&format!("{}/.hidden", dir.path().display())));
    }

    #[test]
    fn multi_component_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub1")).unwrap();
        std::fs::create_dir(dir.path().join("sub2")).unwrap();
        std::fs::write(dir.path().join("sub1/x.rs"), "").unwrap();
        std::fs::write(dir.path().join("sub2/y.rs"), "").unwrap();
        let got = expand_str(&format!("{}/sub*/*.rs", dir.path().display())).unwrap();
        assert_eq!(
            got,
            [
                format!("{}/sub1/x.rs", dir.path().display()),
                format!("{}/sub2/y.rs", dir.path().display()),
            ]
        );
    }

    #[test]
    fn question_mark_and_brackets() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["f1", "f2", "f10"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let got = expand_str(&format!("{}/f?", dir.path().display())).unwrap();
        assert_eq!(got.len(), 2);
        let got = expand_str(&format!("{}/f[1]", dir.path().display())).unwrap();
        assert_eq!(got, [format!("{}/f1", dir.path().display())]);
    }
}
