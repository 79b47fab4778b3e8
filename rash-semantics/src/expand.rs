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

//! Word expansion
//!
//! A parsed [`Word`] goes through tilde expansion, parameter expansion,
//! command substitution, and arithmetic expansion in one pass over its
//! control-byte text ([`Expander::walk`]). The output is still a marked
//! byte string: escapes and quote marks survive so that field splitting
//! and pattern matching can tell quoted bytes apart from expanded ones.
//! Field splitting and pathname expansion apply only in full expansion
//! ([`expand_words`]); quote removal is always the final step.
//!
//! Split eligibility is tracked as byte ranges of the output that came
//! from unquoted expansions; quoted `"$@"` inserts hard field boundaries
//! instead.

pub(crate) mod glob;
pub(crate) mod split;

use rash_env::semantics::{Field, Result};
use rash_env::variable::VarFlags;
use rash_env::{interrupt, option::ShellOption, Env};
use rash_fnmatch::{Pattern, PatternByte};
use rash_syntax::syntax::{
    Word, CTL_ARI, CTL_BACKQ, CTL_ENDARI, CTL_ENDVAR, CTL_ESC, CTL_QUOTEMARK, CTL_VAR, VS_ASSIGN,
    VS_LENGTH, VS_MINUS, VS_NORMAL, VS_NUL, VS_PLUS, VS_QUESTION, VS_TRIM_LEFT, VS_TRIM_LEFT_MAX,
    VS_TRIM_RIGHT, VS_TRIM_RIGHT_MAX, VS_TYPE_MASK,
};
use std::ops::Range;
use std::rc::Rc;

/// Fully expanded word, still carrying quoting marks
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ExpandedWord {
    /// Marked text: `CTL_ESC` pairs and `CTL_QUOTEMARK`s remain
    pub text: Vec<u8>,
    /// Ranges of `text` subject to field splitting
    pub regions: Vec<Range<usize>>,
    /// Forced field boundaries from quoted `$@`
    pub breaks: Vec<usize>,
}

/// Where tilde expansion applies in the word being expanded
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Tilde {
    /// Not a tilde context
    None,
    /// Ordinary word: a leading `~` only
    Word,
    /// Assignment value: leading `~` and after each `:`
    Assign,
}

struct Expander<'a, 'w> {
    env: &'a mut Env,
    subs: &'w [Rc<[u8]>],
    sub_index: usize,
    out: Vec<u8>,
    regions: Vec<Range<usize>>,
    breaks: Vec<usize>,
    /// Set when an empty quoted `$@` swallowed its opening quote mark;
    /// the matching closing mark is dropped too.
    skip_quotemark: bool,
}

/// Value of a parameter, before substitution
enum ParamValue {
    Unset,
    Set(Vec<u8>),
    /// `$@` or `$*`
    Params { values: Vec<Vec<u8>>, star: bool },
}

impl<'a, 'w> Expander<'a, 'w> {
    fn new(env: &'a mut Env, subs: &'w [Rc<[u8]>]) -> Self {
        Expander {
            env,
            subs,
            sub_index: 0,
            out: Vec::new(),
            regions: Vec::new(),
            breaks: Vec::new(),
            skip_quotemark: false,
        }
    }

    fn finish(self) -> ExpandedWord {
        ExpandedWord {
            text: self.out,
            regions: self.regions,
            breaks: self.breaks,
        }
    }

    /// One pass over encoded word text.
    ///
    /// `quoted` is the double-quote state at entry; it toggles at each
    /// quote mark. With `discard` set, nothing is emitted and no side
    /// effects run, but command substitutions are still counted so the
    /// substitution list stays aligned.
    fn walk(&mut self, text: &[u8], quoted: bool, discard: bool, tilde: Tilde) -> Result<()> {
        let mut quoted = quoted;
        let mut i = 0;
        if tilde != Tilde::None && !discard {
            i = self.try_tilde(text, 0, tilde);
        }
        while i < text.len() {
            match text[i] {
                CTL_ESC => {
                    if !discard {
                        self.out.push(CTL_ESC);
                        if let Some(&b) = text.get(i + 1) {
                            self.out.push(b);
                        }
                    }
                    i += 2;
                }
                CTL_QUOTEMARK => {
                    quoted = !quoted;
                    if !discard {
                        if self.skip_quotemark {
                            self.skip_quotemark = false;
                        } else {
                            self.out.push(CTL_QUOTEMARK);
                        }
                    }
                    i += 1;
                }
                CTL_VAR => i = self.eval_var(text, i, quoted, discard)?,
                CTL_BACKQ => {
                    let source = self.next_substitution();
                    if !discard {
                        let output = self.command_substitution(&source)?;
                        self.insert_value(&output, quoted);
                    }
                    i += 1;
                }
                CTL_ARI => {
                    let end = find_endari(text, i + 1);
                    let marked = self.sub_expand(&text[i + 1..end], quoted, discard)?;
                    if !discard {
                        let expr = String::from_utf8_lossy(&quote_removal(&marked)).into_owned();
                        let value = self.eval_arith(&expr)?;
                        self.insert_value(value.to_string().as_bytes(), quoted);
                    }
                    i = end + 1;
                }
                byte => {
                    if !discard {
                        self.out.push(byte);
                    }
                    i += 1;
                    if tilde == Tilde::Assign && byte == b':' && !discard {
                        i = self.try_tilde(text, i, tilde);
                    }
                }
            }
        }
        Ok(())
    }

    /// Expands a leading `~name` if one is present, emitting the home
    /// directory as literal (escaped) text. Returns the index to resume
    /// at.
    fn try_tilde(&mut self, text: &[u8], start: usize, tilde: Tilde) -> usize {
        if text.get(start) != Some(&b'~') {
            return start;
        }
        let mut end = start + 1;
        while end < text.len() {
            match text[end] {
                b'/' => break,
                b':' if tilde == Tilde::Assign => break,
                b if rash_syntax::syntax::is_ctl(b) => return start,
                _ => end += 1,
            }
        }
        let name = &text[start + 1..end];
        let home = if name.is_empty() {
            self.env.lookup_var("HOME")
        } else {
            std::str::from_utf8(name)
                .ok()
                .and_then(|user| nix::unistd::User::from_name(user).ok().flatten())
                .map(|user| user.dir.as_os_str().as_encoded_bytes().to_vec())
        };
        match home {
            Some(dir) => {
                // Tilde output is literal: no splitting, no globbing.
                for &b in &dir {
                    self.out.push(CTL_ESC);
                    self.out.push(b);
                }
                end
            }
            None => start,
        }
    }

    fn next_substitution(&mut self) -> Rc<[u8]> {
        let source = self.subs[self.sub_index].clone();
        self.sub_index += 1;
        source
    }

    /// Expands a nested word into its own buffer, discarding any split
    /// metadata it would have produced.
    fn sub_expand(&mut self, text: &[u8], quoted: bool, discard: bool) -> Result<Vec<u8>> {
        let out_mark = self.out.len();
        let region_mark = self.regions.len();
        let break_mark = self.breaks.len();
        self.walk(text, quoted, discard, Tilde::None)?;
        self.regions.truncate(region_mark);
        self.breaks.truncate(break_mark);
        Ok(self.out.split_off(out_mark))
    }

    /// Appends expanded bytes, escaping as the quote state demands and
    /// recording the split region for unquoted text.
    fn insert_value(&mut self, value: &[u8], quoted: bool) {
        if quoted {
            for &b in value {
                self.out.push(CTL_ESC);
                self.out.push(b);
            }
        } else {
            let start = self.out.len();
            for &b in value {
                if rash_syntax::syntax::is_ctl(b) {
                    self.out.push(CTL_ESC);
                }
                self.out.push(b);
            }
            let end = self.out.len();
            if start < end {
                self.regions.push(start..end);
            }
        }
    }

    /// Appends the positional parameters for `$@` or `$*`.
    fn insert_params(&mut self, values: &[Vec<u8>], star: bool, quoted: bool) {
        let ifs = self.env.ifs();
        if quoted && !star {
            // "$@": one field per parameter, boundaries preserved.
            if values.is_empty() {
                if self.out.last() == Some(&CTL_QUOTEMARK) {
                    self.out.pop();
                    self.skip_quotemark = true;
                }
                return;
            }
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    self.breaks.push(self.out.len());
                }
                for &b in value {
                    self.out.push(CTL_ESC);
                    self.out.push(b);
                }
            }
        } else if quoted {
            // "$*": joined with the first IFS byte.
            let sep = ifs.first().copied();
            let mut joined = Vec::new();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    if let Some(sep) = sep {
                        joined.push(sep);
                    }
                }
                joined.extend_from_slice(value);
            }
            for &b in &joined {
                self.out.push(CTL_ESC);
                self.out.push(b);
            }
        } else {
            // Unquoted $@ and $* both insert the parameters separated by
            // the first IFS byte, all of it subject to splitting.
            let sep = ifs.first().copied().unwrap_or(b' ');
            let start = self.out.len();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    self.out.push(sep);
                }
                for &b in value {
                    if rash_syntax::syntax::is_ctl(b) {
                        self.out.push(CTL_ESC);
                    }
                    self.out.push(b);
                }
            }
            let end = self.out.len();
            if start < end {
                self.regions.push(start..end);
            }
        }
    }

    /// Resolves a parameter by name.
    fn param_value(&mut self, name: &str) -> ParamValue {
        let bytes = name.as_bytes();
        match bytes {
            b"@" | b"*" => ParamValue::Params {
                values: self.env.positional.clone(),
                star: bytes == b"*",
            },
            b"#" => ParamValue::Set(self.env.positional.len().to_string().into_bytes()),
            b"?" => ParamValue::Set(self.env.exit_status.to_string().into_bytes()),
            b"-" => ParamValue::Set(
                rash_env::option::option_letters(self.env.options).into_bytes(),
            ),
            b"$" => ParamValue::Set(self.env.shell_pid.to_string().into_bytes()),
            b"!" => match self.env.jobs.last_async_pid() {
                Some(pid) => ParamValue::Set(pid.to_string().into_bytes()),
                None => ParamValue::Unset,
            },
            b"0" => ParamValue::Set(self.env.arg0.clone().into_bytes()),
            _ if bytes.first().is_some_and(u8::is_ascii_digit) => {
                let index: usize = name.parse().unwrap_or(usize::MAX);
                match index.checked_sub(1).and_then(|i| self.env.positional.get(i)) {
                    Some(value) => ParamValue::Set(value.clone()),
                    None => ParamValue::Unset,
                }
            }
            _ => match self.env.lookup_var(name) {
                Some(value) => ParamValue::Set(value),
                None => ParamValue::Unset,
            },
        }
    }

    /// Handles one `CTL_VAR … CTL_ENDVAR` group. Returns the index just
    /// past the group.
    fn eval_var(
        &mut self,
        text: &[u8],
        start: usize,
        quoted: bool,
        discard: bool,
    ) -> Result<usize> {
        let subtype_byte = text[start + 1];
        let subtype = subtype_byte & VS_TYPE_MASK;
        let nul = subtype_byte & VS_NUL != 0;
        let name_start = start + 2;
        let eq = name_start
            + text[name_start..]
                .iter()
                .position(|&b| b == b'=')
                .expect("malformed parameter encoding");
        let name = std::str::from_utf8(&text[name_start..eq]).expect("parameter names are ASCII");
        let word_start = eq + 1;
        let word_end = find_endvar(text, word_start);
        let next = word_end + 1;
        let word = &text[word_start..word_end];

        if discard {
            self.walk(word, quoted, true, Tilde::None)?;
            return Ok(next);
        }

        let value = self.param_value(name);
        let is_set = match &value {
            ParamValue::Unset => false,
            ParamValue::Set(v) => !(nul && v.is_empty()),
            ParamValue::Params { values, .. } => !values.is_empty(),
        };
        let nounset = self.env.options.contains(ShellOption::Nounset);

        match subtype {
            VS_NORMAL => {
                match value {
                    ParamValue::Unset if nounset => {
                        return self
                            .env
                            .sh_error(format_args!("{name}: parameter not set"));
                    }
                    ParamValue::Unset => {}
                    ParamValue::Set(v) => self.insert_value(&v, quoted),
                    ParamValue::Params { values, star } => {
                        self.insert_params(&values, star, quoted)
                    }
                }
                self.walk(word, quoted, true, Tilde::None)?;
            }
            VS_LENGTH => {
                let length = match value {
                    ParamValue::Unset if nounset => {
                        return self
                            .env
                            .sh_error(format_args!("{name}: parameter not set"));
                    }
                    ParamValue::Unset => 0,
                    ParamValue::Set(v) => v.len(),
                    ParamValue::Params { values, .. } => values.len(),
                };
                self.insert_value(length.to_string().as_bytes(), quoted);
                self.walk(word, quoted, true, Tilde::None)?;
            }
            VS_MINUS => {
                if is_set {
                    self.insert_param_value(value, quoted);
                    self.walk(word, quoted, true, Tilde::None)?;
                } else {
                    self.walk(word, quoted, false, Tilde::None)?;
                }
            }
            VS_PLUS => {
                if is_set {
                    self.walk(word, quoted, false, Tilde::None)?;
                } else {
                    self.walk(word, quoted, true, Tilde::None)?;
                }
            }
            VS_ASSIGN => {
                if is_set {
                    self.insert_param_value(value, quoted);
                    self.walk(word, quoted, true, Tilde::None)?;
                } else {
                    let marked = self.sub_expand(word, false, false)?;
                    let new_value = quote_removal(&marked);
                    if !rash_env::variable::is_name(name) {
                        return self
                            .env
                            .sh_error(format_args!("{name}: bad variable name"));
                    }
                    if let Err(e) = self.env.set_var(name, new_value.clone(), VarFlags::empty()) {
                        return self.env.sh_error(format_args!("{e}"));
                    }
                    self.insert_value(&new_value, quoted);
                }
            }
            VS_QUESTION => {
                if is_set {
                    self.insert_param_value(value, quoted);
                    self.walk(word, quoted, true, Tilde::None)?;
                } else {
                    let marked = self.sub_expand(word, false, false)?;
                    let message = quote_removal(&marked);
                    return if message.is_empty() {
                        self.env
                            .sh_error(format_args!("{name}: parameter not set"))
                    } else {
                        self.env.sh_error(format_args!(
                            "{name}: {}",
                            String::from_utf8_lossy(&message)
                        ))
                    };
                }
            }
            VS_TRIM_LEFT | VS_TRIM_LEFT_MAX | VS_TRIM_RIGHT | VS_TRIM_RIGHT_MAX => {
                let subject = match value {
                    ParamValue::Unset if nounset => {
                        return self
                            .env
                            .sh_error(format_args!("{name}: parameter not set"));
                    }
                    ParamValue::Unset => Vec::new(),
                    ParamValue::Set(v) => v,
                    ParamValue::Params { values, .. } => {
                        let sep = self.env.ifs().first().copied().unwrap_or(b' ');
                        let mut joined = Vec::new();
                        for (i, v) in values.iter().enumerate() {
                            if i > 0 {
                                joined.push(sep);
                            }
                            joined.extend_from_slice(v);
                        }
                        joined
                    }
                };
                let marked = self.sub_expand(word, false, false)?;
                let pattern = match Pattern::parse(to_pattern_bytes(&marked)) {
                    Ok(pattern) => pattern,
                    Err(e) => return self.env.sh_error(format_args!("{name}: {e}")),
                };
                let trimmed: &[u8] = match subtype {
                    VS_TRIM_LEFT => match pattern.shortest_prefix(&subject) {
                        Some(n) => &subject[n..],
                        None => &subject,
                    },
                    VS_TRIM_LEFT_MAX => match pattern.longest_prefix(&subject) {
                        Some(n) => &subject[n..],
                        None => &subject,
                    },
                    VS_TRIM_RIGHT => match pattern.shortest_suffix(&subject) {
                        Some(n) => &subject[..n],
                        None => &subject,
                    },
                    _ => match pattern.longest_suffix(&subject) {
                        Some(n) => &subject[..n],
                        None => &subject,
                    },
                };
                let trimmed = trimmed.to_vec();
                self.insert_value(&trimmed, quoted);
            }
            _ => unreachable!("unknown parameter subtype {subtype:#x}"),
        }
        Ok(next)
    }

    /// Substitutes an already-resolved parameter value.
    fn insert_param_value(&mut self, value: ParamValue, quoted: bool) {
        match value {
            ParamValue::Unset => {}
            ParamValue::Set(v) => self.insert_value(&v, quoted),
            ParamValue::Params { values, star } => self.insert_params(&values, star, quoted),
        }
    }

    /// Evaluates an arithmetic expression against the variable store.
    fn eval_arith(&mut self, expr: &str) -> Result<i64> {
        struct Bridge<'b> {
            env: &'b mut Env,
        }
        #[derive(Debug, thiserror::Error)]
        enum BridgeError {
            #[error("{0}: parameter not set")]
            Unset(String),
            #[error("{0}")]
            Assign(rash_env::variable::ReadOnlyError),
        }
        impl rash_arith::Env for Bridge<'_> {
            type Error = BridgeError;

            fn get_variable(&self, name: &str) -> std::result::Result<Option<String>, BridgeError> {
                match self.env.lookup_var(name) {
                    Some(value) => Ok(Some(String::from_utf8_lossy(&value).into_owned())),
                    None if self.env.options.contains(ShellOption::Nounset) => {
                        Err(BridgeError::Unset(name.to_owned()))
                    }
                    None => Ok(None),
                }
            }

            fn assign_variable(
                &mut self,
                name: &str,
                value: String,
            ) -> std::result::Result<(), BridgeError> {
                self.env
                    .set_var(name, value.into_bytes(), VarFlags::empty())
                    .map_err(BridgeError::Assign)
            }
        }

        let mut bridge = Bridge {
            env: &mut *self.env,
        };
        match rash_arith::eval(expr, &mut bridge) {
            Ok(value) => Ok(value),
            Err(e) => self
                .env
                .sh_error(format_args!("arithmetic expression: {e}")),
        }
    }

    /// Runs one command substitution and returns its output with
    /// trailing newlines stripped.
    fn command_substitution(&mut self, source: &Rc<[u8]>) -> Result<Vec<u8>> {
        use nix::unistd::ForkResult;
        use std::os::fd::AsRawFd;

        self.env.flush_outputs();
        let (read_end, write_end) = match nix::unistd::pipe() {
            Ok(ends) => ends,
            Err(e) => {
                return self
                    .env
                    .sh_error(format_args!("cannot create pipe: {e}"));
            }
        };

        // SAFETY: the child only runs the interpreter and exits.
        let child = match unsafe { nix::unistd::fork() } {
            Ok(fork) => fork,
            Err(e) => return self.env.sh_error(format_args!("cannot fork: {e}")),
        };
        match child {
            ForkResult::Child => {
                drop(read_end);
                self.env.enter_subshell();
                let _ = rash_env::redir::dup2_raw(write_end.as_raw_fd(), 1);
                drop(write_end);
                let status = crate::runner::run_subshell_source(self.env, source);
                self.env.flush_outputs();
                // SAFETY: terminating a forked child without unwinding.
                unsafe { libc::_exit(status.0) }
            }
            ForkResult::Parent { child } => {
                drop(write_end);
                let mut output;
                {
                    // The output accumulates in the arena, released once
                    // the bytes are copied out.
                    let mut arena = std::mem::take(&mut self.env.arena);
                    let mark = arena.mark();
                    let mut builder = arena.builder();
                    let mut reader = rash_env::input::FdReader::new(read_end.as_raw_fd());
                    let mut chunk = [0u8; 4096];
                    loop {
                        match std::io::Read::read(&mut reader, &mut chunk) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => builder.push_slice(&chunk[..n]),
                        }
                    }
                    output = builder.finish();
                    arena.release(mark);
                    self.env.arena = arena;
                }
                drop(read_end);

                let status = loop {
                    match nix::sys::wait::waitpid(child, None) {
                        Ok(status) if status.pid() == Some(child) => {
                            if let Some(exit) = wait_to_exit_status(status) {
                                break exit;
                            }
                        }
                        Ok(_) => continue,
                        Err(nix::errno::Errno::EINTR) => continue,
                        Err(_) => break rash_env::semantics::ExitStatus::FAILURE,
                    }
                };
                self.env.back_exit_status = status;

                while output.last() == Some(&b'\n') {
                    output.pop();
                }
                Ok(output)
            }
        }
    }
}

fn wait_to_exit_status(status: nix::sys::wait::WaitStatus) -> Option<rash_env::semantics::ExitStatus> {
    use nix::sys::wait::WaitStatus;
    match status {
        WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
            Some(rash_env::semantics::ExitStatus::from(status))
        }
        _ => None,
    }
}

/// Finds the `CTL_ENDVAR` matching the group whose operator word starts
/// at `from`.
fn find_endvar(text: &[u8], from: usize) -> usize {
    let mut depth = 0usize;
    let mut i = from;
    while i < text.len() {
        match text[i] {
            CTL_ESC => i += 2,
            CTL_VAR => {
                depth += 1;
                i += 1;
            }
            CTL_ENDVAR => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    text.len()
}

/// Finds the `CTL_ENDARI` closing an arithmetic expansion.
fn find_endari(text: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < text.len() {
        match text[i] {
            CTL_ESC => i += 2,
            CTL_ENDARI => return i,
            _ => i += 1,
        }
    }
    text.len()
}

/// Strips all control bytes, resolving escapes: the final expansion
/// stage.
pub(crate) fn quote_removal(marked: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(marked.len());
    let mut iter = marked.iter().copied();
    while let Some(byte) = iter.next() {
        match byte {
            CTL_QUOTEMARK => {}
            CTL_ESC => out.extend(iter.next()),
            byte => out.push(byte),
        }
    }
    out
}

/// Converts marked text into matcher input: quoted bytes are literal,
/// the rest keep their pattern meaning.
pub(crate) fn to_pattern_bytes(marked: &[u8]) -> Vec<PatternByte> {
    let mut out = Vec::with_capacity(marked.len());
    let mut in_quotes = false;
    let mut iter = marked.iter().copied();
    while let Some(byte) = iter.next() {
        match byte {
            CTL_QUOTEMARK => in_quotes = !in_quotes,
            CTL_ESC => {
                if let Some(b) = iter.next() {
                    out.push(PatternByte::Literal(b));
                }
            }
            byte if in_quotes => out.push(PatternByte::Literal(byte)),
            byte => out.push(PatternByte::Normal(byte)),
        }
    }
    out
}

/// Whether marked text still has an unquoted glob metacharacter.
fn has_glob_chars(marked: &[u8]) -> bool {
    rash_fnmatch::has_metachars(to_pattern_bytes(marked))
}

/// Expands one word into exactly one field: no field splitting, no
/// pathname expansion. Used for redirection targets, `case` subjects,
/// and the like.
pub fn expand_word(env: &mut Env, word: &Word) -> Result<Field> {
    let mut expander = Expander::new(env, &word.substitutions);
    expander.walk(&word.text, false, false, Tilde::Word)?;
    let expanded = expander.finish();
    Ok(Field::new(quote_removal(&expanded.text)))
}

/// Expands an assignment value (tilde after `:` applies).
pub fn expand_assignment_value(env: &mut Env, word: &Word, value_start: usize) -> Result<Vec<u8>> {
    let mut expander = Expander::new(env, &word.substitutions);
    expander.walk(&word.text[value_start..], false, false, Tilde::Assign)?;
    let expanded = expander.finish();
    Ok(quote_removal(&expanded.text))
}

/// Expands a here-document body: like a double-quoted string.
pub fn expand_heredoc(env: &mut Env, word: &Word) -> Result<Vec<u8>> {
    let mut expander = Expander::new(env, &word.substitutions);
    expander.walk(&word.text, true, false, Tilde::None)?;
    let expanded = expander.finish();
    Ok(quote_removal(&expanded.text))
}

/// Expands a `case` pattern into matcher input.
pub fn expand_pattern(env: &mut Env, word: &Word) -> Result<Vec<PatternByte>> {
    let mut expander = Expander::new(env, &word.substitutions);
    expander.walk(&word.text, false, false, Tilde::Word)?;
    let expanded = expander.finish();
    Ok(to_pattern_bytes(&expanded.text))
}

/// Fully expands a list of words into fields: all seven stages.
pub fn expand_words(env: &mut Env, words: &[Word]) -> Result<Vec<Field>> {
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for word in words {
        let mut expander = Expander::new(env, &word.substitutions);
        expander.walk(&word.text, false, false, Tilde::Word)?;
        let expanded = expander.finish();
        candidates.extend(split::split_fields(&expanded, &env.ifs()));
    }

    let glob_enabled = !env.options.contains(ShellOption::Noglob);
    let mut fields = Vec::with_capacity(candidates.len());
    {
        let _critical = interrupt::CriticalSection::enter();
        let mut arena = std::mem::take(&mut env.arena);
        let mark = arena.mark();
        for marked in candidates {
            if glob_enabled && has_glob_chars(&marked) {
                if let Some(paths) = glob::expand(&marked) {
                    fields.extend(paths.into_iter().map(Field::new));
                    continue;
                }
            }
            let mut builder = arena.builder();
            push_quote_removed(&mut builder, &marked);
            fields.push(Field::new(builder.finish()));
        }
        arena.release(mark);
        env.arena = arena;
    }
    Ok(fields)
}

fn push_quote_removed(builder: &mut rash_env::arena::StackString<'_>, marked: &[u8]) {
    let mut iter = marked.iter().copied();
    while let Some(byte) = iter.next() {
        match byte {
            CTL_QUOTEMARK => {}
            CTL_ESC => {
                if let Some(b) = iter.next() {
                    builder.push(b);
                }
            }
            byte => builder.push(byte),
        }
    }
}

/// Expands the assignments of a simple command, returning name-value
/// pairs.
pub fn expand_assignments(env: &mut Env, assigns: &[Word]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::with_capacity(assigns.len());
    for word in assigns {
        let (name, value_start) = rash_syntax::syntax::assignment_prefix(&word.text)
            .expect("parser only classifies valid assignments");
        let value = expand_assignment_value(env, word, value_start)?;
        out.push((name.to_owned(), value));
    }
    Ok(out)
}
