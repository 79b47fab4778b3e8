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

//! Stackable input sources
//!
//! The lexer reads bytes through an [`InputStack`]. Frames are pushed for
//! a script file, a `-c` string, or a dot script, and each frame can
//! carry a stack of pushed-back strings representing alias replacement
//! text inserted into the token stream.
//!
//! The reader yields [`InChar`] values rather than plain bytes: the
//! pseudo-characters [`InChar::EndOfAlias`] and [`InChar::Eof`] mark the
//! boundary of an alias replacement and the true end of the current
//! frame. The names of aliases whose text is currently on the stack are
//! tracked here; the lexer consults [`InputStack::is_alias_active`]
//! before expanding an alias again, which is what prevents recursion.

use std::collections::HashSet;
use std::io::Read;
use std::io::Write as _;

/// One unit of input as seen by the lexer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InChar {
    /// Ordinary byte
    Byte(u8),
    /// Boundary between alias replacement text and the surrounding input
    EndOfAlias,
    /// End of the current input frame
    Eof,
}

/// Pushed-back string on top of a frame, usually alias text
#[derive(Debug)]
struct StrPush {
    text: Vec<u8>,
    pos: usize,
    /// Name of the alias the text came from, if any
    alias: Option<String>,
}

#[derive(Debug)]
enum FrameSource {
    /// Byte stream, refilled on demand
    Reader(Box<dyn ReadDebug>),
    /// Fixed text, fully buffered
    Text,
}

/// `Read` with a `Debug` impl so frames stay debuggable.
pub trait ReadDebug: Read {}
impl<T: Read> ReadDebug for T {}

impl std::fmt::Debug for dyn ReadDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<reader>")
    }
}

#[derive(Debug)]
struct Frame {
    source: FrameSource,
    buf: Vec<u8>,
    pos: usize,
    lineno: u64,
    pushes: Vec<StrPush>,
    eof: bool,
}

impl Frame {
    fn text(buf: Vec<u8>) -> Self {
        Frame {
            source: FrameSource::Text,
            buf,
            pos: 0,
            lineno: 1,
            pushes: Vec::new(),
            eof: false,
        }
    }

    fn reader(reader: Box<dyn ReadDebug>) -> Self {
        Frame {
            source: FrameSource::Reader(reader),
            buf: Vec::new(),
            pos: 0,
            lineno: 1,
            pushes: Vec::new(),
            eof: false,
        }
    }
}

/// Stack of input frames
#[derive(Debug)]
pub struct InputStack {
    frames: Vec<Frame>,
    /// Pushed-back pseudo-characters, innermost last
    unget: Vec<InChar>,
    active_aliases: HashSet<String>,
    /// Prompt bytes to write to standard error before the next refill of
    /// the bottom frame
    prompt: Option<Vec<u8>>,
    /// Whether prompting applies (interactive shell reading the bottom
    /// frame)
    pub interactive: bool,
    /// Echo raw input to standard error as it is read (`set -v`)
    pub echo: bool,
}

impl InputStack {
    /// Creates a stack reading from the given byte stream.
    pub fn from_reader<R: Read + 'static>(reader: R) -> Self {
        InputStack {
            frames: vec![Frame::reader(Box::new(reader))],
            unget: Vec::new(),
            active_aliases: HashSet::new(),
            prompt: None,
            interactive: false,
            echo: false,
        }
    }

    /// Creates a stack reading fixed text (`sh -c`).
    pub fn from_text<B: Into<Vec<u8>>>(text: B) -> Self {
        InputStack {
            frames: vec![Frame::text(text.into())],
            unget: Vec::new(),
            active_aliases: HashSet::new(),
            prompt: None,
            interactive: false,
            echo: false,
        }
    }

    /// Pushes a new frame reading from a byte stream (dot scripts).
    pub fn push_reader<R: Read + 'static>(&mut self, reader: R) {
        self.frames.push(Frame::reader(Box::new(reader)));
    }

    /// Pushes a new frame reading fixed text (`eval`).
    pub fn push_text<B: Into<Vec<u8>>>(&mut self, text: B) {
        self.frames.push(Frame::text(text.into()));
    }

    /// Pops the innermost frame, returning to the enclosing input.
    ///
    /// The bottom frame is never popped.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Number of frames on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes alias replacement text onto the current frame.
    ///
    /// The alias name is recorded as active until the text has been
    /// consumed.
    pub fn push_alias(&mut self, name: &str, replacement: &str) {
        self.active_aliases.insert(name.to_owned());
        self.frames
            .last_mut()
            .expect("input stack never empty")
            .pushes
            .push(StrPush {
                text: replacement.as_bytes().to_vec(),
                pos: 0,
                alias: Some(name.to_owned()),
            });
    }

    /// Whether an alias of this name is currently being read.
    #[must_use]
    pub fn is_alias_active(&self, name: &str) -> bool {
        self.active_aliases.contains(name)
    }

    /// Line number of the current read position.
    #[must_use]
    pub fn lineno(&self) -> u64 {
        self.frames.last().map_or(1, |f| f.lineno)
    }

    /// Overrides the current line number (used by `eval` to keep
    /// `$LINENO` pointing into the surrounding script).
    pub fn set_lineno(&mut self, lineno: u64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.lineno = lineno;
        }
    }

    /// Arms a prompt to be written before the next interactive refill.
    pub fn set_prompt(&mut self, prompt: Vec<u8>) {
        self.prompt = Some(prompt);
    }

    /// Reads one unit of input.
    pub fn pget(&mut self) -> InChar {
        if let Some(c) = self.unget.pop() {
            if c == InChar::Byte(b'\n') {
                if let Some(frame) = self.frames.last_mut() {
                    frame.lineno += 1;
                }
            }
            return c;
        }

        let at_bottom = self.frames.len() == 1;
        let frame = self.frames.last_mut().expect("input stack never empty");

        // Alias pushback has priority over the frame's own text.
        while let Some(push) = frame.pushes.last_mut() {
            if push.pos < push.text.len() {
                let byte = push.text[push.pos];
                push.pos += 1;
                if byte == b'\n' {
                    frame.lineno += 1;
                }
                return InChar::Byte(byte);
            }
            let finished = frame.pushes.pop().expect("just observed");
            if let Some(name) = finished.alias {
                self.active_aliases.remove(&name);
                return InChar::EndOfAlias;
            }
        }

        loop {
            if frame.pos < frame.buf.len() {
                let byte = frame.buf[frame.pos];
                frame.pos += 1;
                if byte == b'\n' {
                    frame.lineno += 1;
                }
                return InChar::Byte(byte);
            }
            if frame.eof {
                return InChar::Eof;
            }
            match &mut frame.source {
                FrameSource::Text => {
                    frame.eof = true;
                    return InChar::Eof;
                }
                FrameSource::Reader(reader) => {
                    if self.interactive && at_bottom {
                        if let Some(prompt) = self.prompt.take() {
                            let _ = std::io::stderr().write_all(&prompt);
                        }
                    }
                    let mut chunk = [0u8; 8192];
                    match reader.read(&mut chunk) {
                        Ok(0) => {
                            // End of input; a fresh read is attempted if
                            // the caller keeps going (interactive EOF
                            // with ignoreeof re-reads the terminal).
                            return InChar::Eof;
                        }
                        Ok(n) => {
                            if self.echo {
                                let _ = std::io::stderr().write_all(&chunk[..n]);
                            }
                            frame.buf.drain(..frame.pos);
                            frame.pos = 0;
                            frame.buf.extend_from_slice(&chunk[..n]);
                        }
                        Err(_) => {
                            frame.eof = true;
                            return InChar::Eof;
                        }
                    }
                }
            }
        }
    }

    /// Pushes one unit of input back; it is returned by the next
    /// [`pget`](Self::pget).
    pub fn unget(&mut self, c: InChar) {
        if c == InChar::Byte(b'\n') {
            if let Some(frame) = self.frames.last_mut() {
                frame.lineno = frame.lineno.saturating_sub(1);
            }
        }
        self.unget.push(c);
    }

    /// Discards pushed-back input and alias text after a syntax error, so
    /// the next parse starts clean on the following line.
    pub fn discard_pushback(&mut self) {
        self.unget.clear();
        if let Some(frame) = self.frames.last_mut() {
            for push in frame.pushes.drain(..) {
                if let Some(name) = push.alias {
                    self.active_aliases.remove(&name);
                }
            }
        }
    }

    /// Discards pushed-back input, alias text, and bytes already
    /// buffered from the source. After a syntax error the rest of what
    /// was typed is abandoned; the next read starts from fresh input.
    pub fn flush_buffered(&mut self) {
        self.discard_pushback();
        if let Some(frame) = self.frames.last_mut() {
            frame.pos = frame.buf.len();
        }
    }

    /// Skips input up to and including the next newline (error recovery
    /// and comments-to-end-of-line in non-interactive input).
    pub fn skip_to_newline(&mut self) {
        loop {
            match self.pget() {
                InChar::Byte(b'\n') | InChar::Eof => return,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(stack: &mut InputStack) -> Vec<InChar> {
        let mut out = Vec::new();
        loop {
            let c = stack.pget();
            out.push(c);
            if c == InChar::Eof {
                return out;
            }
        }
    }

    #[test]
    fn text_frame_yields_bytes_then_eof() {
        let mut stack = InputStack::from_text("ab");
        assert_eq!(
            collect(&mut stack),
            [InChar::Byte(b'a'), InChar::Byte(b'b'), InChar::Eof]
        );
        // Eof is sticky for text frames.
        assert_eq!(stack.pget(), InChar::Eof);
    }

    #[test]
    fn reader_frame() {
        let mut stack = InputStack::from_reader(std::io::Cursor::new(b"hi".to_vec()));
        assert_eq!(
            collect(&mut stack),
            [InChar::Byte(b'h'), InChar::Byte(b'i'), InChar::Eof]
        );
    }

    #[test]
    fn line_counting() {
        let mut stack = InputStack::from_text("a\nb\n");
        assert_eq!(stack.lineno(), 1);
        stack.pget(); // a
        assert_eq!(stack.lineno(), 1);
        stack.pget(); // newline
        assert_eq!(stack.lineno(), 2);
        let c = stack.pget(); // b
        assert_eq!(c, InChar::Byte(b'b'));
        stack.unget(c);
        assert_eq!(stack.lineno(), 2);
        stack.pget();
        stack.pget(); // newline
        assert_eq!(stack.lineno(), 3);
    }

    #[test]
    fn unget_round_trip() {
        let mut stack = InputStack::from_text("xy");
        let x = stack.pget();
        stack.unget(x);
        assert_eq!(stack.pget(), InChar::Byte(b'x'));
        assert_eq!(stack.pget(), InChar::Byte(b'y'));
    }

    #[test]
    fn alias_text_is_read_first_and_bounded() {
        let mut stack = InputStack::from_text("rest");
        stack.push_alias("a", "XY");
        assert!(stack.is_alias_active("a"));
        assert_eq!(stack.pget(), InChar::Byte(b'X'));
        assert_eq!(stack.pget(), InChar::Byte(b'Y'));
        assert_eq!(stack.pget(), InChar::EndOfAlias);
        assert!(!stack.is_alias_active("a"));
        assert_eq!(stack.pget(), InChar::Byte(b'r'));
    }

    #[test]
    fn nested_alias_pushback() {
        let mut stack = InputStack::from_text("");
        stack.push_alias("outer", "O");
        stack.push_alias("inner", "I");
        assert_eq!(stack.pget(), InChar::Byte(b'I'));
        assert_eq!(stack.pget(), InChar::EndOfAlias);
        assert_eq!(stack.pget(), InChar::Byte(b'O'));
        assert_eq!(stack.pget(), InChar::EndOfAlias);
        assert_eq!(stack.pget(), InChar::Eof);
    }

    #[test]
    fn frames_nest() {
        let mut stack = InputStack::from_text("outer");
        stack.push_text("in");
        assert_eq!(stack.pget(), InChar::Byte(b'i'));
        assert_eq!(stack.pget(), InChar::Byte(b'n'));
        assert_eq!(stack.pget(), InChar::Eof);
        stack.pop_frame();
        assert_eq!(stack.pget(), InChar::Byte(b'o'));
    }

    #[test]
    fn discard_pushback_clears_aliases() {
        let mut stack = InputStack::from_text("tail");
        stack.push_alias("a", "unread");
        stack.unget(InChar::Byte(b'z'));
        stack.discard_pushback();
        assert!(!stack.is_alias_active("a"));
        assert_eq!(stack.pget(), InChar::Byte(b't'));
    }

    #[test]
    fn skip_to_newline() {
        let mut stack = InputStack::from_text("junk junk\nnext");
        stack.skip_to_newline();
        assert_eq!(stack.pget(), InChar::Byte(b'n'));
    }

    #[test]
    fn flush_buffered_abandons_the_rest() {
        let mut stack = InputStack::from_text("rest of line");
        stack.push_alias("a", "unread");
        stack.pget();
        stack.flush_buffered();
        assert!(!stack.is_alias_active("a"));
        assert_eq!(stack.pget(), InChar::Eof);
    }
}
