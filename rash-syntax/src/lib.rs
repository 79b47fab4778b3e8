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

//! Shell language syntax: input, lexer, parser, and the abstract syntax
//! tree.
//!
//! The crate is self-contained: feed an [`input::InputStack`] to a
//! [`parser::lex::Lexer`], drive a [`parser::Parser`] over it, and get
//! [`syntax::Node`] values describing complete commands. Evaluation of
//! the tree lives elsewhere.

pub mod alias;
pub mod input;
pub mod parser;
pub mod syntax;
