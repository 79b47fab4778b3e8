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

//! Command search
//!
//! Resolution order: special built-ins, functions, regular built-ins,
//! then a `$PATH` walk. Successful path lookups are cached together
//! with the index of the `$PATH` element they were found under; the
//! cache is invalidated by `$PATH` changes (see `Env::set_var`) and by
//! `hash -r`.

use rash_env::builtin::{Builtin, BuiltinKind};
use rash_env::function::Function;
use rash_env::{CachedCmd, Env};
use std::os::unix::ffi::OsStrExt;
use std::rc::Rc;

/// Where a command name resolved to
#[derive(Clone, Debug)]
pub enum CommandLocation {
    Builtin(Builtin),
    Function(Rc<Function>),
    External {
        /// Full path of the executable
        path: Vec<u8>,
    },
    NotFound,
}

/// Whether a path names an executable regular file.
fn is_executable(path: &[u8]) -> bool {
    let path = std::path::Path::new(std::ffi::OsStr::from_bytes(path));
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
}

fn join_path(dir: &[u8], name: &str) -> Vec<u8> {
    let mut full = dir.to_vec();
    if full.is_empty() {
        full.push(b'.');
    }
    if full.last() != Some(&b'/') {
        full.push(b'/');
    }
    full.extend_from_slice(name.as_bytes());
    full
}

/// Looks up a command name.
///
/// `path_override` replaces `$PATH` for the search (the `command -p` and
/// `hash` built-ins use it); overridden searches are not cached. With
/// `skip_functions`, functions are not consulted (`command` and `exec`).
pub fn find_command(
    env: &mut Env,
    name: &str,
    path_override: Option<&[u8]>,
    skip_functions: bool,
) -> CommandLocation {
    if name.contains('/') {
        return CommandLocation::External {
            path: name.as_bytes().to_vec(),
        };
    }

    let builtin = env.builtins.get(name).copied();
    if let Some(builtin) = builtin {
        if builtin.kind == BuiltinKind::Special {
            return CommandLocation::Builtin(builtin);
        }
    }
    if !skip_functions {
        if let Some(function) = env.functions.get(name) {
            return CommandLocation::Function(Rc::clone(function));
        }
    }
    if let Some(builtin) = builtin {
        return CommandLocation::Builtin(builtin);
    }

    match find_external(env, name, path_override) {
        Some(path) => CommandLocation::External { path },
        None => CommandLocation::NotFound,
    }
}

/// The `$PATH` walk alone, skipping functions and built-ins.
///
/// This is what `exec` and `hash` resolve with. A name containing a
/// slash is returned as is.
pub fn find_external(
    env: &mut Env,
    name: &str,
    path_override: Option<&[u8]>,
) -> Option<Vec<u8>> {
    if name.contains('/') {
        return Some(name.as_bytes().to_vec());
    }
    if path_override.is_none() {
        if let Some(cached) = env.cmd_cache.get(name) {
            return Some(cached.path.clone());
        }
    }

    let path_value = match path_override {
        Some(value) => Some(value.to_vec()),
        None => env.lookup_var("PATH"),
    };
    let path_value = path_value.unwrap_or_default();
    for (index, dir) in path_value.split(|&b| b == b':').enumerate() {
        let full = join_path(dir, name);
        if is_executable(&full) {
            if path_override.is_none() {
                env.cmd_cache
                    .insert(name.to_owned(), CachedCmd {
                        path: full.clone(),
                        index,
                    });
            }
            return Some(full);
        }
    }
    None
}
