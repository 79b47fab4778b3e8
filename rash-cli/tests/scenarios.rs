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

//! End-to-end scenarios, running the built shell as a child process.

use std::process::{Command, Output};

fn shell() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rash"));
    command.env("PATH", "/usr/bin:/bin");
    command
}

fn run_script(script: &str) -> Output {
    shell()
        .arg("-c")
        .arg(script)
        .output()
        .expect("failed to run the shell")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn echo_hello_world() {
    let output = run_script("echo hello world");
    assert_eq!(stdout_of(&output), "hello world\n");
    assert!(output.status.success());
}

#[test]
fn local_variables_shadow_globals() {
    let output = run_script("x=1; f() { local x=2; echo $x; }; f; echo $x");
    assert_eq!(stdout_of(&output), "2\n1\n");
}

#[test]
fn for_loop_over_words() {
    let output = run_script("for i in a b c; do echo $i; done");
    assert_eq!(stdout_of(&output), "a\nb\nc\n");
}

#[test]
fn case_selects_first_matching_pattern() {
    let output = run_script("case abc in a*) echo A;; *) echo B;; esac");
    assert_eq!(stdout_of(&output), "A\n");
}

#[test]
fn arithmetic_expansion() {
    let output = run_script("echo $(( (1+2) * 3 ))");
    assert_eq!(stdout_of(&output), "9\n");
}

#[test]
fn here_document_with_tab_stripping() {
    let output = run_script("cat <<-EOF\n\there\n\tdoc\n\tEOF\n");
    assert_eq!(stdout_of(&output), "here\ndoc\n");
}

#[test]
fn exit_trap_runs_and_status_is_kept() {
    let output = run_script("trap 'echo bye' EXIT; exit 3");
    assert_eq!(stdout_of(&output), "bye\n");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn alias_expansion_without_recursion() {
    // Aliases apply from the next line on, so feed two lines on stdin.
    use std::io::Write;
    let mut child = shell()
        .arg("-s")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("failed to spawn the shell");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"alias a='echo x'\na\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(stdout_of(&output), "x\n");
}

#[test]
fn field_splitting_of_unquoted_expansions() {
    let output = run_script("set -- 'a  b'; f=$1; echo $f; echo \"$f\"");
    assert_eq!(stdout_of(&output), "a b\na  b\n");
}

#[test]
fn quoted_at_preserves_argument_boundaries() {
    let output = run_script(r#"set -- 'a b' c; for x in "$@"; do echo "[$x]"; done"#);
    assert_eq!(stdout_of(&output), "[a b]\n[c]\n");
}

#[test]
fn command_substitution_strips_trailing_newlines() {
    let output = run_script("x=$(printf 'keep\\n\\n\\n'); printf '[%s]' \"$x\"");
    assert_eq!(stdout_of(&output), "[keep]");
}

#[test]
fn background_jobs_and_wait() {
    let output = run_script("sleep 0.1 & sleep 0.1 & wait; echo done $?");
    assert_eq!(stdout_of(&output), "done 0\n");
}

#[test]
fn dollar_bang_names_the_last_background_pid() {
    let output = run_script("sleep 0.1 & p=$!; wait $!; echo ${p:+havepid}");
    assert_eq!(stdout_of(&output), "havepid\n");
}

#[test]
fn failed_redirection_leaves_descriptors_intact() {
    let output =
        run_script("echo before; echo hidden > /no/such/dir/file; echo after");
    // The failed redirection must not disturb the shell's own stdout.
    let out = stdout_of(&output);
    assert!(out.contains("before\n"), "{out}");
    assert!(out.contains("after\n"), "{out}");
    assert!(!out.contains("hidden"), "{out}");
}

#[test]
fn syntax_error_exits_2() {
    let output = run_script("fi");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn command_not_found_is_127() {
    let output = run_script("definitely-not-a-command-xyz");
    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn unset_under_nounset_is_fatal() {
    let output = run_script("set -u; echo $missing; echo unreached");
    assert_eq!(output.status.code(), Some(2));
    assert!(!stdout_of(&output).contains("unreached"));
}

#[test]
fn errexit_stops_the_script() {
    let output = run_script("set -e; false; echo unreached");
    assert!(!stdout_of(&output).contains("unreached"));
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn subshells_do_not_leak_state() {
    let output = run_script("x=outer; (x=inner; echo $x); echo $x");
    assert_eq!(stdout_of(&output), "inner\nouter\n");
}

#[test]
fn pipeline_status_is_the_last_stage() {
    let output = run_script("true | sh -c 'exit 5'; echo $?");
    assert_eq!(stdout_of(&output), "5\n");
}

#[test]
fn quote_round_trip_through_command_substitution() {
    for sample in ["plain", "two  spaces", "tab\there", "star*question?"] {
        let script = format!("s=$(printf '%s' '{sample}'); printf '%s' \"$s\"");
        let output = run_script(&script);
        assert_eq!(stdout_of(&output), sample, "{sample}");
    }
}

#[test]
fn positional_parameters_from_argv() {
    let output = shell()
        .args(["-c", "echo $0:$1:$2:$#", "zero", "one", "two"])
        .output()
        .unwrap();
    assert_eq!(stdout_of(&output), "zero:one:two:2\n");
}

#[test]
fn dot_script_runs_in_the_current_shell() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib.sh");
    std::fs::write(&lib, "sourced=yes\n").unwrap();
    let script = format!(". {}; echo $sourced", lib.display());
    let output = run_script(&script);
    assert_eq!(stdout_of(&output), "yes\n");
}

#[test]
fn script_file_mode() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("s.sh");
    std::fs::write(&script, "echo from script $1\n").unwrap();
    let output = shell()
        .arg(script.to_str().unwrap())
        .arg("arg1")
        .output()
        .unwrap();
    assert_eq!(stdout_of(&output), "from script arg1\n");
}

#[test]
fn interrupt_signal_reports_128_plus_signal() {
    let output = run_script("sh -c 'kill -INT $$'; echo $?");
    assert_eq!(stdout_of(&output), "130\n");
}
