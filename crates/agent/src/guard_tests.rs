// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    dd = { "dd if=/dev/zero of=file", true },
    awk_direct = { "awk '{print > \"out\"}' input", true },
    awk_piped = { "ps aux | awk '{print $1}'", true },
    tee = { "make 2>&1 | tee build.log", true },
    sed_in_place = { "sed -i 's/a/b/' src/app.ts", true },
    sed_in_place_suffix = { "sed -i.bak 's/a/b/' src/app.ts", true },
    sed_read_only = { "sed 's/a/b/' src/app.ts", false },
    echo_redirect = { "echo hello > file.txt", true },
    echo_append = { "echo hello >> file.txt", true },
    echo_plain = { "echo hello", false },
    echo_fd_dup = { "echo hello >&2", false },
    printf_redirect = { "printf '%s' x > out", true },
    cat_redirect = { "cat a b > c", true },
    cat_read = { "cat package.json", false },
    tests_pass = { "npm test", false },
    typecheck = { "tsc --noEmit", false },
    build_with_stderr = { "cargo build 2>&1", false },
    chained_denied = { "npm test && echo done > status", true },
    chained_allowed = { "npm install && npm test", false },
    sudo_wrapped = { "sudo dd if=x of=y", true },
    env_prefixed = { "FOO=1 tee out", true },
    path_prefixed = { "/usr/bin/tee out", true },
)]
fn deny_list(command: &str, denied: bool) {
    assert_eq!(denied_reason(command).is_some(), denied, "{command}");
}

#[test]
fn refusal_is_stable() {
    assert!(REFUSAL.starts_with("Command blocked"));
}
