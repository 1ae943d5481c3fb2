// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure POSIX path logic shared by every backend.
//!
//! These functions never touch the filesystem: remote backends apply them to
//! paths that only exist on the other end of a transport.

use std::borrow::Cow;

/// Normalize `target` against `base` without consulting any filesystem.
///
/// Rules:
/// - both inputs are trimmed
/// - `.` resolves to `base`
/// - absolute paths (`/...`) and home-relative paths (`~`, `~/...`) pass
///   through, with a trailing `/` stripped (except the root itself)
/// - anything else joins as `base/target`, trailing `/` stripped
pub fn normalize_path(target: &str, base: &str) -> String {
    let target = target.trim();
    let base = base.trim();

    if target == "." {
        return base.to_string();
    }

    if target.starts_with('/') || target == "~" || target.starts_with("~/") {
        return strip_trailing_slash(target).to_string();
    }

    let joined = format!("{}/{}", strip_trailing_slash(base), target);
    strip_trailing_slash(&joined).to_string()
}

/// Expand a leading `~` against the given home directory.
///
/// Paths that do not start with `~` are returned unchanged. Works on paths
/// that do not exist; remote homes are captured once at `ensure_ready`.
pub fn expand_tilde<'a>(path: &'a str, home: &str) -> Cow<'a, str> {
    if path == "~" {
        return Cow::Owned(home.to_string());
    }
    match path.strip_prefix("~/") {
        Some(rest) => Cow::Owned(format!("{}/{}", strip_trailing_slash(home), rest)),
        None => Cow::Borrowed(path),
    }
}

/// Quote a string for a remote POSIX shell.
///
/// NUL bytes cannot appear in a legitimate path or command; they are dropped
/// rather than failing the whole composition.
pub fn quote(s: &str) -> String {
    match shlex::try_quote(s) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => {
            let cleaned: String = s.chars().filter(|&c| c != '\0').collect();
            shlex::try_quote(&cleaned).map(|q| q.into_owned()).unwrap_or_default()
        }
    }
}

/// Quote a cwd for `cd`, leaving a leading `~` unquoted so the remote shell
/// expands it.
pub fn quote_cwd(cwd: &str) -> String {
    if cwd == "~" {
        return "~".to_string();
    }
    match cwd.strip_prefix("~/") {
        Some(rest) => format!("~/{}", quote(rest)),
        None => quote(cwd),
    }
}

fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
