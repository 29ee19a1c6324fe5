//! Process-wide environment handling around a spawn.
//!
//! The PATH override and the working directory change both mutate global
//! process state. Neither is reentrant: only one `run` may be setting them up
//! at a time, which the supervisor actor guarantees for its own runs.

use crate::types::EnvMap;
use std::{env, ffi::OsString, io, path::Path};
use tracing::debug;

/// Expands `$NAME` and `${NAME}` references (and `%NAME%` on Windows) using
/// the current process environment. Unknown variables are left as written.
pub fn expand_vars(input: &str) -> String {
    expand_with(input, |name| env::var(name).ok())
}

fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let expanded = shellexpand::env_with_context_no_errors(input, |name| lookup(name));
    if cfg!(windows) {
        expand_percent(&expanded, &lookup)
    } else {
        expanded.into_owned()
    }
}

/// `%NAME%` references as cmd.exe writes them.
fn expand_percent(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        match tail.find('%') {
            Some(end) if end > 0 => {
                let name = &tail[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + end + 2]),
                }
                rest = &tail[end + 1..];
            }
            _ => {
                out.push('%');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// The environment a child is started with: the current process environment
/// overridden by `overrides`, with every value expanded.
pub fn child_env(overrides: &EnvMap) -> EnvMap {
    // variables that are not valid unicode are still inherited by the child
    let mut merged: EnvMap = env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
        .into_iter()
        .map(|(k, v)| {
            let v = expand_vars(&v);
            (k, v)
        })
        .collect()
}

/// Temporarily replaces the process PATH; the previous value comes back on drop.
#[must_use = "PATH is restored as soon as the guard is dropped"]
pub struct PathOverride {
    previous: Option<OsString>,
}

impl PathOverride {
    /// Sets PATH to `path` after expansion, e.g. `"$PATH:/opt/ruby/bin"`.
    pub fn apply(path: &str) -> Self {
        let previous = env::var_os("PATH");
        let expanded = expand_vars(path);
        debug!(path = %expanded, "overriding PATH for spawn");
        env::set_var("PATH", expanded);
        Self { previous }
    }
}

impl Drop for PathOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => env::set_var("PATH", previous),
            None => env::remove_var("PATH"),
        }
    }
}

/// Moves the whole process into `dir` so relative paths printed by the
/// child resolve against it. Left in place until the next run changes it.
pub fn enter_working_dir(dir: &Path) -> io::Result<()> {
    debug!(dir = %dir.display(), "changing working directory");
    env::set_current_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/dev".into()),
            "GEM_HOME" => Some("/gems".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_both_forms() {
        assert_eq!(expand_with("$HOME/bin", lookup), "/home/dev/bin");
        assert_eq!(expand_with("${GEM_HOME}/bin:$HOME", lookup), "/gems/bin:/home/dev");
    }

    #[test]
    fn unknown_and_malformed_references_are_kept() {
        assert_eq!(expand_with("$NOPE/x", lookup), "$NOPE/x");
        assert_eq!(expand_with("${NOPE}", lookup), "${NOPE}");
        assert_eq!(expand_with("cost: $ 5", lookup), "cost: $ 5");
        assert_eq!(expand_with("${HOME", lookup), "${HOME");
        assert_eq!(expand_with("trailing $", lookup), "trailing $");
    }

    #[test]
    fn percent_references() {
        assert_eq!(expand_percent("%HOME%\\bin", lookup), "/home/dev\\bin");
        assert_eq!(expand_percent("%NOPE%;%GEM_HOME%", lookup), "%NOPE%;/gems");
        assert_eq!(expand_percent("100% done", lookup), "100% done");
        assert_eq!(expand_percent("%%", lookup), "%%");
    }

    #[test]
    fn child_env_overrides_and_expands() {
        env::set_var("RAKELIB_ENV_TEST_ROOT", "/srv/app");
        let overrides = EnvMap::from([(
            "RAKE_OUT".to_string(),
            "${RAKELIB_ENV_TEST_ROOT}/out".to_string(),
        )]);
        let merged = child_env(&overrides);
        assert_eq!(merged["RAKE_OUT"], "/srv/app/out");
        assert_eq!(merged["RAKELIB_ENV_TEST_ROOT"], "/srv/app");
    }
}
