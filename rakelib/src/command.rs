//! Command line construction.

use crate::config::BuildConfig;
use crate::types::Argv;
use std::path::Path;

#[cfg(windows)]
pub const TOOL_BINARY: &str = "rake.bat";
#[cfg(not(windows))]
pub const TOOL_BINARY: &str = "rake";

/// Joins tasks into one space separated argument, substituting `$file_name`
/// and `$file` with the active file's base name and full path.
pub fn flatten_tasks(tasks: &[String], active_file: Option<&Path>) -> String {
    let file = active_file.map(|f| f.to_string_lossy().into_owned());
    let file_name = active_file
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());

    tasks
        .iter()
        .map(|task| {
            let mut task = task.clone();
            // `$file_name` first, `$file` is a prefix of it
            if let Some(file_name) = &file_name {
                task = task.replace("$file_name", file_name);
            }
            if let Some(file) = &file {
                task = task.replace("$file", file);
            }
            task
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `prefix ++ [tool] ++ [tasks] ++ options`
pub fn build_argv(config: &BuildConfig, active_file: Option<&Path>) -> Argv {
    let mut argv = config.prefix.clone();
    argv.push(TOOL_BINARY.to_string());
    if !config.tasks.is_empty() {
        argv.push(flatten_tasks(&config.tasks, active_file));
    }
    argv.extend(config.options.iter().cloned());
    argv
}

/// The line echoed to the sink before the command is started.
pub fn echo_line(argv: &[String]) -> String {
    format!("> {}\n", argv.join(" "))
}
