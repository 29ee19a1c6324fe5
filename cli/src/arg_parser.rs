use clap::Parser;
use rakelib::{BuildConfig, RunContext};
use std::{error, fs, path::PathBuf};

/// Run rake and stream its output to the terminal. Ctrl-C cancels the build.
#[derive(Debug, Parser)]
#[clap(name = "rake-runner")]
pub struct ArgParser {
    /// JSON build file; flags given on the command line take precedence
    #[clap(short = 'b', long = "build-file")]
    pub build_file: Option<PathBuf>,

    /// a rake task; may be repeated, `$file` and `$file_name` are substituted
    #[clap(short = 't', long = "task", multiple_occurrences = true)]
    pub tasks: Vec<String>,

    /// an extra flag passed to rake after the tasks
    #[clap(long = "option", multiple_occurrences = true, allow_hyphen_values = true)]
    pub options: Vec<String>,

    /// an argument placed before rake, e.g. `bundle`
    #[clap(long = "prefix", multiple_occurrences = true, allow_hyphen_values = true)]
    pub prefix: Vec<String>,

    /// working directory for the build
    #[clap(short = 'C', long = "working-dir")]
    pub working_dir: Option<PathBuf>,

    /// the file being worked on
    #[clap(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// encoding of the build output
    #[clap(long)]
    pub encoding: Option<String>,

    /// environment variable for the build, as VAR=VAL
    #[clap(short = 'e', long = "env", multiple_occurrences = true, parse(try_from_str = var_eq_val))]
    pub envs: Vec<(String, String)>,

    /// PATH to use while starting rake, e.g. `$HOME/.rbenv/shims:$PATH`
    #[clap(long, env = "RAKE_RUNNER_PATH")]
    pub path: Option<String>,

    /// start rake through the system shell
    #[clap(long)]
    pub shell: bool,

    /// do not print the summary line
    #[clap(short = 'q', long)]
    pub quiet: bool,
}

impl ArgParser {
    /// The build file (if any) with the command line flags applied on top.
    pub fn build_config(&self) -> Result<BuildConfig, Box<dyn error::Error>> {
        let mut config = match &self.build_file {
            Some(path) => BuildConfig::from_json(&fs::read_to_string(path)?)?,
            None => BuildConfig::default(),
        };
        if !self.tasks.is_empty() {
            config.tasks = self.tasks.clone();
        }
        if !self.options.is_empty() {
            config.options = self.options.clone();
        }
        if !self.prefix.is_empty() {
            config.prefix = self.prefix.clone();
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = Some(dir.clone());
        }
        if let Some(encoding) = &self.encoding {
            config.encoding = encoding.clone();
        }
        if let Some(path) = &self.path {
            config.path = Some(path.clone());
        }
        config.env.extend(self.envs.iter().cloned());
        config.shell |= self.shell;
        config.quiet |= self.quiet;
        config.validate()?;
        Ok(config)
    }

    pub fn run_context(&self) -> RunContext {
        RunContext {
            active_file: self.file.clone(),
            ..RunContext::default()
        }
    }
}

/// try_from_str parse function for command env variables
fn var_eq_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, val)) if !var.is_empty() => Ok((var.to_string(), val.to_string())),
        _ => Err("Required format is VAR=VAL".to_string()),
    }
}
