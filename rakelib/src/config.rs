//! Build configuration, in the shape of an editor build-system file.

use crate::error::Result;
use crate::types::{Argv, Dir, EnvMap};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_FILE_REGEX: &str = "^(...*?):([0-9]*):?([0-9]*)";
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Options recognized for a single `run`.
///
/// Every field is optional in a JSON build file; missing fields take the
/// values of [`BuildConfig::default`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Task identifiers, joined into a single argument after the tool.
    pub tasks: Vec<String>,
    /// Extra flags appended verbatim.
    pub options: Argv,
    /// Arguments placed before the tool, e.g. an interpreter.
    pub prefix: Argv,
    pub file_regex: String,
    pub line_regex: String,
    pub working_dir: Option<Dir>,
    pub encoding: String,
    pub env: EnvMap,
    /// Suppress the `[Finished ...]` summary lines.
    pub quiet: bool,
    /// Cancel the current job instead of starting a new one.
    pub kill: bool,
    /// Temporary PATH used while spawning, e.g. `"/opt/ruby/bin:$PATH"`.
    pub path: Option<String>,
    /// Run through the platform command shell.
    pub shell: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tasks: vec![],
            options: vec![],
            prefix: vec![],
            file_regex: DEFAULT_FILE_REGEX.to_string(),
            line_regex: String::new(),
            working_dir: None,
            encoding: DEFAULT_ENCODING.to_string(),
            env: EnvMap::new(),
            quiet: false,
            kill: false,
            path: None,
            shell: false,
        }
    }
}

impl BuildConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// A config whose only purpose is cancelling the current job.
    pub fn cancel() -> Self {
        Self {
            kill: true,
            ..Self::default()
        }
    }

    /// Checks the parts of the config that are interpreted by the supervisor.
    pub fn validate(&self) -> Result<()> {
        crate::encoding::Encoding::from_label(&self.encoding)?;
        regex::Regex::new(&self.file_regex)?;
        if !self.line_regex.is_empty() {
            regex::Regex::new(&self.line_regex)?;
        }
        Ok(())
    }
}

/// What the host knows about its surroundings when a run is requested.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    /// The file the user is looking at; drives `$file` substitution and the
    /// default working directory.
    pub active_file: Option<Dir>,
    /// Per-context environment overrides, applied on top of `BuildConfig::env`.
    pub build_env: EnvMap,
}

impl RunContext {
    pub fn with_active_file(file: impl Into<Dir>) -> Self {
        Self {
            active_file: Some(file.into()),
            ..Self::default()
        }
    }

    /// Working directory for a run: the explicit one, else the active file's directory.
    pub fn resolve_working_dir(&self, explicit: Option<&Path>) -> Option<Dir> {
        match explicit {
            Some(dir) if !dir.as_os_str().is_empty() => Some(dir.to_path_buf()),
            _ => self
                .active_file
                .as_deref()
                .and_then(Path::parent)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf),
        }
    }

    /// `config_env` overridden by this context's `build_env`.
    pub fn merge_env(&self, config_env: &EnvMap) -> EnvMap {
        let mut merged = config_env.clone();
        merged.extend(self.build_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = BuildConfig::from_json(r#"{ "tasks": ["spec"], "quiet": true }"#).unwrap();
        assert_eq!(config.tasks, vec!["spec"]);
        assert!(config.quiet);
        assert_eq!(config.file_regex, DEFAULT_FILE_REGEX);
        assert_eq!(config.encoding, "utf-8");
        assert!(!config.kill);
    }

    #[test]
    fn explicit_working_dir_wins() {
        let context = RunContext::with_active_file("/src/app/models/user.rb");
        assert_eq!(
            context.resolve_working_dir(Some(Path::new("/build"))),
            Some(Dir::from("/build"))
        );
        assert_eq!(
            context.resolve_working_dir(None),
            Some(Dir::from("/src/app/models"))
        );
        assert_eq!(RunContext::default().resolve_working_dir(None), None);
    }

    #[test]
    fn context_env_overrides_config_env() {
        let mut context = RunContext::default();
        context.build_env.insert("RAILS_ENV".into(), "test".into());
        let config_env = EnvMap::from([
            ("RAILS_ENV".to_string(), "development".to_string()),
            ("COVERAGE".to_string(), "1".to_string()),
        ]);
        let merged = context.merge_env(&config_env);
        assert_eq!(merged["RAILS_ENV"], "test");
        assert_eq!(merged["COVERAGE"], "1");
    }

    #[test]
    fn validate_rejects_bad_encoding_and_pattern() {
        let mut config = BuildConfig::default();
        assert!(config.validate().is_ok());
        config.encoding = "klingon".into();
        assert!(config.validate().is_err());
        config.encoding = "utf-8".into();
        config.file_regex = "(".into();
        assert!(config.validate().is_err());
    }
}
