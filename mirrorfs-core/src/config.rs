//! Configuration for a mirror mount.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_attr_ttl() -> u64 {
    1
}

/// Verbosity of the mirrorfs log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

const LEVEL_NAMES: [(LogLevel, &str); 5] = [
    (LogLevel::Error, "error"),
    (LogLevel::Warn, "warn"),
    (LogLevel::Info, "info"),
    (LogLevel::Debug, "debug"),
    (LogLevel::Trace, "trace"),
];

impl LogLevel {
    /// Directive name understood by `tracing` filters.
    pub fn as_str(&self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|(level, _)| level == self)
            .map_or("info", |(_, name)| *name)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = if name == "warning" { "warn" } else { name.as_str() };
        LEVEL_NAMES
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(level, _)| *level)
            .ok_or_else(|| {
                format!("unknown log level {:?}, expected error, warn, info, debug or trace", s)
            })
    }
}

/// Everything needed to mount a mirror.
///
/// `options` are passed to the mount layer untouched; the core never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Real directory to mirror
    pub source: PathBuf,

    /// Mount point for the presented view
    pub target: PathBuf,

    /// Opaque mount option strings
    #[serde(default)]
    pub options: Vec<String>,

    /// Verbose logging, including the FUSE session
    #[serde(default)]
    pub debug: bool,

    /// Explicit log level; wins over the level implied by `debug`
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Refuse writes even if the pipeline could reverse them
    #[serde(default)]
    pub read_only: bool,

    /// Seconds the kernel may cache attributes and entries
    #[serde(default = "default_attr_ttl")]
    pub attr_ttl_secs: u64,
}

impl MirrorConfig {
    /// Creates a config with default settings.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            options: Vec::new(),
            debug: false,
            log_level: None,
            read_only: false,
            attr_ttl_secs: default_attr_ttl(),
        }
    }

    /// Creates a new builder.
    pub fn builder(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> MirrorConfigBuilder {
        MirrorConfigBuilder {
            config: Self::new(source, target),
        }
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MirrorError::InvalidConfig(vec![e.to_string()]))
    }

    /// Loads a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| MirrorError::io(path, e))?;
        Self::from_json_str(&json)
    }

    /// Effective log level: the explicit one, else what `debug` implies.
    pub fn log_level(&self) -> LogLevel {
        match self.log_level {
            Some(level) => level,
            None if self.debug => LogLevel::Debug,
            None => LogLevel::Info,
        }
    }

    /// Default `EnvFilter` directives for this config.
    ///
    /// The debug flag also turns on the FUSE session's own output.
    pub fn log_filter(&self) -> String {
        let filter = format!("mirrorfs={}", self.log_level());
        if self.debug {
            format!("{},fuser=debug", filter)
        } else {
            filter
        }
    }

    /// Validates the configuration, collecting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.source.is_dir() {
            errors.push(format!("Source is not a directory: {:?}", self.source));
        }

        if self.target.as_os_str().is_empty() {
            errors.push("Target must not be empty".to_string());
        } else if self.target.exists() && !self.target.is_dir() {
            errors.push(format!("Target is not a directory: {:?}", self.target));
        }

        // a mount inside its own source would list itself forever
        let source = fs::canonicalize(&self.source).unwrap_or_else(|_| self.source.clone());
        let target = fs::canonicalize(&self.target).unwrap_or_else(|_| self.target.clone());
        if !self.target.as_os_str().is_empty() && target.starts_with(&source) {
            errors.push(format!("Target {:?} lies inside source {:?}", self.target, self.source));
        }

        if self.options.iter().any(|o| o.trim().is_empty()) {
            errors.push("Mount options must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`validate`](Self::validate), as a [`MirrorError`].
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(MirrorError::InvalidConfig)
    }
}

/// Builder for [`MirrorConfig`].
pub struct MirrorConfigBuilder {
    config: MirrorConfig,
}

impl MirrorConfigBuilder {
    /// Adds one mount option.
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.config.options.push(option.into());
        self
    }

    /// Adds several mount options.
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Enables debug logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Sets an explicit log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = Some(level);
        self
    }

    /// Makes the mount read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Sets the kernel attribute cache TTL.
    pub fn attr_ttl_secs(mut self, secs: u64) -> Self {
        self.config.attr_ttl_secs = secs;
        self
    }

    /// Builds the final config.
    pub fn build(self) -> MirrorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert!("loud".parse::<LogLevel>().unwrap_err().contains("loud"));
        assert!(LogLevel::Trace > LogLevel::Info);
    }

    #[test]
    fn test_log_filter() {
        let config = MirrorConfig::new("/src", "/mnt");
        assert_eq!(config.log_filter(), "mirrorfs=info");

        let config = MirrorConfig::builder("/src", "/mnt").debug(true).build();
        assert_eq!(config.log_filter(), "mirrorfs=debug,fuser=debug");

        let config = MirrorConfig::builder("/src", "/mnt")
            .debug(true)
            .log_level(LogLevel::Trace)
            .build();
        assert_eq!(config.log_level(), LogLevel::Trace);
        assert_eq!(config.log_filter(), "mirrorfs=trace,fuser=debug");

        let config = MirrorConfig::from_json_str(
            r#"{"source": "/a", "target": "/b", "log_level": "warn"}"#,
        )
        .unwrap();
        assert_eq!(config.log_filter(), "mirrorfs=warn");
    }

    #[test]
    fn test_builder() {
        let config = MirrorConfig::builder("/src", "/mnt")
            .option("allow_other")
            .options(["default_permissions", "fsname=mirror"])
            .debug(true)
            .read_only(true)
            .attr_ttl_secs(5)
            .build();

        assert_eq!(config.options, vec!["allow_other", "default_permissions", "fsname=mirror"]);
        assert!(config.read_only);
        assert_eq!(config.log_level(), LogLevel::Debug);
        assert_eq!(config.attr_ttl_secs, 5);
    }

    #[test]
    fn test_from_json_defaults() {
        let config =
            MirrorConfig::from_json_str(r#"{"source": "/tmp/source", "target": "/tmp/dest"}"#)
                .unwrap();

        assert_eq!(config, MirrorConfig::new("/tmp/source", "/tmp/dest"));
        assert_eq!(config.attr_ttl_secs, 1);
        assert_eq!(config.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.json");
        fs::write(
            &path,
            r#"{"source": "/a", "target": "/b", "options": ["allow_other"], "debug": true}"#,
        )
        .unwrap();

        let config = MirrorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.options, vec!["allow_other"]);
        assert!(config.debug);

        let err = MirrorConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_ok() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let config = MirrorConfig::new(source.path(), target.path());
        assert!(config.validate().is_ok());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let source = TempDir::new().unwrap();
        let config = MirrorConfig::builder(source.path().join("missing"), "")
            .option(" ")
            .build();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_rejects_target_inside_source() {
        let source = TempDir::new().unwrap();
        let config = MirrorConfig::new(source.path(), source.path().join("mnt"));

        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("inside source"));
    }
}
