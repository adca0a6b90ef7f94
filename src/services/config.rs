use crate::cli::{BackendArgs, BackendKind, RunArgs};
use crate::domain::constants::{
    DEFAULT_BATCH_CONCURRENCY, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_SECS, DEFAULT_CACHE_FILE,
    DEFAULT_INPUT_FILE, DEFAULT_LOG_DIR, DEFAULT_LOG_LEVEL, DEFAULT_OUTPUT_FILE,
    DEFAULT_OWNER_TIMEOUT_SECS, DEFAULT_POWERSHELL, DEFAULT_WORKERS,
};
use crate::services::pipeline::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },
    #[error("invalid config: the fixture backend needs a fixture file")]
    MissingFixture,
}

/// Run settings. Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub log_dir: PathBuf,
    pub workers: usize,
    pub batch_size: usize,
    pub batch_concurrency: usize,
    pub batch_timeout_secs: u64,
    pub owner_timeout_secs: u64,
    pub log_level: String,
    pub backend: BackendKind,
    pub fixture: Option<PathBuf>,
    pub powershell: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT_FILE),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            cache: PathBuf::from(DEFAULT_CACHE_FILE),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            batch_timeout_secs: DEFAULT_BATCH_TIMEOUT_SECS,
            owner_timeout_secs: DEFAULT_OWNER_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            backend: BackendKind::Powershell,
            fixture: None,
            powershell: DEFAULT_POWERSHELL.to_string(),
        }
    }
}

impl AuditConfig {
    /// Defaults when no path is given; an explicit path must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(raw.trim_start_matches('\u{feff}')).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(v) = &args.input {
            self.input = v.clone();
        }
        if let Some(v) = &args.output {
            self.output = v.clone();
        }
        if let Some(v) = &args.cache {
            self.cache = v.clone();
        }
        if let Some(v) = args.workers {
            self.workers = v;
        }
        if let Some(v) = args.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = args.batch_concurrency {
            self.batch_concurrency = v;
        }
        if let Some(v) = args.batch_timeout_secs {
            self.batch_timeout_secs = v;
        }
        self.apply_backend_args(&args.backend);
    }

    pub fn apply_backend_args(&mut self, args: &BackendArgs) {
        if let Some(v) = args.backend {
            self.backend = v;
        }
        if let Some(v) = &args.fixture {
            self.fixture = Some(v.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 5] = [
            ("workers", self.workers as u64),
            ("batch_size", self.batch_size as u64),
            ("batch_concurrency", self.batch_concurrency as u64),
            ("batch_timeout_secs", self.batch_timeout_secs),
            ("owner_timeout_secs", self.owner_timeout_secs),
        ];
        for (field, value) in checks {
            if value < 1 {
                return Err(ConfigError::TooSmall { field, min: 1 });
            }
        }
        if self.backend == BackendKind::Fixture && self.fixture.is_none() {
            return Err(ConfigError::MissingFixture);
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            workers: self.workers,
            batch_size: self.batch_size,
            batch_concurrency: self.batch_concurrency,
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
        }
    }

    pub fn owner_timeout(&self) -> Duration {
        Duration::from_secs(self.owner_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_path_means_defaults() {
        let cfg = AuditConfig::load(None).expect("defaults");
        assert_eq!(cfg.workers, 15);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.input, PathBuf::from("files.txt"));
        assert_eq!(cfg.backend, BackendKind::Powershell);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_file_overrides_only_listed_fields() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("audit.json");
        std::fs::write(&path, r#"{"workers": 4, "backend": "fixture", "fixture": "dir.json"}"#)
            .expect("write config");
        let cfg = AuditConfig::load(Some(&path)).expect("load config");
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.backend, BackendKind::Fixture);
        assert_eq!(cfg.fixture, Some(PathBuf::from("dir.json")));
    }

    #[test]
    fn missing_explicit_file_and_unknown_keys_fail() {
        let tmp = TempDir::new().expect("temp dir");
        let missing = AuditConfig::load(Some(&tmp.path().join("nope.json")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let path = tmp.path().join("typo.json");
        std::fs::write(&path, r#"{"wrokers": 4}"#).expect("write config");
        assert!(matches!(
            AuditConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let cfg = AuditConfig {
            batch_size: 0,
            ..AuditConfig::default()
        };
        let err = cfg.validate().expect_err("zero batch size");
        assert_eq!(err.to_string(), "invalid config: batch_size must be at least 1");

        let cfg = AuditConfig {
            backend: BackendKind::Fixture,
            ..AuditConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingFixture)));
    }
}
